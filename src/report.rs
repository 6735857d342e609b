use crate::{
    error::{ExecutionError, ProcessingError, ValidationError},
    file::WorkingFile,
    schema::Operation,
};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeError {
    pub code: &'static str,
    pub message: String,
}

impl From<&ProcessingError> for OutcomeError {
    fn from(err: &ProcessingError) -> Self {
        let code = match err {
            ProcessingError::Transport(_) => "transport_error",
            ProcessingError::Failed(_) => "processing_failed",
            ProcessingError::Timeout { .. } => "processing_timeout",
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub success: bool,
    pub file: Option<WorkingFile>,
    pub error: Option<OutcomeError>,
}

impl StepOutcome {
    pub fn succeeded(file: WorkingFile) -> Self {
        Self {
            success: true,
            file: Some(file),
            error: None,
        }
    }

    pub fn failed(err: &ProcessingError) -> Self {
        Self {
            success: false,
            file: None,
            error: Some(err.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub step_index: usize,
    pub operation: Operation,
    pub outcomes: Vec<StepOutcome>,
}

impl StepResult {
    pub fn output_files(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub summary: Vec<StepResult>,
    pub final_files: Vec<WorkingFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub step: usize,
    pub operation: Operation,
    pub output_files: usize,
}

pub fn summary_rows(summary: &[StepResult]) -> Vec<SummaryRow> {
    summary
        .iter()
        .map(|s| SummaryRow {
            step: s.step_index + 1,
            operation: s.operation,
            output_files: s.output_files(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Envelope {
    pub fn success(result: &PipelineResult) -> Self {
        let final_results: Vec<String> = result
            .final_files
            .iter()
            .map(|f| f.location.display().to_string())
            .collect();
        Self::ok(
            "Pipeline executed successfully.",
            json!({
                "pipeline_summary": summary_rows(&result.summary),
                "final_results": final_results,
            }),
        )
    }

    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self {
            status: "success",
            message: Some(message.into()),
            data: Some(data),
            details: None,
        }
    }

    pub fn error(message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
            data: None,
            details,
        }
    }

    pub fn validation(errors: &[ValidationError]) -> Self {
        let errors: Vec<Value> = errors.iter().map(ValidationError::to_detail).collect();
        Self::error(
            "Invalid pipeline definition.",
            Some(json!({ "errors": errors })),
        )
    }

    pub fn execution(reason: &ExecutionError, partial: &[StepResult]) -> Self {
        Self::error(
            reason.to_string(),
            Some(json!({
                "code": reason.code(),
                "pipeline_summary": summary_rows(partial),
            })),
        )
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}
