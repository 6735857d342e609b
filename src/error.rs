use crate::schema::{Operation, ParamKind};
use serde::Serialize;
use thiserror::Error;

/// `step` is 1-based.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Pipeline cannot be empty.")]
    EmptyPipeline,

    #[error("Pipeline step {step} must be an object.")]
    MalformedStep { step: usize },

    #[error("Pipeline step {step} is missing a valid 'operation' string.")]
    MissingOperation { step: usize },

    #[error(
        "Pipeline step {step} has an unsupported operation: '{operation}'. Allowed: {}",
        Operation::allowed_list()
    )]
    UnsupportedOperation { step: usize, operation: String },

    #[error("Pipeline step {step} ('{operation}') has invalid 'params'. Must be an object.")]
    MalformedParams { step: usize, operation: Operation },

    #[error("Pipeline step {step} ('{operation}'): Parameter '{param}' must be of type {expected}.")]
    InvalidParamType {
        step: usize,
        operation: Operation,
        param: String,
        expected: ParamKind,
    },

    #[error("Pipeline step {step} ('{operation}'): Parameter '{param}' {reason}.")]
    InvalidParamValue {
        step: usize,
        operation: Operation,
        param: String,
        reason: String,
    },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyPipeline => "empty_pipeline",
            Self::MalformedStep { .. } => "malformed_step",
            Self::MissingOperation { .. } => "missing_operation",
            Self::UnsupportedOperation { .. } => "unsupported_operation",
            Self::MalformedParams { .. } => "malformed_params",
            Self::InvalidParamType { .. } => "invalid_param_type",
            Self::InvalidParamValue { .. } => "invalid_param_value",
        }
    }

    pub fn to_detail(&self) -> serde_json::Value {
        let mut v = serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}));
        if let Some(obj) = v.as_object_mut() {
            obj.insert("message".into(), serde_json::Value::String(self.to_string()));
        }
        v
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("processing failed: {0}")]
    Failed(String),

    #[error("processing timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl ProcessingError {
    pub fn transport<T: Into<String>>(msg: T) -> Self {
        Self::Transport(msg.into())
    }

    pub fn failed<T: Into<String>>(msg: T) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<reqwest::Error> for ProcessingError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("No input files to process.")]
    NoInputFiles,

    #[error("No files survived step {step} ({operation}); pipeline cannot continue.")]
    PipelineExhausted { step: usize, operation: Operation },

    #[error("{0}")]
    ProcessingFailed(String),

    #[error("Processing timed out after {seconds} seconds.")]
    ProcessingTimeout { seconds: u64 },

    #[error("{0}")]
    TransportError(String),
}

impl ExecutionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoInputFiles => "no_input_files",
            Self::PipelineExhausted { .. } => "pipeline_exhausted",
            Self::ProcessingFailed(_) => "processing_failed",
            Self::ProcessingTimeout { .. } => "processing_timeout",
            Self::TransportError(_) => "transport_error",
        }
    }
}

impl From<ProcessingError> for ExecutionError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::Transport(msg) => Self::TransportError(msg),
            ProcessingError::Failed(msg) => Self::ProcessingFailed(msg),
            ProcessingError::Timeout { seconds } => Self::ProcessingTimeout { seconds },
        }
    }
}
