use crate::{
    client::ProcessingClient,
    error::ValidationError,
    executor::Executor,
    report::{Envelope, OutcomeError, StepOutcome},
    storage::{FileStore, RejectedUpload},
    validate::{parse_optimize_params, parse_pipeline},
};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub files: Vec<PathBuf>,
    pub raw_pipeline: String,
}

#[derive(Debug, Clone)]
pub struct OptimizeRequest {
    pub files: Vec<PathBuf>,
    pub params: Value,
}

#[derive(Debug, Clone)]
pub struct RemoveBackgroundRequest {
    pub file: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub status_code: u16,
    pub body: Envelope,
}

impl Response {
    fn new(status_code: u16, body: Envelope) -> Self {
        Self { status_code, body }
    }
}

pub fn handle_pipeline_request<C: ProcessingClient>(
    ctx: &RequestContext,
    store: &FileStore,
    executor: &Executor<C>,
) -> Response {
    if ctx.raw_pipeline.trim().is_empty() {
        return Response::new(400, Envelope::error("Pipeline definition not provided.", None));
    }

    let raw: serde_json::Value = match serde_json::from_str(&ctx.raw_pipeline) {
        Ok(v) => v,
        Err(err) => {
            warn!("pipeline JSON rejected: {err}");
            return Response::new(
                400,
                Envelope::error(
                    "Invalid pipeline definition format. Must be valid JSON array.",
                    None,
                ),
            );
        }
    };

    let definition = match parse_pipeline(&raw) {
        Ok(d) => d,
        Err(errors) => {
            warn!("pipeline definition has {} error(s)", errors.len());
            return Response::new(400, Envelope::validation(&errors));
        }
    };

    let files = store.intake(&ctx.files);
    info!(
        "intake accepted {}/{} file(s) for a {}-step pipeline",
        files.len(),
        ctx.files.len(),
        definition.steps().len()
    );

    match executor.run(&definition, files) {
        Ok(result) => Response::new(200, Envelope::success(&result)),
        Err(failure) => Response::new(500, Envelope::execution(&failure.reason, &failure.summary)),
    }
}

pub fn handle_optimize_request<C: ProcessingClient>(
    req: &OptimizeRequest,
    store: &FileStore,
    client: &C,
) -> Response {
    if req.files.is_empty() {
        return Response::new(400, Envelope::error("No image files provided.", None));
    }

    let params = match parse_optimize_params(&req.params) {
        Ok(p) => p,
        Err(errors) => {
            warn!("optimize params have {} error(s)", errors.len());
            return Response::new(
                400,
                Envelope::error("Invalid optimization parameters.", Some(error_list(&errors))),
            );
        }
    };

    let intake = store.intake_report(&req.files);
    if !intake.rejected.is_empty() {
        return Response::new(
            400,
            Envelope::error("Invalid file uploads.", Some(rejected_list(&intake.rejected))),
        );
    }
    if intake.accepted.is_empty() {
        return Response::new(500, Envelope::error("Failed to process uploaded files.", None));
    }

    let results: Vec<StepOutcome> = intake
        .accepted
        .iter()
        .map(|file| match client.optimize(file, &params) {
            Ok(out) => StepOutcome::succeeded(out),
            Err(err) => {
                warn!("optimize failed for {}: {err}", file.original_name);
                StepOutcome::failed(&err)
            }
        })
        .collect();
    info!(
        "optimized {}/{} file(s)",
        results.iter().filter(|o| o.success).count(),
        results.len()
    );

    Response::new(
        200,
        Envelope::ok("Images optimized successfully.", json!({ "results": results })),
    )
}

pub fn handle_remove_background_request<C: ProcessingClient>(
    req: &RemoveBackgroundRequest,
    store: &FileStore,
    client: &C,
) -> Response {
    let intake = store.intake_report(std::slice::from_ref(&req.file));
    if !intake.rejected.is_empty() {
        return Response::new(
            400,
            Envelope::error("Invalid file upload.", Some(rejected_list(&intake.rejected))),
        );
    }
    let Some(file) = intake.accepted.first() else {
        return Response::new(500, Envelope::error("Failed to process uploaded file.", None));
    };

    match client.remove_background(file) {
        Ok(out) => Response::new(
            200,
            Envelope::ok(
                "Background removed successfully.",
                json!({ "resultUrl": out.location.display().to_string() }),
            ),
        ),
        Err(err) => {
            error!("background removal failed for {}: {err}", file.original_name);
            let detail = OutcomeError::from(&err);
            Response::new(
                500,
                Envelope::error(
                    "An internal error occurred during background removal.",
                    Some(json!({ "code": detail.code, "message": detail.message })),
                ),
            )
        }
    }
}

fn error_list(errors: &[ValidationError]) -> Value {
    let errors: Vec<Value> = errors.iter().map(ValidationError::to_detail).collect();
    json!({ "errors": errors })
}

fn rejected_list(rejected: &[RejectedUpload]) -> Value {
    json!({ "errors": rejected })
}
