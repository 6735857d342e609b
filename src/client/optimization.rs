use super::{types::OptimizeOut, ProcessingClient};
use crate::{
    config::Config,
    error::ProcessingError,
    file::WorkingFile,
    schema::{ConvertParams, ImageFormat, OptimizeParams, ResizeParams},
    storage::ResultStore,
};
use anyhow::{anyhow, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct OptimizationApiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    store: Arc<dyn ResultStore>,
}

impl OptimizationApiClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
        store: Arc<dyn ResultStore>,
    ) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(anyhow!("optimization service base URL is not configured"));
        }
        if api_key.is_empty() {
            return Err(anyhow!("optimization service API key is not configured"));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "building optimization HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
            store,
        })
    }

    pub fn from_config(cfg: &Config, store: Arc<dyn ResultStore>) -> Result<Self> {
        let base_url = std::env::var(&cfg.optimizer.base_url_env)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| cfg.optimizer.base_url.clone());
        let api_key = std::env::var(&cfg.optimizer.api_key_env).unwrap_or_default();
        Self::new(
            &base_url,
            &api_key,
            Duration::from_secs(cfg.optimizer.timeout_seconds),
            store,
        )
        .with_context(|| {
            format!(
                "optimizer config (set {} and {})",
                cfg.optimizer.base_url_env, cfg.optimizer.api_key_env
            )
        })
    }

    fn call(
        &self,
        endpoint: &str,
        file: &WorkingFile,
        fields: Vec<(&'static str, String)>,
        result_name: String,
    ) -> Result<WorkingFile, ProcessingError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("POST {} file={} fields={:?}", url, file.original_name, fields);

        let bytes = std::fs::read(file.path()).map_err(|e| {
            ProcessingError::failed(format!("cannot read {}: {e}", file.path().display()))
        })?;
        let part = Part::bytes(bytes)
            .file_name(file.original_name.clone())
            .mime_str(&file.mime_type)?;
        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(name, value);
        }
        let form = form.part("image", part);

        let resp = self
            .http
            .post(&url)
            .header("X-API-Key", self.api_key.as_str())
            .multipart(form)
            .send()?;
        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(ProcessingError::transport(format!(
                "API request failed with status code {}. Response: {}",
                status.as_u16(),
                truncate(&body, 512)
            )));
        }

        let result_url = interpret_response(&body)?;
        let prefix = endpoint.trim_start_matches('/');
        self.store
            .persist(&result_url, prefix, &result_name)
            .ok_or_else(|| {
                ProcessingError::failed(format!(
                    "failed to retrieve or save {prefix} result for {}",
                    file.original_name
                ))
            })
    }
}

impl ProcessingClient for OptimizationApiClient {
    fn optimize(
        &self,
        file: &WorkingFile,
        params: &OptimizeParams,
    ) -> Result<WorkingFile, ProcessingError> {
        let mut fields = Vec::new();
        if let Some(q) = params.quality {
            fields.push(("quality", q.to_string()));
        }
        if let Some(f) = params.format {
            fields.push(("format", f.as_str().to_string()));
        }
        if let Some(l) = params.lossless {
            fields.push(("lossless", l.to_string()));
        }
        let name = match params.format {
            Some(f) => renamed(&file.original_name, f),
            None => file.original_name.clone(),
        };
        self.call("/optimize", file, fields, name)
    }

    fn resize(&self, file: &WorkingFile, params: &ResizeParams) -> Result<WorkingFile, ProcessingError> {
        let mut fields = Vec::new();
        if let Some(w) = params.width {
            fields.push(("width", w.to_string()));
        }
        if let Some(h) = params.height {
            fields.push(("height", h.to_string()));
        }
        if let Some(m) = &params.mode {
            fields.push(("mode", m.clone()));
        }
        self.call("/resize", file, fields, file.original_name.clone())
    }

    fn convert(
        &self,
        file: &WorkingFile,
        params: &ConvertParams,
    ) -> Result<WorkingFile, ProcessingError> {
        let fields = vec![("format", params.format.as_str().to_string())];
        let name = renamed(&file.original_name, params.format);
        self.call("/convert", file, fields, name)
    }
}

pub fn interpret_response(body: &str) -> Result<String, ProcessingError> {
    let out: OptimizeOut = serde_json::from_str(body).map_err(|e| {
        ProcessingError::transport(format!(
            "failed to decode API JSON response ({e}). Response: {}",
            truncate(body, 512)
        ))
    })?;

    match out.status.as_deref() {
        Some("success") => out.result_url().ok_or_else(|| {
            ProcessingError::transport("API response is missing the result URL".to_string())
        }),
        Some("error") => Err(ProcessingError::failed(format!(
            "API returned an error: {}",
            out.message.as_deref().unwrap_or("Unknown API error")
        ))),
        _ => Err(ProcessingError::transport(
            "API response format unexpected or indicates failure".to_string(),
        )),
    }
}

fn renamed(original: &str, format: ImageFormat) -> String {
    if format == ImageFormat::Auto {
        return original.to_string();
    }
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original);
    format!("{stem}.{}", format.as_str())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_body_yields_url() {
        let url = interpret_response(r#"{"status":"success","output_url":"https://x/y.webp"}"#)
            .unwrap();
        assert_eq!(url, "https://x/y.webp");
    }

    #[test]
    fn error_status_is_processing_failure() {
        let err = interpret_response(r#"{"status":"error","message":"bad image"}"#).unwrap_err();
        assert_eq!(
            err,
            ProcessingError::Failed("API returned an error: bad image".to_string())
        );
    }

    #[test]
    fn garbage_body_is_transport_error() {
        let err = interpret_response("<html>oops</html>").unwrap_err();
        assert!(matches!(err, ProcessingError::Transport(_)));
    }

    #[test]
    fn convert_renames_extension() {
        assert_eq!(renamed("cat.png", ImageFormat::Webp), "cat.webp");
        assert_eq!(renamed("cat.png", ImageFormat::Auto), "cat.png");
    }
}
