use super::{
    types::{Prediction, PredictionIn, PredictionInput},
    ProcessingClient,
};
use crate::{config::Config, error::ProcessingError, file::WorkingFile, storage::ResultStore};
use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, d: Duration) {
        (**self).sleep(d)
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

pub trait PredictionApi: Send + Sync {
    fn submit(&self, image_data_uri: &str) -> Result<Prediction, ProcessingError>;
    /// `timeout` bounds this one request; the poll loop passes what is left of its deadline.
    fn fetch(&self, status_url: &str, timeout: Duration) -> Result<Prediction, ProcessingError>;
}

pub struct ReplicateApi {
    http: reqwest::blocking::Client,
    api_base_url: String,
    model_version: String,
    token: String,
    request_timeout: Duration,
}

impl ReplicateApi {
    pub fn new(api_base_url: &str, model_version: &str, token: &str, timeout: Duration) -> Result<Self> {
        if token.is_empty() {
            return Err(anyhow!("background removal API token is not configured"));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "building background removal HTTP client")?;
        Ok(Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            model_version: model_version.to_string(),
            token: token.to_string(),
            request_timeout: timeout,
        })
    }

    fn send(&self, req: reqwest::blocking::RequestBuilder) -> Result<Prediction, ProcessingError> {
        let resp = req
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()?;
        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(ProcessingError::transport(format!(
                "prediction API request failed with status code {}. Response: {}",
                status.as_u16(),
                body
            )));
        }
        serde_json::from_str(&body).map_err(|e| {
            ProcessingError::transport(format!("failed to decode prediction API response: {e}"))
        })
    }
}

impl PredictionApi for ReplicateApi {
    fn submit(&self, image_data_uri: &str) -> Result<Prediction, ProcessingError> {
        let body = PredictionIn {
            version: self.model_version.clone(),
            input: PredictionInput {
                image: image_data_uri.to_string(),
            },
        };
        let url = format!("{}/predictions", self.api_base_url);
        self.send(self.http.post(url).json(&body))
    }

    fn fetch(&self, status_url: &str, timeout: Duration) -> Result<Prediction, ProcessingError> {
        let timeout = timeout.min(self.request_timeout);
        self.send(self.http.get(status_url).timeout(timeout))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Submitted { status_url: String },
    Polling { status_url: String, attempts: u32 },
    Succeeded { output_url: String },
    Failed { message: String },
    TimedOut,
    Errored(ProcessingError),
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Submitted { .. } | Self::Polling { .. })
    }
}

pub struct BackgroundRemovalClient<A, C> {
    api: A,
    clock: C,
    store: Arc<dyn ResultStore>,
    poll_interval: Duration,
    deadline: Duration,
}

impl BackgroundRemovalClient<ReplicateApi, SystemClock> {
    pub fn from_config(cfg: &Config, store: Arc<dyn ResultStore>) -> Result<Self> {
        let bg = &cfg.background;
        let token = std::env::var(&bg.api_token_env).unwrap_or_default();
        let api = ReplicateApi::new(
            &bg.api_base_url,
            &bg.model_version,
            &token,
            Duration::from_secs(bg.request_timeout_seconds),
        )
        .with_context(|| format!("background removal config (set {})", bg.api_token_env))?;
        Ok(Self::new(
            api,
            SystemClock,
            store,
            Duration::from_secs(bg.poll_interval_seconds.max(1)),
            Duration::from_secs(bg.prediction_timeout_seconds),
        ))
    }
}

impl<A: PredictionApi, C: Clock> BackgroundRemovalClient<A, C> {
    pub fn new(
        api: A,
        clock: C,
        store: Arc<dyn ResultStore>,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            api,
            clock,
            store,
            poll_interval,
            deadline,
        }
    }

    pub fn run_prediction(&self, image_data_uri: &str) -> PollState {
        let submitted = match self.api.submit(image_data_uri) {
            Ok(p) => p,
            Err(e) => return PollState::Errored(e),
        };
        let Some(status_url) = submitted.status_url().map(str::to_string) else {
            return PollState::Errored(ProcessingError::transport(
                "prediction API did not return a valid prediction ID or status URL",
            ));
        };
        if submitted.id.as_deref().unwrap_or("").is_empty() {
            return PollState::Errored(ProcessingError::transport(
                "prediction API did not return a valid prediction ID or status URL",
            ));
        }
        debug!("prediction {:?} submitted", submitted.id);

        let started = self.clock.now();
        let mut state = PollState::Submitted { status_url };
        while !state.is_terminal() {
            state = self.advance(state, started);
        }
        state
    }

    fn advance(&self, state: PollState, started: Instant) -> PollState {
        match state {
            PollState::Submitted { status_url } => PollState::Polling {
                status_url,
                attempts: 0,
            },
            PollState::Polling {
                status_url,
                attempts,
            } => {
                let Some(remaining) = self.remaining(started) else {
                    return PollState::TimedOut;
                };
                self.clock.sleep(self.poll_interval.min(remaining));
                let Some(remaining) = self.remaining(started) else {
                    return PollState::TimedOut;
                };

                let prediction = match self.api.fetch(&status_url, remaining) {
                    Ok(p) => p,
                    Err(e) => return PollState::Errored(e),
                };
                // A reply that lands after the deadline does not count.
                if self.remaining(started).is_none() {
                    return PollState::TimedOut;
                }
                let Some(status) = prediction.status.as_deref() else {
                    return PollState::Errored(ProcessingError::transport(
                        "prediction status response is missing 'status'",
                    ));
                };
                debug!("prediction poll attempt={} status={}", attempts + 1, status);

                match status {
                    "succeeded" => match prediction.output_url() {
                        Some(output_url) => PollState::Succeeded { output_url },
                        None => PollState::Failed {
                            message: "prediction succeeded but output is missing".to_string(),
                        },
                    },
                    "failed" | "canceled" => PollState::Failed {
                        message: format!(
                            "prediction {status}. Error: {}",
                            prediction.error_text()
                        ),
                    },
                    _ => PollState::Polling {
                        status_url,
                        attempts: attempts + 1,
                    },
                }
            }
            terminal => terminal,
        }
    }

    fn remaining(&self, started: Instant) -> Option<Duration> {
        let elapsed = self.clock.now().duration_since(started);
        self.deadline.checked_sub(elapsed).filter(|d| !d.is_zero())
    }
}

impl<A: PredictionApi, C: Clock> ProcessingClient for BackgroundRemovalClient<A, C> {
    fn remove_background(&self, file: &WorkingFile) -> Result<WorkingFile, ProcessingError> {
        let bytes = std::fs::read(file.path()).map_err(|e| {
            ProcessingError::failed(format!("cannot read {}: {e}", file.path().display()))
        })?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let data_uri = format!("data:{};base64,{}", file.mime_type, encoded);

        let output_url = match self.run_prediction(&data_uri) {
            PollState::Succeeded { output_url } => output_url,
            PollState::Failed { message } => return Err(ProcessingError::Failed(message)),
            PollState::TimedOut => {
                warn!(
                    "background removal for {} timed out after {:?}",
                    file.original_name, self.deadline
                );
                return Err(ProcessingError::Timeout {
                    seconds: self.deadline.as_secs(),
                });
            }
            PollState::Errored(e) => return Err(e),
            PollState::Submitted { .. } | PollState::Polling { .. } => {
                return Err(ProcessingError::failed("poll loop stopped early"));
            }
        };

        info!("background removed for {}", file.original_name);
        let name = bgremoved_name(&file.original_name);
        self.store
            .persist(&output_url, "bg_removed", &name)
            .ok_or_else(|| {
                ProcessingError::failed(format!(
                    "failed to save background removal result for {}",
                    file.original_name
                ))
            })
    }
}

fn bgremoved_name(original: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original);
    format!("{stem}_bgremoved.png")
}
