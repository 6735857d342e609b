use crate::schema::Operation;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub intake: Intake,
    #[serde(default)]
    pub optimizer: Optimizer,
    #[serde(default)]
    pub background: Background,
    #[serde(default)]
    pub policy: FailurePolicy,
    #[serde(default)]
    pub executor: Executor,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.check()
            .with_context(|| format!("invalid config: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn check(&self) -> Result<()> {
        if self.background.poll_interval_seconds == 0 {
            bail!("background.poll_interval_seconds must be at least 1");
        }
        if self.background.prediction_timeout_seconds == 0 {
            bail!("background.prediction_timeout_seconds must be at least 1");
        }
        if self.executor.max_parallel_files == 0 {
            bail!("executor.max_parallel_files must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub print_summary: bool,
    pub write_report: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
            write_report: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub upload_dir: String,
    pub out_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            upload_dir: "uploads".into(),
            out_dir: "out".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intake {
    pub max_file_bytes: u64,
    pub allowed_mime_types: Vec<String>,
}
impl Default for Intake {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            allowed_mime_types: vec![
                "image/jpeg".into(),
                "image/png".into(),
                "image/gif".into(),
                "image/webp".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Optimizer {
    pub base_url: String,
    pub base_url_env: String,
    pub api_key_env: String,
    pub timeout_seconds: u64,
}
impl Default for Optimizer {
    fn default() -> Self {
        Self {
            base_url: "".into(),
            base_url_env: "IMAGE_OPTIMIZATION_SERVICE_BASE_URL".into(),
            api_key_env: "IMAGE_OPTIMIZATION_API_KEY".into(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Background {
    pub api_base_url: String,
    pub model_version: String,
    pub api_token_env: String,
    pub request_timeout_seconds: u64,
    pub poll_interval_seconds: u64,
    pub prediction_timeout_seconds: u64,
}
impl Default for Background {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.replicate.com/v1".into(),
            model_version: "fb8af171cfa1616ddcf1242c093f9c46bcada5ad4cf6f2fbe8b81b330ec5c003"
                .into(),
            api_token_env: "REPLICATE_API_TOKEN".into(),
            request_timeout_seconds: 30,
            poll_interval_seconds: 3,
            prediction_timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePolicy {
    pub optimize_continue_on_error: bool,
    pub resize_continue_on_error: bool,
    pub convert_continue_on_error: bool,
    pub remove_background_continue_on_error: bool,
}
impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            optimize_continue_on_error: true,
            resize_continue_on_error: true,
            convert_continue_on_error: true,
            remove_background_continue_on_error: false,
        }
    }
}

impl FailurePolicy {
    pub fn continue_on_error(&self, op: Operation) -> bool {
        match op {
            Operation::Optimize => self.optimize_continue_on_error,
            Operation::Resize => self.resize_continue_on_error,
            Operation::Convert => self.convert_continue_on_error,
            Operation::RemoveBackground => self.remove_background_continue_on_error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Executor {
    pub max_parallel_files: usize,
}
impl Default for Executor {
    fn default() -> Self {
        Self {
            max_parallel_files: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
