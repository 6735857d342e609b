use crate::{
    client::{BackgroundRemovalClient, ClientRouter, OptimizationApiClient},
    config::Config,
    executor::Executor,
    request::{
        handle_optimize_request, handle_pipeline_request, handle_remove_background_request,
        OptimizeRequest, RemoveBackgroundRequest, RequestContext, Response,
    },
    storage::{FileStore, ResultStore},
    util::{ensure_dir, now_rfc3339, sha256_hex},
    validate::validate,
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "image-pipeline")]
#[command(about = "Deterministic image pipeline orchestrator (optimize, resize, convert, background removal)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./image-pipeline.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the resolved client configuration.
    Doctor {},
    /// Check a pipeline definition without running it.
    Validate {
        #[arg(long)]
        pipeline: PathBuf,
    },
    /// Run a pipeline definition against one or more images.
    Run {
        #[arg(long)]
        pipeline: PathBuf,
        #[arg(long = "input", required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Optimize one or more images without a pipeline definition.
    Optimize {
        #[arg(long = "input", required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        quality: Option<f64>,
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        lossless: bool,
    },
    /// Remove the background from a single image.
    RemoveBackground {
        #[arg(long)]
        input: PathBuf,
    },
    /// Delete stale files from the upload dir.
    Cleanup {
        #[arg(long, default_value_t = 86_400)]
        max_age_seconds: u64,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let cfg = if cfg_path.exists() {
        Config::load(&cfg_path)?
    } else {
        Config::default()
    };
    let _guard = init_logging(&args, &cfg)?;

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Validate { pipeline } => validate_cmd(pipeline),
        Command::Run {
            pipeline,
            inputs,
            out_dir,
        } => run(&cfg, pipeline, inputs, out_dir.as_deref()),
        Command::Optimize {
            inputs,
            quality,
            format,
            lossless,
        } => {
            let mut params = serde_json::Map::new();
            if let Some(q) = quality {
                params.insert("quality".into(), serde_json::json!(q));
            }
            if let Some(f) = format {
                params.insert("format".into(), serde_json::json!(f));
            }
            if *lossless {
                params.insert("lossless".into(), serde_json::Value::Bool(true));
            }
            optimize_cmd(&cfg, inputs, serde_json::Value::Object(params))
        }
        Command::RemoveBackground { input } => remove_background_cmd(&cfg, input),
        Command::Cleanup { max_age_seconds } => cleanup(&cfg, *max_age_seconds),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        if !p.exists() {
            return Err(anyhow!("config file not found: {}", p.display()));
        }
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("image-pipeline.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("image-pipeline.example.toml"))
    }
}

fn init_logging(args: &Args, cfg: &Config) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = match resolve_log_path(cfg) {
        Some(path) => {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            ensure_dir(parent)?;
            let file = std::fs::File::create(&path)
                .with_context(|| format!("create log file: {}", path.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(&cfg.paths.out_dir).join("image-pipeline.log"))
}

fn env_present(name: &str) -> bool {
    std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false)
}

fn doctor(cfg: &Config) -> Result<()> {
    let base_url = std::env::var(&cfg.optimizer.base_url_env)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| cfg.optimizer.base_url.clone());
    let diag = serde_json::json!({
        "optimizer": {
            "base_url": base_url,
            "api_key_present": env_present(&cfg.optimizer.api_key_env),
            "timeout_seconds": cfg.optimizer.timeout_seconds,
        },
        "background": {
            "api_base_url": cfg.background.api_base_url,
            "model_version": cfg.background.model_version,
            "api_token_present": env_present(&cfg.background.api_token_env),
            "poll_interval_seconds": cfg.background.poll_interval_seconds,
            "prediction_timeout_seconds": cfg.background.prediction_timeout_seconds,
        },
        "upload_dir": cfg.paths.upload_dir,
        "policy": cfg.policy,
        "max_parallel_files": cfg.executor.max_parallel_files,
    });
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(())
}

fn validate_cmd(pipeline: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(pipeline)
        .with_context(|| format!("reading pipeline: {}", pipeline.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| "Invalid pipeline definition format. Must be valid JSON array.")?;
    let errors = validate(&value);
    let details: Vec<_> = errors.iter().map(|e| e.to_detail()).collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "valid": errors.is_empty(),
            "errors": details,
        }))?
    );
    if !errors.is_empty() {
        return Err(anyhow!("pipeline definition has {} error(s)", errors.len()));
    }
    Ok(())
}

fn run(cfg: &Config, pipeline: &Path, inputs: &[PathBuf], out_override: Option<&Path>) -> Result<()> {
    let raw_pipeline = std::fs::read_to_string(pipeline)
        .with_context(|| format!("reading pipeline: {}", pipeline.display()))?;

    let store = Arc::new(FileStore::new(cfg)?);
    let results: Arc<dyn ResultStore> = store.clone();
    let optimizer = OptimizationApiClient::from_config(cfg, results.clone())?;
    let background = BackgroundRemovalClient::from_config(cfg, results)?;
    let executor = Executor::new(cfg, ClientRouter::new(optimizer, background));

    let ctx = RequestContext {
        files: inputs.to_vec(),
        raw_pipeline,
    };

    let started = now_rfc3339();
    let response = handle_pipeline_request(&ctx, &store, &executor);

    if cfg.global.write_report {
        let out_root = out_override
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
        let run_id = sha256_hex(format!("{}:{}", started, ctx.raw_pipeline).as_bytes());
        let run_dir = out_root.join(&run_id[..16]);
        ensure_dir(&run_dir)?;
        let report = serde_json::json!({
            "run_id": run_id,
            "started": started,
            "finished": now_rfc3339(),
            "inputs": ctx.files,
            "status_code": response.status_code,
            "response": response.body,
        });
        std::fs::write(
            run_dir.join("report.json"),
            serde_json::to_string_pretty(&report)?,
        )?;
        info!("report written to {}", run_dir.display());
    }

    if cfg.global.print_summary {
        println!("{}", serde_json::to_string_pretty(&response.body)?);
    }

    if !response.body.is_success() {
        return Err(anyhow!(
            "pipeline failed (status {}): {}",
            response.status_code,
            response.body.message.as_deref().unwrap_or("unknown error")
        ));
    }
    Ok(())
}

fn optimize_cmd(cfg: &Config, inputs: &[PathBuf], params: serde_json::Value) -> Result<()> {
    let store = Arc::new(FileStore::new(cfg)?);
    let client = OptimizationApiClient::from_config(cfg, store.clone())?;
    let req = OptimizeRequest {
        files: inputs.to_vec(),
        params,
    };
    finish(handle_optimize_request(&req, &store, &client))
}

fn remove_background_cmd(cfg: &Config, input: &Path) -> Result<()> {
    let store = Arc::new(FileStore::new(cfg)?);
    let client = BackgroundRemovalClient::from_config(cfg, store.clone())?;
    let req = RemoveBackgroundRequest {
        file: input.to_path_buf(),
    };
    finish(handle_remove_background_request(&req, &store, &client))
}

fn finish(response: Response) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    if !response.body.is_success() {
        return Err(anyhow!(
            "request failed (status {}): {}",
            response.status_code,
            response.body.message.as_deref().unwrap_or("unknown error")
        ));
    }
    Ok(())
}

fn cleanup(cfg: &Config, max_age_seconds: u64) -> Result<()> {
    let store = FileStore::new(cfg)?;
    let report = store.cleanup_old_files(Duration::from_secs(max_age_seconds))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
