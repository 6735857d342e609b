use crate::{
    config::Config,
    file::WorkingFile,
    util::{ensure_dir, unique_filename},
};
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

pub trait ResultStore: Send + Sync {
    fn persist(&self, remote_url: &str, name_prefix: &str, original_name: &str)
        -> Option<WorkingFile>;
}

pub struct FileStore {
    upload_dir: PathBuf,
    max_file_bytes: u64,
    allowed_mime_types: Vec<String>,
    http: reqwest::blocking::Client,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IntakeReport {
    pub accepted: Vec<WorkingFile>,
    pub rejected: Vec<RejectedUpload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedUpload {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub deleted: u64,
    pub errors: u64,
}

impl FileStore {
    pub fn new(cfg: &Config) -> Result<Self> {
        let upload_dir = PathBuf::from(&cfg.paths.upload_dir);
        ensure_dir(&upload_dir)?;
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .with_context(|| "building download client")?;
        Ok(Self {
            upload_dir,
            max_file_bytes: cfg.intake.max_file_bytes,
            allowed_mime_types: cfg.intake.allowed_mime_types.clone(),
            http,
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn intake(&self, received: &[PathBuf]) -> Vec<WorkingFile> {
        self.intake_report(received).accepted
    }

    pub fn intake_report(&self, received: &[PathBuf]) -> IntakeReport {
        let mut report = IntakeReport::default();
        for path in received {
            match self.intake_one(path) {
                Ok(file) => {
                    debug!("accepted {} as {}", path.display(), file.location.display());
                    report.accepted.push(file);
                }
                Err(err) => {
                    warn!("rejected upload {}: {:#}", path.display(), err);
                    report.rejected.push(RejectedUpload {
                        name: path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| path.display().to_string()),
                        reason: format!("{err:#}"),
                    });
                }
            }
        }
        report
    }

    fn intake_one(&self, path: &Path) -> Result<WorkingFile> {
        let meta = std::fs::metadata(path).with_context(|| "stat upload")?;
        if !meta.is_file() {
            bail!("not a regular file");
        }
        if meta.len() > self.max_file_bytes {
            bail!(
                "exceeds the size limit ({} > {} bytes)",
                meta.len(),
                self.max_file_bytes
            );
        }

        let bytes = std::fs::read(path).with_context(|| "read upload")?;
        let mime = sniff_mime(&bytes).ok_or_else(|| anyhow!("unrecognized file type"))?;
        if !self.allowed_mime_types.iter().any(|m| m == mime) {
            bail!("type {mime} is not allowed");
        }

        let original_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        self.write_new(&bytes, "upload", &original_name, &original_name, mime)
    }

    fn write_new(
        &self,
        bytes: &[u8],
        prefix: &str,
        name_for_extension: &str,
        original_name: &str,
        mime: &str,
    ) -> Result<WorkingFile> {
        ensure_dir(&self.upload_dir)?;
        let dest = self
            .upload_dir
            .join(unique_filename(name_for_extension, prefix));
        std::fs::write(&dest, bytes).with_context(|| format!("write {}", dest.display()))?;
        Ok(WorkingFile::new(
            original_name,
            dest,
            bytes.len() as u64,
            mime,
        ))
    }

    fn download(&self, remote_url: &str, name_prefix: &str, original_name: &str) -> Result<WorkingFile> {
        let url = reqwest::Url::parse(remote_url).with_context(|| "parse result URL")?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("unsupported URL scheme: {}", url.scheme());
        }

        let resp = self
            .http
            .get(url.clone())
            .send()
            .with_context(|| "download request")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("download returned HTTP {}", status.as_u16());
        }
        let bytes = resp.bytes().with_context(|| "read download body")?;
        if bytes.is_empty() {
            bail!("download body is empty");
        }

        let mut remote_name = url
            .path_segments()
            .and_then(|mut segs| segs.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or("downloaded_file")
            .to_string();
        if Path::new(&remote_name).extension().is_none() {
            remote_name.push_str(".tmp");
        }

        let mime = sniff_mime(&bytes).unwrap_or("application/octet-stream");
        self.write_new(&bytes, name_prefix, &remote_name, original_name, mime)
    }

    /// Missing files count as deleted.
    pub fn delete_file(&self, filename: &str) -> bool {
        if filename.contains('/') || filename.contains('\\') || filename == "." || filename == ".."
        {
            warn!("refusing to delete suspicious filename: {filename}");
            return false;
        }
        let path = self.upload_dir.join(filename);
        if path.is_file() {
            if let Err(err) = std::fs::remove_file(&path) {
                warn!("failed to delete {}: {err}", path.display());
                return false;
            }
        }
        true
    }

    pub fn cleanup_old_files(&self, max_age: Duration) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        let now = SystemTime::now();
        let entries = std::fs::read_dir(&self.upload_dir)
            .with_context(|| format!("read_dir {}", self.upload_dir.display()))?;

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age <= max_age {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => report.deleted += 1,
                Err(err) => {
                    warn!("cleanup failed for {}: {err}", entry.path().display());
                    report.errors += 1;
                }
            }
        }

        info!(
            "cleanup deleted={} errors={} dir={}",
            report.deleted,
            report.errors,
            self.upload_dir.display()
        );
        Ok(report)
    }
}

impl ResultStore for FileStore {
    fn persist(&self, remote_url: &str, name_prefix: &str, original_name: &str) -> Option<WorkingFile> {
        match self.download(remote_url, name_prefix, original_name) {
            Ok(file) => Some(file),
            Err(err) => {
                warn!("failed to persist result from {remote_url}: {:#}", err);
                None
            }
        }
    }
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes).map(|t| t.mime_type())
}
