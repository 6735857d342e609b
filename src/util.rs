use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use time::format_description::well_known::Rfc3339;

static NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).with_context(|| format!("create_dir_all {}", p.display()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("{:x}", h.finalize())
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn unique_filename(original_name: &str, prefix: &str) -> String {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            e.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "tmp".to_string());

    let safe_prefix: String = prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    let now = time::OffsetDateTime::now_utc();
    let seq = NAME_COUNTER.fetch_add(1, Ordering::Relaxed);
    let salt = format!(
        "{}:{}:{}:{}",
        now.unix_timestamp_nanos(),
        seq,
        std::process::id(),
        original_name
    );
    let hex = &sha256_hex(salt.as_bytes())[..16];

    if safe_prefix.is_empty() {
        format!("{}_{}.{}", now.unix_timestamp(), hex, ext)
    } else {
        format!("{}_{}_{}.{}", safe_prefix, now.unix_timestamp(), hex, ext)
    }
}
