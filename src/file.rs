use crate::util::sha256_hex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingFile {
    pub id: String,
    pub original_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub location: PathBuf,
}

impl WorkingFile {
    pub fn new(
        original_name: impl Into<String>,
        location: impl Into<PathBuf>,
        size_bytes: u64,
        mime_type: impl Into<String>,
    ) -> Self {
        let location = location.into();
        let id = sha256_hex(location.display().to_string().as_bytes())[..16].to_string();
        Self {
            id,
            original_name: original_name.into(),
            size_bytes,
            mime_type: mime_type.into(),
            location,
        }
    }

    pub fn path(&self) -> &Path {
        &self.location
    }
}
