pub mod jsonl;

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// One emitted file, as recorded alongside the recovery tree.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveredFile {
    pub run_id: String,
    pub format: String,
    pub path: String,
    pub extension: String,
    pub global_start: u64,
    pub size: u64,
    pub md5: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummaryRecord {
    pub run_id: String,
    pub bytes_scanned: u64,
    pub files_recovered: u64,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub trait MetadataSink: Send + Sync {
    fn record_file(&self, file: &RecoveredFile) -> Result<(), MetadataError>;
    fn record_run_summary(&self, summary: &RunSummaryRecord) -> Result<(), MetadataError>;
    fn flush(&self) -> Result<(), MetadataError>;
}

pub fn build_sink(
    tool_version: &str,
    config_hash: &str,
    evidence_path: &Path,
    output_root: &Path,
) -> Result<Box<dyn MetadataSink>, MetadataError> {
    Ok(Box::new(jsonl::JsonlSink::new(
        tool_version,
        config_hash,
        evidence_path,
        output_root,
    )?))
}
