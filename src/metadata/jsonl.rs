use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::metadata::{MetadataError, MetadataSink, RecoveredFile, RunSummaryRecord};

pub struct JsonlSink {
    tool_version: String,
    config_hash: String,
    evidence_path: String,
    writer: Mutex<BufWriter<File>>,
}

#[derive(Serialize)]
struct RecoveredFileRecord<'a> {
    #[serde(flatten)]
    file: &'a RecoveredFile,
    tool_version: &'a str,
    config_hash: &'a str,
    evidence_path: &'a str,
}

#[derive(Serialize)]
struct SummaryRecord<'a> {
    #[serde(flatten)]
    summary: &'a RunSummaryRecord,
    tool_version: &'a str,
}

impl JsonlSink {
    pub fn new(
        tool_version: &str,
        config_hash: &str,
        evidence_path: &Path,
        output_root: &Path,
    ) -> Result<Self, MetadataError> {
        std::fs::create_dir_all(output_root)?;
        let path = output_root.join("recovered_files.jsonl");
        let file = File::create(path)?;
        Ok(Self {
            tool_version: tool_version.to_string(),
            config_hash: config_hash.to_string(),
            evidence_path: evidence_path.to_string_lossy().to_string(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl MetadataSink for JsonlSink {
    fn record_file(&self, file: &RecoveredFile) -> Result<(), MetadataError> {
        let record = RecoveredFileRecord {
            file,
            tool_version: &self.tool_version,
            config_hash: &self.config_hash,
            evidence_path: &self.evidence_path,
        };
        let mut guard = self.writer.lock().unwrap();
        serde_json::to_writer(&mut *guard, &record)?;
        guard.write_all(b"\n")?;
        Ok(())
    }

    fn record_run_summary(&self, summary: &RunSummaryRecord) -> Result<(), MetadataError> {
        let record = SummaryRecord {
            summary,
            tool_version: &self.tool_version,
        };
        let mut guard = self.writer.lock().unwrap();
        serde_json::to_writer(&mut *guard, &record)?;
        guard.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&self) -> Result<(), MetadataError> {
        let mut guard = self.writer.lock().unwrap();
        guard.flush()?;
        Ok(())
    }
}
