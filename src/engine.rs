//! Carve controller.
//!
//! Drives a sequential chunked scan of the device. Every enabled format is
//! tested at every offset of each chunk; a hit hands control to the
//! format's extractor, which consumes further bytes through the device
//! source and settles the candidate as emitted or discarded. The engine is
//! single-threaded and cooperates with its host purely through the three
//! callables in [`HostHooks`].

use std::path::PathBuf;

use memchr::memchr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::carve::{self, CarveError, CarveOutcome, DiscardReason, EmittedFile};
use crate::chunk::{ChunkIter, ScanChunk};
use crate::config::Mp3Options;
use crate::device::{read_full, DeviceError, DeviceSource, RawDeviceSource};
use crate::formats::{signature_matches, ExtractorKind, CATALOG, FMT_MP4};
use crate::metadata::{MetadataSink, RecoveredFile, RunSummaryRecord};

const SCAN_CHUNK_SIZE: u64 = 4 * 1024;

/// Tail overlap re-checked at the head of the next chunk; sized to the
/// longest start signature so no signature straddles undetected.
const SCAN_OVERLAP: u64 = 8;

/// The three host callables. The host is responsible for making these safe
/// to invoke from wherever it runs the engine; the engine assumes nothing
/// about its threading model.
pub struct HostHooks<'a> {
    log: Box<dyn FnMut(&str) + 'a>,
    progress: Box<dyn FnMut(u8) + 'a>,
    cancel: Box<dyn Fn() -> bool + 'a>,
}

impl<'a> HostHooks<'a> {
    pub fn new(
        log: impl FnMut(&str) + 'a,
        progress: impl FnMut(u8) + 'a,
        cancel: impl Fn() -> bool + 'a,
    ) -> Self {
        Self {
            log: Box::new(log),
            progress: Box::new(progress),
            cancel: Box::new(cancel),
        }
    }

    pub fn log(&mut self, message: &str) {
        (self.log)(message)
    }

    pub fn progress(&mut self, percent: u8) {
        (self.progress)(percent)
    }

    pub fn cancelled(&self) -> bool {
        (self.cancel)()
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to open input device: {0}")]
    Open(#[source] DeviceError),
    #[error("failed to prepare output root: {0}")]
    Output(#[source] std::io::Error),
    #[error("operation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct FormatCount {
    pub name: &'static str,
    pub recovered: u32,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub bytes_scanned: u64,
    pub total_recovered: u64,
    pub per_format: Vec<FormatCount>,
}

/// One carving pass over a device. Owns the output directory, the
/// per-format counters, and the monotone MP3 floor for its lifetime.
pub struct CarveSession {
    input_path: PathBuf,
    output_root: PathBuf,
    enabled: Vec<bool>,
    counts: Vec<u32>,
    mp3_floor: u64,
    mp3_options: Mp3Options,
    run_id: String,
    metadata: Option<Box<dyn MetadataSink>>,
}

impl CarveSession {
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        enabled_mask: Vec<bool>,
        mp3_options: Mp3Options,
    ) -> Self {
        let mut enabled = enabled_mask;
        enabled.resize(CATALOG.len(), false);
        Self {
            input_path: input_path.into(),
            output_root: output_root.into(),
            enabled,
            counts: vec![0; CATALOG.len()],
            mp3_floor: 0,
            mp3_options,
            run_id: String::new(),
            metadata: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_metadata(mut self, sink: Box<dyn MetadataSink>) -> Self {
        self.metadata = Some(sink);
        self
    }

    pub fn run(&mut self, hooks: &mut HostHooks) -> Result<RunSummary, RunError> {
        let device = match RawDeviceSource::open(&self.input_path) {
            Ok(device) => device,
            Err(err) => {
                hooks.log("Error: failed to open input device.");
                return Err(RunError::Open(err));
            }
        };
        std::fs::create_dir_all(&self.output_root).map_err(RunError::Output)?;

        let total = device.len();
        hooks.log(&format!("Device size: {total} bytes"));

        let mut bytes_scanned = 0u64;
        for chunk in ChunkIter::new(total, SCAN_CHUNK_SIZE, SCAN_OVERLAP) {
            if hooks.cancelled() {
                hooks.log("[!] Operation cancelled.");
                return Err(RunError::Cancelled);
            }

            let mut data = vec![0u8; chunk.length as usize];
            let n = match read_full(&device, chunk.start, &mut data) {
                Ok(n) => n,
                Err(err) => {
                    warn!("device read error at offset {}: {err}", chunk.start);
                    break;
                }
            };
            if n == 0 {
                break;
            }
            data.truncate(n);

            let cancelled = self.scan_chunk(&device, &chunk, &data, hooks);
            if cancelled {
                hooks.log("[!] Operation cancelled.");
                return Err(RunError::Cancelled);
            }

            bytes_scanned = (chunk.start + chunk.valid_length).min(total);
            let percent = if total > 0 {
                (bytes_scanned.saturating_mul(100) / total) as u8
            } else {
                100
            };
            hooks.progress(percent);
        }

        let summary = self.build_summary(bytes_scanned);
        hooks.log("File recovery summary:");
        hooks.log(&format!(
            "Total files recovered: {}",
            summary.total_recovered
        ));
        for count in &summary.per_format {
            if count.recovered > 0 {
                hooks.log(&format!(
                    "{}: {} files recovered.",
                    count.name, count.recovered
                ));
            } else {
                hooks.log(&format!("{}: No files found.", count.name));
            }
        }

        if let Some(sink) = &self.metadata {
            let record = RunSummaryRecord {
                run_id: self.run_id.clone(),
                bytes_scanned: summary.bytes_scanned,
                files_recovered: summary.total_recovered,
            };
            if let Err(err) = sink.record_run_summary(&record) {
                warn!("metadata summary error: {err}");
            }
            if let Err(err) = sink.flush() {
                warn!("metadata flush error: {err}");
            }
        }

        Ok(summary)
    }

    /// Scan one chunk for every enabled format. Candidate starts are only
    /// accepted below `valid_length`; the overlap exists so signatures that
    /// straddle the boundary are seen by the next chunk. Returns true when
    /// an extractor observed cancellation.
    fn scan_chunk(
        &mut self,
        device: &dyn DeviceSource,
        chunk: &ScanChunk,
        data: &[u8],
        hooks: &mut HostHooks,
    ) -> bool {
        let valid_len = (chunk.valid_length as usize).min(data.len());

        for format_idx in 0..CATALOG.len() {
            if !self.enabled[format_idx] {
                continue;
            }
            let descriptor = &CATALOG[format_idx];
            let sig_len = descriptor.start_signature.len();

            let mut i = 0usize;
            while i + sig_len <= data.len() && i < valid_len {
                let candidate = match next_anchor(data, i, format_idx) {
                    Some(pos) => pos,
                    None => break,
                };
                if candidate + sig_len > data.len() || candidate >= valid_len {
                    break;
                }
                let start = chunk.start + candidate as u64;

                match descriptor.kind {
                    ExtractorKind::Mp3 => {
                        if carve::mp3::confirms_frame_run(data, candidate, &self.mp3_options)
                            && start >= self.mp3_floor
                        {
                            debug!("mp3 candidate at offset {start}");
                            self.counts[format_idx] += 1;
                            let index = self.counts[format_idx];
                            match carve::mp3::extract(
                                device,
                                descriptor,
                                start,
                                index,
                                &self.output_root,
                                &self.mp3_options,
                                hooks,
                            ) {
                                Ok((reached, outcome)) => {
                                    self.mp3_floor = self.mp3_floor.max(reached);
                                    if self.settle(format_idx, index, start, outcome, hooks) {
                                        return true;
                                    }
                                }
                                Err(err) => self.candidate_failed(format_idx, start, err),
                            }
                            i = candidate + 4;
                        } else {
                            i = candidate + 1;
                        }
                    }
                    ExtractorKind::Mp4 => {
                        if signature_matches(data, candidate, format_idx) {
                            debug!("mp4 candidate at offset {start}");
                            self.counts[format_idx] += 1;
                            let index = self.counts[format_idx];
                            match carve::mp4::extract(
                                device,
                                descriptor,
                                start,
                                index,
                                &self.output_root,
                                hooks,
                            ) {
                                Ok(outcome) => {
                                    if self.settle(format_idx, index, start, outcome, hooks) {
                                        return true;
                                    }
                                }
                                Err(err) => self.candidate_failed(format_idx, start, err),
                            }
                            i = candidate + 8;
                        } else {
                            i = candidate + 1;
                        }
                    }
                    ExtractorKind::Generic | ExtractorKind::Pdf => {
                        if signature_matches(data, candidate, format_idx) {
                            debug!("{} candidate at offset {start}", descriptor.name);
                            self.counts[format_idx] += 1;
                            let index = self.counts[format_idx];
                            let result = if descriptor.kind == ExtractorKind::Pdf {
                                carve::pdf::extract(
                                    device,
                                    descriptor,
                                    start,
                                    index,
                                    &self.output_root,
                                    hooks,
                                )
                            } else {
                                carve::generic::extract(
                                    device,
                                    descriptor,
                                    start,
                                    index,
                                    &self.output_root,
                                    hooks,
                                )
                            };
                            match result {
                                Ok(outcome) => {
                                    if self.settle(format_idx, index, start, outcome, hooks) {
                                        return true;
                                    }
                                }
                                Err(err) => self.candidate_failed(format_idx, start, err),
                            }
                            i = candidate + sig_len;
                        } else {
                            i = candidate + 1;
                        }
                    }
                }
            }
        }

        false
    }

    /// Settle a candidate outcome against the per-format counter and the
    /// host log. Returns true when the extractor saw cancellation.
    fn settle(
        &mut self,
        format_idx: usize,
        index: u32,
        start: u64,
        outcome: CarveOutcome,
        hooks: &mut HostHooks,
    ) -> bool {
        match outcome {
            CarveOutcome::Emitted(file) => {
                hooks.log(&format!(
                    "[OK] Recovered: {} ({} KB)",
                    file.path.display(),
                    file.size / 1024
                ));
                self.record_file(format_idx, start, &file);
                false
            }
            CarveOutcome::Discarded(DiscardReason::Incomplete) => {
                let descriptor = &CATALOG[format_idx];
                let path = self
                    .output_root
                    .join(descriptor.name)
                    .join(format!(
                        "{}_{}.{}",
                        descriptor.file_stem, index, descriptor.extension
                    ));
                hooks.log(&format!(
                    "[SKIP] Deleted incomplete file: {}",
                    path.display()
                ));
                self.counts[format_idx] -= 1;
                false
            }
            CarveOutcome::Discarded(DiscardReason::OutOfBounds) => {
                self.counts[format_idx] -= 1;
                false
            }
            CarveOutcome::Cancelled => true,
        }
    }

    fn candidate_failed(&mut self, format_idx: usize, start: u64, err: CarveError) {
        warn!("carve error at offset {start}: {err}");
        self.counts[format_idx] -= 1;
    }

    fn record_file(&self, format_idx: usize, start: u64, file: &EmittedFile) {
        let Some(sink) = &self.metadata else {
            return;
        };
        let descriptor = &CATALOG[format_idx];
        let record = RecoveredFile {
            run_id: self.run_id.clone(),
            format: descriptor.name.to_string(),
            path: file.rel_path.clone(),
            extension: descriptor.extension.to_string(),
            global_start: start,
            size: file.size,
            md5: file.md5.clone(),
            sha256: file.sha256.clone(),
        };
        if let Err(err) = sink.record_file(&record) {
            warn!("metadata record error: {err}");
        }
    }

    fn build_summary(&self, bytes_scanned: u64) -> RunSummary {
        let per_format: Vec<FormatCount> = CATALOG
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.enabled[*idx])
            .map(|(idx, descriptor)| FormatCount {
                name: descriptor.name,
                recovered: self.counts[idx],
            })
            .collect();
        let total_recovered = per_format.iter().map(|c| u64::from(c.recovered)).sum();
        RunSummary {
            bytes_scanned,
            total_recovered,
            per_format,
        }
    }
}

/// Jump to the next possible candidate via the format's anchor byte: the
/// signature's first byte, or the `f` of `ftyp` four bytes in for MP4.
fn next_anchor(data: &[u8], from: usize, format_idx: usize) -> Option<usize> {
    let descriptor = &CATALOG[format_idx];
    let anchor_off = if format_idx == FMT_MP4 { 4 } else { 0 };
    let anchor = descriptor.start_signature[anchor_off];
    let search_from = from + anchor_off;
    if search_from >= data.len() {
        return None;
    }
    let idx = search_from + memchr(anchor, &data[search_from..])?;
    Some(idx - anchor_off)
}
