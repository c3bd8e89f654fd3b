pub mod generic;
pub mod mp3;
pub mod mp4;
pub mod pdf;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memchr::memchr;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::device::DeviceError;
use crate::formats::FormatDescriptor;

#[derive(Debug, Error)]
pub enum CarveError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

/// Why a candidate was demoted instead of emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Final size fell outside the format's `[min, max]` bounds.
    OutOfBounds,
    /// Structural requirement unmet: no end marker, missing PDF tokens,
    /// or missing `ftyp`.
    Incomplete,
}

#[derive(Debug, Clone)]
pub struct EmittedFile {
    pub path: PathBuf,
    pub rel_path: String,
    pub size: u64,
    pub md5: String,
    pub sha256: String,
}

#[derive(Debug)]
pub enum CarveOutcome {
    Emitted(EmittedFile),
    Discarded(DiscardReason),
    /// Host cancellation observed mid-extraction; the partial output is left
    /// on disk as-is.
    Cancelled,
}

/// Allocate the output path `<root>/<NAME>/<stem>_<n>.<ext>`, creating the
/// format subdirectory on demand.
pub fn output_path(
    output_root: &Path,
    descriptor: &FormatDescriptor,
    index: u32,
) -> Result<(PathBuf, String), CarveError> {
    let dir = output_root.join(descriptor.name);
    std::fs::create_dir_all(&dir)?;
    let filename = format!(
        "{}_{}.{}",
        descriptor.file_stem, index, descriptor.extension
    );
    let full_path = dir.join(&filename);
    let rel_path = format!("{}/{}", descriptor.name, filename);
    Ok((full_path, rel_path))
}

/// Buffered candidate output that hashes every byte as it is written, so an
/// emitted file's digests come for free at close.
pub(crate) struct OutputFile {
    path: PathBuf,
    writer: BufWriter<File>,
    md5: md5::Context,
    sha256: Sha256,
    written: u64,
}

impl OutputFile {
    pub(crate) fn create(path: PathBuf) -> Result<Self, CarveError> {
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            md5: md5::Context::new(),
            sha256: Sha256::new(),
            written: 0,
        })
    }

    pub(crate) fn write(&mut self, buf: &[u8]) -> Result<(), CarveError> {
        self.writer.write_all(buf)?;
        self.md5.consume(buf);
        self.sha256.update(buf);
        self.written = self.written.saturating_add(buf.len() as u64);
        Ok(())
    }

    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and return `(size, md5, sha256)`.
    pub(crate) fn finish(mut self) -> Result<(u64, String, String), CarveError> {
        self.writer.flush()?;
        let md5 = format!("{:x}", self.md5.compute());
        let sha256 = hex::encode(self.sha256.finalize());
        Ok((self.written, md5, sha256))
    }

    /// Drop the writer and unlink the candidate.
    pub(crate) fn discard(self) -> Result<(), CarveError> {
        let path = self.path.clone();
        drop(self);
        let _ = std::fs::remove_file(path);
        Ok(())
    }

    /// Flush and leave the partial file on disk (cancellation path).
    pub(crate) fn abandon(mut self) -> Result<(), CarveError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// First occurrence of `needle` in `haystack`, skipping via memchr on the
/// first byte.
pub(crate) fn find_pattern(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    let first = needle[0];
    let mut pos = 0usize;
    while pos + needle.len() <= haystack.len() {
        let idx = pos + memchr(first, &haystack[pos..])?;
        if idx + needle.len() > haystack.len() {
            return None;
        }
        if &haystack[idx..idx + needle.len()] == needle {
            return Some(idx);
        }
        pos = idx + 1;
    }
    None
}
