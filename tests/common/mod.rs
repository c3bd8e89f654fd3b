//! Shared test infrastructure for carver integration tests.
//!
//! Builds synthetic device images, runs a full carve session over them,
//! and hands back the recovery tree plus everything the host hooks saw.
#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use blockcarve::config::Mp3Options;
use blockcarve::engine::{CarveSession, HostHooks, RunSummary};
use blockcarve::formats;

pub struct RunOutput {
    /// Owns the temp tree; dropped last.
    #[allow(dead_code)]
    pub dir: tempfile::TempDir,
    pub output_root: PathBuf,
    pub summary: RunSummary,
    pub logs: Vec<String>,
    pub progress: Vec<u8>,
}

/// Run a full carve session over `image` with the given enable mask.
pub fn run_carver(image: &[u8], mask: Vec<bool>) -> RunOutput {
    let dir = tempfile::tempdir().expect("tempdir");
    let input_path = dir.path().join("image.bin");
    fs::write(&input_path, image).expect("write input");
    let output_root = dir.path().join("recovered");

    let mut session = CarveSession::new(&input_path, &output_root, mask, Mp3Options::default());
    let mut logs: Vec<String> = Vec::new();
    let mut progress: Vec<u8> = Vec::new();
    let summary = {
        let mut hooks = HostHooks::new(
            |message| logs.push(message.to_string()),
            |percent| progress.push(percent),
            || false,
        );
        session.run(&mut hooks).expect("run")
    };

    RunOutput {
        dir,
        output_root,
        summary,
        logs,
        progress,
    }
}

/// Mask enabling only the five primary formats.
pub fn primary_mask() -> Vec<bool> {
    vec![true; formats::PRIMARY_FORMAT_COUNT]
}

/// Mask enabling exactly the given catalog indices.
pub fn mask_for(indices: &[usize]) -> Vec<bool> {
    let mut mask = vec![false; 10];
    for idx in indices {
        mask[*idx] = true;
    }
    mask
}

pub fn insert_bytes(target: &mut Vec<u8>, offset: usize, data: &[u8]) {
    let end = offset + data.len();
    if end > target.len() {
        target.resize(end, 0u8);
    }
    target[offset..end].copy_from_slice(data);
}

/// A PNG-shaped payload of exactly `total_len` bytes: signature, non-zero
/// filler, and the 12-byte IEND trailer.
pub fn sample_png(total_len: usize) -> Vec<u8> {
    assert!(total_len >= 20);
    let mut data = Vec::with_capacity(total_len);
    data.extend_from_slice(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
    data.resize(total_len - 12, 0xAB);
    data.extend_from_slice(&[
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ]);
    data
}

/// A JPEG-shaped payload: `FF D8 FF E0` header, filler, `FF D9` trailer.
pub fn sample_jpeg(total_len: usize) -> Vec<u8> {
    assert!(total_len >= 6);
    let mut data = Vec::with_capacity(total_len);
    data.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    data.resize(total_len - 2, 0x00);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

/// A ZIP-shaped payload ending at its end-of-central-directory signature.
pub fn sample_zip(total_len: usize) -> Vec<u8> {
    assert!(total_len >= 8);
    let mut data = Vec::with_capacity(total_len);
    data.extend_from_slice(&[0x50, 0x4B, 0x03, 0x04]);
    data.resize(total_len - 4, 0x11);
    data.extend_from_slice(&[0x50, 0x4B, 0x05, 0x06]);
    data
}

/// A PDF-shaped payload with optional structure tokens and end marker.
pub fn sample_pdf(total_len: usize, with_tokens: bool, with_eof: bool) -> Vec<u8> {
    let mut data = Vec::with_capacity(total_len);
    data.extend_from_slice(b"%PDF-1.4\n");
    if with_tokens {
        data.extend_from_slice(b"xref\n0 1\ntrailer\n<< /Size 1 >>\n");
    }
    let tail = if with_eof { 5 } else { 0 };
    while data.len() < total_len - tail {
        data.push(b'.');
    }
    if with_eof {
        data.extend_from_slice(b"%%EOF");
    }
    data
}

/// One MPEG 1 Layer III frame at 128 kbps, 44.1 kHz (417 bytes).
pub fn mp3_frame() -> Vec<u8> {
    let mut frame = vec![0xFF, 0xFB, 0x90, 0x00];
    frame.resize(417, 0x00);
    frame
}

/// `count` contiguous MP3 frames.
pub fn mp3_stream(count: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(count * 417);
    for _ in 0..count {
        data.extend_from_slice(&mp3_frame());
    }
    data
}

/// An MP4 box with the given type and payload length; the declared size
/// includes the 8-byte header.
pub fn mp4_box(box_type: &[u8; 4], payload_len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + payload_len);
    data.extend_from_slice(&((8 + payload_len) as u32).to_be_bytes());
    data.extend_from_slice(box_type);
    for i in 0..payload_len {
        data.push((i % 199) as u8);
    }
    data
}

/// List the recovered files for one format, sorted by name.
pub fn recovered_files(output: &RunOutput, format_name: &str) -> Vec<PathBuf> {
    let dir = output.output_root.join(format_name);
    let mut files: Vec<PathBuf> = match fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}
