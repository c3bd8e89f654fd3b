mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use blockcarve::config::Mp3Options;
use blockcarve::engine::{CarveSession, HostHooks, RunError};
use common::*;

#[test]
fn cancel_before_first_chunk_stops_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input_path = dir.path().join("image.bin");
    let mut image = vec![0u8; 64 * 1024];
    insert_bytes(&mut image, 4096, &sample_png(8 * 1024));
    std::fs::write(&input_path, &image).expect("write input");
    let output_root = dir.path().join("recovered");

    let mut session = CarveSession::new(
        &input_path,
        &output_root,
        primary_mask(),
        Mp3Options::default(),
    );

    let mut logs: Vec<String> = Vec::new();
    let result = {
        let mut hooks = HostHooks::new(|m| logs.push(m.to_string()), |_| {}, || true);
        session.run(&mut hooks)
    };

    assert!(matches!(result, Err(RunError::Cancelled)));
    assert!(logs.iter().any(|line| line == "[!] Operation cancelled."));
    // Nothing was scanned, so nothing was recovered.
    assert!(!output_root.join("PNG").exists());
}

#[test]
fn cancel_mid_scan_stops_between_chunks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input_path = dir.path().join("image.bin");
    // Two recoverable files; cancellation fires after the first chunk.
    let mut image = vec![0u8; 256 * 1024];
    insert_bytes(&mut image, 1024, &sample_png(2 * 1024));
    insert_bytes(&mut image, 128 * 1024, &sample_png(2 * 1024));
    std::fs::write(&input_path, &image).expect("write input");
    let output_root = dir.path().join("recovered");

    let mut session = CarveSession::new(
        &input_path,
        &output_root,
        primary_mask(),
        Mp3Options::default(),
    );

    // Poll 0 is the first chunk top, poll 1 the extractor; the cancel is
    // seen at the top of the second chunk.
    let polls = AtomicUsize::new(0);
    let result = {
        let mut hooks = HostHooks::new(
            |_| {},
            |_| {},
            || polls.fetch_add(1, Ordering::Relaxed) >= 2,
        );
        session.run(&mut hooks)
    };

    assert!(matches!(result, Err(RunError::Cancelled)));
    // The first file was already emitted before the cancel was observed;
    // the second was never reached.
    let png_dir = output_root.join("PNG");
    let count = std::fs::read_dir(&png_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(count, 1);
}

#[test]
fn cancel_inside_extractor_leaves_partial_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input_path = dir.path().join("image.bin");
    // The PNG spans several extraction reads, so the cancel is observed
    // inside the extractor's loop rather than between scan chunks.
    let png = sample_png(12 * 1024);
    let mut image = vec![0u8; 1024];
    image.extend_from_slice(&png);
    image.extend_from_slice(&vec![0u8; 1024]);
    std::fs::write(&input_path, &image).expect("write input");
    let output_root = dir.path().join("recovered");

    let mut session = CarveSession::new(
        &input_path,
        &output_root,
        primary_mask(),
        Mp3Options::default(),
    );

    // Poll 0 is the first chunk top, poll 1 the extractor's first read,
    // poll 2 fires inside the extractor.
    let polls = AtomicUsize::new(0);
    let mut logs: Vec<String> = Vec::new();
    let result = {
        let mut hooks = HostHooks::new(
            |m| logs.push(m.to_string()),
            |_| {},
            || polls.fetch_add(1, Ordering::Relaxed) >= 2,
        );
        session.run(&mut hooks)
    };

    assert!(matches!(result, Err(RunError::Cancelled)));
    assert!(logs.iter().any(|line| line == "[!] Operation cancelled."));
    // The partial file keeps its allocated number and stays on disk.
    let partial = output_root.join("PNG/RecoveredFile_1.png");
    let len = std::fs::metadata(&partial).expect("partial").len();
    assert!(len > 0 && len < png.len() as u64);
}

#[test]
fn open_failure_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut session = CarveSession::new(
        dir.path().join("does_not_exist.bin"),
        dir.path().join("recovered"),
        primary_mask(),
        Mp3Options::default(),
    );

    let mut logs: Vec<String> = Vec::new();
    let result = {
        let mut hooks = HostHooks::new(|m| logs.push(m.to_string()), |_| {}, || false);
        session.run(&mut hooks)
    };

    assert!(matches!(result, Err(RunError::Open(_))));
    assert!(logs
        .iter()
        .any(|line| line == "Error: failed to open input device."));
}
