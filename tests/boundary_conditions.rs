mod common;

use common::*;

#[test]
fn detects_signature_straddling_scan_chunk_boundary() {
    // The 8-byte PNG signature starts 3 bytes before the 4 KiB boundary.
    let png = sample_png(6 * 1024);
    let mut image = vec![0u8; 4093];
    image.extend_from_slice(&png);
    image.extend_from_slice(&vec![0u8; 2048]);

    let output = run_carver(&image, primary_mask());

    let files = recovered_files(&output, "PNG");
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0]).expect("read"), png);
}

#[test]
fn detects_end_marker_straddling_extraction_chunks() {
    // The candidate starts mid-device, so its 4 KiB extraction reads are
    // not aligned with the scan chunks; the EOI lands on a read boundary.
    let jpeg = sample_jpeg(4097);
    let mut image = vec![0u8; 100];
    image.extend_from_slice(&jpeg);
    image.extend_from_slice(&vec![0u8; 4096]);

    let output = run_carver(&image, primary_mask());

    let files = recovered_files(&output, "JPEG");
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0]).expect("read"), jpeg);
}

#[test]
fn keeps_candidate_at_exact_max_size() {
    // JPEG max is 20 MiB; a candidate of exactly that size survives.
    let jpeg = sample_jpeg(20 * 1024 * 1024);
    let mut image = vec![0u8; 1024];
    image.extend_from_slice(&jpeg);
    image.extend_from_slice(&vec![0u8; 1024]);

    let output = run_carver(&image, primary_mask());

    let files = recovered_files(&output, "JPEG");
    assert_eq!(files.len(), 1);
    assert_eq!(
        std::fs::read(&files[0]).expect("read").len(),
        20 * 1024 * 1024
    );
}

#[test]
fn discards_candidate_one_byte_over_max() {
    let jpeg = sample_jpeg(20 * 1024 * 1024 + 1);
    let mut image = vec![0u8; 1024];
    image.extend_from_slice(&jpeg);
    image.extend_from_slice(&vec![0u8; 1024]);

    let output = run_carver(&image, primary_mask());

    assert!(recovered_files(&output, "JPEG").is_empty());
    assert_eq!(output.summary.total_recovered, 0);
}

#[test]
fn carves_file_at_device_tail() {
    // End marker is the final byte of the device.
    let zip = sample_zip(2048);
    let mut image = vec![0u8; 1000];
    image.extend_from_slice(&zip);

    let output = run_carver(&image, primary_mask());

    let files = recovered_files(&output, "ZIP");
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0]).expect("read"), zip);
}
