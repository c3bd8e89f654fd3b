use std::fs::File;
use std::io::Write;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use blockcarve::config::Mp3Options;
use blockcarve::engine::{CarveSession, HostHooks};

fn minimal_jpeg() -> Vec<u8> {
    let mut jpeg = vec![0u8; 2048];
    jpeg[0..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    jpeg[4..9].copy_from_slice(b"JFIF\0");
    jpeg[2046..2048].copy_from_slice(&[0xFF, 0xD9]);
    jpeg
}

fn run_session(input_path: &std::path::Path) {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let output_root = temp_dir.path().join("recovered");
    let mut session = CarveSession::new(
        input_path,
        &output_root,
        vec![true; 5],
        Mp3Options::default(),
    );
    let mut hooks = HostHooks::new(|_| {}, |_| {}, || false);
    session.run(&mut hooks).expect("run");
}

fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("carve");
    group.sample_size(10);

    for size in [4 * 1024 * 1024usize, 16 * 1024 * 1024usize] {
        group.bench_with_input(BenchmarkId::new("scan_empty", size), &size, |b, &size| {
            let temp_dir = tempfile::tempdir().expect("tempdir");
            let input_path = temp_dir.path().join("image.bin");
            let file = File::create(&input_path).expect("create");
            file.set_len(size as u64).expect("set len");
            b.iter(|| run_session(&input_path));
        });
    }

    group.bench_function("jpeg_dense", |b| {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let input_path = temp_dir.path().join("dense.bin");
        let mut file = File::create(&input_path).expect("create");
        let jpeg = minimal_jpeg();
        let padding = vec![0u8; 2048];
        for _ in 0..200 {
            file.write_all(&jpeg).expect("write");
            file.write_all(&padding).expect("write");
        }
        file.flush().expect("flush");
        b.iter(|| run_session(&input_path));
    });

    group.finish();
}

criterion_group!(benches, bench_throughput);
criterion_main!(benches);
