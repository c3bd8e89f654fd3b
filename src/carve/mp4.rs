//! MP4 box reassembly.
//!
//! The candidate region is scanned for the `ftyp`, `moov`, and `mdat`
//! boxes; each is copied out by its declared big-endian size, which may
//! span several reads. The playable file is the concatenation
//! `ftyp || moov || mdat` regardless of on-disk order. `moov` and `mdat`
//! accumulate in temporary files that are removed once the candidate
//! completes.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::carve::{
    output_path, CarveError, CarveOutcome, DiscardReason, EmittedFile, OutputFile,
};
use crate::device::{read_full, DeviceSource};
use crate::engine::HostHooks;
use crate::formats::FormatDescriptor;

const READ_CHUNK: usize = 1024 * 1024;

/// Box headers are 8 bytes; carrying 7 keeps one intact across reads.
const HEADER_CARRY: usize = 7;

const BOX_HEADER_LEN: usize = 8;

/// `ftyp` and `moov` declaring more than this are treated as corrupt
/// headers rather than boxes.
const FTYP_MOOV_MAX: u64 = 200 * 1024 * 1024;

const TEMP_MOOV: &str = "Temp__moov.mp4";
const TEMP_MDAT: &str = "Temp__mdat.mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoxKind {
    Ftyp,
    Moov,
    Mdat,
}

pub fn extract(
    device: &dyn DeviceSource,
    descriptor: &FormatDescriptor,
    start: u64,
    index: u32,
    output_root: &Path,
    hooks: &mut HostHooks,
) -> Result<CarveOutcome, CarveError> {
    let (full_path, rel_path) = output_path(output_root, descriptor, index)?;
    let dir = full_path.parent().map(Path::to_path_buf).unwrap_or_default();
    let moov_path = dir.join(TEMP_MOOV);
    let mdat_path = dir.join(TEMP_MDAT);

    let mut final_out = OutputFile::create(full_path)?;
    let mut moov_out = BufWriter::new(File::create(&moov_path)?);
    let mut mdat_out = BufWriter::new(File::create(&mdat_path)?);

    let mut found_ftyp = false;
    let mut found_moov = false;
    let mut found_mdat = false;

    let mut read_from = start;
    let mut carry: Vec<u8> = Vec::new();

    'read: while !(found_ftyp && found_moov && found_mdat) {
        if hooks.cancelled() {
            moov_out.flush()?;
            mdat_out.flush()?;
            final_out.abandon()?;
            return Ok(CarveOutcome::Cancelled);
        }

        let mut buf = vec![0u8; READ_CHUNK];
        let n = read_full(device, read_from, &mut buf)?;
        if n == 0 {
            break;
        }
        buf.truncate(n);
        read_from = read_from.saturating_add(buf.len() as u64);

        let mut window = std::mem::take(&mut carry);
        window.extend_from_slice(&buf);

        let mut i = 0usize;
        while i + BOX_HEADER_LEN <= window.len() {
            let box_type = &window[i + 4..i + 8];
            let kind = if box_type == b"ftyp" && !found_ftyp {
                BoxKind::Ftyp
            } else if box_type == b"moov" && !found_moov {
                BoxKind::Moov
            } else if box_type == b"mdat" && !found_mdat {
                BoxKind::Mdat
            } else {
                i += 1;
                continue;
            };

            let box_size =
                u32::from_be_bytes([window[i], window[i + 1], window[i + 2], window[i + 3]])
                    as u64;
            if !plausible_box_size(kind, box_size, descriptor.max_size) {
                i += 1;
                continue;
            }

            let available = window.len() - i;
            if box_size as usize <= available {
                write_box(
                    kind,
                    &window[i..i + box_size as usize],
                    &mut final_out,
                    &mut moov_out,
                    &mut mdat_out,
                )?;
                mark_found(kind, &mut found_ftyp, &mut found_moov, &mut found_mdat);
                i += box_size as usize;
            } else {
                // Box spans past this window: drain the tail, then stream
                // the remainder with sequential reads.
                write_box(
                    kind,
                    &window[i..],
                    &mut final_out,
                    &mut moov_out,
                    &mut mdat_out,
                )?;
                let mut remaining = box_size - available as u64;
                while remaining > 0 {
                    let want = remaining.min(READ_CHUNK as u64) as usize;
                    let mut span_buf = vec![0u8; want];
                    let got = read_full(device, read_from, &mut span_buf)?;
                    if got == 0 {
                        // Input exhausted mid-box; the box stays unfound.
                        break 'read;
                    }
                    span_buf.truncate(got);
                    read_from = read_from.saturating_add(got as u64);
                    write_box(
                        kind,
                        &span_buf,
                        &mut final_out,
                        &mut moov_out,
                        &mut mdat_out,
                    )?;
                    remaining -= got as u64;
                }
                mark_found(kind, &mut found_ftyp, &mut found_moov, &mut found_mdat);
                continue 'read;
            }
        }

        if window.len() >= HEADER_CARRY {
            carry = window[window.len() - HEADER_CARRY..].to_vec();
        } else {
            carry = window;
        }
    }

    moov_out.flush()?;
    mdat_out.flush()?;

    if !found_ftyp {
        final_out.discard()?;
        remove_temp_files(&moov_path, &mdat_path);
        return Ok(CarveOutcome::Discarded(DiscardReason::Incomplete));
    }

    drop(moov_out);
    drop(mdat_out);
    if found_moov {
        append_file(&mut final_out, &moov_path)?;
    }
    if found_mdat {
        append_file(&mut final_out, &mdat_path)?;
    }
    remove_temp_files(&moov_path, &mdat_path);

    let written = final_out.written();
    if written < descriptor.min_size || written > descriptor.max_size {
        final_out.discard()?;
        return Ok(CarveOutcome::Discarded(DiscardReason::OutOfBounds));
    }

    let path = final_out.path().to_path_buf();
    let (size, md5, sha256) = final_out.finish()?;
    Ok(CarveOutcome::Emitted(EmittedFile {
        path,
        rel_path,
        size,
        md5,
        sha256,
    }))
}

fn plausible_box_size(kind: BoxKind, box_size: u64, mdat_max: u64) -> bool {
    if box_size < BOX_HEADER_LEN as u64 {
        return false;
    }
    match kind {
        BoxKind::Ftyp | BoxKind::Moov => box_size <= FTYP_MOOV_MAX,
        BoxKind::Mdat => box_size <= mdat_max,
    }
}

fn write_box(
    kind: BoxKind,
    data: &[u8],
    final_out: &mut OutputFile,
    moov_out: &mut BufWriter<File>,
    mdat_out: &mut BufWriter<File>,
) -> Result<(), CarveError> {
    match kind {
        BoxKind::Ftyp => final_out.write(data),
        BoxKind::Moov => {
            moov_out.write_all(data)?;
            Ok(())
        }
        BoxKind::Mdat => {
            mdat_out.write_all(data)?;
            Ok(())
        }
    }
}

fn mark_found(kind: BoxKind, ftyp: &mut bool, moov: &mut bool, mdat: &mut bool) {
    match kind {
        BoxKind::Ftyp => *ftyp = true,
        BoxKind::Moov => *moov = true,
        BoxKind::Mdat => *mdat = true,
    }
}

fn append_file(out: &mut OutputFile, path: &Path) -> Result<(), CarveError> {
    let mut src = File::open(path)?;
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write(&buf[..n])?;
    }
    Ok(())
}

fn remove_temp_files(moov_path: &Path, mdat_path: &Path) {
    let _ = std::fs::remove_file(moov_path);
    let _ = std::fs::remove_file(mdat_path);
}
