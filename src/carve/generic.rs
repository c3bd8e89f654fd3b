//! End-marker-bounded extraction.
//!
//! Formats with an explicit end marker are copied from the start signature
//! through the first occurrence of the marker, inclusive. Formats without
//! one (DOC, DOCX, EXE, ELF) are cut at the next start signature of any
//! primary format, with the matched signature bytes included in the output
//! as the original tool wrote them.

use std::path::Path;

use crate::carve::{
    find_pattern, output_path, CarveError, CarveOutcome, DiscardReason, EmittedFile, OutputFile,
};
use crate::device::{read_full, DeviceSource};
use crate::engine::HostHooks;
use crate::formats::{signature_matches, FormatDescriptor, PRIMARY_FORMAT_COUNT};

const READ_CHUNK: usize = 4 * 1024;

/// Longest primary start signature; the inferred-end scan carries one byte
/// less across chunk boundaries.
const MAX_PRIMARY_SIG: usize = 8;

pub fn extract(
    device: &dyn DeviceSource,
    descriptor: &FormatDescriptor,
    start: u64,
    index: u32,
    output_root: &Path,
    hooks: &mut HostHooks,
) -> Result<CarveOutcome, CarveError> {
    let (full_path, rel_path) = output_path(output_root, descriptor, index)?;
    let mut out = OutputFile::create(full_path)?;

    let carry_len = match descriptor.end_marker {
        Some(marker) => marker.len().saturating_sub(1),
        None => MAX_PRIMARY_SIG - 1,
    };

    let mut offset = start;
    let mut carry: Vec<u8> = Vec::new();
    let mut found_end = false;

    loop {
        if hooks.cancelled() {
            out.abandon()?;
            return Ok(CarveOutcome::Cancelled);
        }

        let mut buf = vec![0u8; READ_CHUNK];
        let n = read_full(device, offset, &mut buf)?;
        if n == 0 {
            break;
        }
        buf.truncate(n);

        let mut search_buf = Vec::with_capacity(carry.len() + buf.len());
        search_buf.extend_from_slice(&carry);
        search_buf.extend_from_slice(&buf);

        let hit = match descriptor.end_marker {
            Some(marker) => find_pattern(&search_buf, marker).map(|pos| (pos, marker.len())),
            None => find_next_signature(&search_buf),
        };

        if let Some((pos, marker_len)) = hit {
            // The carry bytes were written with the previous chunk; only the
            // tail of the marker falls in this one.
            let write_len = (pos + marker_len).saturating_sub(carry.len()).min(buf.len());
            if write_len > 0 {
                out.write(&buf[..write_len])?;
            }
            found_end = true;
        } else {
            out.write(&buf)?;
        }

        if out.written() > descriptor.max_size {
            out.discard()?;
            return Ok(CarveOutcome::Discarded(DiscardReason::OutOfBounds));
        }
        if found_end {
            break;
        }

        offset = offset.saturating_add(buf.len() as u64);
        if carry_len > 0 && search_buf.len() >= carry_len {
            carry = search_buf[search_buf.len() - carry_len..].to_vec();
        } else {
            carry = search_buf;
        }
    }

    if !found_end {
        out.discard()?;
        return Ok(CarveOutcome::Discarded(DiscardReason::Incomplete));
    }

    let written = out.written();
    if written < descriptor.min_size || written > descriptor.max_size {
        out.discard()?;
        return Ok(CarveOutcome::Discarded(DiscardReason::OutOfBounds));
    }

    let path = out.path().to_path_buf();
    let (size, md5, sha256) = out.finish()?;
    Ok(CarveOutcome::Emitted(EmittedFile {
        path,
        rel_path,
        size,
        md5,
        sha256,
    }))
}

/// Next primary-format start signature in the buffer, returned with its
/// length so the cut includes the signature bytes. The scan is
/// format-major: a lower catalog index matching anywhere in the window
/// wins over a later index at an earlier byte offset.
fn find_next_signature(buffer: &[u8]) -> Option<(usize, usize)> {
    for format_idx in 0..PRIMARY_FORMAT_COUNT {
        let len = crate::formats::CATALOG[format_idx].start_signature.len();
        for pos in 0..buffer.len() {
            if signature_matches(buffer, pos, format_idx) {
                return Some((pos, len));
            }
        }
    }
    None
}
