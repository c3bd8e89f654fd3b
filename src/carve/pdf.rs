//! PDF extraction with structural validation.
//!
//! Same end-marker walk as the generic extractor, plus sticky tracking of
//! the `xref` and `trailer` tokens. A candidate that reaches EOF without
//! `%%EOF` but saw both tokens gets the marker appended; a candidate whose
//! marker arrives before both tokens is structurally incomplete.

use std::path::Path;

use crate::carve::{
    find_pattern, output_path, CarveError, CarveOutcome, DiscardReason, EmittedFile, OutputFile,
};
use crate::device::{read_full, DeviceSource};
use crate::engine::HostHooks;
use crate::formats::FormatDescriptor;

const READ_CHUNK: usize = 4 * 1024;

const PDF_EOF: &[u8] = b"%%EOF";
const PDF_XREF: &[u8] = b"xref";
const PDF_TRAILER: &[u8] = b"trailer";

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

    // One less than the longest token scanned across chunk boundaries.
    let carry_len = PDF_TRAILER.len() - 1;

    let mut offset = start;
    let mut carry: Vec<u8> = Vec::new();
    let mut found_end = false;
    let mut xref_seen = false;
    let mut trailer_seen = false;

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

        let marker = find_pattern(&search_buf, PDF_EOF);

        // Tokens only count if they appear before or at the end marker.
        let token_window = match marker {
            Some(pos) => &search_buf[..pos + PDF_EOF.len()],
            None => &search_buf[..],
        };
        xref_seen = xref_seen || find_pattern(token_window, PDF_XREF).is_some();
        trailer_seen = trailer_seen || find_pattern(token_window, PDF_TRAILER).is_some();

        if let Some(pos) = marker {
            let write_len = (pos + PDF_EOF.len()).saturating_sub(carry.len()).min(buf.len());
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
        if search_buf.len() >= carry_len {
            carry = search_buf[search_buf.len() - carry_len..].to_vec();
        } else {
            carry = search_buf;
        }
    }

    // EOF reached with both tokens seen: synthesise the trailer marker.
    if !found_end && xref_seen && trailer_seen {
        out.write(PDF_EOF)?;
        found_end = true;
    }

    if !found_end || !xref_seen || !trailer_seen {
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
