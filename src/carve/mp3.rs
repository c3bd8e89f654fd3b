//! MPEG audio frame walking.
//!
//! A candidate start is only trusted after ten follow-up frame headers are
//! located at the stride of the first frame, each within a bounded gap
//! budget; that suppresses the random `FF Ex` byte pairs a raw device is
//! full of. Extraction then walks frames one by one, writing only frames
//! that agree with the first confirmed frame under the configured match
//! flags, and tolerating up to `max_gap_bytes` of non-frame data between
//! frames.

use std::path::Path;

use crate::carve::{
    output_path, CarveError, CarveOutcome, DiscardReason, EmittedFile, OutputFile,
};
use crate::config::Mp3Options;
use crate::device::{read_full, DeviceSource};
use crate::engine::HostHooks;
use crate::formats::FormatDescriptor;

const READ_CHUNK: usize = 4 * 1024;

/// Frame headers are 4 bytes; carrying 3 keeps one intact across reads.
const HEADER_CARRY: usize = 3;

/// Follow-up headers required to confirm a candidate start.
const CONFIRMATION_PROBES: usize = 10;

/// Hard ceiling on extracted bytes; the post-filter applies the catalog
/// maximum afterwards.
const EXTRACTION_CEILING: u64 = 50 * 1024 * 1024;

/// Bitrates in kbps, keyed by `[mpeg_family][layer - 1][bitrate_index]`
/// where family 0 is MPEG 1 and family 1 covers MPEG 2 and 2.5.
const BITRATE_TABLE: [[[u32; 16]; 3]; 2] = [
    [
        [
            0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0,
        ],
        [
            0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0,
        ],
        [
            0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0,
        ],
    ],
    [
        [
            0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0,
        ],
        [
            0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0,
        ],
        [
            0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0,
        ],
    ],
];

/// Sample rates in Hz keyed by the raw 2-bit version id (0 = MPEG 2.5,
/// 1 = reserved, 2 = MPEG 2, 3 = MPEG 1).
const SAMPLING_RATE_TABLE: [[u32; 4]; 4] = [
    [11025, 12000, 8000, 0],
    [0, 0, 0, 0],
    [22050, 24000, 16000, 0],
    [44100, 48000, 32000, 0],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_size: usize,
    /// MPEG version family: 1 for MPEG 1, 2 for MPEG 2 and 2.5.
    pub mpeg_version: u8,
    /// Layer number 1..=3.
    pub layer: u8,
    pub bitrate_bps: u32,
    pub sample_rate_hz: u32,
}

/// Decode a 4-byte MPEG audio frame header. Returns `None` for anything
/// that is not a plausible frame: bad sync, reserved version or layer,
/// free-format or bad bitrate index, reserved sample-rate index.
pub fn parse_frame_header(data: &[u8]) -> Option<FrameHeader> {
    if data.len() < 4 {
        return None;
    }
    if data[0] != 0xFF || (data[1] & 0xE0) != 0xE0 {
        return None;
    }

    let version_id = (data[1] >> 3) & 0x03;
    let layer_id = (data[1] >> 1) & 0x03;
    let bitrate_index = (data[2] >> 4) & 0x0F;
    let sampling_rate_index = (data[2] >> 2) & 0x03;
    let padding_bit = ((data[2] >> 1) & 0x01) as u32;

    if version_id == 1
        || layer_id == 0
        || bitrate_index == 0
        || bitrate_index == 15
        || sampling_rate_index == 3
    {
        return None;
    }

    let mpeg_version: u8 = if version_id == 3 { 1 } else { 2 };
    let layer: u8 = match layer_id {
        1 => 3,
        2 => 2,
        _ => 1,
    };

    let family = if mpeg_version == 1 { 0 } else { 1 };
    let bitrate_bps =
        BITRATE_TABLE[family][(layer - 1) as usize][bitrate_index as usize] * 1000;
    let sample_rate_hz =
        SAMPLING_RATE_TABLE[version_id as usize][sampling_rate_index as usize];
    if bitrate_bps == 0 || sample_rate_hz == 0 {
        return None;
    }

    // Layer I counts in 4-byte slots with the padding inside the flooring;
    // Layers II/III add the padding byte after the floor.
    let frame_size = if layer == 1 {
        ((12 * bitrate_bps / sample_rate_hz + padding_bit) * 4) as usize
    } else {
        (144 * bitrate_bps / sample_rate_hz + padding_bit) as usize
    };
    if frame_size == 0 {
        return None;
    }

    Some(FrameHeader {
        frame_size,
        mpeg_version,
        layer,
        bitrate_bps,
        sample_rate_hz,
    })
}

fn matches_first_frame(frame: &FrameHeader, first: &FrameHeader, opts: &Mp3Options) -> bool {
    if opts.match_frame_size && frame.frame_size != first.frame_size {
        return false;
    }
    if opts.match_version && frame.mpeg_version != first.mpeg_version {
        return false;
    }
    if opts.match_layer && frame.layer != first.layer {
        return false;
    }
    if opts.match_bitrate && frame.bitrate_bps != first.bitrate_bps {
        return false;
    }
    if opts.match_sampling_rate && frame.sample_rate_hz != first.sample_rate_hz {
        return false;
    }
    true
}

/// Ten-probe structural confirmation of a candidate frame start.
///
/// Each probe looks for a valid header near `pos + frame_size * i`,
/// scanning forward one byte at a time within the gap budget. A probe that
/// exhausts its budget rejects the candidate; a probe that runs off the end
/// of the window is inconclusive and does not.
pub fn confirms_frame_run(buffer: &[u8], pos: usize, opts: &Mp3Options) -> bool {
    let first = match parse_frame_header(&buffer[pos..]) {
        Some(header) => header,
        None => return false,
    };
    let stride = first.frame_size;

    for probe in 1..=CONFIRMATION_PROBES {
        let target = pos + stride * probe;
        let mut gap = 0usize;
        let mut found = false;
        while gap < opts.max_gap_bytes && target + gap + 4 <= buffer.len() {
            if parse_frame_header(&buffer[target + gap..]).is_some() {
                found = true;
                break;
            }
            gap += 1;
        }
        if !found && gap >= opts.max_gap_bytes {
            return false;
        }
    }
    true
}

/// Walk frames from `start` and emit a single track. Returns the absolute
/// offset reached (the controller's new MP3 floor) together with the
/// outcome.
pub fn extract(
    device: &dyn DeviceSource,
    descriptor: &FormatDescriptor,
    start: u64,
    index: u32,
    output_root: &Path,
    opts: &Mp3Options,
    hooks: &mut HostHooks,
) -> Result<(u64, CarveOutcome), CarveError> {
    let (full_path, rel_path) = output_path(output_root, descriptor, index)?;
    let mut out = OutputFile::create(full_path)?;

    let mut reached = start;
    let mut read_from = start;
    let mut carry: Vec<u8> = Vec::new();
    let mut gap_count = 0usize;
    let mut first_frame: Option<FrameHeader> = None;
    let mut done = false;

    while !done {
        if hooks.cancelled() {
            out.abandon()?;
            return Ok((reached, CarveOutcome::Cancelled));
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

        let mut pos = 0usize;
        while pos + 4 <= window.len() {
            let header = parse_frame_header(&window[pos..]);

            if first_frame.is_none() {
                if let Some(candidate) = header {
                    if confirms_frame_run(&window, pos, opts) {
                        first_frame = Some(candidate);
                    }
                }
            }

            let writable = match (header, first_frame) {
                (Some(frame), Some(first)) => {
                    matches_first_frame(&frame, &first, opts)
                        && pos + frame.frame_size <= window.len()
                }
                _ => false,
            };

            if writable {
                let frame = header.expect("writable implies parsed header");
                out.write(&window[pos..pos + frame.frame_size])?;
                reached = reached.saturating_add(frame.frame_size as u64);
                pos += frame.frame_size;
                gap_count = 0;
            } else {
                gap_count += 1;
                if gap_count > opts.max_gap_bytes {
                    done = true;
                    break;
                }
                reached = reached.saturating_add(1);
                pos += 1;
            }

            if out.written() > EXTRACTION_CEILING {
                done = true;
                break;
            }
        }

        if !done {
            // Unconsumed tail (at most HEADER_CARRY bytes) rides into the
            // next window so a header is never split.
            debug_assert!(window.len() - pos <= HEADER_CARRY || window.len() < 4);
            carry = window[pos..].to_vec();
        }
    }

    let written = out.written();
    if written < descriptor.min_size || written > descriptor.max_size {
        out.discard()?;
        return Ok((reached, CarveOutcome::Discarded(DiscardReason::OutOfBounds)));
    }

    let path = out.path().to_path_buf();
    let (size, md5, sha256) = out.finish()?;
    Ok((
        reached,
        CarveOutcome::Emitted(EmittedFile {
            path,
            rel_path,
            size,
            md5,
            sha256,
        }),
    ))
}
