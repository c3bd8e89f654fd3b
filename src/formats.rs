//! Static format catalog and signature matching.
//!
//! Each supported format is a flat table entry with an extractor
//! discriminator; the controller selects the extraction path by value.
//! Two signatures carry extra rules beyond a literal byte compare: JPEG
//! requires the high nibble of the byte after `FF D8 FF` to be `0xE`, and
//! the MP4 signature treats its first four bytes (the box size) as a
//! wildcard.

pub const FMT_PNG: usize = 0;
pub const FMT_JPEG: usize = 1;
pub const FMT_PDF: usize = 2;
pub const FMT_ZIP: usize = 3;
pub const FMT_MP3: usize = 4;
pub const FMT_DOC: usize = 5;
pub const FMT_DOCX: usize = 6;
pub const FMT_MP4: usize = 7;
pub const FMT_EXE: usize = 8;
pub const FMT_ELF: usize = 9;

/// Formats dispatched by the principal scan loop when the host mask does not
/// extend further.
pub const PRIMARY_FORMAT_COUNT: usize = 5;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    Generic,
    Pdf,
    Mp3,
    Mp4,
}

#[derive(Debug, Clone, Copy)]
pub struct FormatDescriptor {
    /// Label used for the output subdirectory and report lines.
    pub name: &'static str,
    pub extension: &'static str,
    /// Output file stem; the original tool lower-camels the MP3 one.
    pub file_stem: &'static str,
    pub start_signature: &'static [u8],
    /// `None` means the end is inferred from the next start signature.
    pub end_marker: Option<&'static [u8]>,
    pub min_size: u64,
    pub max_size: u64,
    pub kind: ExtractorKind,
}

const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const PNG_IEND: &[u8] = &[
    0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];
const JPEG_EOI: &[u8] = &[0xFF, 0xD9];
const PDF_SIGNATURE: &[u8] = b"%PDF-";
const PDF_EOF: &[u8] = b"%%EOF";
const ZIP_SIGNATURE: &[u8] = &[0x50, 0x4B, 0x03, 0x04];
const ZIP_EOCD: &[u8] = &[0x50, 0x4B, 0x05, 0x06];
const MP3_SYNC: &[u8] = &[0xFF, 0xE0];
const DOC_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const MP4_FTYP: &[u8] = &[0x00, 0x00, 0x00, 0x00, 0x66, 0x74, 0x79, 0x70];
const EXE_SIGNATURE: &[u8] = &[0x4D, 0x5A];
const ELF_SIGNATURE: &[u8] = &[0x7F, 0x45, 0x4C, 0x46];

pub static CATALOG: [FormatDescriptor; 10] = [
    FormatDescriptor {
        name: "PNG",
        extension: "png",
        file_stem: "RecoveredFile",
        start_signature: PNG_SIGNATURE,
        end_marker: Some(PNG_IEND),
        min_size: KIB,
        max_size: 20 * MIB,
        kind: ExtractorKind::Generic,
    },
    FormatDescriptor {
        name: "JPEG",
        extension: "jpg",
        file_stem: "RecoveredFile",
        start_signature: JPEG_SIGNATURE,
        end_marker: Some(JPEG_EOI),
        min_size: KIB,
        max_size: 20 * MIB,
        kind: ExtractorKind::Generic,
    },
    FormatDescriptor {
        name: "PDF",
        extension: "pdf",
        file_stem: "RecoveredFile",
        start_signature: PDF_SIGNATURE,
        end_marker: Some(PDF_EOF),
        min_size: KIB,
        max_size: 50 * MIB,
        kind: ExtractorKind::Pdf,
    },
    FormatDescriptor {
        name: "ZIP",
        extension: "zip",
        file_stem: "RecoveredFile",
        start_signature: ZIP_SIGNATURE,
        end_marker: Some(ZIP_EOCD),
        min_size: KIB,
        max_size: 100 * MIB,
        kind: ExtractorKind::Generic,
    },
    FormatDescriptor {
        name: "MP3",
        extension: "mp3",
        file_stem: "recoveredFile",
        start_signature: MP3_SYNC,
        end_marker: None,
        min_size: 20 * KIB,
        max_size: 20 * MIB,
        kind: ExtractorKind::Mp3,
    },
    FormatDescriptor {
        name: "DOC",
        extension: "doc",
        file_stem: "RecoveredFile",
        start_signature: DOC_SIGNATURE,
        end_marker: None,
        min_size: KIB,
        max_size: 50 * MIB,
        kind: ExtractorKind::Generic,
    },
    FormatDescriptor {
        name: "DOCX",
        extension: "docx",
        file_stem: "RecoveredFile",
        start_signature: ZIP_SIGNATURE,
        end_marker: None,
        min_size: KIB,
        max_size: 50 * MIB,
        kind: ExtractorKind::Generic,
    },
    FormatDescriptor {
        name: "MP4",
        extension: "mp4",
        file_stem: "RecoveredFile",
        start_signature: MP4_FTYP,
        end_marker: None,
        min_size: KIB,
        max_size: 500 * MIB,
        kind: ExtractorKind::Mp4,
    },
    FormatDescriptor {
        name: "EXE",
        extension: "exe",
        file_stem: "RecoveredFile",
        start_signature: EXE_SIGNATURE,
        end_marker: None,
        min_size: KIB,
        max_size: 50 * MIB,
        kind: ExtractorKind::Generic,
    },
    FormatDescriptor {
        name: "ELF",
        extension: "elf",
        file_stem: "RecoveredFile",
        start_signature: ELF_SIGNATURE,
        end_marker: None,
        min_size: KIB,
        max_size: 50 * MIB,
        kind: ExtractorKind::Generic,
    },
];

/// Literal signature match at `pos`, with the per-format extra rules.
pub fn signature_matches(buffer: &[u8], pos: usize, format_idx: usize) -> bool {
    let descriptor = &CATALOG[format_idx];
    let signature = descriptor.start_signature;
    if pos + signature.len() > buffer.len() {
        return false;
    }
    if format_idx == FMT_MP4 {
        // The first four bytes are the box size; only the type is literal.
        return &buffer[pos + 4..pos + 8] == &signature[4..8];
    }
    if buffer[pos..pos + signature.len()] != signature[..] {
        return false;
    }
    if format_idx == FMT_JPEG {
        // The byte after FF D8 FF selects the APPn family.
        return pos + 4 <= buffer.len() && (buffer[pos + 3] & 0xF0) == 0xE0;
    }
    true
}

/// Translate format names into a catalog-ordered enable mask. Unknown names
/// are returned for the caller to report.
pub fn mask_from_names<S: AsRef<str>>(names: &[S]) -> (Vec<bool>, Vec<String>) {
    let mut mask = vec![false; CATALOG.len()];
    let mut unknown = Vec::new();
    for name in names {
        let name = name.as_ref();
        match CATALOG
            .iter()
            .position(|d| d.name.eq_ignore_ascii_case(name.trim()))
        {
            Some(idx) => mask[idx] = true,
            None => unknown.push(name.trim().to_string()),
        }
    }
    (mask, unknown)
}
