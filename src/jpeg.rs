//! JPEG application segments (APP0..APP15).
//!
//! The walker follows the marker structure: segment lengths are skipped
//! rather than scanned, and after a start-of-scan the entropy-coded data is
//! searched for the next real marker, so stuffed `FF 00` bytes and restart
//! markers stay inside the data they belong to.

use crate::error::{MetaError, Result};
use crate::exif::{self, Ifd};
use crate::icc::{self, Profile};
use crate::registry::{Action, Context, FormatParser};
use crate::util::{Source, extraction_path, lossy, replace_file};
use anyhow::Context as _;

pub const MAGIC: &[u8; 3] = &[0xFF, 0xD8, 0xFF];

const XMP_NAMESPACE: &[u8] = b"http://ns.adobe.com/xap/1.0/";
const XMP_EXTENSION_NAMESPACE: &[u8] = b"http://ns.adobe.com/xmp/extension/";
const EXIF_TIFF_START: usize = 10;
const ENTROPY_BLOCK: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSegment {
    pub start_offset: u64,
    pub marker: [u8; 2],
    /// Length field value; counts itself but not the marker.
    pub length: u16,
    /// Marker, length and payload.
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind<'a> {
    Jfif { thumbnail: bool },
    Jfxx,
    Exif,
    Xmp(&'a [u8]),
    ExtendedXmp(&'a [u8]),
    Icc { sequence: u8, body: &'a [u8] },
    Unsupported,
}

impl AppSegment {
    /// Bytes removed when the segment is dropped from the file.
    pub fn end_offset(&self) -> u64 {
        self.start_offset + u64::from(self.length) + 2
    }

    fn has(&self, at: usize, prefix: &[u8]) -> bool {
        self.raw.get(at..at + prefix.len()) == Some(prefix)
    }

    pub fn kind(&self) -> SegmentKind<'_> {
        match self.marker[1] {
            0xE0 if self.has(4, b"JFIF") => {
                let thumbnail = self.raw.get(16).is_some_and(|&w| w > 0) && self.raw.get(17).is_some_and(|&h| h > 0);
                SegmentKind::Jfif { thumbnail }
            }
            0xE0 if self.has(4, b"JFXX") => SegmentKind::Jfxx,
            0xE1 if self.has(4, exif::EXIF_PREFIX) => SegmentKind::Exif,
            0xE1 if self.has(4, XMP_NAMESPACE) => SegmentKind::Xmp(self.raw.get(33..).unwrap_or_default()),
            0xE1 if self.has(4, XMP_EXTENSION_NAMESPACE) => {
                SegmentKind::ExtendedXmp(self.raw.get(79..).unwrap_or_default())
            }
            0xE2 if self.has(4, b"ICC_PROFILE") && self.raw.len() >= 18 => SegmentKind::Icc {
                sequence: self.raw[16],
                body: &self.raw[18..],
            },
            _ => SegmentKind::Unsupported,
        }
    }

    /// IFDs of an EXIF segment. The TIFF stream starts after `Exif\0\0`.
    pub fn ifds(&self) -> Result<Vec<Ifd>> {
        exif::parse_tiff(self.raw.get(EXIF_TIFF_START..).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct JpegMetadata {
    pub jfif_thumbnail: bool,
    pub jfxx_thumbnail: bool,
    pub ifds: Vec<Ifd>,
    pub icc: Option<Profile>,
    pub xmp: Vec<String>,
    pub unsupported: Vec<AppSegment>,
}

/// Application segments in file order, up to end of image.
pub fn application_segments(src: &Source, offset: u64, length: u64) -> Result<Vec<AppSegment>> {
    let end = offset + length;
    let mut at = offset + 2;
    let mut result = Vec::new();
    while at + 2 <= end {
        let m = src.read_at(at, 2)?;
        if m[0] != 0xFF {
            match next_fill_byte(src, at, end)? {
                Some(found) => {
                    tracing::debug!(offset = at, skipped = found - at, "skipping bytes before JPEG marker");
                    at = found;
                    continue;
                }
                None => break,
            }
        }
        match m[1] {
            0xFF => {
                at += 1;
                continue;
            }
            0xD9 => break,
            0x01 | 0xD0..=0xD7 => {
                at += 2;
                continue;
            }
            _ => {}
        }
        if at + 4 > end {
            return Err(MetaError::Truncated { what: "JPEG segment length", offset: at });
        }
        let len_bytes = src.read_at(at + 2, 2)?;
        let seg_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]);
        if seg_len < 2 || at + 2 + u64::from(seg_len) > end {
            return Err(MetaError::Truncated { what: "JPEG segment", offset: at });
        }
        let next = at + 2 + u64::from(seg_len);
        if (0xE0..=0xEF).contains(&m[1]) {
            tracing::trace!(offset = at, marker = format!("FF{:02X}", m[1]), len = seg_len, "jpeg app segment");
            result.push(AppSegment {
                start_offset: at,
                marker: [m[0], m[1]],
                length: seg_len,
                raw: src.read_at(at, 2 + u64::from(seg_len))?,
            });
        }
        at = next;
        if m[1] == 0xDA {
            match next_marker(src, at, end)? {
                Some(found) => at = found,
                None => break,
            }
        }
    }
    Ok(result)
}

/// Offset of the next 0xFF byte at or after `at`.
fn next_fill_byte(src: &Source, mut at: u64, end: u64) -> Result<Option<u64>> {
    while at < end {
        let buf = src.read_prefix(at, ENTROPY_BLOCK.min(end - at))?;
        if buf.is_empty() {
            break;
        }
        if let Some(i) = buf.iter().position(|&b| b == 0xFF) {
            return Ok(Some(at + i as u64));
        }
        at += buf.len() as u64;
    }
    Ok(None)
}

/// Offset of the first marker after entropy-coded data, if any.
fn next_marker(src: &Source, mut at: u64, end: u64) -> Result<Option<u64>> {
    while at + 1 < end {
        let buf = src.read_prefix(at, ENTROPY_BLOCK.min(end - at))?;
        if buf.len() < 2 {
            break;
        }
        for i in 0..buf.len() - 1 {
            if buf[i] != 0xFF {
                continue;
            }
            let n = buf[i + 1];
            if n != 0x00 && n != 0xFF && !(0xD0..=0xD7).contains(&n) {
                return Ok(Some(at + i as u64));
            }
        }
        at += (buf.len() - 1) as u64;
    }
    Ok(None)
}

pub fn parse_metadata(segments: &[AppSegment]) -> Result<JpegMetadata> {
    let mut meta = JpegMetadata::default();
    let mut icc_parts: Vec<(u8, &[u8])> = Vec::new();
    for s in segments {
        match s.kind() {
            SegmentKind::Jfif { thumbnail } => meta.jfif_thumbnail = thumbnail,
            SegmentKind::Jfxx => meta.jfxx_thumbnail = true,
            SegmentKind::Exif => meta.ifds = s.ifds()?,
            SegmentKind::Xmp(body) | SegmentKind::ExtendedXmp(body) => meta.xmp.push(lossy(body)),
            SegmentKind::Icc { sequence, body } => icc_parts.push((sequence, body)),
            SegmentKind::Unsupported => meta.unsupported.push(s.clone()),
        }
    }
    if !icc_parts.is_empty() {
        icc_parts.sort_by_key(|(seq, _)| *seq);
        let profile: Vec<u8> = icc_parts.iter().flat_map(|(_, b)| b.iter().copied()).collect();
        meta.icc = Some(icc::parse(&profile)?);
    }
    Ok(meta)
}

/// Compressed thumbnail stored in IFD1 of the EXIF segment.
pub fn thumbnail(segments: &[AppSegment]) -> Result<Option<Vec<u8>>> {
    let Some(segment) = segments.iter().find(|s| s.kind() == SegmentKind::Exif) else {
        return Ok(None);
    };
    for ifd in segment.ifds()? {
        if ifd.short(exif::TAG_COMPRESSION) != Some(6) {
            continue;
        }
        let (Some(off), Some(len)) = (ifd.get(exif::TAG_THUMBNAIL_OFFSET), ifd.get(exif::TAG_THUMBNAIL_LENGTH))
        else {
            continue;
        };
        let off: usize = off
            .parse()
            .map_err(|_| MetaError::Corrupt(format!("invalid thumbnail offset [{off}]")))?;
        let len: usize = len
            .parse()
            .map_err(|_| MetaError::Corrupt(format!("invalid thumbnail size [{len}]")))?;
        let start = EXIF_TIFF_START + off;
        return match segment.raw.get(start..start + len) {
            Some(b) => Ok(Some(b.to_vec())),
            None => Err(MetaError::Truncated { what: "EXIF thumbnail", offset: segment.start_offset + start as u64 }),
        };
    }
    Ok(None)
}

/// Rewrite the file without the given segments.
pub fn remove_segments(src: &Source, segments: &[AppSegment]) -> anyhow::Result<()> {
    replace_file(src.path(), |w| {
        let mut at = 0u64;
        for s in segments {
            src.copy_range(at, s.start_offset - at, w)?;
            at = s.end_offset();
        }
        src.copy_range(at, src.size() - at, w)?;
        Ok(())
    })
}

pub struct JpegParser;

impl FormatParser for JpegParser {
    fn name(&self) -> &'static str {
        "JPEG"
    }

    fn supports(&self, src: &Source, offset: u64, _length: u64) -> Result<bool> {
        Ok(src.read_prefix(offset, 3)? == MAGIC)
    }

    fn handle(
        &self,
        ctx: &mut Context<'_>,
        src: &Source,
        action: Action,
        offset: u64,
        length: u64,
    ) -> anyhow::Result<()> {
        let segments = application_segments(src, offset, length).context("walking JPEG segments")?;
        match action {
            Action::Show => {
                let meta = parse_metadata(&segments).context("decoding JPEG application segments")?;
                show(ctx, &meta)?;
            }
            Action::Clear => {
                if segments.is_empty() {
                    ctx.out.line("There is no application segments to remove!")?;
                    return Ok(());
                }
                remove_segments(src, &segments)?;
                ctx.out.line("Application segments has been removed!")?;
            }
            Action::Extract => {
                let Some(data) = thumbnail(&segments).context("extracting thumbnail")? else {
                    ctx.out.line("No thumbnail to extract")?;
                    return Ok(());
                };
                let path = extraction_path(&ctx.config.output_dir, src.path(), "_thumbnail.jpeg")
                    .context("creating output directory")?;
                std::fs::write(&path, &data).with_context(|| format!("writing {}", path.display()))?;
                tracing::debug!(path = %path.display(), bytes = data.len(), "thumbnail written");
                ctx.out.line(format!("Thumbnail has been extracted to {}", path.display()))?;
            }
        }
        Ok(())
    }
}

fn show(ctx: &mut Context<'_>, meta: &JpegMetadata) -> std::io::Result<()> {
    let out = &mut ctx.out;
    out.header("JFIF Segments")?;
    out.form("Has JFIF Thumbnail", meta.jfif_thumbnail, 20)?;
    out.form("Has JFXX Thumbnail", meta.jfxx_thumbnail, 20)?;
    out.blank()?;

    exif::print_ifds(out, &meta.ifds)?;

    if !meta.xmp.is_empty() {
        out.header("XMP")?;
        for x in &meta.xmp {
            out.multiline(x)?;
            out.blank()?;
        }
    }

    for s in &meta.unsupported {
        out.header(format!("Application Segment 0x{:02X}{:02X}", s.marker[0], s.marker[1]))?;
        out.hex(&s.raw)?;
        out.blank()?;
    }

    if let Some(p) = &meta.icc {
        icc::print_profile(out, p)?;
        out.blank()?;
    }
    Ok(())
}
