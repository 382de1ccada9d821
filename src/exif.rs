//! EXIF / TIFF image file directories.
//!
//! Offsets stored inside a TIFF stream are relative to the byte-order mark,
//! so callers pass the slice that starts there (after any `Exif\0\0` prefix).

use crate::error::{MetaError, Result, slice};
use crate::output::Output;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::collections::{BTreeMap, HashSet};

pub const EXIF_PREFIX: &[u8; 6] = b"Exif\0\0";

pub const TAG_EXIF_IFD_POINTER: u16 = 0x8769;
pub const TAG_COMPRESSION: u16 = 0x0103;
pub const TAG_THUMBNAIL_OFFSET: u16 = 0x0201;
pub const TAG_THUMBNAIL_LENGTH: u16 = 0x0202;

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_UTF8: u16 = 129;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u16(self, b: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(b),
            Endian::Big => BigEndian::read_u16(b),
        }
    }

    fn u32(self, b: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(b),
            Endian::Big => BigEndian::read_u32(b),
        }
    }
}

/// One directory: its offset inside the TIFF stream and its tag values
/// rendered as text.
///
/// Non-string values are rendered as the raw 32-bit value field, so a big
/// endian SHORT shows up shifted left by 16 bits. `shorts` keeps the decoded
/// value of every single SHORT for lookups that need it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ifd {
    pub start_offset: u32,
    pub tags: BTreeMap<u16, String>,
    pub shorts: BTreeMap<u16, u16>,
}

impl Ifd {
    pub fn get(&self, tag: u16) -> Option<&str> {
        self.tags.get(&tag).map(String::as_str)
    }

    /// Decoded value of a SHORT tag with count 1.
    pub fn short(&self, tag: u16) -> Option<u16> {
        self.shorts.get(&tag).copied()
    }
}

/// Drop the `Exif\0\0` marker if present.
pub fn strip_prefix(data: &[u8]) -> &[u8] {
    data.strip_prefix(EXIF_PREFIX.as_slice()).unwrap_or(data)
}

/// Walk the main IFD chain of a TIFF stream. Each main IFD is followed by the
/// child IFDs it links through the Exif pointer tag; children are not
/// followed any deeper.
pub fn parse_tiff(tiff: &[u8]) -> Result<Vec<Ifd>> {
    let header = slice(tiff, 0, 8, "TIFF header")?;
    let order = match &header[0..2] {
        b"II" => Endian::Little,
        b"MM" => Endian::Big,
        other => return Err(MetaError::Corrupt(format!("invalid TIFF byte order {:02x?}", other))),
    };
    let magic = order.u16(&header[2..4]);
    if magic != 0x002A {
        return Err(MetaError::Corrupt(format!("invalid TIFF magic 0x{magic:04x}")));
    }

    let mut result = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = order.u32(&header[4..8]);
    while offset != 0 && seen.insert(offset) {
        let (ifd, links, next) = parse_ifd(tiff, order, offset)?;
        result.push(ifd);
        for link in links {
            if seen.insert(link) {
                let (child, _, _) = parse_ifd(tiff, order, link)?;
                result.push(child);
            }
        }
        offset = next;
    }
    Ok(result)
}

fn parse_ifd(tiff: &[u8], order: Endian, offset: u32) -> Result<(Ifd, Vec<u32>, u32)> {
    let start = offset as usize;
    let count = order.u16(slice(tiff, start, start + 2, "IFD entry count")?) as usize;
    let entries = slice(tiff, start + 2, start + 2 + count * 12, "IFD entries")?;
    let next_at = start + 2 + count * 12;
    let next = order.u32(slice(tiff, next_at, next_at + 4, "next IFD offset")?);

    let mut ifd = Ifd { start_offset: offset, ..Ifd::default() };
    let mut links = Vec::new();
    for e in entries.chunks_exact(12) {
        let tag = order.u16(&e[0..2]);
        let typ = order.u16(&e[2..4]);
        let n = order.u32(&e[4..8]);
        let field = &e[8..12];
        let value = order.u32(field);

        if tag == TAG_EXIF_IFD_POINTER {
            links.push(value);
            continue;
        }
        let text = match typ {
            TYPE_ASCII | TYPE_UTF8 => {
                let bytes = if n <= 4 {
                    &field[..n as usize]
                } else {
                    let s = value as usize;
                    match tiff.get(s..s + n as usize) {
                        Some(b) => b,
                        None => {
                            tracing::debug!(tag, offset = value, "EXIF string outside stream");
                            continue;
                        }
                    }
                };
                let trimmed = match bytes.iter().rposition(|&b| b != 0) {
                    Some(last) => &bytes[..=last],
                    None => &[][..],
                };
                String::from_utf8_lossy(trimmed).into_owned()
            }
            _ => {
                if typ == TYPE_SHORT && n == 1 {
                    ifd.shorts.insert(tag, order.u16(&field[0..2]));
                }
                value.to_string()
            }
        };
        ifd.tags.insert(tag, text);
    }
    Ok((ifd, links, next))
}

pub fn print_ifds(out: &mut Output<'_>, ifds: &[Ifd]) -> std::io::Result<()> {
    for ifd in ifds {
        out.header(format!("EXIF IFD Offset 0x{:X}", ifd.start_offset))?;
        for (tag, value) in &ifd.tags {
            out.form(&format!("0x{tag:04X}"), value, 10)?;
        }
        out.blank()?;
    }
    Ok(())
}
