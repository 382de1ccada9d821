//! ELF header and section table.
//!
//! All offsets stored here are relative to the start of the ELF image, which
//! is not the start of the file when the image is embedded in a container.

use crate::error::{MetaError, Result, slice};
use crate::util::Source;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use std::io::Read;

pub const MAGIC: &[u8; 4] = b"\x7fELF";

const SHT_NOBITS: u32 = 8;
const SHF_COMPRESSED: u64 = 0x800;
const ELFCOMPRESS_ZLIB: u32 = 1;
const SHN_XINDEX: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn u16(self, b: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(b),
            Endian::Big => BigEndian::read_u16(b),
        }
    }

    pub fn u32(self, b: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(b),
            Endian::Big => BigEndian::read_u32(b),
        }
    }

    pub fn u64(self, b: &[u8]) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_u64(b),
            Endian::Big => BigEndian::read_u64(b),
        }
    }

    /// Unsigned word of `size` bytes (4 or 8).
    pub fn word(self, b: &[u8], size: usize) -> u64 {
        if size == 8 { self.u64(b) } else { u64::from(self.u32(b)) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub typ: u32,
    pub flags: u64,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
}

impl Section {
    pub fn is_compressed(&self) -> bool {
        self.flags & SHF_COMPRESSED != 0 || self.name.starts_with(".zdebug")
    }
}

#[derive(Debug, Clone)]
pub struct Elf {
    /// File offset of the ELF header.
    pub base: u64,
    pub is_64: bool,
    pub endian: Endian,
    pub sections: Vec<Section>,
}

struct Layout {
    shoff: u64,
    shentsize: u64,
    shnum: u16,
    shstrndx: u16,
}

impl Elf {
    pub fn parse(src: &Source, base: u64, length: u64) -> Result<Self> {
        let ident = src.read_at(base, 16)?;
        if &ident[0..4] != MAGIC {
            return Err(MetaError::UnsupportedFormat("missing ELF magic".into()));
        }
        let is_64 = match ident[4] {
            1 => false,
            2 => true,
            c => return Err(MetaError::Corrupt(format!("invalid ELF class {c}"))),
        };
        let endian = match ident[5] {
            1 => Endian::Little,
            2 => Endian::Big,
            d => return Err(MetaError::Corrupt(format!("invalid ELF data encoding {d}"))),
        };
        let mut elf = Elf { base, is_64, endian, sections: Vec::new() };

        let header = src.read_at(base, if is_64 { 64 } else { 52 })?;
        let layout = if is_64 {
            Layout {
                shoff: endian.u64(&header[0x28..0x30]),
                shentsize: u64::from(endian.u16(&header[0x3A..0x3C])),
                shnum: endian.u16(&header[0x3C..0x3E]),
                shstrndx: endian.u16(&header[0x3E..0x40]),
            }
        } else {
            Layout {
                shoff: u64::from(endian.u32(&header[0x20..0x24])),
                shentsize: u64::from(endian.u16(&header[0x2E..0x30])),
                shnum: endian.u16(&header[0x30..0x32]),
                shstrndx: endian.u16(&header[0x32..0x34]),
            }
        };
        if layout.shoff == 0 {
            return Ok(elf);
        }
        let min_entsize = if is_64 { 64 } else { 40 };
        if layout.shentsize < min_entsize {
            return Err(MetaError::Corrupt(format!("section header entry size {}", layout.shentsize)));
        }

        let read_entry = |i: u64| -> Result<Vec<u8>> {
            let at = layout.shoff + i * layout.shentsize;
            if at + layout.shentsize > length {
                return Err(MetaError::Truncated { what: "ELF section header", offset: base + at });
            }
            src.read_at(base + at, layout.shentsize)
        };

        // Section 0 carries the real count and string table index when they
        // do not fit the header fields.
        let first = read_entry(0)?;
        let mut count = u64::from(layout.shnum);
        if count == 0 {
            count = if is_64 { endian.u64(&first[32..40]) } else { u64::from(endian.u32(&first[20..24])) };
        }
        let mut shstrndx = u64::from(layout.shstrndx);
        if layout.shstrndx == SHN_XINDEX {
            shstrndx = u64::from(endian.u32(if is_64 { &first[40..44] } else { &first[24..28] }));
        }

        let mut raw = Vec::with_capacity(count.min(4096) as usize);
        for i in 0..count {
            let e = read_entry(i)?;
            let name_off = endian.u32(&e[0..4]);
            let section = if is_64 {
                Section {
                    name: String::new(),
                    typ: endian.u32(&e[4..8]),
                    flags: endian.u64(&e[8..16]),
                    addr: endian.u64(&e[16..24]),
                    offset: endian.u64(&e[24..32]),
                    size: endian.u64(&e[32..40]),
                }
            } else {
                Section {
                    name: String::new(),
                    typ: endian.u32(&e[4..8]),
                    flags: u64::from(endian.u32(&e[8..12])),
                    addr: u64::from(endian.u32(&e[12..16])),
                    offset: u64::from(endian.u32(&e[16..20])),
                    size: u64::from(endian.u32(&e[20..24])),
                }
            };
            raw.push((name_off, section));
        }

        let names = match raw.get(shstrndx as usize) {
            Some((_, s)) if s.typ != SHT_NOBITS => elf.raw_data(src, s)?,
            _ => Vec::new(),
        };
        elf.sections = raw
            .into_iter()
            .map(|(off, mut s)| {
                s.name = c_string(&names, off as usize);
                s
            })
            .collect();
        tracing::debug!(count = elf.sections.len(), is_64, ?endian, "elf sections");
        Ok(elf)
    }

    pub fn ptr_size(&self) -> usize {
        if self.is_64 { 8 } else { 4 }
    }

    /// Section by name. A `.debug_*` lookup also matches the legacy
    /// `.zdebug_*` spelling.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name).or_else(|| {
            let legacy = name.strip_prefix(".debug_").map(|rest| format!(".zdebug_{rest}"))?;
            self.sections.iter().find(|s| s.name == legacy)
        })
    }

    /// Bytes as stored in the file. Empty for `SHT_NOBITS`.
    pub fn raw_data(&self, src: &Source, s: &Section) -> Result<Vec<u8>> {
        if s.typ == SHT_NOBITS {
            return Ok(Vec::new());
        }
        src.read_at(self.base + s.offset, s.size)
    }

    /// Section contents, inflated when stored compressed.
    pub fn data(&self, src: &Source, s: &Section) -> Result<Vec<u8>> {
        let raw = self.raw_data(src, s)?;
        if !s.is_compressed() {
            return Ok(raw);
        }
        let (stream, expected) = if s.flags & SHF_COMPRESSED != 0 {
            let (kind, size, header) = if self.is_64 {
                let h = slice(&raw, 0, 24, "compression header")?;
                (self.endian.u32(&h[0..4]), self.endian.u64(&h[8..16]), 24)
            } else {
                let h = slice(&raw, 0, 12, "compression header")?;
                (self.endian.u32(&h[0..4]), u64::from(self.endian.u32(&h[4..8])), 12)
            };
            if kind != ELFCOMPRESS_ZLIB {
                return Err(MetaError::UnsupportedFormat(format!("{} compressed with type {kind}", s.name)));
            }
            (&raw[header..], size)
        } else {
            let h = slice(&raw, 0, 12, "zdebug header")?;
            if &h[0..4] != b"ZLIB" {
                return Err(MetaError::Corrupt(format!("{} lacks ZLIB header", s.name)));
            }
            (&raw[12..], BigEndian::read_u64(&h[4..12]))
        };
        let mut out = Vec::with_capacity(expected.min(1 << 26) as usize);
        ZlibDecoder::new(stream)
            .read_to_end(&mut out)
            .map_err(|e| MetaError::Corrupt(format!("inflating {}: {e}", s.name)))?;
        tracing::trace!(section = %s.name, compressed = raw.len(), inflated = out.len(), "section inflated");
        Ok(out)
    }

    pub fn section_data(&self, src: &Source, name: &str) -> Result<Option<Vec<u8>>> {
        match self.section(name) {
            Some(s) => self.data(src, s).map(Some),
            None => Ok(None),
        }
    }
}

/// NUL-terminated string at `off`, empty when out of range.
pub fn c_string(buf: &[u8], off: usize) -> String {
    let Some(tail) = buf.get(off..) else {
        return String::new();
    };
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    String::from_utf8_lossy(&tail[..end]).into_owned()
}
