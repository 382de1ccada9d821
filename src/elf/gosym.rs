//! Source file table of the Go runtime's `.gopclntab`.

use super::sections::{Elf, Endian, c_string};
use crate::error::{MetaError, Result, slice};
use crate::util::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PclnVersion {
    Go12,
    Go116,
    Go118,
    Go120,
}

impl PclnVersion {
    fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            0xFFFF_FFFB => Some(Self::Go12),
            0xFFFF_FFFA => Some(Self::Go116),
            0xFFFF_FFF0 => Some(Self::Go118),
            0xFFFF_FFF1 => Some(Self::Go120),
            _ => None,
        }
    }
}

/// Parsed `.gopclntab` header.
#[derive(Debug)]
pub struct LineTable<'a> {
    pub version: PclnVersion,
    pub endian: Endian,
    pub ptr_size: usize,
    data: &'a [u8],
}

impl<'a> LineTable<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let head = slice(data, 0, 8, "pclntab header")?;
        let (version, endian) = [Endian::Little, Endian::Big]
            .into_iter()
            .find_map(|e| PclnVersion::from_magic(e.u32(&head[0..4])).map(|v| (v, e)))
            .ok_or_else(|| MetaError::UnsupportedFormat("unknown pclntab magic".into()))?;
        if head[4] != 0 || head[5] != 0 {
            return Err(MetaError::Corrupt("pclntab header padding is not zero".into()));
        }
        let ptr_size = head[7] as usize;
        if ptr_size != 4 && ptr_size != 8 {
            return Err(MetaError::Corrupt(format!("pclntab pointer size {ptr_size}")));
        }
        Ok(Self { version, endian, ptr_size, data })
    }

    /// Header word `i` of the Go 1.16+ layouts.
    fn word(&self, i: usize) -> Result<u64> {
        let at = 8 + i * self.ptr_size;
        Ok(self.endian.word(slice(self.data, at, at + self.ptr_size, "pclntab header word")?, self.ptr_size))
    }

    fn u32_at(&self, at: usize) -> Result<u32> {
        Ok(self.endian.u32(slice(self.data, at, at + 4, "pclntab")?))
    }

    /// Every file name referenced by the table, in table order.
    pub fn files(&self) -> Result<Vec<String>> {
        match self.version {
            PclnVersion::Go12 => {
                let nfunctab = self.endian.word(slice(self.data, 8, 8 + self.ptr_size, "nfunctab")?, self.ptr_size);
                let functab = 8 + self.ptr_size;
                let end_of_functab = usize::try_from(nfunctab)
                    .ok()
                    .and_then(|n| n.checked_mul(2))
                    .and_then(|n| n.checked_add(1))
                    .and_then(|n| n.checked_mul(self.ptr_size))
                    .and_then(|n| n.checked_add(functab))
                    .ok_or_else(|| MetaError::Corrupt("pclntab function table overflows".into()))?;
                let filetab = self.u32_at(end_of_functab)? as usize;
                let nfiles = self.u32_at(filetab)? as usize;
                let mut files = Vec::with_capacity(nfiles.min(1 << 16));
                for i in 1..nfiles {
                    let off = self.u32_at(filetab + 4 * i)?;
                    files.push(c_string(self.data, off as usize));
                }
                Ok(files)
            }
            PclnVersion::Go116 | PclnVersion::Go118 | PclnVersion::Go120 => {
                let nfiles = self.word(1)?;
                let filetab = if self.version == PclnVersion::Go116 { self.word(4)? } else { self.word(5)? };
                let mut at = usize::try_from(filetab)
                    .map_err(|_| MetaError::Corrupt("pclntab file table offset".into()))?;
                let mut files = Vec::with_capacity(nfiles.min(1 << 16) as usize);
                for _ in 0..nfiles {
                    let tail = self.data.get(at..).ok_or(MetaError::Truncated { what: "pclntab file table", offset: at as u64 })?;
                    let len = tail
                        .iter()
                        .position(|&b| b == 0)
                        .ok_or(MetaError::Truncated { what: "pclntab file name", offset: at as u64 })?;
                    files.push(String::from_utf8_lossy(&tail[..len]).into_owned());
                    at += len + 1;
                }
                Ok(files)
            }
        }
    }
}

/// Sorted Go source files, or `None` for images without both `.gosymtab`
/// and `.gopclntab`.
pub fn source_files(elf: &Elf, src: &Source) -> Result<Option<Vec<String>>> {
    if elf.section(".gosymtab").is_none() {
        return Ok(None);
    }
    let Some(data) = elf.section_data(src, ".gopclntab")? else {
        return Ok(None);
    };
    let table = LineTable::parse(&data)?;
    tracing::debug!(version = ?table.version, ptr_size = table.ptr_size, "pclntab");
    let mut files = table.files()?;
    files.sort();
    Ok(Some(files))
}
