//! File tables of DWARF line-number programs (`.debug_line`, versions 2-5).

use super::sections::{Elf, Endian, c_string};
use crate::error::{MetaError, Result};
use crate::util::Source;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::collections::BTreeSet;
use std::io::{Cursor, Read};

const DW_LNCT_PATH: u64 = 0x1;
const DW_LNCT_DIRECTORY_INDEX: u64 = 0x2;

const DW_FORM_BLOCK2: u64 = 0x03;
const DW_FORM_BLOCK4: u64 = 0x04;
const DW_FORM_DATA2: u64 = 0x05;
const DW_FORM_DATA4: u64 = 0x06;
const DW_FORM_DATA8: u64 = 0x07;
const DW_FORM_STRING: u64 = 0x08;
const DW_FORM_BLOCK: u64 = 0x09;
const DW_FORM_BLOCK1: u64 = 0x0a;
const DW_FORM_DATA1: u64 = 0x0b;
const DW_FORM_SDATA: u64 = 0x0d;
const DW_FORM_STRP: u64 = 0x0e;
const DW_FORM_UDATA: u64 = 0x0f;
const DW_FORM_DATA16: u64 = 0x1e;
const DW_FORM_LINE_STRP: u64 = 0x1f;

fn eof(_: std::io::Error) -> MetaError {
    MetaError::Truncated { what: ".debug_line", offset: 0 }
}

struct Reader<'a> {
    cur: Cursor<&'a [u8]>,
    endian: Endian,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], endian: Endian) -> Self {
        Self { cur: Cursor::new(buf), endian }
    }

    fn pos(&self) -> usize {
        self.cur.position() as usize
    }

    fn seek(&mut self, pos: usize) {
        self.cur.set_position(pos as u64);
    }

    fn u8(&mut self) -> Result<u8> {
        self.cur.read_u8().map_err(eof)
    }

    fn u16(&mut self) -> Result<u16> {
        match self.endian {
            Endian::Little => self.cur.read_u16::<LittleEndian>(),
            Endian::Big => self.cur.read_u16::<BigEndian>(),
        }
        .map_err(eof)
    }

    fn u32(&mut self) -> Result<u32> {
        match self.endian {
            Endian::Little => self.cur.read_u32::<LittleEndian>(),
            Endian::Big => self.cur.read_u32::<BigEndian>(),
        }
        .map_err(eof)
    }

    fn u64(&mut self) -> Result<u64> {
        match self.endian {
            Endian::Little => self.cur.read_u64::<LittleEndian>(),
            Endian::Big => self.cur.read_u64::<BigEndian>(),
        }
        .map_err(eof)
    }

    fn offset(&mut self, size: usize) -> Result<u64> {
        if size == 8 { self.u64() } else { self.u32().map(u64::from) }
    }

    fn uleb(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let b = self.u8()?;
            if shift < 64 {
                result |= u64::from(b & 0x7f) << shift;
            }
            if b & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        let mut sink = Vec::new();
        let got = (&mut self.cur).take(n).read_to_end(&mut sink).map_err(eof)?;
        if got as u64 != n {
            return Err(eof(std::io::ErrorKind::UnexpectedEof.into()));
        }
        Ok(())
    }

    fn cstr(&mut self) -> Result<String> {
        let buf = *self.cur.get_ref();
        let start = self.pos();
        let tail = buf.get(start..).ok_or(MetaError::Truncated { what: ".debug_line", offset: start as u64 })?;
        let len = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(MetaError::Truncated { what: ".debug_line string", offset: start as u64 })?;
        self.seek(start + len + 1);
        Ok(String::from_utf8_lossy(&tail[..len]).into_owned())
    }
}

/// String tables referenced by DWARF 5 forms.
#[derive(Default)]
pub struct StringTables {
    pub line_str: Vec<u8>,
    pub str: Vec<u8>,
}

/// An entry attribute value of a DWARF 5 directory or file table.
enum Value {
    Str(String),
    Num(u64),
    Other,
}

fn read_form(r: &mut Reader<'_>, form: u64, offset_size: usize, strings: &StringTables) -> Result<Value> {
    Ok(match form {
        DW_FORM_STRING => Value::Str(r.cstr()?),
        DW_FORM_LINE_STRP => Value::Str(c_string(&strings.line_str, r.offset(offset_size)? as usize)),
        DW_FORM_STRP => Value::Str(c_string(&strings.str, r.offset(offset_size)? as usize)),
        DW_FORM_UDATA => Value::Num(r.uleb()?),
        DW_FORM_DATA1 => Value::Num(u64::from(r.u8()?)),
        DW_FORM_DATA2 => Value::Num(u64::from(r.u16()?)),
        DW_FORM_DATA4 => Value::Num(u64::from(r.u32()?)),
        DW_FORM_DATA8 => Value::Num(r.u64()?),
        DW_FORM_SDATA => {
            r.uleb()?;
            Value::Other
        }
        DW_FORM_DATA16 => {
            r.skip(16)?;
            Value::Other
        }
        DW_FORM_BLOCK | DW_FORM_BLOCK1 | DW_FORM_BLOCK2 | DW_FORM_BLOCK4 => {
            let n = match form {
                DW_FORM_BLOCK1 => u64::from(r.u8()?),
                DW_FORM_BLOCK2 => u64::from(r.u16()?),
                DW_FORM_BLOCK4 => u64::from(r.u32()?),
                _ => r.uleb()?,
            };
            r.skip(n)?;
            Value::Other
        }
        other => {
            return Err(MetaError::UnsupportedFormat(format!("DWARF form 0x{other:x} in line table header")));
        }
    })
}

/// Read a DWARF 5 entry-format table: `(content type, form)` pairs followed
/// by the entries. Returns `(path, directory index)` per entry.
fn read_entry_table(r: &mut Reader<'_>, offset_size: usize, strings: &StringTables) -> Result<Vec<(String, u64)>> {
    let format_count = r.u8()?;
    let mut format = Vec::with_capacity(format_count as usize);
    for _ in 0..format_count {
        format.push((r.uleb()?, r.uleb()?));
    }
    let count = r.uleb()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        let mut path = String::new();
        let mut dir = 0u64;
        for &(content, form) in &format {
            match (content, read_form(r, form, offset_size, strings)?) {
                (DW_LNCT_PATH, Value::Str(s)) => path = s,
                (DW_LNCT_DIRECTORY_INDEX, Value::Num(n)) => dir = n,
                _ => {}
            }
        }
        entries.push((path, dir));
    }
    Ok(entries)
}

fn join(dir: Option<&String>, name: String) -> String {
    match dir {
        Some(d) if !d.is_empty() && !name.starts_with('/') => format!("{}/{}", d.trim_end_matches('/'), name),
        _ => name,
    }
}

/// File names of every line-number program in `.debug_line`.
pub fn line_program_files(data: &[u8], endian: Endian, strings: &StringTables) -> Result<Vec<String>> {
    let mut r = Reader::new(data, endian);
    let mut files = Vec::new();
    while r.pos() < data.len() {
        let unit_start = r.pos();
        let mut unit_length = u64::from(r.u32()?);
        let mut offset_size = 4;
        if unit_length == 0xffff_ffff {
            unit_length = r.u64()?;
            offset_size = 8;
        }
        let unit_end = r.pos() as u64 + unit_length;
        if unit_end > data.len() as u64 {
            return Err(MetaError::Truncated { what: "line program", offset: unit_start as u64 });
        }
        let unit_end = unit_end as usize;

        let version = r.u16()?;
        if !(2..=5).contains(&version) {
            return Err(MetaError::UnsupportedFormat(format!("line program version {version}")));
        }
        if version >= 5 {
            let _address_size = r.u8()?;
            let _segment_selector_size = r.u8()?;
        }
        let _header_length = r.offset(offset_size)?;
        let _min_inst_length = r.u8()?;
        if version >= 4 {
            let _max_ops_per_inst = r.u8()?;
        }
        let _default_is_stmt = r.u8()?;
        let _line_base = r.u8()?;
        let _line_range = r.u8()?;
        let opcode_base = r.u8()?;
        r.skip(u64::from(opcode_base.saturating_sub(1)))?;

        if version >= 5 {
            let dirs: Vec<String> =
                read_entry_table(&mut r, offset_size, strings)?.into_iter().map(|(p, _)| p).collect();
            for (name, dir) in read_entry_table(&mut r, offset_size, strings)? {
                files.push(join(dirs.get(dir as usize), name));
            }
        } else {
            // index 0 is the compilation directory, which lives in .debug_info
            let mut dirs = vec![String::new()];
            loop {
                let d = r.cstr()?;
                if d.is_empty() {
                    break;
                }
                dirs.push(d);
            }
            loop {
                let name = r.cstr()?;
                if name.is_empty() {
                    break;
                }
                let dir = r.uleb()?;
                let _mtime = r.uleb()?;
                let _length = r.uleb()?;
                files.push(join(dirs.get(dir as usize), name));
            }
        }
        tracing::trace!(offset = unit_start, version, files = files.len(), "line program");
        r.seek(unit_end);
    }
    Ok(files)
}

/// Sorted, de-duplicated source files named by the DWARF line tables.
/// `Ok(None)` when the image has no `.debug_line`.
pub fn source_files(elf: &Elf, src: &Source) -> Result<Option<Vec<String>>> {
    let Some(line) = elf.section_data(src, ".debug_line")? else {
        return Ok(None);
    };
    let strings = StringTables {
        line_str: elf.section_data(src, ".debug_line_str")?.unwrap_or_default(),
        str: elf.section_data(src, ".debug_str")?.unwrap_or_default(),
    };
    let files: BTreeSet<String> = line_program_files(&line, elf.endian, &strings)?.into_iter().collect();
    Ok(Some(files.into_iter().collect()))
}
