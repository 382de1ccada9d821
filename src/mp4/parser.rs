use super::boxes::{BoxHeader, FourCC};
use crate::error::{MetaError, Result};
use crate::util::Source;
use byteorder::{BigEndian, ByteOrder};

/// Read the header of the box at `offset`. `limit` is the end of the
/// enclosing range; a stored size of 0 extends the box to it.
pub fn read_box_header(src: &Source, offset: u64, limit: u64) -> Result<BoxHeader> {
    let head = src.read_at(offset, 8)?;
    let size32 = BigEndian::read_u32(&head[0..4]);
    let typ = FourCC([head[4], head[5], head[6], head[7]]);
    if !typ.is_valid_type() {
        return Err(MetaError::InvalidBoxType { typ: typ.as_str_lossy(), offset });
    }

    let mut header_size = 8u64;
    let mut size = u64::from(size32);
    if size32 == 1 {
        size = BigEndian::read_u64(&src.read_at(offset + 8, 8)?);
        header_size += 8;
    }

    let mut uuid = None;
    if &typ.0 == b"uuid" {
        let mut u = [0u8; 16];
        u.copy_from_slice(&src.read_at(offset + header_size, 16)?);
        uuid = Some(u);
        header_size += 16;
    }

    if size32 == 0 {
        size = limit.saturating_sub(offset);
    }
    if size < header_size || size > limit.saturating_sub(offset) {
        return Err(MetaError::InvalidBoxSize { size, offset });
    }

    Ok(BoxHeader { start: offset, size, typ, uuid, header_size })
}

/// Sibling boxes in `[offset, offset + length)`, in file order.
pub fn boxes(src: &Source, offset: u64, length: u64) -> Result<Vec<BoxHeader>> {
    let end = offset + length;
    let mut at = offset;
    let mut result = Vec::new();
    while at + 8 <= end {
        let h = read_box_header(src, at, end)?;
        tracing::trace!(offset = at, typ = %h.typ, size = h.size, "mp4 box");
        at = h.end();
        result.push(h);
    }
    Ok(result)
}

pub fn children(src: &Source, parent: &BoxHeader) -> Result<Vec<BoxHeader>> {
    boxes(src, parent.data_offset(), parent.data_len())
}

pub fn find_child(src: &Source, parent: &BoxHeader, typ: &[u8; 4]) -> Result<Option<BoxHeader>> {
    Ok(children(src, parent)?.into_iter().find(|b| b.typ == typ))
}

pub fn read_data(src: &Source, h: &BoxHeader) -> Result<Vec<u8>> {
    src.read_at(h.data_offset(), h.data_len())
}

/// Containers descended into even when their contents are not decoded.
pub fn is_container(h: &BoxHeader) -> bool {
    matches!(
        &h.typ.0,
        b"edts" | b"stbl" | b"mvex" | b"moof" | b"traf" | b"mfra" | b"sinf" | b"ipro" | b"schi" | b"tref"
    )
}
