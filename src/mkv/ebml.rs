//! EBML element walking.
//!
//! Elements own an `{offset, size}` window into the file plus the children
//! discovered so far. Children are always a contiguous prefix of the
//! element's payload, so a lookup can resume walking right after the last
//! cached child instead of rescanning.

use crate::error::{MetaError, Result};
use crate::util::Source;
use chrono::{DateTime, TimeZone, Utc};

pub const ID_EBML: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3];
pub const ID_SEGMENT: &[u8] = &[0x18, 0x53, 0x80, 0x67];
pub const ID_SEEK_HEAD: &[u8] = &[0x11, 0x4D, 0x9B, 0x74];
pub const ID_SEEK: &[u8] = &[0x4D, 0xBB];
pub const ID_SEEK_ID: &[u8] = &[0x53, 0xAB];
pub const ID_SEEK_POSITION: &[u8] = &[0x53, 0xAC];

/// Seconds between the Unix epoch and the Matroska epoch, 2001-01-01 UTC.
const MATROSKA_EPOCH: i64 = 978_307_200;

/// Decode a variable-size integer from the start of `buf`.
///
/// Returns `(value, octets)`; the length marker bit is masked out of the
/// value. A zero leading byte decodes as `(0, 1)`. `None` means `buf` is
/// shorter than the encoded length.
pub fn vint(buf: &[u8]) -> Option<(u64, usize)> {
    let first = *buf.first()?;
    if first == 0 {
        return Some((0, 1));
    }
    let len = first.leading_zeros() as usize + 1;
    let tail = buf.get(1..len)?;
    let head = u64::from(first & (0xFFu16 >> len) as u8);
    Some((tail.iter().fold(head, |acc, &b| (acc << 8) | u64::from(b)), len))
}

/// Value reserved for "size unknown": all data bits set.
fn is_unknown_size(value: u64, len: usize) -> bool {
    value == (1u64 << (7 * len)) - 1
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Raw ID octets, length marker included.
    pub id: Vec<u8>,
    pub start_at: u64,
    pub data_at: u64,
    pub size: u64,
    children: Vec<Element>,
    complete: bool,
}

/// Read the element header at `offset`. Returns the element and the offset
/// of its next sibling. `limit` is the end of the parent; unknown sizes
/// extend to it.
pub fn next_element(src: &Source, offset: u64, limit: u64) -> Result<(Element, u64)> {
    let head = src.read_prefix(offset, 8)?;
    let id_len = match vint(&head) {
        Some((_, len)) if head[0] != 0 && len <= 4 => len,
        _ => return Err(MetaError::InvalidVint { offset }),
    };
    let size_at = offset + id_len as u64;
    let size_buf = src.read_prefix(size_at, 8)?;
    let (raw_size, size_len) = vint(&size_buf).ok_or(MetaError::InvalidVint { offset: size_at })?;
    let data_at = size_at + size_len as u64;
    if data_at > limit {
        return Err(MetaError::Truncated { what: "EBML element header", offset });
    }
    let size = if is_unknown_size(raw_size, size_len) { limit - data_at } else { raw_size };
    if data_at + size > limit {
        return Err(MetaError::Corrupt(format!(
            "EBML element at {offset} with size {size} overruns its parent ending at {limit}"
        )));
    }
    let element = Element {
        id: head[..id_len].to_vec(),
        start_at: offset,
        data_at,
        size,
        children: Vec::new(),
        complete: false,
    };
    tracing::trace!(offset, id = %hex::encode(&element.id), size, "ebml element");
    Ok((element, data_at + size))
}

/// Every element in `[offset, offset + length)`, in file order. Walks the
/// whole range, so reserve it for small inputs.
pub fn parse_file(src: &Source, offset: u64, length: u64) -> Result<Vec<Element>> {
    let limit = offset + length;
    let mut at = offset;
    let mut result = Vec::new();
    while at < limit {
        let (element, next) = next_element(src, at, limit)?;
        result.push(element);
        at = next;
    }
    Ok(result)
}

impl Element {
    pub fn end(&self) -> u64 {
        self.data_at + self.size
    }

    pub fn is(&self, id: &[u8]) -> bool {
        self.id == id
    }

    pub fn bytes(&self, src: &Source) -> Result<Vec<u8>> {
        src.read_at(self.data_at, self.size)
    }

    /// Payload as UTF-8, with NUL padding dropped.
    pub fn string_value(&self, src: &Source) -> Result<String> {
        if self.size == 0 {
            return Ok(String::new());
        }
        let data = self.bytes(src)?;
        Ok(String::from_utf8_lossy(&data).trim_end_matches('\0').to_string())
    }

    pub fn uint_value(&self, src: &Source) -> Result<u64> {
        if self.size > 8 {
            return Err(MetaError::Corrupt(format!("unsigned integer of {} bytes at {}", self.size, self.data_at)));
        }
        Ok(self.bytes(src)?.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
    }

    /// Nanoseconds since 2001-01-01 UTC. Empty and zero values read as
    /// `None`.
    pub fn date_value(&self, src: &Source) -> Result<Option<DateTime<Utc>>> {
        if self.size == 0 {
            return Ok(None);
        }
        if self.size != 8 {
            return Err(MetaError::Corrupt(format!("date of {} bytes at {}", self.size, self.data_at)));
        }
        let data = self.bytes(src)?;
        let nanos = i64::from_be_bytes([data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7]]);
        if nanos == 0 {
            return Ok(None);
        }
        let secs = MATROSKA_EPOCH + nanos.div_euclid(1_000_000_000);
        let sub = nanos.rem_euclid(1_000_000_000) as u32;
        Ok(Utc.timestamp_opt(secs, sub).single())
    }

    /// Overwrite the payload with zeros in place.
    pub fn clear_value(&self, src: &Source) -> Result<()> {
        if self.size == 0 {
            return Ok(());
        }
        src.write_at(self.data_at, &vec![0u8; self.size as usize])?;
        Ok(())
    }

    /// Walk one more child past the cached prefix. Returns its index.
    fn walk_next(&mut self, src: &Source) -> Result<Option<usize>> {
        if self.complete {
            return Ok(None);
        }
        let at = self.children.last().map_or(self.data_at, Element::end);
        if at >= self.end() {
            self.complete = true;
            return Ok(None);
        }
        let (child, _) = next_element(src, at, self.end())?;
        self.children.push(child);
        Ok(Some(self.children.len() - 1))
    }

    /// All children, walking whatever part of the payload is not cached yet.
    pub fn get_elements(&mut self, src: &Source) -> Result<&mut [Element]> {
        while self.walk_next(src)?.is_some() {}
        Ok(&mut self.children)
    }

    fn matches(&self, src: &Source, id: &[u8], value: Option<&[u8]>) -> Result<bool> {
        if !self.is(id) {
            return Ok(false);
        }
        match value {
            None => Ok(true),
            Some(v) => Ok(self.size == v.len() as u64 && self.bytes(src)? == v),
        }
    }

    fn find_index(&mut self, src: &Source, id: &[u8], value: Option<&[u8]>) -> Result<Option<usize>> {
        for (i, c) in self.children.iter().enumerate() {
            if c.matches(src, id, value)? {
                return Ok(Some(i));
            }
        }
        while let Some(i) = self.walk_next(src)? {
            if self.children[i].matches(src, id, value)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// First child with `id` (and payload equal to `value`, when given).
    /// Only walks as far as needed.
    pub fn find_first(&mut self, src: &Source, id: &[u8], value: Option<&[u8]>) -> Result<Option<&mut Element>> {
        let index = self.find_index(src, id, value)?;
        Ok(index.map(move |i| &mut self.children[i]))
    }

    /// Children with `id`, in order. Walks the whole payload.
    pub fn children_with<'s>(&'s mut self, src: &Source, id: &'s [u8]) -> Result<impl Iterator<Item = &'s mut Element>> {
        Ok(self.get_elements(src)?.iter_mut().filter(move |c| c.is(id)))
    }

    /// First child's string value, empty when absent.
    pub fn child_string(&mut self, src: &Source, id: &[u8]) -> Result<String> {
        match self.find_first(src, id, None)? {
            Some(c) => c.string_value(src),
            None => Ok(String::new()),
        }
    }

    pub fn child_uint(&mut self, src: &Source, id: &[u8]) -> Result<u64> {
        match self.find_first(src, id, None)? {
            Some(c) => c.uint_value(src),
            None => Ok(0),
        }
    }

    /// Zero the first child with `id`. Absent children are not an error.
    pub fn clear_child(&mut self, src: &Source, id: &[u8]) -> Result<()> {
        match self.find_first(src, id, None)? {
            Some(c) => c.clear_value(src),
            None => Ok(()),
        }
    }

    /// Locate a top-level child of this Segment through its SeekHead.
    ///
    /// Seek positions are relative to the Segment payload. Falls back to a
    /// lazy walk when there is no SeekHead or no entry for `target`.
    pub fn get_from_seek(&mut self, src: &Source, target: &[u8]) -> Result<Option<Element>> {
        let limit = self.end();
        let data_at = self.data_at;
        if let Some(head) = self.find_first(src, ID_SEEK_HEAD, None)? {
            for seek in head.children_with(src, ID_SEEK)? {
                let Some(seek_id) = seek.find_first(src, ID_SEEK_ID, None)? else {
                    continue;
                };
                if seek_id.bytes(src)? != target {
                    continue;
                }
                let Some(pos) = seek.find_first(src, ID_SEEK_POSITION, None)? else {
                    continue;
                };
                let position = pos.uint_value(src)?;
                let at = data_at
                    .checked_add(position)
                    .ok_or_else(|| MetaError::Corrupt(format!("seek position {position} overflows")))?;
                if at >= limit {
                    return Err(MetaError::Corrupt(format!("seek position {at} outside segment")));
                }
                let (element, _) = next_element(src, at, limit)?;
                if !element.is(target) {
                    return Err(MetaError::Corrupt(format!(
                        "seek entry for {} points at {}",
                        hex::encode(target),
                        hex::encode(&element.id)
                    )));
                }
                tracing::debug!(target = %hex::encode(target), offset = at, "found element through seek head");
                return Ok(Some(element));
            }
        }
        tracing::debug!(target = %hex::encode(target), "no seek entry, walking segment");
        Ok(self.find_first(src, target, None)?.cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_vints() {
        assert_eq!(vint(&[0x88]), Some((8, 1)));
        assert_eq!(vint(&[0x82]), Some((2, 1)));
        assert_eq!(vint(&[0x40, 0x02]), Some((2, 2)));
        assert_eq!(vint(&[0x20, 0x00, 0x02]), Some((2, 3)));
        assert_eq!(vint(&[0x10, 0x00, 0x00, 0x02]), Some((2, 4)));
        assert_eq!(vint(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x3A]), Some((58, 8)));
        assert_eq!(vint(&[0x00]), Some((0, 1)));
    }

    #[test]
    fn short_buffer_is_none() {
        assert_eq!(vint(&[]), None);
        assert_eq!(vint(&[0x40]), None);
    }

    #[test]
    fn unknown_sizes() {
        assert!(is_unknown_size(0x7F, 1));
        assert!(is_unknown_size(0x00FF_FFFF_FFFF_FFFF, 8));
        assert!(!is_unknown_size(0x7E, 1));
    }
}
