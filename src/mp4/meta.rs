//! QuickTime `mdta` metadata: a `keys` table and an `ilst` of values that
//! refer back to it by 1-based index.

use crate::error::{MetaError, Result, slice};
use crate::util::lossy;
use byteorder::{BigEndian, ByteOrder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub index: u32,
    pub type_code: u32,
    pub locale: u32,
    pub value: Vec<u8>,
}

impl Item {
    /// Text for the well-known string types, otherwise a big-endian u32.
    pub fn render(&self) -> String {
        if self.type_code <= 5 {
            lossy(&self.value)
        } else if self.value.len() >= 4 {
            BigEndian::read_u32(&self.value).to_string()
        } else {
            hex::encode(&self.value)
        }
    }
}

pub fn parse_keys(buf: &[u8]) -> Result<Vec<String>> {
    let count = BigEndian::read_u32(slice(buf, 4, 8, "keys entry count")?);
    let mut at = 8usize;
    let mut keys = Vec::new();
    for _ in 0..count {
        let size = BigEndian::read_u32(slice(buf, at, at + 4, "keys entry")?) as usize;
        if size < 8 {
            return Err(MetaError::InvalidBoxSize { size: size as u64, offset: at as u64 });
        }
        keys.push(lossy(slice(buf, at + 8, at + size, "keys entry")?));
        at += size;
    }
    Ok(keys)
}

pub fn parse_items(buf: &[u8]) -> Result<Vec<Item>> {
    let mut at = 0usize;
    let mut items = Vec::new();
    while at < buf.len() {
        let head = slice(buf, at, at + 24, "ilst entry")?;
        let size = BigEndian::read_u32(&head[0..4]) as usize;
        let data_size = BigEndian::read_u32(&head[8..12]) as usize;
        if &head[12..16] != b"data" {
            return Err(MetaError::Corrupt(format!("invalid data identifier {:?}", lossy(&head[12..16]))));
        }
        if size < 24 || data_size < 16 {
            return Err(MetaError::InvalidBoxSize { size: size as u64, offset: at as u64 });
        }
        items.push(Item {
            index: BigEndian::read_u32(&head[4..8]),
            type_code: BigEndian::read_u32(&head[16..20]),
            locale: BigEndian::read_u32(&head[20..24]),
            value: slice(buf, at + 24, at + 8 + data_size, "ilst value")?.to_vec(),
        });
        at += size;
    }
    Ok(items)
}

/// Key/value pairs in `ilst` order. Items pointing outside the key table
/// are dropped.
pub fn mdta(keys: &[String], items: &[Item]) -> Vec<(String, String)> {
    items
        .iter()
        .filter_map(|item| {
            let key = keys.get((item.index as usize).checked_sub(1)?)?;
            Some((key.clone(), item.render()))
        })
        .collect()
}
