//! Payload decoders for the boxes the report understands.

use crate::error::{MetaError, Result};
use crate::util::lossy;
use byteorder::{BigEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use std::io::{Cursor, Read};

/// Seconds between 1904-01-01 and the Unix epoch.
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

fn short(what: &'static str) -> impl Fn(std::io::Error) -> MetaError {
    move |_| MetaError::Truncated { what, offset: 0 }
}

fn full_box_header(cur: &mut Cursor<&[u8]>, what: &'static str) -> Result<(u8, u32)> {
    let version = cur.read_u8().map_err(short(what))?;
    let flags = cur.read_u24::<BigEndian>().map_err(short(what))?;
    Ok((version, flags))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileType {
    pub brand: String,
    pub minor_version: u32,
    pub compatible_brands: Vec<String>,
}

impl FileType {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(buf);
        let mut brand = [0u8; 4];
        cur.read_exact(&mut brand).map_err(short("ftyp"))?;
        let minor_version = cur.read_u32::<BigEndian>().map_err(short("ftyp"))?;
        let compatible_brands = buf[8..].chunks_exact(4).map(lossy).collect();
        Ok(Self { brand: lossy(&brand), minor_version, compatible_brands })
    }
}

/// Shared layout of `mvhd` and `mdhd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHeader {
    pub version: u8,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
}

impl MediaHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(buf);
        let e = short("media header");
        let (version, _flags) = full_box_header(&mut cur, "media header")?;
        let (creation_time, modification_time, timescale, duration) = if version == 1 {
            let c = cur.read_u64::<BigEndian>().map_err(&e)?;
            let m = cur.read_u64::<BigEndian>().map_err(&e)?;
            let ts = cur.read_u32::<BigEndian>().map_err(&e)?;
            let d = cur.read_u64::<BigEndian>().map_err(&e)?;
            (c, m, ts, d)
        } else {
            let c = cur.read_u32::<BigEndian>().map_err(&e)?;
            let m = cur.read_u32::<BigEndian>().map_err(&e)?;
            let ts = cur.read_u32::<BigEndian>().map_err(&e)?;
            let d = cur.read_u32::<BigEndian>().map_err(&e)?;
            (u64::from(c), u64::from(m), ts, u64::from(d))
        };
        Ok(Self { version, creation_time, modification_time, timescale, duration })
    }

    pub fn creation(&self) -> Option<DateTime<Utc>> {
        mac_time(self.creation_time)
    }

    pub fn modification(&self) -> Option<DateTime<Utc>> {
        mac_time(self.modification_time)
    }

    /// Whole seconds; `None` when the timescale is zero.
    pub fn duration_secs(&self) -> Option<u64> {
        (self.timescale != 0).then(|| self.duration / u64::from(self.timescale))
    }
}

fn mac_time(secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(secs).ok()? - MAC_EPOCH_OFFSET;
    DateTime::from_timestamp(secs, 0)
}

pub fn format_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string()).unwrap_or_default()
}

pub fn format_duration(secs: Option<u64>) -> String {
    match secs {
        Some(s) => format!("{}:{:02}:{:02}", s / 3600, s / 60 % 60, s % 60),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackHeader {
    pub track_id: u32,
    pub flags: u32,
}

impl TrackHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(buf);
        let (version, flags) = full_box_header(&mut cur, "tkhd")?;
        // creation and modification times precede the track id
        cur.set_position(if version == 1 { 20 } else { 12 });
        let track_id = cur.read_u32::<BigEndian>().map_err(short("tkhd"))?;
        Ok(Self { track_id, flags })
    }

    pub fn flag_names(&self) -> String {
        let mut s = String::from(if self.flags & 0x1 != 0 { "Enabled" } else { "Disabled" });
        if self.flags & 0x2 != 0 {
            s.push_str(", Used");
        }
        if self.flags & 0x4 != 0 {
            s.push_str(", Preview");
        }
        s
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    pub handler_type: String,
    pub name: String,
}

impl Handler {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(buf);
        full_box_header(&mut cur, "hdlr")?;
        let _pre_defined = cur.read_u32::<BigEndian>().map_err(short("hdlr"))?;
        let mut handler_type = [0u8; 4];
        cur.read_exact(&mut handler_type).map_err(short("hdlr"))?;

        let mut name_bytes = buf.get(24..).unwrap_or_default().to_vec();
        while name_bytes.last() == Some(&0) {
            name_bytes.pop();
        }
        Ok(Self { handler_type: lossy(&handler_type), name: lossy(&name_bytes) })
    }
}

/// `(reference type, location)` pairs of a `dref` box.
pub fn data_references(buf: &[u8]) -> Result<Vec<(String, String)>> {
    let mut cur = Cursor::new(buf);
    full_box_header(&mut cur, "dref")?;
    let count = cur.read_u32::<BigEndian>().map_err(short("dref"))?;
    let mut at = 8usize;
    let mut refs = Vec::new();
    for _ in 0..count {
        let entry = crate::error::slice(buf, at, at + 12, "dref entry")?;
        let size = u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]) as usize;
        if size < 12 {
            return Err(MetaError::InvalidBoxSize { size: size as u64, offset: at as u64 });
        }
        let body = crate::error::slice(buf, at + 12, at + size, "dref entry")?;
        refs.push((lossy(&entry[4..8]), lossy(body)));
        at += size;
    }
    Ok(refs)
}

/// Raw atoms inside `udta`, header included. Their types are often outside
/// the walker's character set (`©nam`), so they are split by size only.
pub fn user_data_atoms(buf: &[u8]) -> Result<Vec<&[u8]>> {
    let mut at = 0usize;
    let mut atoms = Vec::new();
    while at + 8 <= buf.len() {
        let size = u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]) as usize;
        if size < 8 {
            // trailing 32-bit terminator some writers append
            break;
        }
        atoms.push(crate::error::slice(buf, at, at + size, "udta atom")?);
        at += size;
    }
    Ok(atoms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ftyp_brands() {
        let f = FileType::parse(b"isom\0\0\x02\0isomiso2mp41").unwrap();
        assert_eq!(f.brand, "isom");
        assert_eq!(f.minor_version, 512);
        assert_eq!(f.compatible_brands, vec!["isom", "iso2", "mp41"]);
    }

    #[test]
    fn media_header_v0() {
        let mut v = vec![0u8, 0, 0, 0];
        v.extend_from_slice(&3_082_844_800u32.to_be_bytes());
        v.extend_from_slice(&3_082_844_800u32.to_be_bytes());
        v.extend_from_slice(&1000u32.to_be_bytes());
        v.extend_from_slice(&90_500u32.to_be_bytes());
        let h = MediaHeader::parse(&v).unwrap();
        assert_eq!(h.duration_secs(), Some(90));
        assert_eq!(format_time(h.creation()), "2001-09-09 01:46:40 UTC");
        assert_eq!(format_duration(h.duration_secs()), "0:01:30");
    }

    #[test]
    fn zero_timescale_has_no_duration() {
        let h = MediaHeader { version: 0, creation_time: 0, modification_time: 0, timescale: 0, duration: 10 };
        assert_eq!(h.duration_secs(), None);
    }

    #[test]
    fn track_header_flags() {
        let mut v = vec![0u8, 0, 0, 0x3];
        v.extend_from_slice(&[0; 8]);
        v.extend_from_slice(&7u32.to_be_bytes());
        let t = TrackHeader::parse(&v).unwrap();
        assert_eq!(t.track_id, 7);
        assert_eq!(t.flag_names(), "Enabled, Used");
    }

    #[test]
    fn handler_name() {
        let mut v = vec![0u8; 8];
        v.extend_from_slice(b"mdta");
        v.extend_from_slice(&[0; 12]);
        v.extend_from_slice(b"Core Media\0");
        let h = Handler::parse(&v).unwrap();
        assert_eq!(h.handler_type, "mdta");
        assert_eq!(h.name, "Core Media");
    }

    #[test]
    fn dref_entries() {
        let mut v = vec![0u8, 0, 0, 0];
        v.extend_from_slice(&1u32.to_be_bytes());
        v.extend_from_slice(&16u32.to_be_bytes());
        v.extend_from_slice(b"url ");
        v.extend_from_slice(&[0, 0, 0, 0]);
        v.extend_from_slice(b"file");
        assert_eq!(data_references(&v).unwrap(), vec![("url ".to_string(), "file".to_string())]);
    }
}
