//! ICC colour profile header and copyright tag.

use crate::error::{Result, slice};
use crate::output::Output;
use crate::util::lossy;
use byteorder::{BigEndian, ByteOrder};

const TAG_TABLE: usize = 128;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub cmm_type: String,
    pub profile_class: String,
    pub primary_platform: String,
    pub device_manufacturer: String,
    pub device_model: String,
    pub profile_creator: String,
    pub copyright: String,
}

pub fn parse(raw: &[u8]) -> Result<Profile> {
    let header = slice(raw, 0, TAG_TABLE + 4, "ICC header")?;
    let mut profile = Profile {
        cmm_type: lossy(&header[4..8]),
        profile_class: lossy(&header[12..16]),
        primary_platform: lossy(&header[40..44]),
        device_manufacturer: lossy(&header[48..52]),
        device_model: lossy(&header[52..56]),
        profile_creator: lossy(&header[80..84]),
        copyright: String::new(),
    };

    let count = BigEndian::read_u32(&header[TAG_TABLE..TAG_TABLE + 4]) as usize;
    for i in 0..count {
        let at = TAG_TABLE + 4 + i * 12;
        let entry = slice(raw, at, at + 12, "ICC tag table")?;
        if &entry[0..4] != b"cprt" {
            continue;
        }
        let offset = BigEndian::read_u32(&entry[4..8]) as usize;
        let size = BigEndian::read_u32(&entry[8..12]) as usize;
        let data = slice(raw, offset, offset + size, "ICC copyright tag")?;
        profile.copyright = copyright(data)?;
        break;
    }
    Ok(profile)
}

fn copyright(data: &[u8]) -> Result<String> {
    let kind = slice(data, 0, 4, "ICC tag type")?;
    match kind {
        b"text" => Ok(lossy(trim_nul(slice(data, 8, data.len(), "ICC text")?))),
        b"mluc" => Ok(mluc_first_record(data).unwrap_or_else(|| {
            // fixed layout of a single-record table
            lossy(trim_nul(data.get(28..data.len().saturating_sub(1)).unwrap_or_default()))
        })),
        _ => Ok(String::new()),
    }
}

/// Decode the first record of a multi-localized Unicode tag.
fn mluc_first_record(data: &[u8]) -> Option<String> {
    let count = BigEndian::read_u32(data.get(8..12)?);
    let record_size = BigEndian::read_u32(data.get(12..16)?) as usize;
    if count == 0 || record_size < 12 {
        return None;
    }
    let record = data.get(16..16 + record_size)?;
    let len = BigEndian::read_u32(&record[4..8]) as usize;
    let offset = BigEndian::read_u32(&record[8..12]) as usize;
    let text = data.get(offset..offset.checked_add(len)?)?;
    let (decoded, _) = encoding_rs::UTF_16BE.decode_without_bom_handling(text);
    Some(decoded.trim_end_matches('\0').to_string())
}

fn trim_nul(b: &[u8]) -> &[u8] {
    match b.iter().rposition(|&c| c != 0) {
        Some(last) => &b[..=last],
        None => &[],
    }
}

pub fn print_profile(out: &mut Output<'_>, p: &Profile) -> std::io::Result<()> {
    out.header("ICC Profile")?;
    out.form("CMM Type", &p.cmm_type, 18)?;
    out.form("Profile Class", &p.profile_class, 18)?;
    out.form("Primary Platform", &p.primary_platform, 18)?;
    out.form("Dev Manufacturer", &p.device_manufacturer, 18)?;
    out.form("Dev Model", &p.device_model, 18)?;
    out.form("Profile Creator", &p.profile_creator, 18)?;
    out.form("Copyright", &p.copyright, 18)
}
