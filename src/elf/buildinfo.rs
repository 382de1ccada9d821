//! Go build information (`.go.buildinfo`) and build ID note.

use super::sections::Elf;
use crate::util::Source;

const BUILDINFO_MAGIC: &[u8; 14] = b"\xff Go buildinf:";
const FLAG_INLINE_STRINGS: u8 = 0x2;
const HEADER_LEN: usize = 32;

fn uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, &b) in buf.iter().enumerate().take(10) {
        value |= u64::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

fn varint_string(buf: &[u8]) -> Option<(&[u8], &[u8])> {
    let (len, n) = uvarint(buf)?;
    let len = usize::try_from(len).ok()?;
    let body = buf.get(n..n.checked_add(len)?)?;
    Some((body, &buf[n + len..]))
}

/// Module info is framed by 16-byte sentinels.
fn strip_sentinels(modinfo: &[u8]) -> &[u8] {
    let n = modinfo.len();
    if n >= 33 && modinfo[n - 17] == b'\n' { &modinfo[16..n - 16] } else { modinfo }
}

/// `go\t<version>` followed by the module info lines, or `None` when the
/// blob is missing or uses the pre-1.18 pointer layout.
pub fn decode(data: &[u8]) -> Option<String> {
    if data.get(..BUILDINFO_MAGIC.len())? != BUILDINFO_MAGIC {
        return None;
    }
    let flags = *data.get(15)?;
    if flags & FLAG_INLINE_STRINGS == 0 {
        tracing::debug!("build info uses pointer layout, skipped");
        return None;
    }
    let (version, rest) = varint_string(data.get(HEADER_LEN..)?)?;
    let (modinfo, _) = varint_string(rest)?;
    let version = String::from_utf8_lossy(version);
    let modinfo = String::from_utf8_lossy(strip_sentinels(modinfo));
    let mut s = format!("go\t{version}\n");
    s.push_str(&modinfo);
    Some(s)
}

pub fn build_info(elf: &Elf, src: &Source) -> Option<String> {
    match elf.section_data(src, ".go.buildinfo") {
        Ok(Some(data)) => decode(&data),
        Ok(None) => None,
        Err(e) => {
            tracing::debug!(error = %e, "reading .go.buildinfo");
            None
        }
    }
}

/// Byte range of the ID inside `.note.go.buildid`: past the 16-byte note
/// header, excluding the trailing NUL.
pub fn build_id_range(data: &[u8]) -> Option<std::ops::Range<usize>> {
    (data.len() > 16).then(|| 16..data.len() - 1)
}

pub fn build_id(data: &[u8]) -> Option<String> {
    build_id_range(data).map(|r| String::from_utf8_lossy(&data[r]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(version: &str, modinfo: &[u8]) -> Vec<u8> {
        let mut v = BUILDINFO_MAGIC.to_vec();
        v.push(8);
        v.push(FLAG_INLINE_STRINGS);
        v.resize(HEADER_LEN, 0);
        v.push(version.len() as u8);
        v.extend_from_slice(version.as_bytes());
        v.push(modinfo.len() as u8);
        v.extend_from_slice(modinfo);
        v
    }

    #[test]
    fn decodes_inline_build_info() {
        let mut modinfo = vec![b'0'; 16];
        modinfo.extend_from_slice(b"path\texample.com/tool\nmod\texample.com/tool\t(devel)\t\n");
        modinfo.extend_from_slice(&[b'1'; 16]);
        let s = decode(&blob("go1.21.0", &modinfo)).unwrap();
        assert_eq!(s, "go\tgo1.21.0\npath\texample.com/tool\nmod\texample.com/tool\t(devel)\t\n");
    }

    #[test]
    fn skips_pointer_layout() {
        let mut b = blob("go1.17", b"");
        b[15] = 0;
        assert_eq!(decode(&b), None);
    }

    #[test]
    fn build_id_trims_note_header() {
        let mut note = vec![0u8; 16];
        note.extend_from_slice(b"abc/def\0");
        assert_eq!(build_id(&note).as_deref(), Some("abc/def"));
        assert_eq!(build_id(&[0; 4]), None);
    }
}
