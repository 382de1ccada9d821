//! Synthetic fixtures and a report-capturing runner shared by the
//! integration tests.
#![allow(dead_code)]

use flate2::Compression;
use flate2::write::ZlibEncoder;
use metascrub::{Action, Config, default_registry, run_file};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub fn write_fixture(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

pub fn config_for(dir: &TempDir) -> Config {
    Config::default().with_output_dir(dir.path().join("output")).with_seed(1234)
}

/// Run one action and return the report with ANSI styling removed.
pub fn run(dir: &TempDir, path: &Path, action: Action) -> String {
    let registry = default_registry();
    let config = config_for(dir);
    let mut buf = Vec::new();
    run_file(&registry, &config, path, action, &mut buf).unwrap();
    plain(&String::from_utf8(buf).unwrap())
}

pub fn plain(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for c in chars.by_ref() {
                if c == 'm' {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut e = ZlibEncoder::new(Vec::new(), Compression::default());
    e.write_all(data).unwrap();
    e.finish().unwrap()
}

// FLAC

pub fn flac_block(block_type: u8, last: bool, data: &[u8]) -> Vec<u8> {
    let len = (data.len() as u32).to_be_bytes();
    let mut v = vec![if last { 0x80 | block_type } else { block_type }, len[1], len[2], len[3]];
    v.extend_from_slice(data);
    v
}

pub fn vorbis_comment(vendor: &str, comments: &[&str]) -> Vec<u8> {
    let mut v = (vendor.len() as u32).to_le_bytes().to_vec();
    v.extend_from_slice(vendor.as_bytes());
    v.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for c in comments {
        v.extend_from_slice(&(c.len() as u32).to_le_bytes());
        v.extend_from_slice(c.as_bytes());
    }
    v
}

pub fn flac_file(comments: &[&str]) -> Vec<u8> {
    let mut v = b"fLaC".to_vec();
    v.extend(flac_block(0, false, &[0u8; 34]));
    v.extend(flac_block(4, true, &vorbis_comment("reference libFLAC 1.4.3", comments)));
    v.extend_from_slice(&[0xFF, 0xF8, 0x00, 0x00]);
    v
}

// PNG

pub fn png_chunk(typ: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut v = (data.len() as u32).to_be_bytes().to_vec();
    v.extend_from_slice(typ);
    v.extend_from_slice(data);
    v.extend_from_slice(&[0, 0, 0, 0]);
    v
}

pub fn png_file(with_text: bool) -> Vec<u8> {
    let mut v = b"\x89PNG\r\n\x1a\n".to_vec();
    v.extend(png_chunk(b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 2, 0, 0, 0]));
    if with_text {
        v.extend(png_chunk(b"tEXt", b"Author\0Jane Doe"));
        let mut z = b"Comment\0\0".to_vec();
        z.extend(zlib(b"shot on a phone"));
        v.extend(png_chunk(b"zTXt", &z));
        v.extend(png_chunk(b"iTXt", b"Title\0\0\0en\0\0Sunset"));
    }
    v.extend(png_chunk(b"IDAT", &[0x78, 0x9C, 0x63, 0x00, 0x00]));
    v.extend(png_chunk(b"IEND", &[]));
    v
}

// EXIF / JPEG

pub const THUMBNAIL: &[u8] = &[0xFF, 0xD8, 0xFF, 0xD9];

fn be_entry(tag: u16, typ: u16, count: u32, value: [u8; 4]) -> Vec<u8> {
    let mut v = tag.to_be_bytes().to_vec();
    v.extend_from_slice(&typ.to_be_bytes());
    v.extend_from_slice(&count.to_be_bytes());
    v.extend_from_slice(&value);
    v
}

/// Big-endian TIFF stream: IFD0 with an inline Make, IFD1 describing an
/// embedded JPEG thumbnail.
pub fn tiff_with_thumbnail() -> Vec<u8> {
    let mut v = b"MM\x00\x2A".to_vec();
    v.extend_from_slice(&8u32.to_be_bytes());
    v.extend_from_slice(&1u16.to_be_bytes());
    v.extend(be_entry(0x010F, 2, 4, *b"Foo\0"));
    v.extend_from_slice(&26u32.to_be_bytes());
    v.extend_from_slice(&3u16.to_be_bytes());
    v.extend(be_entry(0x0103, 3, 1, [0, 6, 0, 0]));
    v.extend(be_entry(0x0201, 4, 1, 68u32.to_be_bytes()));
    v.extend(be_entry(0x0202, 4, 1, (THUMBNAIL.len() as u32).to_be_bytes()));
    v.extend_from_slice(&0u32.to_be_bytes());
    assert_eq!(v.len(), 68);
    v.extend_from_slice(THUMBNAIL);
    v
}

pub fn jpeg_segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut v = vec![0xFF, marker];
    v.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    v.extend_from_slice(payload);
    v
}

pub fn jpeg_file(with_metadata: bool) -> Vec<u8> {
    let mut v = vec![0xFF, 0xD8];
    if with_metadata {
        v.extend(jpeg_segment(0xE0, b"JFIF\0\x01\x01\x00\x00\x01\x00\x01\x00\x00"));
        let mut exif = b"Exif\0\0".to_vec();
        exif.extend(tiff_with_thumbnail());
        v.extend(jpeg_segment(0xE1, &exif));
        v.extend(jpeg_segment(0xEC, b"Ducky\0\x01"));
    }
    v.extend(jpeg_segment(0xDB, &[0u8; 65]));
    v.extend(jpeg_segment(0xDA, &[1, 1, 0, 0, 0x3F, 0]));
    // entropy data with stuffed and restart markers
    v.extend_from_slice(&[0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56]);
    v.extend_from_slice(&[0xFF, 0xD9]);
    v
}

pub const ICC_COPYRIGHT: &str = "Copyright (c) 1998 Hewlett-Packard Company";

/// sRGB-style profile header with a `text` copyright tag.
pub fn icc_profile() -> Vec<u8> {
    let mut v = vec![0u8; 128];
    v[4..8].copy_from_slice(b"Lino");
    v[12..16].copy_from_slice(b"mntr");
    v[40..44].copy_from_slice(b"MSFT");
    v[48..52].copy_from_slice(b"IEC ");
    v[52..56].copy_from_slice(b"sRGB");
    v[80..84].copy_from_slice(b"HP  ");
    let mut tag = b"text\0\0\0\0".to_vec();
    tag.extend_from_slice(ICC_COPYRIGHT.as_bytes());
    tag.push(0);
    v.extend_from_slice(&1u32.to_be_bytes());
    v.extend_from_slice(b"cprt");
    v.extend_from_slice(&144u32.to_be_bytes());
    v.extend_from_slice(&(tag.len() as u32).to_be_bytes());
    v.extend(tag);
    v
}

pub const XMP_PACKET: &str = "<x:xmpmeta><dc:creator>Jane</dc:creator></x:xmpmeta>";
pub const EXTENDED_XMP: &str = "<rdf:Description>more</rdf:Description>";

/// APP1 XMP, an extended XMP part and an ICC profile split over two APP2
/// segments stored out of order.
pub fn jpeg_file_with_icc_and_xmp() -> Vec<u8> {
    let mut v = vec![0xFF, 0xD8];

    let mut xmp = b"http://ns.adobe.com/xap/1.0/\0".to_vec();
    xmp.extend_from_slice(XMP_PACKET.as_bytes());
    v.extend(jpeg_segment(0xE1, &xmp));

    let profile = icc_profile();
    let (first, second) = profile.split_at(100);
    for (sequence, part) in [(2u8, second), (1u8, first)] {
        let mut app2 = b"ICC_PROFILE\0".to_vec();
        app2.extend_from_slice(&[sequence, 2]);
        app2.extend_from_slice(part);
        v.extend(jpeg_segment(0xE2, &app2));
    }

    let mut ext = b"http://ns.adobe.com/xmp/extension/\0".to_vec();
    ext.extend_from_slice(&[b'0'; 32]);
    ext.extend_from_slice(&(EXTENDED_XMP.len() as u32).to_be_bytes());
    ext.extend_from_slice(&0u32.to_be_bytes());
    ext.extend_from_slice(EXTENDED_XMP.as_bytes());
    v.extend(jpeg_segment(0xE1, &ext));

    v.extend(jpeg_segment(0xDB, &[0u8; 65]));
    v.extend(jpeg_segment(0xDA, &[1, 1, 0, 0, 0x3F, 0]));
    v.extend_from_slice(&[0x12, 0x34, 0xFF, 0xD9]);
    v
}

// WebP

pub fn riff_chunk(four_cc: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut v = four_cc.to_vec();
    v.extend_from_slice(&(data.len() as u32).to_le_bytes());
    v.extend_from_slice(data);
    if data.len() % 2 == 1 {
        v.push(0);
    }
    v
}

pub fn webp_file(with_metadata: bool) -> Vec<u8> {
    let mut body = b"WEBP".to_vec();
    body.extend(riff_chunk(b"VP8X", &[0x0C, 0, 0, 0, 0, 0, 0, 0, 0, 0]));
    body.extend(riff_chunk(b"VP8 ", &[0x10, 0x20, 0x30, 0x40]));
    if with_metadata {
        let mut exif = b"Exif\0\0".to_vec();
        exif.extend(tiff_with_thumbnail());
        body.extend(riff_chunk(b"EXIF", &exif));
        body.extend(riff_chunk(b"XMP ", b"<x:xmpmeta>odd</x:xmpmeta>!"));
    }
    riff_wrap(body)
}

fn riff_wrap(body: Vec<u8>) -> Vec<u8> {
    let mut v = b"RIFF".to_vec();
    v.extend_from_slice(&(body.len() as u32).to_le_bytes());
    v.extend(body);
    v
}

pub fn webp_file_with_icc() -> Vec<u8> {
    let mut body = b"WEBP".to_vec();
    body.extend(riff_chunk(b"VP8X", &[0x20, 0, 0, 0, 0, 0, 0, 0, 0, 0]));
    body.extend(riff_chunk(b"ICCP", &icc_profile()));
    body.extend(riff_chunk(b"VP8 ", &[0x10, 0x20, 0x30, 0x40]));
    riff_wrap(body)
}

// EBML / Matroska

pub fn ebml_size(len: usize) -> Vec<u8> {
    if len < 0x7F {
        vec![0x80 | len as u8]
    } else if len < 0x3FFF {
        vec![0x40 | (len >> 8) as u8, len as u8]
    } else {
        let mut v = vec![0x01];
        v.extend_from_slice(&(len as u64).to_be_bytes()[1..]);
        v
    }
}

pub fn ebml(id: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut v = id.to_vec();
    v.extend(ebml_size(payload.len()));
    v.extend_from_slice(payload);
    v
}

pub fn ebml_uint(id: &[u8], value: u64) -> Vec<u8> {
    ebml(id, &value.to_be_bytes())
}

/// 2020-01-01 00:00:00 UTC as nanoseconds since the Matroska epoch.
pub const MKV_DATE: i64 = (1_577_836_800 - 978_307_200) * 1_000_000_000;

pub const MKV_INFO: &[u8] = &[0x15, 0x49, 0xA9, 0x66];
pub const MKV_TRACKS: &[u8] = &[0x16, 0x54, 0xAE, 0x6B];
pub const MKV_ATTACHMENTS: &[u8] = &[0x19, 0x41, 0xA4, 0x69];
pub const MKV_TAGS: &[u8] = &[0x12, 0x54, 0xC3, 0x67];

/// Info, Tracks, optional Attachments and Tags as complete elements.
fn mkv_masters(attachment: Option<(&str, &[u8])>) -> Vec<(&'static [u8], Vec<u8>)> {
    let mut info = ebml(&[0x7B, 0xA9], b"Holiday");
    info.extend(ebml(&[0x4D, 0x80], b"libebml v1.4.2"));
    info.extend(ebml(&[0x57, 0x41], b"mkvmerge v70"));
    info.extend(ebml(&[0x44, 0x61], &MKV_DATE.to_be_bytes()));
    let mut masters = vec![(MKV_INFO, ebml(MKV_INFO, &info))];

    let mut track = ebml_uint(&[0xD7], 1);
    track.extend(ebml_uint(&[0x83], 1));
    track.extend(ebml(&[0x53, 0x6E], b"Main video"));
    track.extend(ebml(&[0x22, 0xB5, 0x9C], b"eng"));
    masters.push((MKV_TRACKS, ebml(MKV_TRACKS, &ebml(&[0xAE], &track))));

    if let Some((mime, data)) = attachment {
        let mut file = ebml(&[0x46, 0x6E], b"cover");
        file.extend(ebml(&[0x46, 0x60], mime.as_bytes()));
        file.extend(ebml(&[0x46, 0x7E], b"Cover art"));
        file.extend(ebml(&[0x46, 0x5C], data));
        masters.push((MKV_ATTACHMENTS, ebml(MKV_ATTACHMENTS, &ebml(&[0x61, 0xA7], &file))));
    }

    let targets = ebml(&[0x63, 0xC0], &ebml(&[0x63, 0xCA], b"MOVIE"));
    let mut simple = ebml(&[0x45, 0xA3], b"ARTIST");
    simple.extend(ebml(&[0x44, 0x87], b"Someone"));
    let mut tag = targets;
    tag.extend(ebml(&[0x67, 0xC8], &simple));
    let mut bps = ebml(&[0x45, 0xA3], b"BPS");
    bps.extend(ebml(&[0x44, 0x87], b"1000"));
    let mut tags = ebml(&[0x73, 0x73], &tag);
    tags.extend(ebml(&[0x73, 0x73], &ebml(&[0x67, 0xC8], &bps)));
    masters.push((MKV_TAGS, ebml(MKV_TAGS, &tags)));
    masters
}

fn mkv_wrap(segment: &[u8]) -> Vec<u8> {
    let mut v = ebml(&[0x1A, 0x45, 0xDF, 0xA3], &ebml(&[0x42, 0x82], b"matroska"));
    v.extend(ebml(&[0x18, 0x53, 0x80, 0x67], segment));
    v
}

pub fn mkv_file(attachment: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut segment = Vec::new();
    for (_, m) in mkv_masters(attachment) {
        segment.extend(m);
    }
    segment.extend(ebml(&[0x1F, 0x43, 0xB6, 0x75], &[0u8; 8]));
    mkv_wrap(&segment)
}

fn seek_head(entries: &[(&[u8], u64)]) -> Vec<u8> {
    let mut seeks = Vec::new();
    for (id, position) in entries {
        let mut seek = ebml(&[0x53, 0xAB], id);
        seek.extend(ebml_uint(&[0x53, 0xAC], *position));
        seeks.extend(ebml(&[0x4D, 0xBB], &seek));
    }
    ebml(&[0x11, 0x4D, 0x9B, 0x74], &seeks)
}

/// A Segment that opens with a SeekHead, followed by `filler` and then the
/// masters. `redirect` replaces the stored position of one master.
pub fn mkv_file_with_seek_head(
    attachment: Option<(&str, &[u8])>,
    filler: &[u8],
    redirect: Option<(&[u8], u64)>,
) -> Vec<u8> {
    let masters = mkv_masters(attachment);
    // positions are stored as 8-byte integers, so the head length is fixed
    let head_len = seek_head(&masters.iter().map(|(id, _)| (*id, 0u64)).collect::<Vec<_>>()).len();

    let mut entries = Vec::new();
    let mut at = (head_len + filler.len()) as u64;
    for (id, m) in &masters {
        let position = match redirect {
            Some((target, position)) if target == *id => position,
            _ => at,
        };
        entries.push((*id, position));
        at += m.len() as u64;
    }

    let mut segment = seek_head(&entries);
    segment.extend_from_slice(filler);
    for (_, m) in masters {
        segment.extend(m);
    }
    mkv_wrap(&segment)
}

// ISO BMFF

pub fn mp4_box(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    v.extend_from_slice(typ);
    v.extend_from_slice(payload);
    v
}

pub fn mdta_meta() -> Vec<u8> {
    let mut hdlr = vec![0u8; 8];
    hdlr.extend_from_slice(b"mdta");
    hdlr.extend_from_slice(&[0u8; 12]);
    hdlr.push(0);

    let key = b"com.apple.quicktime.make";
    let mut keys = vec![0u8; 4];
    keys.extend_from_slice(&1u32.to_be_bytes());
    keys.extend_from_slice(&((key.len() + 8) as u32).to_be_bytes());
    keys.extend_from_slice(b"mdta");
    keys.extend_from_slice(key);

    let value = b"Apple";
    let mut ilst = ((24 + value.len()) as u32).to_be_bytes().to_vec();
    ilst.extend_from_slice(&1u32.to_be_bytes());
    ilst.extend_from_slice(&((16 + value.len()) as u32).to_be_bytes());
    ilst.extend_from_slice(b"data");
    ilst.extend_from_slice(&1u32.to_be_bytes());
    ilst.extend_from_slice(&0u32.to_be_bytes());
    ilst.extend_from_slice(value);

    let mut meta = mp4_box(b"hdlr", &hdlr);
    meta.extend(mp4_box(b"keys", &keys));
    meta.extend(mp4_box(b"ilst", &ilst));
    mp4_box(b"meta", &meta)
}

pub fn mp4_file(with_meta: bool) -> Vec<u8> {
    let mut v = mp4_box(b"ftyp", b"isom\0\0\x02\0isomiso2mp41");

    let mut mvhd = vec![0u8; 4];
    mvhd.extend_from_slice(&3_082_844_800u32.to_be_bytes());
    mvhd.extend_from_slice(&3_082_844_800u32.to_be_bytes());
    mvhd.extend_from_slice(&1000u32.to_be_bytes());
    mvhd.extend_from_slice(&3_723_000u32.to_be_bytes());
    mvhd.extend_from_slice(&[0u8; 80]);
    let mut moov = mp4_box(b"mvhd", &mvhd);

    let mut tkhd = vec![0u8, 0, 0, 0x3];
    tkhd.extend_from_slice(&[0u8; 8]);
    tkhd.extend_from_slice(&1u32.to_be_bytes());
    tkhd.extend_from_slice(&[0u8; 68]);
    moov.extend(mp4_box(b"trak", &mp4_box(b"tkhd", &tkhd)));

    if with_meta {
        moov.extend(mdta_meta());
    }
    v.extend(mp4_box(b"moov", &moov));
    v.extend(mp4_box(b"mdat", &[0xAB; 16]));
    v
}

// ELF

fn shdr64(name: u32, typ: u32, offset: u64, size: u64) -> Vec<u8> {
    let mut v = name.to_le_bytes().to_vec();
    v.extend_from_slice(&typ.to_le_bytes());
    v.extend_from_slice(&0u64.to_le_bytes());
    v.extend_from_slice(&0u64.to_le_bytes());
    v.extend_from_slice(&offset.to_le_bytes());
    v.extend_from_slice(&size.to_le_bytes());
    v.extend_from_slice(&[0u8; 24]);
    v
}

pub const GO_FILES: [&str; 2] = ["/home/dev/project/main.go", "/home/dev/project/util.go"];
pub const GO_BUILD_ID: &str = "abcDEF123/xyzXYZ789";

/// Go 1.18 line table naming [`GO_FILES`].
pub fn pclntab() -> Vec<u8> {
    let mut v = 0xFFFF_FFF0u32.to_le_bytes().to_vec();
    v.extend_from_slice(&[0, 0, 1, 8]);
    let filetab = 8 + 8 * 8u64;
    for w in [0u64, GO_FILES.len() as u64, 0, 0, 0, filetab, 0, 0] {
        v.extend_from_slice(&w.to_le_bytes());
    }
    // names appear a second time, as a function name would reference them
    for f in GO_FILES.iter().chain(GO_FILES.iter()) {
        v.extend_from_slice(f.as_bytes());
        v.push(0);
    }
    v
}

pub fn build_id_note() -> Vec<u8> {
    let mut v = 4u32.to_le_bytes().to_vec();
    v.extend_from_slice(&((GO_BUILD_ID.len() + 1) as u32).to_le_bytes());
    v.extend_from_slice(&4u32.to_le_bytes());
    v.extend_from_slice(b"Go\0\0");
    v.extend_from_slice(GO_BUILD_ID.as_bytes());
    v.push(0);
    v
}

/// Little-endian ELF64 with the sections a stripped Go binary keeps.
pub fn go_elf() -> Vec<u8> {
    let names = b"\0.gosymtab\0.gopclntab\0.note.go.buildid\0.shstrtab\0";
    let sections: Vec<(u32, u32, Vec<u8>)> = vec![
        (1, 1, Vec::new()),
        (11, 1, pclntab()),
        (22, 7, build_id_note()),
        (39, 3, names.to_vec()),
    ];

    let mut body = Vec::new();
    let mut headers = shdr64(0, 0, 0, 0);
    for (name, typ, data) in &sections {
        let offset = 64 + body.len() as u64;
        headers.extend(shdr64(*name, *typ, offset, data.len() as u64));
        body.extend_from_slice(data);
    }
    while body.len() % 8 != 0 {
        body.push(0);
    }
    let shoff = 64 + body.len() as u64;

    let mut v = b"\x7fELF\x02\x01\x01".to_vec();
    v.resize(16, 0);
    v.extend_from_slice(&2u16.to_le_bytes()); // e_type
    v.extend_from_slice(&62u16.to_le_bytes()); // e_machine
    v.extend_from_slice(&1u32.to_le_bytes());
    v.extend_from_slice(&0u64.to_le_bytes()); // e_entry
    v.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
    v.extend_from_slice(&shoff.to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    v.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
    v.extend_from_slice(&0u16.to_le_bytes());
    v.extend_from_slice(&0u16.to_le_bytes());
    v.extend_from_slice(&64u16.to_le_bytes()); // e_shentsize
    v.extend_from_slice(&((sections.len() + 1) as u16).to_le_bytes());
    v.extend_from_slice(&(sections.len() as u16).to_le_bytes()); // e_shstrndx
    assert_eq!(v.len(), 64);
    v.extend(body);
    v.extend(headers);
    v
}
