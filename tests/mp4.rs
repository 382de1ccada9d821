mod common;

use common::{mp4_box, mp4_file, run, write_fixture};
use metascrub::{Action, MetaError};
use metascrub::mp4::boxes::FourCC;
use metascrub::mp4::find_moov_meta;
use metascrub::mp4::parser::boxes;
use metascrub::util::Source;
use tempfile::TempDir;

#[test]
fn top_level_walk() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "clip.mp4", &mp4_file(true));
    let src = Source::open(&path, false).unwrap();

    let top = boxes(&src, 0, src.size()).unwrap();
    let types: Vec<FourCC> = top.iter().map(|b| b.typ).collect();
    assert_eq!(types, vec![FourCC(*b"ftyp"), FourCC(*b"moov"), FourCC(*b"mdat")]);
    let (moov, meta) = find_moov_meta(&src, &top).unwrap();
    assert!(moov.is_some());
    assert!(meta.is_some());
}

#[test]
fn show_reports_headers_and_mdta_values() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "clip.mp4", &mp4_file(true));

    let report = run(&dir, &path, Action::Show);
    assert!(report.contains("File type is MP4"));
    assert!(report.contains("Brand               : isom"));
    assert!(report.contains("Compatible Brands   : isom, iso2, mp41"));
    assert!(report.contains("Creation Time       : 2001-09-09 01:46:40 UTC"));
    assert!(report.contains("Duration            : 1:02:03"));
    assert!(report.contains("Flag                : Enabled, Used"));
    assert!(report.contains("com.apple.quicktime.make      : Apple"));
    assert!(report.contains("Skip parsing box type mdat"));
}

#[test]
fn clear_turns_meta_into_free_space() {
    let dir = TempDir::new().unwrap();
    let original = mp4_file(true);
    let path = write_fixture(&dir, "clip.mp4", &original);

    let report = run(&dir, &path, Action::Clear);
    assert!(report.contains("Metadata has been cleared!"));

    let cleared = std::fs::read(&path).unwrap();
    assert_eq!(cleared.len(), original.len());
    assert!(!cleared.windows(5).any(|w| w == b"Apple"));
    assert!(cleared.windows(4).any(|w| w == b"free"));

    let again = run(&dir, &path, Action::Clear);
    assert!(again.contains("Can't find meta box!"));
    assert_eq!(std::fs::read(&path).unwrap(), cleared);
}

#[test]
fn clear_without_meta() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "plain.mp4", &mp4_file(false));
    assert!(run(&dir, &path, Action::Clear).contains("Can't find meta box!"));
}

#[test]
fn largesize_beyond_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut bytes = mp4_box(b"ftyp", b"isom\0\0\x02\0isom");
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(b"moov");
    bytes.extend_from_slice(&u64::MAX.to_be_bytes());
    bytes.extend_from_slice(&[0u8; 16]);
    let path = write_fixture(&dir, "huge.mp4", &bytes);
    let src = Source::open(&path, false).unwrap();

    let err = boxes(&src, 0, src.size()).unwrap_err();
    assert!(matches!(err, MetaError::InvalidBoxSize { size: u64::MAX, offset: 20 }));

    let report = run(&dir, &path, Action::Show);
    assert!(report.contains("Error handling file:"));
}
