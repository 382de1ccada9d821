mod common;

use common::{ICC_COPYRIGHT, run, webp_file, webp_file_with_icc, write_fixture};
use metascrub::Action;
use metascrub::webp::chunks;
use metascrub::util::Source;
use tempfile::TempDir;

#[test]
fn show_prints_exif_and_xmp() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "image.webp", &webp_file(true));

    let report = run(&dir, &path, Action::Show);
    assert!(report.contains("File type is WebP"));
    assert!(report.contains("EXIF chunk holds 2 IFDs"));
    assert!(report.contains("<x:xmpmeta>odd</x:xmpmeta>!"));
}

#[test]
fn odd_sized_chunks_are_padded() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "image.webp", &webp_file(true));
    let src = Source::open(&path, false).unwrap();

    let all = chunks(&src, 0, src.size()).unwrap();
    let names: Vec<[u8; 4]> = all.iter().map(|c| c.four_cc).collect();
    assert_eq!(names, vec![*b"VP8X", *b"VP8 ", *b"EXIF", *b"XMP "]);
    let last = all.last().unwrap();
    assert_eq!(last.start_offset + last.total_len(), src.size());
}

#[test]
fn clear_rewrites_riff_without_metadata() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "image.webp", &webp_file(true));

    let report = run(&dir, &path, Action::Clear);
    assert!(report.contains("Metadata chunks have been removed!"));
    assert_eq!(std::fs::read(&path).unwrap(), webp_file(false));

    let again = run(&dir, &path, Action::Clear);
    assert!(again.contains("No metadata found in file!"));
}

#[test]
fn size_mismatch_is_not_webp() {
    let dir = TempDir::new().unwrap();
    let mut bytes = webp_file(false);
    bytes.extend_from_slice(&[0; 3]);
    let path = write_fixture(&dir, "trailing.webp", &bytes);
    assert!(run(&dir, &path, Action::Show).contains("Invalid file format."));
}

#[test]
fn iccp_chunk_is_decoded_and_removed() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "profile.webp", &webp_file_with_icc());

    let report = run(&dir, &path, Action::Show);
    assert!(report.contains("ICC Profile"));
    assert!(report.contains("CMM Type          : Lino"));
    assert!(report.contains("Dev Model         : sRGB"));
    assert!(report.contains(&format!("Copyright         : {ICC_COPYRIGHT}")));

    let report = run(&dir, &path, Action::Clear);
    assert!(report.contains("Metadata chunks have been removed!"));
    let src = Source::open(&path, false).unwrap();
    let names: Vec<[u8; 4]> = chunks(&src, 0, src.size()).unwrap().iter().map(|c| c.four_cc).collect();
    assert_eq!(names, vec![*b"VP8X", *b"VP8 "]);
}
