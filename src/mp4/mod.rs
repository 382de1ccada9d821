//! ISO base media files (MP4, MOV, 3GP).

pub mod boxes;
pub mod decoders;
pub mod meta;
pub mod parser;

use crate::error::Result;
use crate::registry::{Action, Context, FormatParser};
use crate::util::Source;
use anyhow::Context as _;
use boxes::{BoxHeader, FourCC};
use decoders::{FileType, Handler, MediaHeader, TrackHeader, format_duration, format_time};
use parser::{boxes, children, find_child, read_data};

/// Children of `meta`. ISO `meta` is a full box with four bytes of version
/// and flags before its children; QuickTime `meta` has none.
pub fn meta_children(src: &Source, meta: &BoxHeader) -> Result<Vec<BoxHeader>> {
    let peek = src.read_prefix(meta.data_offset(), 8)?;
    let quicktime = peek.len() == 8 && FourCC([peek[4], peek[5], peek[6], peek[7]]).is_valid_type();
    if quicktime || meta.data_len() < 4 {
        children(src, meta)
    } else {
        boxes(src, meta.data_offset() + 4, meta.data_len() - 4)
    }
}

/// `moov/meta`, if present.
pub fn find_moov_meta(src: &Source, top: &[BoxHeader]) -> Result<(Option<BoxHeader>, Option<BoxHeader>)> {
    let Some(moov) = top.iter().find(|b| b.typ == b"moov") else {
        return Ok((None, None));
    };
    let meta = find_child(src, moov, b"meta")?;
    Ok((Some(moov.clone()), meta))
}

/// Retype the box as `free` and zero its payload. Sizes stay as they are.
pub fn convert_to_free(src: &Source, b: &BoxHeader) -> Result<()> {
    src.write_at(b.start + 4, b"free")?;
    const CHUNK: u64 = 64 * 1024;
    let zeros = vec![0u8; CHUNK.min(b.data_len()) as usize];
    let mut at = b.data_offset();
    while at < b.end() {
        let n = CHUNK.min(b.end() - at) as usize;
        src.write_at(at, &zeros[..n])?;
        at += n as u64;
    }
    Ok(())
}

pub struct Mp4Parser;

impl FormatParser for Mp4Parser {
    fn name(&self) -> &'static str {
        "MP4"
    }

    fn is_container(&self) -> bool {
        true
    }

    fn supports(&self, src: &Source, offset: u64, _length: u64) -> Result<bool> {
        let head = src.read_prefix(offset, 8)?;
        Ok(head.len() == 8 && &head[4..8] == b"ftyp")
    }

    fn handle(
        &self,
        ctx: &mut Context<'_>,
        src: &Source,
        action: Action,
        offset: u64,
        length: u64,
    ) -> anyhow::Result<()> {
        let top = boxes(src, offset, length).context("walking MP4 boxes")?;
        match action {
            Action::Show => {
                for b in &top {
                    print_box(ctx, src, b)?;
                }
            }
            Action::Clear => {
                ctx.out.line("Turning moov.meta box into free space...")?;
                match find_moov_meta(src, &top).context("looking up moov.meta")? {
                    (None, _) => ctx.out.line("Can't find moov box!")?,
                    (Some(_), None) => ctx.out.line("Can't find meta box!")?,
                    (Some(_), Some(meta)) => {
                        convert_to_free(src, &meta).context("rewriting meta box")?;
                        tracing::debug!(offset = meta.start, size = meta.size, "meta box freed");
                        ctx.out.line("Metadata has been cleared!")?;
                    }
                }
            }
            Action::Extract => ctx.out.line("Nothing to extract from MP4 files")?,
        }
        Ok(())
    }
}

fn print_children(ctx: &mut Context<'_>, src: &Source, parent: &BoxHeader, skip: &[&[u8; 4]]) -> anyhow::Result<()> {
    for b in children(src, parent).with_context(|| format!("walking {} children", parent.typ))? {
        if skip.iter().any(|s| b.typ == *s) {
            continue;
        }
        print_box(ctx, src, &b)?;
    }
    Ok(())
}

fn print_box(ctx: &mut Context<'_>, src: &Source, b: &BoxHeader) -> anyhow::Result<()> {
    match &b.typ.0 {
        b"ftyp" => {
            let f = FileType::parse(&read_data(src, b)?)?;
            let out = &mut ctx.out;
            out.header("File Type")?;
            out.form("Brand", &f.brand, 20)?;
            out.form("Minor Version", f.minor_version, 20)?;
            out.form("Compatible Brands", f.compatible_brands.join(", "), 20)?;
            out.blank()?;
        }
        b"moov" => {
            ctx.out.header("Movie Metadata (moov)")?;
            ctx.out.blank()?;
            print_children(ctx, src, b, &[])?;
        }
        b"mvhd" => {
            let h = MediaHeader::parse(&read_data(src, b)?)?;
            let out = &mut ctx.out;
            out.line("Movie Header (mvhd)")?;
            print_media_header(out, &h)?;
            out.blank()?;
        }
        b"trak" => {
            ctx.out.header("Track (trak)")?;
            print_children(ctx, src, b, &[b"edts"])?;
            ctx.out.blank()?;
        }
        b"tkhd" => {
            let t = TrackHeader::parse(&read_data(src, b)?)?;
            ctx.out.form("Track ID", t.track_id, 20)?;
            ctx.out.form("Flag", t.flag_names(), 20)?;
        }
        b"mdia" => print_children(ctx, src, b, &[])?,
        b"mdhd" => {
            let h = MediaHeader::parse(&read_data(src, b)?)?;
            print_media_header(&mut ctx.out, &h)?;
        }
        b"hdlr" => {
            let h = Handler::parse(&read_data(src, b)?)?;
            ctx.out.form("Handler", format!("{} ({})", h.handler_type, h.name), 20)?;
        }
        b"minf" => print_children(ctx, src, b, &[b"nmhd", b"stbl", b"smhd", b"vmhd"])?,
        b"dinf" => {
            for c in children(src, b)? {
                if c.typ == b"dref" {
                    for (kind, location) in decoders::data_references(&read_data(src, &c)?)? {
                        ctx.out.form("Ref", format!("{kind} {location}"), 20)?;
                    }
                } else {
                    print_box(ctx, src, &c)?;
                }
            }
        }
        b"meta" => print_meta(ctx, src, b)?,
        b"udta" => {
            let data = read_data(src, b)?;
            ctx.out.header("User data (udta)")?;
            ctx.out.blank()?;
            for atom in decoders::user_data_atoms(&data)? {
                ctx.out.hex(atom)?;
                ctx.out.blank()?;
            }
        }
        _ => {
            ctx.out.line(format!("Skip parsing box type {}", b.typ))?;
            if parser::is_container(b) {
                match children(src, b) {
                    Ok(kids) => {
                        for c in &kids {
                            print_box(ctx, src, c)?;
                        }
                    }
                    Err(e) => tracing::debug!(typ = %b.typ, error = %e, "not descending into box"),
                }
                ctx.out.blank()?;
            }
        }
    }
    Ok(())
}

fn print_media_header(out: &mut crate::output::Output<'_>, h: &MediaHeader) -> std::io::Result<()> {
    out.form("Creation Time", format_time(h.creation()), 20)?;
    out.form("Modification Time", format_time(h.modification()), 20)?;
    out.form("Duration", format_duration(h.duration_secs()), 20)
}

fn print_meta(ctx: &mut Context<'_>, src: &Source, b: &BoxHeader) -> anyhow::Result<()> {
    ctx.out.line("Metadata (meta)")?;
    let kids = meta_children(src, b).context("walking meta children")?;
    let find = |typ: &[u8; 4]| kids.iter().find(|k| k.typ == typ);

    match find(b"hdlr") {
        None => ctx.out.line("Failed to retrieve handler for meta box")?,
        Some(h) => {
            let handler = Handler::parse(&read_data(src, h)?)?;
            if handler.handler_type == "mdta" {
                let keys = match find(b"keys") {
                    Some(k) => meta::parse_keys(&read_data(src, k)?).context("parsing keys box")?,
                    None => Vec::new(),
                };
                let items = match find(b"ilst") {
                    Some(i) => meta::parse_items(&read_data(src, i)?).context("parsing ilst box")?,
                    None => Vec::new(),
                };
                let pairs = meta::mdta(&keys, &items);
                let width = pairs.iter().map(|(k, _)| k.len()).max().unwrap_or(0).max(30);
                for (k, v) in &pairs {
                    ctx.out.form(k, v, width)?;
                }
                ctx.out.blank()?;
            } else {
                ctx.out.line(format!("Skip parsing unsupported handler {}", handler.handler_type))?;
            }
        }
    }

    if kids.is_empty() {
        ctx.out.line("Empty meta box")?;
    }
    for k in kids.iter().filter(|k| !matches!(&k.typ.0, b"hdlr" | b"keys" | b"ilst" | b"mdta")) {
        ctx.out.line(format!("Skip parsing box {}", k.typ))?;
    }
    ctx.out.blank()?;
    Ok(())
}
