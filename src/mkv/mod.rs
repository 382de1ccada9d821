//! Matroska / WebM segment metadata.

pub mod ebml;

use crate::error::Result;
use crate::registry::{self, Action, Context, FormatParser};
use crate::util::{Source, extraction_path};
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use ebml::{Element, ID_EBML, ID_SEGMENT};
use std::io::{BufWriter, Write};

const ID_INFO: &[u8] = &[0x15, 0x49, 0xA9, 0x66];
const ID_FILENAME: &[u8] = &[0x73, 0x84];
const ID_TITLE: &[u8] = &[0x7B, 0xA9];
const ID_DATE_UTC: &[u8] = &[0x44, 0x61];
const ID_MUXING_APP: &[u8] = &[0x4D, 0x80];
const ID_WRITING_APP: &[u8] = &[0x57, 0x41];

const ID_TRACKS: &[u8] = &[0x16, 0x54, 0xAE, 0x6B];
const ID_TRACK_ENTRY: &[u8] = &[0xAE];
const ID_TRACK_NUMBER: &[u8] = &[0xD7];
const ID_TRACK_NAME: &[u8] = &[0x53, 0x6E];
const ID_TRACK_TYPE: &[u8] = &[0x83];
const ID_TRACK_LANGUAGE: &[u8] = &[0x22, 0xB5, 0x9C];

const ID_ATTACHMENTS: &[u8] = &[0x19, 0x41, 0xA4, 0x69];
const ID_ATTACHED_FILE: &[u8] = &[0x61, 0xA7];
const ID_FILE_NAME: &[u8] = &[0x46, 0x6E];
const ID_FILE_DESCRIPTION: &[u8] = &[0x46, 0x7E];
const ID_FILE_MIME_TYPE: &[u8] = &[0x46, 0x60];
const ID_FILE_DATA: &[u8] = &[0x46, 0x5C];

const ID_TAGS: &[u8] = &[0x12, 0x54, 0xC3, 0x67];
const ID_TAG: &[u8] = &[0x73, 0x73];
const ID_TARGETS: &[u8] = &[0x63, 0xC0];
const ID_TARGET_TYPE: &[u8] = &[0x63, 0xCA];
const ID_SIMPLE_TAG: &[u8] = &[0x67, 0xC8];
const ID_TAG_NAME: &[u8] = &[0x45, 0xA3];
const ID_TAG_LANGUAGE: &[u8] = &[0x44, 0x7A];
const ID_TAG_STRING: &[u8] = &[0x44, 0x87];

/// Info children zeroed by Clear.
const REDACTED_INFO: [&[u8]; 5] = [ID_FILENAME, ID_TITLE, ID_DATE_UTC, ID_MUXING_APP, ID_WRITING_APP];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Info {
    pub filename: String,
    pub date: Option<DateTime<Utc>>,
    pub title: String,
    pub muxing_app: String,
    pub writing_app: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Track {
    pub number: u64,
    pub name: String,
    pub track_type: u64,
    pub language: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    pub description: String,
    pub data_at: u64,
    pub size: u64,
}

impl Attachment {
    /// Subtype of the media type, used as file extension.
    pub fn extension(&self) -> &str {
        match self.media_type.split('/').nth(1) {
            Some(ext) if !ext.is_empty() => ext,
            _ => "raw",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub target_type: String,
    pub language: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub info: Info,
    pub tracks: Vec<Track>,
    pub attachments: Vec<Attachment>,
    pub tags: Vec<Tag>,
}

pub fn track_type(value: u64) -> &'static str {
    match value {
        1 => "video",
        2 => "audio",
        3 => "complex",
        16 => "logo",
        17 => "subtitle",
        18 => "buttons",
        32 => "control",
        33 => "metadata",
        _ => "unknown",
    }
}

/// Top-level Segment elements of the range. Only element headers are read.
pub fn segments(src: &Source, offset: u64, length: u64) -> Result<Vec<Element>> {
    Ok(ebml::parse_file(src, offset, length)?.into_iter().filter(|e| e.is(ID_SEGMENT)).collect())
}

pub fn metadata(src: &Source, segment: &mut Element) -> Result<Metadata> {
    let mut meta = Metadata::default();

    if let Some(mut info) = segment.get_from_seek(src, ID_INFO)? {
        meta.info = Info {
            filename: info.child_string(src, ID_FILENAME)?,
            date: match info.find_first(src, ID_DATE_UTC, None)? {
                Some(d) => d.date_value(src)?,
                None => None,
            },
            title: info.child_string(src, ID_TITLE)?,
            muxing_app: info.child_string(src, ID_MUXING_APP)?,
            writing_app: info.child_string(src, ID_WRITING_APP)?,
        };
    }

    if let Some(mut tracks) = segment.get_from_seek(src, ID_TRACKS)? {
        for t in tracks.children_with(src, ID_TRACK_ENTRY)? {
            meta.tracks.push(Track {
                number: t.child_uint(src, ID_TRACK_NUMBER)?,
                name: t.child_string(src, ID_TRACK_NAME)?,
                track_type: t.child_uint(src, ID_TRACK_TYPE)?,
                language: t.child_string(src, ID_TRACK_LANGUAGE)?,
            });
        }
    }

    if let Some(mut attachments) = segment.get_from_seek(src, ID_ATTACHMENTS)? {
        for a in attachments.children_with(src, ID_ATTACHED_FILE)? {
            let (data_at, size) = match a.find_first(src, ID_FILE_DATA, None)? {
                Some(d) => (d.data_at, d.size),
                None => (a.end(), 0),
            };
            meta.attachments.push(Attachment {
                name: a.child_string(src, ID_FILE_NAME)?,
                media_type: a.child_string(src, ID_FILE_MIME_TYPE)?,
                description: a.child_string(src, ID_FILE_DESCRIPTION)?,
                data_at,
                size,
            });
        }
    }

    if let Some(mut tags) = segment.get_from_seek(src, ID_TAGS)? {
        for t in tags.children_with(src, ID_TAG)? {
            let mut target_type = match t.find_first(src, ID_TARGETS, None)? {
                Some(targets) => targets.child_string(src, ID_TARGET_TYPE)?,
                None => String::new(),
            };
            if target_type.is_empty() {
                target_type = t.child_string(src, ID_TARGET_TYPE)?;
            }
            let Some(simple) = t.find_first(src, ID_SIMPLE_TAG, None)? else {
                continue;
            };
            meta.tags.push(Tag {
                name: simple.child_string(src, ID_TAG_NAME)?,
                target_type,
                language: simple.child_string(src, ID_TAG_LANGUAGE)?,
                value: simple.child_string(src, ID_TAG_STRING)?,
            });
        }
    }

    Ok(meta)
}

/// Zero the provenance fields of the segment's Info in place.
pub fn clear_info(src: &Source, segment: &mut Element) -> Result<bool> {
    let Some(mut info) = segment.get_from_seek(src, ID_INFO)? else {
        return Ok(false);
    };
    for id in REDACTED_INFO {
        info.clear_child(src, id)?;
    }
    Ok(true)
}

pub struct MkvParser;

impl FormatParser for MkvParser {
    fn name(&self) -> &'static str {
        "MKV (Matroska)"
    }

    fn is_container(&self) -> bool {
        true
    }

    fn supports(&self, src: &Source, offset: u64, _length: u64) -> Result<bool> {
        Ok(src.read_prefix(offset, 4)? == ID_EBML)
    }

    fn handle(
        &self,
        ctx: &mut Context<'_>,
        src: &Source,
        action: Action,
        offset: u64,
        length: u64,
    ) -> anyhow::Result<()> {
        let mut segments = segments(src, offset, length).context("walking EBML top level")?;
        match action {
            Action::Show => {
                for segment in &mut segments {
                    let meta = metadata(src, segment).context("reading segment metadata")?;
                    show(ctx, src, &meta)?;
                }
            }
            Action::Clear => {
                for segment in &mut segments {
                    ctx.out.line("Removing all values from Info elements...")?;
                    if !clear_info(src, segment).context("clearing segment info")? {
                        ctx.out.line("Segment has no Info element")?;
                    }
                }
                ctx.out.line("Metadata cleared")?;
            }
            Action::Extract => {
                let mut index = 0usize;
                for segment in &mut segments {
                    let meta = metadata(src, segment).context("reading segment metadata")?;
                    for a in &meta.attachments {
                        index += 1;
                        let suffix = format!("_attachment_{index:02}.{}", a.extension());
                        let path = extraction_path(&ctx.config.output_dir, src.path(), &suffix)
                            .context("creating output directory")?;
                        let file = std::fs::File::create(&path)
                            .with_context(|| format!("creating {}", path.display()))?;
                        let mut w = BufWriter::new(file);
                        src.copy_range(a.data_at, a.size, &mut w)?;
                        w.flush()?;
                        tracing::debug!(path = %path.display(), bytes = a.size, "attachment written");
                        ctx.out.line(format!("Attachment {index} has been extracted to {}", path.display()))?;
                    }
                }
                if index == 0 {
                    ctx.out.line("No attachment to extract")?;
                }
            }
        }
        Ok(())
    }
}

/// Print a line one level deeper than the current report.
fn nested_line(ctx: &mut Context<'_>, text: impl AsRef<str>) -> std::io::Result<()> {
    let depth = ctx.out.depth();
    ctx.out.set_depth(depth + 1);
    let r = ctx.out.line(text);
    ctx.out.set_depth(depth);
    r
}

fn show(ctx: &mut Context<'_>, src: &Source, m: &Metadata) -> anyhow::Result<()> {
    let out = &mut ctx.out;
    out.header("Info")?;
    out.form("Filename", &m.info.filename, 13)?;
    let date = m.info.date.map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string()).unwrap_or_default();
    out.form("Date", date, 13)?;
    out.form("Title", &m.info.title, 13)?;
    out.form("Muxing App", &m.info.muxing_app, 13)?;
    out.form("Writing App", &m.info.writing_app, 13)?;
    out.blank()?;

    for t in &m.tracks {
        out.header(format!("Track {}", t.number))?;
        out.form("Name", &t.name, 13)?;
        out.form("Type", track_type(t.track_type), 13)?;
        out.form("Language", &t.language, 13)?;
        out.blank()?;
    }

    for a in &m.attachments {
        ctx.out.header("Attachment")?;
        ctx.out.form("Name", &a.name, 13)?;
        ctx.out.form("Media Type", &a.media_type, 13)?;
        ctx.out.form("Description", &a.description, 13)?;
        ctx.out.blank()?;
        if a.size > 0 {
            match registry::start_parsing(ctx, src, Action::Show, a.data_at, a.size) {
                Ok(true) => {}
                Ok(false) => nested_line(ctx, "Unsupported file type")?,
                Err(e) => {
                    tracing::warn!(offset = a.data_at, error = %format!("{e:#}"), "attachment parse failed");
                    nested_line(ctx, format!("Error while processing attachment: {e:#}"))?;
                }
            }
        }
        ctx.out.blank()?;
    }

    let out = &mut ctx.out;
    for t in m.tags.iter().filter(|t| t.name != "BPS") {
        out.header("Tag")?;
        out.form("Name", &t.name, 13)?;
        out.form("Target Type", &t.target_type, 13)?;
        out.form("Language", &t.language, 13)?;
        out.form("Value", &t.value, 13)?;
        out.blank()?;
    }
    Ok(())
}
