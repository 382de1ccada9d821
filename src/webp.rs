//! RIFF/WebP chunks carrying EXIF, XMP and ICC data.

use crate::error::{MetaError, Result};
use crate::exif;
use crate::icc;
use crate::registry::{Action, Context, FormatParser};
use crate::util::{Source, lossy, replace_file};
use anyhow::Context as _;
use byteorder::{ByteOrder, LittleEndian};

pub const METADATA_CHUNKS: [&[u8; 4]; 3] = [b"EXIF", b"XMP ", b"ICCP"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub start_offset: u64,
    pub four_cc: [u8; 4],
    pub size: u32,
}

impl Chunk {
    /// Header, payload and the pad byte of odd-sized payloads.
    pub fn total_len(&self) -> u64 {
        8 + u64::from(self.size) + u64::from(self.size & 1)
    }

    pub fn is_metadata(&self) -> bool {
        METADATA_CHUNKS.contains(&&self.four_cc)
    }

    pub fn data(&self, src: &Source) -> Result<Vec<u8>> {
        src.read_at(self.start_offset + 8, u64::from(self.size))
    }
}

pub fn chunks(src: &Source, offset: u64, length: u64) -> Result<Vec<Chunk>> {
    let end = offset + length;
    let mut at = offset + 12;
    let mut result = Vec::new();
    while at + 8 <= end {
        let header = src.read_at(at, 8)?;
        let mut four_cc = [header[0], header[1], header[2], header[3]];
        if four_cc[3] == 0 {
            four_cc[3] = b' ';
        }
        let chunk = Chunk { start_offset: at, four_cc, size: LittleEndian::read_u32(&header[4..8]) };
        if at + 8 + u64::from(chunk.size) > end {
            return Err(MetaError::Truncated { what: "RIFF chunk", offset: at });
        }
        tracing::trace!(offset = at, four_cc = %lossy(&chunk.four_cc), size = chunk.size, "riff chunk");
        at += chunk.total_len();
        result.push(chunk);
    }
    Ok(result)
}

/// Rewrite the file as `RIFF <size> WEBP` followed by every chunk that does
/// not carry metadata.
pub fn remove_metadata(src: &Source, chunks: &[Chunk]) -> anyhow::Result<()> {
    let file_end = src.size();
    let kept: Vec<&Chunk> = chunks.iter().filter(|c| !c.is_metadata()).collect();
    let body: u64 = kept.iter().map(|c| c.total_len().min(file_end - c.start_offset)).sum();
    let riff_size = u32::try_from(4 + body).context("rewritten RIFF exceeds 4 GiB")?;
    replace_file(src.path(), |w| {
        w.write_all(b"RIFF")?;
        w.write_all(&riff_size.to_le_bytes())?;
        w.write_all(b"WEBP")?;
        for c in kept {
            src.copy_range(c.start_offset, c.total_len().min(file_end - c.start_offset), w)?;
        }
        Ok(())
    })
}

pub struct WebpParser;

impl FormatParser for WebpParser {
    fn name(&self) -> &'static str {
        "WebP"
    }

    fn supports(&self, src: &Source, offset: u64, length: u64) -> Result<bool> {
        let head = src.read_prefix(offset, 12)?;
        if head.len() < 12 || &head[0..4] != b"RIFF" || &head[8..12] != b"WEBP" {
            return Ok(false);
        }
        Ok(u64::from(LittleEndian::read_u32(&head[4..8])) + 8 == length)
    }

    fn handle(
        &self,
        ctx: &mut Context<'_>,
        src: &Source,
        action: Action,
        offset: u64,
        length: u64,
    ) -> anyhow::Result<()> {
        let chunks = chunks(src, offset, length).context("walking RIFF chunks")?;
        match action {
            Action::Show => {
                for c in chunks.iter().filter(|c| c.is_metadata()) {
                    let data = c.data(src)?;
                    let out = &mut ctx.out;
                    match &c.four_cc {
                        b"EXIF" => {
                            let ifds = exif::parse_tiff(exif::strip_prefix(&data))
                                .with_context(|| format!("decoding EXIF chunk at {}", c.start_offset))?;
                            out.line(format!("EXIF chunk holds {} IFDs", ifds.len()))?;
                            out.blank()?;
                            exif::print_ifds(out, &ifds)?;
                        }
                        b"XMP " => {
                            out.header("XMP")?;
                            out.multiline(&lossy(&data))?;
                            out.blank()?;
                        }
                        _ => {
                            let profile = icc::parse(&data)
                                .with_context(|| format!("decoding ICC chunk at {}", c.start_offset))?;
                            icc::print_profile(out, &profile)?;
                            out.blank()?;
                        }
                    }
                }
            }
            Action::Clear => {
                if !chunks.iter().any(Chunk::is_metadata) {
                    ctx.out.line("No metadata found in file!")?;
                    return Ok(());
                }
                ctx.out.line("Filtering metadata chunks...")?;
                remove_metadata(src, &chunks)?;
                ctx.out.line("Metadata chunks have been removed!")?;
            }
            Action::Extract => ctx.out.line("Nothing to extract from WebP files")?,
        }
        Ok(())
    }
}
