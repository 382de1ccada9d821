//! FLAC metadata blocks and Vorbis comments.

use crate::error::{MetaError, Result, slice};
use crate::registry::{Action, Context, FormatParser};
use crate::util::Source;
use anyhow::Context as _;
use byteorder::{ByteOrder, LittleEndian};

pub const MAGIC: &[u8; 4] = b"fLaC";
pub const BLOCK_PADDING: u8 = 1;
pub const BLOCK_VORBIS_COMMENT: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataBlock {
    pub start_offset: u64,
    pub block_type: u8,
    pub length: u32,
    pub last: bool,
}

impl MetadataBlock {
    pub fn data_offset(&self) -> u64 {
        self.start_offset + 4
    }

    pub fn vorbis_comment(&self, src: &Source) -> Result<VorbisComment> {
        if self.block_type != BLOCK_VORBIS_COMMENT {
            return Err(MetaError::Corrupt(format!(
                "block type {} does not hold a Vorbis comment",
                self.block_type
            )));
        }
        let data = src.read_at(self.data_offset(), u64::from(self.length))?;
        VorbisComment::parse(&data)
    }

    /// Turn the block into padding of the same length. The last-block flag
    /// is kept so the chain stays terminated.
    pub fn convert_to_padding(&self, src: &Source) -> Result<()> {
        let mut data = vec![0u8; 4 + self.length as usize];
        let mut header = self.length.to_be_bytes();
        header[0] = if self.last { 0x80 | BLOCK_PADDING } else { BLOCK_PADDING };
        data[..4].copy_from_slice(&header);
        src.write_at(self.start_offset, &data)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VorbisComment {
    pub vendor: String,
    pub user_comments: Vec<String>,
}

impl VorbisComment {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let next_string = |pos: &mut usize, what: &'static str| -> Result<String> {
            let len = LittleEndian::read_u32(slice(data, *pos, *pos + 4, what)?) as usize;
            let s = slice(data, *pos + 4, *pos + 4 + len, what)?;
            *pos += 4 + len;
            Ok(String::from_utf8_lossy(s).into_owned())
        };
        let vendor = next_string(&mut pos, "vendor string")?;
        let count = LittleEndian::read_u32(slice(data, pos, pos + 4, "comment count")?);
        pos += 4;
        let mut user_comments = Vec::new();
        for _ in 0..count {
            user_comments.push(next_string(&mut pos, "user comment")?);
        }
        Ok(Self { vendor, user_comments })
    }
}

/// Walk the block chain starting after the magic until the last-block flag.
pub fn metadata_blocks(src: &Source, offset: u64, length: u64) -> Result<Vec<MetadataBlock>> {
    let end = offset + length;
    let mut at = offset + 4;
    let mut blocks = Vec::new();
    loop {
        if at + 4 > end {
            return Err(MetaError::Truncated { what: "FLAC metadata block", offset: at });
        }
        let header = src.read_at(at, 4)?;
        let block = MetadataBlock {
            start_offset: at,
            block_type: header[0] & 0x7F,
            length: u32::from_be_bytes([0, header[1], header[2], header[3]]),
            last: header[0] & 0x80 != 0,
        };
        tracing::trace!(offset = at, typ = block.block_type, len = block.length, "flac block");
        at += 4 + u64::from(block.length);
        if at > end {
            return Err(MetaError::Truncated { what: "FLAC metadata block", offset: block.start_offset });
        }
        let last = block.last;
        blocks.push(block);
        if last {
            return Ok(blocks);
        }
    }
}

pub struct FlacParser;

impl FormatParser for FlacParser {
    fn name(&self) -> &'static str {
        "FLAC"
    }

    fn supports(&self, src: &Source, offset: u64, _length: u64) -> Result<bool> {
        Ok(src.read_prefix(offset, 4)? == MAGIC)
    }

    fn handle(
        &self,
        ctx: &mut Context<'_>,
        src: &Source,
        action: Action,
        offset: u64,
        length: u64,
    ) -> anyhow::Result<()> {
        let blocks = metadata_blocks(src, offset, length).context("walking FLAC metadata blocks")?;
        let comments: Vec<&MetadataBlock> =
            blocks.iter().filter(|b| b.block_type == BLOCK_VORBIS_COMMENT).collect();
        let out = &mut ctx.out;

        match action {
            Action::Show => {
                if comments.is_empty() {
                    out.line("Vorbis comment metadata not found!")?;
                }
                for block in comments {
                    let comment = block
                        .vorbis_comment(src)
                        .with_context(|| format!("decoding Vorbis comment at {}", block.start_offset))?;
                    out.form("Vendor String", &comment.vendor, 13)?;
                    out.header("User Comments")?;
                    for c in &comment.user_comments {
                        out.line(format!(" {c}"))?;
                    }
                    out.blank()?;
                }
            }
            Action::Clear => {
                if comments.is_empty() {
                    out.line("Vorbis comment metadata not found!")?;
                }
                for block in comments {
                    out.line("Converting Vorbis comment into padding...")?;
                    block.convert_to_padding(src)?;
                    out.line("Vorbis comment has been converted into padding!")?;
                }
            }
            Action::Extract => out.line("Nothing to extract from FLAC files")?,
        }
        Ok(())
    }
}
