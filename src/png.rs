//! PNG chunk walker and textual chunks.

use crate::error::{MetaError, Result};
use crate::registry::{Action, Context, FormatParser};
use crate::util::{Source, lossy, replace_file};
use anyhow::Context as _;
use byteorder::{BigEndian, ByteOrder};
use flate2::read::ZlibDecoder;
use std::io::Read;

pub const SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub start_offset: u64,
    pub length: u32,
    pub typ: [u8; 4],
}

impl Chunk {
    /// Length + type + data + CRC.
    pub fn total_len(&self) -> u64 {
        12 + u64::from(self.length)
    }

    pub fn is_textual(&self) -> bool {
        matches!(&self.typ, b"tEXt" | b"zTXt" | b"iTXt")
    }

    pub fn data(&self, src: &Source) -> Result<Vec<u8>> {
        src.read_at(self.start_offset + 8, u64::from(self.length))
    }

    /// Keyword and decoded text of a textual chunk.
    pub fn text(&self, src: &Source) -> Result<(String, String)> {
        let data = self.data(src)?;
        let (keyword, rest) = split_nul(&data);
        let value = match &self.typ {
            b"tEXt" => lossy(rest),
            b"zTXt" => {
                // compression method byte, then the zlib stream
                inflate(rest.get(1..).unwrap_or_default())?
            }
            b"iTXt" => {
                let compressed = rest.first().copied().unwrap_or(0) == 1;
                let tail = rest.get(2..).unwrap_or_default();
                let (_language, tail) = split_nul(tail);
                let (_translated, text) = split_nul(tail);
                if compressed { inflate(text)? } else { lossy(text) }
            }
            other => return Err(MetaError::Corrupt(format!("{} is not a text chunk", lossy(other)))),
        };
        Ok((lossy(keyword), value))
    }
}

fn split_nul(b: &[u8]) -> (&[u8], &[u8]) {
    match b.iter().position(|&c| c == 0) {
        Some(i) => (&b[..i], &b[i + 1..]),
        None => (b, &[]),
    }
}

fn inflate(compressed: &[u8]) -> Result<String> {
    let mut out = Vec::new();
    ZlibDecoder::new(compressed)
        .read_to_end(&mut out)
        .map_err(|e| MetaError::Corrupt(format!("invalid zlib text: {e}")))?;
    Ok(lossy(&out))
}

/// All chunks in file order, from the end of the signature to the end of the
/// range.
pub fn chunks(src: &Source, offset: u64, length: u64) -> Result<Vec<Chunk>> {
    let end = offset + length;
    let mut at = offset + 8;
    let mut result = Vec::new();
    while at < end {
        if at + 12 > end {
            return Err(MetaError::Truncated { what: "PNG chunk header", offset: at });
        }
        let header = src.read_at(at, 8)?;
        let chunk = Chunk {
            start_offset: at,
            length: BigEndian::read_u32(&header[0..4]),
            typ: [header[4], header[5], header[6], header[7]],
        };
        if at + chunk.total_len() > end {
            return Err(MetaError::Truncated { what: "PNG chunk", offset: at });
        }
        tracing::trace!(offset = at, typ = %lossy(&chunk.typ), len = chunk.length, "png chunk");
        at += chunk.total_len();
        result.push(chunk);
    }
    Ok(result)
}

/// Keyword/value pairs of every textual chunk, in file order.
pub fn text_data(src: &Source, chunks: &[Chunk]) -> Result<Vec<(String, String)>> {
    chunks.iter().filter(|c| c.is_textual()).map(|c| c.text(src)).collect()
}

/// Rewrite the file without its textual chunks.
pub fn remove_text_data(src: &Source, chunks: &[Chunk]) -> anyhow::Result<()> {
    replace_file(src.path(), |w| {
        w.write_all(SIGNATURE)?;
        for c in chunks.iter().filter(|c| !c.is_textual()) {
            src.copy_range(c.start_offset, c.total_len(), w)?;
        }
        Ok(())
    })
}

pub struct PngParser;

impl FormatParser for PngParser {
    fn name(&self) -> &'static str {
        "PNG"
    }

    fn supports(&self, src: &Source, offset: u64, _length: u64) -> Result<bool> {
        Ok(src.read_prefix(offset, 8)? == SIGNATURE)
    }

    fn handle(
        &self,
        ctx: &mut Context<'_>,
        src: &Source,
        action: Action,
        offset: u64,
        length: u64,
    ) -> anyhow::Result<()> {
        let chunks = chunks(src, offset, length).context("walking PNG chunks")?;
        let out = &mut ctx.out;
        match action {
            Action::Show => {
                let text = text_data(src, &chunks).context("decoding PNG text chunks")?;
                if text.is_empty() {
                    out.line("Textual data not found!")?;
                    return Ok(());
                }
                let width = text.iter().map(|(k, _)| k.len()).max().unwrap_or(0).max(13);
                for (k, v) in &text {
                    out.form(k, v, width)?;
                }
            }
            Action::Clear => {
                if !chunks.iter().any(Chunk::is_textual) {
                    out.line("There is no textual data to remove!")?;
                    return Ok(());
                }
                remove_text_data(src, &chunks)?;
                out.line("Textual data has been removed!")?;
            }
            Action::Extract => out.line("Nothing to extract from PNG files")?,
        }
        Ok(())
    }
}
