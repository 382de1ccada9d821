use crate::error::{MetaError, Result};
use anyhow::Context;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Positioned access to a file. Reads never depend on a shared cursor: every
/// call seeks to its own offset first.
#[derive(Debug)]
pub struct Source {
    file: File,
    path: PathBuf,
    len: u64,
}

impl Source {
    /// Open read-only, or read-write when the action rewrites bytes in place.
    pub fn open(path: impl AsRef<Path>, writable: bool) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(writable).open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, path, len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.len
    }

    /// Read exactly `len` bytes at `offset`.
    pub fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let end = offset.checked_add(len).ok_or(MetaError::Truncated { what: "range", offset })?;
        if end > self.len {
            return Err(MetaError::Truncated { what: "range", offset });
        }
        let mut f = &self.file;
        f.seek(SeekFrom::Start(offset))?;
        let mut v = vec![0u8; len as usize];
        f.read_exact(&mut v)?;
        Ok(v)
    }

    /// Read up to `len` bytes at `offset`; shorter near end of file.
    pub fn read_prefix(&self, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
        let available = self.len.saturating_sub(offset).min(len);
        let mut f = &self.file;
        f.seek(SeekFrom::Start(offset))?;
        let mut v = Vec::with_capacity(available as usize);
        f.take(available).read_to_end(&mut v)?;
        Ok(v)
    }

    pub fn write_at(&self, offset: u64, bytes: &[u8]) -> std::io::Result<()> {
        let mut f = &self.file;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(bytes)?;
        f.flush()
    }

    /// Stream `len` bytes starting at `offset` into `w`.
    pub fn copy_range(&self, offset: u64, len: u64, w: &mut dyn Write) -> std::io::Result<()> {
        let mut f = &self.file;
        f.seek(SeekFrom::Start(offset))?;
        let copied = std::io::copy(&mut f.take(len), w)?;
        if copied != len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("expected {len} bytes at offset {offset}, copied {copied}"),
            ));
        }
        Ok(())
    }
}

/// Rewrite `path` through a temp file in the same directory, committed by an
/// atomic rename. The original is untouched when `fill` fails.
pub fn replace_file<F>(path: &Path, fill: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut dyn Write) -> anyhow::Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    {
        let mut w = BufWriter::new(tmp.as_file_mut());
        fill(&mut w)?;
        w.flush()?;
    }
    let perms = fs::metadata(path)?.permissions();
    fs::set_permissions(tmp.path(), perms)?;
    tracing::debug!(temp = %tmp.path().display(), target = %path.display(), "swapping rewritten file");
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("renaming temp file over {}", path.display()))?;
    Ok(())
}

/// `<dir>/<stem of src><suffix>`, creating `dir` when missing.
pub fn extraction_path(dir: &Path, src: &Path, suffix: &str) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let stem = src.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    Ok(dir.join(format!("{stem}{suffix}")))
}

pub fn hex_dump(bytes: &[u8], start_offset: u64) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let offs = start_offset + (i as u64) * 16;
        let hexs: String = chunk.iter().map(|b| format!("{:02x} ", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}  {:<48}  |{}|\n", offs, hexs, ascii));
    }
    out
}

/// Lossy ASCII/UTF-8 rendering used for FourCCs and fixed-width header fields.
pub fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Pseudo-random `[a-z]` source for scrambling provenance strings.
/// Not suitable for anything that has to be unguessable.
pub struct Scrambler {
    state: u64,
}

impl Scrambler {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn from_time() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x5eed);
        Self::new(nanos ^ u64::from(std::process::id()))
    }

    fn next(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state >> 33
    }

    pub fn letter(&mut self) -> u8 {
        b'a' + (self.next() % 26) as u8
    }

    pub fn letters(&mut self, n: usize) -> Vec<u8> {
        (0..n).map(|_| self.letter()).collect()
    }
}
