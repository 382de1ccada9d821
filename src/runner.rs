//! Runs one action over a file or a directory tree.
//!
//! Failures are reported in the output and never abort a directory walk.
//! Only errors writing the report itself are returned.

use crate::config::Config;
use crate::output::Output;
use crate::registry::{Action, Context, Registry};
use crate::util::Source;
use std::io::Write;
use std::path::Path;
use walkdir::WalkDir;

/// Run `action` on a single file. Returns whether a parser recognised it.
pub fn run_file(
    registry: &Registry,
    config: &Config,
    path: &Path,
    action: Action,
    w: &mut dyn Write,
) -> std::io::Result<bool> {
    let mut ctx = Context::new(registry, config, Output::new(w));
    ctx.out.reversed("Opening file ", path.display())?;

    let src = match Source::open(path, action.needs_write()) {
        Ok(src) => src,
        Err(e) => {
            ctx.out.line(format!("Error opening file: {e}"))?;
            return Ok(false);
        }
    };
    let size = src.size();
    match registry.start_parsing(&mut ctx, &src, action, 0, size) {
        Ok(true) => Ok(true),
        Ok(false) => {
            ctx.out.line("Invalid file format.  The following formats are supported:")?;
            ctx.out.line(registry.names().join("   "))?;
            Ok(false)
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = ?e, "handler failed");
            ctx.out.line(format!("Error handling file: {e:#}"))?;
            Ok(true)
        }
    }
}

/// Whether any parser claims the file. Unreadable files are unsupported.
pub fn is_supported(registry: &Registry, path: &Path) -> bool {
    let check = || -> crate::error::Result<bool> {
        let src = Source::open(path, false)?;
        Ok(registry.select(&src, 0, src.size())?.is_some())
    };
    match check() {
        Ok(supported) => supported,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "sniff failed");
            false
        }
    }
}

/// Run `action` on `path`, walking it recursively when it is a directory.
/// In directory mode only files some parser recognises are handled.
pub fn run_path(
    registry: &Registry,
    config: &Config,
    path: &Path,
    action: Action,
    w: &mut dyn Write,
) -> std::io::Result<()> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            writeln!(w, "Error retrieving information for {}: {e}", path.display())?;
            return Ok(());
        }
    };
    if !meta.is_dir() {
        run_file(registry, config, path, action, w)?;
        return Ok(());
    }

    let mut supported = 0usize;
    let mut total = 0usize;
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                writeln!(w, "Encountered error while processing file: {e}")?;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        total += 1;
        if !is_supported(registry, entry.path()) {
            tracing::trace!(path = %entry.path().display(), "skipping unsupported file");
            continue;
        }
        supported += 1;
        run_file(registry, config, entry.path(), action, w)?;
        writeln!(w)?;
        writeln!(w)?;
    }
    writeln!(w, "Recursively parsed {supported} files out of {total} files in folder {}", path.display())
}
