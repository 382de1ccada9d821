//! ELF executables: DWARF and Go provenance strings.

pub mod buildinfo;
pub mod dwarf;
pub mod gosym;
pub mod sections;

use crate::registry::{Action, Context, FormatParser};
use crate::util::{Scrambler, Source};
use anyhow::Context as _;
use sections::{Elf, MAGIC, Section};

/// Overwrite every occurrence of `target` in `buf` with one random string
/// of the same length. Returns the number of occurrences replaced.
pub fn scramble_occurrences(buf: &mut [u8], target: &[u8], scrambler: &mut Scrambler) -> usize {
    if target.is_empty() || target.len() > buf.len() {
        return 0;
    }
    let replacement = scrambler.letters(target.len());
    let mut count = 0;
    let mut i = 0;
    while i + target.len() <= buf.len() {
        if &buf[i..i + target.len()] == target {
            buf[i..i + target.len()].copy_from_slice(&replacement);
            count += 1;
            i += target.len();
        } else {
            i += 1;
        }
    }
    count
}

/// Scramble the build ID in place, keeping its `/` separators.
pub fn scramble_build_id(note: &mut [u8], scrambler: &mut Scrambler) {
    if let Some(range) = buildinfo::build_id_range(note) {
        for b in &mut note[range] {
            if *b != b'/' {
                *b = scrambler.letter();
            }
        }
    }
}

fn writable_section<'e>(elf: &'e Elf, name: &str) -> Option<&'e Section> {
    let s = elf.section(name)?;
    if s.is_compressed() {
        tracing::warn!(section = name, "compressed section left untouched");
        return None;
    }
    Some(s)
}

pub struct ElfParser;

impl ElfParser {
    fn show(&self, ctx: &mut Context<'_>, src: &Source, elf: &Elf) -> anyhow::Result<()> {
        let dwarf_files = match dwarf::source_files(elf, src) {
            Ok(files) => files,
            Err(e) => {
                tracing::debug!(error = %e, "DWARF line tables unreadable");
                None
            }
        };
        let go_files = gosym::source_files(elf, src).context("reading Go symbol table")?;
        let build_id = elf
            .section_data(src, ".note.go.buildid")
            .context("reading .note.go.buildid")?
            .and_then(|data| buildinfo::build_id(&data));
        let build_info = buildinfo::build_info(elf, src);

        let out = &mut ctx.out;
        let mut found = false;
        for (title, files) in [("DWARF Source Files", dwarf_files), ("Go Symbol Table Files", go_files)] {
            let Some(files) = files else { continue };
            found = true;
            out.header(title)?;
            for f in &files {
                out.line(f)?;
            }
            out.blank()?;
        }
        if let Some(id) = build_id {
            found = true;
            out.header("Go Build ID")?;
            out.line(id)?;
            out.blank()?;
        }
        if let Some(info) = build_info {
            found = true;
            out.header("Go Build Info")?;
            out.multiline(&info)?;
        }
        if !found {
            out.line("No DWARF or Go metadata found")?;
        }
        Ok(())
    }

    fn clear(&self, ctx: &mut Context<'_>, src: &Source, elf: &Elf) -> anyhow::Result<()> {
        if let Some(files) = gosym::source_files(elf, src).context("reading Go symbol table")? {
            if let Some(pclntab) = writable_section(elf, ".gopclntab") {
                ctx.out.line("Found .gopclntab section.  Obfuscating file names...")?;
                let mut data = elf.raw_data(src, pclntab)?;
                let mut replaced = 0;
                for f in &files {
                    replaced += scramble_occurrences(&mut data, f.as_bytes(), &mut ctx.scrambler);
                }
                src.write_at(elf.base + pclntab.offset, &data).context("writing .gopclntab")?;
                tracing::debug!(files = files.len(), replaced, "pclntab scrambled");
                ctx.out.line("Obfuscated file names has been saved!")?;
            }
        }
        if let Some(note) = writable_section(elf, ".note.go.buildid") {
            ctx.out.line("Found .note.go.buildid.  Obfuscating value...")?;
            let mut data = elf.raw_data(src, note)?;
            scramble_build_id(&mut data, &mut ctx.scrambler);
            src.write_at(elf.base + note.offset, &data).context("writing .note.go.buildid")?;
            ctx.out.line("Obfuscated Build ID has been saved!")?;
        }
        Ok(())
    }
}

impl FormatParser for ElfParser {
    fn name(&self) -> &'static str {
        "ELF (Executable)"
    }

    fn supports(&self, src: &Source, offset: u64, _length: u64) -> crate::error::Result<bool> {
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
        let elf = Elf::parse(src, offset, length).context("reading ELF section table")?;
        match action {
            Action::Show => self.show(ctx, src, &elf),
            Action::Clear => self.clear(ctx, src, &elf),
            Action::Extract => Ok(ctx.out.line("Nothing to extract from ELF files")?),
        }
    }
}
