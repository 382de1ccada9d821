use crate::config::Config;
use crate::error::Result;
use crate::output::Output;
use crate::util::{Scrambler, Source};
use std::fmt;
use std::str::FromStr;

/// What to do with the metadata of a recognised file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Show,
    Clear,
    Extract,
}

impl Action {
    /// Clear is the only action that writes through the open handle.
    pub fn needs_write(self) -> bool {
        self == Action::Clear
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "show" => Ok(Action::Show),
            "clear" => Ok(Action::Clear),
            "extract" => Ok(Action::Extract),
            other => Err(anyhow::anyhow!("invalid action: {other}")),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Show => "show",
            Action::Clear => "clear",
            Action::Extract => "extract",
        })
    }
}

/// Everything a handler may touch besides the file itself.
pub struct Context<'a> {
    pub registry: &'a Registry,
    pub out: Output<'a>,
    pub config: &'a Config,
    pub scrambler: Scrambler,
}

impl<'a> Context<'a> {
    pub fn new(registry: &'a Registry, config: &'a Config, out: Output<'a>) -> Self {
        let scrambler = match config.seed {
            Some(seed) => Scrambler::new(seed),
            None => Scrambler::from_time(),
        };
        Self { registry, out, config, scrambler }
    }
}

/// One supported container format.
///
/// `supports` sniffs the magic bytes of the range `[offset, offset + length)`;
/// `handle` runs an action over the same range. The registry is reachable
/// through the context so containers can dispatch their embedded payloads.
pub trait FormatParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Containers are never selected for a range at a nonzero offset.
    fn is_container(&self) -> bool {
        false
    }

    fn supports(&self, src: &Source, offset: u64, length: u64) -> Result<bool>;

    fn handle(
        &self,
        ctx: &mut Context<'_>,
        src: &Source,
        action: Action,
        offset: u64,
        length: u64,
    ) -> anyhow::Result<()>;
}

/// Ordered list of format parsers. Immutable once built; the first parser
/// whose sniff succeeds wins.
pub struct Registry {
    parsers: Vec<Box<dyn FormatParser>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { parsers: Vec::new() }
    }

    /// Return a new registry with `parser` appended.
    pub fn with_parser(mut self, parser: Box<dyn FormatParser>) -> Self {
        self.parsers.push(parser);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// First parser eligible for the range whose sniff succeeds.
    pub fn select(&self, src: &Source, offset: u64, length: u64) -> Result<Option<&dyn FormatParser>> {
        for p in &self.parsers {
            if offset > 0 && p.is_container() {
                continue;
            }
            if p.supports(src, offset, length)? {
                return Ok(Some(p.as_ref()));
            }
        }
        Ok(None)
    }

    /// Select a parser for the range and run `action` with it.
    ///
    /// Returns `Ok(false)` when no parser recognises the bytes. A handler
    /// failure stops dispatch and is returned as is.
    pub fn start_parsing(
        &self,
        ctx: &mut Context<'_>,
        src: &Source,
        action: Action,
        offset: u64,
        length: u64,
    ) -> anyhow::Result<bool> {
        let Some(parser) = self.select(src, offset, length)? else {
            tracing::debug!(offset, length, "no parser recognised range");
            return Ok(false);
        };
        tracing::debug!(parser = parser.name(), offset, length, %action, "dispatching");

        let depth = ctx.out.depth();
        let nested = offset > 0;
        if nested {
            ctx.out.set_depth(depth + 1);
        }
        let result = run_selected(parser, ctx, src, action, offset, length);
        ctx.out.set_depth(depth);
        result.map(|_| true)
    }
}

fn run_selected(
    parser: &dyn FormatParser,
    ctx: &mut Context<'_>,
    src: &Source,
    action: Action,
    offset: u64,
    length: u64,
) -> anyhow::Result<()> {
    ctx.out.line(format!("File type is {}", parser.name()))?;
    ctx.out.blank()?;
    parser.handle(ctx, src, action, offset, length)
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatch through the registry held by `ctx`.
pub fn start_parsing(
    ctx: &mut Context<'_>,
    src: &Source,
    action: Action,
    offset: u64,
    length: u64,
) -> anyhow::Result<bool> {
    let registry = ctx.registry;
    registry.start_parsing(ctx, src, action, offset, length)
}

/// All supported formats in dispatch order.
pub fn default_registry() -> Registry {
    Registry::new()
        .with_parser(Box::new(crate::flac::FlacParser))
        .with_parser(Box::new(crate::jpeg::JpegParser))
        .with_parser(Box::new(crate::png::PngParser))
        .with_parser(Box::new(crate::webp::WebpParser))
        .with_parser(Box::new(crate::mkv::MkvParser))
        .with_parser(Box::new(crate::mp4::Mp4Parser))
        .with_parser(Box::new(crate::elf::ElfParser))
}
