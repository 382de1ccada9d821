pub mod config;
pub mod error;
pub mod exif;
pub mod icc;
pub mod logging;
pub mod output;
pub mod registry;
pub mod runner;
pub mod util;

pub mod elf;
pub mod flac;
pub mod jpeg;
pub mod mkv;
pub mod mp4;
pub mod png;
pub mod webp;

pub use config::Config;
pub use error::{MetaError, Result};
pub use output::Output;
pub use registry::{Action, Context, FormatParser, Registry, default_registry};
pub use runner::{run_file, run_path};
pub use util::{Scrambler, Source};
