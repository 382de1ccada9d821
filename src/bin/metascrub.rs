use clap::{CommandFactory, Parser};
use metascrub::{Action, Config, default_registry, logging, output, run_path};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Show, clear or extract metadata embedded in media and executable files")]
struct Args {
    /// Input file or directory
    #[arg(short = 'f')]
    file: Option<PathBuf>,

    /// Action to perform: show, clear, extract
    #[arg(short = 'a', default_value = "show")]
    action: String,
}

fn print_help(reason: impl std::fmt::Display) -> anyhow::Result<()> {
    println!("{reason}");
    Args::command().print_help()?;
    println!();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    output::setup();
    logging::init();
    let args = Args::parse();

    let Some(path) = args.file else {
        return print_help("Invalid input filename");
    };
    let action: Action = match args.action.parse() {
        Ok(a) => a,
        Err(e) => return print_help(e),
    };

    let config = Config::from_env();
    let registry = default_registry();
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    run_path(&registry, &config, &path, action, &mut lock)?;
    lock.flush()?;
    Ok(())
}
