use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use env_logger::Builder;
use log::{error, LevelFilter};
use thiserror::Error;

use edgestack_helper::{
    config::{Config, ConfigError},
    render::{self, RenderError},
};

/// Render docker-compose/nginx artifacts from config.yml
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config.yml
    #[arg(long, value_name = "PATH", default_value = "config/config.yml")]
    config: PathBuf,

    /// Templates directory
    #[arg(long, value_name = "DIR", default_value = "templates")]
    templates: PathBuf,

    /// Output directory
    #[arg(long, value_name = "DIR", default_value = "out")]
    out: PathBuf,

    /// Set the loglevel of the application
    #[arg(
        value_enum,
        short = 'l',
        long,
        default_value_t = Loglevel::Info,
        value_name = "LEVEL",
        env = "EDGESTACK_LOGLEVEL"
    )]
    loglevel: Loglevel,
}

// log::Level doesn't derive ValueEnum, so re-create it here
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Loglevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<Loglevel> for LevelFilter {
    fn from(ll: Loglevel) -> Self {
        match ll {
            Loglevel::Error => LevelFilter::Error,
            Loglevel::Warn => LevelFilter::Warn,
            Loglevel::Info => LevelFilter::Info,
            Loglevel::Debug => LevelFilter::Debug,
            Loglevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Error, Debug)]
enum RunError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Render(#[from] RenderError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    Builder::new().filter_level(cli.loglevel.into()).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), RunError> {
    let cfg = Config::load(&cli.config)?;
    let config_dir = cli.config.parent().unwrap_or_else(|| Path::new("."));
    render::render(&cfg, config_dir, &cli.templates, &cli.out)?;
    println!("Rendered to {}/", cli.out.display());
    Ok(())
}
