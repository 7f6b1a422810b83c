use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use env_logger::Builder;
use log::{error, info, LevelFilter};
use thiserror::Error;

use edgestack_helper::{
    config::{self, Config, ConfigError},
    desired,
    ipsource::SourceError,
    provider::{CloudflareProvider, ProviderError},
    reconcile::{self, Mode, ReconcileError},
};

/// Upsert the Cloudflare DNS records required by the configured sites
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config.yml
    #[arg(long, value_name = "PATH", default_value = "config/config.yml")]
    config: PathBuf,

    /// Path to secrets.env
    #[arg(long, value_name = "PATH", default_value = "config/secrets.env")]
    secrets: PathBuf,

    /// Actually apply changes (default: plan only)
    #[arg(long, action, default_value_t = false)]
    apply: bool,

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
    Source(#[from] SourceError),
    #[error("{0}")]
    Provider(#[from] ProviderError),
    #[error("{0}")]
    Reconcile(#[from] ReconcileError),
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
    let cf = cfg.cloudflare.as_ref().ok_or_else(|| {
        ConfigError::Invalid("cloudflare must be a mapping".to_string())
    })?;

    let records = desired::build(cf, &cfg.edge)?;
    if records.is_empty() {
        println!("cloudflare.dns.enabled is false; nothing to do.");
        return Ok(());
    }

    let secrets = if cli.secrets.exists() {
        config::load_env_file(&cli.secrets)?
    } else {
        HashMap::new()
    };
    let process_env: HashMap<String, String> = env::vars().collect();
    let token = config::resolve_api_token(cf, &process_env, &secrets).ok_or_else(|| {
        ConfigError::MissingToken {
            env_name: cf.token_env_name().to_owned(),
            secrets_path: cli.secrets.display().to_string(),
        }
    })?;

    let provider = CloudflareProvider::new(&token)?;
    let mode = if cli.apply { Mode::Apply } else { Mode::Plan };
    if mode == Mode::Plan {
        info!("Running in plan mode, no changes will be made (pass --apply to mutate)");
    }

    reconcile::run(&provider, records, mode)?;
    Ok(())
}
