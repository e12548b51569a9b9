mod commands;
mod environment;

use clap::{ArgGroup, Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "snaps-launch", version)]
#[command(
    about = "Deploy and clean OpenStack environments described in a YAML file",
    long_about = None
)]
#[command(group(ArgGroup::new("action").required(true).args(["deploy", "clean"])))]
struct Cli {
    /// Environment file (YAML, rendered as a Tera template)
    #[arg(short = 'e', long = "env-file", env = "SNAPS_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// YAML file whose keys become template variables
    #[arg(short = 'v', long = "vars")]
    vars: Option<PathBuf>,

    /// openrc file used when the environment file has no connection
    #[arg(long)]
    openrc: Option<PathBuf>,

    /// Create every configured resource and apply the playbooks
    #[arg(short = 'd', long)]
    deploy: bool,

    /// Remove every configured resource
    #[arg(short = 'c', long)]
    clean: bool,

    /// Also delete images when cleaning
    #[arg(
        short = 'i',
        long = "clean-images",
        requires = "clean",
        conflicts_with = "deploy"
    )]
    clean_images: bool,

    /// Log level (RUST_LOG takes precedence)
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        ignore_case = true,
        default_value_t = LogLevel::Info
    )]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

fn init_logging(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    let env = environment::load(
        cli.env_file.as_deref(),
        cli.vars.as_deref(),
        cli.openrc.as_deref(),
    )?;

    if cli.deploy {
        commands::deploy::handle(env).await
    } else {
        commands::clean::handle(env, cli.clean_images).await
    }
}
