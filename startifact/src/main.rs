use clap::{Parser, Subcommand};
use semver::Version;
use stager::VersionSpec;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod config;
mod telemetry;

#[derive(Parser)]
#[command(name = "startifact", version, about = "Stages versioned artifacts in several regions")]
struct Cli {
    /// YAML config file. Defaults to ./startifact.yaml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Perform every read but no writes.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Stage an artifact in every region.
    Stage {
        project: String,
        version: Version,
        path: PathBuf,
        /// Metadata as key=value. Repeatable.
        #[arg(long = "metadata", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
    },
    /// Print the latest staged version of a project.
    Version { project: String },
    /// Print an artifact's metadata.
    Metadata {
        project: String,
        #[arg(long, default_value = "latest")]
        version: VersionSpec,
    },
    /// Download an artifact.
    Download {
        project: String,
        path: PathBuf,
        #[arg(long, default_value = "latest")]
        version: VersionSpec,
    },
    /// Show or change the organisation configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum ConfigCommand {
    Show,
    /// Replicate an updated configuration to every configured region.
    Set {
        #[arg(long)]
        bucket_param_name: Option<String>,
        #[arg(long)]
        bucket_key_prefix: Option<String>,
        #[arg(long)]
        parameter_name_prefix: Option<String>,
        /// Comma-separated regions.
        #[arg(long)]
        regions: Option<String>,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("🔥 {e}");
            return ExitCode::FAILURE;
        }
    };

    let _telemetry = match telemetry::init(&cli.log_level, &config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("🔥 {e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("🔥 could not start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(commands::run(cli, &config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("🔥 {e}");
            ExitCode::FAILURE
        }
    }
}
