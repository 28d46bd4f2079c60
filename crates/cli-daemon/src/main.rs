//! CLI entry point for recodarr
//!
//! Loads the configuration, installs logging, and processes the given files
//! through the job queue until it drains.

use clap::Parser;
use recodarr::config::{LogFormat, LoggingConfig};
use recodarr::{Config, Daemon};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONFIG_FILE: &str = "config.toml";

/// recodarr - rule-driven media re-encoding with ffmpeg
#[derive(Parser, Debug)]
#[command(name = "recodarr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file [default: $CONFIG_DIR/config.toml]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding config.toml when --config is not given
    #[arg(long, env = "CONFIG_DIR", hide_env_values = true)]
    config_dir: Option<PathBuf>,

    /// Encoding profile for the submitted files; unknown names use "default"
    #[arg(short, long)]
    profile: Option<String>,

    /// Skip startup checks (ffmpeg, ffprobe, directories). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Logical source paths, relative to the data directory
    #[arg(required = true)]
    files: Vec<String>,
}

impl Args {
    fn config_path(&self) -> PathBuf {
        match (&self.config, &self.config_dir) {
            (Some(path), _) => path.clone(),
            (None, Some(dir)) => dir.join(CONFIG_FILE),
            (None, None) => PathBuf::from(CONFIG_FILE),
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(env_filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config_path = args.config_path();

    let (config, created) = match Config::load_or_init(&config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            init_logging(&LoggingConfig::default());
            error!(path = %config_path.display(), error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging);
    if created {
        warn!(
            path = %config_path.display(),
            "No configuration found, wrote a default one"
        );
    }
    info!(
        config = %config_path.display(),
        concurrency = config.queue.concurrency,
        "recodarr starting"
    );

    let daemon = if args.skip_checks {
        warn!("Skipping startup checks (--skip-checks enabled)");
        Daemon::new_without_checks(config)
    } else {
        Daemon::new(config).await
    };

    let daemon = match daemon {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "Failed to initialize daemon");
            return ExitCode::FAILURE;
        }
    };

    daemon.run(args.files, args.profile.as_deref()).await;
    ExitCode::SUCCESS
}
