//! `ferrisnap` command line entry point.
//!
//! Reads the configuration, backs up every listed device and sweeps old
//! backups from local storage.
//!
//! # Usage
//!
//! ```bash
//! ferrisnap --config config.json
//! RUST_LOG=debug ferrisnap --config config.json --concurrency 4
//! ```
//!
//! Exit codes: 0 when the run completed (per-device failures are reported,
//! not fatal), 1 with `--strict` when anything failed, 2 when the
//! configuration or local storage is unusable.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use ferrisnap::config::DEFAULT_CONFIG_PATH;
use ferrisnap::{BackupConfig, BackupOrchestrator, RetentionPolicy, SshConnector, StorageLayout};

/// Back up network device configurations over SSH.
#[derive(Parser, Debug)]
#[command(name = "ferrisnap", version, about)]
struct Args {
    /// Path to the JSON configuration document.
    #[arg(short, long, env = "FERRISNAP_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the storage root from the configuration.
    #[arg(long, env = "FERRISNAP_STORAGE_ROOT")]
    storage_root: Option<PathBuf>,

    /// Override `backup_age` (days) from the configuration.
    #[arg(long)]
    backup_age: Option<u64>,

    /// Override how many devices are processed at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Do not delete old backups after the run.
    #[arg(long)]
    skip_retention: bool,

    /// Exit with status 1 if any device, artifact or cleanup failed.
    #[arg(long)]
    strict: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, ferrisnap::Error> {
    let mut config = BackupConfig::load(&args.config)?;

    if let Some(root) = args.storage_root {
        config.storage = StorageLayout::new(root);
    }
    if let Some(days) = args.backup_age {
        config.retention = RetentionPolicy::new(days);
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }

    config.storage.ensure()?;

    let orchestrator = BackupOrchestrator::new(
        SshConnector::new(config.transport.clone()),
        config.storage.clone(),
    )
    .with_settle(config.settle.clone())
    .with_concurrency(config.concurrency);

    let retention = (!args.skip_retention).then_some(config.retention);
    let report = orchestrator.execute(&config.devices, retention).await;

    println!("{}", report);

    if args.strict && report.has_failures() {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["ferrisnap"]).unwrap();
        assert_eq!(args.config, PathBuf::from("config.json"));
        assert!(args.storage_root.is_none());
        assert!(!args.strict);
        assert!(!args.skip_retention);
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::try_parse_from([
            "ferrisnap",
            "--config",
            "/etc/ferrisnap.json",
            "--backup-age",
            "7",
            "--concurrency",
            "4",
            "--strict",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/ferrisnap.json"));
        assert_eq!(args.backup_age, Some(7));
        assert_eq!(args.concurrency, Some(4));
        assert!(args.strict);
        assert!(args.verbose);
    }

    #[tokio::test]
    async fn test_missing_config_fails_before_any_device() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::try_parse_from([
            "ferrisnap",
            "--config",
            dir.path().join("absent.json").to_str().unwrap(),
        ])
        .unwrap();

        let err = run(args).await.unwrap_err();
        assert!(matches!(
            err,
            ferrisnap::Error::Config(ferrisnap::error::ConfigError::NotFound { .. })
        ));
    }
}
