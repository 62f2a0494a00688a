use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod format;
mod style;
mod util;

use cli::{Cli, Commands};
use commands::WatchArgs;
use config::{Config, resolve_device, resolve_timeout};
use format::FormatOptions;
use util::open_storage;

/// Connection timeout when neither flag nor config sets one.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "vitals", &mut io::stdout());
        return Ok(());
    }

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = Config::load();
    let opts = FormatOptions::new(cli.no_color);
    let output = cli.output.as_ref();
    let storage_dir = cli.storage_dir.as_deref();

    match cli.command {
        Commands::Scan { timeout, format } => {
            let timeout = config.resolve_scan_timeout(timeout);
            commands::cmd_scan(timeout, format, output, cli.quiet, &opts).await
        }
        Commands::Watch {
            device,
            format,
            count,
            queue,
        } => {
            let timeout = resolve_timeout(device.timeout, &config, DEFAULT_CONNECT_TIMEOUT_SECS);
            commands::cmd_watch(WatchArgs {
                device: resolve_device(device.device, &config),
                timeout: Duration::from_secs(timeout),
                format,
                count,
                queue_offline: queue || config.queue_offline,
                output,
                quiet: cli.quiet,
                opts: &opts,
                storage: open_storage(storage_dir)?,
            })
            .await
        }
        Commands::Status { format } => {
            let storage = open_storage(storage_dir)?;
            commands::cmd_status(&storage, format, output, &opts)
        }
        Commands::Sync { action } => {
            let storage = open_storage(storage_dir)?;
            commands::cmd_sync(action, &config, storage, &opts).await
        }
        Commands::Alerts { format } => {
            let storage = open_storage(storage_dir)?;
            commands::cmd_alerts(&config, &storage, format, output, &opts).await
        }
        Commands::Auth { action } => {
            let storage = open_storage(storage_dir)?;
            commands::cmd_auth(action, &storage, &opts)
        }
        Commands::Config { action } => commands::cmd_config(action, &Config::path()),
        Commands::Doctor => commands::cmd_doctor(cli.no_color).await,
        Commands::Completions { .. } => unreachable!("handled before tracing init"),
    }
}
