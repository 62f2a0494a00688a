//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Reusable device connection arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device identifier (MAC address or peripheral ID), or use VITALS_DEVICE env var
    #[arg(short, long, env = "VITALS_DEVICE")]
    pub device: Option<String>,

    /// Connection timeout in seconds
    #[arg(short = 'T', long, default_value = "30")]
    pub timeout: u64,
}

#[derive(Parser)]
#[command(name = "vitals")]
#[command(author, version, about = "CLI for BLE wearable health monitors", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Storage directory (defaults to the platform data directory)
    #[arg(long, global = true, env = "VITALS_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for nearby health wearables
    Scan {
        /// Scan timeout in seconds (defaults to config, then 15)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Connect to a wearable and stream its vitals
    Watch {
        #[command(flatten)]
        device: DeviceArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Number of readings to print before exiting (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,

        /// Queue readings for upload (overrides config)
        #[arg(long)]
        queue: bool,
    },

    /// Show stored connection history and the upload queue
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Upload queued readings to the backend
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },

    /// Show alerts raised by the backend
    Alerts {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Manage the backend API token
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check Bluetooth permissions and adapter availability
    Doctor,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Sync subcommands
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum SyncAction {
    /// Upload everything in the queue
    Flush,
    /// Show how many readings are waiting
    Status,
}

/// Auth subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum AuthAction {
    /// Store an API token in the secure store
    Login {
        /// Bearer token issued by the backend
        token: String,
    },
    /// Remove the stored token
    Logout,
    /// Report whether a token is stored
    Status,
}

/// Configuration keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigKey {
    /// Default device identifier
    Device,
    /// Default connection timeout in seconds
    Timeout,
    /// Default scan timeout in seconds
    ScanTimeout,
    /// Backend API base URL
    ApiUrl,
    /// Queue readings for upload while watching
    QueueOffline,
}

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Get a configuration value
    Get {
        /// Configuration key
        #[arg(value_enum)]
        key: ConfigKey,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        #[arg(value_enum)]
        key: ConfigKey,
        /// Configuration value
        value: String,
    },

    /// Unset (remove) a configuration value
    Unset {
        /// Configuration key to remove
        #[arg(value_enum)]
        key: ConfigKey,
    },

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_watch_args() {
        let cli = Cli::try_parse_from(["vitals", "watch", "-d", "AA:BB", "-n", "5", "--queue"])
            .unwrap();
        match cli.command {
            Commands::Watch {
                device,
                count,
                queue,
                format,
            } => {
                assert_eq!(device.device.as_deref(), Some("AA:BB"));
                assert_eq!(device.timeout, 30);
                assert_eq!(count, 5);
                assert!(queue);
                assert_eq!(format, OutputFormat::Text);
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_parse_config_set() {
        let cli = Cli::try_parse_from(["vitals", "config", "set", "scan-timeout", "20"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Set {
                    key: ConfigKey::ScanTimeout,
                    ..
                }
            }
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["vitals", "status", "--quiet", "--storage-dir", "/tmp/v"])
            .unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.storage_dir, Some(PathBuf::from("/tmp/v")));
    }
}
