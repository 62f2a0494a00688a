//! Command-line interface for BLE wearable health monitors.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | Scan for nearby health wearables |
//! | `watch` | Connect and stream vitals, reconnecting on link loss |
//! | `status` | Show connection history and the upload queue |
//! | `sync` | Upload queued readings to the backend |
//! | `alerts` | List alerts raised by the backend |
//! | `auth` | Store or remove the backend API token |
//! | `config` | Manage CLI configuration |
//! | `doctor` | Check Bluetooth permissions and adapter |
//! | `completions` | Generate shell completions |
//!
//! # Configuration
//!
//! The CLI stores configuration in `~/.config/vitals/config.toml` (or platform equivalent):
//!
//! - `device`: Default device identifier
//! - `timeout`: Connection timeout in seconds
//! - `scan_timeout`: Scan timeout in seconds (default 15)
//! - `api_url`: Backend API base URL
//! - `queue_offline`: Queue readings for upload while watching
//!
//! # Environment Variables
//!
//! - `VITALS_DEVICE`: Default device identifier (overridden by `--device`)
//! - `VITALS_STORAGE_DIR`: Storage directory (overridden by `--storage-dir`)
//! - `NO_COLOR`: Disable colored output when set
//!
//! # Examples
//!
//! ```bash
//! vitals scan --timeout 10
//! vitals watch --device AA:BB:CC:DD:EE:FF --queue
//! vitals sync flush
//! ```

// The binary lives in main.rs; the library only re-exports the stack.
pub use vitals_core;
pub use vitals_store;
pub use vitals_types;
