//! Local persistence for the vitals monitor.
//!
//! [`StorageFacade`] splits key/value pairs into two SQLite databases:
//! keys starting with `sensitive_` go to a secure database readable only by
//! the owner, everything else to a general database under the `@vitals:`
//! namespace. Typed helpers cover the well-known keys (offline upload queue,
//! connection history, settings, per-device WiFi config, auth token).
//!
//! # Example
//!
//! ```no_run
//! use vitals_store::StorageFacade;
//!
//! let storage = StorageFacade::open_default()?;
//! let queued = storage.pending_sync_len()?;
//! println!("{} readings waiting for upload", queued);
//! # Ok::<(), vitals_store::Error>(())
//! ```

mod error;
mod facade;
mod models;
mod schema;
mod store;

pub use error::{Error, Result};
pub use facade::{
    APP_PREFIX, MAX_CONNECTION_HISTORY, MAX_PENDING_SYNC, PendingBatch, SENSITIVE_PREFIX,
    StorageFacade, keys,
};
pub use models::{
    AppSettings, ConnectionRecord, OnboardingStatus, TemperatureUnit, UserPreferences, WifiConfig,
};
pub use store::KvStore;

/// Default storage directory following platform conventions.
///
/// - Linux: `~/.local/share/vitals`
/// - macOS: `~/Library/Application Support/vitals`
/// - Windows: `C:\Users\<user>\AppData\Local\vitals`
pub fn default_storage_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("vitals")
}
