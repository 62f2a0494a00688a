//! Command implementations for the CLI.

mod alerts;
mod auth;
mod config;
mod doctor;
mod scan;
mod status;
mod sync;
mod watch;

pub use alerts::cmd_alerts;
pub use auth::cmd_auth;
pub use config::cmd_config;
pub use doctor::cmd_doctor;
pub use scan::cmd_scan;
pub use status::cmd_status;
pub use sync::cmd_sync;
pub use watch::{WatchArgs, cmd_watch};
