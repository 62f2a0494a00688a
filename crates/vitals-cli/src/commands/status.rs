//! Status command - summarize what is stored locally.

use std::path::PathBuf;

use anyhow::{Context, Result};
use vitals_store::StorageFacade;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, StorageStatus, format_status_text};
use crate::util::write_output;

/// Gather the local storage summary.
pub fn storage_status(storage: &StorageFacade) -> Result<StorageStatus> {
    Ok(StorageStatus {
        pending_uploads: storage
            .pending_sync_len()
            .context("Failed to read upload queue")?,
        authenticated: storage
            .auth_token()
            .context("Failed to read API token")?
            .is_some(),
        connections: storage
            .connection_history()
            .context("Failed to read connection history")?,
    })
}

pub fn cmd_status(
    storage: &StorageFacade,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let status = storage_status(storage)?;
    let content = match format {
        OutputFormat::Json => opts.as_json(&status)?,
        OutputFormat::Text => format_status_text(&status, opts),
    };
    write_output(output, &content)
}
