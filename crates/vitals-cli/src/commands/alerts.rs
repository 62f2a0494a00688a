//! Alerts command - list alerts raised by the backend.

use std::path::PathBuf;

use anyhow::{Context, Result};
use vitals_store::StorageFacade;

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::format::{FormatOptions, format_alerts_text};
use crate::util::{api_client, write_output};

pub async fn cmd_alerts(
    config: &Config,
    storage: &StorageFacade,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let client = api_client(config, storage)?;
    let alerts = client
        .active_alerts()
        .await
        .context("Failed to fetch alerts")?;

    let content = match format {
        OutputFormat::Json => opts.as_json(&alerts)?,
        OutputFormat::Text => format_alerts_text(&alerts, opts),
    };
    write_output(output, &content)
}
