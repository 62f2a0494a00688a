//! Sync command - upload queued readings to the backend.

use std::sync::Arc;

use anyhow::{Context, Result};
use vitals_core::{SyncOutcome, VitalsSync};
use vitals_store::StorageFacade;

use crate::cli::SyncAction;
use crate::config::Config;
use crate::format::FormatOptions;
use crate::style;
use crate::util::api_client;

/// Execute the sync command.
pub async fn cmd_sync(
    action: SyncAction,
    config: &Config,
    storage: Arc<StorageFacade>,
    opts: &FormatOptions,
) -> Result<()> {
    match action {
        SyncAction::Status => {
            let pending = storage.pending_sync().context("Failed to read upload queue")?;
            println!("{} readings pending upload", pending.len());
            if let Some(oldest) = pending.iter().map(|r| r.captured_at).min() {
                println!("Oldest captured at {}", oldest);
            }
        }
        SyncAction::Flush => {
            let client = api_client(config, &storage)?;
            let sync = VitalsSync::new(client, storage);
            let outcome = sync.flush_pending().await.context("Upload failed")?;
            println!("{}", describe_outcome(outcome, opts));
        }
    }
    Ok(())
}

fn describe_outcome(outcome: SyncOutcome, opts: &FormatOptions) -> String {
    match outcome {
        SyncOutcome::Empty => style::format_success("Nothing to upload", opts.no_color),
        SyncOutcome::Uploaded { accepted } => style::format_success(
            &format!("Uploaded {} readings", accepted),
            opts.no_color,
        ),
        SyncOutcome::Queued { pending } => style::format_warning(
            &format!("Backend unreachable; {} readings remain queued", pending),
            opts.no_color,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitals_types::VitalsReading;

    #[test]
    fn test_describe_outcome() {
        let opts = FormatOptions::new(true);
        assert_eq!(
            describe_outcome(SyncOutcome::Empty, &opts),
            "[OK] Nothing to upload"
        );
        assert_eq!(
            describe_outcome(SyncOutcome::Queued { pending: 4 }, &opts),
            "[!!] Backend unreachable; 4 readings remain queued"
        );
    }

    #[tokio::test]
    async fn test_flush_without_backend_keeps_queue() {
        let storage = Arc::new(StorageFacade::open_in_memory().unwrap());
        storage
            .queue_pending_sync(&[VitalsReading::builder("band").heart_rate(70).build()])
            .unwrap();
        let config = Config {
            api_url: Some("http://127.0.0.1:9".into()),
            ..Default::default()
        };

        // Connection refused: the batch goes back into the queue
        cmd_sync(SyncAction::Flush, &config, Arc::clone(&storage), &FormatOptions::new(true))
            .await
            .unwrap();
        assert_eq!(storage.pending_sync().unwrap().len(), 1);
    }
}
