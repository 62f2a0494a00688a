//! Upload readings, queueing them locally while the backend is unreachable.

use std::sync::Arc;

use tracing::{info, warn};

use vitals_store::StorageFacade;
use vitals_types::VitalsReading;

use crate::api_client::{ApiClient, ApiError};

/// Errors from [`VitalsSync`].
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The server refused the upload; queueing would not help.
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] vitals_store::Error),
}

/// What happened to an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to send.
    Empty,
    /// The server stored `accepted` readings.
    Uploaded { accepted: usize },
    /// The upload failed in transit; `pending` readings now wait in the queue.
    Queued { pending: usize },
}

/// Pairs the API client with the offline queue.
#[derive(Debug, Clone)]
pub struct VitalsSync {
    client: ApiClient,
    storage: Arc<StorageFacade>,
}

impl VitalsSync {
    pub fn new(client: ApiClient, storage: Arc<StorageFacade>) -> Self {
        Self { client, storage }
    }

    /// Upload `readings`, queueing them if the backend cannot be reached.
    pub async fn upload(&self, readings: &[VitalsReading]) -> Result<SyncOutcome, SyncError> {
        if readings.is_empty() {
            return Ok(SyncOutcome::Empty);
        }

        match self.client.sync(readings).await {
            Ok(response) => {
                info!("Uploaded {} readings", response.accepted);
                Ok(SyncOutcome::Uploaded {
                    accepted: response.accepted,
                })
            }
            Err(e) if e.is_transmission_failure() => {
                let pending = self.storage.queue_pending_sync(readings)?;
                warn!("Upload failed, {} readings pending: {}", pending, e);
                Ok(SyncOutcome::Queued { pending })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Upload everything in the pending queue.
    ///
    /// Queued readings are only removed once the server has accepted them,
    /// so a failed flush of any kind leaves the queue as it was.
    pub async fn flush_pending(&self) -> Result<SyncOutcome, SyncError> {
        let batch = self.storage.peek_pending_sync()?;
        if batch.is_empty() {
            return Ok(SyncOutcome::Empty);
        }
        info!("Flushing {} pending readings", batch.len());

        match self.client.sync(&batch.readings).await {
            Ok(response) => {
                self.storage.ack_pending_sync(&batch)?;
                info!("Uploaded {} readings", response.accepted);
                Ok(SyncOutcome::Uploaded {
                    accepted: response.accepted,
                })
            }
            Err(e) if e.is_transmission_failure() => {
                let pending = self.storage.pending_sync_len()?;
                warn!("Flush failed, {} readings pending: {}", pending, e);
                Ok(SyncOutcome::Queued { pending })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Number of readings waiting for upload.
    pub fn pending_count(&self) -> Result<usize, SyncError> {
        Ok(self.storage.pending_sync_len()?)
    }
}
