//! Event ingestion boundary.

use async_trait::async_trait;

use questlab_domain::{IngestReceipt, SimulatedEvent};

use crate::application::error::ServiceError;

/// Batch submission of synthetic events. The service processes batches
/// asynchronously relative to progress computation, which is why the
/// controller polls for progress after submitting rather than trusting an
/// acknowledgement.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngestionPort: Send + Sync {
    async fn ingest_batch(&self, events: Vec<SimulatedEvent>) -> Result<IngestReceipt, ServiceError>;
}
