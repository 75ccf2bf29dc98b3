//! The processing task: one queued payload in, one stored row out

use crate::error::ProcessingError;
use crate::runner::TaskHandler;
use async_trait::async_trait;
use event_envelope::EventEnvelope;
use event_store::{EventRowId, EventStore};
use std::sync::Arc;
use tracing::{error, info};

/// Decodes a queued envelope and appends it to the event store
///
/// Processing is not deduplicated: the same payload processed twice yields two
/// rows. Each call is a single auto-committed insert, so a failed call never
/// leaves a partial row behind.
pub struct EventProcessor {
    store: Arc<dyn EventStore>,
}

impl EventProcessor {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Process one queued payload
    pub async fn process(&self, payload: &str) -> Result<EventRowId, ProcessingError> {
        let event = EventEnvelope::from_wire(payload).map_err(|e| {
            error!("Error decoding queued event: {}", e);
            ProcessingError::from(e)
        })?;

        match self.store.insert_event(&event).await {
            Ok(id) => {
                info!(site_id = %event.site_id, row_id = id, "Processed event");
                Ok(id)
            }
            Err(e) => {
                error!(site_id = %event.site_id, "Error storing event: {}", e);
                Err(ProcessingError::from(e))
            }
        }
    }
}

#[async_trait]
impl TaskHandler for EventProcessor {
    async fn handle(&self, payload: &str) -> Result<(), ProcessingError> {
        self.process(payload).await.map(|_| ())
    }
}
