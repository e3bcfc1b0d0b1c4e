use super::{Delivery, DeliverySink};
use crate::error::DeliveryError;

/// Dry-run sink: writes the batch to the log instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait::async_trait]
impl DeliverySink for LogSink {
    async fn deliver(&self, msg: &Delivery) -> Result<(), DeliveryError> {
        tracing::info!(target: "dispatch", recipient = %msg.recipient, "dry-run delivery:\n{}", msg.text);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
