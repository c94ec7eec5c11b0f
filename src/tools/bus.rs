//! Stable snapshot reads of a message-bus topic.

use std::time::Duration;

use tracing::debug;

use crate::backends::MessageBus;
use crate::error::ProbeError;
use crate::util::timeout::with_timeout;

/// Upper bound on a single topic snapshot read.
pub const DEFAULT_BUS_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Read every record currently in `topic`.
///
/// The record count is fixed up front from the partition end offsets, then
/// the topic is consumed from the beginning until that many values have
/// been collected. Records produced after the offset lookup are dropped.
pub async fn read_snapshot(
    bus: &dyn MessageBus,
    topic: &str,
    timeout: Duration,
) -> Result<Vec<Vec<u8>>, ProbeError> {
    with_timeout(timeout, async {
        let offsets = bus
            .end_offsets(topic)
            .await
            .map_err(|e| ProbeError::MessageBus(format!("list end offsets: {e}")))?;
        let total: i64 = offsets
            .iter()
            .filter(|o| o.error.is_none() && o.partition >= 0)
            .map(|o| o.offset)
            .sum();
        if total <= 0 {
            return Ok(Vec::new());
        }
        let total = total as usize;

        let mut consumer = bus
            .consume_from_start(topic)
            .await
            .map_err(|e| ProbeError::MessageBus(format!("create consumer: {e}")))?;
        let mut messages = Vec::with_capacity(total);
        while messages.len() < total {
            let batch = consumer
                .poll()
                .await
                .map_err(|e| ProbeError::MessageBus(format!("fetch: {e}")))?;
            if batch.is_empty() {
                tokio::task::yield_now().await;
                continue;
            }
            messages.extend(batch);
        }
        messages.truncate(total);
        debug!(topic, total, "bus snapshot read");
        Ok(messages)
    })
    .await
}
