//! Deadline for message-bus snapshot reads, which otherwise keep polling
//! until the announced record count arrives.

use std::future::Future;
use std::time::Duration;

use crate::error::ProbeError;

/// Run `future` with a deadline, mapping expiry to [`ProbeError::Timeout`].
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, ProbeError>>,
) -> Result<T, ProbeError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(duration.as_millis() as u64)),
    }
}
