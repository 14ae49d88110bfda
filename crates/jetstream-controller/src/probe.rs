//! Remote state probe

use jetstream_common::Result;

use crate::nats::StreamSession;

/// Whether a stream with this name exists on the server
///
/// "Not found" is an answer, not a failure. Anything else propagates.
pub async fn stream_exists(session: &dyn StreamSession, name: &str) -> Result<bool> {
    match session.load_stream(name).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e.context("failed to check if stream exists")),
    }
}
