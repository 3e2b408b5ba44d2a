//! Per-call context: cancellation, deadline and metadata.
//!
//! # Responsibilities
//! - Carry the cancellation signal of the inbound request into the engine
//! - Carry an optional deadline
//! - Carry request metadata in, and collect response header/trailer metadata out
//!
//! # Design Decisions
//! - Cancellation is an explicit `CancellationToken`, observed cooperatively
//! - The context is cheap to clone; clones share the token and the response sinks

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::rpc::metadata::Metadata;

#[derive(Debug, Default)]
struct ResponseMetadata {
    header: Metadata,
    trailer: Metadata,
}

/// State threaded through a single RPC call.
#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    request_metadata: Arc<Metadata>,
    response: Arc<Mutex<ResponseMetadata>>,
}

impl CallContext {
    /// Create a context bound to `token`.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
            request_metadata: Arc::new(Metadata::new()),
            response: Arc::new(Mutex::new(ResponseMetadata::default())),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_request_metadata(mut self, metadata: Metadata) -> Self {
        self.request_metadata = Arc::new(metadata);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the caller has gone away or the call was aborted.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn request_metadata(&self) -> &Metadata {
        &self.request_metadata
    }

    /// Record response header metadata.
    pub fn append_header(&self, key: impl AsRef<str>, value: impl Into<String>) {
        self.response.lock().header.append(key, value);
    }

    /// Record response trailer metadata.
    pub fn append_trailer(&self, key: impl AsRef<str>, value: impl Into<String>) {
        self.response.lock().trailer.append(key, value);
    }

    /// Drain the header and trailer metadata recorded so far.
    pub fn take_response_metadata(&self) -> (Metadata, Metadata) {
        let mut response = self.response.lock();
        (
            std::mem::take(&mut response.header),
            std::mem::take(&mut response.trailer),
        )
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cancellation_and_sinks() {
        let ctx = CallContext::default();
        let clone = ctx.clone();

        clone.append_header("x-served-by", "engine");
        clone.append_trailer("x-cost", "3");
        ctx.cancel();

        assert!(clone.is_cancelled());
        let (header, trailer) = ctx.take_response_metadata();
        assert_eq!(header.get("x-served-by"), Some("engine"));
        assert_eq!(trailer.get("x-cost"), Some("3"));

        let (header, _) = clone.take_response_metadata();
        assert!(header.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_saturates_at_zero() {
        let ctx = CallContext::default().with_timeout(Duration::from_millis(50));
        assert!(ctx.remaining().unwrap() <= Duration::from_millis(50));

        tokio::time::advance(Duration::from_millis(80)).await;
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }
}
