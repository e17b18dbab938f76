//! A reliable, at-least-once work queue broker (spec component C1).
//!
//! `Broker` models the five primitives described in the design: publish,
//! claim, ack, requeue and deadletter. A crashed worker leaves its claim
//! sitting in the "processing" list; [`Broker::reclaim_stale`] is the
//! recovery sweep that moves such entries back to "pending" so another
//! worker can pick them up. Payloads are opaque bytes — encoding is the
//! caller's responsibility, exactly as in the design.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

pub mod mem;
pub mod retry;

use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;

use async_trait::async_trait;

/// Generic boxed error type, so different broker backends (in-memory,
/// eventually a real message broker) can report failures without forcing a
/// shared concrete error type.
#[derive(Debug)]
pub struct BrokerError {
    inner: Box<dyn std::error::Error + Sync + Send>,
    kind: BrokerErrorKind,
}

impl BrokerError {
    pub fn new(kind: BrokerErrorKind, e: impl Into<Box<dyn std::error::Error + Sync + Send>>) -> Self {
        Self { inner: e.into(), kind }
    }

    pub fn unavailable(e: impl Into<Box<dyn std::error::Error + Sync + Send>>) -> Self {
        Self::new(BrokerErrorKind::Unavailable, e)
    }

    pub fn invalid(e: impl Into<Box<dyn std::error::Error + Sync + Send>>) -> Self {
        Self::new(BrokerErrorKind::Invalid, e)
    }

    pub fn kind(&self) -> BrokerErrorKind {
        self.kind
    }
}

impl Display for BrokerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "BrokerError({:?}): {}", self.kind, self.inner)
    }
}

impl std::error::Error for BrokerError {}

impl From<&'static str> for BrokerError {
    fn from(e: &'static str) -> Self {
        Self::new(BrokerErrorKind::Unavailable, e)
    }
}

/// The kind of failure a [`BrokerError`] represents — maps onto the
/// design's TransientIO (`Unavailable`) and "pipelined operation returned
/// partial results" (`Partial`) failure modes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BrokerErrorKind {
    /// Broker unreachable / connection failure. Callers retry with backoff.
    Unavailable,
    /// A pipelined/batched operation returned partial results. Treated as a
    /// full failure — the caller must not ack on a partial result.
    Partial,
    /// The queue name or payload was invalid.
    Invalid,
}

/// At-least-once work queue. Implementors hold one "pending" list and one
/// "processing" list per queue name.
#[async_trait]
pub trait Broker: Send + Sync + Debug {
    /// Append `payload` to the tail of `queue`'s pending list.
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Atomically move one payload from `queue`'s pending tail to its
    /// processing list, in a single round trip, blocking up to `timeout` if
    /// nothing is pending. Returns `None` on timeout.
    async fn claim(&self, queue: &str, timeout: Duration) -> Result<Option<Vec<u8>>, BrokerError>;

    /// Remove one occurrence of `payload` from `queue`'s processing list.
    async fn ack(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Remove `payload` from processing and prepend it to pending (priority
    /// retry — it is claimed again before anything already queued).
    async fn requeue(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Remove `payload` from processing and append it, with `reason`, to
    /// `queue`'s dead-letter list.
    async fn deadletter(&self, queue: &str, payload: &[u8], reason: &str) -> Result<(), BrokerError>;

    /// Move every entry that has sat in `queue`'s processing list longer
    /// than `older_than` back to pending. Returns how many were reclaimed.
    /// Used by a recovery sweep to recover claims abandoned by a crashed
    /// worker.
    async fn reclaim_stale(&self, queue: &str, older_than: Duration) -> Result<usize, BrokerError>;

    /// Number of payloads currently pending on `queue`.
    async fn pending_len(&self, queue: &str) -> Result<usize, BrokerError>;

    /// Number of payloads currently claimed (in-flight) on `queue`.
    async fn processing_len(&self, queue: &str) -> Result<usize, BrokerError>;

    /// The `(payload, reason)` pairs currently dead-lettered on `queue`.
    async fn dead_letters(&self, queue: &str) -> Result<Vec<(Vec<u8>, String)>, BrokerError>;

    /// Remove every pending and processing entry for `queue` (controller
    /// reset between runs).
    async fn clear(&self, queue: &str) -> Result<(), BrokerError>;
}
