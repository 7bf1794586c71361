//! Mock protocol backend for testing.
//!
//! This module provides an in-memory [`ProtocolBackend`] that can be used
//! for testing sessions without a real protocol service.
//!
//! # Features
//!
//! - **Call log**: Every backend call is recorded with its selector, payload
//!   and (tokio) timestamp, so tests can assert ordering and timing
//! - **Scripted reads**: Return fixed payloads per selector
//! - **Notifications**: Emit raw notifications as the backend would
//! - **Failure injection**: Fail every call, one operation, or the next N calls
//! - **Latency simulation**: Delay every call to exercise timeouts

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{RwLock, broadcast};
use tokio::time::Instant;

use devgate_types::{ProtocolKind, Selector};

use crate::backend::{BackendResult, Notification, ProtocolBackend};
use crate::error::BackendError;

/// Backend operation kinds, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    Connect,
    Disconnect,
    Read,
    Write,
    Subscribe,
    Unsubscribe,
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendCall {
    /// Operation invoked.
    pub op: BackendOp,
    /// Device address.
    pub address: String,
    /// Selector, for data operations.
    pub selector: Option<Selector>,
    /// Written payload, for writes.
    pub payload: Option<Bytes>,
    /// When the call started.
    pub at: Instant,
}

/// An in-memory protocol backend for testing.
///
/// # Example
///
/// ```
/// use devgate_core::mock::{BackendOp, MockBackend};
/// use devgate_core::{ProtocolBackend, ProtocolKind, Selector};
///
/// #[tokio::main]
/// async fn main() {
///     let backend = MockBackend::new(ProtocolKind::Dummy);
///     backend.set_default_read(b"hello".to_vec()).await;
///
///     let data = backend.read("d1", &Selector::new()).await.unwrap();
///     assert_eq!(&data[..], b"hello");
///     assert_eq!(backend.count(BackendOp::Read).await, 1);
/// }
/// ```
pub struct MockBackend {
    protocol: ProtocolKind,
    reads: RwLock<HashMap<Selector, Bytes>>,
    default_read: RwLock<Bytes>,
    calls: RwLock<Vec<BackendCall>>,
    notifier: broadcast::Sender<Notification>,
    should_fail: AtomicBool,
    fail_message: RwLock<String>,
    /// Restrict injected failures to one operation (`None` = every operation).
    fail_on: RwLock<Option<BackendOp>>,
    /// Number of calls to fail before succeeding.
    remaining_failures: AtomicU32,
    /// Simulated latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("protocol", &self.protocol)
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .field(
                "remaining_failures",
                &self.remaining_failures.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

impl MockBackend {
    /// Create a mock backend for `protocol`.
    pub fn new(protocol: ProtocolKind) -> Self {
        MockBackendBuilder::new().protocol(protocol).build()
    }

    /// Set the payload returned for reads of `selector`.
    pub async fn set_read_payload(&self, selector: Selector, payload: impl Into<Bytes>) {
        self.reads.write().await.insert(selector, payload.into());
    }

    /// Set the payload returned for selectors without a scripted payload.
    pub async fn set_default_read(&self, payload: impl Into<Bytes>) {
        *self.default_read.write().await = payload.into();
    }

    /// Emit a notification to every listener. Returns the number of receivers.
    pub fn notify(&self, notification: Notification) -> usize {
        self.notifier.send(notification).unwrap_or(0)
    }

    /// Emit a notification built from its parts.
    pub fn emit(&self, address: &str, selector: Selector, payload: impl Into<Bytes>) -> usize {
        self.notify(Notification::new(address, selector, payload))
    }

    /// Number of notification listeners currently attached.
    pub fn listener_count(&self) -> usize {
        self.notifier.receiver_count()
    }

    /// All recorded calls, in order.
    pub async fn calls(&self) -> Vec<BackendCall> {
        self.calls.read().await.clone()
    }

    /// Recorded calls of one operation kind, in order.
    pub async fn calls_of(&self, op: BackendOp) -> Vec<BackendCall> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.op == op)
            .cloned()
            .collect()
    }

    /// Number of recorded calls of one operation kind.
    pub async fn count(&self, op: BackendOp) -> usize {
        self.calls.read().await.iter().filter(|c| c.op == op).count()
    }

    /// Clear the call log.
    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
    }

    /// Make every call (or every `fail_on` call) fail.
    pub async fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *self.fail_message.write().await = msg.to_string();
        }
    }

    /// Restrict injected failures to one operation kind.
    pub async fn set_fail_on(&self, op: Option<BackendOp>) {
        *self.fail_on.write().await = op;
    }

    /// Fail the next `count` calls, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Get the number of remaining transient failures.
    pub fn remaining_failures(&self) -> u32 {
        self.remaining_failures.load(Ordering::Relaxed)
    }

    /// Set simulated latency for every call.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record the call, apply latency, then apply failure injection.
    async fn enter(
        &self,
        op: BackendOp,
        address: &str,
        selector: Option<&Selector>,
        payload: Option<&[u8]>,
    ) -> BackendResult<()> {
        self.calls.write().await.push(BackendCall {
            op,
            address: address.to_string(),
            selector: selector.cloned(),
            payload: payload.map(Bytes::copy_from_slice),
            at: Instant::now(),
        });

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if let Some(only) = *self.fail_on.read().await
            && only != op
        {
            return Ok(());
        }

        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(BackendError::Transport(format!(
                "transient mock failure on {:?}",
                op
            )));
        }

        if self.should_fail.load(Ordering::Relaxed) {
            return Err(BackendError::Transport(self.fail_message.read().await.clone()));
        }

        Ok(())
    }
}

#[async_trait]
impl ProtocolBackend for MockBackend {
    fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    async fn connect(&self, address: &str) -> BackendResult<()> {
        self.enter(BackendOp::Connect, address, None, None).await
    }

    async fn disconnect(&self, address: &str) -> BackendResult<()> {
        self.enter(BackendOp::Disconnect, address, None, None).await
    }

    async fn read(&self, address: &str, selector: &Selector) -> BackendResult<Bytes> {
        self.enter(BackendOp::Read, address, Some(selector), None)
            .await?;
        if let Some(payload) = self.reads.read().await.get(selector) {
            return Ok(payload.clone());
        }
        Ok(self.default_read.read().await.clone())
    }

    async fn write(&self, address: &str, selector: &Selector, payload: &[u8]) -> BackendResult<()> {
        self.enter(BackendOp::Write, address, Some(selector), Some(payload))
            .await
    }

    async fn subscribe(&self, address: &str, selector: &Selector) -> BackendResult<()> {
        self.enter(BackendOp::Subscribe, address, Some(selector), None)
            .await
    }

    async fn unsubscribe(&self, address: &str, selector: &Selector) -> BackendResult<()> {
        self.enter(BackendOp::Unsubscribe, address, Some(selector), None)
            .await
    }

    fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }
}

/// Builder for creating mock backends with custom settings.
#[derive(Debug)]
pub struct MockBackendBuilder {
    protocol: ProtocolKind,
    reads: HashMap<Selector, Bytes>,
    default_read: Bytes,
    latency: Duration,
    transient_failures: u32,
    fail_on: Option<BackendOp>,
    notification_capacity: usize,
}

impl Default for MockBackendBuilder {
    fn default() -> Self {
        Self {
            protocol: ProtocolKind::Dummy,
            reads: HashMap::new(),
            default_read: Bytes::new(),
            latency: Duration::ZERO,
            transient_failures: 0,
            fail_on: None,
            notification_capacity: 64,
        }
    }
}

impl MockBackendBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the protocol.
    #[must_use]
    pub fn protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = protocol;
        self
    }

    /// Script the payload returned for reads of `selector`.
    #[must_use]
    pub fn read_payload(mut self, selector: Selector, payload: impl Into<Bytes>) -> Self {
        self.reads.insert(selector, payload.into());
        self
    }

    /// Set the payload returned for unscripted selectors.
    #[must_use]
    pub fn default_read(mut self, payload: impl Into<Bytes>) -> Self {
        self.default_read = payload.into();
        self
    }

    /// Set simulated latency for every call.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the first `count` calls.
    #[must_use]
    pub fn transient_failures(mut self, count: u32) -> Self {
        self.transient_failures = count;
        self
    }

    /// Restrict injected failures to one operation kind.
    #[must_use]
    pub fn fail_on(mut self, op: BackendOp) -> Self {
        self.fail_on = Some(op);
        self
    }

    /// Set the notification channel capacity.
    #[must_use]
    pub fn notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    /// Build the mock backend.
    #[must_use]
    pub fn build(self) -> MockBackend {
        let (notifier, _) = broadcast::channel(self.notification_capacity.max(1));
        MockBackend {
            protocol: self.protocol,
            reads: RwLock::new(self.reads),
            default_read: RwLock::new(self.default_read),
            calls: RwLock::new(Vec::new()),
            notifier,
            should_fail: AtomicBool::new(false),
            fail_message: RwLock::new("Mock failure".to_string()),
            fail_on: RwLock::new(self.fail_on),
            remaining_failures: AtomicU32::new(self.transient_failures),
            latency_ms: AtomicU64::new(self.latency.as_millis() as u64),
        }
    }
}
