//! Protocol backend abstraction.
//!
//! A [`ProtocolBackend`] is the out-of-process service that performs the
//! actual transport work for one protocol (BLE GATT, LoRa, loopback). Device
//! sessions call it with a device address and a [`Selector`] naming the
//! sensor or characteristic, and listen to its notification stream.
//!
//! The IPC transport itself lives outside this crate; implement the trait on
//! top of whatever bus client the gateway uses. [`MockBackend`](crate::mock::MockBackend)
//! is an in-memory implementation for tests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::time::timeout;

use devgate_types::{ProtocolKind, Selector};

use crate::error::{BackendError, Error, Result};

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// A raw "new record" notification emitted by a protocol backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Physical address of the device that produced the payload.
    pub address: String,
    /// Selector identifying the sensor or characteristic.
    pub selector: Selector,
    /// Raw payload bytes.
    pub payload: Bytes,
}

impl Notification {
    /// Create a new notification.
    pub fn new(address: impl Into<String>, selector: Selector, payload: impl Into<Bytes>) -> Self {
        Self {
            address: address.into(),
            selector,
            payload: payload.into(),
        }
    }
}

/// Trait abstracting the remote protocol backend.
///
/// No ordering is assumed between `subscribe` returning and the first
/// notification being delivered; sessions start listening before they
/// subscribe.
///
/// # Example
///
/// ```ignore
/// use devgate_core::{ProtocolBackend, Selector};
///
/// async fn dump<B: ProtocolBackend>(backend: &B, address: &str) {
///     let bytes = backend.read(address, &Selector::new()).await.unwrap();
///     println!("{} bytes", bytes.len());
/// }
/// ```
#[async_trait]
pub trait ProtocolBackend: Send + Sync {
    /// Protocol this backend speaks.
    fn protocol(&self) -> ProtocolKind;

    // --- Link Management ---

    /// Establish the link to a device.
    ///
    /// Transports without a link (loopback, LoRa) keep the default no-op.
    async fn connect(&self, _address: &str) -> BackendResult<()> {
        Ok(())
    }

    /// Release the link to a device.
    async fn disconnect(&self, _address: &str) -> BackendResult<()> {
        Ok(())
    }

    // --- Data ---

    /// Read the raw value addressed by `selector`.
    async fn read(&self, address: &str, selector: &Selector) -> BackendResult<Bytes>;

    /// Write a raw value to the capability addressed by `selector`.
    async fn write(&self, address: &str, selector: &Selector, payload: &[u8]) -> BackendResult<()>;

    /// Start notifications for `selector`.
    async fn subscribe(&self, address: &str, selector: &Selector) -> BackendResult<()>;

    /// Stop notifications for `selector`.
    async fn unsubscribe(&self, address: &str, selector: &Selector) -> BackendResult<()>;

    // --- Notifications ---

    /// Receiver for all notifications emitted by this backend, for every device.
    fn notifications(&self) -> broadcast::Receiver<Notification>;
}

/// Type alias for a shared backend reference.
pub type SharedBackend = Arc<dyn ProtocolBackend>;

/// Run a backend call under a timeout, mapping failures into [`Error::Backend`].
pub(crate) async fn call<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = BackendResult<T>>,
{
    match timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(Error::backend(operation, source)),
        Err(_) => Err(Error::backend(
            operation,
            BackendError::Timeout { duration: limit },
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_call_maps_backend_error() {
        let result: Result<()> = call("read", Duration::from_secs(1), async {
            Err(BackendError::Transport("bus closed".into()))
        })
        .await;

        match result {
            Err(Error::Backend { operation, source }) => {
                assert_eq!(operation, "read");
                assert_eq!(source, BackendError::Transport("bus closed".into()));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out() {
        let result: Result<()> = call("subscribe", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::Backend {
                source: BackendError::Timeout { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_notification_new() {
        let n = Notification::new("AA:BB", Selector::new(), vec![1u8, 2, 3]);
        assert_eq!(n.address, "AA:BB");
        assert_eq!(n.payload.as_ref(), &[1, 2, 3]);
    }
}
