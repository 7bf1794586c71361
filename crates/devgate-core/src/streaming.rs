//! Streams of decoded records.
//!
//! A [`RecordStream`] turns a session's event channel into an async stream of
//! [`RecordObject`]s, optionally restricted to one component. It supports
//! graceful shutdown via [`RecordStream::close`], which uses a cancellation
//! token to stop the background forwarding task.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use devgate_types::RecordObject;

use crate::error::{Error, Result};
use crate::events::{DeviceEvent, EventReceiver};

/// Options for record streams.
///
/// ```
/// use devgate_core::StreamOptions;
///
/// let options = StreamOptions::builder()
///     .buffer_size(64)
///     .component("Temperature")
///     .build();
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Capacity of the record channel. Default: 16.
    pub buffer_size: usize,
    /// Only forward records of this component. Default: all components.
    pub component: Option<String>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            buffer_size: 16,
            component: None,
        }
    }
}

impl StreamOptions {
    /// Start building options.
    pub fn builder() -> StreamOptionsBuilder {
        StreamOptionsBuilder::default()
    }

    /// Options forwarding only `component`.
    pub fn for_component(component: impl Into<String>) -> Self {
        Self {
            component: Some(component.into()),
            ..Default::default()
        }
    }

    /// Reject a zero buffer and an empty component filter.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::invalid_config("buffer_size must be > 0"));
        }
        if self.component.as_deref() == Some("") {
            return Err(Error::invalid_config("component filter cannot be empty"));
        }
        Ok(())
    }
}

/// Builder for [`StreamOptions`].
#[derive(Debug, Clone, Default)]
pub struct StreamOptionsBuilder {
    options: StreamOptions,
}

impl StreamOptionsBuilder {
    /// Records buffered before the forwarding task waits for the consumer.
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.options.buffer_size = size;
        self
    }

    /// Only forward records of `component`.
    #[must_use]
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.options.component = Some(component.into());
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> StreamOptions {
        self.options
    }
}

/// A stream of records produced by a device session.
///
/// Records that arrive while the consumer lags behind the event channel are
/// skipped with a warning; the stream itself keeps going.
pub struct RecordStream {
    receiver: mpsc::Receiver<RecordObject>,
    handle: tokio::task::JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl RecordStream {
    /// Create a record stream fed from an event receiver.
    pub fn new(mut events: EventReceiver, options: StreamOptions) -> Self {
        let (tx, rx) = mpsc::channel(options.buffer_size.max(1));
        let cancel_token = CancellationToken::new();
        let task_token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!("Record stream cancelled, stopping gracefully");
                        break;
                    }
                    event = events.recv() => event,
                };

                match event {
                    Ok(DeviceEvent::Record { record }) => {
                        if let Some(component) = &options.component
                            && &record.component != component
                        {
                            continue;
                        }
                        if tx.send(record).await.is_err() {
                            debug!("Record stream receiver dropped, stopping");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Record stream lagged, records were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Event channel closed, ending record stream");
                        break;
                    }
                }
            }
        });

        Self {
            receiver: rx,
            handle,
            cancel_token,
        }
    }

    /// Stop forwarding records.
    pub fn close(self) {
        self.cancel_token.cancel();
    }

    /// Token that stops this stream when cancelled, e.g. on gateway shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Whether the forwarding task is still running.
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Whether the stream was closed or its token cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl Drop for RecordStream {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl Stream for RecordStream {
    type Item = RecordObject;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}
