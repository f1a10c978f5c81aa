//! Physical link to the printer.
//!
//! A transport owns exactly one connection at a time. Implementations only
//! provide single bulk transfers; the bounded status retry loop lives in
//! [`Transport::receive`] so every transport gets the same timeout bound.
//!
//! Methods return `impl Future + Send` rather than using bare `async fn` so
//! that the status poller can drive a transport from a spawned task. The
//! trait is therefore not object-safe; [`AnyTransport`] dispatches between
//! the USB and mock implementations by enum instead.

use std::future::Future;
use std::time::Duration;

use log::trace;

use crate::catalog::UsbId;
use crate::error::{Error, Result};
use crate::mock::MockTransport;
use crate::usb::UsbTransport;

/// Bound on the status read loop: at most `attempts * interval` of waiting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 10,
            interval: Duration::from_millis(100),
        }
    }
}

pub trait Transport: Send + 'static {
    /// Open the first device matching one of `filters`, select configuration 1,
    /// claim interface 0 and discover its bulk endpoints.
    fn open(&mut self, filters: &[UsbId]) -> impl Future<Output = Result<UsbId>> + Send;

    /// Bulk-write `data` to the OUT endpoint.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// One bulk read of at most `max_len` bytes without waiting for data.
    ///
    /// Returns an empty buffer when the device has nothing pending.
    fn read_pending(&mut self, max_len: usize) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Release the device. Safe to call when already closed.
    fn close(&mut self) -> impl Future<Output = ()> + Send;

    fn is_open(&self) -> bool;

    /// Read until a non-empty payload arrives, giving up after
    /// `policy.attempts` reads spaced `policy.interval` apart.
    fn receive(
        &mut self,
        max_len: usize,
        policy: RetryPolicy,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send
    where
        Self: Sized,
    {
        async move {
            if !self.is_open() {
                return Err(Error::NotConnected);
            }
            for attempt in 1..=policy.attempts {
                tokio::time::sleep(policy.interval).await;
                let data = self.read_pending(max_len).await?;
                if !data.is_empty() {
                    trace!("received {} bytes on attempt {}", data.len(), attempt);
                    return Ok(data);
                }
            }
            Err(Error::Timeout {
                attempts: policy.attempts,
                interval_ms: policy.interval.as_millis() as u64,
            })
        }
    }
}

/// Transport selected at runtime by configuration.
pub enum AnyTransport {
    Usb(UsbTransport),
    Mock(MockTransport),
}

impl Transport for AnyTransport {
    async fn open(&mut self, filters: &[UsbId]) -> Result<UsbId> {
        match self {
            AnyTransport::Usb(t) => t.open(filters).await,
            AnyTransport::Mock(t) => t.open(filters).await,
        }
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            AnyTransport::Usb(t) => t.send(data).await,
            AnyTransport::Mock(t) => t.send(data).await,
        }
    }

    async fn read_pending(&mut self, max_len: usize) -> Result<Vec<u8>> {
        match self {
            AnyTransport::Usb(t) => t.read_pending(max_len).await,
            AnyTransport::Mock(t) => t.read_pending(max_len).await,
        }
    }

    async fn close(&mut self) {
        match self {
            AnyTransport::Usb(t) => t.close().await,
            AnyTransport::Mock(t) => t.close().await,
        }
    }

    fn is_open(&self) -> bool {
        match self {
            AnyTransport::Usb(t) => t.is_open(),
            AnyTransport::Mock(t) => t.is_open(),
        }
    }
}
