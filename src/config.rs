//! # Driver Configuration
//!
//! Runtime knobs for a [`Printer`](crate::printer::Printer): which transport
//! to use and how the status path is paced.
//!
//! | Setting | Default |
//! |---------|---------|
//! | transport | USB |
//! | poll interval | 2000 ms |
//! | status retries | 10 x 100 ms |
//! | USB write timeout | 10 s |
//!
//! ```
//! use ptouch_driver::config::{DriverConfig, TransportKind};
//!
//! let config = DriverConfig {
//!     transport: TransportKind::Mock,
//!     ..DriverConfig::default()
//! };
//! assert_eq!(config.poll_interval.as_millis(), 2000);
//! ```

use std::time::Duration;

use crate::catalog::{self, UsbId};
use crate::mock::MockTransport;
use crate::transport::{AnyTransport, RetryPolicy};
use crate::usb::UsbTransport;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportKind {
    #[default]
    Usb,
    /// Simulated device, no hardware needed
    Mock,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    pub transport: TransportKind,
    /// Period of the background status poller
    pub poll_interval: Duration,
    /// Bound on every status read
    pub status_retry: RetryPolicy,
    pub usb_write_timeout: Duration,
    /// Only open this device instead of any catalog model
    pub device: Option<UsbId>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            transport: TransportKind::Usb,
            poll_interval: Duration::from_millis(2000),
            status_retry: RetryPolicy::default(),
            usb_write_timeout: Duration::from_secs(10),
            device: None,
        }
    }
}

impl DriverConfig {
    /// The device ids the transport may open.
    pub fn usb_filters(&self) -> Vec<UsbId> {
        match self.device {
            Some(id) => vec![id],
            None => catalog::usb_filters(),
        }
    }

    pub fn build_transport(&self) -> AnyTransport {
        match self.transport {
            TransportKind::Usb => AnyTransport::Usb(UsbTransport::new(self.usb_write_timeout)),
            TransportKind::Mock => AnyTransport::Mock(match self.device {
                Some(id) => MockTransport::with_device(id),
                None => MockTransport::new(),
            }),
        }
    }
}
