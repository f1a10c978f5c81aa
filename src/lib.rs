//! Driver for Brother P-Touch label printers on USB.
//!
//! ```no_run
//! use ptouch_driver::{Bitmap, DriverConfig, Printer};
//!
//! # async fn run() -> ptouch_driver::Result<()> {
//! let printer = Printer::from_config(DriverConfig::default());
//! printer.connect().await?;
//! if let Some(reason) = printer.capability_check() {
//!     eprintln!("{reason}");
//! } else {
//!     let label = Bitmap::from_png_file("label.png".as_ref())?;
//!     printer.print(&label, false).await?;
//! }
//! printer.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod bitmap;
pub mod catalog;
pub mod config;
pub mod error;
pub mod mock;
pub mod poller;
pub mod printer;
pub mod raster_command;
pub mod status;
pub mod tape;
pub mod transport;
pub mod usb;

pub use bitmap::Bitmap;
pub use catalog::{Capability, DeviceType, UsbId};
pub use config::{DriverConfig, TransportKind};
pub use error::{Error, FrameError, Result};
pub use printer::{ConnectionState, Printer, Unsupported};
pub use status::DeviceStatus;
pub use tape::TapeInfo;
pub use transport::{AnyTransport, RetryPolicy, Transport};
