//! # Print Engine
//!
//! [`Printer`] owns one transport and drives it through
//! `Disconnected -> Opening -> Initialized -> Idle <-> Printing`.
//!
//! The transport sits behind an async mutex: a print job holds it for the
//! whole job, so the background status poller can never interleave a status
//! request with raster data. The poller is additionally suspended while a job
//! runs and skips its ticks.
//!
//! Any transport failure (including a status read timeout) tears the
//! connection down to `Disconnected`. Device-reported conditions that block
//! printing abort the job with [`Error::FatalPrinter`] but keep the
//! connection.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{debug, info, trace, warn};

use crate::bitmap::Bitmap;
use crate::catalog::{self, Capability, DeviceType};
use crate::config::DriverConfig;
use crate::error::{Error, FrameError, Result};
use crate::poller::{ListenerId, StatusHub, StatusPoller};
use crate::raster_command::RasterCommand;
use crate::status::{self, DeviceStatus, SHORT_FRAME_LEN, STATUS_FRAME_LEN};
use crate::tape::{self, TapeInfo};
use crate::transport::{AnyTransport, Transport};

/// Name reported while no device is bound.
pub const NO_DEVICE_NAME: &str = "?";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Opening,
    /// Device opened and reset, first status not yet read
    Initialized,
    Idle,
    Printing,
}

/// Why a recognised model cannot be driven.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unsupported {
    PliteMode,
    UnsupportedRaster,
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unsupported::PliteMode => write!(
                f,
                "Printer is in P-Lite (mass storage) mode. Switch it to E mode \
                 (hold the PLite button until the LED goes off) and reconnect."
            ),
            Unsupported::UnsupportedRaster => {
                write!(f, "This printer does not support raster printing.")
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Bytes of a command built with a [`RasterCommand`].
fn command(build: impl FnOnce(&mut RasterCommand)) -> Vec<u8> {
    let mut cmd = RasterCommand::new();
    build(&mut cmd);
    cmd.build()
}

struct Inner<T> {
    config: DriverConfig,
    transport: tokio::sync::Mutex<T>,
    /// Cleared first on disconnect; a running job stops after its current line
    connected: AtomicBool,
    polling_suspended: AtomicBool,
    state: Mutex<ConnectionState>,
    device: RwLock<Option<&'static DeviceType>>,
    hub: StatusHub,
    poller: Mutex<Option<StatusPoller>>,
}

/// Driver for one USB label printer.
///
/// Cloning yields another handle to the same connection.
pub struct Printer<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Printer<T> {
    fn clone(&self) -> Self {
        Printer {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Printer<AnyTransport> {
    /// Printer on the transport selected by `config`.
    pub fn from_config(config: DriverConfig) -> Self {
        let transport = config.build_transport();
        Printer::new(transport, config)
    }
}

impl<T: Transport> Printer<T> {
    pub fn new(transport: T, config: DriverConfig) -> Self {
        Printer {
            inner: Arc::new(Inner {
                config,
                transport: tokio::sync::Mutex::new(transport),
                connected: AtomicBool::new(false),
                polling_suspended: AtomicBool::new(false),
                state: Mutex::new(ConnectionState::Disconnected),
                device: RwLock::new(None),
                hub: StatusHub::new(),
                poller: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn device_type(&self) -> Option<&'static DeviceType> {
        self.inner.device()
    }

    pub fn device_name(&self) -> &'static str {
        self.device_type().map_or(NO_DEVICE_NAME, |dt| dt.name)
    }

    /// Latest decoded status. Kept after a disconnect until the next connect.
    pub fn status(&self) -> Option<Arc<DeviceStatus>> {
        self.inner.hub.latest()
    }

    /// Tape geometry for the media width in the latest status.
    pub fn tape_info(&self) -> Option<&'static TapeInfo> {
        self.status()
            .and_then(|status| tape::find_tape_info(status.media_width_mm))
    }

    /// Register a callback run on the polling task whenever the status frame
    /// changes.
    pub fn add_status_listener(
        &self,
        listener: impl Fn(&DeviceStatus) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.hub.add_listener(listener)
    }

    pub fn remove_status_listener(&self, id: ListenerId) -> bool {
        self.inner.hub.remove_listener(id)
    }

    /// Reason the bound model cannot be driven, if any.
    pub fn capability_check(&self) -> Option<Unsupported> {
        let device = self.device_type()?;
        if device.has(Capability::PliteMode) {
            Some(Unsupported::PliteMode)
        } else if device.has(Capability::UnsupportedRaster) {
            Some(Unsupported::UnsupportedRaster)
        } else {
            None
        }
    }

    /// Open the first supported device, reset it, read its status and start
    /// the status poller. Does nothing when already connected.
    pub async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        let mut transport = inner.transport.lock().await;
        if inner.is_connected() {
            return Ok(());
        }

        inner.set_state(ConnectionState::Opening);
        if let Err(e) = inner.open_and_initialize(&mut transport).await {
            warn!("connect failed: {}", e);
            inner.close_session(&mut transport).await;
            return Err(e);
        }
        drop(transport);

        self.start_poller();
        inner.set_state(ConnectionState::Idle);
        if let Some(reason) = self.capability_check() {
            warn!("{}: {}", self.device_name(), reason);
        }
        Ok(())
    }

    /// Stop polling and release the device. Safe to call in any state.
    ///
    /// A job in progress is abandoned after its current raster line.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        inner.connected.store(false, Ordering::SeqCst);
        inner.stop_poller();

        let mut transport = inner.transport.lock().await;
        if transport.is_open() {
            info!("disconnecting from {}", self.device_name());
        }
        inner.close_session(&mut transport).await;
    }

    /// Request a fresh status from the device and publish it.
    pub async fn refresh_status(&self) -> Result<Arc<DeviceStatus>> {
        let inner = &self.inner;
        let mut transport = inner.transport.lock().await;
        if !inner.is_connected() {
            return Err(Error::NotConnected);
        }
        match inner.read_status(&mut transport).await {
            Ok(status) => {
                let status = Arc::new(status);
                inner.hub.publish(Arc::clone(&status));
                Ok(status)
            }
            Err(e) => Err(inner.fail(&mut transport, e).await),
        }
    }

    /// Print `bitmap` as one label, one raster line per column.
    ///
    /// With `chain` the tape is not fed and cut after the label, so the next
    /// label follows without waste.
    pub async fn print(&self, bitmap: &Bitmap, chain: bool) -> Result<()> {
        let inner = &self.inner;
        let mut transport = inner.transport.lock().await;
        let device = match inner.device() {
            Some(device) if inner.is_connected() => device,
            _ => return Err(Error::NotConnected),
        };
        bitmap.check_fits(device.max_width_px as usize)?;

        let status = match inner.read_status(&mut transport).await {
            Ok(status) => Arc::new(status),
            Err(e) => return Err(inner.fail(&mut transport, e).await),
        };
        inner.hub.publish(Arc::clone(&status));
        inner.ensure_printable(device, &status)?;

        inner.polling_suspended.store(true, Ordering::SeqCst);
        inner.set_state(ConnectionState::Printing);

        let result = match inner
            .run_job(&mut transport, device, &status, bitmap, chain)
            .await
        {
            Err(e) if e.is_transport_failure() => Err(inner.fail(&mut transport, e).await),
            result => result,
        };

        if inner.is_connected() {
            inner.set_state(ConnectionState::Idle);
        }
        inner.polling_suspended.store(false, Ordering::SeqCst);
        result
    }

    fn start_poller(&self) {
        let weak = Arc::downgrade(&self.inner);
        let poller = StatusPoller::spawn(self.inner.config.poll_interval, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => inner.poll_tick().await,
                    None => ControlFlow::Break(()),
                }
            }
        });
        if let Some(previous) = lock(&self.inner.poller).replace(poller) {
            previous.stop();
        }
    }
}

impl<T: Transport> Inner<T> {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn device(&self) -> Option<&'static DeviceType> {
        *self.device.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = lock(&self.state);
        if *current != state {
            debug!("state {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    fn stop_poller(&self) {
        if let Some(poller) = lock(&self.poller).take() {
            poller.stop();
        }
    }

    async fn open_and_initialize(&self, transport: &mut T) -> Result<()> {
        let id = transport.open(&self.config.usb_filters()).await?;
        let device = catalog::find_device_type(id.vendor_id, id.product_id)
            .ok_or_else(|| Error::Connection(format!("{} is not a supported device", id)))?;
        info!("connected to {} ({})", device.name, id);

        *self.device.write().unwrap_or_else(|e| e.into_inner()) = Some(device);
        self.hub.invalidate();
        self.connected.store(true, Ordering::SeqCst);

        transport
            .send(&command(|c| {
                c.invalidate().initialize();
            }))
            .await?;
        self.set_state(ConnectionState::Initialized);
        let status = self.read_status(transport).await?;
        debug!("initial status of {}: error word 0x{:04x}", device.name, status.error_word);
        self.hub.publish(Arc::new(status));
        Ok(())
    }

    /// Release the transport and forget the device. The last status is kept.
    async fn close_session(&self, transport: &mut T) {
        self.connected.store(false, Ordering::SeqCst);
        transport.close().await;
        *self.device.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.polling_suspended.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
    }

    /// Tear down after a transport failure and hand the error back.
    async fn fail(&self, transport: &mut T, err: Error) -> Error {
        if err.is_transport_failure() {
            warn!("transport failure, disconnecting: {}", err);
            self.stop_poller();
            self.close_session(transport).await;
        }
        err
    }

    async fn read_status(&self, transport: &mut T) -> Result<DeviceStatus> {
        transport
            .send(&command(|c| {
                c.status_information_request();
            }))
            .await?;
        let frame = transport
            .receive(STATUS_FRAME_LEN, self.config.status_retry)
            .await?;
        self.decode_frame(transport, frame).await
    }

    async fn decode_frame(&self, transport: &mut T, frame: Vec<u8>) -> Result<DeviceStatus> {
        match status::decode(&frame) {
            Ok(status) => Ok(status),
            Err(FrameError::ShortFrame) => {
                warn!("got a 16-byte status frame {:02X?}, reading one more", frame);
                let next = match transport
                    .receive(STATUS_FRAME_LEN, self.config.status_retry)
                    .await
                {
                    Ok(next) => next,
                    Err(Error::Timeout { .. }) => return Err(FrameError::ShortFrame.into()),
                    Err(e) => return Err(e),
                };
                Ok(status::decode(&next)?)
            }
            Err(e @ FrameError::Header { .. }) => {
                warn!("strange status frame {:02X?}, flushing one read", frame);
                transport.read_pending(STATUS_FRAME_LEN).await?;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_printable(&self, device: &DeviceType, status: &DeviceStatus) -> Result<()> {
        let errors: Vec<&'static str> = status.fatal_errors().map(|e| e.description).collect();
        if errors.is_empty() {
            return Ok(());
        }
        Err(Error::FatalPrinter {
            device: device.name.to_string(),
            word: status.error_word,
            errors,
        })
    }

    async fn run_job(
        &self,
        transport: &mut T,
        device: &'static DeviceType,
        status: &DeviceStatus,
        bitmap: &Bitmap,
        chain: bool,
    ) -> Result<()> {
        let packbits = device.has(Capability::RasterPackbits);
        let d460bt = device.has(Capability::D460btMagic);
        let max_width = device.max_width_px as usize;
        info!(
            "printing {} raster lines on {} ({} mm tape, chain: {})",
            bitmap.width(),
            device.name,
            status.media_width_mm,
            chain
        );

        if packbits {
            transport
                .send(&command(|c| {
                    c.enable_packbits();
                }))
                .await?;
        }
        transport
            .send(&command(|c| {
                c.select_raster_mode(device.has(Capability::AltRasterSelect));
            }))
            .await?;

        if device.has(Capability::UseInfoCommand) {
            let raster_number = u32::try_from(bitmap.width())
                .map_err(|_| Error::InvalidBitmap(format!("{} columns", bitmap.width())))?;
            transport
                .send(&command(|c| {
                    c.print_information_command(status.media_width_mm, raster_number, d460bt);
                }))
                .await?;
        }
        if d460bt {
            if chain {
                transport
                    .send(&command(|c| {
                        c.d460bt_chain();
                    }))
                    .await?;
            }
            transport
                .send(&command(|c| {
                    c.d460bt_magic();
                }))
                .await?;
        }
        if device.has(Capability::HasPrecut) {
            transport
                .send(&command(|c| {
                    c.precut(true);
                }))
                .await?;
        }

        for x in 0..bitmap.width() {
            let line = bitmap.raster_line(x, max_width);
            if line.len() > device.raster_line_len() {
                return Err(Error::InvalidBitmap(format!(
                    "raster line of {} bytes exceeds {} bytes",
                    line.len(),
                    device.raster_line_len()
                )));
            }
            transport
                .send(&command(|c| {
                    c.raster_line(&line, packbits);
                }))
                .await?;
            if !self.is_connected() {
                info!("print aborted after {} of {} lines", x + 1, bitmap.width());
                return Err(Error::NotConnected);
            }
            self.check_pushed_status(transport, device).await?;
        }

        transport
            .send(&command(|c| {
                c.finalize(chain, d460bt);
            }))
            .await?;
        info!("print job sent to {}", device.name);
        Ok(())
    }

    /// Pick up a status the device pushed on its own and stop on a new
    /// blocking error.
    async fn check_pushed_status(&self, transport: &mut T, device: &DeviceType) -> Result<()> {
        let mut frame = transport.read_pending(STATUS_FRAME_LEN).await?;
        if frame.len() == SHORT_FRAME_LEN {
            warn!("got a 16-byte status frame {:02X?} during print, reading one more", frame);
            frame = transport.read_pending(STATUS_FRAME_LEN).await?;
        }
        if frame.is_empty() {
            return Ok(());
        }
        match status::decode(&frame) {
            Ok(status) => {
                let status = Arc::new(status);
                self.hub.publish(Arc::clone(&status));
                self.ensure_printable(device, &status)
            }
            Err(e) => {
                warn!("ignoring unreadable status pushed during print: {}", e);
                Ok(())
            }
        }
    }

    async fn poll_tick(&self) -> ControlFlow<()> {
        if !self.is_connected() {
            return ControlFlow::Break(());
        }
        if self.polling_suspended.load(Ordering::SeqCst) {
            trace!("status poll skipped while printing");
            return ControlFlow::Continue(());
        }

        let mut transport = self.transport.lock().await;
        if !self.is_connected() {
            return ControlFlow::Break(());
        }
        match self.poll_once(&mut transport).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) if e.is_transport_failure() => {
                warn!("status poll failed, disconnecting: {}", e);
                // Running on the poller task itself: let it end instead of aborting
                if let Some(poller) = lock(&self.poller).take() {
                    poller.detach();
                }
                self.close_session(&mut transport).await;
                ControlFlow::Break(())
            }
            Err(e) => {
                warn!("status poll failed: {}", e);
                ControlFlow::Continue(())
            }
        }
    }

    async fn poll_once(&self, transport: &mut T) -> Result<()> {
        let pending = transport.read_pending(STATUS_FRAME_LEN).await?;
        let status = if pending.is_empty() {
            self.read_status(transport).await?
        } else {
            self.decode_frame(transport, pending).await?
        };
        self.hub.publish(Arc::new(status));
        Ok(())
    }
}
