use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace};
use rusb::{Device, DeviceHandle, Direction, GlobalContext, TransferType};

use crate::catalog::UsbId;
use crate::error::{Error, Result};
use crate::transport::Transport;

/// libusb treats a zero timeout as "wait forever"; this is the shortest real wait.
const PENDING_READ_TIMEOUT: Duration = Duration::from_millis(1);

const INTERFACE: u8 = 0;
const CONFIGURATION: u8 = 1;

struct Connection {
    handle: Arc<DeviceHandle<GlobalContext>>,
    endpoint_in: u8,
    endpoint_out: u8,
    detached_kernel_driver: bool,
}

/// Bulk transport over libusb.
///
/// libusb calls block, so every transfer runs on the blocking thread pool.
pub struct UsbTransport {
    connection: Option<Connection>,
    write_timeout: Duration,
}

impl UsbTransport {
    pub fn new(write_timeout: Duration) -> Self {
        UsbTransport {
            connection: None,
            write_timeout,
        }
    }

    fn connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or(Error::NotConnected)
    }
}

impl Default for UsbTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

fn connection_error(context: &str) -> impl Fn(rusb::Error) -> Error + '_ {
    move |e| Error::Connection(format!("{}: {}", context, e))
}

/// Hand `result` back, running `undo` first when it is an error.
fn undo_on_error<T>(result: Result<T>, undo: impl FnOnce()) -> Result<T> {
    if result.is_err() {
        undo();
    }
    result
}

/// First bulk IN and bulk OUT endpoint addresses.
fn bulk_endpoints(endpoints: &[(TransferType, Direction, u8)]) -> Option<(u8, u8)> {
    let find = |wanted: Direction| {
        endpoints
            .iter()
            .find(|(kind, direction, _)| *kind == TransferType::Bulk && *direction == wanted)
            .map(|(_, _, address)| *address)
    };
    Some((find(Direction::In)?, find(Direction::Out)?))
}

fn interface_endpoints(device: &Device<GlobalContext>) -> Result<Vec<(TransferType, Direction, u8)>> {
    let config_desc = device
        .active_config_descriptor()
        .map_err(connection_error("Cannot read configuration descriptor"))?;
    let mut endpoints = Vec::new();
    for interface in config_desc.interfaces().filter(|i| i.number() == INTERFACE) {
        for descriptor in interface.descriptors() {
            for endpoint in descriptor.endpoint_descriptors() {
                endpoints.push((endpoint.transfer_type(), endpoint.direction(), endpoint.address()));
            }
        }
    }
    Ok(endpoints)
}

/// Select configuration 1, claim interface 0 and find its bulk endpoints.
///
/// The interface is released again if no usable endpoints turn up.
fn claim_interface(
    device: &Device<GlobalContext>,
    handle: &DeviceHandle<GlobalContext>,
) -> Result<(u8, u8)> {
    handle
        .set_active_configuration(CONFIGURATION)
        .map_err(connection_error("Cannot select configuration 1"))?;
    handle
        .claim_interface(INTERFACE)
        .map_err(connection_error("Cannot claim interface 0"))?;

    // Endpoint numbers differ between models
    let endpoints = interface_endpoints(device).and_then(|endpoints| {
        bulk_endpoints(&endpoints).ok_or_else(|| {
            Error::Connection("Could not find bulk endpoints on interface 0".into())
        })
    });
    undo_on_error(endpoints, || {
        let _ = handle.release_interface(INTERFACE);
    })
}

fn open_blocking(filters: Vec<UsbId>) -> Result<(Connection, UsbId)> {
    let devices = rusb::devices().map_err(connection_error("USB enumeration failed"))?;

    let mut target = None;
    for device in devices.iter() {
        let Ok(desc) = device.device_descriptor() else {
            continue;
        };
        let id = UsbId::new(desc.vendor_id(), desc.product_id());
        if filters.contains(&id) {
            target = Some((device, id));
            break;
        }
    }
    let (device, id) =
        target.ok_or_else(|| Error::Connection("No supported P-Touch printer found via USB".into()))?;

    let handle = device.open().map_err(connection_error("Cannot open device"))?;

    let mut detached_kernel_driver = false;
    if handle.kernel_driver_active(INTERFACE).unwrap_or(false) {
        handle
            .detach_kernel_driver(INTERFACE)
            .map_err(connection_error("Cannot detach kernel driver"))?;
        detached_kernel_driver = true;
    }

    let (endpoint_in, endpoint_out) = undo_on_error(claim_interface(&device, &handle), || {
        if detached_kernel_driver {
            let _ = handle.attach_kernel_driver(INTERFACE);
        }
    })?;

    info!("USB connection established with {}", id);
    debug!("  Endpoint IN: 0x{:02x}", endpoint_in);
    debug!("  Endpoint OUT: 0x{:02x}", endpoint_out);

    Ok((
        Connection {
            handle: Arc::new(handle),
            endpoint_in,
            endpoint_out,
            detached_kernel_driver,
        },
        id,
    ))
}

impl Transport for UsbTransport {
    async fn open(&mut self, filters: &[UsbId]) -> Result<UsbId> {
        self.close().await;
        let filters = filters.to_vec();
        let (connection, id) = tokio::task::spawn_blocking(move || open_blocking(filters))
            .await
            .map_err(|e| Error::Connection(e.to_string()))??;
        self.connection = Some(connection);
        Ok(id)
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let connection = self.connection()?;
        let handle = Arc::clone(&connection.handle);
        let endpoint = connection.endpoint_out;
        let timeout = self.write_timeout;
        let buf = data.to_vec();

        trace!("USB write: {:02X?}", buf);
        let written = tokio::task::spawn_blocking(move || handle.write_bulk(endpoint, &buf, timeout))
            .await
            .map_err(|e| Error::transfer(endpoint, e))?
            .map_err(|e| Error::transfer(endpoint, e))?;

        if written != data.len() {
            return Err(Error::transfer(
                endpoint,
                format!("incomplete write: {} of {} bytes", written, data.len()),
            ));
        }
        Ok(())
    }

    async fn read_pending(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let connection = self.connection()?;
        let handle = Arc::clone(&connection.handle);
        let endpoint = connection.endpoint_in;

        let result = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; max_len];
            handle
                .read_bulk(endpoint, &mut buf, PENDING_READ_TIMEOUT)
                .map(|n| {
                    buf.truncate(n);
                    buf
                })
        })
        .await
        .map_err(|e| Error::transfer(endpoint, e))?;

        match result {
            Ok(buf) => {
                if !buf.is_empty() {
                    trace!("USB read: {:02X?}", buf);
                }
                Ok(buf)
            }
            Err(rusb::Error::Timeout) => Ok(Vec::new()),
            Err(e) => Err(Error::transfer(endpoint, e)),
        }
    }

    async fn close(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        let _ = tokio::task::spawn_blocking(move || {
            let _ = connection.handle.release_interface(INTERFACE);
            if connection.detached_kernel_driver {
                let _ = connection.handle.attach_kernel_driver(INTERFACE);
            }
        })
        .await;
        info!("USB connection closed");
    }

    fn is_open(&self) -> bool {
        self.connection.is_some()
    }
}
