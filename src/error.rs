//! Error types for the P-Touch driver.
//!
//! Transport and decoder errors propagate unchanged up to the print engine.
//! A model that cannot be driven is not an error: see
//! [`Printer::capability_check`](crate::printer::Printer::capability_check).

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a label printer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No matching device could be found, opened or claimed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// An operation was attempted without an open connection.
    #[error("Not connected")]
    NotConnected,

    /// A bulk transfer reported a failure.
    #[error("Bulk transfer on endpoint 0x{endpoint:02x} failed: {reason}")]
    Transfer { endpoint: u8, reason: String },

    /// The status read loop ran out of attempts without receiving data.
    #[error("No status data after {attempts} attempts ({interval_ms} ms apart)")]
    Timeout { attempts: u32, interval_ms: u64 },

    /// A status frame had the wrong length or header.
    #[error("Malformed status frame: {0}")]
    ProtocolFormat(#[from] FrameError),

    /// The device reports a condition that does not allow printing.
    #[error(
        "{device} cannot print: {} (error word 0x{word:04x})",
        .errors.join(", ")
    )]
    FatalPrinter {
        device: String,
        word: u16,
        errors: Vec<&'static str>,
    },

    /// The bitmap handed to the print engine does not fit the device.
    #[error("Invalid bitmap: {0}")]
    InvalidBitmap(String),

    /// The PNG input could not be decoded.
    #[error("PNG decode error: {0}")]
    Png(#[from] png::DecodingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn transfer(endpoint: u8, reason: impl ToString) -> Self {
        Self::Transfer {
            endpoint,
            reason: reason.to_string(),
        }
    }

    /// Returns true for failures of the physical link.
    ///
    /// These force the print engine back to the disconnected state.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::NotConnected | Error::Transfer { .. } | Error::Timeout { .. }
        )
    }
}

/// Reasons a status frame is rejected by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Some firmware revisions occasionally answer with half a frame.
    /// Callers drain one more frame to get back in step.
    #[error("got a 16-byte frame, expected 32 bytes")]
    ShortFrame,

    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("unexpected header 0x{mark:02x} 0x{size:02x}, expected 0x80 0x20")]
    Header { mark: u8, size: u8 },
}
