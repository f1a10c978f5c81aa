//! Simulated printer for development and tests without hardware.
//!
//! The mock answers `ESC i S` with its current status frame, records every
//! write, and can be scripted through a [`MockHandle`] after it has been
//! moved into a [`Printer`](crate::printer::Printer).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::debug;

use crate::catalog::UsbId;
use crate::error::{Error, Result};
use crate::raster_command::STATUS_REQUEST;
use crate::status::{PRINT_HEAD_MARK, STATUS_FRAME_LEN};
use crate::transport::Transport;

const MOCK_ENDPOINT_OUT: u8 = 0x02;
const MOCK_ENDPOINT_IN: u8 = 0x81;

/// Builder for 32-byte status frames.
#[derive(Clone, Copy, Debug)]
pub struct StatusFrame {
    bytes: [u8; STATUS_FRAME_LEN],
}

impl StatusFrame {
    /// A healthy PT-P700 with 24 mm laminated white tape and black text.
    pub fn new() -> Self {
        let mut bytes = [0u8; STATUS_FRAME_LEN];
        bytes[0] = PRINT_HEAD_MARK;
        bytes[1] = STATUS_FRAME_LEN as u8;
        bytes[2] = b'B';
        bytes[3] = b'0';
        bytes[4] = 0x67;
        bytes[5] = b'0';
        bytes[10] = 24;
        bytes[11] = 0x01;
        bytes[24] = 0x01;
        bytes[25] = 0x08;
        StatusFrame { bytes }
    }

    pub fn media_width(mut self, mm: u8) -> Self {
        self.bytes[10] = mm;
        self
    }

    /// Write the big-endian error word at bytes 9..=10.
    ///
    /// The low byte shares its offset with the media width.
    pub fn errors(mut self, word: u16) -> Self {
        self.bytes[9..11].copy_from_slice(&word.to_be_bytes());
        self
    }

    pub fn media_type(mut self, code: u8) -> Self {
        self.bytes[11] = code;
        self
    }

    pub fn status_type(mut self, code: u8) -> Self {
        self.bytes[18] = code;
        self
    }

    pub fn phase(mut self, phase_type: u8, high: u8, low: u8) -> Self {
        self.bytes[19] = phase_type;
        self.bytes[20] = high;
        self.bytes[21] = low;
        self
    }

    pub fn notification(mut self, code: u8) -> Self {
        self.bytes[22] = code;
        self
    }

    pub fn tape_color(mut self, code: u8) -> Self {
        self.bytes[24] = code;
        self
    }

    pub fn text_color(mut self, code: u8) -> Self {
        self.bytes[25] = code;
        self
    }

    pub fn bytes(&self) -> [u8; STATUS_FRAME_LEN] {
        self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl Default for StatusFrame {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct RasterLinePush {
    after: usize,
    frames: Vec<Vec<u8>>,
    status: Option<Vec<u8>>,
}

#[derive(Debug)]
struct MockState {
    device: UsbId,
    open: bool,
    status: Vec<u8>,
    /// Replies used for the next status requests instead of `status`
    scripted_replies: VecDeque<Vec<Vec<u8>>>,
    /// Frames waiting on the IN endpoint
    pending: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    answer_status: bool,
    fail_transfers: bool,
    /// Frames pushed unsolicited once this many raster lines arrived
    push_after_raster_lines: Option<RasterLinePush>,
    raster_lines: usize,
    /// Time each raster line transfer takes
    raster_line_delay: Duration,
    reads: usize,
}

/// Shared view of a mock device, usable while the transport is owned elsewhere.
#[derive(Clone, Debug)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        // a panicking test thread must not hide the recorded state
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Frame returned for every following status request.
    pub fn set_status(&self, frame: StatusFrame) {
        self.lock().status = frame.to_vec();
    }

    /// Answer the next status request with `frames` (any length each).
    pub fn script_reply(&self, frames: impl IntoIterator<Item = Vec<u8>>) {
        self.lock()
            .scripted_replies
            .push_back(frames.into_iter().collect());
    }

    /// Queue an unsolicited frame on the IN endpoint.
    pub fn push_frame(&self, frame: Vec<u8>) {
        self.lock().pending.push_back(frame);
    }

    /// Stop answering status requests.
    pub fn set_silent(&self, silent: bool) {
        self.lock().answer_status = !silent;
    }

    /// Make every following transfer fail.
    pub fn set_fail_transfers(&self, fail: bool) {
        self.lock().fail_transfers = fail;
    }

    /// After `lines` raster lines, push `frame` unsolicited and make it the
    /// current status.
    pub fn push_status_after_raster_lines(&self, lines: usize, frame: StatusFrame) {
        self.lock().push_after_raster_lines = Some(RasterLinePush {
            after: lines,
            frames: vec![frame.to_vec()],
            status: Some(frame.to_vec()),
        });
    }

    /// After `lines` raster lines, push `frames` (any length each) unsolicited.
    /// The current status is left alone.
    pub fn push_frames_after_raster_lines(
        &self,
        lines: usize,
        frames: impl IntoIterator<Item = Vec<u8>>,
    ) {
        self.lock().push_after_raster_lines = Some(RasterLinePush {
            after: lines,
            frames: frames.into_iter().collect(),
            status: None,
        });
    }

    /// Make every raster line transfer take `delay`.
    pub fn set_raster_line_delay(&self, delay: Duration) {
        self.lock().raster_line_delay = delay;
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Raster line transfers (`G ...`) received since creation.
    pub fn raster_lines(&self) -> usize {
        self.lock().raster_lines
    }

    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }
}

/// In-memory [`Transport`] implementation.
pub struct MockTransport {
    handle: MockHandle,
}

impl MockTransport {
    /// Simulated PT-P700.
    pub fn new() -> Self {
        Self::with_device(UsbId::new(0x04f9, 0x2061))
    }

    pub fn with_device(device: UsbId) -> Self {
        let state = MockState {
            device,
            open: false,
            status: StatusFrame::new().to_vec(),
            scripted_replies: VecDeque::new(),
            pending: VecDeque::new(),
            writes: Vec::new(),
            answer_status: true,
            fail_transfers: false,
            push_after_raster_lines: None,
            raster_lines: 0,
            raster_line_delay: Duration::ZERO,
            reads: 0,
        };
        MockTransport {
            handle: MockHandle {
                state: Arc::new(Mutex::new(state)),
            },
        }
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    async fn open(&mut self, filters: &[UsbId]) -> Result<UsbId> {
        let mut state = self.handle.lock();
        if !filters.contains(&state.device) {
            return Err(Error::Connection(format!(
                "No supported device: mock is {}",
                state.device
            )));
        }
        state.open = true;
        debug!("mock device {} opened", state.device);
        Ok(state.device)
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        // a real bulk write suspends the caller
        tokio::task::yield_now().await;
        let delay = {
            let mut state = self.handle.lock();
            if !state.open {
                return Err(Error::NotConnected);
            }
            if state.fail_transfers {
                return Err(Error::transfer(MOCK_ENDPOINT_OUT, "simulated failure"));
            }
            state.writes.push(data.to_vec());

            let mut delay = Duration::ZERO;
            if data.first() == Some(&0x47) {
                state.raster_lines += 1;
                delay = state.raster_line_delay;
                let lines = state.raster_lines;
                if let Some(push) = state
                    .push_after_raster_lines
                    .take_if(|push| push.after == lines)
                {
                    if let Some(status) = push.status {
                        state.status = status;
                    }
                    state.pending.extend(push.frames);
                }
            }
            if data.ends_with(&STATUS_REQUEST) && state.answer_status {
                let replies = match state.scripted_replies.pop_front() {
                    Some(replies) => replies,
                    None => vec![state.status.clone()],
                };
                state.pending.extend(replies);
            }
            delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn read_pending(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let mut state = self.handle.lock();
        if !state.open {
            return Err(Error::NotConnected);
        }
        if state.fail_transfers {
            return Err(Error::transfer(MOCK_ENDPOINT_IN, "simulated failure"));
        }
        state.reads += 1;
        let mut frame = state.pending.pop_front().unwrap_or_default();
        frame.truncate(max_len);
        Ok(frame)
    }

    async fn close(&mut self) {
        self.handle.lock().open = false;
    }

    fn is_open(&self) -> bool {
        self.handle.is_open()
    }
}
