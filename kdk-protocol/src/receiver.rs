//! Incremental frame reassembly
//!
//! Bytes arrive one at a time from the line. The receiver accumulates them
//! into a frame and validates it once complete:
//!
//! - A partial frame is dropped when the gap since the previous byte exceeds
//!   the inter-byte timeout.
//! - While idle, only [`FRAME_START`] or [`FRAME_SYNC`] are accepted; other
//!   bytes are line noise and discarded.
//! - [`FRAME_SYNC`] is a complete one-byte message on its own.
//! - The declared length is checked against the buffer capacity as soon as
//!   the header is in.

use heapless::Vec;

use crate::frame::{
    Frame, FrameError, CHECKSUM_SIZE, FRAME_START, FRAME_SYNC, HEADER_SIZE, MAX_FRAME_SIZE,
};

/// Default inter-byte timeout in milliseconds
pub const DEFAULT_BYTE_TIMEOUT_MS: u32 = 100;

/// Something complete came off the line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// The controller sent its resync marker
    Sync,
    /// A checksum-valid frame
    Frame(Frame),
}

/// Receiver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxState {
    /// Waiting for START or SYNC
    Idle,
    /// Collecting header, payload and checksum
    Accumulating,
}

/// Receive-side counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxStats {
    /// Valid frames delivered
    pub frames: u32,
    /// Resync markers seen
    pub syncs: u32,
    /// Bytes discarded while waiting for START
    pub noise: u32,
    /// Partial frames dropped after an inter-byte timeout
    pub timeouts: u32,
    /// Frames dropped on checksum mismatch
    pub checksum_errors: u32,
    /// Frames dropped on an oversize length field
    pub oversize: u32,
}

/// Byte-at-a-time frame reassembler
#[derive(Debug, Clone)]
pub struct Receiver {
    state: RxState,
    buffer: Vec<u8, MAX_FRAME_SIZE>,
    byte_timeout_ms: u32,
    last_byte_ms: u32,
    stats: RxStats,
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new(DEFAULT_BYTE_TIMEOUT_MS)
    }
}

impl Receiver {
    /// Create a receiver with the given inter-byte timeout
    pub fn new(byte_timeout_ms: u32) -> Self {
        Self {
            state: RxState::Idle,
            buffer: Vec::new(),
            byte_timeout_ms,
            last_byte_ms: 0,
            stats: RxStats::default(),
        }
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.state = RxState::Idle;
        self.buffer.clear();
    }

    /// Current state
    pub fn state(&self) -> RxState {
        self.state
    }

    /// Number of bytes buffered for the frame in progress
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Diagnostic counters
    pub fn stats(&self) -> RxStats {
        self.stats
    }

    /// Feed one byte received at `now_ms`
    ///
    /// Returns `Ok(Some(_))` when a resync marker or a complete valid frame
    /// was received, `Ok(None)` when more bytes are needed (or the byte was
    /// discarded as noise), or `Err` when a frame in progress was dropped.
    /// The receiver is always ready for the next frame afterwards.
    pub fn feed(&mut self, byte: u8, now_ms: u32) -> Result<Option<Received>, FrameError> {
        if self.state == RxState::Accumulating
            && now_ms.wrapping_sub(self.last_byte_ms) > self.byte_timeout_ms
        {
            self.stats.timeouts = self.stats.timeouts.wrapping_add(1);
            self.reset();
        }
        self.last_byte_ms = now_ms;

        match self.state {
            RxState::Idle => match byte {
                FRAME_SYNC => {
                    self.stats.syncs = self.stats.syncs.wrapping_add(1);
                    Ok(Some(Received::Sync))
                }
                FRAME_START => {
                    // Buffer is empty while idle
                    let _ = self.buffer.push(byte);
                    self.state = RxState::Accumulating;
                    Ok(None)
                }
                _ => {
                    // Silently ignore non-START bytes while waiting
                    self.stats.noise = self.stats.noise.wrapping_add(1);
                    Ok(None)
                }
            },
            RxState::Accumulating => self.accumulate(byte),
        }
    }

    fn accumulate(&mut self, byte: u8) -> Result<Option<Received>, FrameError> {
        if self.buffer.push(byte).is_err() {
            // Unreachable with the length check below, but never overrun
            self.stats.oversize = self.stats.oversize.wrapping_add(1);
            let declared = self.buffer.get(HEADER_SIZE - 1).copied().unwrap_or(0);
            self.reset();
            return Err(FrameError::Oversize { declared });
        }

        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let declared = self.buffer[HEADER_SIZE - 1];
        let expected = HEADER_SIZE + declared as usize + CHECKSUM_SIZE;
        if expected > MAX_FRAME_SIZE {
            self.stats.oversize = self.stats.oversize.wrapping_add(1);
            self.reset();
            return Err(FrameError::Oversize { declared });
        }

        if self.buffer.len() < expected {
            return Ok(None);
        }

        let result = Frame::decode(&self.buffer);
        self.reset();

        match result {
            Ok(frame) => {
                self.stats.frames = self.stats.frames.wrapping_add(1);
                Ok(Some(Received::Frame(frame)))
            }
            Err(e) => {
                if matches!(e, FrameError::InvalidChecksum { .. }) {
                    self.stats.checksum_errors = self.stats.checksum_errors.wrapping_add(1);
                }
                Err(e)
            }
        }
    }
}
