//! Frame encoding and verification for the controller link.
//!
//! Frame format:
//! - START (1 byte): 0x5A on every normal frame
//! - COUNTER (1 byte): rolling sequence counter, echoed by responses
//! - COMMAND (2 bytes): little-endian, bit 15 set on responses
//! - RESERVED (1 byte): always 0x00
//! - LENGTH (1 byte): payload length (0-250)
//! - PAYLOAD (0-250 bytes): command-specific data
//! - CHECKSUM (1 byte): two's complement of the sum of every preceding byte
//!
//! A lone 0x66 in place of START is the controller's resync marker; it is
//! handled by the [`Receiver`](crate::receiver::Receiver) and never forms a frame.

use core::fmt;

use heapless::Vec;

use crate::command::Command;

/// Line-start byte of every normal frame
pub const FRAME_START: u8 = 0x5A;

/// Resync marker sent by the controller on power-up
pub const FRAME_SYNC: u8 = 0x66;

/// START + COUNTER + COMMAND + RESERVED + LENGTH
pub const HEADER_SIZE: usize = 6;

/// Trailing checksum byte
pub const CHECKSUM_SIZE: usize = 1;

/// Maximum payload size in bytes
pub const MAX_PAYLOAD_SIZE: usize = 250;

/// Maximum complete frame size, also the receive buffer capacity
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE + CHECKSUM_SIZE;

const COUNTER_INDEX: usize = 1;
const COMMAND_INDEX: usize = 2;
const RESERVED_INDEX: usize = 4;
const LENGTH_INDEX: usize = 5;

/// Errors that can occur while building or decoding frames and payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload exceeds maximum allowed size
    PayloadTooLarge,
    /// Checksum mismatch
    InvalidChecksum { expected: u8, actual: u8 },
    /// Declared length does not fit the receive buffer
    Oversize { declared: u8 },
    /// First byte is not a line-start marker
    InvalidStart(u8),
    /// Fewer bytes than the structure declares
    Truncated,
    /// Too many IDs for a single request
    TooManyIds,
    /// Payload content does not follow the expected layout
    Malformed,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::PayloadTooLarge => write!(f, "payload too large"),
            FrameError::InvalidChecksum { expected, actual } => {
                write!(f, "invalid checksum: got={:02X}, exp={:02X}", actual, expected)
            }
            FrameError::Oversize { declared } => {
                write!(f, "declared length {} exceeds receive buffer", declared)
            }
            FrameError::InvalidStart(byte) => write!(f, "invalid start byte {:02X}", byte),
            FrameError::Truncated => write!(f, "truncated"),
            FrameError::TooManyIds => write!(f, "too many parameter IDs"),
            FrameError::Malformed => write!(f, "malformed payload"),
        }
    }
}

/// Two's complement of the byte sum, so that the sum of a frame including
/// its checksum is zero (mod 256)
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |sum, &b| sum.wrapping_add(b))
        .wrapping_neg()
}

/// Verify the trailing checksum byte of a complete frame
pub fn verify(bytes: &[u8]) -> Result<(), FrameError> {
    let (body, tail) = match bytes.split_last() {
        Some((last, body)) => (body, *last),
        None => return Err(FrameError::Truncated),
    };

    let expected = checksum(body);
    if expected != tail {
        return Err(FrameError::InvalidChecksum {
            expected,
            actual: tail,
        });
    }
    Ok(())
}

/// A complete, checksummed frame
///
/// The raw bytes are kept as-is (header, payload and checksum) so the
/// frame can be retransmitted verbatim; fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8, MAX_FRAME_SIZE>,
}

impl Frame {
    /// Build a frame and append its checksum
    pub fn encode(counter: u8, command: Command, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge);
        }

        let [cmd_lo, cmd_hi] = command.raw().to_le_bytes();

        let mut bytes = Vec::new();
        bytes
            .extend_from_slice(&[
                FRAME_START,
                counter,
                cmd_lo,
                cmd_hi,
                0x00,
                payload.len() as u8,
            ])
            .map_err(|_| FrameError::PayloadTooLarge)?;
        bytes
            .extend_from_slice(payload)
            .map_err(|_| FrameError::PayloadTooLarge)?;
        bytes
            .push(checksum(&bytes))
            .map_err(|_| FrameError::PayloadTooLarge)?;

        Ok(Self { bytes })
    }

    /// Validate a complete frame received from the line
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE + CHECKSUM_SIZE {
            return Err(FrameError::Truncated);
        }
        if bytes[0] != FRAME_START {
            return Err(FrameError::InvalidStart(bytes[0]));
        }

        let declared = bytes[LENGTH_INDEX];
        let expected_len = HEADER_SIZE + declared as usize + CHECKSUM_SIZE;
        if expected_len > MAX_FRAME_SIZE {
            return Err(FrameError::Oversize { declared });
        }
        if bytes.len() != expected_len {
            return Err(FrameError::Truncated);
        }

        verify(bytes)?;

        let mut buf = Vec::new();
        buf.extend_from_slice(bytes)
            .map_err(|_| FrameError::Oversize { declared })?;
        Ok(Self { bytes: buf })
    }

    /// Rolling sequence counter
    pub fn counter(&self) -> u8 {
        self.bytes[COUNTER_INDEX]
    }

    /// Command code including the response flag
    pub fn command(&self) -> Command {
        Command::from_raw(u16::from_le_bytes([
            self.bytes[COMMAND_INDEX],
            self.bytes[COMMAND_INDEX + 1],
        ]))
    }

    /// Reserved header byte, passed through untouched
    pub fn reserved(&self) -> u8 {
        self.bytes[RESERVED_INDEX]
    }

    /// Check whether the response flag is set
    pub fn is_response(&self) -> bool {
        self.command().is_response()
    }

    /// Payload bytes
    pub fn payload(&self) -> &[u8] {
        let len = self.bytes[LENGTH_INDEX] as usize;
        &self.bytes[HEADER_SIZE..HEADER_SIZE + len]
    }

    /// Trailing checksum byte
    pub fn checksum(&self) -> u8 {
        self.bytes[self.bytes.len() - 1]
    }

    /// Raw on-wire bytes, checksum included
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
