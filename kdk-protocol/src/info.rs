//! Device information record (`0x1100` response)
//!
//! ```text
//! STATUS ?(5) LEN INFO(LEN) ...
//! ```
//!
//! INFO is ASCII `MODEL+SERIAL`. Further entries may follow; they are not
//! interpreted.

use crate::frame::FrameError;

const INFO_LEN_OFFSET: usize = 6;
const INFO_OFFSET: usize = 7;
const SEPARATOR: char = '+';

/// Model and serial number reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoRecord<'a> {
    pub model: &'a str,
    pub serial: &'a str,
}

impl<'a> InfoRecord<'a> {
    /// Parse a `0x1100` response payload
    ///
    /// A string without a separator is taken as the model alone.
    pub fn from_payload(payload: &'a [u8]) -> Result<Self, FrameError> {
        let len = *payload.get(INFO_LEN_OFFSET).ok_or(FrameError::Truncated)? as usize;
        let raw = payload
            .get(INFO_OFFSET..INFO_OFFSET + len)
            .ok_or(FrameError::Truncated)?;
        let info = core::str::from_utf8(raw).map_err(|_| FrameError::Malformed)?;

        let (model, serial) = info.split_once(SEPARATOR).unwrap_or((info, ""));
        Ok(Self { model, serial })
    }
}
