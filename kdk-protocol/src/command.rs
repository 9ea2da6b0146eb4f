//! Command codes
//!
//! Commands are 16-bit values sent little-endian on the wire. Bit 15 marks
//! a response; the remaining bits carry the command code, so a response to
//! `0x0910` arrives as `0x8910`.
//!
//! Several bring-up commands have no known meaning beyond "the controller
//! expects them in this order"; those keep their numeric names.

/// Response flag (bit 15)
pub const RESPONSE_FLAG: u16 = 0x8000;

/// A 16-bit command, possibly carrying the response flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Command(u16);

impl Command {
    // Module → controller requests
    /// Wake the controller after a resync; never answered
    pub const WAKE: Command = Command(0x0600);
    pub const INIT_0C00: Command = Command(0x0C00);
    pub const INIT_1000: Command = Command(0x1000);
    /// Product model and serial number
    pub const DEVICE_INFO: Command = Command(0x1100);
    pub const INIT_1200: Command = Command(0x1200);
    pub const INIT_4100: Command = Command(0x4100);
    pub const INIT_4C01: Command = Command(0x4C01);
    /// Session / parameter table identifier
    pub const TABLE_ID: Command = Command(0x0010);
    /// List of supported parameters
    pub const PARAMETER_TABLE: Command = Command(0x0110);
    /// Read the parameters tagged as readable at bring-up
    pub const READ_DEFAULTS: Command = Command(0x0210);
    pub const INIT_1800: Command = Command(0x1800);
    /// Module status announcement
    pub const MODULE_STATUS: Command = Command(0x0001);
    /// Batch parameter read
    pub const READ_PARAMETERS: Command = Command(0x0910);
    /// Batch parameter write
    pub const WRITE_PARAMETERS: Command = Command(0x0810);

    // Controller → module requests
    /// Periodic module status query
    pub const STATUS_QUERY: Command = Command(0x0101);
    /// Major state change notification (on/off class changes only)
    pub const STATE_CHANGED: Command = Command(0x0A10);

    /// Wrap a raw on-wire value
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw on-wire value, response flag included
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Command code with the response flag stripped
    pub const fn code(self) -> u16 {
        self.0 & !RESPONSE_FLAG
    }

    /// Check whether the response flag is set
    pub const fn is_response(self) -> bool {
        self.0 & RESPONSE_FLAG != 0
    }

    /// The response form of this command
    pub const fn to_response(self) -> Self {
        Self(self.0 | RESPONSE_FLAG)
    }

    /// Check whether this is a response to `request`
    pub const fn answers(self, request: Command) -> bool {
        self.is_response() && self.code() == request.code()
    }
}

impl From<u16> for Command {
    fn from(raw: u16) -> Self {
        Self::from_raw(raw)
    }
}
