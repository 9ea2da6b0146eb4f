//! Controller-initiated requests
//!
//! Outside the module's own request/response exchanges the controller
//! sends two kinds of request, each answered with the controller's counter
//! echoed back:
//! - `0x0101` status query, polled periodically
//! - `0x0A10` state changed, sent on major (on/off class) changes only

use crate::command::Command;
use crate::frame::{Frame, FrameError};
use crate::params::{ParameterBlock, BLOCK_OFFSET};

/// Reply payload to a status query
pub const STATUS_REPLY: [u8; 3] = [0x00, 0x11, 0x13];

/// Requests parsed from controller-originated frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRequest<'a> {
    /// Periodic status query
    StatusQuery { counter: u8 },
    /// A major state changed; carries the changed values
    StateChanged {
        counter: u8,
        /// Status byte and table identifier, echoed in the reply
        header: &'a [u8],
        block: ParameterBlock<'a>,
    },
}

impl<'a> DeviceRequest<'a> {
    /// Parse a request from a frame
    ///
    /// Responses and unknown commands are rejected with
    /// [`FrameError::Malformed`].
    pub fn from_frame(frame: &'a Frame) -> Result<Self, FrameError> {
        let command = frame.command();
        if command.is_response() {
            return Err(FrameError::Malformed);
        }

        match command {
            Command::STATUS_QUERY => Ok(DeviceRequest::StatusQuery {
                counter: frame.counter(),
            }),
            Command::STATE_CHANGED => {
                let payload = frame.payload();
                let header = payload.get(..BLOCK_OFFSET).ok_or(FrameError::Truncated)?;
                Ok(DeviceRequest::StateChanged {
                    counter: frame.counter(),
                    header,
                    block: ParameterBlock::from_payload(payload),
                })
            }
            _ => Err(FrameError::Malformed),
        }
    }

    /// Counter, command and payload of the reply to this request
    pub fn reply_parts(&self) -> (u8, Command, &[u8]) {
        match self {
            DeviceRequest::StatusQuery { counter } => (
                *counter,
                Command::STATUS_QUERY.to_response(),
                &STATUS_REPLY[..],
            ),
            DeviceRequest::StateChanged {
                counter, header, ..
            } => (*counter, Command::STATE_CHANGED.to_response(), *header),
        }
    }

    /// Encode the reply frame for this request
    pub fn reply(&self) -> Result<Frame, FrameError> {
        let (counter, command, payload) = self.reply_parts();
        Frame::encode(counter, command, payload)
    }
}
