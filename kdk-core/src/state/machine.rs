//! State machine definition
//!
//! The bring-up chain is strictly ordered: each state issues one request
//! on entry and advances on [`Event::ResponseReceived`]. Resync events
//! pre-empt the per-state table and return to [`State::Resync`] from
//! anywhere.

use kdk_protocol::Command;

use super::events::Event;

/// Link states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Power-on, waiting for the controller's resync marker
    Uninitialized,
    /// Connection state reset, wake command sent
    Resync,
    Init0C00,
    Init1000,
    /// Read model and serial number
    InitDeviceInfo,
    Init1200,
    Init4100,
    Init4C01,
    /// Read the table identifier echoed on every later request
    InitTableId,
    /// Discover every parameter's ID, metadata and size
    InitParameterTable,
    /// Read the parameters tagged readable at bring-up
    InitReadDefaults,
    Init1800,
    /// Announce module status 0x10
    InitModuleStatus10,
    /// Announce module status 0x11
    InitModuleStatus11,
    /// Read the parameters not covered by polling
    InitReadExtended,
    /// Bring-up complete
    InitDone,
    /// Steady state, nothing outstanding
    Idle,
    /// Reading the polled parameter set
    PullStates,
    /// Writing the queued parameter batch
    PushStates,
}

impl State {
    /// Check if bring-up has completed and the registry is usable
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            State::InitDone | State::Idle | State::PullStates | State::PushStates
        )
    }

    /// Request issued on entry to this state, if it expects a response
    pub fn request(&self) -> Option<Command> {
        match self {
            State::Init0C00 => Some(Command::INIT_0C00),
            State::Init1000 => Some(Command::INIT_1000),
            State::InitDeviceInfo => Some(Command::DEVICE_INFO),
            State::Init1200 => Some(Command::INIT_1200),
            State::Init4100 => Some(Command::INIT_4100),
            State::Init4C01 => Some(Command::INIT_4C01),
            State::InitTableId => Some(Command::TABLE_ID),
            State::InitParameterTable => Some(Command::PARAMETER_TABLE),
            State::InitReadDefaults => Some(Command::READ_DEFAULTS),
            State::Init1800 => Some(Command::INIT_1800),
            State::InitModuleStatus10 | State::InitModuleStatus11 => {
                Some(Command::MODULE_STATUS)
            }
            State::InitReadExtended | State::PullStates => Some(Command::READ_PARAMETERS),
            State::PushStates => Some(Command::WRITE_PARAMETERS),
            State::Uninitialized | State::Resync | State::InitDone | State::Idle => None,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            State::Uninitialized => "UNINITIALIZED",
            State::Resync => "RESYNC",
            State::Init0C00 => "INIT_0C00",
            State::Init1000 => "INIT_1000",
            State::InitDeviceInfo => "INIT_1100",
            State::Init1200 => "INIT_1200",
            State::Init4100 => "INIT_4100",
            State::Init4C01 => "INIT_4C01",
            State::InitTableId => "INIT_0010",
            State::InitParameterTable => "INIT_0110",
            State::InitReadDefaults => "INIT_0210",
            State::Init1800 => "INIT_1800",
            State::InitModuleStatus10 => "INIT_0001_10",
            State::InitModuleStatus11 => "INIT_0001_11",
            State::InitReadExtended => "INIT_0910",
            State::InitDone => "INIT_DONE",
            State::Idle => "IDLE",
            State::PullStates => "PULL_STATES",
            State::PushStates => "PUSH_STATES",
        }
    }

    /// Process an event and return the next state
    ///
    /// `None` means the event does not apply here and is dropped.
    /// `Some(self)` re-enters the current state.
    pub fn transition(self, event: Event) -> Option<Self> {
        use Event as E;
        use State::*;

        if event.is_resync() {
            return Some(Resync);
        }

        let next = match (self, event) {
            (Uninitialized, E::SyncTimeout) => Resync,
            (Resync, E::SyncOk) => Init0C00,

            // Bring-up chain
            (Init0C00, E::ResponseReceived) => Init1000,
            (Init1000, E::ResponseReceived) => InitDeviceInfo,
            (InitDeviceInfo, E::ResponseReceived) => Init1200,
            (Init1200, E::ResponseReceived) => Init4100,
            (Init4100, E::ResponseReceived) => Init4C01,
            (Init4C01, E::ResponseReceived) => InitTableId,
            (InitTableId, E::ResponseReceived) => InitParameterTable,
            (InitParameterTable, E::ResponseReceived) => InitReadDefaults,
            (InitReadDefaults, E::ResponseReceived) => Init1800,
            (Init1800, E::ResponseReceived) => InitModuleStatus10,
            (InitModuleStatus10, E::ResponseReceived) => InitModuleStatus11,
            (InitModuleStatus11, E::ResponseReceived) => InitReadExtended,
            (InitReadExtended, E::ResponseReceived) => InitDone,

            // Pull the initial state
            (InitDone, E::InitDone) => PullStates,

            // Steady state
            (Idle, E::PullStates) => PullStates,
            (Idle, E::PushStates) => PushStates,
            (PullStates, E::ResponseReceived) => Idle,
            (PushStates, E::ResponseReceived) => Idle,
            (PushStates, E::PushRejected) => Idle,

            _ => return None,
        };
        Some(next)
    }
}

impl core::fmt::Display for State {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
