//! Events that trigger state transitions

/// Events that can trigger state transitions
///
/// Events are always queued and drained by the engine; handlers never
/// transition synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    // Resync events, accepted in every state
    /// The controller sent its resync marker
    SyncReceived,
    /// Retransmissions exhausted without a response
    SyncRecovery,

    // Bring-up events
    /// No resync marker within the start-up window
    SyncTimeout,
    /// Wake command sent
    SyncOk,
    /// The response to the outstanding request arrived and was handled
    ResponseReceived,
    /// Bring-up sequence finished
    InitDone,

    // Steady-state events
    /// Read the polled parameter set
    PullStates,
    /// Write the queued parameter batch
    PushStates,
    /// The queued batch failed validation and was discarded
    PushRejected,
}

impl Event {
    /// Check if this event forces a resync regardless of state
    pub fn is_resync(&self) -> bool {
        matches!(self, Event::SyncReceived | Event::SyncRecovery)
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::SyncReceived => "SYNC_RECEIVED",
            Event::SyncRecovery => "SYNC_RECOVERY",
            Event::SyncTimeout => "SYNC_TIMEOUT",
            Event::SyncOk => "SYNC_OK",
            Event::ResponseReceived => "RESPONSE_RECEIVED",
            Event::InitDone => "INIT_DONE",
            Event::PullStates => "PULL_STATES",
            Event::PushStates => "PUSH_STATES",
            Event::PushRejected => "PUSH_REJECTED",
        }
    }
}

impl core::fmt::Display for Event {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resync_events() {
        assert!(Event::SyncReceived.is_resync());
        assert!(Event::SyncRecovery.is_resync());
        assert!(!Event::SyncTimeout.is_resync());
        assert!(!Event::ResponseReceived.is_resync());
    }

    #[test]
    fn test_display() {
        assert_eq!(std::format!("{}", Event::PullStates), "PULL_STATES");
    }
}
