//! Request transmission and retransmission bookkeeping
//!
//! Only one request is outstanding at a time. Each tick the engine asks
//! [`Transmitter::check_timeout`] whether the response is overdue; the last
//! frame is retransmitted verbatim until the retry budget runs out, at
//! which point the caller escalates to a resync.

use kdk_hal::SerialPort;
use kdk_protocol::{Command, Frame, FrameError};

/// Counter value after a resync, so the first request carries 0x00
pub const COUNTER_SENTINEL: u8 = 0xFF;

/// The request a response is expected for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Outstanding {
    pub command: Command,
    pub counter: u8,
}

/// Result of a timeout check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeoutCheck {
    /// No response awaited
    Idle,
    /// Response awaited, still within the timeout
    Waiting,
    /// Last frame sent again; carries the retry number
    Retransmitted(u8),
    /// Retry budget exhausted; the request is abandoned
    Exhausted,
}

/// Transmit-side counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxStats {
    pub requests: u32,
    pub replies: u32,
    pub retransmits: u32,
    pub exhausted: u32,
    pub write_errors: u32,
}

/// Outbound half of the link
#[derive(Debug, Clone)]
pub struct Transmitter {
    counter: u8,
    last_frame: Option<Frame>,
    last_tx_ms: u32,
    retry_count: u8,
    awaiting_response: bool,
    outstanding: Option<Outstanding>,
    receive_timeout_ms: u32,
    max_retries: u8,
    stats: TxStats,
}

impl Transmitter {
    pub fn new(receive_timeout_ms: u32, max_retries: u8) -> Self {
        Self {
            counter: COUNTER_SENTINEL,
            last_frame: None,
            last_tx_ms: 0,
            retry_count: 0,
            awaiting_response: false,
            outstanding: None,
            receive_timeout_ms,
            max_retries,
            stats: TxStats::default(),
        }
    }

    /// Forget everything in flight and rewind the counter
    pub fn reset(&mut self) {
        self.counter = COUNTER_SENTINEL;
        self.last_frame = None;
        self.retry_count = 0;
        self.awaiting_response = false;
        self.outstanding = None;
    }

    /// Counter of the most recent request
    pub fn counter(&self) -> u8 {
        self.counter
    }

    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub fn outstanding(&self) -> Option<Outstanding> {
        self.outstanding
    }

    pub fn stats(&self) -> TxStats {
        self.stats
    }

    /// Send a request with the next counter value
    ///
    /// A `posted` request expects no response. Nothing is transmitted and
    /// the counter does not advance if the frame cannot be built.
    pub fn send<S: SerialPort>(
        &mut self,
        port: &mut S,
        now_ms: u32,
        command: Command,
        payload: &[u8],
        posted: bool,
    ) -> Result<(), FrameError> {
        let counter = self.counter.wrapping_add(1);
        let frame = Frame::encode(counter, command, payload)?;
        self.counter = counter;

        trace!(
            "TX> request {:04X} counter={} len={} posted={}",
            command.raw(),
            counter,
            payload.len(),
            posted
        );
        self.transmit(port, now_ms, &frame);
        self.stats.requests = self.stats.requests.wrapping_add(1);

        self.last_frame = Some(frame);
        self.retry_count = 0;
        if posted {
            self.awaiting_response = false;
            self.outstanding = None;
        } else {
            self.awaiting_response = true;
            self.outstanding = Some(Outstanding { command, counter });
        }
        Ok(())
    }

    /// Answer a controller-initiated request, echoing its counter
    ///
    /// Replies are never retransmitted and leave any outstanding request
    /// untouched.
    pub fn send_reply<S: SerialPort>(
        &mut self,
        port: &mut S,
        now_ms: u32,
        counter: u8,
        command: Command,
        payload: &[u8],
    ) -> Result<(), FrameError> {
        let frame = Frame::encode(counter, command, payload)?;
        trace!("TX> reply {:04X} counter={}", command.raw(), counter);

        // Keep the retransmit clock of an outstanding request
        let last_tx_ms = self.last_tx_ms;
        self.transmit(port, now_ms, &frame);
        if self.awaiting_response {
            self.last_tx_ms = last_tx_ms;
        }
        self.stats.replies = self.stats.replies.wrapping_add(1);
        Ok(())
    }

    /// A response frame arrived; stop waiting until it is checked
    pub fn response_arrived(&mut self) {
        self.awaiting_response = false;
    }

    /// The outstanding request was answered
    pub fn complete(&mut self) {
        self.awaiting_response = false;
        self.outstanding = None;
    }

    /// Resume waiting after a response turned out not to match
    pub fn rearm(&mut self) {
        if self.outstanding.is_some() {
            self.awaiting_response = true;
        }
    }

    /// Retransmit the last request if its response is overdue
    pub fn check_timeout<S: SerialPort>(&mut self, port: &mut S, now_ms: u32) -> TimeoutCheck {
        if !self.awaiting_response {
            return TimeoutCheck::Idle;
        }

        let elapsed = now_ms.wrapping_sub(self.last_tx_ms);
        if elapsed < self.receive_timeout_ms {
            return TimeoutCheck::Waiting;
        }

        warn!("RX> response timeout after {} ms", elapsed);

        if self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.stats.retransmits = self.stats.retransmits.wrapping_add(1);
            if let Some(frame) = self.last_frame.take() {
                self.transmit(port, now_ms, &frame);
                self.last_frame = Some(frame);
            }
            TimeoutCheck::Retransmitted(self.retry_count)
        } else {
            self.stats.exhausted = self.stats.exhausted.wrapping_add(1);
            self.awaiting_response = false;
            self.outstanding = None;
            TimeoutCheck::Exhausted
        }
    }

    fn transmit<S: SerialPort>(&mut self, port: &mut S, now_ms: u32, frame: &Frame) {
        if port.write_bytes(frame.as_bytes()).is_err() {
            // Left to the retry path
            warn!("TX> write failed");
            self.stats.write_errors = self.stats.write_errors.wrapping_add(1);
        }
        self.last_tx_ms = now_ms;
    }
}
