//! Link engine
//!
//! Owns the serial port and drives the whole conversation with the
//! controller from [`Engine::tick`]. Each tick runs four steps in order:
//!
//! 1. receive: feed available bytes to the frame receiver until one frame
//!    is pending
//! 2. timeout: retransmit an overdue request, or fall back to resync once
//!    the retries are spent
//! 3. state machine: skipped while a response is awaited, otherwise drain
//!    the event queue (exit/entry handlers) and run the state's loop step
//! 4. dispatch: answer controller-initiated requests left pending
//!
//! Everything is single-threaded; observers run synchronously inside
//! [`Engine::tick`].

use heapless::{Deque, String, Vec};
use kdk_hal::SerialPort;
use kdk_protocol::{
    params, Command, DeviceRequest, Frame, FrameError, InfoRecord, ParameterBlock,
    ParameterTable, Received, Receiver, RxStats, TableId,
};

use crate::config::LinkConfig;
use crate::registry::{ParameterRegistry, ParameterUpdate, RegistryError, UpdateBatch};
use crate::state::{Event, State};
use crate::traits::ParameterObserver;
use crate::transmitter::{TimeoutCheck, Transmitter, TxStats};

/// Maximum registered observers
pub const MAX_OBSERVERS: usize = 4;

/// Event queue depth
pub const EVENT_QUEUE_SIZE: usize = 16;

/// Maximum stored length of the model and serial strings
pub const MAX_INFO_LEN: usize = 32;

/// Parameters read once at the end of bring-up
pub const INIT_EXTENDED_IDS: [u16; 13] = [
    0x8100, 0x8600, 0x8C00, 0x9300, 0xFC00, 0xFD00, 0xFE00, 0xF001, 0xF101, 0xF201, 0xF301,
    0xF401, 0xF501,
];

/// Parameters refreshed by every poll
pub const POLL_IDS: [u16; 14] = [
    0x8000, 0xF000, 0x8800, 0xF800, 0xF200, 0xF100, 0xF900, 0xFA00, 0xFB00, 0xF300, 0xF500,
    0xF400, 0xF700, 0xF600,
];

const INIT_1000_PAYLOAD: [u8; 1] = [0x20];
const DEVICE_INFO_PAYLOAD: [u8; 2] = [0x00, 0x01];
const INIT_1200_PAYLOAD: [u8; 6] = [0x01, 0x10, 0x11, 0x12, 0x13, 0x14];
const MODULE_STATUS_10_PAYLOAD: [u8; 1] = [0x10];
const MODULE_STATUS_11_PAYLOAD: [u8; 1] = [0x11];

/// Errors from the engine's control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineError {
    /// All observer slots are taken
    TooManyObservers,
    /// The update batch could not be queued
    Registry(RegistryError),
}

impl From<RegistryError> for EngineError {
    fn from(e: RegistryError) -> Self {
        EngineError::Registry(e)
    }
}

impl core::fmt::Display for EngineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EngineError::TooManyObservers => {
                write!(f, "at most {} observers can be registered", MAX_OBSERVERS)
            }
            EngineError::Registry(e) => write!(f, "{}", e),
        }
    }
}

/// Identity reported by the controller during bring-up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceInfo {
    /// Model code, e.g. `K12UC`
    pub model: String<MAX_INFO_LEN>,
    /// Serial number
    pub serial: String<MAX_INFO_LEN>,
    /// Table identifier echoed on every parameter request
    pub table_id: TableId,
    /// Time of the last `0x0101` status query
    pub last_ping_ms: Option<u32>,
}

/// Snapshot of the link for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStatus {
    pub state: State,
    pub ready: bool,
    pub rx: RxStats,
    pub tx: TxStats,
    /// Times the link went through [`State::Resync`]
    pub resyncs: u32,
    /// Parameters declared by the controller's table
    pub parameters: usize,
    pub last_poll_ms: Option<u32>,
}

/// Link engine for one controller
pub struct Engine<'a, S> {
    port: S,
    config: LinkConfig,
    state: State,
    events: Deque<Event, EVENT_QUEUE_SIZE>,
    rx: Receiver,
    tx: Transmitter,
    /// Received frame not yet consumed
    pending: Option<Frame>,
    registry: ParameterRegistry,
    queued_updates: UpdateBatch,
    device: DeviceInfo,
    observers: Vec<&'a dyn ParameterObserver, MAX_OBSERVERS>,
    started_ms: Option<u32>,
    last_poll_ms: Option<u32>,
    resyncs: u32,
}

impl<'a, S: SerialPort> Engine<'a, S> {
    /// Create an engine on an open serial port
    ///
    /// The engine starts in [`State::Uninitialized`] and waits for the
    /// controller's resync marker, or starts bring-up by itself once
    /// `wait_sync_timeout_ms` has passed.
    pub fn new(port: S, config: LinkConfig) -> Self {
        Self {
            port,
            rx: Receiver::new(config.byte_timeout_ms),
            tx: Transmitter::new(config.receive_timeout_ms, config.max_retries),
            config,
            state: State::Uninitialized,
            events: Deque::new(),
            pending: None,
            registry: ParameterRegistry::new(),
            queued_updates: UpdateBatch::new(),
            device: DeviceInfo::default(),
            observers: Vec::new(),
            started_ms: None,
            last_poll_ms: None,
            resyncs: 0,
        }
    }

    /// Advance the link; call periodically with a monotonic clock
    pub fn tick(&mut self, now_ms: u32) {
        if self.started_ms.is_none() {
            self.started_ms = Some(now_ms);
        }

        self.receive(now_ms);
        self.check_response_timeout(now_ms);
        self.run_state_machine(now_ms);
        self.dispatch(now_ms);
    }

    /// Register an observer notified after every completed poll
    pub fn register_observer(
        &mut self,
        observer: &'a dyn ParameterObserver,
    ) -> Result<(), EngineError> {
        self.observers
            .push(observer)
            .map_err(|_| EngineError::TooManyObservers)
    }

    /// Current value of a parameter; empty if unknown or not yet read
    pub fn get_parameter(&self, id: u16) -> &[u8] {
        self.registry.get(id)
    }

    /// Queue a batch of writes for the next idle tick
    ///
    /// Replaces any batch not yet sent. Validation happens when the batch
    /// is pushed; a rejected batch is dropped as a whole.
    pub fn queue_parameter_updates(&mut self, updates: &[ParameterUpdate]) -> Result<(), EngineError> {
        let mut batch = UpdateBatch::new();
        batch
            .extend_from_slice(updates)
            .map_err(|_| RegistryError::BatchTooLarge)?;
        self.queued_updates = batch;
        Ok(())
    }

    /// Check if a queued batch is waiting to be pushed
    pub fn has_pending_updates(&self) -> bool {
        !self.queued_updates.is_empty()
    }

    /// Check if bring-up has completed
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            state: self.state,
            ready: self.is_ready(),
            rx: self.rx.stats(),
            tx: self.tx.stats(),
            resyncs: self.resyncs,
            parameters: self.registry.len(),
            last_poll_ms: self.last_poll_ms,
        }
    }

    pub fn port(&self) -> &S {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut S {
        &mut self.port
    }

    // --- tick steps ---

    fn receive(&mut self, now_ms: u32) {
        while self.pending.is_none() && self.port.bytes_available() {
            let byte = match self.port.read_byte() {
                Ok(byte) => byte,
                Err(_) => {
                    warn!("RX> read failed");
                    break;
                }
            };

            match self.rx.feed(byte, now_ms) {
                Ok(None) => {}
                Ok(Some(Received::Sync)) => self.on_sync(),
                Ok(Some(Received::Frame(frame))) => {
                    trace!(
                        "RX> frame {:04X} counter={} len={}",
                        frame.command().raw(),
                        frame.counter(),
                        frame.payload().len()
                    );
                    if frame.is_response() {
                        self.tx.response_arrived();
                    }
                    self.pending = Some(frame);
                }
                Err(e) => warn!("RX> frame dropped: {:?}", e),
            }
        }
    }

    fn on_sync(&mut self) {
        info!("RX> resync marker, restarting bring-up");
        self.tx.reset();
        self.pending = None;
        self.events.clear();
        self.push_event(Event::SyncReceived);
    }

    fn check_response_timeout(&mut self, now_ms: u32) {
        match self.tx.check_timeout(&mut self.port, now_ms) {
            TimeoutCheck::Idle | TimeoutCheck::Waiting => {}
            TimeoutCheck::Retransmitted(retry) => warn!("TX> retransmit #{}", retry),
            TimeoutCheck::Exhausted => {
                error!("TX> no response after {} retries", self.config.max_retries);
                self.push_event(Event::SyncRecovery);
            }
        }
    }

    fn run_state_machine(&mut self, now_ms: u32) {
        if self.tx.is_awaiting_response() {
            return;
        }

        while let Some(event) = self.events.pop_front() {
            let current = self.state;
            let Some(next) = current.transition(event) else {
                trace!("FSM> {} ignored in {}", event.name(), current.name());
                continue;
            };

            if next != current {
                debug!("FSM> {} -> {} on {}", current.name(), next.name(), event.name());
                self.on_exit(next, now_ms);
                self.state = next;
            }
            self.on_entry(now_ms);
        }

        self.on_loop(now_ms);
    }

    fn dispatch(&mut self, now_ms: u32) {
        let Some(frame) = self.pending.take() else {
            return;
        };

        if frame.is_response() {
            warn!(
                "MSG> unexpected response {:04X} counter={}",
                frame.command().raw(),
                frame.counter()
            );
            self.tx.rearm();
            return;
        }

        match DeviceRequest::from_frame(&frame) {
            Ok(request) => self.handle_request(now_ms, request),
            Err(_) => warn!("MSG> unhandled request {:04X}", frame.command().raw()),
        }
    }

    fn handle_request(&mut self, now_ms: u32, request: DeviceRequest<'_>) {
        if let DeviceRequest::StateChanged { block, .. } = &request {
            let summary = self.registry.apply_block(block.clone());
            debug!("MSG> state changed, {} values applied", summary.applied);
        }

        let (counter, command, payload) = request.reply_parts();
        if let Err(e) = self
            .tx
            .send_reply(&mut self.port, now_ms, counter, command, payload)
        {
            error!("TX> cannot reply to {:04X}: {:?}", command.code(), e);
        }

        match request {
            DeviceRequest::StatusQuery { .. } => self.device.last_ping_ms = Some(now_ms),
            DeviceRequest::StateChanged { .. } => self.push_event(Event::PullStates),
        }
    }

    // --- state handlers ---

    fn on_entry(&mut self, now_ms: u32) {
        trace!("FSM> {} entry", self.state.name());

        match self.state {
            State::Uninitialized | State::Idle => {}
            State::Resync => {
                self.resyncs = self.resyncs.wrapping_add(1);
                self.tx.reset();
                self.rx.reset();
                self.pending = None;
                self.registry.clear();
                self.send(now_ms, Command::WAKE, &[], true);
            }
            State::Init0C00
            | State::Init4100
            | State::Init4C01
            | State::InitTableId
            | State::Init1800 => self.request(now_ms, &[]),
            State::Init1000 => self.request(now_ms, &INIT_1000_PAYLOAD),
            State::InitDeviceInfo => self.request(now_ms, &DEVICE_INFO_PAYLOAD),
            State::Init1200 => self.request(now_ms, &INIT_1200_PAYLOAD),
            State::InitParameterTable => {
                let payload = params::table_request(self.device.table_id);
                self.request(now_ms, &payload);
            }
            State::InitReadDefaults => {
                let ids = self.registry.init_readable_ids();
                match params::read_defaults_request(self.device.table_id, &ids) {
                    Ok(payload) => self.request(now_ms, &payload),
                    Err(e) => self.send_failed(e),
                }
            }
            State::InitModuleStatus10 => self.request(now_ms, &MODULE_STATUS_10_PAYLOAD),
            State::InitModuleStatus11 => self.request(now_ms, &MODULE_STATUS_11_PAYLOAD),
            State::InitReadExtended => self.read_parameters(now_ms, &INIT_EXTENDED_IDS),
            State::InitDone => {
                info!(
                    "FSM> bring-up complete, {} parameters",
                    self.registry.len()
                );
                self.push_event(Event::InitDone);
            }
            State::PullStates => self.read_parameters(now_ms, &POLL_IDS),
            State::PushStates => self.push_updates(now_ms),
        }
    }

    fn on_loop(&mut self, now_ms: u32) {
        match self.state {
            State::Uninitialized => {
                let started = self.started_ms.unwrap_or(now_ms);
                if now_ms.wrapping_sub(started) > self.config.wait_sync_timeout_ms {
                    warn!("FSM> no resync marker, starting bring-up");
                    self.push_event(Event::SyncTimeout);
                }
            }
            State::Resync => self.push_event(Event::SyncOk),
            State::InitDone => {}
            State::Idle => {
                if !self.queued_updates.is_empty() {
                    self.push_event(Event::PushStates);
                } else if self.poll_due(now_ms) {
                    self.push_event(Event::PullStates);
                }
            }
            _ => {
                if let Some(frame) = self.take_response() {
                    self.handle_response(&frame);
                    self.push_event(Event::ResponseReceived);
                }
            }
        }
    }

    fn on_exit(&mut self, next: State, now_ms: u32) {
        match (self.state, next) {
            (State::PullStates, State::Idle) => {
                self.last_poll_ms = Some(now_ms);
                for observer in &self.observers {
                    observer.on_parameter_update(&self.registry);
                }
            }
            (State::PushStates, State::Idle) => self.push_event(Event::PullStates),
            _ => {}
        }
    }

    fn poll_due(&self, now_ms: u32) -> bool {
        match self.last_poll_ms {
            Some(last) => now_ms.wrapping_sub(last) > self.config.poll_interval_ms,
            None => true,
        }
    }

    /// Take the pending frame if it answers the outstanding request
    fn take_response(&mut self) -> Option<Frame> {
        let outstanding = self.tx.outstanding()?;
        let frame = self.pending.as_ref()?;
        if !frame.is_response() || !frame.command().answers(outstanding.command) {
            return None;
        }
        if frame.counter() != outstanding.counter {
            warn!(
                "MSG> stale response {:04X}: counter={}, exp={}",
                frame.command().raw(),
                frame.counter(),
                outstanding.counter
            );
            return None;
        }

        self.tx.complete();
        self.pending.take()
    }

    fn handle_response(&mut self, frame: &Frame) {
        let payload = frame.payload();

        match self.state {
            State::InitDeviceInfo => match InfoRecord::from_payload(payload) {
                Ok(record) => {
                    self.device.model = bounded(record.model);
                    self.device.serial = bounded(record.serial);
                    info!("CMD1100> model={} serial={}", record.model, record.serial);
                }
                Err(e) => {
                    self.device.model.clear();
                    self.device.serial.clear();
                    warn!("CMD1100> malformed device info: {:?}", e);
                }
            },
            State::InitTableId => match TableId::from_response(payload) {
                Ok(id) => {
                    self.device.table_id = id;
                    debug!("CMD0010> table ID {}", id.raw());
                }
                Err(e) => {
                    self.device.table_id = TableId::default();
                    warn!("CMD0010> malformed table ID: {:?}", e);
                }
            },
            State::InitParameterTable => self.declare_parameters(payload),
            State::InitReadDefaults | State::InitReadExtended | State::PullStates => {
                let summary = self
                    .registry
                    .apply_block(ParameterBlock::from_payload(payload));
                trace!(
                    "PARAM> {} applied, {} skipped",
                    summary.applied,
                    summary.skipped
                );
            }
            _ => {}
        }
    }

    fn declare_parameters(&mut self, payload: &[u8]) {
        self.registry.clear();

        let table = match ParameterTable::from_payload(payload) {
            Ok(table) => table,
            Err(e) => {
                warn!("CMD0110> malformed parameter table: {:?}", e);
                return;
            }
        };

        for entry in table.entries() {
            debug!(
                "CMD0110> ID={:04X}, META={}, SIZE={}",
                entry.id,
                entry.metadata,
                entry.size
            );
            if let Err(e) = self.registry.declare(entry) {
                warn!("CMD0110> {:04X} not declared: {:?}", entry.id, e);
            }
        }

        if table.is_truncated() {
            warn!(
                "CMD0110> table truncated: {} of {} entries",
                self.registry.len(),
                table.declared()
            );
        }
    }

    // --- transmit helpers ---

    /// Send the current state's request
    fn request(&mut self, now_ms: u32, payload: &[u8]) {
        if let Some(command) = self.state.request() {
            self.send(now_ms, command, payload, false);
        }
    }

    fn read_parameters(&mut self, now_ms: u32, ids: &[u16]) {
        match params::read_request(self.device.table_id, ids) {
            Ok(payload) => self.request(now_ms, &payload),
            Err(e) => self.send_failed(e),
        }
    }

    fn push_updates(&mut self, now_ms: u32) {
        let updates = core::mem::take(&mut self.queued_updates);

        let batch = match self.registry.prepare_batch(&updates) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("CMD0810> batch rejected: {:?}", e);
                self.push_event(Event::PushRejected);
                return;
            }
        };

        let entries = batch.iter().map(|u| (u.id, &u.data[..]));
        match params::write_request(self.device.table_id, entries) {
            Ok(payload) => {
                self.registry.commit_batch(&batch);
                debug!("CMD0810> writing {} parameters", batch.len());
                self.request(now_ms, &payload);
            }
            Err(e) => {
                warn!("CMD0810> batch does not fit: {:?}", e);
                self.push_event(Event::PushRejected);
            }
        }
    }

    fn send(&mut self, now_ms: u32, command: Command, payload: &[u8], posted: bool) {
        if let Err(e) = self
            .tx
            .send(&mut self.port, now_ms, command, payload, posted)
        {
            self.send_failed(e);
        }
    }

    fn send_failed(&mut self, e: FrameError) {
        error!("TX> cannot build request in {}: {:?}", self.state.name(), e);
        self.push_event(Event::SyncRecovery);
    }

    fn push_event(&mut self, event: Event) {
        if self.events.push_back(event).is_err() {
            warn!("FSM> event queue full, {} dropped", event.name());
        }
    }
}

/// Copy as much of `s` as fits
fn bounded(s: &str) -> String<MAX_INFO_LEN> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use kdk_protocol::FRAME_SYNC;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Loopback {
        inbound: VecDeque<u8>,
        written: std::vec::Vec<std::vec::Vec<u8>>,
    }

    impl Loopback {
        fn inject(&mut self, frame: &Frame) {
            self.inbound.extend(frame.as_bytes());
        }
    }

    impl SerialPort for Loopback {
        type Error = ();

        fn bytes_available(&mut self) -> bool {
            !self.inbound.is_empty()
        }

        fn read_byte(&mut self) -> Result<u8, ()> {
            self.inbound.pop_front().ok_or(())
        }

        fn write_bytes(&mut self, data: &[u8]) -> Result<(), ()> {
            self.written.push(data.to_vec());
            Ok(())
        }
    }

    struct Counter(Cell<u32>);

    impl ParameterObserver for Counter {
        fn on_parameter_update(&self, _registry: &ParameterRegistry) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn engine<'a>() -> Engine<'a, Loopback> {
        Engine::new(Loopback::default(), LinkConfig::default())
    }

    #[test]
    fn test_waits_for_sync_before_waking() {
        let mut link = engine();
        link.tick(0);
        link.tick(5_000);
        assert!(link.port().written.is_empty());
        assert_eq!(link.state(), State::Uninitialized);

        // Timeout noticed, then acted on at the next tick
        link.tick(10_001);
        link.tick(10_002);
        assert_eq!(link.state(), State::Resync);
        assert_eq!(
            link.port().written[0],
            [0x5A, 0x00, 0x00, 0x06, 0x00, 0x00, 0xA0]
        );

        link.tick(10_003);
        assert_eq!(link.state(), State::Init0C00);
        let request = Frame::decode(&link.port().written[1]).unwrap();
        assert_eq!(request.command(), Command::INIT_0C00);
        assert_eq!(request.counter(), 1);
        assert!(!link.is_ready());
    }

    #[test]
    fn test_sync_marker_wakes_immediately() {
        let mut link = engine();
        link.tick(0);
        link.port_mut().inbound.push_back(FRAME_SYNC);
        link.tick(10);

        assert_eq!(link.state(), State::Resync);
        assert_eq!(link.port().written.len(), 1);
        assert_eq!(link.status().resyncs, 1);
    }

    #[test]
    fn test_status_query_answered_in_any_state() {
        let mut link = engine();
        let query = Frame::encode(0x2C, Command::STATUS_QUERY, &[]).unwrap();
        link.port_mut().inject(&query);
        link.tick(42);

        let reply = Frame::decode(&link.port().written[0]).unwrap();
        assert_eq!(reply.counter(), 0x2C);
        assert_eq!(reply.command().raw(), 0x8101);
        assert_eq!(reply.payload(), &[0x00, 0x11, 0x13]);
        assert_eq!(link.device_info().last_ping_ms, Some(42));
        assert_eq!(link.state(), State::Uninitialized);
    }

    #[test]
    fn test_unexpected_response_dropped() {
        let mut link = engine();
        let stray = Frame::encode(3, Command::READ_PARAMETERS.to_response(), &[0x00]).unwrap();
        link.port_mut().inject(&stray);
        link.tick(0);

        assert!(link.port().written.is_empty());
        assert!(!link.tx.is_awaiting_response());
    }

    #[test]
    fn test_observer_slots() {
        let counters: [Counter; MAX_OBSERVERS + 1] =
            core::array::from_fn(|_| Counter(Cell::new(0)));
        let mut link = engine();
        for counter in &counters[..MAX_OBSERVERS] {
            link.register_observer(counter).unwrap();
        }
        assert_eq!(
            link.register_observer(&counters[MAX_OBSERVERS]),
            Err(EngineError::TooManyObservers)
        );
    }

    #[test]
    fn test_queue_replaces_previous_batch() {
        let mut link = engine();
        link.queue_parameter_updates(&[ParameterUpdate::byte(0x8000, 0x30)])
            .unwrap();
        link.queue_parameter_updates(&[ParameterUpdate::byte(0xF000, 0x31)])
            .unwrap();
        assert!(link.has_pending_updates());
        assert_eq!(link.queued_updates.len(), 1);
        assert_eq!(link.queued_updates[0].id, 0xF000);

        let too_many: [ParameterUpdate; 17] =
            core::array::from_fn(|_| ParameterUpdate::byte(0x8000, 0x30));
        assert_eq!(
            link.queue_parameter_updates(&too_many),
            Err(EngineError::Registry(RegistryError::BatchTooLarge))
        );
    }

    #[test]
    fn test_bounded_strings() {
        assert_eq!(bounded("K12UC").as_str(), "K12UC");
        let long = "0123456789012345678901234567890123456789";
        assert_eq!(bounded(long).len(), MAX_INFO_LEN);
    }
}
