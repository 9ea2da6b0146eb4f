//! Link engine against a scripted controller
//!
//! The controller answers every request synchronously from `write_bytes`,
//! so a response is readable on the tick after the request went out.

use std::cell::Cell;
use std::collections::{BTreeMap, VecDeque};

use kdk_core::{Engine, LinkConfig, ParameterObserver, ParameterRegistry, ParameterUpdate, State};
use kdk_hal::SerialPort;
use kdk_protocol::{Command, Frame, FRAME_SYNC};

const TABLE_ID: [u8; 3] = [0x12, 0x34, 0x56];
const TICK_MS: u32 = 10;

/// (ID, metadata, initial value)
const TABLE: [(u16, u8, &[u8]); 5] = [
    (0x8000, 0xE2, &[0x30]),
    (0xF000, 0xE2, &[0x31]),
    (0xF300, 0xE2, &[0x31]),
    (0x8200, 0x40, &[0x01, 0x02]),
    (0x8100, 0x62, &[0x30]),
];

struct Controller {
    inbound: VecDeque<u8>,
    sent: Vec<Frame>,
    values: BTreeMap<u16, Vec<u8>>,
    /// Ignore the next N requests with this command
    mute: Option<(u16, usize)>,
    /// Answer the next N requests with this command using a stale counter
    skew: Option<(u16, usize)>,
    /// Answer the next request with each of these commands with a
    /// too-short payload
    garble: Vec<u16>,
}

impl Controller {
    fn new() -> Self {
        Self {
            inbound: VecDeque::from([FRAME_SYNC]),
            sent: Vec::new(),
            values: TABLE.iter().map(|(id, _, v)| (*id, v.to_vec())).collect(),
            mute: None,
            skew: None,
            garble: Vec::new(),
        }
    }

    fn inject(&mut self, frame: &Frame) {
        self.inbound.extend(frame.as_bytes());
    }

    fn answer(&mut self, request: &Frame) {
        let command = request.command().raw();
        if command == Command::WAKE.raw() {
            return;
        }
        if take_one(&mut self.mute, command) {
            return;
        }
        if let Some(pos) = self.garble.iter().position(|c| *c == command) {
            self.garble.remove(pos);
            let reply = Command::from_raw(command).to_response();
            self.inject(&Frame::encode(request.counter(), reply, &[0x00, 0x00]).unwrap());
            return;
        }

        let payload = request.payload();
        let response: Vec<u8> = match command {
            0x1100 => {
                let info = b"K12UC+VBHH-GY242200126";
                let mut out = vec![0x00, 0x00, 0x01, 0x00, 0x01, 0x0A, info.len() as u8];
                out.extend_from_slice(info);
                out
            }
            0x0010 => {
                let mut out = vec![0x00, 0x00];
                out.extend_from_slice(&TABLE_ID);
                out
            }
            0x0110 => {
                let mut out = vec![0x00];
                out.extend_from_slice(&TABLE_ID);
                out.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, TABLE.len() as u8]);
                for (id, meta, value) in TABLE {
                    out.extend_from_slice(&id.to_le_bytes());
                    out.push(meta);
                    out.push(value.len() as u8);
                }
                out
            }
            0x0210 => self.read_block(&payload[4..]),
            0x0910 => self.read_block(&payload[5..]),
            0x0810 => {
                self.write_block(&payload[5..]);
                vec![0x00]
            }
            _ => vec![0x00],
        };

        let mut counter = request.counter();
        if take_one(&mut self.skew, command) {
            counter = counter.wrapping_sub(1);
        }
        let frame = Frame::encode(counter, Command::from_raw(command).to_response(), &response)
            .unwrap();
        self.inject(&frame);
    }

    fn read_block(&self, ids: &[u8]) -> Vec<u8> {
        let mut out = vec![0x00];
        out.extend_from_slice(&TABLE_ID);
        out.push(0);
        for chunk in ids.chunks(3) {
            let id = u16::from_le_bytes([chunk[0], chunk[1]]);
            if let Some(value) = self.values.get(&id) {
                out.extend_from_slice(&chunk[..2]);
                out.push(value.len() as u8);
                out.extend_from_slice(value);
                out[4] += 1;
            }
        }
        out
    }

    fn write_block(&mut self, mut entries: &[u8]) {
        while let [lo, hi, len, rest @ ..] = entries {
            let len = *len as usize;
            self.values
                .insert(u16::from_le_bytes([*lo, *hi]), rest[..len].to_vec());
            entries = &rest[len..];
        }
    }
}

fn take_one(slot: &mut Option<(u16, usize)>, command: u16) -> bool {
    match slot {
        Some((c, n)) if *c == command && *n > 0 => {
            *n -= 1;
            true
        }
        _ => false,
    }
}

impl SerialPort for Controller {
    type Error = ();

    fn bytes_available(&mut self) -> bool {
        !self.inbound.is_empty()
    }

    fn read_byte(&mut self) -> Result<u8, ()> {
        self.inbound.pop_front().ok_or(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), ()> {
        let frame = Frame::decode(data).unwrap();
        if !frame.is_response() {
            self.answer(&frame);
        }
        self.sent.push(frame);
        Ok(())
    }
}

#[derive(Default)]
struct Polls {
    count: Cell<u32>,
    fan: Cell<Option<u8>>,
}

impl ParameterObserver for Polls {
    fn on_parameter_update(&self, registry: &ParameterRegistry) {
        self.count.set(self.count.get() + 1);
        self.fan.set(registry.get(0x8000).first().copied());
    }
}

struct Bench<'a> {
    link: Engine<'a, Controller>,
    now: u32,
}

impl<'a> Bench<'a> {
    fn new(controller: Controller) -> Self {
        Self {
            link: Engine::new(controller, LinkConfig::default()),
            now: 0,
        }
    }

    fn step(&mut self) {
        self.now += TICK_MS;
        self.link.tick(self.now);
    }

    fn run_until(&mut self, done: impl Fn(&Engine<'a, Controller>) -> bool) {
        for _ in 0..2_000 {
            self.step();
            if done(&self.link) {
                return;
            }
        }
        panic!("stuck in {}", self.link.state());
    }

    fn bring_up(&mut self) {
        self.run_until(|link| link.state() == State::Idle);
    }

    fn requests(&self) -> Vec<u16> {
        self.link
            .port()
            .sent
            .iter()
            .filter(|f| !f.is_response())
            .map(|f| f.command().raw())
            .collect()
    }

    fn sent_with(&self, command: u16) -> Vec<&Frame> {
        self.link
            .port()
            .sent
            .iter()
            .filter(|f| f.command().raw() == command)
            .collect()
    }
}

#[test]
fn test_full_bring_up() {
    let polls = Polls::default();
    let mut bench = Bench::new(Controller::new());
    bench.link.register_observer(&polls).unwrap();

    // Ready exactly when the final bring-up response has been handled
    bench.run_until(|link| link.is_ready());
    assert_eq!(bench.link.state(), State::PullStates);
    assert_eq!(bench.sent_with(0x0910).len(), 2);
    assert_eq!(polls.count.get(), 0);

    bench.bring_up();
    assert_eq!(
        bench.requests(),
        [
            0x0600, 0x0C00, 0x1000, 0x1100, 0x1200, 0x4100, 0x4C01, 0x0010, 0x0110, 0x0210,
            0x1800, 0x0001, 0x0001, 0x0910, 0x0910
        ]
    );

    // Counters run from zero after the wake
    let counters: Vec<u8> = bench
        .link
        .port()
        .sent
        .iter()
        .map(|f| f.counter())
        .collect();
    assert_eq!(counters, (0..15).collect::<Vec<u8>>());

    let info = bench.link.device_info();
    assert_eq!(info.model.as_str(), "K12UC");
    assert_eq!(info.serial.as_str(), "VBHH-GY242200126");
    assert_eq!(info.table_id.to_le_bytes(), TABLE_ID);

    assert_eq!(bench.link.registry().len(), TABLE.len());
    assert_eq!(bench.link.get_parameter(0x8200), &[0x01, 0x02]);
    assert_eq!(bench.link.get_parameter(0x8100), &[0x30]);
    assert_eq!(bench.link.get_parameter(0xF000), &[0x31]);
    assert_eq!(bench.link.get_parameter(0x8800), &[] as &[u8]);

    assert_eq!(polls.count.get(), 1);
    assert_eq!(polls.fan.get(), Some(0x30));
    assert_eq!(bench.link.status().resyncs, 1);
}

#[test]
fn test_resync_from_steady_state() {
    let polls = Polls::default();
    let mut bench = Bench::new(Controller::new());
    bench.link.register_observer(&polls).unwrap();
    bench.bring_up();
    let sent_before = bench.link.port().sent.len();

    let port = bench.link.port_mut();
    port.values.insert(0x8000, vec![0x31]);
    port.inbound.push_back(FRAME_SYNC);
    bench.step();

    assert_eq!(bench.link.state(), State::Resync);
    assert!(!bench.link.is_ready());
    assert!(bench.link.registry().is_empty());
    assert_eq!(bench.link.get_parameter(0x8000), &[] as &[u8]);

    bench.bring_up();
    assert!(bench.link.is_ready());
    assert_eq!(bench.link.registry().len(), TABLE.len());
    assert_eq!(bench.link.get_parameter(0x8000), &[0x31]);
    assert_eq!(bench.link.status().resyncs, 2);
    assert_eq!(polls.count.get(), 2);
    assert_eq!(polls.fan.get(), Some(0x31));

    // Same chain again, counters starting over from the wake
    let rerun: Vec<(u16, u8)> = bench.link.port().sent[sent_before..]
        .iter()
        .map(|f| (f.command().raw(), f.counter()))
        .collect();
    assert_eq!(rerun.len(), 15);
    assert_eq!(rerun[0], (0x0600, 0));
    assert_eq!(rerun[1], (0x0C00, 1));
    assert!(rerun.iter().map(|(_, c)| *c).eq(0..15u8));
}

#[test]
fn test_malformed_identity_after_resync() {
    let mut bench = Bench::new(Controller::new());
    bench.bring_up();
    assert_eq!(bench.link.device_info().model.as_str(), "K12UC");

    let port = bench.link.port_mut();
    port.garble = vec![0x1100, 0x0010];
    port.inbound.push_back(FRAME_SYNC);
    bench.bring_up();

    // Nothing from the previous bring-up survives, and bring-up completes
    let info = bench.link.device_info();
    assert_eq!(info.model.as_str(), "");
    assert_eq!(info.serial.as_str(), "");
    assert_eq!(info.table_id.raw(), 0);
    assert!(bench.link.is_ready());
    assert_eq!(bench.link.status().resyncs, 2);

    let poll = *bench.sent_with(0x0910).last().unwrap();
    assert_eq!(&poll.payload()[..4], &[0x02, 0x00, 0x00, 0x00]);
}

#[test]
fn test_requests_carry_table_id() {
    let mut bench = Bench::new(Controller::new());
    bench.bring_up();

    let defaults = bench.sent_with(0x0210)[0];
    assert_eq!(defaults.payload(), &[0x12, 0x34, 0x56, 0x01, 0x00, 0x82, 0x00]);

    let poll = *bench.sent_with(0x0910).last().unwrap();
    assert_eq!(&poll.payload()[..5], &[0x02, 0x12, 0x34, 0x56, 14]);
    assert_eq!(&poll.payload()[5..8], &[0x00, 0x80, 0x00]);
}

#[test]
fn test_retry_exhaustion_resyncs_once() {
    let mut controller = Controller::new();
    // Original request plus every retry
    controller.mute = Some((0x1000, 6));
    let mut bench = Bench::new(controller);

    bench.bring_up();

    assert_eq!(bench.sent_with(0x0600).len(), 2);
    let init_1000 = bench.sent_with(0x1000);
    assert_eq!(init_1000.len(), 7);
    assert!(init_1000[..6].iter().all(|f| f.as_bytes() == init_1000[0].as_bytes()));

    // The second wake starts the counter over
    assert_eq!(bench.sent_with(0x0600)[1].counter(), 0);
    assert_eq!(init_1000[6].counter(), 2);

    let status = bench.link.status();
    assert_eq!(status.resyncs, 2);
    assert_eq!(status.tx.retransmits, 5);
    assert_eq!(status.tx.exhausted, 1);
    assert!(bench.link.is_ready());
}

#[test]
fn test_stale_response_ignored() {
    let mut controller = Controller::new();
    controller.skew = Some((0x4100, 1));
    let mut bench = Bench::new(controller);

    bench.bring_up();

    let init_4100: Vec<&Frame> = bench
        .sent_with(0x4100)
        .into_iter()
        .filter(|f| !f.is_response())
        .collect();
    assert_eq!(init_4100.len(), 2);
    assert_eq!(init_4100[0].counter(), init_4100[1].counter());
    assert_eq!(bench.link.status().tx.retransmits, 1);
    assert_eq!(bench.link.status().resyncs, 1);
}

#[test]
fn test_state_changed_notification() {
    let polls = Polls::default();
    let mut bench = Bench::new(Controller::new());
    bench.link.register_observer(&polls).unwrap();
    bench.bring_up();
    let pulls = bench.sent_with(0x0910).len();

    let notice = Frame::encode(
        0x09,
        Command::STATE_CHANGED,
        &[0x00, 0x01, 0x3A, 0x01, 0x01, 0x00, 0xF3, 0x01, 0x30],
    )
    .unwrap();
    let port = bench.link.port_mut();
    port.values.insert(0xF300, vec![0x30]);
    port.inject(&notice);

    bench.step();
    let reply = bench.link.port().sent.last().unwrap().clone();
    assert_eq!(reply.counter(), 0x09);
    assert_eq!(reply.command().raw(), 0x8A10);
    assert_eq!(reply.payload(), &[0x00, 0x01, 0x3A, 0x01]);
    assert_eq!(bench.link.get_parameter(0xF300), &[0x30]);

    // A refresh follows the notification
    bench.bring_up();
    assert_eq!(bench.sent_with(0x0910).len(), pulls + 1);
    assert_eq!(polls.count.get(), 2);
}

#[test]
fn test_push_then_pull() {
    let mut bench = Bench::new(Controller::new());
    bench.bring_up();

    bench
        .link
        .queue_parameter_updates(&[
            ParameterUpdate::byte(0xF000, 0x33),
            ParameterUpdate::byte(0x8000, 0x31),
            ParameterUpdate::byte(0xF000, 0x35),
        ])
        .unwrap();
    bench.run_until(|link| link.state() == State::PushStates);
    assert!(!bench.link.has_pending_updates());
    bench.bring_up();

    let write = bench.sent_with(0x0810)[0];
    assert_eq!(
        write.payload(),
        &[0x02, 0x12, 0x34, 0x56, 0x02, 0x00, 0x80, 0x01, 0x31, 0x00, 0xF0, 0x01, 0x35]
    );

    let requests = bench.requests();
    assert_eq!(&requests[requests.len() - 2..], &[0x0810, 0x0910]);
    assert_eq!(bench.link.port().values[&0xF000], vec![0x35]);
    assert_eq!(bench.link.get_parameter(0xF000), &[0x35]);
    assert_eq!(bench.link.get_parameter(0x8000), &[0x31]);
}

#[test]
fn test_rejected_batch_sends_nothing() {
    let mut bench = Bench::new(Controller::new());
    bench.bring_up();
    let pulls = bench.sent_with(0x0910).len();

    bench
        .link
        .queue_parameter_updates(&[
            ParameterUpdate::byte(0x8000, 0x31),
            ParameterUpdate::byte(0x1234, 0x01),
        ])
        .unwrap();
    bench.run_until(|link| link.state() == State::PullStates);
    bench.bring_up();

    assert!(bench.sent_with(0x0810).is_empty());
    assert_eq!(bench.sent_with(0x0910).len(), pulls + 1);
    assert_eq!(bench.link.get_parameter(0x8000), &[0x30]);
    assert!(!bench.link.has_pending_updates());
}

#[test]
fn test_periodic_poll() {
    let mut bench = Bench::new(Controller::new());
    bench.bring_up();
    let pulls = bench.sent_with(0x0910).len();

    let interval = bench.link.config().poll_interval_ms;
    for _ in 0..interval / TICK_MS {
        bench.step();
    }
    assert_eq!(bench.sent_with(0x0910).len(), pulls);

    bench.step();
    bench.step();
    assert_eq!(bench.sent_with(0x0910).len(), pulls + 1);
}

#[test]
fn test_status_query_during_bring_up() {
    let mut controller = Controller::new();
    controller.mute = Some((0x1200, 1));
    let mut bench = Bench::new(controller);

    bench.run_until(|link| link.state() == State::Init1200);
    let query = Frame::encode(0x40, Command::STATUS_QUERY, &[]).unwrap();
    bench.link.port_mut().inject(&query);
    bench.step();

    let reply = bench.link.port().sent.last().unwrap().clone();
    assert_eq!(reply.command().raw(), 0x8101);
    assert_eq!(reply.counter(), 0x40);
    assert_eq!(reply.payload(), &[0x00, 0x11, 0x13]);

    // The muted request is still retried and bring-up completes
    bench.bring_up();
    assert_eq!(bench.sent_with(0x1200).len(), 2);
    assert!(bench.link.device_info().last_ping_ms.is_some());
}
