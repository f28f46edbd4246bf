//! Main-loop context and fixed-priority dispatch

use adc_controller::{AcquisitionController, AdcError, DeviceId, ServiceOutcome};
use event_signals::{SignalKind, SignalSet};
use frame_assembler::{Frame, FrameBytes, FRAME_LEN};
use metrics::counter;
use spi_bus::{Delay, SharedBus};
use stream_client::{ConnectionState, StreamingClient, TransmitOutcome, Transport};
use thermocouple_scanner::{ScanStep, ThermocoupleScanner};
use tracing::{debug, trace, warn};

/// What one handler did during an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Signal not pending
    Idle,
    /// Signal pending but the bus was occupied
    Deferred,
    /// Signal serviced (possibly partially, for a scan in progress)
    Serviced,
    /// Bus or transport rejected the operation; signal left for retry
    Failed,
}

/// Signal handler run from the priority table
pub type Handler = fn(&mut Node, &SignalSet, &mut dyn SharedBus, &mut dyn Transport) -> Handled;

/// Handlers in the order the main loop evaluates them every iteration.
///
/// Every entry runs each iteration; a transaction started by an earlier
/// entry keeps the bus busy for later ones, so device B can be starved
/// while thermocouple or device A traffic saturates the bus.
pub const PRIORITY: [(SignalKind, Handler); 4] = [
    (SignalKind::ThermocoupleScan, Node::scan_thermocouples),
    (SignalKind::DeviceAReady, Node::service_device_a),
    (SignalKind::DeviceBReady, Node::service_device_b),
    (SignalKind::TransmitDue, Node::transmit),
];

/// Outcome of one `poll_once`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iteration {
    /// Transport events handled before dispatch
    pub transport_events: usize,
    /// Per-signal result, in priority order
    pub handled: [(SignalKind, Handled); 4],
}

impl Iteration {
    pub fn outcome(&self, kind: SignalKind) -> Handled {
        self.handled
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, h)| *h)
            .unwrap_or(Handled::Idle)
    }
}

/// Running totals kept alongside the exported counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    pub iterations: u64,
    pub deferred: u64,
    pub bus_errors: u64,
    pub cursor_resets: u64,
    pub timestamp_overflows: u64,
    pub frames_sent: u64,
}

/// Everything the main loop owns
pub struct Node {
    scanner: ThermocoupleScanner,
    controller: AcquisitionController,
    client: StreamingClient,
    frame: Frame,
    frame_bytes: FrameBytes,
    last_transmit: Option<TransmitOutcome>,
    stats: NodeStats,
}

impl Node {
    pub fn new(
        scanner: ThermocoupleScanner,
        controller: AcquisitionController,
        client: StreamingClient,
    ) -> Self {
        Self {
            scanner,
            controller,
            client,
            frame: Frame::default(),
            frame_bytes: [0; FRAME_LEN],
            last_transmit: None,
            stats: NodeStats::default(),
        }
    }

    /// Bring both front ends up; fatal on failure
    pub fn bring_up<B, D>(&mut self, bus: &mut B, delay: &mut D) -> Result<(), AdcError>
    where
        B: SharedBus + ?Sized,
        D: Delay + ?Sized,
    {
        self.controller.bring_up(bus, delay)
    }

    /// One main-loop iteration: drain transport events, then run every
    /// handler in priority order
    pub fn poll_once<B, T>(&mut self, signals: &SignalSet, bus: &mut B, transport: &mut T) -> Iteration
    where
        B: SharedBus,
        T: Transport,
    {
        let bus: &mut dyn SharedBus = bus;
        let transport: &mut dyn Transport = transport;

        let transport_events = self.client.poll_transport(transport);

        let mut handled = [(SignalKind::ThermocoupleScan, Handled::Idle); 4];
        for (slot, (kind, handler)) in handled.iter_mut().zip(PRIORITY) {
            let outcome = handler(self, signals, bus, transport);
            if outcome == Handled::Deferred {
                self.stats.deferred += 1;
                counter!("daq_bus_deferred_total", "signal" => kind.as_str()).increment(1);
            }
            *slot = (kind, outcome);
        }

        self.stats.iterations += 1;
        Iteration {
            transport_events,
            handled,
        }
    }

    fn scan_thermocouples(
        &mut self,
        signals: &SignalSet,
        bus: &mut dyn SharedBus,
        _transport: &mut dyn Transport,
    ) -> Handled {
        let signal = signals.get(SignalKind::ThermocoupleScan);
        match self.scanner.poll(bus, signal) {
            ScanStep::Idle => Handled::Idle,
            ScanStep::Deferred => Handled::Deferred,
            ScanStep::Read { cursor_reset, .. } => {
                if cursor_reset {
                    self.stats.cursor_resets += 1;
                    counter!("daq_scan_cursor_resets_total").increment(1);
                }
                Handled::Serviced
            }
            ScanStep::Failed { .. } => {
                self.count_bus_error(SignalKind::ThermocoupleScan);
                Handled::Failed
            }
        }
    }

    fn service_device_a(
        &mut self,
        signals: &SignalSet,
        bus: &mut dyn SharedBus,
        _transport: &mut dyn Transport,
    ) -> Handled {
        self.service_device(DeviceId::A, SignalKind::DeviceAReady, signals, bus)
    }

    fn service_device_b(
        &mut self,
        signals: &SignalSet,
        bus: &mut dyn SharedBus,
        _transport: &mut dyn Transport,
    ) -> Handled {
        self.service_device(DeviceId::B, SignalKind::DeviceBReady, signals, bus)
    }

    fn service_device(
        &mut self,
        device: DeviceId,
        kind: SignalKind,
        signals: &SignalSet,
        bus: &mut dyn SharedBus,
    ) -> Handled {
        match self.controller.service(device, bus, signals.get(kind)) {
            ServiceOutcome::Idle => Handled::Idle,
            ServiceOutcome::Deferred => Handled::Deferred,
            ServiceOutcome::Transferred => Handled::Serviced,
            ServiceOutcome::Failed(_) => {
                self.count_bus_error(kind);
                Handled::Failed
            }
        }
    }

    fn transmit(
        &mut self,
        signals: &SignalSet,
        _bus: &mut dyn SharedBus,
        transport: &mut dyn Transport,
    ) -> Handled {
        let signal = signals.get(SignalKind::TransmitDue);
        if !signal.is_set() {
            return Handled::Idle;
        }

        self.assemble(signals);
        let outcome = self.client.on_transmit_due(transport, &self.frame_bytes);
        signal.clear();

        let handled = match &outcome {
            TransmitOutcome::Sent { packet } => {
                self.stats.frames_sent += 1;
                trace!("Frame {} sent", packet);
                Handled::Serviced
            }
            TransmitOutcome::Rejected(_) => Handled::Failed,
            TransmitOutcome::Connecting { watchdog } | TransmitOutcome::Waiting { watchdog } => {
                debug!("Frame dropped, no connection (watchdog {})", watchdog);
                Handled::Serviced
            }
            TransmitOutcome::WatchdogReset => Handled::Serviced,
        };
        self.last_transmit = Some(outcome);
        handled
    }

    /// Rebuild the frame from the current buffers and timestamps
    fn assemble(&mut self, signals: &SignalSet) {
        // Freshness is not carried in the frame; consume it so it tracks
        // scans completed since the previous frame.
        let fresh = self.scanner.take_fresh();
        trace!("Assembling frame (thermocouples fresh: {})", fresh);

        let stamp = |kind: SignalKind| signals.get(kind).timestamp();
        let stamps = [
            (SignalKind::ThermocoupleScan, stamp(SignalKind::ThermocoupleScan)),
            (SignalKind::DeviceAReady, stamp(SignalKind::DeviceAReady)),
            (SignalKind::DeviceBReady, stamp(SignalKind::DeviceBReady)),
        ];
        for (kind, pair) in &stamps {
            if !pair.is_well_formed() {
                warn!("{} timestamp {} has microseconds out of range", kind.as_str(), pair);
                self.stats.timestamp_overflows += 1;
                counter!("daq_timestamp_overflow_total", "signal" => kind.as_str()).increment(1);
            }
        }

        self.frame = Frame {
            thermocouples: *self.scanner.buffers(),
            device_a: *self.controller.buffer(DeviceId::A),
            device_b: *self.controller.buffer(DeviceId::B),
            thermocouple_time: stamps[0].1,
            device_a_time: stamps[1].1,
            device_b_time: stamps[2].1,
            packet_counter: self.client.packet_counter(),
            flags: 0,
        };
        self.frame.encode_into(&mut self.frame_bytes);
    }

    fn count_bus_error(&mut self, kind: SignalKind) {
        self.stats.bus_errors += 1;
        counter!("daq_bus_errors_total", "signal" => kind.as_str()).increment(1);
    }

    pub fn scanner(&self) -> &ThermocoupleScanner {
        &self.scanner
    }

    pub fn controller(&self) -> &AcquisitionController {
        &self.controller
    }

    pub fn client(&self) -> &StreamingClient {
        &self.client
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.state()
    }

    /// Most recently assembled frame
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Encoded bytes of the most recently assembled frame
    pub fn frame_bytes(&self) -> &FrameBytes {
        &self.frame_bytes
    }

    pub fn last_transmit(&self) -> Option<&TransmitOutcome> {
        self.last_transmit.as_ref()
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    /// Issue the initial connect
    pub fn start<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        if let Err(e) = self.client.start(transport) {
            warn!("Initial connect failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adc_controller::{BringUpTiming, FrontEndConfig, SampleRatePreset};
    use event_signals::TimestampPair;
    use spi_bus::{SelectLine, SimulatedBus, TransactionKind};
    use std::time::Duration;
    use stream_client::{MockTransport, TransportEvent};

    struct NoDelay;

    impl Delay for NoDelay {
        fn wait(&mut self, _period: Duration) {}
    }

    fn line(n: u8) -> SelectLine {
        SelectLine::new(n).unwrap()
    }

    fn node() -> Node {
        let scanner = ThermocoupleScanner::new([line(0), line(1), line(2), line(3)]);
        let controller = AcquisitionController::new(
            FrontEndConfig {
                line: line(4),
                sample_rate: SampleRatePreset::Khz42_667,
            },
            FrontEndConfig {
                line: line(5),
                sample_rate: SampleRatePreset::Khz42_667,
            },
            BringUpTiming::default(),
        );
        Node::new(scanner, controller, StreamingClient::new())
    }

    fn ready_node(bus: &mut SimulatedBus) -> Node {
        let mut node = node();
        node.bring_up(bus, &mut NoDelay).unwrap();
        while bus.is_busy() {}
        bus.clear_transactions();
        node
    }

    /// Poll until the bus is idle again, without dispatching
    fn drain(bus: &mut SimulatedBus) {
        while bus.is_busy() {}
    }

    #[test]
    fn test_priority_table_order() {
        let kinds: Vec<_> = PRIORITY.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![
                SignalKind::ThermocoupleScan,
                SignalKind::DeviceAReady,
                SignalKind::DeviceBReady,
                SignalKind::TransmitDue,
            ]
        );
    }

    #[test]
    fn test_device_a_waits_for_pending_thermocouple() {
        let mut bus = SimulatedBus::new(1).with_recording();
        let mut transport = MockTransport::new();
        let mut node = ready_node(&mut bus);
        let signals = SignalSet::new();

        signals.writer(SignalKind::ThermocoupleScan).raise_at(TimestampPair::new(5, 1));
        signals.writer(SignalKind::DeviceAReady).raise_at(TimestampPair::new(5, 2));

        let first = node.poll_once(&signals, &mut bus, &mut transport);
        assert_eq!(first.outcome(SignalKind::ThermocoupleScan), Handled::Serviced);
        assert_eq!(first.outcome(SignalKind::DeviceAReady), Handled::Deferred);
        assert!(signals.get(SignalKind::DeviceAReady).is_set());

        drain(&mut bus);
        // next idle iteration: the scan still has precedence
        let second = node.poll_once(&signals, &mut bus, &mut transport);
        assert_eq!(second.outcome(SignalKind::ThermocoupleScan), Handled::Serviced);
        assert_eq!(second.outcome(SignalKind::DeviceAReady), Handled::Deferred);

        let mut serviced_at = None;
        for i in 0..8 {
            drain(&mut bus);
            let it = node.poll_once(&signals, &mut bus, &mut transport);
            if it.outcome(SignalKind::DeviceAReady) == Handled::Serviced {
                serviced_at = Some(i);
                break;
            }
        }
        assert!(serviced_at.is_some());
        assert!(!signals.get(SignalKind::DeviceAReady).is_set());

        let transfers: Vec<_> = bus
            .transactions()
            .iter()
            .filter(|t| t.kind == TransactionKind::Transfer)
            .collect();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].line, line(4));
        assert_eq!(transfers[0].len, 18);
        assert!(transfers[0].tx.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_device_a_alone_transfers_immediately() {
        let mut bus = SimulatedBus::new(1).with_recording();
        let mut transport = MockTransport::new();
        let mut node = ready_node(&mut bus);
        let signals = SignalSet::new();

        signals.writer(SignalKind::DeviceAReady).raise_at(TimestampPair::new(9, 9));
        let it = node.poll_once(&signals, &mut bus, &mut transport);

        assert_eq!(it.outcome(SignalKind::DeviceAReady), Handled::Serviced);
        assert_eq!(bus.transactions().len(), 1);
        assert!(!signals.get(SignalKind::DeviceAReady).is_set());
    }

    #[test]
    fn test_device_b_starved_while_a_saturates_bus() {
        let mut bus = SimulatedBus::new(1);
        let mut transport = MockTransport::new();
        let mut node = ready_node(&mut bus);
        let signals = SignalSet::new();

        signals.writer(SignalKind::DeviceBReady).raise_at(TimestampPair::new(1, 0));
        for _ in 0..50 {
            // device A re-asserts data-ready faster than the bus drains
            signals.writer(SignalKind::DeviceAReady).raise_at(TimestampPair::new(1, 0));
            let it = node.poll_once(&signals, &mut bus, &mut transport);
            assert_eq!(it.outcome(SignalKind::DeviceAReady), Handled::Serviced);
            assert_eq!(it.outcome(SignalKind::DeviceBReady), Handled::Deferred);
            drain(&mut bus);
        }
        assert!(signals.get(SignalKind::DeviceBReady).is_set());
        assert_eq!(node.controller().front_end(DeviceId::B).transfers(), 0);

        // once A goes quiet, B is serviced on the next idle iteration
        let it = node.poll_once(&signals, &mut bus, &mut transport);
        assert_eq!(it.outcome(SignalKind::DeviceBReady), Handled::Serviced);
    }

    #[test]
    fn test_transmit_streams_frames_end_to_end() {
        let mut bus = SimulatedBus::new(1);
        let mut transport = MockTransport::cooperative();
        let mut node = ready_node(&mut bus);
        let signals = SignalSet::new();
        node.start(&mut transport);

        let mut expected = 0u32;
        for round in 0..5u32 {
            signals.writer(SignalKind::DeviceAReady).raise_at(TimestampPair::new(100 + round, 10));
            node.poll_once(&signals, &mut bus, &mut transport);
            drain(&mut bus);

            signals.writer(SignalKind::TransmitDue).raise_at(TimestampPair::new(101 + round, 0));
            let it = node.poll_once(&signals, &mut bus, &mut transport);
            assert_eq!(it.outcome(SignalKind::TransmitDue), Handled::Serviced);
            assert!(!signals.get(SignalKind::TransmitDue).is_set());
            assert_eq!(
                node.last_transmit(),
                Some(&TransmitOutcome::Sent { packet: expected })
            );

            let frame = Frame::decode(node.frame_bytes());
            assert_eq!(frame.packet_counter, expected);
            assert_eq!(frame.device_a_time, TimestampPair::new(100 + round, 10));
            assert_eq!(&frame.device_a, node.controller().buffer(DeviceId::A));
            assert_eq!(frame.flags, 0);
            expected += 1;
        }

        assert_eq!(transport.sent().len(), 5);
        for (i, sent) in transport.sent().iter().enumerate() {
            assert_eq!(sent.len(), FRAME_LEN);
            assert_eq!(&sent[67..71], &(i as u32).to_be_bytes());
        }
        assert_eq!(node.stats().frames_sent, 5);
    }

    #[test]
    fn test_transmit_without_connection_trips_watchdog() {
        let mut bus = SimulatedBus::new(0);
        let mut transport = MockTransport::new();
        let mut node = ready_node(&mut bus);
        let signals = SignalSet::new();

        for _ in 0..9 {
            signals.writer(SignalKind::TransmitDue).raise_at(TimestampPair::new(0, 0));
            node.poll_once(&signals, &mut bus, &mut transport);
        }
        assert_eq!(node.client().watchdog(), 9);
        assert_eq!(node.connection_state(), ConnectionState::Connecting);

        signals.writer(SignalKind::TransmitDue).raise_at(TimestampPair::new(0, 0));
        node.poll_once(&signals, &mut bus, &mut transport);
        assert_eq!(node.last_transmit(), Some(&TransmitOutcome::WatchdogReset));
        assert_eq!(node.connection_state(), ConnectionState::Idle);
        assert_eq!(node.client().watchdog(), 0);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_reset_event_handled_before_dispatch() {
        let mut bus = SimulatedBus::new(0);
        let mut transport = MockTransport::new();
        let mut node = ready_node(&mut bus);
        let signals = SignalSet::new();
        node.start(&mut transport);

        transport.push_event(TransportEvent::Connected);
        let it = node.poll_once(&signals, &mut bus, &mut transport);
        assert_eq!(it.transport_events, 1);
        assert_eq!(node.connection_state(), ConnectionState::ConnectedIdle);

        transport.push_event(TransportEvent::Reset);
        node.poll_once(&signals, &mut bus, &mut transport);
        assert_eq!(node.connection_state(), ConnectionState::Idle);

        // next iteration reconnects without waiting for a transmit trigger
        node.poll_once(&signals, &mut bus, &mut transport);
        assert_eq!(node.connection_state(), ConnectionState::Connecting);
        assert_eq!(transport.connect_calls(), 2);
    }

    #[test]
    fn test_out_of_range_microseconds_flagged_but_encoded() {
        let mut bus = SimulatedBus::new(0);
        let mut transport = MockTransport::new();
        let mut node = ready_node(&mut bus);
        let signals = SignalSet::new();

        signals.writer(SignalKind::DeviceBReady).raise_at(TimestampPair::new(7, 1234));
        bus.hold_busy(u32::MAX);
        signals.writer(SignalKind::TransmitDue).raise_at(TimestampPair::new(8, 0));
        node.poll_once(&signals, &mut bus, &mut transport);

        assert_eq!(node.stats().timestamp_overflows, 1);
        assert_eq!(node.frame().device_b_time, TimestampPair::new(7, 1234));
        assert_eq!(&node.frame_bytes()[65..67], &1234u16.to_be_bytes());
    }

    #[test]
    fn test_full_scan_fills_thermocouple_slots() {
        let mut bus = SimulatedBus::new(0);
        for ch in 0..4u8 {
            bus.respond_with(line(ch), vec![0xC0 | ch; 4]);
        }
        let mut transport = MockTransport::new();
        let mut node = ready_node(&mut bus);
        let signals = SignalSet::new();

        signals.writer(SignalKind::ThermocoupleScan).raise_at(TimestampPair::new(3, 4));
        for _ in 0..4 {
            node.poll_once(&signals, &mut bus, &mut transport);
        }
        assert!(!signals.get(SignalKind::ThermocoupleScan).is_set());

        signals.writer(SignalKind::TransmitDue).raise_at(TimestampPair::new(4, 0));
        node.poll_once(&signals, &mut bus, &mut transport);
        let bytes = node.frame_bytes();
        for ch in 0..4usize {
            assert_eq!(&bytes[ch * 4..ch * 4 + 4], &[0xC0 | ch as u8; 4]);
        }
        assert_eq!(&bytes[52..55], &[0, 0, 3]);
        assert_eq!(&bytes[55..57], &[0, 4]);
        assert_eq!(bytes[71], 0);
    }
}
