//! Bring-up sequence and steady-state streaming

use crate::error::AdcError;
use crate::front_end::{AdcFrontEnd, DeviceId, FrontEndConfig};
use crate::regs::{self, addr, value, Command};
use crate::RECORD_BYTES;
use event_signals::EventSignal;
use spi_bus::{BusError, Delay, SharedBus};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// All-zero command payload clocked out during acquisition transfers
const ZERO_PAYLOAD: [u8; RECORD_BYTES] = [0; RECORD_BYTES];

/// Waits used during bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BringUpTiming {
    /// Settle time after changing the select line
    pub select_settle: Duration,
    /// Busy polls tolerated per transaction before giving up
    pub max_idle_polls: u32,
}

impl Default for BringUpTiming {
    fn default() -> Self {
        Self {
            select_settle: Duration::from_micros(100),
            max_idle_polls: 100_000,
        }
    }
}

/// Outcome of servicing one data-ready signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOutcome {
    /// Signal not set
    Idle,
    /// Bus occupied; signal left set for a later iteration
    Deferred,
    /// One full record transferred and the signal cleared
    Transferred,
    /// Bus rejected the transfer; signal left set
    Failed(BusError),
}

/// Controller for both analog front ends on the shared bus
#[derive(Debug)]
pub struct AcquisitionController {
    devices: [AdcFrontEnd; 2],
    timing: BringUpTiming,
}

impl AcquisitionController {
    /// Create a controller for devices A and B
    pub fn new(a: FrontEndConfig, b: FrontEndConfig, timing: BringUpTiming) -> Self {
        Self {
            devices: [
                AdcFrontEnd::new(DeviceId::A, a),
                AdcFrontEnd::new(DeviceId::B, b),
            ],
            timing,
        }
    }

    /// Run the one-time bring-up of both devices.
    ///
    /// Blocks on the bus between transactions; call before interrupts are
    /// enabled. Order: configure A, configure B, enable A, enable B, then
    /// leave device A selected.
    pub fn bring_up<B, D>(&mut self, bus: &mut B, delay: &mut D) -> Result<(), AdcError>
    where
        B: SharedBus + ?Sized,
        D: Delay + ?Sized,
    {
        info!("Bringing up analog front ends");

        for device in DeviceId::ALL {
            self.select(bus, delay, device)?;
            self.configure(bus, device)?;
        }

        for device in DeviceId::ALL {
            self.select(bus, delay, device)?;
            self.enable(bus, device)?;
        }

        self.select(bus, delay, DeviceId::A)?;

        for fe in &self.devices {
            info!(
                "Front end {} streaming at {} Hz on {} ({} bring-up transactions)",
                fe.device(),
                fe.config().sample_rate.hz(),
                fe.config().line,
                fe.report().entries().len()
            );
        }
        Ok(())
    }

    /// Service one device's data-ready signal.
    ///
    /// With the bus idle, issues exactly one full-width transfer into the
    /// device buffer and clears the signal. A busy bus leaves the signal set.
    pub fn service<B>(&mut self, device: DeviceId, bus: &mut B, signal: &EventSignal) -> ServiceOutcome
    where
        B: SharedBus + ?Sized,
    {
        if !signal.is_set() {
            return ServiceOutcome::Idle;
        }
        if bus.is_busy() {
            trace!("Device {} transfer deferred: bus busy", device);
            return ServiceOutcome::Deferred;
        }

        let fe = &mut self.devices[device.index()];
        let line = fe.config().line;
        let result = bus
            .select(line)
            .and_then(|_| bus.transfer(&ZERO_PAYLOAD, fe.buffer_mut()));

        match result {
            Ok(()) => {
                fe.count_transfer();
                signal.clear();
                ServiceOutcome::Transferred
            }
            Err(e) => {
                warn!("Device {} transfer failed: {}", device, e);
                ServiceOutcome::Failed(e)
            }
        }
    }

    /// State of one front end
    pub fn front_end(&self, device: DeviceId) -> &AdcFrontEnd {
        &self.devices[device.index()]
    }

    /// Latest raw record of one front end
    pub fn buffer(&self, device: DeviceId) -> &[u8; RECORD_BYTES] {
        self.devices[device.index()].buffer()
    }

    fn select<B, D>(&mut self, bus: &mut B, delay: &mut D, device: DeviceId) -> Result<(), AdcError>
    where
        B: SharedBus + ?Sized,
        D: Delay + ?Sized,
    {
        self.wait_idle(bus, device)?;
        let line = self.devices[device.index()].config().line;
        bus.select(line)
            .map_err(|source| AdcError::Bus { device, source })?;
        delay.wait(self.timing.select_settle);
        Ok(())
    }

    /// Unlock and write the analog, digital and clock configuration
    fn configure<B>(&mut self, bus: &mut B, device: DeviceId) -> Result<(), AdcError>
    where
        B: SharedBus + ?Sized,
    {
        let rate = self.devices[device.index()].config().sample_rate;
        debug!("Configuring device {} for {:?}", device, rate);

        self.exchange(bus, device, regs::NULL)?;
        self.exchange(bus, device, regs::UNLOCK)?;
        self.exchange(bus, device, regs::NULL)?;

        let writes = [
            regs::write_register(addr::A_SYS_CFG, value::A_SYS_CFG),
            regs::write_register(addr::D_SYS_CFG, value::D_SYS_CFG),
            regs::write_register(addr::CLK1, value::CLK1),
            regs::write_register(addr::CLK2, rate.clk2_value()),
        ];
        for command in writes {
            self.exchange(bus, device, command)?;
            self.exchange(bus, device, regs::NULL)?;
        }
        Ok(())
    }

    /// Enable all channels, wake the device and switch to full-width frames
    fn enable<B>(&mut self, bus: &mut B, device: DeviceId) -> Result<(), AdcError>
    where
        B: SharedBus + ?Sized,
    {
        debug!("Enabling device {}", device);

        self.exchange(bus, device, regs::write_register(addr::ADC_ENA, value::ADC_ENA_ALL))?;
        self.exchange(bus, device, regs::NULL)?;
        self.exchange(bus, device, regs::WAKEUP)?;
        self.exchange(bus, device, regs::NULL)?;

        let fe = &mut self.devices[device.index()];
        bus.set_frame_width(fe.config().line, RECORD_BYTES)
            .map_err(|source| AdcError::Bus { device, source })?;
        fe.set_streaming();
        Ok(())
    }

    /// One blocking 3-byte transaction, recorded in the bring-up report
    fn exchange<B>(&mut self, bus: &mut B, device: DeviceId, command: Command) -> Result<Command, AdcError>
    where
        B: SharedBus + ?Sized,
    {
        let mut response = [0u8; 3];
        bus.transfer(&command, &mut response)
            .map_err(|source| AdcError::Bus { device, source })?;
        self.wait_idle(bus, device)?;

        trace!("Device {} sent {:02X?} got {:02X?}", device, command, response);
        self.devices[device.index()]
            .report_mut()
            .record(command, response);
        Ok(response)
    }

    fn wait_idle<B>(&self, bus: &mut B, device: DeviceId) -> Result<(), AdcError>
    where
        B: SharedBus + ?Sized,
    {
        let mut polls = 0;
        while bus.is_busy() {
            polls += 1;
            if polls >= self.timing.max_idle_polls {
                return Err(AdcError::BusStuck { device, polls });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::SampleRatePreset;
    use event_signals::{SignalKind, SignalSet, TimestampPair};
    use spi_bus::{SelectLine, SimulatedBus, TransactionKind};

    #[derive(Default)]
    struct RecordingDelay {
        waits: Vec<Duration>,
    }

    impl Delay for RecordingDelay {
        fn wait(&mut self, period: Duration) {
            self.waits.push(period);
        }
    }

    fn line(n: u8) -> SelectLine {
        SelectLine::new(n).unwrap()
    }

    fn controller(rate_b: SampleRatePreset) -> AcquisitionController {
        AcquisitionController::new(
            FrontEndConfig {
                line: line(4),
                sample_rate: SampleRatePreset::Khz42_667,
            },
            FrontEndConfig {
                line: line(5),
                sample_rate: rate_b,
            },
            BringUpTiming {
                select_settle: Duration::from_micros(90),
                max_idle_polls: 10,
            },
        )
    }

    fn configure_sequence(clk2: u8) -> Vec<Command> {
        vec![
            regs::NULL,
            regs::UNLOCK,
            regs::NULL,
            [0x4B, 0x68, 0x00],
            regs::NULL,
            [0x4C, 0x3C, 0x00],
            regs::NULL,
            [0x4D, 0x02, 0x00],
            regs::NULL,
            [0x4E, clk2, 0x00],
            regs::NULL,
        ]
    }

    fn enable_sequence() -> Vec<Command> {
        vec![[0x4F, 0x0F, 0x00], regs::NULL, regs::WAKEUP, regs::NULL]
    }

    #[test]
    fn test_bring_up_transaction_order() {
        let mut bus = SimulatedBus::new(1).with_recording();
        let mut delay = RecordingDelay::default();
        let mut ctrl = controller(SampleRatePreset::Khz8);

        ctrl.bring_up(&mut bus, &mut delay).unwrap();

        let log = bus.transactions();
        let mut expected: Vec<(u8, Command)> = Vec::new();
        expected.extend(configure_sequence(0x4E).into_iter().map(|c| (4, c)));
        expected.extend(configure_sequence(0x48).into_iter().map(|c| (5, c)));
        expected.extend(enable_sequence().into_iter().map(|c| (4, c)));
        expected.extend(enable_sequence().into_iter().map(|c| (5, c)));

        assert_eq!(log.len(), expected.len());
        for (t, (ln, cmd)) in log.iter().zip(expected.iter()) {
            assert_eq!(t.kind, TransactionKind::Transfer);
            assert_eq!(t.line.number(), *ln);
            assert_eq!(t.tx, cmd.to_vec());
            assert_eq!(t.len, 3);
        }

        // Four device selects plus the final reselect of A
        assert_eq!(delay.waits.len(), 5);
        assert!(delay.waits.iter().all(|d| *d == Duration::from_micros(90)));
        assert_eq!(bus.selected(), Some(line(4)));
    }

    #[test]
    fn test_bring_up_sets_full_width_frames() {
        let mut bus = SimulatedBus::new(0);
        let mut delay = RecordingDelay::default();
        let mut ctrl = controller(SampleRatePreset::Khz42_667);

        assert!(!ctrl.front_end(DeviceId::A).is_streaming());
        ctrl.bring_up(&mut bus, &mut delay).unwrap();

        for device in DeviceId::ALL {
            let fe = ctrl.front_end(device);
            assert!(fe.is_streaming());
            assert_eq!(bus.frame_width(fe.config().line), RECORD_BYTES);
            assert_eq!(fe.report().entries().len(), 15);
        }
    }

    #[test]
    fn test_bring_up_records_readback() {
        let mut bus = SimulatedBus::new(0);
        bus.respond_with(line(4), vec![0xFF, 0x04, 0x00]);
        let mut delay = RecordingDelay::default();
        let mut ctrl = controller(SampleRatePreset::Khz42_667);

        ctrl.bring_up(&mut bus, &mut delay).unwrap();

        let report = ctrl.front_end(DeviceId::A).report();
        assert!(report.entries().iter().all(|e| e.response == [0xFF, 0x04, 0x00]));
        assert_eq!(report.commands().nth(1), Some(regs::UNLOCK));
    }

    #[test]
    fn test_bring_up_fails_when_bus_stuck() {
        let mut bus = SimulatedBus::new(50);
        let mut delay = RecordingDelay::default();
        let mut ctrl = controller(SampleRatePreset::Khz42_667);

        let err = ctrl.bring_up(&mut bus, &mut delay).unwrap_err();
        assert_eq!(err, AdcError::BusStuck { device: DeviceId::A, polls: 10 });
        assert_eq!(err.device(), DeviceId::A);
    }

    #[test]
    fn test_service_transfers_full_record() {
        let signals = SignalSet::new();
        let mut bus = SimulatedBus::new(0).with_recording();
        let mut ctrl = controller(SampleRatePreset::Khz42_667);
        ctrl.bring_up(&mut bus, &mut RecordingDelay::default()).unwrap();
        bus.clear_transactions();
        bus.respond_with(line(5), (0..18).collect::<Vec<u8>>());

        let signal = signals.get(SignalKind::DeviceBReady);
        signals
            .writer(SignalKind::DeviceBReady)
            .raise_at(TimestampPair::new(3, 4));

        assert_eq!(ctrl.service(DeviceId::B, &mut bus, signal), ServiceOutcome::Transferred);
        assert!(!signal.is_set());

        let log = bus.transactions();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].line, line(5));
        assert_eq!(log[0].len, RECORD_BYTES);
        assert!(log[0].tx.iter().all(|b| *b == 0));
        assert_eq!(ctrl.buffer(DeviceId::B)[17], 17);
        assert_eq!(ctrl.front_end(DeviceId::B).transfers(), 1);
    }

    #[test]
    fn test_service_defers_on_busy_bus() {
        let signals = SignalSet::new();
        let mut bus = SimulatedBus::new(0);
        let mut ctrl = controller(SampleRatePreset::Khz42_667);
        ctrl.bring_up(&mut bus, &mut RecordingDelay::default()).unwrap();

        let signal = signals.get(SignalKind::DeviceAReady);
        signals
            .writer(SignalKind::DeviceAReady)
            .raise_at(TimestampPair::new(0, 0));

        bus.hold_busy(1);
        assert_eq!(ctrl.service(DeviceId::A, &mut bus, signal), ServiceOutcome::Deferred);
        assert!(signal.is_set());
        assert_eq!(ctrl.service(DeviceId::A, &mut bus, signal), ServiceOutcome::Transferred);
        assert_eq!(ctrl.service(DeviceId::A, &mut bus, signal), ServiceOutcome::Idle);
    }

    #[test]
    fn test_service_without_bring_up_splits_frame() {
        let signals = SignalSet::new();
        let mut bus = SimulatedBus::new(0);
        let mut ctrl = controller(SampleRatePreset::Khz42_667);

        let signal = signals.get(SignalKind::DeviceAReady);
        signals
            .writer(SignalKind::DeviceAReady)
            .raise_at(TimestampPair::new(0, 0));

        assert_eq!(
            ctrl.service(DeviceId::A, &mut bus, signal),
            ServiceOutcome::Failed(BusError::FrameSplit { len: 18, width: 4 })
        );
        assert!(signal.is_set());
    }
}
