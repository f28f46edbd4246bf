//! Hosted interrupt sources
//!
//! Each source is a tokio interval task holding only the clock or its own
//! signal writer, standing in for the timer and data-ready interrupts.

use crate::settings::TimingConfig;
use event_signals::{timestamp_tick, HostMicrosTimer, MicrosTimer, ScaledTimer, SignalKind, SignalSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Period of the timestamp interrupt
pub const TICK_PERIOD: Duration = Duration::from_millis(1);

type TickSource = Box<dyn Fn() -> u32 + Send + Sync>;

/// Sub-millisecond capture timer used by the simulated interrupts
pub enum CaptureTimer {
    /// Monotonic host clock, already in microseconds
    Host(Arc<HostMicrosTimer>),
    /// Host clock reported in fractional-microsecond ticks and divided down
    Scaled(ScaledTimer<TickSource>),
}

impl CaptureTimer {
    /// Timer counting `ticks_per_micro` ticks per microsecond, restarted
    /// whenever `host` is marked by the millisecond tick
    pub fn new(host: Arc<HostMicrosTimer>, ticks_per_micro: u32) -> Self {
        if ticks_per_micro <= 1 {
            return CaptureTimer::Host(host);
        }
        let ticks = u64::from(ticks_per_micro);
        let source: TickSource = Box::new(move || {
            (u64::from(host.nanos_into_tick()) * ticks / 1_000) as u32
        });
        CaptureTimer::Scaled(ScaledTimer::new(source, ticks_per_micro))
    }
}

impl MicrosTimer for CaptureTimer {
    fn micros(&self) -> u32 {
        match self {
            CaptureTimer::Host(timer) => timer.micros(),
            CaptureTimer::Scaled(timer) => timer.micros(),
        }
    }
}

/// Periods of the simulated interrupt sources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptPlan {
    pub thermocouple: Duration,
    pub data_ready: Duration,
    pub transmit: Duration,
    pub ticks_per_micro: u32,
}

impl From<&TimingConfig> for InterruptPlan {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            thermocouple: Duration::from_millis(timing.thermocouple_period_ms),
            data_ready: Duration::from_micros(timing.data_ready_period_us),
            transmit: Duration::from_millis(timing.transmit_period_ms),
            ticks_per_micro: timing.micros_per_tick,
        }
    }
}

/// Running interrupt tasks; aborted on drop
pub struct Interrupts {
    tasks: Vec<JoinHandle<()>>,
}

impl Interrupts {
    /// Spawn the timestamp tick plus one task per signal source
    pub fn spawn(signals: Arc<SignalSet>, plan: &InterruptPlan) -> Self {
        let host = Arc::new(HostMicrosTimer::new());
        let timer = Arc::new(CaptureTimer::new(Arc::clone(&host), plan.ticks_per_micro));
        let mut tasks = Vec::with_capacity(5);

        let clock = Arc::clone(&signals);
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_PERIOD);
            loop {
                ticker.tick().await;
                timestamp_tick(clock.clock());
                host.mark_tick();
            }
        }));

        let sources = [
            (SignalKind::ThermocoupleScan, plan.thermocouple),
            (SignalKind::DeviceAReady, plan.data_ready),
            (SignalKind::DeviceBReady, plan.data_ready),
            (SignalKind::TransmitDue, plan.transmit),
        ];
        for (kind, period) in sources {
            let signals = Arc::clone(&signals);
            let timer = Arc::clone(&timer);
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    signals.writer(kind).capture(timer.as_ref());
                }
            }));
        }

        info!(
            "Interrupt sources running (scan {:?}, data-ready {:?}, transmit {:?})",
            plan.thermocouple, plan.data_ready, plan.transmit
        );
        Self { tasks }
    }

    pub fn shutdown(mut self) {
        self.abort_all();
    }

    fn abort_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Interrupts {
    fn drop(&mut self) {
        self.abort_all();
    }
}
