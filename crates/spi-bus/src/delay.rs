//! Bring-up wait abstraction

use std::time::Duration;

/// "Wait until `period` has elapsed".
///
/// Only used before interrupts are enabled; the steady-state loop never waits.
pub trait Delay {
    /// Block for at least `period`
    fn wait(&mut self, period: Duration);
}

/// Thread sleep on the host
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn wait(&mut self, period: Duration) {
        std::thread::sleep(period);
    }
}

impl<D: Delay + ?Sized> Delay for &mut D {
    fn wait(&mut self, period: Duration) {
        (**self).wait(period)
    }
}
