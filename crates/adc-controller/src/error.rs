//! Acquisition Error Types

use crate::front_end::DeviceId;
use spi_bus::BusError;
use thiserror::Error;

/// Errors raised while bringing up or streaming a front end
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdcError {
    /// The bus rejected a transaction for this device
    #[error("Bus error on device {device}: {source}")]
    Bus {
        device: DeviceId,
        #[source]
        source: BusError,
    },

    /// The bus never went idle during bring-up
    #[error("Bus stuck busy for {polls} polls while configuring device {device}")]
    BusStuck { device: DeviceId, polls: u32 },
}

impl AdcError {
    /// Device the error relates to
    pub fn device(&self) -> DeviceId {
        match self {
            AdcError::Bus { device, .. } | AdcError::BusStuck { device, .. } => *device,
        }
    }
}
