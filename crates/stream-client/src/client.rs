//! Connection lifecycle, watchdog and packet counter

use crate::error::TransportError;
use crate::state::ConnectionState;
use crate::transport::{Transport, TransportEvent};
use metrics::counter;
use tracing::{debug, info, warn};

/// Transmit triggers without a completed send before the attempt is abandoned
pub const WATCHDOG_LIMIT: u32 = 10;

/// Result of one transmit trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmitOutcome {
    /// Frame handed to the transport, carrying this packet counter
    Sent { packet: u32 },
    /// No connection was outstanding; a connect was issued
    Connecting { watchdog: u32 },
    /// An attempt is still outstanding
    Waiting { watchdog: u32 },
    /// Watchdog expired; the attempt was aborted
    WatchdogReset,
    /// The transport rejected the request
    Rejected(TransportError),
}

/// Streaming client.
///
/// Drives a [`Transport`] through the connect/send/close cycle, one frame
/// per connection. All methods run on the main loop.
#[derive(Debug, Default)]
pub struct StreamingClient {
    state: ConnectionState,
    watchdog: u32,
    packet_counter: u32,
    watchdog_resets: u64,
    connection_resets: u64,
    /// Reconnect on the next poll after a reset
    reconnect_pending: bool,
    #[cfg(test)]
    trace: Vec<(ConnectionState, ConnectionState)>,
}

impl StreamingClient {
    /// Create a client in `Idle` with a zero packet counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a given packet counter
    pub fn with_packet_counter(packet_counter: u32) -> Self {
        Self {
            packet_counter,
            ..Self::default()
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn watchdog(&self) -> u32 {
        self.watchdog
    }

    /// Counter value the next sent frame will carry
    pub fn packet_counter(&self) -> u32 {
        self.packet_counter
    }

    pub fn watchdog_resets(&self) -> u64 {
        self.watchdog_resets
    }

    pub fn connection_resets(&self) -> u64 {
        self.connection_resets
    }

    /// Issue the first connect. A no-op unless `Idle`.
    pub fn start<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), TransportError> {
        if self.state != ConnectionState::Idle {
            return Ok(());
        }
        self.open(transport)
    }

    /// Handle one transmit trigger.
    ///
    /// `frame` is sent only when a connection is ready; otherwise it is
    /// dropped and the trigger counts toward the watchdog.
    pub fn on_transmit_due<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        frame: &[u8],
    ) -> TransmitOutcome {
        if self.state == ConnectionState::ConnectedIdle {
            // A ready connection ends the run of stalled triggers, whether
            // or not the transport then accepts the frame.
            self.watchdog = 0;
            return match transport.send(frame) {
                Ok(()) => {
                    self.transition(ConnectionState::Sending, false);
                    let packet = self.packet_counter;
                    self.packet_counter = self.packet_counter.wrapping_add(1);
                    counter!("daq_frames_sent_total").increment(1);
                    debug!("Frame {} handed to transport", packet);
                    TransmitOutcome::Sent { packet }
                }
                Err(e) => {
                    warn!("Send rejected: {}", e);
                    self.reset(transport);
                    TransmitOutcome::Rejected(e)
                }
            };
        }

        self.watchdog += 1;
        if self.watchdog >= WATCHDOG_LIMIT {
            warn!(
                "Watchdog expired after {} triggers in {}, aborting attempt",
                self.watchdog, self.state
            );
            transport.abort();
            if self.state != ConnectionState::Idle {
                self.transition(ConnectionState::Idle, false);
            }
            self.watchdog = 0;
            self.reconnect_pending = false;
            self.watchdog_resets += 1;
            counter!("daq_watchdog_resets_total").increment(1);
            return TransmitOutcome::WatchdogReset;
        }

        if self.state == ConnectionState::Idle {
            return match self.open(transport) {
                Ok(()) => TransmitOutcome::Connecting {
                    watchdog: self.watchdog,
                },
                Err(e) => TransmitOutcome::Rejected(e),
            };
        }

        TransmitOutcome::Waiting {
            watchdog: self.watchdog,
        }
    }

    /// Drain and handle every pending transport event.
    ///
    /// A reset seen on the previous poll is followed up with a fresh
    /// connect here, before new events are drained.
    pub fn poll_transport<T: Transport + ?Sized>(&mut self, transport: &mut T) -> usize {
        if std::mem::take(&mut self.reconnect_pending) && self.state == ConnectionState::Idle {
            debug!("Reconnecting after reset");
            if let Err(e) = self.open(transport) {
                warn!("Reconnect after reset failed: {}", e);
            }
        }

        let mut handled = 0;
        while let Some(event) = transport.poll_event() {
            self.handle_event(transport, event);
            handled += 1;
        }
        handled
    }

    /// Apply one transport event
    pub fn handle_event<T: Transport + ?Sized>(&mut self, transport: &mut T, event: TransportEvent) {
        match (self.state, event) {
            (ConnectionState::Connecting, TransportEvent::Connected) => {
                info!("Connected to collector");
                self.transition(ConnectionState::ConnectedIdle, false);
            }
            (ConnectionState::Connecting, TransportEvent::ConnectFailed) => {
                warn!("Connect attempt failed");
                transport.abort();
                self.transition(ConnectionState::Idle, false);
            }
            (ConnectionState::Sending, TransportEvent::Sent) => {
                transport.close();
                self.transition(ConnectionState::Idle, false);
                if let Err(e) = self.open(transport) {
                    warn!("Reconnect failed: {}", e);
                }
            }
            (_, TransportEvent::Reset) => {
                warn!("Connection reset in {}", self.state);
                self.reset(transport);
            }
            (state, event) => {
                debug!("Ignoring {:?} in {}", event, state);
            }
        }
    }

    fn open<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), TransportError> {
        match transport.connect() {
            Ok(()) => {
                self.transition(ConnectionState::Connecting, false);
                Ok(())
            }
            Err(e) => {
                warn!("Connect refused: {}", e);
                Err(e)
            }
        }
    }

    fn reset<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        transport.abort();
        self.connection_resets += 1;
        counter!("daq_connection_resets_total").increment(1);
        self.reconnect_pending = true;
        if self.state != ConnectionState::Idle {
            self.transition(ConnectionState::Idle, true);
        }
    }

    fn transition(&mut self, next: ConnectionState, forced: bool) {
        let from = self.state;
        let legal = from.is_nominal_transition(next) || (forced && from.is_forced_transition(next));
        debug_assert!(legal, "illegal transition {} -> {}", from, next);
        if !legal {
            warn!("Unexpected transition {} -> {}", from, next);
        }
        debug!("Connection {} -> {}", from, next);
        self.state = next;
        #[cfg(test)]
        self.trace.push((from, next));
    }
}
