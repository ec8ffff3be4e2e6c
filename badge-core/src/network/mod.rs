//! Chain discovery and turn-taking over the two serial links.
//!
//! [`NetworkHandler`] is a periodic [`Task`]. Every run it re-senses the
//! connectors, resets the session on any topology change, then advances the
//! active state machine by at most one step:
//!
//! 1. In a receive state it polls the listening side and acknowledges every
//!    validated frame with OK.
//! 2. While a frame is in flight it waits for the neighbor's OK and resends
//!    the frame after the retransmit timeout.
//! 3. Otherwise the discovery or running state machine takes its next step.
//!
//! A reset is the only recovery path. It discards the whole session and the
//! next run rediscovers the chain from scratch.

use crate::config::NetworkConfig;
use crate::diagnostics::{NetworkEvent, NetworkLog, NetworkStats, ResetReason};
use crate::link::{LinkRole, LinkSense, SensedLinks, SerialLink, Side};
use crate::scheduler::{AbsoluteTime, Periodic, RelativeTime, Task};
use crate::wire::{ControlType, Frame, FrameReceiver, MessageCatalog, ReceiveStatus, is_application_type};

mod discovery;
mod listener;
mod running;
mod session;

pub use listener::{EnqueueError, MessageDisposition, NetworkListener};
pub use session::{DiscoveryState, ProtocolState, RunningState};

use session::{Outgoing, PendingMessage, Session, TransmissionPhase};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Connections {
    Unchanged,
    TopologyChanged,
}

const fn side_index(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

/// Owner of the protocol session for one badge.
pub struct NetworkHandler<S, L, R, H> {
    config: NetworkConfig,
    catalog: MessageCatalog,
    periodic: Periodic,
    sense: S,
    left: L,
    right: R,
    receivers: [FrameReceiver; 2],
    listener: H,
    session: Session,
    now: AbsoluteTime,
    stats: NetworkStats,
    log: NetworkLog,
}

impl<S, L, R, H> NetworkHandler<S, L, R, H>
where
    S: LinkSense,
    L: SerialLink,
    R: SerialLink,
    H: NetworkListener,
{
    /// Creates an unconnected handler. Neighbors are sensed on the first run.
    pub fn new(
        config: NetworkConfig,
        catalog: MessageCatalog,
        sense: S,
        left: L,
        right: R,
        listener: H,
    ) -> Self {
        Self {
            periodic: Periodic::new(config.base_period_ms),
            config,
            catalog,
            sense,
            left,
            right,
            receivers: [FrameReceiver::new(), FrameReceiver::new()],
            listener,
            session: Session::new(),
            now: 0,
            stats: NetworkStats::default(),
            log: NetworkLog::new(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn catalog(&self) -> &MessageCatalog {
        &self.catalog
    }

    /// Ordinal position in the chain, counted from the left end.
    pub fn peer_id(&self) -> u8 {
        self.session.peer_id
    }

    /// Chain length. A badge on its own counts as a chain of one.
    pub fn peer_count(&self) -> u8 {
        self.session.peer_count
    }

    /// Returns `true` once discovery has completed.
    pub fn is_connected(&self) -> bool {
        self.session.state.is_running()
    }

    pub fn role(&self) -> LinkRole {
        self.session.role
    }

    pub fn state(&self) -> ProtocolState {
        self.session.state
    }

    pub fn sensed(&self) -> SensedLinks {
        self.session.sensed
    }

    pub fn listening_side(&self) -> Side {
        self.session.listening
    }

    /// Direction the turn token is currently travelling.
    pub fn wave_direction(&self) -> Side {
        self.session.wave
    }

    /// Returns `true` while this node is the one allowed to transmit.
    pub fn holds_turn(&self) -> bool {
        self.session.holds_turn()
    }

    pub fn has_pending_message(&self) -> bool {
        self.session.pending.is_some()
    }

    pub fn stats(&self) -> NetworkStats {
        let mut stats = self.stats;
        for receiver in &self.receivers {
            stats.resyncs = stats.resyncs.wrapping_add(receiver.resyncs());
            stats.unknown_types = stats.unknown_types.wrapping_add(receiver.unknown_types());
        }
        stats
    }

    pub fn log(&self) -> &NetworkLog {
        &self.log
    }

    pub fn listener(&self) -> &H {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut H {
        &mut self.listener
    }

    /// Stops the handler from being rescheduled after its current run.
    pub fn stop(&mut self) {
        self.periodic.kill();
    }

    /// Queues one application message for the next turn travelling toward
    /// `direction`.
    ///
    /// Targeting a side with no neighbor resets the session and reports
    /// [`EnqueueError::Unconnected`].
    pub fn enqueue_outgoing(
        &mut self,
        direction: Side,
        kind: u8,
        payload: &[u8],
    ) -> Result<(), EnqueueError> {
        let expected = is_application_type(kind)
            .then(|| self.catalog.payload_size(kind))
            .flatten()
            .ok_or(EnqueueError::UnknownMessageType(kind))?;
        let length_error = EnqueueError::PayloadLength {
            expected,
            actual: payload.len(),
        };
        if payload.len() != expected {
            return Err(length_error);
        }

        if self.session.pending.is_some() {
            return Err(EnqueueError::QueueFull);
        }

        if !self.session.role.has_neighbor(direction) {
            warn!(
                "network: no neighbor on the {} side of a {} node",
                direction.label(),
                self.session.role.label()
            );
            self.reset_with(ResetReason::InvalidDirection);
            return Err(EnqueueError::Unconnected);
        }

        let frame = Frame::new(kind, payload).ok_or(length_error)?;
        self.session.pending = Some(PendingMessage { frame, direction });
        Ok(())
    }

    /// Discards the session. Calling it repeatedly has no further effect on
    /// the observable state.
    pub fn reset(&mut self) {
        self.reset_with(ResetReason::Explicit);
    }

    /// One handler run at time `now`.
    pub fn step(&mut self, now: AbsoluteTime) {
        self.now = now;

        if self.check_connections() == Connections::TopologyChanged {
            // Neighbors get one period to notice the change too.
            return;
        }

        if self.session.state == ProtocolState::Unconnected {
            return;
        }

        self.run_wire_protocol();
    }

    fn check_connections(&mut self) -> Connections {
        let sensed = self.sense.sense();
        let previous = self.session.sensed;
        if sensed == previous {
            return Connections::Unchanged;
        }

        info!(
            "network: connectors changed, left={} right={}",
            sensed.left, sensed.right
        );

        if self.session.state != ProtocolState::Unconnected {
            for side in [Side::Left, Side::Right] {
                if previous.is_sensed(side) {
                    self.send(side, &Frame::control(ControlType::Reset));
                }
            }
        }

        self.log.record(self.now, NetworkEvent::TopologyChanged(sensed));
        self.reset_with(ResetReason::TopologyChanged);
        self.session.sensed = sensed;
        self.assume_role(sensed.role());
        Connections::TopologyChanged
    }

    fn assume_role(&mut self, role: LinkRole) {
        self.session.role = role;
        debug!("network: role {}", role.label());

        match role {
            LinkRole::Unknown => return,
            LinkRole::LeftMost => {
                // The left-most node is peer 0 and initiates discovery.
                self.session.peer_id = 0;
                self.listen(Side::Right);
                self.enter(ProtocolState::Discovery(DiscoveryState::WaitToInitiate));
            }
            LinkRole::RightMost | LinkRole::Middle => {
                self.listen(Side::Left);
                self.enter(ProtocolState::Discovery(DiscoveryState::ReceiveAnnounce));
            }
        }

        self.log.record(self.now, NetworkEvent::PairingBegin);
        self.listener.on_pairing_begin();
    }

    fn run_wire_protocol(&mut self) {
        let silent_for = self.now.saturating_sub(self.session.last_received);
        if silent_for > AbsoluteTime::from(self.config.session_timeout_ms) {
            warn!("network: no frame received for {} ms", silent_for);
            self.reset_with(ResetReason::Timeout);
            return;
        }

        let mut received = None;
        if self.session.state.is_receiving() {
            let side = self.session.listening;
            let ReceiveStatus::Complete(frame) = self.poll(side) else {
                // Wait for the rest of the frame, or for a retransmission.
                return;
            };

            match frame.control_type() {
                Some(ControlType::Reset) => {
                    self.peer_reset(side);
                    return;
                }
                Some(ControlType::Ok) => {
                    trace!("network: ignoring stray OK");
                    return;
                }
                _ => {}
            }

            self.send(side, &Frame::control(ControlType::Ok));
            received = Some(frame);
        }

        if !self.drive_transmission() {
            return;
        }

        match self.session.state {
            ProtocolState::Unconnected => {}
            ProtocolState::Discovery(state) => self.step_discovery(state, received),
            ProtocolState::Running(state) => self.step_running(state, received),
        }
    }

    /// Advances the frame in flight. Returns `true` once nothing is in flight.
    fn drive_transmission(&mut self) -> bool {
        let Some(outgoing) = self.session.outgoing.as_ref() else {
            return true;
        };
        let direction = outgoing.direction;
        let last_sent = outgoing.last_sent;

        match outgoing.phase {
            TransmissionPhase::AttemptSend => {
                let encoded = outgoing.frame.encode();
                let retransmission = outgoing.attempts > 0;

                // Listen first: the neighbor may acknowledge immediately.
                self.listen(direction);
                self.write(direction, &encoded);
                if retransmission {
                    self.stats.retransmissions = self.stats.retransmissions.wrapping_add(1);
                }

                if let Some(outgoing) = self.session.outgoing.as_mut() {
                    outgoing.phase = TransmissionPhase::AwaitConfirmation;
                    outgoing.attempts = outgoing.attempts.saturating_add(1);
                    outgoing.last_sent = self.now;
                }
                false
            }
            TransmissionPhase::AwaitConfirmation => match self.poll(direction) {
                ReceiveStatus::Complete(frame) if frame.is_control(ControlType::Ok) => {
                    self.session.outgoing = None;
                    true
                }
                ReceiveStatus::Complete(frame) => {
                    if frame.is_control(ControlType::Reset) {
                        self.peer_reset(direction);
                    } else {
                        debug!("network: type {} received instead of OK", frame.kind);
                        self.protocol_error(direction);
                    }
                    false
                }
                ReceiveStatus::NoData | ReceiveStatus::Incomplete | ReceiveStatus::Corrupted => {
                    let waited = self.now.saturating_sub(last_sent);
                    if waited >= AbsoluteTime::from(self.config.retransmit_timeout_ms) {
                        debug!("network: no OK after {} ms, queueing retransmission", waited);
                        if let Some(outgoing) = self.session.outgoing.as_mut() {
                            outgoing.phase = TransmissionPhase::AttemptSend;
                        }
                    }
                    false
                }
            },
        }
    }

    /// Puts `frame` in flight toward the current transmit direction.
    /// Returns `false` if the session had to be reset instead.
    fn transmit(&mut self, frame: Frame) -> bool {
        let Some(direction) = self.session.transmit_direction() else {
            self.reset_with(ResetReason::InvalidDirection);
            return false;
        };
        self.transmit_toward(frame, direction);
        true
    }

    fn transmit_toward(&mut self, frame: Frame, direction: Side) {
        trace!("network: queueing type {} toward {}", frame.kind, direction.label());
        self.session.outgoing = Some(Outgoing {
            frame,
            direction,
            phase: TransmissionPhase::AttemptSend,
            attempts: 0,
            last_sent: self.now,
        });
    }

    /// Returns the received frame if it is `kind`; anything else is a
    /// protocol error.
    fn expect(&mut self, received: Option<Frame>, kind: ControlType) -> Option<Frame> {
        match received {
            Some(frame) if frame.is_control(kind) => Some(frame),
            Some(frame) => {
                debug!(
                    "network: expected {} in {}, got type {}",
                    kind.label(),
                    self.session.state.label(),
                    frame.kind
                );
                self.protocol_error(self.session.listening);
                None
            }
            None => None,
        }
    }

    /// Resets after a frame the current state does not accept, and tells the
    /// neighbor on `side` to do the same.
    fn protocol_error(&mut self, side: Side) {
        self.send(side, &Frame::control(ControlType::Reset));
        self.reset_with(ResetReason::ProtocolError);
    }

    /// Resets after a RESET from the neighbor on `from`. A middle node passes
    /// the RESET on so the far end does not wait out the session timeout.
    fn peer_reset(&mut self, from: Side) {
        if self.session.role == LinkRole::Middle {
            self.send(from.opposite(), &Frame::control(ControlType::Reset));
        }
        self.reset_with(ResetReason::PeerReset);
    }

    fn reset_with(&mut self, reason: ResetReason) {
        info!("network: reset ({})", reason.label());
        self.stats.resets = self.stats.resets.wrapping_add(1);
        self.log.record(self.now, NetworkEvent::Reset(reason));

        self.session.role = LinkRole::Unknown;
        self.session.sensed = SensedLinks::NONE;
        self.enter(ProtocolState::Unconnected);
    }

    /// Every state change restarts the session timeout.
    fn enter(&mut self, state: ProtocolState) {
        let previous = self.session.state;
        self.session.state = state;
        self.session.ticks_in_state = 0;
        self.session.last_received = self.now;

        if previous != state {
            debug!("network: {} -> {}", previous.label(), state.label());
        }

        if state == ProtocolState::Unconnected {
            self.session.peer_count = 1;
            self.session.peer_id = 0;
            self.session.wave = Side::Right;
            self.session.outgoing = None;
            self.session.pending = None;
            for receiver in &mut self.receivers {
                receiver.reset();
            }
            self.left.flush_input();
            self.right.flush_input();

            if previous.is_running() {
                self.log.record(self.now, NetworkEvent::Disconnected);
                self.listener.on_disconnected();
            }
        }

        if !previous.is_running() && state.is_running() {
            let peer_id = self.session.peer_id;
            let peer_count = self.session.peer_count;
            info!("network: paired as {} of {}", peer_id, peer_count);
            self.log.record(
                self.now,
                NetworkEvent::PairingEnd {
                    peer_id,
                    peer_count,
                },
            );
            self.listener.on_pairing_end(peer_id, peer_count);
        }
    }

    fn listen(&mut self, side: Side) {
        if self.session.listening != side {
            debug!("network: listening {}", side.label());
        }
        self.session.listening = side;
        self.link(side).listen();
    }

    fn poll(&mut self, side: Side) -> ReceiveStatus {
        let link: &mut dyn SerialLink = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        let status = self.receivers[side_index(side)].poll(link, &self.catalog);

        match &status {
            ReceiveStatus::Complete(_) => {
                self.stats.received = self.stats.received.wrapping_add(1);
                self.session.last_received = self.now;
            }
            ReceiveStatus::Corrupted => {
                self.stats.corrupted = self.stats.corrupted.wrapping_add(1);
            }
            ReceiveStatus::NoData | ReceiveStatus::Incomplete => {}
        }
        status
    }

    fn send(&mut self, side: Side, frame: &Frame) {
        self.write(side, &frame.encode());
    }

    fn write(&mut self, side: Side, bytes: &[u8]) {
        self.stats.sent = self.stats.sent.wrapping_add(1);
        self.link(side).write(bytes);
    }

    fn link(&mut self, side: Side) -> &mut dyn SerialLink {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

impl<S, L, R, H> Task for NetworkHandler<S, L, R, H>
where
    S: LinkSense,
    L: SerialLink,
    R: SerialLink,
    H: NetworkListener,
{
    fn run(&mut self, now: AbsoluteTime) {
        self.step(now);
    }

    fn period(&self) -> Option<RelativeTime> {
        Some(self.periodic.period_ms())
    }

    fn is_alive(&self) -> bool {
        self.periodic.is_alive()
    }
}
