use crate::link::{LinkRole, LinkSense, SerialLink, Side};
use crate::wire::{ControlType, Frame};

use super::{DiscoveryState, NetworkHandler, NetworkListener, ProtocolState, RunningState};

impl<S, L, R, H> NetworkHandler<S, L, R, H>
where
    S: LinkSense,
    L: SerialLink,
    R: SerialLink,
    H: NetworkListener,
{
    /// One discovery step.
    ///
    /// ANNOUNCE travels rightward and hands every node its id. The right-most
    /// node then knows the chain length and sends it back leftward in
    /// ANNOUNCE_REPLY. Each hop is followed by a MONITOR so that exactly one
    /// side of a link talks at a time.
    pub(super) fn step_discovery(&mut self, state: DiscoveryState, received: Option<Frame>) {
        match state {
            DiscoveryState::WaitToInitiate => {
                self.session.ticks_in_state = self.session.ticks_in_state.saturating_add(1);
                if self.session.ticks_in_state > self.config.wait_to_initiate_ticks {
                    self.enter_discovery(DiscoveryState::SendAnnounce);
                }
            }
            DiscoveryState::ReceiveAnnounce => {
                let Some(announced) = self.expect_byte(received, ControlType::Announce) else {
                    return;
                };

                // The next id and the count implied by it must both fit.
                let Some(count) = announced.checked_add(2) else {
                    debug!("network: announced id {} leaves no room", announced);
                    self.protocol_error(Side::Left);
                    return;
                };

                self.session.peer_id = announced + 1;
                // Final for the right-most node; the others learn the real
                // count from ANNOUNCE_REPLY.
                self.session.peer_count = count;
                self.enter_discovery(DiscoveryState::ReceiveMonitorAfterAnnounce);
            }
            DiscoveryState::ReceiveMonitorAfterAnnounce => {
                if self.expect(received, ControlType::Monitor).is_none() {
                    return;
                }

                if self.session.role == LinkRole::Middle {
                    self.enter_discovery(DiscoveryState::SendAnnounce);
                } else {
                    self.enter_discovery(DiscoveryState::SendAnnounceReply);
                }
            }
            DiscoveryState::SendAnnounce => {
                if self.transmit(Frame::announce(self.session.peer_id)) {
                    self.enter_discovery(DiscoveryState::ConfirmAnnounce);
                }
            }
            DiscoveryState::ConfirmAnnounce => {
                self.enter_discovery(DiscoveryState::SendMonitorAfterAnnounce);
            }
            DiscoveryState::SendMonitorAfterAnnounce => {
                if self.transmit(Frame::control(ControlType::Monitor)) {
                    self.enter_discovery(DiscoveryState::ConfirmMonitorAfterAnnounce);
                }
            }
            DiscoveryState::ConfirmMonitorAfterAnnounce => {
                // ANNOUNCE_REPLY comes back from the right.
                self.session.wave = Side::Left;
                self.listen(Side::Right);
                self.enter_discovery(DiscoveryState::ReceiveAnnounceReply);
            }
            DiscoveryState::ReceiveAnnounceReply => {
                let Some(count) = self.expect_byte(received, ControlType::AnnounceReply) else {
                    return;
                };

                if count <= self.session.peer_id {
                    debug!(
                        "network: chain of {} cannot hold peer {}",
                        count, self.session.peer_id
                    );
                    self.protocol_error(Side::Right);
                    return;
                }

                self.session.peer_count = count;
                self.enter_discovery(DiscoveryState::ReceiveMonitorAfterAnnounceReply);
            }
            DiscoveryState::ReceiveMonitorAfterAnnounceReply => {
                if self.expect(received, ControlType::Monitor).is_none() {
                    return;
                }

                if self.session.role == LinkRole::Middle {
                    self.enter_discovery(DiscoveryState::SendAnnounceReply);
                } else {
                    // Left-most: discovery is over and the first turn is ours.
                    self.session.wave = Side::Right;
                    self.enter(ProtocolState::Running(RunningState::SendAppMessage));
                }
            }
            DiscoveryState::SendAnnounceReply => {
                if self.transmit(Frame::announce_reply(self.session.peer_count)) {
                    self.enter_discovery(DiscoveryState::ConfirmAnnounceReply);
                }
            }
            DiscoveryState::ConfirmAnnounceReply => {
                self.enter_discovery(DiscoveryState::SendMonitorAfterAnnounceReply);
            }
            DiscoveryState::SendMonitorAfterAnnounceReply => {
                if self.transmit(Frame::control(ControlType::Monitor)) {
                    self.enter_discovery(DiscoveryState::ConfirmMonitorAfterAnnounceReply);
                }
            }
            DiscoveryState::ConfirmMonitorAfterAnnounceReply => {
                // The first turn starts at the left end.
                self.listen(Side::Left);
                self.session.wave = Side::Right;
                self.enter(ProtocolState::Running(RunningState::ReceiveMessage));
            }
        }
    }

    fn enter_discovery(&mut self, state: DiscoveryState) {
        self.enter(ProtocolState::Discovery(state));
    }

    fn expect_byte(&mut self, received: Option<Frame>, kind: ControlType) -> Option<u8> {
        self.expect(received, kind).and_then(|frame| frame.first_byte())
    }
}
