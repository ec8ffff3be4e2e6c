use crate::link::{LinkRole, SensedLinks, Side};
use crate::scheduler::AbsoluteTime;
use crate::wire::Frame;

/// Discovery sub-protocol: assigns peer ids left to right, then carries the
/// chain length back to the left.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryState {
    /// Left-most only: give the neighbors time to come up.
    WaitToInitiate,
    ReceiveAnnounce,
    ReceiveMonitorAfterAnnounce,
    SendAnnounce,
    ConfirmAnnounce,
    SendMonitorAfterAnnounce,
    ConfirmMonitorAfterAnnounce,
    ReceiveAnnounceReply,
    ReceiveMonitorAfterAnnounceReply,
    SendAnnounceReply,
    ConfirmAnnounceReply,
    SendMonitorAfterAnnounceReply,
    ConfirmMonitorAfterAnnounceReply,
}

/// Turn-taking sub-protocol entered once discovery is over.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunningState {
    ReceiveMessage,
    SendAppMessage,
    ConfirmAppMessage,
    SendMonitor,
    ConfirmMonitor,
    /// Relaying an application message away from `origin`.
    ConfirmForward { origin: Side },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolState {
    Unconnected,
    Discovery(DiscoveryState),
    Running(RunningState),
}

impl ProtocolState {
    /// States that wait for a frame from the listening side.
    pub const fn is_receiving(self) -> bool {
        matches!(
            self,
            ProtocolState::Discovery(
                DiscoveryState::ReceiveAnnounce
                    | DiscoveryState::ReceiveMonitorAfterAnnounce
                    | DiscoveryState::ReceiveAnnounceReply
                    | DiscoveryState::ReceiveMonitorAfterAnnounceReply
            ) | ProtocolState::Running(RunningState::ReceiveMessage)
        )
    }

    pub const fn is_running(self) -> bool {
        matches!(self, ProtocolState::Running(_))
    }

    pub const fn label(self) -> &'static str {
        match self {
            ProtocolState::Unconnected => "unconnected",
            ProtocolState::Discovery(state) => match state {
                DiscoveryState::WaitToInitiate => "wait-to-initiate",
                DiscoveryState::ReceiveAnnounce => "receive-announce",
                DiscoveryState::ReceiveMonitorAfterAnnounce => "receive-monitor-after-announce",
                DiscoveryState::SendAnnounce => "send-announce",
                DiscoveryState::ConfirmAnnounce => "confirm-announce",
                DiscoveryState::SendMonitorAfterAnnounce => "send-monitor-after-announce",
                DiscoveryState::ConfirmMonitorAfterAnnounce => "confirm-monitor-after-announce",
                DiscoveryState::ReceiveAnnounceReply => "receive-announce-reply",
                DiscoveryState::ReceiveMonitorAfterAnnounceReply => {
                    "receive-monitor-after-announce-reply"
                }
                DiscoveryState::SendAnnounceReply => "send-announce-reply",
                DiscoveryState::ConfirmAnnounceReply => "confirm-announce-reply",
                DiscoveryState::SendMonitorAfterAnnounceReply => {
                    "send-monitor-after-announce-reply"
                }
                DiscoveryState::ConfirmMonitorAfterAnnounceReply => {
                    "confirm-monitor-after-announce-reply"
                }
            },
            ProtocolState::Running(state) => match state {
                RunningState::ReceiveMessage => "receive-message",
                RunningState::SendAppMessage => "send-app-message",
                RunningState::ConfirmAppMessage => "confirm-app-message",
                RunningState::SendMonitor => "send-monitor",
                RunningState::ConfirmMonitor => "confirm-monitor",
                RunningState::ConfirmForward { .. } => "confirm-forward",
            },
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum TransmissionPhase {
    AttemptSend,
    AwaitConfirmation,
}

/// The single frame in flight, kept until the neighbor acknowledges it.
#[derive(Clone, Debug)]
pub(crate) struct Outgoing {
    pub frame: Frame,
    pub direction: Side,
    pub phase: TransmissionPhase,
    pub attempts: u32,
    pub last_sent: AbsoluteTime,
}

/// Application message waiting for a turn in its direction.
#[derive(Clone, Debug)]
pub(crate) struct PendingMessage {
    pub frame: Frame,
    pub direction: Side,
}

/// Everything a reset throws away.
#[derive(Clone, Debug)]
pub(crate) struct Session {
    pub state: ProtocolState,
    pub role: LinkRole,
    pub sensed: SensedLinks,
    pub peer_id: u8,
    pub peer_count: u8,
    pub listening: Side,
    pub wave: Side,
    pub ticks_in_state: u8,
    pub last_received: AbsoluteTime,
    pub outgoing: Option<Outgoing>,
    pub pending: Option<PendingMessage>,
}

impl Session {
    pub const fn new() -> Self {
        Self {
            state: ProtocolState::Unconnected,
            role: LinkRole::Unknown,
            sensed: SensedLinks::NONE,
            peer_id: 0,
            peer_count: 1,
            listening: Side::Left,
            wave: Side::Right,
            ticks_in_state: 0,
            last_received: 0,
            outgoing: None,
            pending: None,
        }
    }

    /// Side frames go out on for the current role and turn direction.
    pub const fn transmit_direction(&self) -> Option<Side> {
        match self.role {
            LinkRole::Middle => Some(self.wave),
            role => role.fixed_direction(),
        }
    }

    pub const fn holds_turn(&self) -> bool {
        !matches!(self.state, ProtocolState::Unconnected) && !self.state.is_receiving()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_nodes_ignore_the_wave_direction() {
        let mut session = Session::new();
        session.wave = Side::Right;

        session.role = LinkRole::RightMost;
        assert_eq!(session.transmit_direction(), Some(Side::Left));

        session.role = LinkRole::Middle;
        assert_eq!(session.transmit_direction(), Some(Side::Right));

        session.role = LinkRole::Unknown;
        assert_eq!(session.transmit_direction(), None);
    }

    #[test]
    fn only_receive_states_wait_for_the_listening_side() {
        assert!(ProtocolState::Running(RunningState::ReceiveMessage).is_receiving());
        assert!(!ProtocolState::Running(RunningState::SendMonitor).is_receiving());
        assert!(!ProtocolState::Discovery(DiscoveryState::WaitToInitiate).is_receiving());
        assert!(!ProtocolState::Unconnected.is_receiving());
    }
}
