use crate::diagnostics::ResetReason;
use crate::link::{LinkRole, LinkSense, SerialLink};
use crate::wire::{ControlType, Frame, is_application_type};

use super::{MessageDisposition, NetworkHandler, NetworkListener, ProtocolState, RunningState};

impl<S, L, R, H> NetworkHandler<S, L, R, H>
where
    S: LinkSense,
    L: SerialLink,
    R: SerialLink,
    H: NetworkListener,
{
    /// One turn-taking step.
    ///
    /// MONITOR is the turn token. The holder sends at most one queued
    /// application message in the token's direction, then passes the token
    /// on. End nodes bounce it back; middle nodes flip the direction they
    /// expect it from each time they pass it.
    pub(super) fn step_running(&mut self, state: RunningState, received: Option<Frame>) {
        match state {
            RunningState::ReceiveMessage => {
                if let Some(frame) = received {
                    self.handle_running_frame(frame);
                }
            }
            RunningState::SendAppMessage => {
                let direction = self.session.transmit_direction();
                let ready = self
                    .session
                    .pending
                    .take_if(|pending| Some(pending.direction) == direction);

                if let Some(pending) = ready
                    && !self.transmit(pending.frame)
                {
                    return;
                }
                self.enter_running(RunningState::ConfirmAppMessage);
            }
            RunningState::ConfirmAppMessage => {
                self.enter_running(RunningState::SendMonitor);
            }
            RunningState::SendMonitor => {
                if self.transmit(Frame::control(ControlType::Monitor)) {
                    self.enter_running(RunningState::ConfirmMonitor);
                }
            }
            RunningState::ConfirmMonitor => {
                if self.session.role == LinkRole::Middle {
                    self.session.wave = self.session.wave.opposite();
                }
                self.enter_running(RunningState::ReceiveMessage);
            }
            RunningState::ConfirmForward { origin } => {
                // The token is still on its way from `origin`.
                self.listen(origin);
                self.enter_running(RunningState::ReceiveMessage);
            }
        }
    }

    fn handle_running_frame(&mut self, frame: Frame) {
        if frame.is_control(ControlType::Monitor) {
            self.enter_running(RunningState::SendAppMessage);
            return;
        }

        let origin = self.session.listening;
        if !is_application_type(frame.kind) {
            debug!("network: control type {} while running", frame.kind);
            self.protocol_error(origin);
            return;
        }

        match self
            .listener
            .on_message_received(origin, frame.kind, &frame.payload)
        {
            MessageDisposition::Swallow => {}
            MessageDisposition::Reset => self.reset_with(ResetReason::ApplicationRequest),
            MessageDisposition::Forward if self.session.role == LinkRole::Middle => {
                self.transmit_toward(frame, origin.opposite());
                self.enter_running(RunningState::ConfirmForward { origin });
            }
            MessageDisposition::Forward => {
                trace!("network: end node has nowhere to forward type {}", frame.kind);
            }
        }
    }

    fn enter_running(&mut self, state: RunningState) {
        self.enter(ProtocolState::Running(state));
    }
}
