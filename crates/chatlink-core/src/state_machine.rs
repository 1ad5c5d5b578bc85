use crate::{
    error::ChannelError,
    types::{ChannelEvent, ConnectionState, ConnectionStatus, StatusReason},
};

/// Connection lifecycle guard shared by every channel strategy.
///
/// Transitions return the [`ChannelEvent`] to publish, or `None` when the
/// observable status did not change.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStateMachine {
    status: ConnectionStatus,
}

impl ConnectionStateMachine {
    pub fn state(&self) -> ConnectionState {
        self.status.state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// `Disconnected -> Connecting`. Rejected from any other state.
    pub fn begin_connect(&mut self) -> Result<ChannelEvent, ChannelError> {
        if self.status.state != ConnectionState::Disconnected {
            return Err(ChannelError::invalid_state(self.status.state, "start"));
        }
        Ok(self
            .set(ConnectionState::Connecting, StatusReason::Connecting)
            .unwrap_or(ChannelEvent::StateChanged(self.status)))
    }

    /// `Connecting|Connected -> Connected`.
    ///
    /// Poll strategies report every successful request, so repeating the
    /// current status is not an error and yields no event.
    pub fn on_connected(
        &mut self,
        reason: StatusReason,
    ) -> Result<Option<ChannelEvent>, ChannelError> {
        if self.status.state == ConnectionState::Disconnected {
            return Err(ChannelError::invalid_state(self.status.state, "on_connected"));
        }
        Ok(self.set(ConnectionState::Connected, reason))
    }

    /// Transient failure: the reason changes, the state does not.
    pub fn on_transient(&mut self, reason: StatusReason) -> Option<ChannelEvent> {
        self.set(self.status.state, reason)
    }

    /// Hard failure from any state.
    pub fn on_failure(&mut self, reason: StatusReason) -> Option<ChannelEvent> {
        self.set(ConnectionState::Disconnected, reason)
    }

    pub fn on_stopped(&mut self) -> Option<ChannelEvent> {
        self.set(ConnectionState::Disconnected, StatusReason::StoppedByCaller)
    }

    fn set(&mut self, state: ConnectionState, reason: StatusReason) -> Option<ChannelEvent> {
        let next = ConnectionStatus::new(state, reason);
        if next == self.status {
            return None;
        }
        self.status = next;
        Some(ChannelEvent::StateChanged(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_machine() -> ConnectionStateMachine {
        let mut machine = ConnectionStateMachine::default();
        machine.begin_connect().expect("connect should start");
        machine
            .on_connected(StatusReason::Connected)
            .expect("connected should be accepted");
        machine
    }

    #[test]
    fn starts_disconnected_and_idle() {
        let machine = ConnectionStateMachine::default();
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert_eq!(machine.status().text(), "not connected");
    }

    #[test]
    fn rejects_start_while_connecting() {
        let mut machine = ConnectionStateMachine::default();
        machine.begin_connect().expect("first start should pass");
        let err = machine
            .begin_connect()
            .expect_err("second start must be rejected");
        assert_eq!(err.code, "invalid_state_transition");
        assert_eq!(machine.state(), ConnectionState::Connecting);
    }

    #[test]
    fn rejects_start_while_connected() {
        let mut machine = connected_machine();
        let err = machine.begin_connect().expect_err("start must be rejected");
        assert_eq!(err.code, "invalid_state_transition");
        assert_eq!(machine.state(), ConnectionState::Connected);
    }

    #[test]
    fn repeated_connected_reports_no_event() {
        let mut machine = connected_machine();
        let event = machine
            .on_connected(StatusReason::Connected)
            .expect("repeat connected is fine");
        assert_eq!(event, None);
    }

    #[test]
    fn rejects_connected_while_disconnected() {
        let mut machine = ConnectionStateMachine::default();
        let err = machine
            .on_connected(StatusReason::Connected)
            .expect_err("connected without connecting must fail");
        assert_eq!(err.code, "invalid_state_transition");
    }

    #[test]
    fn transient_failure_keeps_state() {
        let mut machine = connected_machine();
        let event = machine
            .on_transient(StatusReason::TimedOut)
            .expect("reason changed");
        assert_eq!(
            event,
            ChannelEvent::StateChanged(ConnectionStatus::new(
                ConnectionState::Connected,
                StatusReason::TimedOut
            ))
        );
        assert_eq!(machine.status().text(), "request timed out, retrying...");
    }

    #[test]
    fn failure_then_restart_is_allowed() {
        let mut machine = connected_machine();
        machine
            .on_failure(StatusReason::Closed)
            .expect("failure changes state");
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert_eq!(machine.on_failure(StatusReason::Closed), None);
        machine.begin_connect().expect("reconnect should be allowed");
    }

    #[test]
    fn stop_is_idempotent() {
        let mut machine = connected_machine();
        assert!(machine.on_stopped().is_some());
        assert_eq!(machine.on_stopped(), None);
        assert_eq!(machine.status().text(), "disconnected by caller");
    }
}
