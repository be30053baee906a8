// crates/powermax-rs/src/session.rs
//! Enrolment and download state machine.
//!
//! Drives the engine from cold start through PowerLink enrolment and the
//! full EEPROM download into steady-state monitoring. Side effects (queueing
//! commands, committing settings) belong to the engine; this machine only
//! owns the legal transitions.

use log::debug;

/// Phase of the PowerLink session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Cold start, or recovering from a comms failure.
    #[default]
    Idle,
    /// Enroll reply sent, waiting for the panel to accept us.
    Enrolling,
    /// Panel announced its type and model.
    PanelInfoReceived,
    /// EEPROM download in progress.
    Downloading,
    /// Download assimilated; waiting for the first status reply.
    SettingsParsed,
    /// Steady state: mirroring panel state, keep-alive running.
    Monitoring,
}

/// External events that can move the session forward (or reset it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The engine transmitted an enroll reply.
    EnrollSent,
    /// Panel refused the last command with an access-denied message.
    AccessDenied,
    /// Panel type/model announcement arrived.
    PanelInfo,
    /// Panel acknowledged download mode.
    DownloadInfo,
    /// Every requested EEPROM range is present and parsed.
    DownloadComplete,
    /// A status reply arrived after settings were parsed.
    StatusReply,
    /// Repeated timeouts or protracted silence.
    CommsFailure,
    /// Panel-initiated end of session.
    PanelStop,
}

/// Tracks the current session phase for one engine.
#[derive(Debug, Default)]
pub struct SessionStateMachine {
    current_state: SessionState,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self { current_state: SessionState::Idle }
    }

    pub fn current_state(&self) -> SessionState {
        self.current_state
    }

    pub fn reset(&mut self) {
        self.current_state = SessionState::Idle;
    }

    /// Processes an external event and transitions the session accordingly.
    /// Returns the state after the transition.
    pub fn process_event(&mut self, event: SessionEvent) -> SessionState {
        let next_state = match (self.current_state, event) {
            // --- Failure paths: any phase drops back to Idle ---
            (_, SessionEvent::CommsFailure) => SessionState::Idle,
            (_, SessionEvent::PanelStop) => SessionState::Idle,

            // --- Enrolment ---

            // Sending the enroll reply opens the enrolment phase.
            (SessionState::Idle, SessionEvent::EnrollSent) => SessionState::Enrolling,
            // The panel denies access until it has seen a valid PowerLink
            // PIN; the engine re-sends the enroll reply and we stay put.
            (SessionState::Idle | SessionState::Enrolling, SessionEvent::AccessDenied) => {
                SessionState::Enrolling
            }
            // The panel-info announcement is the panel accepting us. It can
            // also arrive unsolicited when the panel re-enrolls a running
            // accessory, so Monitoring takes it too.
            (
                SessionState::Idle
                | SessionState::Enrolling
                | SessionState::Monitoring
                | SessionState::SettingsParsed,
                SessionEvent::PanelInfo,
            ) => SessionState::PanelInfoReceived,

            // --- Download ---
            (SessionState::PanelInfoReceived, SessionEvent::DownloadInfo) => {
                SessionState::Downloading
            }
            (SessionState::Downloading, SessionEvent::DownloadComplete) => {
                SessionState::SettingsParsed
            }

            // --- Steady state ---
            (SessionState::SettingsParsed, SessionEvent::StatusReply) => SessionState::Monitoring,

            // Everything else leaves the state alone.
            (current, event) => {
                debug!("Session ignoring {:?} in {:?}", event, current);
                current
            }
        };

        if next_state != self.current_state {
            debug!("Session {:?} -> {:?}", self.current_state, next_state);
        }
        self.current_state = next_state;
        next_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_session() -> SessionStateMachine {
        SessionStateMachine::new()
    }

    #[test]
    fn full_happy_path() {
        let mut sm = get_test_session();
        assert_eq!(sm.current_state(), SessionState::Idle);
        sm.process_event(SessionEvent::EnrollSent);
        assert_eq!(sm.current_state(), SessionState::Enrolling);
        sm.process_event(SessionEvent::PanelInfo);
        assert_eq!(sm.current_state(), SessionState::PanelInfoReceived);
        sm.process_event(SessionEvent::DownloadInfo);
        assert_eq!(sm.current_state(), SessionState::Downloading);
        sm.process_event(SessionEvent::DownloadComplete);
        assert_eq!(sm.current_state(), SessionState::SettingsParsed);
        sm.process_event(SessionEvent::StatusReply);
        assert_eq!(sm.current_state(), SessionState::Monitoring);
    }

    #[test]
    fn repeated_access_denied_never_advances_past_enrolling() {
        let mut sm = get_test_session();
        sm.process_event(SessionEvent::EnrollSent);
        for _ in 0..5 {
            sm.process_event(SessionEvent::AccessDenied);
            assert_eq!(sm.current_state(), SessionState::Enrolling);
        }
    }

    #[test]
    fn comms_failure_resets_from_any_state() {
        for state in [
            SessionState::Enrolling,
            SessionState::PanelInfoReceived,
            SessionState::Downloading,
            SessionState::SettingsParsed,
            SessionState::Monitoring,
        ] {
            let mut sm = get_test_session();
            sm.current_state = state;
            sm.process_event(SessionEvent::CommsFailure);
            assert_eq!(sm.current_state(), SessionState::Idle);
        }
    }

    #[test]
    fn stop_flushes_back_to_idle() {
        let mut sm = get_test_session();
        sm.current_state = SessionState::Downloading;
        sm.process_event(SessionEvent::PanelStop);
        assert_eq!(sm.current_state(), SessionState::Idle);
    }

    #[test]
    fn out_of_order_events_are_ignored() {
        let mut sm = get_test_session();
        sm.process_event(SessionEvent::DownloadComplete);
        assert_eq!(sm.current_state(), SessionState::Idle);
        sm.process_event(SessionEvent::StatusReply);
        assert_eq!(sm.current_state(), SessionState::Idle);
    }
}
