use std::time::Duration;

use super::events::{HelloData, ResumeSessionData};
use super::heartbeat::Backoff;

/// Client-side gateway session. Survives reconnects; only the server can
/// replace it (by answering a HELLO when no session is held).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub session_id: Option<String>,
    pub session_token: Option<String>,
    pub heartbeat_interval: Option<Duration>,
    pub reconnect_attempt: u32,
}

/// What the client should do after processing HELLO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelloOutcome {
    Adopted,
    Resume(ResumeSessionData),
}

impl Session {
    /// A socket opened: the throttle resets.
    pub fn opened(&mut self) {
        self.reconnect_attempt = 0;
    }

    /// A socket closed: bump the attempt counter and return the delay before
    /// the next connect.
    pub fn closed(&mut self, backoff: &Backoff) -> Duration {
        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        backoff.delay_for(self.reconnect_attempt)
    }

    /// Resume only when both halves of a prior session are held; otherwise
    /// take whatever HELLO assigned.
    pub fn hello(&mut self, hello: &HelloData) -> HelloOutcome {
        self.heartbeat_interval = Some(Duration::from_millis(hello.heartbeat_interval));
        match (&self.session_id, &self.session_token) {
            (Some(session_id), Some(session_token)) => HelloOutcome::Resume(ResumeSessionData {
                session_id: session_id.clone(),
                session_token: session_token.clone(),
            }),
            _ => {
                self.session_id = hello.session_id.clone();
                self.session_token = hello.session_token.clone();
                HelloOutcome::Adopted
            }
        }
    }

    /// SESSION_RESUMED replaces the id; the token is kept.
    pub fn resumed(&mut self, session_id: &str) {
        self.session_id = Some(session_id.to_string());
    }
}
