//! Explicit default-session handling.
//!
//! Resource constructors take an optional explicit [`Session`]; when it is
//! absent they fall back to the default held by a [`SessionContext`] that the
//! caller owns and passes around. There is no process-wide state.

use crate::session::Session;
use e24_core::{Error, Result};
use tracing::debug;

/// Holds at most one default session.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    default: Option<Session>,
}

impl SessionContext {
    /// Context without a default session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose default is `session`.
    #[must_use]
    pub fn with_default(session: Session) -> Self {
        Self {
            default: Some(session),
        }
    }

    /// Make `session` the default and return the one it demotes, if any.
    pub fn set_default(&mut self, session: Session) -> Option<Session> {
        let previous = self.default.replace(session);
        if previous.is_some() {
            debug!("previous default session demoted");
        }
        previous
    }

    /// Remove and return the default session.
    pub fn clear_default(&mut self) -> Option<Session> {
        self.default.take()
    }

    /// Current default session.
    #[must_use]
    pub fn default_session(&self) -> Option<&Session> {
        self.default.as_ref()
    }

    /// True if `session` is the current default.
    #[must_use]
    pub fn is_default(&self, session: &Session) -> bool {
        self.default
            .as_ref()
            .is_some_and(|default| default.same_session(session))
    }

    /// Pick the explicit session, else the default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when neither is available.
    pub fn resolve<'a>(&'a self, explicit: Option<&'a Session>) -> Result<&'a Session> {
        explicit
            .or(self.default.as_ref())
            .ok_or_else(|| Error::ConfigError("No session set".to_string()))
    }
}
