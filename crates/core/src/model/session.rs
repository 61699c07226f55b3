use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::{SessionId, StudentId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("unknown session state: {0}")]
    Unknown(String),

    #[error("session {0} is already finished")]
    AlreadyFinished(SessionId),
}

/// Lifecycle of a test session. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Started,
    Finished,
}

impl SessionState {
    /// Storage and wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Started => "started",
            SessionState::Finished => "finished",
        }
    }

    /// # Errors
    ///
    /// Returns `SessionStateError::Unknown` for anything but `started`/`finished`.
    pub fn parse(raw: &str) -> Result<Self, SessionStateError> {
        match raw {
            "started" => Ok(SessionState::Started),
            "finished" => Ok(SessionState::Finished),
            other => Err(SessionStateError::Unknown(other.to_owned())),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt at the test by one student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSession {
    id: SessionId,
    student_id: StudentId,
    started_at: DateTime<Utc>,
    state: SessionState,
}

impl TestSession {
    /// A freshly opened session.
    #[must_use]
    pub fn started(id: SessionId, student_id: StudentId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            student_id,
            started_at,
            state: SessionState::Started,
        }
    }

    /// Rehydrate a session from persisted storage.
    #[must_use]
    pub fn from_persisted(
        id: SessionId,
        student_id: StudentId,
        started_at: DateTime<Utc>,
        state: SessionState,
    ) -> Self {
        Self {
            id,
            student_id,
            started_at,
            state,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    /// Move the session to `Finished`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::AlreadyFinished` if the session was finished
    /// before; the session is left untouched.
    pub fn finish(&mut self) -> Result<(), SessionStateError> {
        if self.is_finished() {
            return Err(SessionStateError::AlreadyFinished(self.id));
        }
        self.state = SessionState::Finished;
        Ok(())
    }
}
