use std::sync::Arc;

use exam_core::model::{Answer, SessionId, StudentId, TestSession};
use storage::repository::{AnswerRepository, SessionRepository};
use tracing::info;

use crate::Clock;
use crate::error::ServiceError;

/// Opens test sessions and exposes their current state.
#[derive(Clone)]
pub struct SessionManager {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
    answers: Arc<dyn AnswerRepository>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        clock: Clock,
        sessions: Arc<dyn SessionRepository>,
        answers: Arc<dyn AnswerRepository>,
    ) -> Self {
        Self {
            clock,
            sessions,
            answers,
        }
    }

    /// Open a new session for `student_id`. Every call creates a new session.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the student does not exist.
    /// Returns `ServiceError::Unavailable` if storage cannot be reached.
    pub async fn start(&self, student_id: StudentId) -> Result<SessionId, ServiceError> {
        let session_id = self
            .sessions
            .insert_session(student_id, self.clock.now())
            .await?;
        info!(%student_id, %session_id, "session started");
        Ok(session_id)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the session does not exist.
    pub async fn session(&self, session_id: SessionId) -> Result<TestSession, ServiceError> {
        self.sessions
            .get_session(session_id)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    /// Answers recorded for the session, in submission order.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the session does not exist.
    pub async fn answers(&self, session_id: SessionId) -> Result<Vec<Answer>, ServiceError> {
        self.session(session_id).await?;
        Ok(self.answers.answers_for_session(session_id).await?)
    }
}
