use std::sync::Arc;

use exam_core::model::{SessionId, StudentId};
use storage::repository::Storage;

use crate::Clock;
use crate::answer_submission::AnswerSubmission;
use crate::config::ExamConfig;
use crate::error::{AppServicesError, ConfigError, ServiceError};
use crate::session_manager::SessionManager;
use crate::student_registry::StudentRegistry;

/// Identity pair returned by [`ExamServices::start_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartedSession {
    pub student_id: StudentId,
    pub session_id: SessionId,
}

/// The registry, session manager and submission service wired to one storage.
#[derive(Clone)]
pub struct ExamServices {
    registry: Arc<StudentRegistry>,
    sessions: Arc<SessionManager>,
    submissions: Arc<AnswerSubmission>,
}

impl ExamServices {
    /// # Errors
    ///
    /// Returns `ConfigError` if the submission rules in `config` are invalid.
    pub fn new(config: &ExamConfig, storage: Storage, clock: Clock) -> Result<Self, ConfigError> {
        let rules = config.batch_rules()?;
        Ok(Self {
            registry: Arc::new(StudentRegistry::new(clock, storage.students)),
            sessions: Arc::new(SessionManager::new(clock, storage.sessions, storage.answers)),
            submissions: Arc::new(AnswerSubmission::new(clock, rules, storage.submissions)),
        })
    }

    /// Open the configured `SQLite` database, provision it, and build services.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the config is invalid or the database
    /// cannot be opened or migrated.
    pub async fn connect(config: &ExamConfig, clock: Clock) -> Result<Self, AppServicesError> {
        config.validate()?;
        let storage = Storage::sqlite(&config.database_url, config.pool).await?;
        Ok(Self::new(config, storage, clock)?)
    }

    /// Resolve the student and open a new session for them.
    ///
    /// # Errors
    ///
    /// Propagates `ServiceError` from the registry or session manager.
    pub async fn start_session(
        &self,
        code: &str,
        email: &str,
    ) -> Result<StartedSession, ServiceError> {
        let student_id = self.registry.get_or_create(code, email).await?;
        let session_id = self.sessions.start(student_id).await?;
        Ok(StartedSession {
            student_id,
            session_id,
        })
    }

    #[must_use]
    pub fn registry(&self) -> Arc<StudentRegistry> {
        Arc::clone(&self.registry)
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn submissions(&self) -> Arc<AnswerSubmission> {
        Arc::clone(&self.submissions)
    }
}
