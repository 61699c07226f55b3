use std::sync::Arc;

use exam_core::model::{AnswerBatch, AnswerDraft, BatchRules, SessionId};
use storage::repository::SubmissionPersistence;
use tracing::{info, warn};

use crate::Clock;
use crate::error::ServiceError;

/// Acknowledgement of a finalized session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submitted {
    pub session_id: SessionId,
    pub answers_recorded: usize,
}

/// Validates answer batches and finalizes sessions with them.
///
/// A session moves `started -> finished` through exactly one successful
/// [`submit`](Self::submit); later calls are rejected with
/// `ServiceError::Conflict` and write nothing.
#[derive(Clone)]
pub struct AnswerSubmission {
    clock: Clock,
    rules: BatchRules,
    submissions: Arc<dyn SubmissionPersistence>,
}

impl AnswerSubmission {
    #[must_use]
    pub fn new(clock: Clock, rules: BatchRules, submissions: Arc<dyn SubmissionPersistence>) -> Self {
        Self {
            clock,
            rules,
            submissions,
        }
    }

    #[must_use]
    pub fn rules(&self) -> &BatchRules {
        &self.rules
    }

    /// Validate `answers` and atomically persist them, finishing the session.
    ///
    /// Validation happens before any storage access. All answers share one
    /// server timestamp.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` if the batch does not have exactly
    /// the configured number of well-formed entries.
    /// Returns `ServiceError::NotFound` if the session does not exist.
    /// Returns `ServiceError::Conflict` if the session is already finished.
    /// Returns `ServiceError::Unavailable` if storage fails; nothing is written
    /// and the session stays `started`.
    pub async fn submit(
        &self,
        session_id: SessionId,
        answers: Vec<AnswerDraft>,
    ) -> Result<Submitted, ServiceError> {
        let batch = AnswerBatch::validate(answers, &self.rules).map_err(|err| {
            warn!(%session_id, error = %err, "answer batch rejected");
            ServiceError::from(err)
        })?;

        match self
            .submissions
            .finalize_session(session_id, &batch, self.clock.now())
            .await
        {
            Ok(receipt) => {
                info!(%session_id, answers = receipt.answers_written, "session finalized");
                Ok(Submitted {
                    session_id,
                    answers_recorded: receipt.answers_written,
                })
            }
            Err(err) => {
                let err = ServiceError::from(err);
                if matches!(err, ServiceError::Conflict) {
                    info!(%session_id, "submission for an already finished session");
                } else {
                    warn!(%session_id, error = %err, "finalize failed");
                }
                Err(err)
            }
        }
    }
}
