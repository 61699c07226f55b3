use std::sync::Arc;

use exam_core::model::{Email, InstitutionalCode, StudentId};
use storage::repository::{NewStudentRecord, StorageError, StudentRepository};
use tracing::{info, warn};

use crate::Clock;
use crate::error::ServiceError;

/// Resolves institutional codes to durable student identities.
#[derive(Clone)]
pub struct StudentRegistry {
    clock: Clock,
    students: Arc<dyn StudentRepository>,
}

impl StudentRegistry {
    #[must_use]
    pub fn new(clock: Clock, students: Arc<dyn StudentRepository>) -> Self {
        Self { clock, students }
    }

    /// Return the student registered under `code`, registering it with `email`
    /// if the code is unseen.
    ///
    /// For a known code the supplied email is ignored, even when it differs
    /// from the stored one.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for blank or oversized input, or when
    /// `email` already belongs to a student with another code.
    /// Returns `ServiceError::Unavailable` if storage cannot be reached.
    pub async fn get_or_create(&self, code: &str, email: &str) -> Result<StudentId, ServiceError> {
        let code = InstitutionalCode::new(code)?;
        let email = Email::new(email)?;
        let record = NewStudentRecord {
            code: code.clone(),
            email,
            registered_at: self.clock.now(),
        };

        match self.students.resolve_student(record).await {
            Ok(resolved) => {
                if resolved.created {
                    info!(student_id = %resolved.id, "student registered");
                }
                Ok(resolved.id)
            }
            Err(StorageError::ConstraintViolation(detail)) => {
                // Someone else inserted between our lookup and insert; their row wins.
                warn!(%detail, "student insert hit a uniqueness constraint, re-reading");
                match self.students.find_student_by_code(&code).await? {
                    Some(student) => Ok(student.id()),
                    None => Err(ServiceError::Validation(
                        "email already registered".to_string(),
                    )),
                }
            }
            Err(err) => Err(err.into()),
        }
    }
}
