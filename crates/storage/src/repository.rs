use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::model::{
    Answer, AnswerBatch, AnswerId, Email, InstitutionalCode, SessionId, Student, StudentId,
    TestSession,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// The row exists but is not in a state that allows the write.
    #[error("conflict")]
    Conflict,

    /// A uniqueness constraint rejected an insert.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Input for registering a student that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewStudentRecord {
    pub code: InstitutionalCode,
    pub email: Email,
    pub registered_at: DateTime<Utc>,
}

/// Result of a lookup-or-insert on the students table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedStudent {
    pub id: StudentId,
    pub created: bool,
}

/// Acknowledgement of a committed finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeReceipt {
    pub session_id: SessionId,
    pub answers_written: usize,
}

#[async_trait]
pub trait StudentRepository: Send + Sync {
    /// Fetch a student by institutional code.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn find_student_by_code(
        &self,
        code: &InstitutionalCode,
    ) -> Result<Option<Student>, StorageError>;

    /// Fetch a student by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_student(&self, id: StudentId) -> Result<Option<Student>, StorageError>;

    /// Look the student up by code and insert it if absent, in one transaction.
    ///
    /// An existing student is returned as-is; the supplied email is not compared.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConstraintViolation` if the insert collides with
    /// another student's email, or with a row a concurrent caller just wrote.
    async fn resolve_student(
        &self,
        student: NewStudentRecord,
    ) -> Result<ResolvedStudent, StorageError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Open a session in state `started`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the student does not exist.
    async fn insert_session(
        &self,
        student_id: StudentId,
        started_at: DateTime<Utc>,
    ) -> Result<SessionId, StorageError>;

    /// Fetch a session by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_session(&self, id: SessionId) -> Result<Option<TestSession>, StorageError>;
}

#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Answers recorded for a session, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn answers_for_session(&self, session_id: SessionId)
    -> Result<Vec<Answer>, StorageError>;
}

/// Atomic finalize of a session with its answer batch.
#[async_trait]
pub trait SubmissionPersistence: Send + Sync {
    /// Mark the session finished and record every answer of `batch`, or
    /// change nothing at all.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session does not exist,
    /// `StorageError::Conflict` if it is already finished, or another
    /// `StorageError` if the transaction could not be committed.
    async fn finalize_session(
        &self,
        session_id: SessionId,
        batch: &AnswerBatch,
        answered_at: DateTime<Utc>,
    ) -> Result<FinalizeReceipt, StorageError>;
}

#[derive(Default)]
struct MemoryTables {
    students: BTreeMap<StudentId, Student>,
    sessions: BTreeMap<SessionId, TestSession>,
    answers: Vec<Answer>,
    next_student: u64,
    next_session: u64,
    next_answer: u64,
}

impl MemoryTables {
    fn next_id(counter: &mut u64) -> u64 {
        *counter += 1;
        *counter
    }
}

/// In-memory repository for tests and prototyping.
///
/// Every operation holds a single lock over all tables, so each call is
/// atomic with respect to the others.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tables: Arc<Mutex<MemoryTables>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryTables>, StorageError> {
        self.tables
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl StudentRepository for InMemoryRepository {
    async fn find_student_by_code(
        &self,
        code: &InstitutionalCode,
    ) -> Result<Option<Student>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.students.values().find(|s| s.code() == code).cloned())
    }

    async fn get_student(&self, id: StudentId) -> Result<Option<Student>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.students.get(&id).cloned())
    }

    async fn resolve_student(
        &self,
        student: NewStudentRecord,
    ) -> Result<ResolvedStudent, StorageError> {
        let mut guard = self.lock()?;
        if let Some(existing) = guard.students.values().find(|s| s.code() == &student.code) {
            return Ok(ResolvedStudent {
                id: existing.id(),
                created: false,
            });
        }
        if guard.students.values().any(|s| s.email() == &student.email) {
            return Err(StorageError::ConstraintViolation("students.email".into()));
        }

        let id = StudentId::new(MemoryTables::next_id(&mut guard.next_student));
        guard.students.insert(
            id,
            Student::from_persisted(id, student.code, student.email, student.registered_at),
        );
        Ok(ResolvedStudent { id, created: true })
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn insert_session(
        &self,
        student_id: StudentId,
        started_at: DateTime<Utc>,
    ) -> Result<SessionId, StorageError> {
        let mut guard = self.lock()?;
        if !guard.students.contains_key(&student_id) {
            return Err(StorageError::NotFound);
        }
        let id = SessionId::new(MemoryTables::next_id(&mut guard.next_session));
        guard
            .sessions
            .insert(id, TestSession::started(id, student_id, started_at));
        Ok(id)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<TestSession>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.sessions.get(&id).cloned())
    }
}

#[async_trait]
impl AnswerRepository for InMemoryRepository {
    async fn answers_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Answer>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .answers
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SubmissionPersistence for InMemoryRepository {
    async fn finalize_session(
        &self,
        session_id: SessionId,
        batch: &AnswerBatch,
        answered_at: DateTime<Utc>,
    ) -> Result<FinalizeReceipt, StorageError> {
        let mut guard = self.lock()?;
        let tables = &mut *guard;
        let session = tables
            .sessions
            .get_mut(&session_id)
            .ok_or(StorageError::NotFound)?;
        session.finish().map_err(|_| StorageError::Conflict)?;

        for entry in batch.entries() {
            let id = AnswerId::new(MemoryTables::next_id(&mut tables.next_answer));
            tables.answers.push(Answer {
                id,
                session_id,
                question_id: entry.question_id.clone(),
                choice: entry.choice,
                answered_at,
            });
        }

        Ok(FinalizeReceipt {
            session_id,
            answers_written: batch.len(),
        })
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub students: Arc<dyn StudentRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub answers: Arc<dyn AnswerRepository>,
    pub submissions: Arc<dyn SubmissionPersistence>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_backend(InMemoryRepository::new())
    }

    /// Wire every repository to one backend value.
    #[must_use]
    pub fn from_backend<R>(repo: R) -> Self
    where
        R: StudentRepository
            + SessionRepository
            + AnswerRepository
            + SubmissionPersistence
            + Clone
            + 'static,
    {
        Self {
            students: Arc::new(repo.clone()),
            sessions: Arc::new(repo.clone()),
            answers: Arc::new(repo.clone()),
            submissions: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{AnswerDraft, BatchRules, SessionState};
    use exam_core::time::fixed_now;

    fn new_student(code: &str, email: &str) -> NewStudentRecord {
        NewStudentRecord {
            code: InstitutionalCode::new(code).unwrap(),
            email: Email::new(email).unwrap(),
            registered_at: fixed_now(),
        }
    }

    fn batch(n: usize) -> AnswerBatch {
        let drafts = (1..=n)
            .map(|i| AnswerDraft::new(format!("q{i}"), "A"))
            .collect();
        AnswerBatch::validate(drafts, &BatchRules::new(n, None).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn resolve_returns_existing_student_and_ignores_email() {
        let repo = InMemoryRepository::new();
        let first = repo
            .resolve_student(new_student("ABC123", "a@x.com"))
            .await
            .unwrap();
        assert!(first.created);

        let again = repo
            .resolve_student(new_student("ABC123", "other@x.com"))
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert!(!again.created);

        let stored = repo.get_student(first.id).await.unwrap().unwrap();
        assert_eq!(stored.email().as_str(), "a@x.com");
    }

    #[tokio::test]
    async fn resolve_rejects_email_owned_by_other_code() {
        let repo = InMemoryRepository::new();
        repo.resolve_student(new_student("ABC123", "a@x.com"))
            .await
            .unwrap();
        let err = repo
            .resolve_student(new_student("XYZ999", "a@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn session_requires_student() {
        let repo = InMemoryRepository::new();
        let err = repo
            .insert_session(StudentId::new(42), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn finalize_happens_once() {
        let repo = InMemoryRepository::new();
        let student = repo
            .resolve_student(new_student("ABC123", "a@x.com"))
            .await
            .unwrap();
        let session_id = repo.insert_session(student.id, fixed_now()).await.unwrap();

        let receipt = repo
            .finalize_session(session_id, &batch(3), fixed_now())
            .await
            .unwrap();
        assert_eq!(receipt.answers_written, 3);

        let err = repo
            .finalize_session(session_id, &batch(3), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        let session = repo.get_session(session_id).await.unwrap().unwrap();
        assert_eq!(session.state(), SessionState::Finished);
        assert_eq!(repo.answers_for_session(session_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn finalize_unknown_session_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo
            .finalize_session(SessionId::new(9), &batch(1), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }
}
