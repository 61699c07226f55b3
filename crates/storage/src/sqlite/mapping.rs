use exam_core::model::{
    Answer, AnswerId, Choice, Email, InstitutionalCode, QuestionId, SessionId, SessionState,
    Student, StudentId, TestSession,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Classify a driver error: constraint failures keep their meaning, anything
/// else is treated as the database being unreachable.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::ConstraintViolation(db.message().to_owned())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::NotFound,
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => ser(e),
        _ => StorageError::Connection(e.to_string()),
    }
}

/// Rowids are signed; an id past `i64::MAX` cannot name any stored row.
pub(crate) fn row_id(v: u64) -> Option<i64> {
    i64::try_from(v).ok()
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn student_id_from_i64(v: i64) -> Result<StudentId, StorageError> {
    Ok(StudentId::new(i64_to_u64("student_id", v)?))
}

pub(crate) fn session_id_from_i64(v: i64) -> Result<SessionId, StorageError> {
    Ok(SessionId::new(i64_to_u64("session_id", v)?))
}

pub(crate) fn map_student_row(row: &SqliteRow) -> Result<Student, StorageError> {
    let code = InstitutionalCode::new(row.try_get::<String, _>("institutional_code").map_err(ser)?)
        .map_err(ser)?;
    let email = Email::new(row.try_get::<String, _>("email").map_err(ser)?).map_err(ser)?;
    Ok(Student::from_persisted(
        student_id_from_i64(row.try_get("id").map_err(ser)?)?,
        code,
        email,
        row.try_get("registered_at").map_err(ser)?,
    ))
}

pub(crate) fn map_session_row(row: &SqliteRow) -> Result<TestSession, StorageError> {
    let state: String = row.try_get("state").map_err(ser)?;
    Ok(TestSession::from_persisted(
        session_id_from_i64(row.try_get("id").map_err(ser)?)?,
        student_id_from_i64(row.try_get("student_id").map_err(ser)?)?,
        row.try_get("started_at").map_err(ser)?,
        SessionState::parse(&state).map_err(ser)?,
    ))
}

pub(crate) fn map_answer_row(row: &SqliteRow) -> Result<Answer, StorageError> {
    let choice: String = row.try_get("choice").map_err(ser)?;
    Ok(Answer {
        id: AnswerId::new(i64_to_u64("answer_id", row.try_get("id").map_err(ser)?)?),
        session_id: session_id_from_i64(row.try_get("session_id").map_err(ser)?)?,
        question_id: QuestionId::from_persisted(row.try_get("question_id").map_err(ser)?),
        choice: Choice::from_persisted(&choice).map_err(ser)?,
        answered_at: row.try_get("answered_at").map_err(ser)?,
    })
}
