use chrono::{DateTime, Utc};
use exam_core::model::{SessionId, SessionState, StudentId, TestSession};

use super::SqliteRepository;
use super::mapping::{db_err, map_session_row, row_id, session_id_from_i64};
use crate::repository::{SessionRepository, StorageError};

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn insert_session(
        &self,
        student_id: StudentId,
        started_at: DateTime<Utc>,
    ) -> Result<SessionId, StorageError> {
        let student_id = row_id(student_id.value()).ok_or(StorageError::NotFound)?;
        let res = sqlx::query(
            r"
            INSERT INTO sessions (student_id, started_at, state)
            VALUES (?1, ?2, ?3)
            ",
        )
        .bind(student_id)
        .bind(started_at)
        .bind(SessionState::Started.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        session_id_from_i64(res.last_insert_rowid())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<TestSession>, StorageError> {
        let Some(id) = row_id(id.value()) else {
            return Ok(None);
        };
        let row = sqlx::query(
            r"
            SELECT id, student_id, started_at, state
            FROM sessions WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_session_row).transpose()
    }
}
