use chrono::{DateTime, Utc};
use exam_core::model::{Answer, AnswerBatch, SessionId, SessionState};

use super::SqliteRepository;
use super::mapping::{db_err, map_answer_row, row_id};
use crate::repository::{AnswerRepository, FinalizeReceipt, StorageError, SubmissionPersistence};

#[async_trait::async_trait]
impl AnswerRepository for SqliteRepository {
    async fn answers_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Answer>, StorageError> {
        let Some(id) = row_id(session_id.value()) else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(
            r"
            SELECT id, session_id, question_id, choice, answered_at
            FROM answers
            WHERE session_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_answer_row(&row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl SubmissionPersistence for SqliteRepository {
    async fn finalize_session(
        &self,
        session_id: SessionId,
        batch: &AnswerBatch,
        answered_at: DateTime<Utc>,
    ) -> Result<FinalizeReceipt, StorageError> {
        let id = row_id(session_id.value()).ok_or(StorageError::NotFound)?;

        // Dropping `tx` on any early return rolls the whole finalize back.
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // The guarded update is the first statement so that a second finalizer
        // blocks on the write lock and then sees zero affected rows.
        let res = sqlx::query(
            r"
            UPDATE sessions SET state = ?1
            WHERE id = ?2 AND state = ?3
            ",
        )
        .bind(SessionState::Finished.as_str())
        .bind(id)
        .bind(SessionState::Started.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM sessions WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
            return Err(if exists.is_some() {
                StorageError::Conflict
            } else {
                StorageError::NotFound
            });
        }

        for entry in batch.entries() {
            sqlx::query(
                r"
                INSERT INTO answers (session_id, question_id, choice, answered_at)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(id)
            .bind(entry.question_id.as_str())
            .bind(entry.choice.to_string())
            .bind(answered_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        tracing::debug!(%session_id, answers = batch.len(), "finalize committed");

        Ok(FinalizeReceipt {
            session_id,
            answers_written: batch.len(),
        })
    }
}
