use exam_core::model::{InstitutionalCode, Student, StudentId};

use super::SqliteRepository;
use super::mapping::{db_err, map_student_row, row_id, student_id_from_i64};
use crate::repository::{NewStudentRecord, ResolvedStudent, StorageError, StudentRepository};

#[async_trait::async_trait]
impl StudentRepository for SqliteRepository {
    async fn find_student_by_code(
        &self,
        code: &InstitutionalCode,
    ) -> Result<Option<Student>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, institutional_code, email, registered_at
            FROM students WHERE institutional_code = ?1
            ",
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_student_row).transpose()
    }

    async fn get_student(&self, id: StudentId) -> Result<Option<Student>, StorageError> {
        let Some(id) = row_id(id.value()) else {
            return Ok(None);
        };
        let row = sqlx::query(
            r"
            SELECT id, institutional_code, email, registered_at
            FROM students WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_student_row).transpose()
    }

    async fn resolve_student(
        &self,
        student: NewStudentRecord,
    ) -> Result<ResolvedStudent, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Write first: a concurrent registrar waits on the write lock instead of
        // failing to upgrade a stale read snapshot.
        let res = sqlx::query(
            r"
            INSERT INTO students (institutional_code, email, registered_at)
            SELECT ?1, ?2, ?3
            WHERE NOT EXISTS (SELECT 1 FROM students WHERE institutional_code = ?1)
            ",
        )
        .bind(student.code.as_str())
        .bind(student.email.as_str())
        .bind(student.registered_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM students WHERE institutional_code = ?1")
            .bind(student.code.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(ResolvedStudent {
            id: student_id_from_i64(id)?,
            created: res.rows_affected() == 1,
        })
    }
}
