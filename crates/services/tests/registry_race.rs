use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use exam_core::model::{InstitutionalCode, Student, StudentId};
use exam_core::time::fixed_clock;
use services::{ExamConfig, ExamServices, StudentRegistry};
use storage::repository::{
    InMemoryRepository, NewStudentRecord, ResolvedStudent, StorageError, StudentRepository,
};
use storage::sqlite::PoolSettings;

/// Lets a competing request register the code right before our insert lands.
struct LosesInsertRace {
    inner: InMemoryRepository,
    raced: AtomicBool,
}

#[async_trait]
impl StudentRepository for LosesInsertRace {
    async fn find_student_by_code(
        &self,
        code: &InstitutionalCode,
    ) -> Result<Option<Student>, StorageError> {
        self.inner.find_student_by_code(code).await
    }

    async fn get_student(&self, id: StudentId) -> Result<Option<Student>, StorageError> {
        self.inner.get_student(id).await
    }

    async fn resolve_student(
        &self,
        student: NewStudentRecord,
    ) -> Result<ResolvedStudent, StorageError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.resolve_student(student).await?;
            return Err(StorageError::ConstraintViolation(
                "UNIQUE constraint failed: students.institutional_code".into(),
            ));
        }
        self.inner.resolve_student(student).await
    }
}

#[tokio::test]
async fn lost_insert_race_resolves_to_the_winner() {
    let inner = InMemoryRepository::new();
    let repo = Arc::new(LosesInsertRace {
        inner: inner.clone(),
        raced: AtomicBool::new(false),
    });
    let registry = StudentRegistry::new(fixed_clock(), repo);

    let id = registry.get_or_create("ABC123", "a@x.com").await.unwrap();

    let winner = inner
        .find_student_by_code(&InstitutionalCode::new("ABC123").unwrap())
        .await
        .unwrap()
        .expect("winner row");
    assert_eq!(id, winner.id());

    let again = registry.get_or_create("ABC123", "a@x.com").await.unwrap();
    assert_eq!(again, id);
}

#[tokio::test]
async fn concurrent_registrations_share_one_student() {
    let repo = Arc::new(InMemoryRepository::new());
    let registry = StudentRegistry::new(fixed_clock(), repo.clone());

    let mut handles = Vec::new();
    for i in 0..8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry
                .get_or_create("ABC123", &format!("user{i}@x.com"))
                .await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert!(repo.get_student(ids[0]).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_on_sqlite_never_surface_storage_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = ExamConfig {
        database_url: format!("sqlite://{}?mode=rwc", dir.path().join("exam.db").display()),
        pool: PoolSettings {
            max_connections: 8,
            ..PoolSettings::default()
        },
        ..ExamConfig::default()
    };
    let svc = ExamServices::connect(&config, fixed_clock()).await.unwrap();

    for round in 0..10 {
        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = svc.registry();
            handles.push(tokio::spawn(async move {
                registry
                    .get_or_create(&format!("CODE{round}"), &format!("u{round}_{i}@x.com"))
                    .await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(id) => ids.push(id),
                Err(err) => panic!("round {round}: {} ({err})", err.code()),
            }
        }
        ids.dedup();
        assert_eq!(ids.len(), 1, "round {round} produced several students");
    }
}
