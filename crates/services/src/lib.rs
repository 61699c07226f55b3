#![forbid(unsafe_code)]

pub mod answer_submission;
pub mod api;
pub mod app_services;
pub mod config;
pub mod error;
pub mod session_manager;
pub mod student_registry;

pub use exam_core::Clock;

pub use answer_submission::{AnswerSubmission, Submitted};
pub use app_services::{ExamServices, StartedSession};
pub use config::{ExamConfig, LogFormat};
pub use error::{AppServicesError, ConfigError, ServiceError};
pub use session_manager::SessionManager;
pub use student_registry::StudentRegistry;
