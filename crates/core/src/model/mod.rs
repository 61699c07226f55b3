mod answer;
mod ids;
mod session;
mod student;

pub use answer::{
    Answer, AnswerBatch, AnswerBatchError, AnswerDraft, AnswerEntry, BatchRules, Choice,
    ChoiceAlphabet, DEFAULT_QUESTION_COUNT, MAX_QUESTION_ID_LEN, QuestionId,
};
pub use ids::{AnswerId, ParseIdError, SessionId, StudentId};
pub use session::{SessionState, SessionStateError, TestSession};
pub use student::{Email, InstitutionalCode, MAX_CODE_LEN, MAX_EMAIL_LEN, Student, StudentError};
