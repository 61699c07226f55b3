use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::model::ids::{AnswerId, SessionId};

/// Number of questions in the standard test.
pub const DEFAULT_QUESTION_COUNT: usize = 60;

/// Maximum length (in characters) of a question identifier.
pub const MAX_QUESTION_ID_LEN: usize = 10;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerBatchError {
    #[error("expected {expected} answers, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("answer #{index}: question id must not be empty")]
    EmptyQuestionId { index: usize },

    #[error("answer #{index}: question id is too long ({len} > {max})", max = MAX_QUESTION_ID_LEN)]
    QuestionIdTooLong { index: usize, len: usize },

    #[error("answer #{index}: choice must be exactly one character, got {raw:?}")]
    InvalidChoice { index: usize, raw: String },

    #[error("answer #{index}: choice {choice:?} is not one of {allowed}")]
    ChoiceNotAllowed {
        index: usize,
        choice: char,
        allowed: String,
    },

    #[error("question count must be positive")]
    ZeroQuestionCount,
}

//
// ─── VALUE TYPES ──────────────────────────────────────────────────────────────
//

/// Opaque external question code (`"q1"`, `"A-07"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(String);

impl QuestionId {
    fn parse(index: usize, raw: String) -> Result<Self, AnswerBatchError> {
        if raw.trim().is_empty() {
            return Err(AnswerBatchError::EmptyQuestionId { index });
        }
        let len = raw.chars().count();
        if len > MAX_QUESTION_ID_LEN {
            return Err(AnswerBatchError::QuestionIdTooLong { index, len });
        }
        Ok(Self(raw))
    }

    /// Rehydrate a question id read back from storage.
    #[must_use]
    pub fn from_persisted(raw: String) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The selected option of one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Choice(char);

impl Choice {
    fn parse(index: usize, raw: &str) -> Result<Self, AnswerBatchError> {
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(Self(c)),
            _ => Err(AnswerBatchError::InvalidChoice {
                index,
                raw: raw.to_owned(),
            }),
        }
    }

    /// # Errors
    ///
    /// Returns `AnswerBatchError::InvalidChoice` unless `raw` is exactly one
    /// character.
    pub fn from_persisted(raw: &str) -> Result<Self, AnswerBatchError> {
        Self::parse(0, raw)
    }

    #[must_use]
    pub fn as_char(self) -> char {
        self.0
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional restriction on which characters count as a valid choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceAlphabet(BTreeSet<char>);

impl ChoiceAlphabet {
    /// Build an alphabet from every character of `letters` (e.g. `"ABCDE"`).
    #[must_use]
    pub fn new(letters: &str) -> Self {
        Self(letters.chars().filter(|c| !c.is_whitespace()).collect())
    }

    #[must_use]
    pub fn contains(&self, choice: Choice) -> bool {
        self.0.contains(&choice.0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ChoiceAlphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.0 {
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

//
// ─── BATCH ────────────────────────────────────────────────────────────────────
//

/// One unvalidated `{questionId, choice}` pair as received from a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDraft {
    pub question_id: String,
    pub choice: String,
}

impl AnswerDraft {
    #[must_use]
    pub fn new(question_id: impl Into<String>, choice: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            choice: choice.into(),
        }
    }
}

/// A validated answer entry ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerEntry {
    pub question_id: QuestionId,
    pub choice: Choice,
}

/// Rules a batch must satisfy before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRules {
    question_count: usize,
    alphabet: Option<ChoiceAlphabet>,
}

impl BatchRules {
    /// # Errors
    ///
    /// Returns `AnswerBatchError::ZeroQuestionCount` when `question_count` is 0.
    pub fn new(
        question_count: usize,
        alphabet: Option<ChoiceAlphabet>,
    ) -> Result<Self, AnswerBatchError> {
        if question_count == 0 {
            return Err(AnswerBatchError::ZeroQuestionCount);
        }
        Ok(Self {
            question_count,
            alphabet: alphabet.filter(|a| !a.is_empty()),
        })
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.question_count
    }

    #[must_use]
    pub fn alphabet(&self) -> Option<&ChoiceAlphabet> {
        self.alphabet.as_ref()
    }
}

impl Default for BatchRules {
    fn default() -> Self {
        Self {
            question_count: DEFAULT_QUESTION_COUNT,
            alphabet: None,
        }
    }
}

/// A complete, validated set of answers that finalizes a session.
///
/// Order is preserved; duplicate question ids are kept as sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerBatch {
    entries: Vec<AnswerEntry>,
}

impl AnswerBatch {
    /// Validate `drafts` against `rules`. The length check runs first.
    ///
    /// # Errors
    ///
    /// Returns the first `AnswerBatchError` found.
    pub fn validate(drafts: Vec<AnswerDraft>, rules: &BatchRules) -> Result<Self, AnswerBatchError> {
        if drafts.len() != rules.question_count {
            return Err(AnswerBatchError::WrongLength {
                expected: rules.question_count,
                actual: drafts.len(),
            });
        }

        let mut entries = Vec::with_capacity(drafts.len());
        for (index, draft) in drafts.into_iter().enumerate() {
            let question_id = QuestionId::parse(index, draft.question_id)?;
            let choice = Choice::parse(index, &draft.choice)?;
            if let Some(alphabet) = &rules.alphabet {
                if !alphabet.contains(choice) {
                    return Err(AnswerBatchError::ChoiceNotAllowed {
                        index,
                        choice: choice.as_char(),
                        allowed: alphabet.to_string(),
                    });
                }
            }
            entries.push(AnswerEntry {
                question_id,
                choice,
            });
        }

        Ok(Self { entries })
    }

    #[must_use]
    pub fn entries(&self) -> &[AnswerEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//
// ─── PERSISTED ANSWER ─────────────────────────────────────────────────────────
//

/// An answer row as recorded by a finalize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub id: AnswerId,
    pub session_id: SessionId,
    pub question_id: QuestionId,
    pub choice: Choice,
    pub answered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drafts(n: usize, choice: &str) -> Vec<AnswerDraft> {
        (1..=n).map(|i| AnswerDraft::new(format!("q{i}"), choice)).collect()
    }

    #[test]
    fn accepts_full_batch_in_order() {
        let batch = AnswerBatch::validate(drafts(60, "A"), &BatchRules::default()).unwrap();
        assert_eq!(batch.len(), 60);
        assert_eq!(batch.entries()[0].question_id.as_str(), "q1");
        assert_eq!(batch.entries()[59].question_id.as_str(), "q60");
        assert_eq!(batch.entries()[0].choice.as_char(), 'A');
    }

    #[test]
    fn length_is_checked_before_entries() {
        let mut short = drafts(59, "A");
        short[0].question_id.clear();
        let err = AnswerBatch::validate(short, &BatchRules::default()).unwrap_err();
        assert_eq!(
            err,
            AnswerBatchError::WrongLength {
                expected: 60,
                actual: 59
            }
        );

        let err = AnswerBatch::validate(drafts(61, "A"), &BatchRules::default()).unwrap_err();
        assert!(matches!(err, AnswerBatchError::WrongLength { actual: 61, .. }));
    }

    #[test]
    fn rejects_malformed_entries() {
        let rules = BatchRules::new(2, None).unwrap();

        let err = AnswerBatch::validate(
            vec![AnswerDraft::new("q1", "A"), AnswerDraft::new("q2", "AB")],
            &rules,
        )
        .unwrap_err();
        assert!(matches!(err, AnswerBatchError::InvalidChoice { index: 1, .. }));

        let err = AnswerBatch::validate(
            vec![AnswerDraft::new("q1", ""), AnswerDraft::new("q2", "A")],
            &rules,
        )
        .unwrap_err();
        assert!(matches!(err, AnswerBatchError::InvalidChoice { index: 0, .. }));

        let err = AnswerBatch::validate(
            vec![AnswerDraft::new("q1", "A"), AnswerDraft::new("q-too-long-id", "A")],
            &rules,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AnswerBatchError::QuestionIdTooLong { index: 1, len: 13 }
        ));
    }

    #[test]
    fn choice_is_pass_through_without_alphabet() {
        let rules = BatchRules::new(3, None).unwrap();
        let batch = AnswerBatch::validate(
            vec![
                AnswerDraft::new("q1", "z"),
                AnswerDraft::new("q2", " "),
                AnswerDraft::new("q3", "é"),
            ],
            &rules,
        )
        .unwrap();
        let choices: Vec<char> = batch.entries().iter().map(|e| e.choice.as_char()).collect();
        assert_eq!(choices, vec!['z', ' ', 'é']);
    }

    #[test]
    fn alphabet_restricts_choices() {
        let rules = BatchRules::new(2, Some(ChoiceAlphabet::new("ABCDE"))).unwrap();
        assert!(
            AnswerBatch::validate(
                vec![AnswerDraft::new("q1", "A"), AnswerDraft::new("q2", "E")],
                &rules
            )
            .is_ok()
        );

        let err = AnswerBatch::validate(
            vec![AnswerDraft::new("q1", "A"), AnswerDraft::new("q2", "F")],
            &rules,
        )
        .unwrap_err();
        assert_eq!(
            err,
            AnswerBatchError::ChoiceNotAllowed {
                index: 1,
                choice: 'F',
                allowed: "ABCDE".into()
            }
        );
    }

    #[test]
    fn duplicates_are_kept() {
        let rules = BatchRules::new(2, None).unwrap();
        let batch = AnswerBatch::validate(
            vec![AnswerDraft::new("q1", "A"), AnswerDraft::new("q1", "B")],
            &rules,
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn zero_question_count_is_rejected() {
        assert_eq!(
            BatchRules::new(0, None),
            Err(AnswerBatchError::ZeroQuestionCount)
        );
    }

    #[test]
    fn draft_uses_camel_case_on_the_wire() {
        let draft: AnswerDraft =
            serde_json::from_str(r#"{"questionId":"q1","choice":"A"}"#).unwrap();
        assert_eq!(draft, AnswerDraft::new("q1", "A"));
    }
}
