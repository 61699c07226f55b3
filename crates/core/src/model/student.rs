use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::StudentId;

/// Maximum length (in characters) of an institutional code.
pub const MAX_CODE_LEN: usize = 45;

/// Maximum length (in characters) of an email address.
pub const MAX_EMAIL_LEN: usize = 255;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StudentError {
    #[error("institutional code must not be empty")]
    EmptyCode,

    #[error("institutional code is too long: {len} > {max}", max = MAX_CODE_LEN)]
    CodeTooLong { len: usize },

    #[error("email must not be empty")]
    EmptyEmail,

    #[error("email is too long: {len} > {max}", max = MAX_EMAIL_LEN)]
    EmailTooLong { len: usize },
}

//
// ─── INSTITUTIONAL CODE ───────────────────────────────────────────────────────
//

/// External, human-meaningful key a student is recognized by.
///
/// Stored exactly as supplied; two codes differing only in case or
/// surrounding whitespace are different students.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstitutionalCode(String);

impl InstitutionalCode {
    /// # Errors
    ///
    /// Returns `StudentError::EmptyCode` for blank input and
    /// `StudentError::CodeTooLong` past [`MAX_CODE_LEN`] characters.
    pub fn new(raw: impl Into<String>) -> Result<Self, StudentError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(StudentError::EmptyCode);
        }
        let len = raw.chars().count();
        if len > MAX_CODE_LEN {
            return Err(StudentError::CodeTooLong { len });
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InstitutionalCode {
    type Error = StudentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InstitutionalCode> for String {
    fn from(code: InstitutionalCode) -> Self {
        code.0
    }
}

impl fmt::Display for InstitutionalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── EMAIL ────────────────────────────────────────────────────────────────────
//

/// Contact address recorded at registration. No format check beyond non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// # Errors
    ///
    /// Returns `StudentError::EmptyEmail` for blank input and
    /// `StudentError::EmailTooLong` past [`MAX_EMAIL_LEN`] characters.
    pub fn new(raw: impl Into<String>) -> Result<Self, StudentError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(StudentError::EmptyEmail);
        }
        let len = raw.chars().count();
        if len > MAX_EMAIL_LEN {
            return Err(StudentError::EmailTooLong { len });
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = StudentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── STUDENT ──────────────────────────────────────────────────────────────────
//

/// A registered student. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    id: StudentId,
    code: InstitutionalCode,
    email: Email,
    registered_at: DateTime<Utc>,
}

impl Student {
    /// Rehydrate a student from persisted storage.
    #[must_use]
    pub fn from_persisted(
        id: StudentId,
        code: InstitutionalCode,
        email: Email,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            code,
            email,
            registered_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> StudentId {
        self.id
    }

    #[must_use]
    pub fn code(&self) -> &InstitutionalCode {
        &self.code
    }

    #[must_use]
    pub fn email(&self) -> &Email {
        &self.email
    }

    #[must_use]
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }
}
