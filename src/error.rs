//! Error taxonomy for the extraction pipeline
//!
//! Three layers, matching how far a failure is allowed to travel:
//! - [`ProfileError`] aborts a profile (or one artifact kind of it)
//! - [`DecryptError`] stays inside one record
//! - [`RowError`] drops one row

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failures that abort extraction for a whole profile / artifact-kind batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("key material unavailable: {0}")]
    KeyMaterialUnavailable(String),

    #[error("master key does not match the stored key material")]
    KeyMismatch,

    #[error("master key blob is malformed")]
    MalformedCiphertext,

    #[error("profile is protected by a master password that was not supplied or is incorrect")]
    MasterPasswordRequired,

    #[error("unsupported key encoding in key database")]
    UnsupportedKeyFormat,

    #[error("unsupported cipher: {0}")]
    UnsupportedCipher(String),

    #[error("deadline exceeded before extraction started")]
    DeadlineExceeded,

    #[error("row source failed: {0}")]
    Source(String),
}

/// Failures of a single field decryption. Never escalated past the record.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DecryptError {
    #[error("key mismatch")]
    KeyMismatch,

    #[error("malformed ciphertext")]
    MalformedCiphertext,

    #[error("invalid padding")]
    PaddingInvalid,

    #[error("OS unprotect failed")]
    OsUnprotectFailed,
}

/// A row that does not have the expected column shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed row: {0}")]
pub struct RowError(pub String);

impl RowError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<rusqlite::Error> for RowError {
    fn from(e: rusqlite::Error) -> Self {
        // Column errors from rusqlite only name the column index and type.
        RowError(e.to_string())
    }
}

/// Kind tag attached to a [`crate::records::Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Decrypt(DecryptError),
    MalformedInput,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Decrypt(e) => write!(f, "{}", e),
            DiagnosticKind::MalformedInput => write!(f, "malformed input"),
        }
    }
}

pub type ProfileResult<T> = std::result::Result<T, ProfileError>;
