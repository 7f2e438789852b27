//! Normalized artifact records
//!
//! Plain value objects handed to exporters. Secret fields are empty when
//! decryption failed; the matching [`Diagnostic`] says why.

use crate::browsers::ArtifactKind;
use crate::error::DiagnosticKind;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginCredential {
    pub url: String,
    pub username: String,
    pub password: String,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CookieRecord {
    pub host: String,
    pub path: String,
    pub name: String,
    pub value: String,
    pub is_secure: bool,
    pub is_http_only: bool,
    pub has_expire: bool,
    pub is_persistent: bool,
    pub created: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub url: String,
    pub title: String,
    pub visit_count: i64,
    pub last_visit: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadEntry {
    pub target_path: String,
    pub url: String,
    pub total_bytes: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditCard {
    pub guid: String,
    pub name: String,
    pub expiration_month: String,
    pub expiration_year: String,
    pub card_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookmarkNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub url: String,
    pub date_added: Option<DateTime<Utc>>,
}

/// Why a row lost a field (or was skipped). Carries no secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// zero-based position in fetch order
    pub row: usize,
    /// host/url/guid of the row, when one was readable
    pub identifier: Option<String>,
    pub field: String,
    pub kind: DiagnosticKind,
}

/// Output of one decoder: records in row order plus the side-channel log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assembled<R> {
    pub records: Vec<R>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<R> Default for Assembled<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

/// Records of any kind, as returned through the decoder registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Records {
    Logins(Vec<LoginCredential>),
    Cookies(Vec<CookieRecord>),
    History(Vec<HistoryEntry>),
    Downloads(Vec<DownloadEntry>),
    CreditCards(Vec<CreditCard>),
    Bookmarks(Vec<BookmarkNode>),
}

impl Records {
    pub fn len(&self) -> usize {
        match self {
            Records::Logins(v) => v.len(),
            Records::Cookies(v) => v.len(),
            Records::History(v) => v.len(),
            Records::Downloads(v) => v.len(),
            Records::CreditCards(v) => v.len(),
            Records::Bookmarks(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ArtifactKind {
        match self {
            Records::Logins(_) => ArtifactKind::Login,
            Records::Cookies(_) => ArtifactKind::Cookie,
            Records::History(_) => ArtifactKind::History,
            Records::Downloads(_) => ArtifactKind::Download,
            Records::CreditCards(_) => ArtifactKind::CreditCard,
            Records::Bookmarks(_) => ArtifactKind::Bookmark,
        }
    }
}

/// Result of extracting one artifact kind from one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub kind: ArtifactKind,
    pub records: Records,
    pub diagnostics: Vec<Diagnostic>,
}

impl Extraction {
    pub fn new<R>(assembled: Assembled<R>, wrap: fn(Vec<R>) -> Records) -> Self {
        let records = wrap(assembled.records);
        Self {
            kind: records.kind(),
            records,
            diagnostics: assembled.diagnostics,
        }
    }
}
