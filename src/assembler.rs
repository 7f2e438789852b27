//! Row to record assembly
//!
//! Decoders are pure: rows in, [`Assembled`] out. A field that fails to
//! decrypt is left empty and logged as a [`Diagnostic`]; a row that failed to
//! read is skipped with a `MalformedInput` diagnostic. Neither stops the batch.

use crate::bookmarks::{gecko_type_name, WebkitBookmarkRow};
use crate::browsers::Family;
use crate::error::{DecryptError, DiagnosticKind, RowError};
use crate::field::FieldDecryptor;
use crate::master_key::ResolvedKey;
use crate::records::{
    Assembled, BookmarkNode, CookieRecord, CreditCard, Diagnostic, DownloadEntry, HistoryEntry, LoginCredential,
};
use crate::rows::{
    GeckoBookmarkRow, GeckoCookieRow, GeckoDownloadRow, GeckoHistoryRow, GeckoLoginRow, WebkitCardRow,
    WebkitCookieRow, WebkitDownloadRow, WebkitHistoryRow, WebkitLoginRow,
};
use crate::time_convert::{normalize, TimeColumn};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Everything a decoder needs besides the rows.
#[derive(Clone, Copy)]
pub struct DecodeContext<'a> {
    pub family: Family,
    pub key: &'a ResolvedKey,
    pub fields: FieldDecryptor<'a>,
}

impl<'a> DecodeContext<'a> {
    pub fn new(family: Family, key: &'a ResolvedKey, fields: FieldDecryptor<'a>) -> Self {
        Self { family, key, fields }
    }
}

/// Per-row view used while building one record.
pub struct RowScope<'s, 'a> {
    ctx: &'s DecodeContext<'a>,
    row: usize,
    identifier: String,
    diagnostics: &'s mut Vec<Diagnostic>,
}

impl RowScope<'_, '_> {
    /// Decrypt a secret column; empty string plus a diagnostic on failure.
    pub fn secret(&mut self, field: &str, ciphertext: &[u8]) -> String {
        match self.ctx.fields.decrypt(self.ctx.family, self.ctx.key, ciphertext) {
            Ok(plain) => plain,
            Err(e) => self.failed(field, e),
        }
    }

    /// Like [`RowScope::secret`] for a ciphertext that may already have failed to decode.
    pub fn encoded_secret(&mut self, field: &str, ciphertext: &Result<Vec<u8>, DecryptError>) -> String {
        match ciphertext {
            Ok(ct) => self.secret(field, ct),
            Err(e) => self.failed(field, *e),
        }
    }

    fn failed(&mut self, field: &str, e: DecryptError) -> String {
        debug!(row = self.row, field, kind = %e, "Field decryption failed");
        self.diagnostics.push(Diagnostic {
            row: self.row,
            identifier: Some(self.identifier.clone()),
            field: field.to_string(),
            kind: DiagnosticKind::Decrypt(e),
        });
        String::new()
    }

    pub fn time(&self, column: TimeColumn, raw: i64) -> Option<DateTime<Utc>> {
        normalize(self.ctx.family, column, raw)
    }
}

fn assemble<T, R>(
    ctx: &DecodeContext<'_>,
    rows: impl IntoIterator<Item = Result<T, RowError>>,
    identify: fn(&T) -> String,
    mut build: impl FnMut(T, &mut RowScope<'_, '_>) -> R,
) -> Assembled<R> {
    let mut out = Assembled::default();
    for (idx, row) in rows.into_iter().enumerate() {
        match row {
            Ok(row) => {
                let mut scope = RowScope {
                    ctx,
                    row: idx,
                    identifier: identify(&row),
                    diagnostics: &mut out.diagnostics,
                };
                let record = build(row, &mut scope);
                out.records.push(record);
            }
            Err(e) => {
                debug!(row = idx, "Skipping malformed row: {}", e);
                out.diagnostics.push(Diagnostic {
                    row: idx,
                    identifier: None,
                    field: "row".to_string(),
                    kind: DiagnosticKind::MalformedInput,
                });
            }
        }
    }
    out
}

pub fn decode_webkit_logins(
    ctx: &DecodeContext<'_>,
    rows: impl IntoIterator<Item = Result<WebkitLoginRow, RowError>>,
) -> Assembled<LoginCredential> {
    assemble(ctx, rows, |r| r.origin_url.clone(), |row, s| LoginCredential {
        password: s.secret("password", &row.password),
        created: s.time(TimeColumn::LoginCreated, row.date_created),
        url: row.origin_url,
        username: row.username,
    })
}

pub fn decode_webkit_cookies(
    ctx: &DecodeContext<'_>,
    rows: impl IntoIterator<Item = Result<WebkitCookieRow, RowError>>,
) -> Assembled<CookieRecord> {
    assemble(ctx, rows, |r| r.host.clone(), |row, s| CookieRecord {
        value: s.secret("value", &row.encrypted_value),
        created: s.time(TimeColumn::CookieCreated, row.creation_utc),
        expires: s.time(TimeColumn::CookieExpires, row.expires_utc),
        host: row.host,
        path: row.path,
        name: row.name,
        is_secure: row.is_secure,
        is_http_only: row.is_http_only,
        has_expire: row.has_expires,
        is_persistent: row.is_persistent,
    })
}

pub fn decode_webkit_history(
    ctx: &DecodeContext<'_>,
    rows: impl IntoIterator<Item = Result<WebkitHistoryRow, RowError>>,
) -> Assembled<HistoryEntry> {
    assemble(ctx, rows, |r| r.url.clone(), |row, s| HistoryEntry {
        last_visit: s.time(TimeColumn::LastVisit, row.last_visit_time),
        url: row.url,
        title: row.title,
        visit_count: row.visit_count,
    })
}

pub fn decode_webkit_downloads(
    ctx: &DecodeContext<'_>,
    rows: impl IntoIterator<Item = Result<WebkitDownloadRow, RowError>>,
) -> Assembled<DownloadEntry> {
    assemble(ctx, rows, |r| r.tab_url.clone(), |row, s| DownloadEntry {
        start_time: s.time(TimeColumn::DownloadStart, row.start_time),
        end_time: s.time(TimeColumn::DownloadEnd, row.end_time),
        target_path: row.target_path,
        url: row.tab_url,
        total_bytes: row.total_bytes,
        mime_type: row.mime_type,
    })
}

pub fn decode_webkit_cards(
    ctx: &DecodeContext<'_>,
    rows: impl IntoIterator<Item = Result<WebkitCardRow, RowError>>,
) -> Assembled<CreditCard> {
    assemble(ctx, rows, |r| r.guid.clone(), |row, s| CreditCard {
        card_number: s.secret("card_number", &row.card_number),
        guid: row.guid,
        name: row.name_on_card,
        expiration_month: row.expiration_month,
        expiration_year: row.expiration_year,
    })
}

pub fn decode_webkit_bookmarks(
    ctx: &DecodeContext<'_>,
    rows: impl IntoIterator<Item = Result<WebkitBookmarkRow, RowError>>,
) -> Assembled<BookmarkNode> {
    assemble(ctx, rows, |r| r.id.to_string(), |row, s| BookmarkNode {
        date_added: s.time(TimeColumn::BookmarkAdded, row.date_added),
        id: row.id,
        parent_id: row.parent_id,
        name: row.name,
        node_type: row.node_type,
        url: row.url,
    })
}

pub fn decode_gecko_logins(
    ctx: &DecodeContext<'_>,
    rows: impl IntoIterator<Item = Result<GeckoLoginRow, RowError>>,
) -> Assembled<LoginCredential> {
    assemble(ctx, rows, |r| r.hostname.clone(), |row, s| LoginCredential {
        username: s.encoded_secret("username", &row.encrypted_username),
        password: s.encoded_secret("password", &row.encrypted_password),
        created: s.time(TimeColumn::LoginCreated, row.time_created),
        url: row.hostname,
    })
}

pub fn decode_gecko_cookies(
    ctx: &DecodeContext<'_>,
    rows: impl IntoIterator<Item = Result<GeckoCookieRow, RowError>>,
) -> Assembled<CookieRecord> {
    assemble(ctx, rows, |r| r.host.clone(), |row, s| CookieRecord {
        created: s.time(TimeColumn::CookieCreated, row.creation_time),
        expires: s.time(TimeColumn::CookieExpires, row.expiry),
        has_expire: row.expiry > 0,
        is_persistent: row.expiry > 0,
        host: row.host,
        path: row.path,
        name: row.name,
        value: row.value,
        is_secure: row.is_secure,
        is_http_only: row.is_http_only,
    })
}

pub fn decode_gecko_history(
    ctx: &DecodeContext<'_>,
    rows: impl IntoIterator<Item = Result<GeckoHistoryRow, RowError>>,
) -> Assembled<HistoryEntry> {
    assemble(ctx, rows, |r| r.url.clone(), |row, s| HistoryEntry {
        last_visit: s.time(TimeColumn::LastVisit, row.last_visit_date),
        url: row.url,
        title: row.title,
        visit_count: row.visit_count,
    })
}

pub fn decode_gecko_downloads(
    ctx: &DecodeContext<'_>,
    rows: impl IntoIterator<Item = Result<GeckoDownloadRow, RowError>>,
) -> Assembled<DownloadEntry> {
    assemble(ctx, rows, |r| r.url.clone(), |row, s| DownloadEntry {
        start_time: s.time(TimeColumn::DownloadStart, row.date_added),
        end_time: s.time(TimeColumn::DownloadEnd, row.end_time),
        target_path: row.target_path,
        url: row.url,
        total_bytes: row.total_bytes,
        mime_type: String::new(),
    })
}

pub fn decode_gecko_bookmarks(
    ctx: &DecodeContext<'_>,
    rows: impl IntoIterator<Item = Result<GeckoBookmarkRow, RowError>>,
) -> Assembled<BookmarkNode> {
    assemble(ctx, rows, |r| r.id.to_string(), |row, s| BookmarkNode {
        date_added: s.time(TimeColumn::BookmarkAdded, row.date_added),
        id: row.id,
        parent_id: (row.parent > 0).then_some(row.parent),
        name: row.title,
        node_type: gecko_type_name(row.bookmark_type).to_string(),
        url: row.url,
    })
}
