//! Write extracted records to disk
//!
//! One file per artifact kind, `<family>_<kind>.<ext>`, plus
//! `<family>_diagnostics.json` when any row had problems.

use crate::browsers::Family;
use crate::config::OutputFormat;
use crate::records::{
    BookmarkNode, CookieRecord, CreditCard, Diagnostic, DownloadEntry, Extraction, HistoryEntry, LoginCredential,
    Records,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A record that can be written as one CSV line.
pub trait CsvRow {
    const HEADER: &'static [&'static str];

    fn fields(&self) -> Vec<String>;
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn time(value: &Option<DateTime<Utc>>) -> String {
    value.map(|t| t.to_rfc3339()).unwrap_or_default()
}

impl CsvRow for LoginCredential {
    const HEADER: &'static [&'static str] = &["url", "username", "password", "created"];

    fn fields(&self) -> Vec<String> {
        vec![
            quote(&self.url),
            quote(&self.username),
            quote(&self.password),
            time(&self.created),
        ]
    }
}

impl CsvRow for CookieRecord {
    const HEADER: &'static [&'static str] = &[
        "host",
        "path",
        "name",
        "value",
        "is_secure",
        "is_http_only",
        "has_expire",
        "is_persistent",
        "created",
        "expires",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            quote(&self.host),
            quote(&self.path),
            quote(&self.name),
            quote(&self.value),
            self.is_secure.to_string(),
            self.is_http_only.to_string(),
            self.has_expire.to_string(),
            self.is_persistent.to_string(),
            time(&self.created),
            time(&self.expires),
        ]
    }
}

impl CsvRow for HistoryEntry {
    const HEADER: &'static [&'static str] = &["url", "title", "visit_count", "last_visit"];

    fn fields(&self) -> Vec<String> {
        vec![
            quote(&self.url),
            quote(&self.title),
            self.visit_count.to_string(),
            time(&self.last_visit),
        ]
    }
}

impl CsvRow for DownloadEntry {
    const HEADER: &'static [&'static str] = &["target_path", "url", "total_bytes", "start_time", "end_time", "mime_type"];

    fn fields(&self) -> Vec<String> {
        vec![
            quote(&self.target_path),
            quote(&self.url),
            self.total_bytes.to_string(),
            time(&self.start_time),
            time(&self.end_time),
            quote(&self.mime_type),
        ]
    }
}

impl CsvRow for CreditCard {
    const HEADER: &'static [&'static str] = &["guid", "name", "expiration_month", "expiration_year", "card_number"];

    fn fields(&self) -> Vec<String> {
        vec![
            quote(&self.guid),
            quote(&self.name),
            quote(&self.expiration_month),
            quote(&self.expiration_year),
            quote(&self.card_number),
        ]
    }
}

impl CsvRow for BookmarkNode {
    const HEADER: &'static [&'static str] = &["id", "parent_id", "name", "type", "url", "date_added"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.parent_id.map(|p| p.to_string()).unwrap_or_default(),
            quote(&self.name),
            quote(&self.node_type),
            quote(&self.url),
            time(&self.date_added),
        ]
    }
}

pub fn write_csv<R: CsvRow, W: Write>(records: &[R], out: &mut W) -> std::io::Result<()> {
    writeln!(out, "{}", R::HEADER.join(","))?;
    for record in records {
        writeln!(out, "{}", record.fields().join(","))?;
    }
    Ok(())
}

fn write_records_csv<W: Write>(records: &Records, out: &mut W) -> std::io::Result<()> {
    match records {
        Records::Logins(r) => write_csv(r, out),
        Records::Cookies(r) => write_csv(r, out),
        Records::History(r) => write_csv(r, out),
        Records::Downloads(r) => write_csv(r, out),
        Records::CreditCards(r) => write_csv(r, out),
        Records::Bookmarks(r) => write_csv(r, out),
    }
}

fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))
}

/// Write one kind's records; returns the file written.
pub fn write_extraction(dir: &Path, family: Family, extraction: &Extraction, format: OutputFormat) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let path = dir.join(format!("{}_{}.{}", family, extraction.kind, format.extension()));

    match format {
        OutputFormat::Json => write_json(&extraction.records, &path)?,
        OutputFormat::Csv => {
            let file = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
            let mut out = BufWriter::new(file);
            write_records_csv(&extraction.records, &mut out)?;
            out.flush()?;
        }
    }
    debug!("Wrote {} {} records to {:?}", extraction.records.len(), extraction.kind, path);
    Ok(path)
}

#[derive(Serialize)]
struct DiagnosticEntry<'a> {
    artifact: &'a str,
    #[serde(flatten)]
    diagnostic: &'a Diagnostic,
}

/// Write every diagnostic of the given extractions, if there are any.
pub fn write_diagnostics<'a>(
    dir: &Path,
    family: Family,
    extractions: impl IntoIterator<Item = &'a Extraction>,
) -> Result<Option<PathBuf>> {
    let entries: Vec<DiagnosticEntry<'_>> = extractions
        .into_iter()
        .flat_map(|e| {
            e.diagnostics.iter().map(move |d| DiagnosticEntry {
                artifact: e.kind.name(),
                diagnostic: d,
            })
        })
        .collect();
    if entries.is_empty() {
        return Ok(None);
    }

    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let path = dir.join(format!("{}_diagnostics.json", family));
    write_json(&entries, &path)?;
    Ok(Some(path))
}
