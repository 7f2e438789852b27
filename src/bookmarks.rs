//! Chromium `Bookmarks` JSON tree flattening
//!
//! Nodes are emitted in pre-order, parent before descendants. A node without
//! a `type` produces no row, but its children are still walked and attach to
//! the nearest typed ancestor.

use crate::error::RowError;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebkitBookmarkRow {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub node_type: String,
    pub url: String,
    /// Webkit microseconds
    pub date_added: i64,
}

/// Flatten a parsed `Bookmarks` document. Accepts either the full document
/// (with a `roots` object) or a single node.
pub fn flatten(doc: &Value) -> Vec<Result<WebkitBookmarkRow, RowError>> {
    let mut out = Vec::new();
    match doc.get("roots").and_then(|r| r.as_object()) {
        Some(roots) => {
            for root in roots.values() {
                walk(root, None, &mut out);
            }
        }
        None => walk(doc, None, &mut out),
    }
    out
}

fn walk(node: &Value, parent_id: Option<i64>, out: &mut Vec<Result<WebkitBookmarkRow, RowError>>) {
    // "sync_transaction_version" and friends sit next to the real roots
    if !node.is_object() {
        return;
    }

    let mut child_parent = parent_id;
    if let Some(node_type) = node.get("type").and_then(|t| t.as_str()) {
        let row = node_row(node, node_type, parent_id);
        if let Ok(r) = &row {
            child_parent = Some(r.id);
        }
        out.push(row);
    }

    if let Some(children) = node.get("children").and_then(|c| c.as_array()) {
        for child in children {
            walk(child, child_parent, out);
        }
    }
}

fn node_row(node: &Value, node_type: &str, parent_id: Option<i64>) -> Result<WebkitBookmarkRow, RowError> {
    let id = int_field(node, "id")?.ok_or_else(|| RowError::new("bookmark node without id"))?;
    Ok(WebkitBookmarkRow {
        id,
        parent_id,
        name: str_field(node, "name"),
        node_type: node_type.to_string(),
        url: str_field(node, "url"),
        date_added: int_field(node, "date_added")?.unwrap_or(0),
    })
}

fn str_field(node: &Value, key: &str) -> String {
    node.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

/// Chromium writes integers as JSON strings.
fn int_field(node: &Value, key: &str) -> Result<Option<i64>, RowError> {
    match node.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| RowError::new(format!("bookmark {} out of range", key))),
        Some(Value::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|_| RowError::new(format!("bookmark {} is not an integer", key))),
        Some(_) => Err(RowError::new(format!("bookmark {} has the wrong type", key))),
    }
}

/// `moz_bookmarks.type` to the marker Chromium uses.
pub fn gecko_type_name(bookmark_type: i64) -> &'static str {
    match bookmark_type {
        1 => "url",
        2 => "folder",
        3 => "separator",
        _ => "unknown",
    }
}
