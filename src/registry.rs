//! `(family, kind)` to extractor lookup
//!
//! An extractor reads its rows (SQLite snapshot or JSON file) and hands them
//! to the matching pure decoder in [`crate::assembler`]. I/O failures are
//! returned as [`ProfileError::Source`] and only cost that one kind.

use crate::assembler::{self, DecodeContext};
use crate::bookmarks;
use crate::browsers::{ArtifactKind, Family, Profile};
use crate::db_safety::Snapshot;
use crate::error::{ProfileError, ProfileResult, RowError};
use crate::records::{Extraction, Records};
use crate::rows::{self, SqlRow};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub type Extractor = fn(&Profile, &DecodeContext<'_>) -> ProfileResult<Extraction>;

pub struct Entry {
    pub family: Family,
    pub kind: ArtifactKind,
    pub extract: Extractor,
}

pub static REGISTRY: &[Entry] = &[
    Entry { family: Family::Webkit, kind: ArtifactKind::Login, extract: webkit_logins },
    Entry { family: Family::Webkit, kind: ArtifactKind::Cookie, extract: webkit_cookies },
    Entry { family: Family::Webkit, kind: ArtifactKind::History, extract: webkit_history },
    Entry { family: Family::Webkit, kind: ArtifactKind::Download, extract: webkit_downloads },
    Entry { family: Family::Webkit, kind: ArtifactKind::CreditCard, extract: webkit_cards },
    Entry { family: Family::Webkit, kind: ArtifactKind::Bookmark, extract: webkit_bookmarks },
    Entry { family: Family::Gecko, kind: ArtifactKind::Login, extract: gecko_logins },
    Entry { family: Family::Gecko, kind: ArtifactKind::Cookie, extract: gecko_cookies },
    Entry { family: Family::Gecko, kind: ArtifactKind::History, extract: gecko_history },
    Entry { family: Family::Gecko, kind: ArtifactKind::Download, extract: gecko_downloads },
    Entry { family: Family::Gecko, kind: ArtifactKind::Bookmark, extract: gecko_bookmarks },
];

pub fn lookup(family: Family, kind: ArtifactKind) -> Option<&'static Entry> {
    REGISTRY.iter().find(|e| e.family == family && e.kind == kind)
}

pub fn supported() -> impl Iterator<Item = (Family, ArtifactKind)> {
    REGISTRY.iter().map(|e| (e.family, e.kind))
}

fn artifact_file(profile: &Profile, kind: ArtifactKind) -> ProfileResult<PathBuf> {
    profile
        .artifact_path(kind)
        .ok_or_else(|| ProfileError::Source(format!("{} profiles do not store {}", profile.family, kind)))
}

fn sqlite_rows<R: SqlRow>(profile: &Profile, kind: ArtifactKind) -> ProfileResult<Vec<Result<R, RowError>>> {
    let path = artifact_file(profile, kind)?;
    debug!("Reading {} from {:?}", kind, path);
    let snapshot = Snapshot::open(&path).map_err(|e| ProfileError::Source(format!("{:#}", e)))?;
    rows::fetch::<R>(snapshot.conn())
        .map_err(|e| ProfileError::Source(format!("{} query failed: {}", kind, e)))
}

fn read_json(profile: &Profile, kind: ArtifactKind) -> ProfileResult<String> {
    let path = artifact_file(profile, kind)?;
    debug!("Reading {} from {:?}", kind, path);
    fs::read_to_string(&path).map_err(|e| ProfileError::Source(format!("{:?}: {}", path, e)))
}

fn webkit_logins(p: &Profile, ctx: &DecodeContext<'_>) -> ProfileResult<Extraction> {
    let rows = sqlite_rows(p, ArtifactKind::Login)?;
    Ok(Extraction::new(assembler::decode_webkit_logins(ctx, rows), Records::Logins))
}

fn webkit_cookies(p: &Profile, ctx: &DecodeContext<'_>) -> ProfileResult<Extraction> {
    let rows = sqlite_rows(p, ArtifactKind::Cookie)?;
    Ok(Extraction::new(assembler::decode_webkit_cookies(ctx, rows), Records::Cookies))
}

fn webkit_history(p: &Profile, ctx: &DecodeContext<'_>) -> ProfileResult<Extraction> {
    let rows = sqlite_rows(p, ArtifactKind::History)?;
    Ok(Extraction::new(assembler::decode_webkit_history(ctx, rows), Records::History))
}

fn webkit_downloads(p: &Profile, ctx: &DecodeContext<'_>) -> ProfileResult<Extraction> {
    let rows = sqlite_rows(p, ArtifactKind::Download)?;
    Ok(Extraction::new(assembler::decode_webkit_downloads(ctx, rows), Records::Downloads))
}

fn webkit_cards(p: &Profile, ctx: &DecodeContext<'_>) -> ProfileResult<Extraction> {
    let rows = sqlite_rows(p, ArtifactKind::CreditCard)?;
    Ok(Extraction::new(assembler::decode_webkit_cards(ctx, rows), Records::CreditCards))
}

fn webkit_bookmarks(p: &Profile, ctx: &DecodeContext<'_>) -> ProfileResult<Extraction> {
    let content = read_json(p, ArtifactKind::Bookmark)?;
    let doc: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| ProfileError::Source(format!("Bookmarks is not valid JSON: {}", e)))?;
    let rows = bookmarks::flatten(&doc);
    Ok(Extraction::new(assembler::decode_webkit_bookmarks(ctx, rows), Records::Bookmarks))
}

fn gecko_logins(p: &Profile, ctx: &DecodeContext<'_>) -> ProfileResult<Extraction> {
    let content = read_json(p, ArtifactKind::Login)?;
    let rows = rows::parse_gecko_logins(&content)
        .map_err(|e| ProfileError::Source(format!("logins.json is not valid JSON: {}", e)))?;
    Ok(Extraction::new(assembler::decode_gecko_logins(ctx, rows), Records::Logins))
}

fn gecko_cookies(p: &Profile, ctx: &DecodeContext<'_>) -> ProfileResult<Extraction> {
    let rows = sqlite_rows(p, ArtifactKind::Cookie)?;
    Ok(Extraction::new(assembler::decode_gecko_cookies(ctx, rows), Records::Cookies))
}

fn gecko_history(p: &Profile, ctx: &DecodeContext<'_>) -> ProfileResult<Extraction> {
    let rows = sqlite_rows(p, ArtifactKind::History)?;
    Ok(Extraction::new(assembler::decode_gecko_history(ctx, rows), Records::History))
}

fn gecko_downloads(p: &Profile, ctx: &DecodeContext<'_>) -> ProfileResult<Extraction> {
    let rows = sqlite_rows(p, ArtifactKind::Download)?;
    Ok(Extraction::new(assembler::decode_gecko_downloads(ctx, rows), Records::Downloads))
}

fn gecko_bookmarks(p: &Profile, ctx: &DecodeContext<'_>) -> ProfileResult<Extraction> {
    let rows = sqlite_rows(p, ArtifactKind::Bookmark)?;
    Ok(Extraction::new(assembler::decode_gecko_bookmarks(ctx, rows), Records::Bookmarks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_stored_kind_has_an_extractor() {
        for family in [Family::Webkit, Family::Gecko] {
            for kind in ArtifactKind::ALL {
                assert_eq!(
                    lookup(family, kind).is_some(),
                    kind.file_name(family).is_some(),
                    "{} {}",
                    family,
                    kind
                );
            }
        }
    }

    #[test]
    fn test_entries_unique() {
        let mut pairs: Vec<_> = supported().collect();
        let before = pairs.len();
        pairs.sort_by_key(|(f, k)| (f.name(), *k));
        pairs.dedup();
        assert_eq!(pairs.len(), before);
    }

    #[test]
    fn test_missing_store_is_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::new(Family::Webkit, dir.path());
        let os = crate::os_unwrap::IdentityUnwrap;
        let key = crate::master_key::ResolvedKey::Legacy;
        let ctx = DecodeContext::new(Family::Webkit, &key, crate::field::FieldDecryptor::new(&os));
        let entry = lookup(Family::Webkit, ArtifactKind::History).unwrap();
        assert!(matches!((entry.extract)(&profile, &ctx), Err(ProfileError::Source(_))));
    }
}
