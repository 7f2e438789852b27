//! Raw key material loading
//!
//! Reads the bytes the master key is derived from. Nothing here decrypts.

use crate::browsers::{Family, Profile};
use crate::db_safety::Snapshot;
use crate::error::{ProfileError, ProfileResult};
use crate::master_key::NSS_KEY_ID;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rusqlite::OptionalExtension;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DPAPI_PREFIX: &[u8] = b"DPAPI";

const QUERY_META_DATA: &str = "SELECT item1, item2 FROM metaData WHERE id = 'password'";
const QUERY_NSS_PRIVATE: &str = "SELECT a11, a102 FROM nssPrivate";

/// Chromium master key as stored in `Local State`.
#[derive(Clone)]
pub struct WrappedKey {
    /// OS-protected key-encryption-key, prefix already stripped
    pub protected_kek: Vec<u8>,
    /// `v10 || nonce || ciphertext || tag` sealing the master key under the KEK.
    /// Absent when the KEK itself is the master key.
    pub sealed: Option<Vec<u8>>,
}

/// The four `key4.db` items the Gecko key chain is built from.
#[derive(Clone)]
pub struct GeckoKeyMaterial {
    pub global_salt: Vec<u8>,
    pub meta_bytes: Vec<u8>,
    pub nss_a11: Vec<u8>,
    pub nss_a102: Vec<u8>,
}

#[derive(Clone)]
pub enum MasterKeyMaterial {
    /// `None` means legacy mode: fields are protected directly by the OS.
    Webkit(Option<WrappedKey>),
    Gecko(GeckoKeyMaterial),
}

impl MasterKeyMaterial {
    pub fn family(&self) -> Family {
        match self {
            MasterKeyMaterial::Webkit(_) => Family::Webkit,
            MasterKeyMaterial::Gecko(_) => Family::Gecko,
        }
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedKey")
            .field("protected_kek", &format_args!("{} bytes", self.protected_kek.len()))
            .field("sealed", &self.sealed.as_ref().map(|s| s.len()))
            .finish()
    }
}

// Lengths only, key bytes never reach a log line.
impl fmt::Debug for MasterKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterKeyMaterial::Webkit(None) => write!(f, "Webkit(legacy)"),
            MasterKeyMaterial::Webkit(Some(w)) => write!(
                f,
                "Webkit(kek: {} bytes, sealed: {:?} bytes)",
                w.protected_kek.len(),
                w.sealed.as_ref().map(|s| s.len())
            ),
            MasterKeyMaterial::Gecko(g) => write!(
                f,
                "Gecko(salt: {}, meta: {}, a11: {}, a102: {} bytes)",
                g.global_salt.len(),
                g.meta_bytes.len(),
                g.nss_a11.len(),
                g.nss_a102.len()
            ),
        }
    }
}

pub trait KeySource: Send + Sync {
    fn load(&self, profile: &Path) -> ProfileResult<MasterKeyMaterial>;
}

pub fn for_family(family: Family) -> Box<dyn KeySource> {
    match family {
        Family::Webkit => Box::new(LocalStateKeySource),
        Family::Gecko => Box::new(Key4DbKeySource),
    }
}

pub fn load_for(profile: &Profile) -> ProfileResult<MasterKeyMaterial> {
    for_family(profile.family).load(&profile.path)
}

#[derive(Debug, Deserialize)]
struct LocalState {
    os_crypt: Option<OsCrypt>,
}

#[derive(Debug, Deserialize)]
struct OsCrypt {
    encrypted_key: Option<String>,
    wrapped_key: Option<String>,
}

/// Reads `os_crypt` from the Chromium `Local State` file.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStateKeySource;

impl LocalStateKeySource {
    /// `Local State` lives in the user-data dir, one level above `Default/`.
    fn locate(profile: &Path) -> Option<PathBuf> {
        let own = profile.join("Local State");
        if own.exists() {
            return Some(own);
        }
        profile
            .parent()
            .map(|p| p.join("Local State"))
            .filter(|p| p.exists())
    }

    pub fn parse(content: &str) -> ProfileResult<Option<WrappedKey>> {
        let state: LocalState = serde_json::from_str(content)
            .map_err(|e| ProfileError::KeyMaterialUnavailable(format!("Local State is not valid JSON: {}", e)))?;

        let Some(os_crypt) = state.os_crypt else {
            return Ok(None);
        };
        let Some(encrypted_key) = os_crypt.encrypted_key else {
            return Ok(None);
        };

        let kek = decode_b64("os_crypt.encrypted_key", &encrypted_key)?;
        let protected_kek = kek
            .strip_prefix(DPAPI_PREFIX)
            .map(|k| k.to_vec())
            .unwrap_or(kek);

        let sealed = os_crypt
            .wrapped_key
            .as_deref()
            .map(|w| decode_b64("os_crypt.wrapped_key", w))
            .transpose()?;

        Ok(Some(WrappedKey {
            protected_kek,
            sealed,
        }))
    }
}

fn decode_b64(field: &str, value: &str) -> ProfileResult<Vec<u8>> {
    STANDARD
        .decode(value.trim())
        .map_err(|_| ProfileError::KeyMaterialUnavailable(format!("{} is not valid base64", field)))
}

impl KeySource for LocalStateKeySource {
    fn load(&self, profile: &Path) -> ProfileResult<MasterKeyMaterial> {
        let Some(path) = Self::locate(profile) else {
            info!("🔑 No Local State for {:?}, using legacy OS protection", profile);
            return Ok(MasterKeyMaterial::Webkit(None));
        };
        debug!("Reading key material from {:?}", path);

        let content = std::fs::read_to_string(&path)
            .map_err(|e| ProfileError::KeyMaterialUnavailable(format!("{:?}: {}", path, e)))?;
        let wrapped = Self::parse(&content)?;
        if wrapped.is_none() {
            info!("🔑 Local State carries no encrypted key, using legacy OS protection");
        }
        Ok(MasterKeyMaterial::Webkit(wrapped))
    }
}

/// Reads `metaData` and `nssPrivate` from the Firefox `key4.db`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Key4DbKeySource;

impl KeySource for Key4DbKeySource {
    fn load(&self, profile: &Path) -> ProfileResult<MasterKeyMaterial> {
        let path = profile.join("key4.db");
        if !path.exists() {
            return Err(ProfileError::KeyMaterialUnavailable(format!("{:?} not found", path)));
        }
        let unavailable = |e: &dyn fmt::Display| ProfileError::KeyMaterialUnavailable(e.to_string());

        let snapshot = Snapshot::open(&path).map_err(|e| unavailable(&e))?;
        let conn = snapshot.conn();

        let meta: Option<(Vec<u8>, Vec<u8>)> = conn
            .query_row(QUERY_META_DATA, [], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(|e| unavailable(&e))?;
        let (global_salt, meta_bytes) =
            meta.ok_or_else(|| ProfileError::KeyMaterialUnavailable("metaData has no password row".into()))?;

        let (nss_a11, nss_a102) = select_nss_private(conn).map_err(|e| unavailable(&e))?.ok_or_else(|| {
            ProfileError::KeyMaterialUnavailable("nssPrivate is empty".into())
        })?;

        Ok(MasterKeyMaterial::Gecko(GeckoKeyMaterial {
            global_salt,
            meta_bytes,
            nss_a11,
            nss_a102,
        }))
    }
}

/// The row whose `a102` is the NSS key id, else the first row so the
/// resolver can report why it does not fit.
fn select_nss_private(conn: &rusqlite::Connection) -> rusqlite::Result<Option<(Vec<u8>, Vec<u8>)>> {
    let mut stmt = conn.prepare(QUERY_NSS_PRIVATE)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?)))?;

    let mut first = None;
    for row in rows {
        let (a11, a102) = row?;
        if a102 == NSS_KEY_ID {
            return Ok(Some((a11, a102)));
        }
        debug!("Skipping nssPrivate row with a102 of {} bytes", a102.len());
        if first.is_none() {
            first = Some((a11, a102));
        }
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{params, Connection};
    use std::fs;

    #[test]
    fn test_local_state_with_dpapi_key() {
        let kek = [b"DPAPI".as_slice(), &[1, 2, 3]].concat();
        let json = format!(r#"{{"os_crypt":{{"encrypted_key":"{}"}}}}"#, STANDARD.encode(kek));
        let wrapped = LocalStateKeySource::parse(&json).unwrap().unwrap();
        assert_eq!(wrapped.protected_kek, vec![1, 2, 3]);
        assert!(wrapped.sealed.is_none());
    }

    #[test]
    fn test_local_state_with_sealed_key() {
        let json = format!(
            r#"{{"os_crypt":{{"encrypted_key":"{}","wrapped_key":"{}"}}}}"#,
            STANDARD.encode(b"kek"),
            STANDARD.encode(b"v10sealed")
        );
        let wrapped = LocalStateKeySource::parse(&json).unwrap().unwrap();
        assert_eq!(wrapped.protected_kek, b"kek");
        assert_eq!(wrapped.sealed.as_deref(), Some(b"v10sealed".as_slice()));
    }

    #[test]
    fn test_local_state_without_key_is_legacy() {
        assert!(LocalStateKeySource::parse(r#"{"os_crypt":{}}"#).unwrap().is_none());
        assert!(LocalStateKeySource::parse(r#"{"browser":{}}"#).unwrap().is_none());
    }

    #[test]
    fn test_local_state_bad_base64() {
        let err = LocalStateKeySource::parse(r#"{"os_crypt":{"encrypted_key":"!!!"}}"#).unwrap_err();
        assert!(matches!(err, ProfileError::KeyMaterialUnavailable(_)));
    }

    #[test]
    fn test_wrapped_key_debug_hides_bytes() {
        let wrapped = WrappedKey {
            protected_kek: vec![0xAB; 3],
            sealed: Some(vec![0xCD; 5]),
        };
        let shown = format!("{:?}", wrapped);
        assert!(shown.contains("3 bytes"));
        assert!(!shown.contains("171"));
    }

    #[test]
    fn test_missing_local_state_is_legacy() {
        let dir = tempfile::tempdir().unwrap();
        let material = LocalStateKeySource.load(dir.path()).unwrap();
        assert!(matches!(material, MasterKeyMaterial::Webkit(None)));
    }

    #[test]
    fn test_local_state_found_in_parent() {
        let root = tempfile::tempdir().unwrap();
        let profile = root.path().join("Default");
        fs::create_dir_all(&profile).unwrap();
        let json = format!(r#"{{"os_crypt":{{"encrypted_key":"{}"}}}}"#, STANDARD.encode(b"DPAPIkey"));
        fs::write(root.path().join("Local State"), json).unwrap();

        match LocalStateKeySource.load(&profile).unwrap() {
            MasterKeyMaterial::Webkit(Some(w)) => assert_eq!(w.protected_kek, b"key"),
            other => panic!("unexpected material {:?}", other),
        }
    }

    fn write_key4(dir: &Path, with_nss: bool) {
        let conn = Connection::open(dir.join("key4.db")).unwrap();
        conn.execute_batch(
            "CREATE TABLE metaData (id TEXT PRIMARY KEY, item1, item2);
             CREATE TABLE nssPrivate (a11 BLOB, a102 BLOB);",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO metaData VALUES ('password', ?1, ?2)",
            params![b"salt".to_vec(), b"meta".to_vec()],
        )
        .unwrap();
        if with_nss {
            conn.execute(
                "INSERT INTO nssPrivate VALUES (?1, ?2)",
                params![b"a11".to_vec(), b"a102".to_vec()],
            )
            .unwrap();
        }
    }

    #[test]
    fn test_key4_db_load() {
        let dir = tempfile::tempdir().unwrap();
        write_key4(dir.path(), true);
        match Key4DbKeySource.load(dir.path()).unwrap() {
            MasterKeyMaterial::Gecko(g) => {
                assert_eq!(g.global_salt, b"salt");
                assert_eq!(g.meta_bytes, b"meta");
                assert_eq!(g.nss_a11, b"a11");
                assert_eq!(g.nss_a102, b"a102");
            }
            other => panic!("unexpected material {:?}", other),
        }
    }

    #[test]
    fn test_key4_db_prefers_key_id_row() {
        let dir = tempfile::tempdir().unwrap();
        write_key4(dir.path(), false);
        let conn = Connection::open(dir.path().join("key4.db")).unwrap();
        conn.execute(
            "INSERT INTO nssPrivate VALUES (?1, ?2)",
            params![b"other-key".to_vec(), vec![0x11u8; 16]],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO nssPrivate VALUES (?1, ?2)",
            params![b"login-key".to_vec(), NSS_KEY_ID.to_vec()],
        )
        .unwrap();
        drop(conn);

        match Key4DbKeySource.load(dir.path()).unwrap() {
            MasterKeyMaterial::Gecko(g) => {
                assert_eq!(g.nss_a11, b"login-key");
                assert_eq!(g.nss_a102, NSS_KEY_ID);
            }
            other => panic!("unexpected material {:?}", other),
        }
    }

    #[test]
    fn test_key4_db_without_key_id_row_keeps_first() {
        let dir = tempfile::tempdir().unwrap();
        write_key4(dir.path(), true);
        let conn = Connection::open(dir.path().join("key4.db")).unwrap();
        conn.execute(
            "INSERT INTO nssPrivate VALUES (?1, ?2)",
            params![b"second".to_vec(), vec![0x22u8; 16]],
        )
        .unwrap();
        drop(conn);

        match Key4DbKeySource.load(dir.path()).unwrap() {
            MasterKeyMaterial::Gecko(g) => assert_eq!(g.nss_a11, b"a11"),
            other => panic!("unexpected material {:?}", other),
        }
    }

    #[test]
    fn test_key4_db_missing_rows() {
        let dir = tempfile::tempdir().unwrap();
        write_key4(dir.path(), false);
        assert!(matches!(
            Key4DbKeySource.load(dir.path()),
            Err(ProfileError::KeyMaterialUnavailable(_))
        ));
    }

    #[test]
    fn test_key4_db_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Key4DbKeySource.load(dir.path()),
            Err(ProfileError::KeyMaterialUnavailable(_))
        ));
    }

    #[test]
    fn test_debug_hides_bytes() {
        let material = MasterKeyMaterial::Webkit(Some(WrappedKey {
            protected_kek: vec![0xAA; 4],
            sealed: None,
        }));
        let shown = format!("{:?}", material);
        assert!(shown.contains("4 bytes"));
        assert!(!shown.contains("170"));
    }
}
