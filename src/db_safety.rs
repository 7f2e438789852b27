//! Read-only database snapshots
//!
//! Browsers keep their SQLite files locked while running. Rather than opening
//! the live file, every read goes through a temporary copy:
//! 1. Copy the database (and its WAL/SHM side files) to the temp directory
//! 2. Open the copy read-only
//! 3. Remove the copy when the [`Snapshot`] is dropped, on every exit path

use anyhow::{anyhow, Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SIDE_FILE_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

/// A temporary copy of a browser database plus an open connection to it.
pub struct Snapshot {
    // dropped before `files`: the connection must close before unlinking
    conn: Connection,
    files: TempFiles,
}

/// Removes the copied files when dropped.
struct TempFiles(Vec<PathBuf>);

impl Drop for TempFiles {
    fn drop(&mut self) {
        for file in &self.0 {
            if file.exists() {
                if let Err(e) = fs::remove_file(file) {
                    warn!("Failed to remove temporary file {:?}: {}", file, e);
                }
            }
        }
    }
}

impl Snapshot {
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            return Err(anyhow!("Database file does not exist: {:?}", db_path));
        }
        if is_database_locked(db_path) {
            debug!("{:?} appears to be in use, reading from a copy", db_path);
        }

        let temp_dir = std::env::temp_dir().join("browser-data-extract");
        fs::create_dir_all(&temp_dir)?;

        let db_name = db_path
            .file_name()
            .ok_or_else(|| anyhow!("Invalid database path"))?
            .to_string_lossy();
        let temp_db = temp_dir.join(format!("{}_{}.tmp", db_name, uuid::Uuid::new_v4()));

        let mut files = TempFiles(vec![temp_db.clone()]);
        fs::copy(db_path, &temp_db).context("Failed to create temporary database copy")?;

        // SQLite looks for "<db>-wal" next to the database it opens
        for suffix in SIDE_FILE_SUFFIXES {
            let side = side_file(db_path, suffix);
            if side.exists() {
                let dest = side_file(&temp_db, suffix);
                files.0.push(dest.clone());
                if let Err(e) = fs::copy(&side, &dest) {
                    warn!("Failed to copy {:?}: {}", side, e);
                }
            }
        }

        let conn = Connection::open_with_flags(
            &temp_db,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )
        .context("Failed to open temporary database")?;

        Ok(Self { conn, files })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn side_file(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Check whether a browser currently holds the database
/// via the lock files Firefox and Chromium leave next to it.
pub fn is_database_locked(db_path: &Path) -> bool {
    let file_name = db_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if file_name.is_empty() {
        return false;
    }
    let parent = db_path.parent().unwrap_or_else(|| Path::new("."));

    let lock_files = [
        format!("{}.lock", file_name),
        "lock".to_string(),
        ".parentlock".to_string(),
        "SingletonLock".to_string(),
    ];

    lock_files.iter().any(|lock_file| {
        let lock_path = parent.join(lock_file);
        let found = lock_path.exists() || lock_path.symlink_metadata().is_ok();
        if found {
            debug!("Found lock file: {:?}", lock_path);
        }
        found
    })
}
