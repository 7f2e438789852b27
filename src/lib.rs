//! Recover and decrypt saved browser data.
//!
//! Two engine families are supported: Chromium-derived ([`Family::Webkit`])
//! and Firefox-derived ([`Family::Gecko`]). For each profile the master key is
//! resolved once, then every secret field is decrypted with it. A field that
//! fails to decrypt is reported next to its record instead of failing the
//! batch.

pub mod assembler;
pub mod bookmarks;
pub mod browsers;
pub mod config;
pub mod crypto;
pub mod db_safety;
pub mod error;
pub mod export;
pub mod field;
pub mod key_source;
pub mod master_key;
pub mod os_unwrap;
pub mod pipeline;
pub mod progress;
pub mod records;
pub mod registry;
pub mod rows;
pub mod time_convert;

pub use browsers::{ArtifactKind, Family, Profile};
pub use config::{ExtractConfig, OutputFormat};
pub use error::{DecryptError, DiagnosticKind, ProfileError, RowError};
pub use field::FieldDecryptor;
pub use master_key::{MasterKeyResolver, ResolvedKey, StageObserver};
pub use pipeline::{Pipeline, ProfileReport};
pub use records::{Assembled, Diagnostic, Extraction, Records};
