//! macOS Keychain-backed protection
//!
//! Chromium on macOS stores a random "Safe Storage" password in the login
//! keychain. The field key is PBKDF2-HMAC-SHA1(password, "saltysalt", 1003, 16)
//! and values are AES-128-CBC with a fixed IV behind a `v10` prefix.

use super::OsUnwrap;
use crate::crypto::chromium;
use crate::error::DecryptError;
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, warn};
use zeroize::Zeroizing;

const KEYCHAIN_ITERATIONS: u32 = 1003;

/// Looks the Safe Storage password up lazily, once per backend.
pub struct KeychainUnwrap {
    service: &'static str,
    key: OnceLock<Option<Zeroizing<[u8; 16]>>>,
}

impl KeychainUnwrap {
    pub fn new(browser: &str) -> Self {
        Self {
            service: chromium::safe_storage_service(browser),
            key: OnceLock::new(),
        }
    }

    /// Use an already known Safe Storage password instead of the keychain.
    pub fn with_password(browser: &str, password: &[u8]) -> Self {
        let unwrap = Self::new(browser);
        let key = Zeroizing::new(chromium::derive_cbc_key(password, KEYCHAIN_ITERATIONS));
        let _ = unwrap.key.set(Some(key));
        unwrap
    }

    fn key(&self) -> Option<&[u8; 16]> {
        self.key
            .get_or_init(|| match read_keychain_password(self.service) {
                Ok(password) => Some(Zeroizing::new(chromium::derive_cbc_key(
                    password.as_bytes(),
                    KEYCHAIN_ITERATIONS,
                ))),
                Err(e) => {
                    warn!("⚠️  Keychain lookup for '{}' failed: {}", self.service, e);
                    None
                }
            })
            .as_deref()
    }
}

/// Use the `security` tool to read the password for a generic keychain item.
fn read_keychain_password(service: &str) -> anyhow::Result<Zeroizing<String>> {
    let output = Command::new("security")
        .args([
            "find-generic-password",
            "-s",
            service,
            "-w", // Output password only
        ])
        .output()?;

    if !output.status.success() {
        anyhow::bail!(
            "security exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let password = String::from_utf8(output.stdout)?;
    Ok(Zeroizing::new(password.trim().to_string()))
}

impl OsUnwrap for KeychainUnwrap {
    fn name(&self) -> &'static str {
        "macos-keychain"
    }

    fn unprotect(&self, blob: &[u8]) -> Result<Vec<u8>, DecryptError> {
        if !chromium::is_encrypted(blob) {
            return Ok(blob.to_vec());
        }
        let key = self.key().ok_or(DecryptError::OsUnprotectFailed)?;
        chromium::decrypt_cbc(key, blob).map_err(|e| {
            debug!("keychain unwrap failed: {}", e);
            DecryptError::OsUnprotectFailed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_password_round_trip() {
        let unwrap = KeychainUnwrap::with_password("chrome", b"safe-storage-pw");
        let key = chromium::derive_cbc_key(b"safe-storage-pw", KEYCHAIN_ITERATIONS);
        let blob = chromium::encrypt_cbc(&key, b"mac-secret");
        assert_eq!(unwrap.unprotect(&blob).unwrap(), b"mac-secret");
        assert_eq!(unwrap.name(), "macos-keychain");
    }

    #[test]
    fn test_plain_value_passes_through() {
        let unwrap = KeychainUnwrap::with_password("chrome", b"pw");
        assert_eq!(unwrap.unprotect(b"plain").unwrap(), b"plain");
    }
}
