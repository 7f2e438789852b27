//! Linux Chromium "basic" protection
//!
//! Without a keyring, Chromium on Linux encrypts with a key derived from the
//! fixed password `peanuts` (PBKDF2-HMAC-SHA1, 1 iteration). Values without a
//! version prefix predate encryption and pass through unchanged.

use super::OsUnwrap;
use crate::crypto::chromium;
use crate::error::DecryptError;
use tracing::debug;

const OBFUSCATION_PASSWORD: &[u8] = b"peanuts";
const OBFUSCATION_ITERATIONS: u32 = 1;

#[derive(Debug, Default, Clone, Copy)]
pub struct ObfuscationUnwrap;

impl OsUnwrap for ObfuscationUnwrap {
    fn name(&self) -> &'static str {
        "linux-obfuscation"
    }

    fn unprotect(&self, blob: &[u8]) -> Result<Vec<u8>, DecryptError> {
        if !chromium::is_encrypted(blob) {
            return Ok(blob.to_vec());
        }
        let key = chromium::derive_cbc_key(OBFUSCATION_PASSWORD, OBFUSCATION_ITERATIONS);
        chromium::decrypt_cbc(&key, blob).map_err(|e| {
            debug!("obfuscation unwrap failed: {}", e);
            DecryptError::OsUnprotectFailed
        })
    }
}
