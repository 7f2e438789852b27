//! Per-field decryption
//!
//! Failures here are record-local: the caller keeps the record, blanks the
//! field and files a diagnostic.

use crate::browsers::Family;
use crate::crypto::block::{self, BlockError, DES3_BLOCK};
use crate::crypto::chromium;
use crate::crypto::nss::{LoginEnvelope, OID_DES_EDE3_CBC};
use crate::error::DecryptError;
use crate::master_key::ResolvedKey;
use crate::os_unwrap::OsUnwrap;

/// Decrypts single ciphertext fields under a profile's [`ResolvedKey`].
#[derive(Clone, Copy)]
pub struct FieldDecryptor<'a> {
    os: &'a dyn OsUnwrap,
}

impl<'a> FieldDecryptor<'a> {
    pub fn new(os: &'a dyn OsUnwrap) -> Self {
        Self { os }
    }

    pub fn decrypt(&self, family: Family, key: &ResolvedKey, ciphertext: &[u8]) -> Result<String, DecryptError> {
        let plain = self.decrypt_bytes(family, key, ciphertext)?;
        Ok(String::from_utf8_lossy(&plain).into_owned())
    }

    pub fn decrypt_bytes(&self, family: Family, key: &ResolvedKey, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        if ciphertext.is_empty() {
            return Ok(Vec::new());
        }
        if key.family() != family || !key.has_valid_length() {
            return Err(DecryptError::KeyMismatch);
        }

        match key {
            ResolvedKey::Legacy => self
                .os
                .unprotect(ciphertext)
                .map_err(|_| DecryptError::OsUnprotectFailed),
            ResolvedKey::Webkit(k) => chromium::open_sealed(k, ciphertext),
            ResolvedKey::Gecko(k) => decrypt_gecko(k, ciphertext),
        }
    }
}

fn decrypt_gecko(key: &[u8], field: &[u8]) -> Result<Vec<u8>, DecryptError> {
    let envelope = LoginEnvelope::parse(field).map_err(|_| DecryptError::MalformedCiphertext)?;
    if !envelope.algorithm.is(OID_DES_EDE3_CBC) {
        return Err(DecryptError::MalformedCiphertext);
    }

    let padded = block::des3_cbc_decrypt(key, &envelope.iv, &envelope.ciphertext).map_err(|e| match e {
        BlockError::KeyLength | BlockError::Alignment => DecryptError::MalformedCiphertext,
        BlockError::Padding => DecryptError::PaddingInvalid,
    })?;
    let plain = block::pkcs5_unpad(&padded, DES3_BLOCK).map_err(|_| DecryptError::PaddingInvalid)?;
    Ok(plain.to_vec())
}
