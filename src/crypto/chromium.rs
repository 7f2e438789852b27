//! Chromium password/cookie/card decryption
//!
//! Two on-disk schemes are handled:
//! - AES-256-GCM (`v10`/`v20` prefix + 12-byte nonce + ciphertext + 16-byte tag),
//!   keyed by the profile master key (Windows, and the sealed master key itself)
//! - AES-128-CBC with a fixed IV (`v10`/`v11` prefix), keyed by a PBKDF2-derived
//!   key from the keychain (macOS) or the fixed `peanuts` password (Linux)

use crate::error::DecryptError;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Length of the `v10` style version prefix
pub const VERSION_PREFIX_LEN: usize = 3;
pub const GCM_NONCE_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;
pub const GCM_KEY_LEN: usize = 32;

/// Shortest blob that can hold prefix, nonce and tag
pub const MIN_SEALED_LEN: usize = VERSION_PREFIX_LEN + GCM_NONCE_LEN + GCM_TAG_LEN;

/// Fixed IV used by Chromium's CBC scheme (16 bytes of space character 0x20)
const CHROMIUM_CBC_IV: [u8; 16] = [0x20; 16];

const CBC_SALT: &[u8] = b"saltysalt";
const CBC_KEY_LENGTH: usize = 16;

/// Borrowed view of a sealed blob.
#[derive(Debug, Clone, Copy)]
pub struct SealedParts<'a> {
    pub nonce: &'a [u8],
    /// ciphertext with the trailing tag still attached, as `aes-gcm` expects it
    pub ciphertext_and_tag: &'a [u8],
}

impl<'a> SealedParts<'a> {
    pub fn split(blob: &'a [u8]) -> Result<Self, DecryptError> {
        if blob.len() < MIN_SEALED_LEN {
            return Err(DecryptError::MalformedCiphertext);
        }
        let body = &blob[VERSION_PREFIX_LEN..];
        let (nonce, ciphertext_and_tag) = body.split_at(GCM_NONCE_LEN);
        Ok(Self {
            nonce,
            ciphertext_and_tag,
        })
    }

    pub fn tag(&self) -> &'a [u8] {
        &self.ciphertext_and_tag[self.ciphertext_and_tag.len() - GCM_TAG_LEN..]
    }
}

/// Open an AES-256-GCM sealed blob. A wrong key and a tampered blob are
/// indistinguishable and both report [`DecryptError::KeyMismatch`].
pub fn open_sealed(key: &[u8], blob: &[u8]) -> Result<Vec<u8>, DecryptError> {
    if key.len() != GCM_KEY_LEN {
        return Err(DecryptError::KeyMismatch);
    }
    let parts = SealedParts::split(blob)?;
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| DecryptError::KeyMismatch)?;
    cipher
        .decrypt(Nonce::from_slice(parts.nonce), parts.ciphertext_and_tag)
        .map_err(|_| DecryptError::KeyMismatch)
}

/// Produce a `v10` sealed blob. Inverse of [`open_sealed`].
pub fn seal(key: &[u8], nonce: &[u8; GCM_NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>, DecryptError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| DecryptError::KeyMismatch)?;
    let sealed = cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| DecryptError::MalformedCiphertext)?;

    let mut out = Vec::with_capacity(MIN_SEALED_LEN + plaintext.len());
    out.extend_from_slice(b"v10");
    out.extend_from_slice(nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Keychain service name holding the Safe Storage password.
pub fn safe_storage_service(browser: &str) -> &'static str {
    match browser.to_lowercase().as_str() {
        "chrome" | "google chrome" => "Chrome Safe Storage",
        "chromium" => "Chromium Safe Storage",
        "edge" | "microsoft edge" => "Microsoft Edge Safe Storage",
        "brave" => "Brave Safe Storage",
        "opera" => "Opera Safe Storage",
        "vivaldi" => "Vivaldi Safe Storage",
        "arc" => "Arc Safe Storage",
        _ => "Chrome Safe Storage",
    }
}

/// Derive the CBC key: PBKDF2_HMAC_SHA1(password, "saltysalt", iterations, 16).
/// macOS uses 1003 iterations, Linux uses 1.
pub fn derive_cbc_key(password: &[u8], iterations: u32) -> [u8; CBC_KEY_LENGTH] {
    use pbkdf2::pbkdf2_hmac;
    use sha1::Sha1;

    let mut key = [0u8; CBC_KEY_LENGTH];
    pbkdf2_hmac::<Sha1>(password, CBC_SALT, iterations, &mut key);
    key
}

/// Check if data carries a Chromium version prefix (`v10`, `v11`, `v20`).
pub fn is_encrypted(data: &[u8]) -> bool {
    data.len() >= VERSION_PREFIX_LEN
        && data[0] == b'v'
        && data[1].is_ascii_digit()
        && data[2].is_ascii_digit()
}

/// Decrypt a prefixed AES-128-CBC blob with the fixed Chromium IV.
pub fn decrypt_cbc(key: &[u8], encrypted: &[u8]) -> Result<Vec<u8>, DecryptError> {
    if !is_encrypted(encrypted) {
        return Err(DecryptError::MalformedCiphertext);
    }
    let ciphertext = &encrypted[VERSION_PREFIX_LEN..];
    if ciphertext.is_empty() {
        return Ok(Vec::new());
    }
    if ciphertext.len() % 16 != 0 {
        return Err(DecryptError::MalformedCiphertext);
    }

    let mut buf = ciphertext.to_vec();
    let dec = Aes128CbcDec::new_from_slices(key, &CHROMIUM_CBC_IV)
        .map_err(|_| DecryptError::KeyMismatch)?;
    let len = dec
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| DecryptError::PaddingInvalid)?
        .len();
    buf.truncate(len);
    Ok(buf)
}

#[cfg(test)]
pub(crate) fn encrypt_cbc(key: &[u8], plaintext: &[u8]) -> Vec<u8> {
    use aes::cipher::BlockEncryptMut;
    let enc = cbc::Encryptor::<aes::Aes128>::new_from_slices(key, &CHROMIUM_CBC_IV).unwrap();
    let mut buf = vec![0u8; plaintext.len() + 16];
    buf[..plaintext.len()].copy_from_slice(plaintext);
    let ct = enc
        .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
        .unwrap()
        .to_vec();
    [b"v10".to_vec(), ct].concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_encrypted() {
        assert!(is_encrypted(b"v10encrypted_data"));
        assert!(is_encrypted(b"v11encrypted_data"));
        assert!(!is_encrypted(b"plain_text"));
        assert!(!is_encrypted(b"v1")); // Too short
    }

    #[test]
    fn test_derive_key() {
        let mac = derive_cbc_key(b"test_password", 1003);
        let linux = derive_cbc_key(b"peanuts", 1);
        assert_eq!(mac.len(), 16);
        assert_ne!(mac, linux);
    }

    #[test]
    fn test_sealed_round_trip() {
        let key = [0x42u8; 32];
        let blob = seal(&key, &[7u8; 12], b"s3cret").unwrap();
        assert_eq!(blob.len(), MIN_SEALED_LEN + 6);
        assert_eq!(open_sealed(&key, &blob).unwrap(), b"s3cret");
    }

    #[test]
    fn test_sealed_wrong_key() {
        let blob = seal(&[1u8; 32], &[7u8; 12], b"s3cret").unwrap();
        assert_eq!(open_sealed(&[2u8; 32], &blob), Err(DecryptError::KeyMismatch));
    }

    #[test]
    fn test_sealed_short_blob() {
        for len in 0..MIN_SEALED_LEN {
            let blob = vec![b'v'; len];
            assert_eq!(
                open_sealed(&[0u8; 32], &blob),
                Err(DecryptError::MalformedCiphertext)
            );
        }
    }

    #[test]
    fn test_split_exposes_tag() {
        let blob = seal(&[1u8; 32], &[9u8; 12], b"abc").unwrap();
        let parts = SealedParts::split(&blob).unwrap();
        assert_eq!(parts.nonce, &[9u8; 12]);
        assert_eq!(parts.tag().len(), GCM_TAG_LEN);
    }

    #[test]
    fn test_cbc_round_trip() {
        let key = derive_cbc_key(b"peanuts", 1);
        let blob = encrypt_cbc(&key, b"cookie-value");
        assert_eq!(decrypt_cbc(&key, &blob).unwrap(), b"cookie-value");
    }

    #[test]
    fn test_service_names() {
        assert_eq!(safe_storage_service("Brave"), "Brave Safe Storage");
        assert_eq!(safe_storage_service("unknown"), "Chrome Safe Storage");
    }
}
