//! Master key resolution
//!
//! Turns a profile's [`MasterKeyMaterial`] into the one [`ResolvedKey`] every
//! field of that profile is decrypted with. Any failure here is profile-fatal.
//!
//! Webkit:
//! - no wrapped key: [`ResolvedKey::Legacy`], fields go straight to OS-Unwrap
//! - KEK only: `OS-Unwrap(kek)` is the 32-byte key
//! - KEK + sealed blob: AES-256-GCM open of the blob under `OS-Unwrap(kek)`
//!
//! Gecko, two PBE stages keyed by the global salt and master password:
//! 1. decrypt `metaData.item2` and look for `password-check`
//! 2. check `nssPrivate.a102`, decrypt `nssPrivate.a11`, keep 24 bytes

use crate::browsers::Family;
use crate::crypto::block::{BlockError, DES3_KEY_LEN};
use crate::crypto::chromium::{self, GCM_KEY_LEN};
use crate::crypto::nss::{PbeBlob, PbeError};
use crate::error::{DecryptError, ProfileError, ProfileResult};
use crate::key_source::{GeckoKeyMaterial, MasterKeyMaterial, WrappedKey};
use crate::os_unwrap::OsUnwrap;
use std::fmt;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

const PASSWORD_CHECK: &[u8] = b"password-check";

/// `CKA_ID` of the only private key layout we know how to read.
pub const NSS_KEY_ID: [u8; 16] = [0xF8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];

/// Symmetric key shared read-only by every field decryption of one profile.
/// Zeroized on drop; `Debug` never prints the bytes.
pub enum ResolvedKey {
    /// Webkit profile without a master key: fields are OS-protected one by one.
    Legacy,
    Webkit(Zeroizing<Vec<u8>>),
    Gecko(Zeroizing<Vec<u8>>),
}

impl ResolvedKey {
    pub fn webkit(bytes: &[u8]) -> Self {
        ResolvedKey::Webkit(Zeroizing::new(bytes.to_vec()))
    }

    pub fn gecko(bytes: &[u8]) -> Self {
        ResolvedKey::Gecko(Zeroizing::new(bytes.to_vec()))
    }

    pub fn family(&self) -> Family {
        match self {
            ResolvedKey::Legacy | ResolvedKey::Webkit(_) => Family::Webkit,
            ResolvedKey::Gecko(_) => Family::Gecko,
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            ResolvedKey::Legacy => None,
            ResolvedKey::Webkit(k) | ResolvedKey::Gecko(k) => Some(k.as_slice()),
        }
    }

    /// Whether the key has the length its family's cipher requires.
    pub fn has_valid_length(&self) -> bool {
        match self {
            ResolvedKey::Legacy => true,
            ResolvedKey::Webkit(k) => k.len() == GCM_KEY_LEN,
            ResolvedKey::Gecko(k) => k.len() == DES3_KEY_LEN,
        }
    }
}

impl fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedKey::Legacy => write!(f, "ResolvedKey::Legacy"),
            ResolvedKey::Webkit(k) => write!(f, "ResolvedKey::Webkit([redacted; {}])", k.len()),
            ResolvedKey::Gecko(k) => write!(f, "ResolvedKey::Gecko([redacted; {}])", k.len()),
        }
    }
}

/// Instrumentation hook into the Gecko chain.
pub trait StageObserver: Send + Sync {
    fn stage_two_started(&self) {}
}

pub struct MasterKeyResolver<'a> {
    os: &'a dyn OsUnwrap,
    password: Zeroizing<String>,
    observer: Option<&'a dyn StageObserver>,
}

impl<'a> MasterKeyResolver<'a> {
    pub fn new(os: &'a dyn OsUnwrap) -> Self {
        Self {
            os,
            password: Zeroizing::new(String::new()),
            observer: None,
        }
    }

    /// Gecko master password. Defaults to empty.
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Zeroizing::new(password.to_string());
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn StageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn resolve(&self, material: &MasterKeyMaterial) -> ProfileResult<ResolvedKey> {
        let key = match material {
            MasterKeyMaterial::Webkit(wrapped) => self.resolve_webkit(wrapped.as_ref())?,
            MasterKeyMaterial::Gecko(gecko) => self.resolve_gecko(gecko)?,
        };
        debug!("Resolved master key: {:?}", key);
        Ok(key)
    }

    fn resolve_webkit(&self, wrapped: Option<&WrappedKey>) -> ProfileResult<ResolvedKey> {
        let Some(wrapped) = wrapped else {
            return Ok(ResolvedKey::Legacy);
        };

        let kek = self.os.unprotect(&wrapped.protected_kek).map(Zeroizing::new).map_err(|e| {
            warn!("⚠️  {} could not unprotect the key-encryption-key: {}", self.os.name(), e);
            ProfileError::KeyMismatch
        })?;

        let key = match &wrapped.sealed {
            None => kek,
            Some(sealed) => {
                let opened = chromium::open_sealed(&kek, sealed).map_err(|e| match e {
                    DecryptError::MalformedCiphertext => ProfileError::MalformedCiphertext,
                    _ => ProfileError::KeyMismatch,
                })?;
                Zeroizing::new(opened)
            }
        };

        if key.len() != GCM_KEY_LEN {
            warn!("⚠️  Master key is {} bytes, expected {}", key.len(), GCM_KEY_LEN);
            return Err(ProfileError::KeyMismatch);
        }
        Ok(ResolvedKey::Webkit(key))
    }

    fn resolve_gecko(&self, material: &GeckoKeyMaterial) -> ProfileResult<ResolvedKey> {
        let password = self.password.as_bytes();

        // Stage 1: metadata password check
        let meta = PbeBlob::parse(&material.meta_bytes).map_err(pbe_to_profile)?;
        let check = meta
            .decrypt(&material.global_salt, password)
            .map_err(pbe_to_profile)?;
        if !contains(&check, PASSWORD_CHECK) {
            info!("🔒 Profile key database is protected by a master password");
            return Err(ProfileError::MasterPasswordRequired);
        }
        debug!("password-check passed");

        // Stage 2: private key
        if let Some(observer) = self.observer {
            observer.stage_two_started();
        }
        if material.nss_a102 != NSS_KEY_ID {
            warn!("⚠️  Unsupported nssPrivate key id ({} bytes)", material.nss_a102.len());
            return Err(ProfileError::UnsupportedKeyFormat);
        }
        let private = PbeBlob::parse(&material.nss_a11).map_err(pbe_to_profile)?;
        let raw = private
            .decrypt(&material.global_salt, password)
            .map_err(pbe_to_profile)?;
        if raw.len() < DES3_KEY_LEN {
            return Err(ProfileError::KeyMismatch);
        }
        Ok(ResolvedKey::Gecko(Zeroizing::new(raw[..DES3_KEY_LEN].to_vec())))
    }
}

fn pbe_to_profile(e: PbeError) -> ProfileError {
    match e {
        PbeError::Malformed(_) => ProfileError::MalformedCiphertext,
        PbeError::UnsupportedCipher(oid) => ProfileError::UnsupportedCipher(oid),
        PbeError::Cipher(BlockError::Alignment) => ProfileError::MalformedCiphertext,
        PbeError::Cipher(_) => ProfileError::KeyMismatch,
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
