//! OS-level secret protection ("unprotect a blob")
//!
//! | Platform | Backend |
//! |----------|---------|
//! | Windows  | DPAPI `CryptUnprotectData` |
//! | macOS    | Keychain Safe Storage password + AES-128-CBC |
//! | Linux    | Fixed `peanuts` password + AES-128-CBC |
//! | other    | identity |

use crate::error::DecryptError;

pub mod linux;
pub mod macos;
#[cfg(windows)]
pub mod windows;

pub use linux::ObfuscationUnwrap;
pub use macos::KeychainUnwrap;

/// Platform capability that removes OS-level protection from a blob.
pub trait OsUnwrap: Send + Sync {
    fn name(&self) -> &'static str;
    fn unprotect(&self, blob: &[u8]) -> Result<Vec<u8>, DecryptError>;
}

/// Fallback for platforms without OS-level protection.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityUnwrap;

impl OsUnwrap for IdentityUnwrap {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn unprotect(&self, blob: &[u8]) -> Result<Vec<u8>, DecryptError> {
        Ok(blob.to_vec())
    }
}

/// Backend for the platform this binary runs on.
pub fn platform_default(browser: &str) -> Box<dyn OsUnwrap> {
    #[cfg(windows)]
    {
        let _ = browser;
        Box::new(windows::DpapiUnwrap)
    }

    #[cfg(target_os = "macos")]
    {
        Box::new(KeychainUnwrap::new(browser))
    }

    #[cfg(target_os = "linux")]
    {
        let _ = browser;
        Box::new(ObfuscationUnwrap)
    }

    #[cfg(not(any(windows, target_os = "macos", target_os = "linux")))]
    {
        let _ = browser;
        Box::new(IdentityUnwrap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_passthrough() {
        let unwrap = IdentityUnwrap;
        assert_eq!(unwrap.unprotect(b"abc").unwrap(), b"abc");
        assert_eq!(unwrap.name(), "identity");
    }

    #[test]
    fn test_platform_default_has_name() {
        let backend = platform_default("chrome");
        assert!(!backend.name().is_empty());
    }
}
