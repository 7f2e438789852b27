//! Crypto module for browser data decryption
//!
//! Supports Chromium-based browsers (AES-GCM / AES-CBC) and Firefox NSS
//! key databases (ASN.1 PBE, 3DES, AES-CBC).

pub mod asn1;
pub mod block;
pub mod chromium;
pub mod nss;

pub use chromium::{is_encrypted, open_sealed, seal};
pub use nss::{LoginEnvelope, PbeBlob, PbeError};
