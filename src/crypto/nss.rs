//! NSS (Firefox `key4.db`) password-based-encryption structures
//!
//! Two PBE families are understood:
//! - `pbeWithSHA1AndTripleDES-CBC` with NSS's own SHA1/HMAC key schedule
//! - PBES2 (PBKDF2 + AES-256-CBC), used by Firefox 75+
//!
//! Both are keyed by the database's global salt and the (possibly empty)
//! master password. Anything else is reported as unsupported, never guessed.

use super::asn1::{Asn1Error, DerReader, ObjectId};
use super::block::{self, BlockError};
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

pub const OID_PBE_SHA1_3DES: &[u64] = &[1, 2, 840, 113549, 1, 12, 5, 1, 3];
pub const OID_PBES2: &[u64] = &[1, 2, 840, 113549, 1, 5, 13];
pub const OID_PBKDF2: &[u64] = &[1, 2, 840, 113549, 1, 5, 12];
pub const OID_HMAC_SHA1: &[u64] = &[1, 2, 840, 113549, 2, 7];
pub const OID_HMAC_SHA256: &[u64] = &[1, 2, 840, 113549, 2, 9];
pub const OID_AES256_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 42];
pub const OID_DES_EDE3_CBC: &[u64] = &[1, 2, 840, 113549, 3, 7];

/// Firefox writes 10_000; anything far above that is a hostile or corrupt file.
pub const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PbeError {
    #[error("malformed PBE structure: {0}")]
    Malformed(#[from] Asn1Error),

    #[error("unsupported algorithm {0}")]
    UnsupportedCipher(String),

    #[error("decryption failed: {0}")]
    Cipher(#[from] BlockError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prf {
    HmacSha1,
    HmacSha256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PbeScheme {
    /// NSS flavour of PKCS#12 `pbeWithSHA1AndTripleDES-CBC`.
    Sha1TripleDes { entry_salt: Vec<u8> },
    /// PBES2 with PBKDF2 and AES-256-CBC.
    Pbes2 {
        salt: Vec<u8>,
        iterations: u32,
        key_len: usize,
        prf: Prf,
        iv: Vec<u8>,
    },
}

/// A decoded `SEQUENCE { AlgorithmIdentifier, OCTET STRING }` PBE item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbeBlob {
    pub scheme: PbeScheme,
    pub ciphertext: Vec<u8>,
}

impl PbeBlob {
    pub fn parse(bytes: &[u8]) -> Result<Self, PbeError> {
        let mut outer = DerReader::new(bytes).sequence()?;
        let mut alg = outer.sequence()?;
        let oid = alg.oid()?;

        let scheme = if oid.is(OID_PBE_SHA1_3DES) {
            let mut params = alg.sequence()?;
            let entry_salt = params.octet_string()?.to_vec();
            // iteration count is present but NSS always uses a single pass
            params.optional_integer_u32()?;
            PbeScheme::Sha1TripleDes { entry_salt }
        } else if oid.is(OID_PBES2) {
            parse_pbes2(alg.sequence()?)?
        } else {
            return Err(PbeError::UnsupportedCipher(oid.to_string()));
        };

        let ciphertext = outer.octet_string()?.to_vec();
        Ok(Self { scheme, ciphertext })
    }

    /// Decrypt with a key derived from `(global_salt, password)`.
    ///
    /// Padding is left in place: callers either search for a marker or
    /// take a fixed-length prefix.
    pub fn decrypt(&self, global_salt: &[u8], password: &[u8]) -> Result<Zeroizing<Vec<u8>>, PbeError> {
        match &self.scheme {
            PbeScheme::Sha1TripleDes { entry_salt } => {
                let (key, iv) = derive_sha1_3des(global_salt, password, entry_salt)?;
                let plain = block::des3_cbc_decrypt(&key, &iv, &self.ciphertext)?;
                Ok(Zeroizing::new(plain))
            }
            PbeScheme::Pbes2 {
                salt,
                iterations,
                key_len,
                prf,
                iv,
            } => {
                let key = derive_pbkdf2(global_salt, password, salt, *iterations, *key_len, *prf);
                let iv = nss_aes_iv(iv);
                let plain = block::aes256_cbc_decrypt(&key, &iv, &self.ciphertext)?;
                Ok(Zeroizing::new(plain))
            }
        }
    }
}

fn parse_pbes2(mut params: DerReader<'_>) -> Result<PbeScheme, PbeError> {
    let mut kdf = params.sequence()?;
    let kdf_oid = kdf.oid()?;
    if !kdf_oid.is(OID_PBKDF2) {
        return Err(PbeError::UnsupportedCipher(kdf_oid.to_string()));
    }
    let mut kdf_params = kdf.sequence()?;
    let salt = kdf_params.octet_string()?.to_vec();
    let iterations = kdf_params.integer_u32()?;
    if iterations == 0 || iterations > MAX_PBKDF2_ITERATIONS {
        return Err(PbeError::UnsupportedCipher(format!(
            "{} with {} iterations",
            kdf_oid, iterations
        )));
    }
    let key_len = kdf_params
        .optional_integer_u32()?
        .map(|n| n as usize)
        .unwrap_or(block::AES256_KEY_LEN);

    // PRF defaults to HMAC-SHA1 when omitted
    let prf = if kdf_params.is_empty() {
        Prf::HmacSha1
    } else {
        let prf_oid = kdf_params.sequence()?.oid()?;
        prf_from_oid(&prf_oid)?
    };

    let mut enc = params.sequence()?;
    let enc_oid = enc.oid()?;
    if !enc_oid.is(OID_AES256_CBC) {
        return Err(PbeError::UnsupportedCipher(enc_oid.to_string()));
    }
    if key_len != block::AES256_KEY_LEN {
        return Err(PbeError::UnsupportedCipher(format!(
            "{} with {}-byte key",
            enc_oid, key_len
        )));
    }
    let iv = enc.octet_string()?.to_vec();

    Ok(PbeScheme::Pbes2 {
        salt,
        iterations,
        key_len,
        prf,
        iv,
    })
}

fn prf_from_oid(oid: &ObjectId) -> Result<Prf, PbeError> {
    if oid.is(OID_HMAC_SHA256) {
        Ok(Prf::HmacSha256)
    } else if oid.is(OID_HMAC_SHA1) {
        Ok(Prf::HmacSha1)
    } else {
        Err(PbeError::UnsupportedCipher(oid.to_string()))
    }
}

/// NSS stores a 14-byte IV for AES; the cipher sees it behind an `04 0E` header.
fn nss_aes_iv(stored: &[u8]) -> Vec<u8> {
    if stored.len() == block::AES_BLOCK - 2 {
        let mut iv = vec![0x04, 0x0e];
        iv.extend_from_slice(stored);
        iv
    } else {
        stored.to_vec()
    }
}

fn hashed_password(global_salt: &[u8], password: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut h = Sha1::new();
    h.update(global_salt);
    h.update(password);
    Zeroizing::new(h.finalize().to_vec())
}

fn hmac_sha1(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 20], BlockError> {
    let mut mac = <HmacSha1 as Mac>::new_from_slice(key).map_err(|_| BlockError::KeyLength)?;
    for p in parts {
        mac.update(p);
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// NSS key schedule for `pbeWithSHA1AndTripleDES-CBC`. Returns `(key, iv)`.
pub fn derive_sha1_3des(
    global_salt: &[u8],
    password: &[u8],
    entry_salt: &[u8],
) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), BlockError> {
    let hp = hashed_password(global_salt, password);

    let mut pes = entry_salt.to_vec();
    pes.resize(pes.len().max(20), 0);

    let chp = {
        let mut h = Sha1::new();
        h.update(hp.as_slice());
        h.update(entry_salt);
        Zeroizing::new(h.finalize().to_vec())
    };

    let k1 = hmac_sha1(&chp, &[pes.as_slice(), entry_salt])?;
    let tk = hmac_sha1(&chp, &[pes.as_slice()])?;
    let k2 = hmac_sha1(&chp, &[tk.as_slice(), entry_salt])?;

    let mut k = Zeroizing::new(Vec::with_capacity(40));
    k.extend_from_slice(&k1);
    k.extend_from_slice(&k2);

    let key = Zeroizing::new(k[..block::DES3_KEY_LEN].to_vec());
    let iv = k[k.len() - block::DES3_BLOCK..].to_vec();
    Ok((key, iv))
}

pub fn derive_pbkdf2(
    global_salt: &[u8],
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    key_len: usize,
    prf: Prf,
) -> Zeroizing<Vec<u8>> {
    let hp = hashed_password(global_salt, password);
    let mut key = Zeroizing::new(vec![0u8; key_len]);
    match prf {
        Prf::HmacSha1 => pbkdf2::pbkdf2_hmac::<Sha1>(&hp, salt, iterations, &mut key),
        Prf::HmacSha256 => pbkdf2::pbkdf2_hmac::<Sha256>(&hp, salt, iterations, &mut key),
    }
    key
}

/// Encrypted login field from `logins.json`:
/// `SEQUENCE { OCTET STRING key_id, SEQUENCE { OID, OCTET STRING iv }, OCTET STRING data }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginEnvelope {
    pub key_id: Vec<u8>,
    pub algorithm: ObjectId,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl LoginEnvelope {
    pub fn parse(bytes: &[u8]) -> Result<Self, Asn1Error> {
        let mut outer = DerReader::new(bytes).sequence()?;
        let key_id = outer.octet_string()?.to_vec();
        let mut alg = outer.sequence()?;
        let algorithm = alg.oid()?;
        let iv = alg.octet_string()?.to_vec();
        let ciphertext = outer.octet_string()?.to_vec();
        Ok(Self {
            key_id,
            algorithm,
            iv,
            ciphertext,
        })
    }
}

#[cfg(test)]
pub(crate) mod build {
    //! Encoders mirroring the parsers above, for fixtures.
    use super::*;
    use crate::crypto::asn1::build::*;
    use crate::crypto::block::seal;

    pub fn sha1_3des_item(global_salt: &[u8], password: &[u8], entry_salt: &[u8], plain: &[u8]) -> Vec<u8> {
        let (key, iv) = derive_sha1_3des(global_salt, password, entry_salt).unwrap();
        let ct = seal::des3_cbc_encrypt(&key, &iv, plain);
        seq(&[
            seq(&[oid(OID_PBE_SHA1_3DES), seq(&[octets(entry_salt), int(1)])]),
            octets(&ct),
        ])
    }

    pub fn pbes2_item(global_salt: &[u8], password: &[u8], salt: &[u8], iterations: u32, iv14: &[u8], plain: &[u8]) -> Vec<u8> {
        let key = derive_pbkdf2(global_salt, password, salt, iterations, 32, Prf::HmacSha256);
        let ct = seal::aes256_cbc_encrypt(&key, &nss_aes_iv(iv14), plain);
        seq(&[
            seq(&[
                oid(OID_PBES2),
                seq(&[
                    seq(&[
                        oid(OID_PBKDF2),
                        seq(&[octets(salt), int(iterations), int(32), seq(&[oid(OID_HMAC_SHA256)])]),
                    ]),
                    seq(&[oid(OID_AES256_CBC), octets(iv14)]),
                ]),
            ]),
            octets(&ct),
        ])
    }

    pub fn login_field(key: &[u8], iv: &[u8], plain: &[u8]) -> Vec<u8> {
        let ct = seal::des3_cbc_encrypt(key, iv, plain);
        seq(&[
            octets(&[0xF8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]),
            seq(&[oid(OID_DES_EDE3_CBC), octets(iv)]),
            octets(&ct),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::build::*;
    use super::*;
    use crate::crypto::asn1::build::*;

    const GLOBAL_SALT: &[u8] = b"0123456789abcdef0123";

    #[test]
    fn test_sha1_3des_round_trip() {
        let item = sha1_3des_item(GLOBAL_SALT, b"", b"entry-salt", b"password-check\x02\x02");
        let blob = PbeBlob::parse(&item).unwrap();
        assert!(matches!(blob.scheme, PbeScheme::Sha1TripleDes { .. }));
        let plain = blob.decrypt(GLOBAL_SALT, b"").unwrap();
        assert!(plain.starts_with(b"password-check"));
    }

    #[test]
    fn test_pbes2_round_trip() {
        let item = pbes2_item(GLOBAL_SALT, b"secret", b"pbkdf2-salt", 100, &[5u8; 14], b"password-check");
        let blob = PbeBlob::parse(&item).unwrap();
        match &blob.scheme {
            PbeScheme::Pbes2 { iterations, prf, key_len, .. } => {
                assert_eq!(*iterations, 100);
                assert_eq!(*prf, Prf::HmacSha256);
                assert_eq!(*key_len, 32);
            }
            other => panic!("unexpected scheme {:?}", other),
        }
        let plain = blob.decrypt(GLOBAL_SALT, b"secret").unwrap();
        assert!(plain.starts_with(b"password-check"));
    }

    #[test]
    fn test_unknown_oid_is_unsupported() {
        let item = seq(&[
            seq(&[oid(&[1, 2, 840, 113549, 1, 12, 5, 1, 6]), seq(&[octets(b"s"), int(1)])]),
            octets(&[0u8; 8]),
        ]);
        assert_eq!(
            PbeBlob::parse(&item),
            Err(PbeError::UnsupportedCipher("1.2.840.113549.1.12.5.1.6".to_string()))
        );
    }

    #[test]
    fn test_pbes2_unknown_cipher_is_unsupported() {
        let item = seq(&[
            seq(&[
                oid(OID_PBES2),
                seq(&[
                    seq(&[oid(OID_PBKDF2), seq(&[octets(b"salt"), int(1), int(32)])]),
                    // aes128-CBC
                    seq(&[oid(&[2, 16, 840, 1, 101, 3, 4, 1, 2]), octets(&[0u8; 14])]),
                ]),
            ]),
            octets(&[0u8; 16]),
        ]);
        assert!(matches!(PbeBlob::parse(&item), Err(PbeError::UnsupportedCipher(_))));
    }

    #[test]
    fn test_pbes2_iteration_count_is_capped() {
        let item = seq(&[
            seq(&[
                oid(OID_PBES2),
                seq(&[
                    seq(&[oid(OID_PBKDF2), seq(&[octets(b"salt"), int(u32::MAX), int(32)])]),
                    seq(&[oid(OID_AES256_CBC), octets(&[0u8; 14])]),
                ]),
            ]),
            octets(&[0u8; 16]),
        ]);
        match PbeBlob::parse(&item) {
            Err(PbeError::UnsupportedCipher(msg)) => assert!(msg.contains("4294967295")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(PbeBlob::parse(b"not asn1"), Err(PbeError::Malformed(_))));
        assert!(matches!(PbeBlob::parse(&[]), Err(PbeError::Malformed(_))));
    }

    #[test]
    fn test_nss_aes_iv_prefix() {
        let iv = nss_aes_iv(&[0xAA; 14]);
        assert_eq!(iv.len(), 16);
        assert_eq!(&iv[..2], &[0x04, 0x0e]);
        assert_eq!(nss_aes_iv(&[0xBB; 16]), vec![0xBB; 16]);
    }

    #[test]
    fn test_login_envelope_parse() {
        let field = login_field(&[1u8; 24], &[2u8; 8], b"alice");
        let env = LoginEnvelope::parse(&field).unwrap();
        assert!(env.algorithm.is(OID_DES_EDE3_CBC));
        assert_eq!(env.iv, vec![2u8; 8]);
        assert_eq!(env.ciphertext.len() % 8, 0);
    }
}
