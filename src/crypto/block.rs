//! CBC block-cipher primitives shared by the Gecko key chain and field decryption

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};
use thiserror::Error;

type TdesCbcDec = cbc::Decryptor<des::TdesEde3>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const DES3_KEY_LEN: usize = 24;
pub const DES3_BLOCK: usize = 8;
pub const AES256_KEY_LEN: usize = 32;
pub const AES_BLOCK: usize = 16;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    #[error("invalid key or IV length")]
    KeyLength,

    #[error("ciphertext is not a whole number of blocks")]
    Alignment,

    #[error("invalid PKCS#5 padding")]
    Padding,
}

/// 3DES-EDE-CBC decrypt without removing padding.
pub fn des3_cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, BlockError> {
    if ciphertext.is_empty() || ciphertext.len() % DES3_BLOCK != 0 {
        return Err(BlockError::Alignment);
    }
    let dec = TdesCbcDec::new_from_slices(key, iv).map_err(|_| BlockError::KeyLength)?;
    let mut buf = ciphertext.to_vec();
    let len = dec
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| BlockError::Alignment)?
        .len();
    buf.truncate(len);
    Ok(buf)
}

/// AES-256-CBC decrypt without removing padding.
pub fn aes256_cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, BlockError> {
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK != 0 {
        return Err(BlockError::Alignment);
    }
    let dec = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| BlockError::KeyLength)?;
    let mut buf = ciphertext.to_vec();
    let len = dec
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| BlockError::Alignment)?
        .len();
    buf.truncate(len);
    Ok(buf)
}

/// Strip PKCS#5/PKCS#7 padding for the given block size.
pub fn pkcs5_unpad(data: &[u8], block: usize) -> Result<&[u8], BlockError> {
    let &n = data.last().ok_or(BlockError::Padding)?;
    let n = usize::from(n);
    if n == 0 || n > block || n > data.len() {
        return Err(BlockError::Padding);
    }
    let (body, pad) = data.split_at(data.len() - n);
    if pad.iter().any(|&b| usize::from(b) != n) {
        return Err(BlockError::Padding);
    }
    Ok(body)
}


#[cfg(test)]
mod tests {
    use super::seal::*;
    use super::*;

    #[test]
    fn test_des3_round_trip() {
        let key = [7u8; DES3_KEY_LEN];
        let iv = [1u8; DES3_BLOCK];
        let ct = des3_cbc_encrypt(&key, &iv, b"hunter2");
        let pt = des3_cbc_decrypt(&key, &iv, &ct).unwrap();
        assert_eq!(pkcs5_unpad(&pt, DES3_BLOCK).unwrap(), b"hunter2");
    }

    #[test]
    fn test_aes256_round_trip() {
        let key = [9u8; AES256_KEY_LEN];
        let iv = [3u8; AES_BLOCK];
        let ct = aes256_cbc_encrypt(&key, &iv, b"password-check");
        let pt = aes256_cbc_decrypt(&key, &iv, &ct).unwrap();
        assert_eq!(pkcs5_unpad(&pt, AES_BLOCK).unwrap(), b"password-check");
    }

    #[test]
    fn test_misaligned_ciphertext() {
        let key = [7u8; DES3_KEY_LEN];
        let iv = [1u8; DES3_BLOCK];
        assert_eq!(
            des3_cbc_decrypt(&key, &iv, &[0u8; 13]),
            Err(BlockError::Alignment)
        );
    }

    #[test]
    fn test_wrong_key_length() {
        assert_eq!(
            des3_cbc_decrypt(&[0u8; 16], &[0u8; 8], &[0u8; 8]),
            Err(BlockError::KeyLength)
        );
    }

    #[test]
    fn test_unpad_rejects_bad_padding() {
        assert_eq!(pkcs5_unpad(b"abcdefg\x00", 8), Err(BlockError::Padding));
        assert_eq!(pkcs5_unpad(b"abcdef\x03\x02", 8), Err(BlockError::Padding));
        assert_eq!(pkcs5_unpad(b"abcdefg\x09", 8), Err(BlockError::Padding));
        assert_eq!(pkcs5_unpad(b"", 8), Err(BlockError::Padding));
        assert_eq!(pkcs5_unpad(b"abcdef\x02\x02", 8).unwrap(), b"abcdef");
    }
}
