//! Minimal DER reader for the NSS key database structures
//!
//! Only the handful of universal tags NSS emits are understood: SEQUENCE,
//! OCTET STRING, OBJECT IDENTIFIER, INTEGER and NULL. Every read is bounds
//! checked; malformed input surfaces as [`Asn1Error`], never a panic.

use std::fmt;
use thiserror::Error;

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_SEQUENCE: u8 = 0x30;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Asn1Error {
    #[error("unexpected end of data")]
    Truncated,

    #[error("expected tag {expected:#04x}, found {found:#04x}")]
    UnexpectedTag { expected: u8, found: u8 },

    #[error("unsupported length encoding")]
    BadLength,

    #[error("integer out of range")]
    IntegerOverflow,

    #[error("invalid object identifier")]
    BadOid,
}

pub type Asn1Result<T> = std::result::Result<T, Asn1Error>;

/// A decoded OBJECT IDENTIFIER, kept as its arc list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectId(Vec<u64>);

impl ObjectId {
    pub fn from_der(content: &[u8]) -> Asn1Result<Self> {
        let (&first, rest) = content.split_first().ok_or(Asn1Error::BadOid)?;
        let mut arcs = vec![u64::from(first / 40), u64::from(first % 40)];

        let mut acc: u64 = 0;
        let mut pending = false;
        for &b in rest {
            if acc > (u64::MAX >> 7) {
                return Err(Asn1Error::BadOid);
            }
            acc = (acc << 7) | u64::from(b & 0x7f);
            pending = b & 0x80 != 0;
            if !pending {
                arcs.push(acc);
                acc = 0;
            }
        }
        if pending {
            return Err(Asn1Error::BadOid);
        }
        Ok(Self(arcs))
    }

    pub fn arcs(&self) -> &[u64] {
        &self.0
    }

    pub fn is(&self, arcs: &[u64]) -> bool {
        self.0 == arcs
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|a| a.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Cursor over a run of DER TLVs.
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn take(&mut self, n: usize) -> Asn1Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(Asn1Error::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(Asn1Error::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn read_length(&mut self) -> Asn1Result<usize> {
        let first = self.take(1)?[0];
        if first < 0x80 {
            return Ok(usize::from(first));
        }
        let count = usize::from(first & 0x7f);
        // 0x80 is the BER indefinite form, never valid DER
        if count == 0 || count > 4 {
            return Err(Asn1Error::BadLength);
        }
        let bytes = self.take(count)?;
        Ok(bytes.iter().fold(0usize, |acc, &b| (acc << 8) | usize::from(b)))
    }

    /// Read one TLV and return `(tag, content)`.
    pub fn read_any(&mut self) -> Asn1Result<(u8, &'a [u8])> {
        let tag = self.take(1)?[0];
        let len = self.read_length()?;
        let content = self.take(len)?;
        Ok((tag, content))
    }

    pub fn expect(&mut self, tag: u8) -> Asn1Result<&'a [u8]> {
        let found = self.peek_tag().ok_or(Asn1Error::Truncated)?;
        if found != tag {
            return Err(Asn1Error::UnexpectedTag {
                expected: tag,
                found,
            });
        }
        let (_, content) = self.read_any()?;
        Ok(content)
    }

    pub fn sequence(&mut self) -> Asn1Result<DerReader<'a>> {
        self.expect(TAG_SEQUENCE).map(DerReader::new)
    }

    pub fn octet_string(&mut self) -> Asn1Result<&'a [u8]> {
        self.expect(TAG_OCTET_STRING)
    }

    pub fn oid(&mut self) -> Asn1Result<ObjectId> {
        ObjectId::from_der(self.expect(TAG_OID)?)
    }

    /// Non-negative INTEGER that fits in a `u32`.
    pub fn integer_u32(&mut self) -> Asn1Result<u32> {
        let content = self.expect(TAG_INTEGER)?;
        if content.is_empty() || content[0] & 0x80 != 0 {
            return Err(Asn1Error::IntegerOverflow);
        }
        let trimmed = match content.iter().position(|&b| b != 0) {
            Some(i) => &content[i..],
            None => return Ok(0),
        };
        if trimmed.len() > 4 {
            return Err(Asn1Error::IntegerOverflow);
        }
        Ok(trimmed.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
    }

    /// Consume an optional INTEGER, returning `None` if the next tag is something else.
    pub fn optional_integer_u32(&mut self) -> Asn1Result<Option<u32>> {
        match self.peek_tag() {
            Some(TAG_INTEGER) => self.integer_u32().map(Some),
            _ => Ok(None),
        }
    }
}

/// DER encoding helpers, used to build fixtures for the decoders.
#[cfg(test)]
pub(crate) mod build {
    use super::*;

    pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        let len = content.len();
        if len < 0x80 {
            out.push(len as u8);
        } else if len <= 0xff {
            out.extend_from_slice(&[0x81, len as u8]);
        } else {
            out.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]);
        }
        out.extend_from_slice(content);
        out
    }

    pub fn seq(parts: &[Vec<u8>]) -> Vec<u8> {
        tlv(TAG_SEQUENCE, &parts.concat())
    }

    pub fn octets(bytes: &[u8]) -> Vec<u8> {
        tlv(TAG_OCTET_STRING, bytes)
    }

    pub fn int(value: u32) -> Vec<u8> {
        let mut bytes: Vec<u8> = value.to_be_bytes().to_vec();
        while bytes.len() > 1 && bytes[0] == 0 && bytes[1] & 0x80 == 0 {
            bytes.remove(0);
        }
        if bytes[0] & 0x80 != 0 {
            bytes.insert(0, 0);
        }
        tlv(TAG_INTEGER, &bytes)
    }

    pub fn oid(arcs: &[u64]) -> Vec<u8> {
        let mut content = vec![(arcs[0] * 40 + arcs[1]) as u8];
        for &arc in &arcs[2..] {
            let mut chunk = vec![(arc & 0x7f) as u8];
            let mut rest = arc >> 7;
            while rest > 0 {
                chunk.insert(0, ((rest & 0x7f) as u8) | 0x80);
                rest >>= 7;
            }
            content.extend_from_slice(&chunk);
        }
        tlv(TAG_OID, &content)
    }
}
