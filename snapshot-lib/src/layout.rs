//! Primitives shared by the account decoders.
//!
//! Accounts of the registry program are Anchor `zero_copy` accounts: an 8 byte
//! discriminator followed by a `repr(C)` struct with little-endian integers.
//! Every field offset is fixed per schema version, so decoding is a single
//! forward pass over the buffer with no guessing.

use crate::address::{Address, ADDRESS_LEN};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DISCRIMINATOR_LEN: usize = 8;

pub type Discriminator = [u8; DISCRIMINATOR_LEN];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("account is {actual} bytes long, expected {expected}")]
    WrongSize { expected: usize, actual: usize },
    #[error("unknown account discriminator {}", hex::encode(.found))]
    WrongDiscriminator { found: Discriminator },
    #[error("field `{field}` at offset {offset} runs past the end of the account")]
    TruncatedField { field: &'static str, offset: usize },
    #[error("field `{field}` holds invalid value {value}")]
    InvalidField { field: &'static str, value: i64 },
}

/// Anchor account discriminator: the first 8 bytes of `sha256("account:<name>")`.
pub fn account_discriminator(name: &str) -> Discriminator {
    let digest = Sha256::new()
        .chain_update(b"account:")
        .chain_update(name.as_bytes())
        .finalize();
    let mut discriminator = [0u8; DISCRIMINATOR_LEN];
    discriminator.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    discriminator
}

pub(crate) fn check_size(data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() != expected {
        return Err(DecodeError::WrongSize {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Forward-only cursor over an account buffer.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    fn take(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::TruncatedField {
                field,
                offset: self.offset,
            })?;
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(field, N)?);
        Ok(out)
    }

    pub(crate) fn skip(&mut self, field: &'static str, len: usize) -> Result<(), DecodeError> {
        self.take(field, len).map(|_| ())
    }

    pub(crate) fn discriminator(&mut self) -> Result<Discriminator, DecodeError> {
        self.array("discriminator")
    }

    pub(crate) fn u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.array::<1>(field)?[0])
    }

    pub(crate) fn i8(&mut self, field: &'static str) -> Result<i8, DecodeError> {
        Ok(i8::from_le_bytes(self.array(field)?))
    }

    pub(crate) fn u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array(field)?))
    }

    pub(crate) fn i64(&mut self, field: &'static str) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.array(field)?))
    }

    /// A strict boolean: anything but 0 or 1 is rejected.
    pub(crate) fn bool(&mut self, field: &'static str) -> Result<bool, DecodeError> {
        match self.u8(field)? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(DecodeError::InvalidField {
                field,
                value: value.into(),
            }),
        }
    }

    pub(crate) fn address(&mut self, field: &'static str) -> Result<Address, DecodeError> {
        Ok(Address::new(self.array::<ADDRESS_LEN>(field)?))
    }
}
