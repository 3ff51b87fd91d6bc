//! Encoding and decoding of the control messages exchanged between members.
//!
//! Every message starts with the 16-bit protocol version ordinal it was written with, followed by
//! a one byte kind discriminator and the kind specific body. The version is read first so the
//! decoder can select the right layout before interpreting anything else. All integers are
//! big-endian.
//!
//! The [`Encode`] and [`Decode`] traits abstract over anything that can be written to a
//! [`Connection`](crate::connection::Connection). [`WireMessage`] is the closed set of messages
//! this crate understands.

use bytes::{BufMut, BytesMut};

use crate::error::{CodecError, DecodeError};

pub mod framing;
mod message;
mod version;

pub use message::{MessageKind, WireMessage};
pub use version::{negotiate, Version};

/// Encode a value into bytes for transmission at a given protocol version.
pub trait Encode {
    /// Appends the encoded form of `self` to `buf`.
    ///
    /// On error `buf` may contain a partial encoding and must be discarded.
    fn encode(&self, version: Version, buf: &mut BytesMut) -> Result<(), CodecError>;
}

/// Decode a value received from the network.
pub trait Decode: Sized {
    /// Decodes a complete value from `bytes`, which must have been written with `version`.
    fn decode(bytes: &[u8], version: Version) -> Result<Self, DecodeError>;
}

/// Encodes `value` into a freshly allocated vector.
pub fn encode_to_vec<T: Encode + ?Sized>(
    value: &T,
    version: Version,
) -> Result<Vec<u8>, CodecError> {
    let mut buf = BytesMut::new();
    value.encode(version, &mut buf)?;
    Ok(buf.to_vec())
}

/// Decodes a value written with `version`.
pub fn decode<T: Decode>(bytes: &[u8], version: Version) -> Result<T, DecodeError> {
    T::decode(bytes, version)
}

pub(crate) fn put_len(
    buf: &mut BytesMut,
    field: &'static str,
    len: usize,
    version: Version,
) -> Result<(), CodecError> {
    let max = version.max_field_len();
    if len > max {
        return Err(CodecError::FieldTooLong {
            field,
            len,
            max,
            version,
        });
    }
    match version {
        Version::V1 => buf.put_u16(len as u16),
        Version::V2 => buf.put_u32(len as u32),
    }
    Ok(())
}

pub(crate) fn put_bytes(
    buf: &mut BytesMut,
    field: &'static str,
    bytes: &[u8],
    version: Version,
) -> Result<(), CodecError> {
    put_len(buf, field, bytes.len(), version)?;
    buf.put_slice(bytes);
    Ok(())
}

pub(crate) fn put_str(
    buf: &mut BytesMut,
    field: &'static str,
    s: &str,
    version: Version,
) -> Result<(), CodecError> {
    put_bytes(buf, field, s.as_bytes(), version)
}

/// Cursor over a received message which fails with [`DecodeError::Truncated`] instead of
/// reading past the end.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.bytes.len() - self.pos;
        if available < len {
            return Err(DecodeError::Truncated {
                needed: len,
                available,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, DecodeError> {
        self.array().map(u16::from_be_bytes)
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        self.array().map(u32::from_be_bytes)
    }

    pub(crate) fn field_len(&mut self, version: Version) -> Result<usize, DecodeError> {
        match version {
            Version::V1 => self.u16().map(usize::from),
            Version::V2 => self.u32().map(|len| len as usize),
        }
    }

    pub(crate) fn bytes(&mut self, version: Version) -> Result<&'a [u8], DecodeError> {
        let len = self.field_len(version)?;
        self.take(len)
    }

    pub(crate) fn string(&mut self, version: Version) -> Result<String, DecodeError> {
        let bytes = self.bytes(version)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8)
    }

    pub(crate) fn finish(self) -> Result<(), DecodeError> {
        let remaining = self.bytes.len() - self.pos;
        if remaining > 0 {
            return Err(DecodeError::TrailingBytes(remaining));
        }
        Ok(())
    }
}
