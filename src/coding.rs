// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::io::{Read, Write};

/// Error during serialization
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error
    Io(std::io::Error),
}

/// Error during deserialization
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error
    Io(std::io::Error),

    /// Invalid enum tag
    InvalidTag((&'static str, u8)),

    /// A fixed-size trailer/header did not match its expected magic bytes
    InvalidHeader(&'static str),

    /// A varint ran past the maximum allowed number of continuation bytes
    VarintOverflow,
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
        }
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidTag((name, tag)) => write!(f, "invalid tag {tag} for {name}"),
            Self::InvalidHeader(name) => write!(f, "invalid header for {name}"),
            Self::VarintOverflow => write!(f, "varint exceeded 64 bits"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidTag(_) | Self::InvalidHeader(_) | Self::VarintOverflow => None,
        }
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Trait to serialize stuff
pub trait Encode {
    /// Serializes into writer.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes into vector.
    fn encode_into_vec(&self) -> Result<Vec<u8>, EncodeError> {
        let mut v = vec![];
        self.encode_into(&mut v)?;
        Ok(v)
    }
}

/// Trait to deserialize stuff
pub trait Decode {
    /// Deserializes from reader.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;
}

/// Trait for structures with a stable on-disk layout (fixed headers, magic bytes).
///
/// Distinct from [`Encode`]/[`Decode`] in that it is used for the larger,
/// named records (segment metadata, trailers) rather than small value types.
pub trait Serializable {
    /// Serializes into writer.
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;
}

/// Counterpart to [`Serializable`].
pub trait Deserializable {
    /// Deserializes from reader.
    fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;
}

/// Writes `value` as a LEB128 varint (7 bits per byte, MSB = continuation).
///
/// Used for `key_len`/`value_len` in the segment item layout (spec §3:
/// `{expire:u64, key_len:varint, value_len:varint, key_bytes, value_bytes}`).
pub fn write_varint_u64<W: Write>(writer: &mut W, mut value: u64) -> std::io::Result<usize> {
    let mut written = 0;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        writer.write_all(&[byte])?;
        written += 1;
        if value == 0 {
            break;
        }
    }
    Ok(written)
}

/// Reads a LEB128 varint written by [`write_varint_u64`].
pub fn read_varint_u64<R: Read>(reader: &mut R) -> Result<u64, DecodeError> {
    let mut result: u64 = 0;
    let mut shift = 0u32;

    loop {
        if shift >= 64 {
            return Err(DecodeError::VarintOverflow);
        }

        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        let byte = byte[0];

        result |= u64::from(byte & 0x7f) << shift;

        if byte & 0x80 == 0 {
            break;
        }

        shift += 7;
    }

    Ok(result)
}

/// Returns the number of bytes [`write_varint_u64`] would emit for `value`.
#[must_use]
pub fn varint_u64_len(value: u64) -> usize {
    let mut value = value;
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip() {
        for value in [
            0u64,
            1,
            127,
            128,
            300,
            u32::MAX as u64,
            u64::MAX,
            u64::MAX - 1,
        ] {
            let mut buf = vec![];
            let written = write_varint_u64(&mut buf, value).unwrap();
            assert_eq!(written, varint_u64_len(value));
            assert_eq!(written, buf.len());

            let mut cursor = std::io::Cursor::new(buf);
            let decoded = read_varint_u64(&mut cursor).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn varint_truncated_errors() {
        let buf = [0x80u8]; // continuation bit set but nothing follows
        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_varint_u64(&mut cursor).is_err());
    }
}
