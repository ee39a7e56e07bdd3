// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! On-disk/in-RAM item layout for a segment, per spec §3 Segmented Storage
//! Engine: `{expire:u64, key_len:varint, value_len:varint, key_bytes,
//! value_bytes}`. Segments are append-only, so items carry their own key —
//! unlike an [`crate::index::entry::MainEntry`], which only stores a hash.

use crate::coding::{read_varint_u64, write_varint_u64, DecodeError, EncodeError};
use crate::value::ExpireAt;
use crate::Slice;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// A single cached key/value pair as stored in a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// The cached key.
    pub key: Slice,
    /// The cached value.
    pub value: Slice,
    /// Absolute expiration time, or [`crate::value::NO_EXPIRY`].
    pub expire: ExpireAt,
}

impl Item {
    /// Writes this item to `writer`, returning the number of bytes written
    /// (the caller uses this to advance its offset cursor).
    pub fn encode_into<W: Write>(&self, writer: &mut W) -> Result<u64, EncodeError> {
        let mut written = 0u64;

        writer.write_u64::<BigEndian>(self.expire)?;
        written += 8;

        written += write_varint_u64(writer, self.key.len() as u64)? as u64;
        writer.write_all(&self.key)?;
        written += self.key.len() as u64;

        written += write_varint_u64(writer, self.value.len() as u64)? as u64;
        writer.write_all(&self.value)?;
        written += self.value.len() as u64;

        Ok(written)
    }

    /// Reads one item from `reader`.
    pub fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let expire = reader.read_u64::<BigEndian>()?;

        let key_len = read_varint_u64(reader)?;
        let key = Slice::from_reader(reader, key_len as usize)?;

        let value_len = read_varint_u64(reader)?;
        let value = Slice::from_reader(reader, value_len as usize)?;

        Ok(Self { key, value, expire })
    }

    /// Total encoded size of this item, without writing it anywhere.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        8 + crate::coding::varint_u64_len(self.key.len() as u64) as u64
            + self.key.len() as u64
            + crate::coding::varint_u64_len(self.value.len() as u64) as u64
            + self.value.len() as u64
    }
}
