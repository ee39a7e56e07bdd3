// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The compact, variable-length record an [`super::block::IndexBlock`] holds
//! one of per cached key (spec §3, "Index Entry (Main Queue)").

use crate::coding::{read_varint_u64, write_varint_u64, DecodeError, EncodeError};
use crate::id::SegmentId;
use crate::value::ExpireAt;
use crate::Slice;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const FLAG_EMBEDDED: u8 = 0b0000_0001;

/// Where the value bytes for this entry actually live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryLocation {
    /// Value (and possibly key) bytes live in a segment.
    Segment {
        /// Segment holding the value.
        segment_id: SegmentId,
        /// Byte offset of the item within the segment.
        offset: u64,
        /// Size of the value in bytes.
        value_size: u32,
    },
    /// Value bytes are embedded directly in the index entry
    /// (`index.data.embedded`, when `key_size + value_size` is small enough).
    Embedded {
        /// The cached value.
        value: Slice,
    },
}

impl EntryLocation {
    /// Returns the size of the value this location describes.
    #[must_use]
    pub fn value_size(&self) -> u32 {
        match self {
            Self::Segment { value_size, .. } => *value_size,
            // Truncation is fine: embedded values are bounded by
            // `index.data.embedded.size`, which is itself a u32.
            #[allow(clippy::cast_possible_truncation)]
            Self::Embedded { value } => value.len() as u32,
        }
    }
}

/// One Main Queue index entry: everything the Memory Index needs to know
/// about a cached key other than the key bytes themselves (the index only
/// stores the key's 64-bit hash, per spec — the key bytes, when needed, are
/// recovered from the segment item).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainEntry {
    /// 64-bit hash of the key.
    pub hash: u64,
    /// Absolute expiration time, or [`crate::value::NO_EXPIRY`].
    pub expire: ExpireAt,
    /// Number of times this entry has been hit since insertion.
    pub hit_count: u16,
    /// Current virtual SLRU segment, `1..=num_segments` (1 = hottest).
    pub segment: u8,
    /// Where the value lives.
    pub location: EntryLocation,
}

impl MainEntry {
    /// Encodes this entry into `writer`, returning the number of bytes written.
    pub fn encode_into<W: Write>(&self, writer: &mut W) -> Result<usize, EncodeError> {
        let embedded = matches!(self.location, EntryLocation::Embedded { .. });
        let flags = if embedded { FLAG_EMBEDDED } else { 0 };

        let mut written = 0;
        writer.write_u8(flags)?;
        written += 1;

        writer.write_u64::<BigEndian>(self.hash)?;
        written += 8;

        writer.write_u8(self.segment)?;
        written += 1;

        writer.write_u16::<BigEndian>(self.hit_count)?;
        written += 2;

        written += write_varint_u64(writer, self.expire)?;

        match &self.location {
            EntryLocation::Segment {
                segment_id,
                offset,
                value_size,
            } => {
                written += write_varint_u64(writer, *segment_id)?;
                written += write_varint_u64(writer, *offset)?;
                written += write_varint_u64(writer, u64::from(*value_size))?;
            }
            EntryLocation::Embedded { value } => {
                written += write_varint_u64(writer, value.len() as u64)?;
                writer.write_all(value)?;
                written += value.len();
            }
        }

        Ok(written)
    }

    /// Decodes a single entry from `reader`.
    pub fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let flags = reader.read_u8()?;
        let embedded = flags & FLAG_EMBEDDED != 0;

        let hash = reader.read_u64::<BigEndian>()?;
        let segment = reader.read_u8()?;
        let hit_count = reader.read_u16::<BigEndian>()?;
        let expire = read_varint_u64(reader)?;

        let location = if embedded {
            let value_len = read_varint_u64(reader)?;
            let value = Slice::from_reader(reader, value_len as usize)?;
            EntryLocation::Embedded { value }
        } else {
            let segment_id = read_varint_u64(reader)?;
            let offset = read_varint_u64(reader)?;
            let value_size = read_varint_u64(reader)?;
            EntryLocation::Segment {
                segment_id,
                offset,
                // Truncation is fine: values are bounded to u32::MAX bytes (spec §3).
                #[allow(clippy::cast_possible_truncation)]
                value_size: value_size as u32,
            }
        };

        Ok(Self {
            hash,
            expire,
            hit_count,
            segment,
            location,
        })
    }

    /// Returns the number of bytes [`Self::encode_into`] would write.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let mut buf = Vec::with_capacity(24);
        // Encoding into a `Vec<u8>` cannot fail.
        #[allow(clippy::expect_used)]
        self.encode_into(&mut buf)
            .expect("encoding into a Vec cannot fail");
        buf.len()
    }
}
