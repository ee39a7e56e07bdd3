// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Fixed-size trailer written at the end of a sealed file-backed segment,
//! so recovery can find a segment's metadata without a separate manifest
//! read (spec §3, Segmented Storage Engine: "segments are self-describing").

use crate::coding::{DecodeError, Deserializable, EncodeError, Serializable};
use crate::id::SegmentId;
use crate::value::ExpireAt;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Magic bytes identifying a carrot-cache segment trailer.
pub const TRAILER_MAGIC: &[u8] = b"CCSEGTR1";
/// Fixed on-disk size of a trailer, padded so future fields don't move the
/// "seek from end" offset recovery relies on.
pub const TRAILER_SIZE: usize = 64;

/// Segment-level metadata, persisted in the trailer and mirrored in RAM by
/// [`super::Info`] for segments that don't hit disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTrailer {
    /// This segment's ID.
    pub id: SegmentId,
    /// Number of items ever written to this segment.
    pub total_items: u64,
    /// Total bytes occupied by items (not counting the trailer itself).
    pub total_bytes: u64,
    /// Maximum `expire` across all items, or `0` if none expire.
    pub max_expire_at: ExpireAt,
    /// Wall-clock milliseconds when the segment was sealed.
    pub creation_time: u64,
}

impl Serializable for SegmentTrailer {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        let mut buf = Vec::with_capacity(TRAILER_SIZE);
        buf.write_u64::<BigEndian>(self.id)?;
        buf.write_u64::<BigEndian>(self.total_items)?;
        buf.write_u64::<BigEndian>(self.total_bytes)?;
        buf.write_u64::<BigEndian>(self.max_expire_at)?;
        buf.write_u64::<BigEndian>(self.creation_time)?;

        buf.resize(TRAILER_SIZE - TRAILER_MAGIC.len(), 0);
        buf.write_all(TRAILER_MAGIC)?;

        debug_assert_eq!(buf.len(), TRAILER_SIZE);
        writer.write_all(&buf)?;
        Ok(())
    }
}

impl Deserializable for SegmentTrailer {
    fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let id = reader.read_u64::<BigEndian>()?;
        let total_items = reader.read_u64::<BigEndian>()?;
        let total_bytes = reader.read_u64::<BigEndian>()?;
        let max_expire_at = reader.read_u64::<BigEndian>()?;
        let creation_time = reader.read_u64::<BigEndian>()?;

        let consumed = 5 * std::mem::size_of::<u64>();
        let padding = TRAILER_SIZE - consumed - TRAILER_MAGIC.len();
        let mut skip = vec![0u8; padding];
        reader.read_exact(&mut skip)?;

        let mut magic = [0u8; TRAILER_MAGIC.len()];
        reader.read_exact(&mut magic)?;
        if magic != TRAILER_MAGIC {
            return Err(DecodeError::InvalidHeader("SegmentTrailer"));
        }

        Ok(Self {
            id,
            total_items,
            total_bytes,
            max_expire_at,
            creation_time,
        })
    }
}
