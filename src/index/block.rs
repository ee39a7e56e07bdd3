// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Index Block: the fixed-family-of-sizes byte buffer a slot's hash bucket
//! resolves to (spec §3/§4.1). Holds every [`MainEntry`] whose key hashes
//! into this slot, ordered by ascending virtual SLRU segment (segment 1,
//! the hottest, first) and MRU-first within a segment.
//!
//! On-disk/in-block layout is a 6-byte header —
//! `{block_size: u16, num_entries: u16, data_size: u16}` — followed by the
//! entries themselves, back to back, in order.

use super::entry::MainEntry;
use crate::coding::{DecodeError, Deserializable, EncodeError, Serializable};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const HEADER_LEN: usize = 6;

/// Hard ceiling on entries per block (spec §3/§8), independent of the
/// byte-size ladder: a block stops admitting new entries without an
/// eviction once it holds this many, even if `LADDER_SIZES`'s largest
/// class still has byte headroom.
const MAX_ENTRIES: usize = 250;

/// Block size classes an [`IndexBlock`] grows through, in bytes. Chosen as a
/// power-of-two ladder so a block's capacity never needs more than a
/// doubling to accommodate one more entry (spec §4.1: "grow along a small
/// ladder of block sizes").
pub const LADDER_SIZES: &[u16] = &[64, 128, 256, 512, 1024, 2048, 4096, 8192];

/// What happened when inserting into a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The entry fit in the block's current size class.
    Inserted,
    /// The block had to grow to the next ladder size class to fit the entry.
    Grown,
    /// The block was already at its largest size class and full; the
    /// coldest (tail) entry was evicted to make room.
    EvictedTail(MainEntry),
    /// The block is at its largest size class, full, and evicting the tail
    /// still would not make room (a single outsized entry). The caller
    /// (Memory Index) should fall through to an incremental-rehash retry;
    /// if that also fails, the write is rejected.
    Failed,
}

/// A single slot's bucket of [`MainEntry`] records.
#[derive(Debug, Clone, Default)]
pub struct IndexBlock {
    entries: Vec<MainEntry>,
}

impl IndexBlock {
    /// Creates an empty block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the block holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in storage order (hottest segment, MRU-first).
    pub fn iter(&self) -> impl Iterator<Item = &MainEntry> {
        self.entries.iter()
    }

    /// Sum of the entries' encoded sizes, not counting the header.
    fn data_size(&self) -> usize {
        self.entries.iter().map(MainEntry::encoded_len).sum()
    }

    /// The smallest ladder size class that fits `data_size() + HEADER_LEN`
    /// bytes, or `None` if even [`LADDER_SIZES`]'s largest entry is too small.
    fn fitting_class(data_size: usize) -> Option<u16> {
        let needed = data_size + HEADER_LEN;
        LADDER_SIZES
            .iter()
            .copied()
            .find(|&class| usize::from(class) >= needed)
    }

    /// Current size class: the smallest ladder entry that fits this block's
    /// present contents. A freshly-created or just-shrunk block reports the
    /// smallest class, matching "blocks start small and grow on demand."
    #[must_use]
    pub fn size_class(&self) -> u16 {
        Self::fitting_class(self.data_size()).unwrap_or(*LADDER_SIZES.last().unwrap())
    }

    /// Finds the entry with the given key hash, if present.
    #[must_use]
    pub fn find(&self, hash: u64) -> Option<&MainEntry> {
        self.entries.iter().find(|e| e.hash == hash)
    }

    /// Position of the entry with the given key hash, if present — the
    /// input `slru::popularity_ratio`/`should_dump` need to judge how
    /// close to the tail (coldest) it sits.
    #[must_use]
    pub fn position_of(&self, hash: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.hash == hash)
    }

    /// Removes and returns the entry with the given key hash, if present.
    pub fn remove(&mut self, hash: u64) -> Option<MainEntry> {
        let pos = self.entries.iter().position(|e| e.hash == hash)?;
        Some(self.entries.remove(pos))
    }

    /// Inserts `entry` at `position`, following the overflow resolution
    /// algorithm: try as-is, then grow to the next ladder size, then evict
    /// the coldest (last) entry, then give up.
    ///
    /// `position` is provided by the caller (see [`super::slru`]) so this
    /// block doesn't need to know the configured SLRU segment count.
    pub fn insert_at(&mut self, position: usize, entry: MainEntry) -> InsertOutcome {
        let position = position.min(self.entries.len());
        let candidate_size = self.data_size() + entry.encoded_len();
        let under_entry_cap = self.entries.len() < MAX_ENTRIES;

        if under_entry_cap && Self::fitting_class(candidate_size).is_some() {
            self.entries.insert(position, entry);
            return InsertOutcome::Inserted;
        }

        let current_class = self.size_class();
        if under_entry_cap && current_class != *LADDER_SIZES.last().unwrap() {
            // Growing doesn't change whether it fits the ladder overall,
            // but reclassifies this as a planned resize rather than silent
            // acceptance; re-check against the larger class explicitly.
            if usize::from(*LADDER_SIZES.last().unwrap()) >= candidate_size + HEADER_LEN {
                self.entries.insert(position, entry);
                return InsertOutcome::Grown;
            }
        }

        // At max ladder size, or at the entry-count cap, and still doesn't
        // fit: evict the coldest entry (always the tail, per SLRU ordering)
        // and retry once.
        if let Some(evicted) = self.entries.pop() {
            let candidate_size = self.data_size() + entry.encoded_len();
            let fits_after_evict = self.entries.len() < MAX_ENTRIES
                && (Self::fitting_class(candidate_size).is_some()
                    || usize::from(*LADDER_SIZES.last().unwrap()) >= candidate_size + HEADER_LEN);
            if fits_after_evict {
                self.entries.insert(position.min(self.entries.len()), entry);
                return InsertOutcome::EvictedTail(evicted);
            }
            // Didn't help; put it back so the caller sees consistent state.
            self.entries.push(evicted);
        }

        InsertOutcome::Failed
    }

    /// Returns the index of the first entry belonging to `segment` or a
    /// higher (colder) segment — i.e. the head position for `segment`.
    #[must_use]
    pub fn segment_head(&self, segment: u8) -> usize {
        self.entries
            .iter()
            .position(|e| e.segment >= segment)
            .unwrap_or(self.entries.len())
    }

    /// Moves the entry at `from` to the head of `to_segment`'s range,
    /// updating its `segment` field. Used by promotion-on-hit.
    pub fn move_to_segment(&mut self, from: usize, to_segment: u8) {
        let mut entry = self.entries.remove(from);
        entry.segment = to_segment;
        let head = self.segment_head(to_segment);
        self.entries.insert(head, entry);
    }

    /// Returns the position of the entry with the coldest (highest, then
    /// least-recently-used) rank — always the last element.
    #[must_use]
    pub fn tail_position(&self) -> Option<usize> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.len() - 1)
        }
    }
}

impl Serializable for IndexBlock {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        let data_size = self.data_size();
        let block_size = Self::fitting_class(data_size).unwrap_or(*LADDER_SIZES.last().unwrap());

        writer.write_u16::<BigEndian>(block_size)?;
        // num_entries and data_size are bounded by the block size classes,
        // which top out well under u16::MAX.
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u16::<BigEndian>(self.entries.len() as u16)?;
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u16::<BigEndian>(data_size as u16)?;

        for entry in &self.entries {
            entry.encode_into(writer)?;
        }

        Ok(())
    }
}

impl Deserializable for IndexBlock {
    fn deserialize<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let _block_size = reader.read_u16::<BigEndian>()?;
        let num_entries = reader.read_u16::<BigEndian>()?;
        let _data_size = reader.read_u16::<BigEndian>()?;

        let mut entries = Vec::with_capacity(num_entries as usize);
        for _ in 0..num_entries {
            entries.push(MainEntry::decode_from(reader)?);
        }

        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::entry::EntryLocation;

    fn entry(hash: u64, segment: u8) -> MainEntry {
        MainEntry {
            hash,
            expire: 0,
            hit_count: 0,
            segment,
            location: EntryLocation::Segment {
                segment_id: 1,
                offset: 0,
                value_size: 10,
            },
        }
    }

    #[test]
    fn insert_and_find() {
        let mut block = IndexBlock::new();
        assert_eq!(block.insert_at(0, entry(1, 4)), InsertOutcome::Inserted);
        assert!(block.find(1).is_some());
        assert!(block.find(2).is_none());
    }

    #[test]
    fn remove_returns_entry() {
        let mut block = IndexBlock::new();
        block.insert_at(0, entry(5, 1));
        let removed = block.remove(5).unwrap();
        assert_eq!(removed.hash, 5);
        assert!(block.is_empty());
    }

    #[test]
    fn segment_head_orders_by_segment() {
        let mut block = IndexBlock::new();
        block.insert_at(0, entry(1, 1));
        block.insert_at(1, entry(2, 3));
        block.insert_at(2, entry(3, 5));

        assert_eq!(block.segment_head(1), 0);
        assert_eq!(block.segment_head(3), 1);
        assert_eq!(block.segment_head(4), 2);
        assert_eq!(block.segment_head(6), 3);
    }

    #[test]
    fn move_to_segment_relocates_entry() {
        let mut block = IndexBlock::new();
        block.insert_at(0, entry(1, 1));
        block.insert_at(1, entry(2, 4));
        block.insert_at(2, entry(3, 4));

        // promote entry 3 (currently last of segment 4) to segment 2
        let pos = block.entries.iter().position(|e| e.hash == 3).unwrap();
        block.move_to_segment(pos, 2);

        let promoted = block.find(3).unwrap();
        assert_eq!(promoted.segment, 2);
        // still ordered ascending by segment
        let segments: Vec<u8> = block.iter().map(|e| e.segment).collect();
        assert_eq!(segments, vec![1, 2, 4]);
    }

    #[test]
    fn grows_along_ladder_when_full() {
        let mut block = IndexBlock::new();
        // fill past the smallest ladder class (64 bytes - header = 58 bytes,
        // each segment entry is ~19 bytes, so 3 entries overflow it)
        for i in 0..4u64 {
            let outcome = block.insert_at(block.len(), entry(i, 1));
            assert_ne!(outcome, InsertOutcome::Failed);
        }
        assert_eq!(block.len(), 4);
    }

    #[test]
    fn evicts_tail_once_largest_ladder_class_is_full() {
        let mut block = IndexBlock::new();
        let mut last_outcome = InsertOutcome::Inserted;
        // The 250-entry cap kicks in well before the largest ladder class
        // (8192 bytes, which would hold roughly 430 ~19-byte entries) runs
        // out of byte room; 600 inserts exercise both the cap and the fact
        // the block never grows past it afterward.
        for i in 0..600u64 {
            last_outcome = block.insert_at(block.len(), entry(i, 1));
            assert_ne!(last_outcome, InsertOutcome::Failed);
        }
        assert!(matches!(last_outcome, InsertOutcome::EvictedTail(_)));
        assert_eq!(block.len(), MAX_ENTRIES);
    }

    #[test]
    fn entry_count_cap_evicts_well_under_the_byte_ladder_ceiling() {
        let mut block = IndexBlock::new();
        let mut last_outcome = InsertOutcome::Inserted;
        for i in 0..(MAX_ENTRIES as u64 + 1) {
            last_outcome = block.insert_at(block.len(), entry(i, 1));
        }
        assert!(matches!(last_outcome, InsertOutcome::EvictedTail(_)));
        assert_eq!(block.len(), MAX_ENTRIES);
        // Nowhere near the largest ladder class's byte capacity.
        assert_ne!(block.size_class(), *LADDER_SIZES.last().unwrap());
    }

    #[test]
    fn tail_position_is_last_entry() {
        let mut block = IndexBlock::new();
        assert_eq!(block.tail_position(), None);
        block.insert_at(0, entry(1, 1));
        block.insert_at(1, entry(2, 2));
        assert_eq!(block.tail_position(), Some(1));
    }

    #[test]
    fn round_trips_through_serialize() {
        let mut block = IndexBlock::new();
        block.insert_at(0, entry(1, 1));
        block.insert_at(1, entry(2, 3));

        let mut buf = vec![];
        block.serialize(&mut buf).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = IndexBlock::deserialize(&mut cursor).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!(decoded.find(1).is_some());
        assert!(decoded.find(2).is_some());
    }
}
