// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Off-heap-style RAM segment backend (SUPPLEMENT-RAM-SEGMENTS): an
//! append-only byte buffer instead of a file, for [`crate::config::StorageKind::OffHeap`]
//! caches. "Off-heap" here means "outside the Memory Index's own
//! allocations," not literally outside the Rust allocator — this crate
//! forbids `unsafe`, so there's no raw-pointer-backed arena the way the
//! Java/C implementations this spec is modeled on would use.

use super::item::Item;
use crate::coding::{Decode, Encode};
use parking_lot::RwLock;

/// An append-only, in-RAM segment buffer.
#[derive(Debug, Default)]
pub struct RamSegment {
    buf: RwLock<Vec<u8>>,
}

impl RamSegment {
    /// Creates an empty RAM segment with `capacity` bytes pre-reserved.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: RwLock::new(Vec::with_capacity(capacity)),
        }
    }

    /// Appends `item`, returning its offset within the segment.
    pub fn append(&self, item: &Item) -> crate::Result<u64> {
        let mut buf = self.buf.write();
        let offset = buf.len() as u64;
        item.encode_into(&mut *buf).map_err(crate::Error::Encode)?;
        Ok(offset)
    }

    /// Reads the item at `offset`.
    pub fn read_at(&self, offset: u64) -> crate::Result<Item> {
        let buf = self.buf.read();
        let mut cursor = std::io::Cursor::new(&buf[offset as usize..]);
        Item::decode_from(&mut cursor).map_err(crate::Error::Decode)
    }

    /// Current size of the segment in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.buf.read().len() as u64
    }

    /// `true` if nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates every item in write order.
    pub fn iter(&self) -> RamSegmentIter<'_> {
        RamSegmentIter {
            segment: self,
            offset: 0,
        }
    }
}

/// Iterator over the items of a [`RamSegment`].
pub struct RamSegmentIter<'a> {
    segment: &'a RamSegment,
    offset: u64,
}

impl Iterator for RamSegmentIter<'_> {
    type Item = crate::Result<(Item, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.segment.len() {
            return None;
        }

        let start = self.offset;
        let buf = self.segment.buf.read();
        let mut cursor = std::io::Cursor::new(&buf[start as usize..]);
        match Item::decode_from(&mut cursor) {
            Ok(item) => {
                self.offset = start + cursor.position();
                Some(Ok((item, start)))
            }
            Err(e) => {
                self.offset = self.segment.len();
                Some(Err(crate::Error::Decode(e)))
            }
        }
    }
}
