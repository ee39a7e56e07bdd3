// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};

/// Errors that can occur in the internal layers of the cache.
///
/// This is the "wide" error type: internal components return it freely.
/// The [`crate::Cache`] facade narrows it down to `{Ok, Rejected, NotFound}`
/// per the documented propagation policy (rank violations and startup
/// failures still surface as `Err`, everything else becomes part of the
/// narrow public contract).
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error talking to a file-backed segment or the data/snapshot directories.
    Io(std::io::Error),

    /// On-disk/in-memory layout could not be decoded.
    Decode(DecodeError),

    /// A value could not be encoded into its on-disk/in-memory layout.
    Encode(EncodeError),

    /// A rank outside `[0, numRanks)` was passed to an operation that requires one.
    ///
    /// Per spec: "caller bug, abort the operation with an explicit error."
    InvalidRank {
        /// The rank that was supplied.
        rank: u8,
        /// The configured number of ranks (exclusive upper bound).
        num_ranks: u8,
    },

    /// Configuration was invalid at construction time (startup-fatal: no
    /// cache instance is created).
    InvalidConfig(String),

    /// A segment or manifest file was missing, truncated, or otherwise
    /// could not be recovered.
    Unrecoverable(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e:?}"),
            Self::Encode(e) => write!(f, "encode error: {e:?}"),
            Self::InvalidRank { rank, num_ranks } => {
                write!(f, "rank {rank} out of range [0, {num_ranks})")
            }
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Unrecoverable(msg) => write!(f, "unrecoverable: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::InvalidRank { .. } | Self::InvalidConfig(_) | Self::Unrecoverable(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

/// Wide result type used by internal components.
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of [`crate::Cache::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The key was newly inserted.
    Inserted,
    /// An existing key's value was replaced.
    Updated,
    /// The write was rejected (capacity, rehash-collision overflow, or stall timeout).
    Rejected,
}

/// Outcome of a point read against the cache facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetOutcome {
    /// The value was found and fully copied into the caller's buffer.
    Found(usize),
    /// The value exists but `out_buf` was smaller than this many bytes; retry with a bigger buffer.
    BufferTooSmall(usize),
    /// The key was not present (or was expired).
    NotFound,
}
