// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Unrecoverable error. File handle state is uncertain after one of these;
/// the caller must drop the [`crate::session::Session`] that produced it.
#[derive(Debug, Error)]
pub enum TngError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("truncated header: expected {expected} bytes at offset {at}")]
    TruncatedHeader { expected: u64, at: u64 },
    #[error("malformed header_size: {0}")]
    MalformedHeaderSize(u64),
    #[error("allocation of {0} bytes refused")]
    AllocationTooLarge(u64),
    #[error("no input file set")]
    NoInputFile,
    #[error("no output file set")]
    NoOutputFile,
    #[error("session is closed")]
    Closed,
    #[error("string exceeds 1024 byte limit")]
    StringTooLong,
    #[error("codec {0} is not registered")]
    UnknownCodec(u64),
    #[error("data block value count {got} does not match expected shape {expected}")]
    ShapeMismatch { expected: u64, got: u64 },
}

/// Recoverable condition: the current block is invalid or unknown, but the
/// session remains usable and the caller may skip and continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("digest mismatch on block {block_id} ({name})")]
    DigestMismatch { block_id: u64, name: String },
    #[error("unknown block id {0}")]
    UnknownBlockId(u64),
    #[error("short read while decoding block {block_id}")]
    ShortRead { block_id: u64 },
    #[error("impossible contents_size {contents_size}, only {remaining} bytes remain")]
    ImpossibleSize { contents_size: u64, remaining: u64 },
    #[error("particle mappings in this frame set overlap")]
    OverlappingMappings,
}

/// The three-level outcome taxonomy from the format's error handling design:
/// `Success`/`Failure` are carried in-band as this type, `Critical` surfaces
/// as `Err(TngError)` from the same call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    Failure(FailureReason),
}

impl<T> Outcome<T> {
    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(v) => Some(v),
            Outcome::Failure(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(v) => Outcome::Success(f(v)),
            Outcome::Failure(r) => Outcome::Failure(r),
        }
    }
}

pub type Result<T> = std::result::Result<Outcome<T>, TngError>;
