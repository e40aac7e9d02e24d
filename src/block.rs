// SPDX-License-Identifier: Apache-2.0, MIT

//! Generic block framing (§3, §4.3): header layout, raw payload retention so
//! unknown blocks round-trip byte-for-byte, and the skip/fail policies used
//! while streaming.

use std::io::{Read, Seek, SeekFrom, Write};

use tracing::{debug, warn};

use crate::endian::{cstring_len, read_cstring, read_u64, read_u64_from, write_cstring, write_u64, write_u64_to};
use crate::error::{FailureReason, Outcome, TngError};
use crate::hash::{self, Digest16};

pub const ENDIANNESS_AND_STRING_LENGTH: u64 = 0;
pub const GENERAL_INFO: u64 = 1;
pub const MOLECULES: u64 = 2;
pub const TRAJECTORY_IDS_AND_NAMES: u64 = 3;
pub const TRAJECTORY_FRAME_SET: u64 = 4;
pub const BLOCK_TABLE_OF_CONTENTS: u64 = 5;
pub const PARTICLE_MAPPING: u64 = 6;

pub const TRAJ_BOX_SHAPE: u64 = 10_000;
pub const TRAJ_POSITIONS: u64 = 10_001;
pub const TRAJ_VELOCITIES: u64 = 10_002;
pub const TRAJ_FORCES: u64 = 10_003;

/// IDs at or above this threshold are typed data blocks (§3 "Block IDs").
pub fn is_data_block_id(id: u64) -> bool {
    id >= TRAJ_BOX_SHAPE
}

/// Fixed-size portion of the header, excluding the variable-length name:
/// header_size + contents_size + id + digest + block_version.
const FIXED_HEADER_LEN: u64 = 8 + 8 + 8 + hash::DIGEST_LEN as u64 + 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub header_size: u64,
    pub contents_size: u64,
    pub id: u64,
    pub digest: Digest16,
    pub name: Vec<u8>,
    pub block_version: u64,
}

impl BlockHeader {
    fn serialized_len(name: &[u8]) -> u64 {
        FIXED_HEADER_LEN + cstring_len(name)
    }
}

/// A block as read off disk before any type-specific interpretation: the
/// header plus the raw payload bytes. Keeping the raw buffer around lets an
/// unknown block id be copied through on a read-then-write cycle without the
/// core ever understanding its contents (§4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub header: BlockHeader,
    pub payload: Vec<u8>,
}

impl RawBlock {
    /// Builds a header + raw block from a payload that has already been
    /// serialized, computing `contents_size`, `header_size` and `digest`.
    pub fn new(id: u64, name: Vec<u8>, block_version: u64, payload: Vec<u8>) -> Self {
        let contents_size = payload.len() as u64;
        let header_size = BlockHeader::serialized_len(&name);
        let digest = hash::md5_of(&payload);
        RawBlock {
            header: BlockHeader {
                header_size,
                contents_size,
                id,
                digest,
                name,
                block_version,
            },
            payload,
        }
    }

    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.header.name).into_owned()
    }
}

/// Outcome of attempting to read one block from the stream.
pub enum BlockRead {
    Block(RawBlock),
    /// Clean end of stream: no bytes remained where a header would start.
    Eof,
}

/// Reads one generic block: peeks `header_size`, decodes the fixed header
/// fields in order, then reads `contents_size` payload bytes (§4.3 a-c).
///
/// A truncated header is Critical (the stream's framing is now unknown). An
/// oversized `contents_size` relative to the remaining file is a `Failure`
/// (§4.9); the caller should treat the block as skipped and keep streaming.
pub fn read_raw_block<R: Read + Seek>(r: &mut R) -> Result<Outcome<BlockRead>, TngError> {
    let start = r.stream_position()?;
    let file_len = r.seek(SeekFrom::End(0))?;
    r.seek(SeekFrom::Start(start))?;
    if start >= file_len {
        return Ok(Outcome::Success(BlockRead::Eof));
    }

    let header_size = match read_u64_from(r) {
        Ok(v) => v,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Ok(Outcome::Success(BlockRead::Eof));
        }
        Err(e) => return Err(TngError::Io(e)),
    };

    let contents_size = read_u64_from(r).map_err(|_| TngError::TruncatedHeader {
        expected: 8,
        at: start + 8,
    })?;
    let id = read_u64_from(r).map_err(|_| TngError::TruncatedHeader {
        expected: 8,
        at: start + 16,
    })?;
    let mut digest = [0u8; hash::DIGEST_LEN];
    r.read_exact(&mut digest).map_err(|_| TngError::TruncatedHeader {
        expected: hash::DIGEST_LEN as u64,
        at: start + 24,
    })?;
    let name = read_cstring(r)?;
    let block_version = read_u64_from(r).map_err(|_| TngError::TruncatedHeader {
        expected: 8,
        at: r.stream_position().unwrap_or(start),
    })?;

    let computed_header_size = BlockHeader::serialized_len(&name);
    if computed_header_size != header_size {
        return Err(TngError::MalformedHeaderSize(header_size));
    }

    let remaining = file_len.saturating_sub(r.stream_position()?);
    if contents_size > remaining {
        warn!(id, contents_size, remaining, "impossible block content size");
        return Ok(Outcome::Failure(FailureReason::ImpossibleSize {
            contents_size,
            remaining,
        }));
    }

    let mut payload = vec![0u8; contents_size as usize];
    r.read_exact(&mut payload)?;

    debug!(id, name = %String::from_utf8_lossy(&name), contents_size, "read block");

    let header = BlockHeader {
        header_size,
        contents_size,
        id,
        digest,
        name,
        block_version,
    };
    Ok(Outcome::Success(BlockRead::Block(RawBlock { header, payload })))
}

/// Writes a generic block: header then payload (§4.3, writing direction).
pub fn write_raw_block<W: Write>(w: &mut W, block: &RawBlock) -> Result<(), TngError> {
    write_u64_to(w, block.header.header_size)?;
    write_u64_to(w, block.header.contents_size)?;
    write_u64_to(w, block.header.id)?;
    w.write_all(&block.header.digest)?;
    write_cstring(w, &block.header.name)?;
    write_u64_to(w, block.header.block_version)?;
    w.write_all(&block.payload)?;
    Ok(())
}

/// Verifies the stored digest against the payload (invariant 3).
pub fn verify_digest(block: &RawBlock) -> Outcome<()> {
    if hash::verify(&block.payload, &block.header.digest) {
        Outcome::Success(())
    } else {
        Outcome::Failure(FailureReason::DigestMismatch {
            block_id: block.header.id,
            name: block.name_str(),
        })
    }
}

/// Recomputes and overwrites a block's digest in place after its payload
/// changed (used by the back-patch machinery in `frameset`/`session`).
pub fn recompute_digest(block: &mut RawBlock) {
    block.header.digest = hash::md5_of(&block.payload);
}

/// Primitive helpers shared by every payload codec in this crate: read/write
/// a big-endian u64/i64 at a fixed cursor position within a payload buffer.
pub fn get_u64(buf: &[u8], at: usize) -> u64 {
    read_u64(&buf[at..at + 8])
}

pub fn put_u64(buf: &mut [u8], at: usize, v: u64) {
    write_u64(&mut buf[at..at + 8], v)
}
