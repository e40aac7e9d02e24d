// SPDX-License-Identifier: Apache-2.0, MIT

//! TRAJECTORY_FRAME_SET and BLOCK_TABLE_OF_CONTENTS blocks (§4.6): the
//! doubly linked list of frame sets, its long-stride shortcut list, and the
//! back-patch arithmetic used by the write path to fix up pointers after a
//! new frame set is appended.

use crate::endian::{checked_capacity, cstring_len, read_cstring, read_u64_from, write_cstring, write_u64_to};
use crate::error::{FailureReason, TngError};
use crate::block::RawBlock;
use crate::general_info::SENTINEL;
use crate::mapping::ParticleMapping;
use crate::data_block::DataBlock;

/// One node of the frame-set linked list, and everything logically attached
/// to it (TOC, particle mappings, data blocks). This is the type the session
/// keeps as its single "current frame set" (§3 lifecycle).
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSet {
    pub first_frame: u64,
    pub n_frames: u64,
    /// Per-molecule instance counts for this frame set, present only in
    /// variable-N mode (mirrors `GeneralInfo::var_num_atoms_flag`).
    pub molecule_counts: Option<Vec<u64>>,
    pub next: u64,
    pub prev: u64,
    pub long_next: u64,
    pub long_prev: u64,
    pub toc: Vec<Vec<u8>>,
    pub mappings: Vec<ParticleMapping>,
    pub per_particle_blocks: Vec<DataBlock>,
    pub per_frame_blocks: Vec<DataBlock>,
    /// Blocks with an id this crate doesn't interpret, preserved byte-exact
    /// so a read-then-write cycle passes them through unchanged (§4.3).
    pub extra_blocks: Vec<RawBlock>,
    /// Per-block failures (digest mismatch, impossible size) observed while
    /// reading this frame set's trailing blocks; the block itself was
    /// skipped but the frame set as a whole still read successfully (§7).
    pub failed_blocks: Vec<FailureReason>,
}

impl FrameSet {
    pub fn new(first_frame: u64, n_frames: u64, variable_n: bool) -> Self {
        FrameSet {
            first_frame,
            n_frames,
            molecule_counts: if variable_n { Some(Vec::new()) } else { None },
            next: SENTINEL,
            prev: SENTINEL,
            long_next: SENTINEL,
            long_prev: SENTINEL,
            toc: Vec::new(),
            mappings: Vec::new(),
            per_particle_blocks: Vec::new(),
            per_frame_blocks: Vec::new(),
            extra_blocks: Vec::new(),
            failed_blocks: Vec::new(),
        }
    }

    /// Drains the owned collections before the session repopulates this
    /// frame set in place, the "release then reallocate" pattern from §9
    /// turned into "truncate to zero, then grow" on a stable outer value.
    pub fn reset_for_reuse(&mut self, first_frame: u64, n_frames: u64) {
        self.first_frame = first_frame;
        self.n_frames = n_frames;
        if let Some(counts) = &mut self.molecule_counts {
            counts.clear();
        }
        self.next = SENTINEL;
        self.prev = SENTINEL;
        self.long_next = SENTINEL;
        self.long_prev = SENTINEL;
        self.toc.clear();
        self.mappings.clear();
        self.per_particle_blocks.clear();
        self.per_frame_blocks.clear();
        self.extra_blocks.clear();
        self.failed_blocks.clear();
    }

    pub fn encode_header(&self) -> Result<Vec<u8>, TngError> {
        let mut buf = Vec::new();
        write_u64_to(&mut buf, self.first_frame)?;
        write_u64_to(&mut buf, self.n_frames)?;
        if let Some(counts) = &self.molecule_counts {
            for &c in counts {
                write_u64_to(&mut buf, c)?;
            }
        }
        write_u64_to(&mut buf, self.next)?;
        write_u64_to(&mut buf, self.prev)?;
        write_u64_to(&mut buf, self.long_next)?;
        write_u64_to(&mut buf, self.long_prev)?;
        Ok(buf)
    }

    pub fn decode_header(payload: &[u8], variable_n: bool, n_molecules: usize) -> Result<Self, TngError> {
        let mut cursor = std::io::Cursor::new(payload);
        let first_frame = read_u64_from(&mut cursor)?;
        let n_frames = read_u64_from(&mut cursor)?;
        let molecule_counts = if variable_n {
            let mut counts = Vec::with_capacity(n_molecules);
            for _ in 0..n_molecules {
                counts.push(read_u64_from(&mut cursor)?);
            }
            Some(counts)
        } else {
            None
        };
        let next = read_u64_from(&mut cursor)?;
        let prev = read_u64_from(&mut cursor)?;
        let long_next = read_u64_from(&mut cursor)?;
        let long_prev = read_u64_from(&mut cursor)?;
        Ok(FrameSet {
            first_frame,
            n_frames,
            molecule_counts,
            next,
            prev,
            long_next,
            long_prev,
            toc: Vec::new(),
            mappings: Vec::new(),
            per_particle_blocks: Vec::new(),
            per_frame_blocks: Vec::new(),
            extra_blocks: Vec::new(),
            failed_blocks: Vec::new(),
        })
    }

    pub fn encoded_header_len(&self) -> u64 {
        let counts_len = self.molecule_counts.as_ref().map_or(0, |c| c.len() as u64 * 8);
        8 + 8 + counts_len + 8 * 4
    }

    /// Particle count implied by this frame set's own molecule counts; only
    /// meaningful in variable-N mode, where the caller supplies the template
    /// atom counts per molecule from the topology.
    pub fn n_particles(&self, atoms_per_molecule: &[u64]) -> Option<u64> {
        let counts = self.molecule_counts.as_ref()?;
        Some(atoms_per_molecule.iter().zip(counts).map(|(a, c)| a * c).sum())
    }
}

/// Absolute file offsets of the four navigation pointer fields, derived from
/// where the frame-set block starts and how long its header+payload are
/// (§4.6 "Finding the back-patch position"). The pointers are the last four
/// u64 fields written by `encode_header`, in the fixed order next, prev,
/// long_next, long_prev.
#[derive(Debug, Clone, Copy)]
pub struct NavOffsets {
    pub next: u64,
    pub prev: u64,
    pub long_next: u64,
    pub long_prev: u64,
}

pub fn nav_pointer_offsets(block_start: u64, header_size: u64, contents_size: u64) -> NavOffsets {
    let end = block_start + header_size + contents_size;
    NavOffsets {
        next: end - 32,
        prev: end - 24,
        long_next: end - 16,
        long_prev: end - 8,
    }
}

/// Offset of the digest field within a block's header, relative to the
/// block's start (header_size, contents_size, id precede it — §4.6).
pub const DIGEST_OFFSET_IN_HEADER: u64 = 24;

/// The table-of-contents block: names of every block physically following
/// the frame set, up to the next frame-set block (invariant 6).
pub fn encode_toc(names: &[Vec<u8>]) -> Result<Vec<u8>, TngError> {
    let mut buf = Vec::new();
    write_u64_to(&mut buf, names.len() as u64)?;
    for name in names {
        write_cstring(&mut buf, name)?;
    }
    Ok(buf)
}

pub fn decode_toc(payload: &[u8]) -> Result<Vec<Vec<u8>>, TngError> {
    let mut cursor = std::io::Cursor::new(payload);
    let n_blocks = read_u64_from(&mut cursor)?;
    let remaining = payload.len() as u64 - cursor.position();
    let mut names = Vec::with_capacity(checked_capacity(n_blocks, 1, remaining)?);
    for _ in 0..n_blocks {
        names.push(read_cstring(&mut cursor)?);
    }
    Ok(names)
}

pub fn toc_encoded_len(names: &[Vec<u8>]) -> u64 {
    8 + names.iter().map(|n| cstring_len(n)).sum::<u64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_constant_n_header() {
        let mut fs = FrameSet::new(0, 100, false);
        fs.next = 4096;
        fs.prev = SENTINEL;
        fs.long_next = 8192;
        fs.long_prev = SENTINEL;
        let bytes = fs.encode_header().unwrap();
        assert_eq!(bytes.len() as u64, fs.encoded_header_len());
        let back = FrameSet::decode_header(&bytes, false, 0).unwrap();
        assert_eq!(back.first_frame, 0);
        assert_eq!(back.n_frames, 100);
        assert_eq!(back.next, 4096);
        assert_eq!(back.long_next, 8192);
    }

    #[test]
    fn roundtrip_variable_n_header() {
        let mut fs = FrameSet::new(100, 50, true);
        fs.molecule_counts = Some(vec![200, 3]);
        let bytes = fs.encode_header().unwrap();
        let back = FrameSet::decode_header(&bytes, true, 2).unwrap();
        assert_eq!(back.molecule_counts, Some(vec![200, 3]));
    }

    #[test]
    fn toc_roundtrip() {
        let names = vec![b"TRAJ_POSITIONS".to_vec(), b"TRAJ_BOX_SHAPE".to_vec()];
        let bytes = encode_toc(&names).unwrap();
        assert_eq!(bytes.len() as u64, toc_encoded_len(&names));
        let back = decode_toc(&bytes).unwrap();
        assert_eq!(back, names);
    }

    #[test]
    fn nav_offsets_land_on_the_last_four_u64s() {
        let header_size = 48u64;
        let contents_size = 8 * 4 + 16; // first_frame,n_frames + 4 pointers
        let offsets = nav_pointer_offsets(1000, header_size, contents_size);
        let end = 1000 + header_size + contents_size;
        assert_eq!(offsets.next, end - 32);
        assert_eq!(offsets.long_prev, end - 8);
        assert!(offsets.next < offsets.prev);
        assert!(offsets.prev < offsets.long_next);
        assert!(offsets.long_next < offsets.long_prev);
    }
}
