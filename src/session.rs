// SPDX-License-Identifier: Apache-2.0, MIT

//! Trajectory session (§4.9, §6): orchestrates the generic block framer
//! against the typed blocks, drives the read path (stream non-trajectory
//! blocks, then frame sets one at a time) and the write path (append a frame
//! set, then back-patch the previous node's pointers and digests).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::block::{self, BlockRead, RawBlock};
use crate::codec::CodecRegistry;
use crate::data_block::{decode_data_block, DataBlock, DataValues, ParticleRange, Sparsity, FRAME_DEPENDENT, PARTICLE_DEPENDENT};
use crate::endian::{read_u64_from, write_u64_to, HostEndian};
use crate::error::{FailureReason, Outcome, TngError};
use crate::frameset::{self, FrameSet};
use crate::general_info::{self, GeneralInfo, SENTINEL};
use crate::hash;
use crate::mapping::{mappings_are_disjoint, ParticleMapping};
use crate::topology::{Molecule, Topology};

/// `Fresh -> HeadersRead -> Streaming -> Closed` (§4.9). `Streaming` is
/// re-entrant for both reading and writing frame sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Fresh,
    HeadersRead,
    Streaming,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatchField {
    Next,
    LongNext,
}

/// Owns at most one input and one output file handle, the decoded
/// non-trajectory blocks, and the single "current frame set" the session
/// mutates in place as it streams (§3 "Lifecycle and ownership").
pub struct Session {
    state: SessionState,
    host_endian: HostEndian,
    input: Option<File>,
    output: Option<File>,
    general_info: GeneralInfo,
    general_info_offset: Option<u64>,
    topology: Topology,
    /// Non-trajectory blocks this crate doesn't interpret (e.g.
    /// TRAJECTORY_IDS_AND_NAMES, or any block with an id this version
    /// doesn't know), retained byte-exact between GENERAL_INFO/MOLECULES
    /// and the first frame set.
    non_trajectory_blocks: Vec<RawBlock>,
    /// Failures (digest mismatch, unreadable block) observed while reading
    /// pre-frame-set blocks; the offending block was skipped but header
    /// reading otherwise continued (§4.3, mirrors `FrameSet::failed_blocks`).
    header_failures: Vec<FailureReason>,
    current: Option<FrameSet>,
    current_offset: Option<u64>,
    prev_frame_set_offset: Option<u64>,
    long_prev_offset: Option<u64>,
    frame_sets_written: u64,
    codec_registry: CodecRegistry,
}

impl Session {
    pub fn init() -> Self {
        Session {
            state: SessionState::Fresh,
            host_endian: HostEndian::detect(),
            input: None,
            output: None,
            general_info: GeneralInfo::new("tng-rs", 0, 100),
            general_info_offset: None,
            topology: Topology::new(false),
            non_trajectory_blocks: Vec::new(),
            header_failures: Vec::new(),
            current: None,
            current_offset: None,
            prev_frame_set_offset: None,
            long_prev_offset: None,
            frame_sets_written: 0,
            codec_registry: CodecRegistry::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn general_info(&self) -> &GeneralInfo {
        &self.general_info
    }

    pub fn general_info_mut(&mut self) -> &mut GeneralInfo {
        &mut self.general_info
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn current_frame_set(&self) -> Option<&FrameSet> {
        self.current.as_ref()
    }

    /// Failures recorded for pre-frame-set blocks skipped during the last
    /// `read_file_headers` call (§4.3; mirrors `FrameSet::failed_blocks`).
    pub fn header_failures(&self) -> &[FailureReason] {
        &self.header_failures
    }

    pub fn current_frame_set_mut(&mut self) -> Option<&mut FrameSet> {
        self.current.as_mut()
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    /// Switches between constant-N mode (per-molecule counts stored once in
    /// MOLECULES) and variable-N mode (stored in each frame set's header
    /// instead) — call before building the topology (§3, §4.4 invariant).
    pub fn set_variable_n(&mut self, variable_n: bool) {
        self.general_info.var_num_atoms_flag = variable_n;
        self.topology.molecule_counts = if variable_n { None } else { Some(vec![0; self.topology.molecules.len()]) };
    }

    pub fn codec_registry_mut(&mut self) -> &mut CodecRegistry {
        &mut self.codec_registry
    }

    pub fn set_input_file(&mut self, path: impl AsRef<Path>) -> Result<(), TngError> {
        self.input = Some(File::open(path)?);
        Ok(())
    }

    /// Opens the output file: truncated if this session hasn't read an
    /// existing trajectory with frame sets already, appended to otherwise
    /// (§4.9 "truncate if fresh, else append").
    pub fn set_output_file(&mut self, path: impl AsRef<Path>) -> Result<(), TngError> {
        let fresh = !self.general_info.has_frame_sets();
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(fresh).open(path)?;
        self.output = Some(file);
        if !fresh {
            self.prev_frame_set_offset = if general_info::is_unset(self.general_info.last_frame_set_file_pos) {
                None
            } else {
                Some(self.general_info.last_frame_set_file_pos)
            };
        }
        Ok(())
    }

    /// Reads the non-trajectory blocks (GENERAL_INFO, MOLECULES, and
    /// anything else) up to the first TRAJECTORY_FRAME_SET, then rewinds to
    /// it so `read_next_frame_set` starts cleanly (§4.9 read path).
    pub fn read_file_headers(&mut self) -> Result<Outcome<()>, TngError> {
        self.non_trajectory_blocks.clear();
        self.header_failures.clear();
        let input = self.input.as_mut().ok_or(TngError::NoInputFile)?;
        input.seek(SeekFrom::Start(0))?;

        loop {
            let before = input.stream_position()?;
            let raw = match block::read_raw_block(input)? {
                Outcome::Failure(reason) => {
                    // The framer couldn't place this block (e.g. an
                    // impossible contents_size), so the position of whatever
                    // follows is unknown; stop scanning headers here, same as
                    // the trailing-block loop in `read_next_frame_set` does.
                    warn!(?reason, "failure while reading file headers");
                    self.header_failures.push(reason);
                    self.state = SessionState::HeadersRead;
                    return Ok(Outcome::Success(()));
                }
                Outcome::Success(BlockRead::Eof) => {
                    self.state = SessionState::HeadersRead;
                    return Ok(Outcome::Success(()));
                }
                Outcome::Success(BlockRead::Block(b)) => b,
            };

            if let Outcome::Failure(reason) = block::verify_digest(&raw) {
                warn!(?reason, "digest mismatch in file header block, skipping");
                self.header_failures.push(reason);
                continue;
            }

            match raw.header.id {
                block::GENERAL_INFO => {
                    self.general_info = GeneralInfo::decode(&raw.payload)?;
                    self.general_info_offset = Some(before);
                }
                block::MOLECULES => {
                    self.topology = Topology::decode(&raw.payload, self.general_info.var_num_atoms_flag)?;
                }
                block::TRAJECTORY_FRAME_SET => {
                    input.seek(SeekFrom::Start(before))?;
                    self.state = SessionState::HeadersRead;
                    return Ok(Outcome::Success(()));
                }
                id => {
                    debug!(id, "retaining non-trajectory block");
                    self.non_trajectory_blocks.push(raw);
                }
            }
        }
    }

    /// Writes GENERAL_INFO (always the first block in the file, §6) followed
    /// by MOLECULES and any retained non-trajectory blocks.
    pub fn write_file_headers(&mut self) -> Result<(), TngError> {
        let gi_payload = self.general_info.encode()?;
        let mol_payload = self.topology.encode()?;

        let output = self.output.as_mut().ok_or(TngError::NoOutputFile)?;
        output.seek(SeekFrom::Start(0))?;

        let gi_offset = output.stream_position()?;
        let gi_block = RawBlock::new(block::GENERAL_INFO, b"GENERAL_INFO".to_vec(), 1, gi_payload);
        block::write_raw_block(output, &gi_block)?;
        self.general_info_offset = Some(gi_offset);

        let mol_block = RawBlock::new(block::MOLECULES, b"MOLECULES".to_vec(), 1, mol_payload);
        block::write_raw_block(output, &mol_block)?;

        for raw in &self.non_trajectory_blocks {
            block::write_raw_block(output, raw)?;
        }

        info!("wrote file headers");
        Ok(())
    }

    /// Reads one more frame set, following `current.next` (or
    /// `first_frame_set_file_pos` on the first call). Returns
    /// `Success(false)` once the list is exhausted.
    pub fn read_next_frame_set(&mut self) -> Result<Outcome<bool>, TngError> {
        if self.state == SessionState::Closed {
            return Err(TngError::Closed);
        }

        let next_pos = match &self.current {
            Some(fs) => fs.next,
            None => self.general_info.first_frame_set_file_pos,
        };
        if general_info::is_unset(next_pos) {
            return Ok(Outcome::Success(false));
        }

        let input = self.input.as_mut().ok_or(TngError::NoInputFile)?;
        input.seek(SeekFrom::Start(next_pos))?;

        let raw = match block::read_raw_block(input)? {
            Outcome::Failure(reason) => return Ok(Outcome::Failure(reason)),
            Outcome::Success(BlockRead::Eof) => return Ok(Outcome::Success(false)),
            Outcome::Success(BlockRead::Block(b)) => b,
        };
        if raw.header.id != block::TRAJECTORY_FRAME_SET {
            return Ok(Outcome::Failure(FailureReason::UnknownBlockId(raw.header.id)));
        }
        if let Outcome::Failure(reason) = block::verify_digest(&raw) {
            warn!(?reason, "frame-set digest mismatch");
            return Ok(Outcome::Failure(reason));
        }

        let variable_n = self.topology.is_variable_n();
        let n_molecules = self.topology.molecules.len();
        let mut fs = FrameSet::decode_header(&raw.payload, variable_n, n_molecules)?;

        loop {
            let before = input.stream_position()?;
            match block::read_raw_block(input)? {
                Outcome::Success(BlockRead::Eof) => break,
                Outcome::Failure(reason) => {
                    // The framer itself couldn't place this block (e.g. an
                    // impossible contents_size); there's no way to know
                    // where the next block starts, so stop scanning trailing
                    // blocks here. `fs.next` was already decoded, so the
                    // frame-set list itself is unaffected.
                    warn!(?reason, "failure while scanning frame-set's trailing blocks");
                    fs.failed_blocks.push(reason);
                    break;
                }
                Outcome::Success(BlockRead::Block(raw2)) => {
                    if raw2.header.id == block::TRAJECTORY_FRAME_SET {
                        input.seek(SeekFrom::Start(before))?;
                        break;
                    }
                    if let Outcome::Failure(reason) = block::verify_digest(&raw2) {
                        warn!(?reason, "digest mismatch on trailing block, skipping");
                        fs.failed_blocks.push(reason);
                        continue;
                    }
                    match raw2.header.id {
                        block::BLOCK_TABLE_OF_CONTENTS => {
                            fs.toc = frameset::decode_toc(&raw2.payload)?;
                        }
                        block::PARTICLE_MAPPING => {
                            fs.mappings.push(ParticleMapping::decode(&raw2.payload)?);
                        }
                        id if block::is_data_block_id(id) => {
                            match decode_data_block(id, raw2.header.name.clone(), &raw2.payload, fs.n_frames) {
                                Ok(data_block) if data_block.check_shape(fs.n_frames).is_ok() => {
                                    if data_block.is_particle_dependent() {
                                        fs.per_particle_blocks.push(data_block);
                                    } else {
                                        fs.per_frame_blocks.push(data_block);
                                    }
                                }
                                _ => fs.extra_blocks.push(raw2),
                            }
                        }
                        _ => fs.extra_blocks.push(raw2),
                    }
                }
            }
        }

        if !mappings_are_disjoint(&fs.mappings) {
            warn!("overlapping particle mappings in frame set");
            fs.failed_blocks.push(FailureReason::OverlappingMappings);
        }

        self.current_offset = Some(next_pos);
        self.current = Some(fs);
        self.state = SessionState::Streaming;
        Ok(Outcome::Success(true))
    }

    /// Starts a new frame set in place, releasing whatever the previous one
    /// owned first (§3 "Lifecycle and ownership").
    pub fn new_frame_set(&mut self, first_frame: u64, n_frames: u64) {
        let variable_n = self.topology.is_variable_n();
        match &mut self.current {
            Some(fs) => fs.reset_for_reuse(first_frame, n_frames),
            None => self.current = Some(FrameSet::new(first_frame, n_frames, variable_n)),
        }
        self.state = SessionState::Streaming;
    }

    pub fn add_particle_data_block(
        &mut self,
        id: u64,
        name: impl Into<Vec<u8>>,
        n_values_per_frame: u64,
        stride_length: u64,
        first_frame_with_data: u64,
        first_particle: u64,
        n_particles: u64,
        codec_id: u64,
        values: DataValues,
    ) -> Result<(), TngError> {
        let fs = self.current.as_mut().ok_or(TngError::Closed)?;
        let sparsity = (stride_length > 1).then_some(Sparsity {
            first_frame_with_data,
            stride_length,
        });
        let mut data_block = DataBlock::new_raw(
            id,
            name,
            FRAME_DEPENDENT | PARTICLE_DEPENDENT,
            sparsity,
            n_values_per_frame,
            Some(ParticleRange { first_particle, n_particles }),
            values,
        );
        data_block.codec_id = codec_id;
        data_block.check_shape(fs.n_frames)?;
        fs.per_particle_blocks.push(data_block);
        Ok(())
    }

    pub fn add_data_block(
        &mut self,
        id: u64,
        name: impl Into<Vec<u8>>,
        n_values_per_frame: u64,
        stride_length: u64,
        first_frame_with_data: u64,
        codec_id: u64,
        values: DataValues,
    ) -> Result<(), TngError> {
        let fs = self.current.as_mut().ok_or(TngError::Closed)?;
        let sparsity = (stride_length > 1).then_some(Sparsity {
            first_frame_with_data,
            stride_length,
        });
        let mut data_block = DataBlock::new_raw(id, name, FRAME_DEPENDENT, sparsity, n_values_per_frame, None, values);
        data_block.codec_id = codec_id;
        data_block.check_shape(fs.n_frames)?;
        fs.per_frame_blocks.push(data_block);
        Ok(())
    }

    pub fn add_molecule(&mut self, name: impl Into<Vec<u8>>, quaternary_str: i64) -> usize {
        let id = self.topology.molecules.len() as u64;
        self.topology.add_molecule(Molecule::new(id, name, quaternary_str))
    }

    pub fn add_chain_to_molecule(&mut self, molecule_index: usize, name: impl Into<Vec<u8>>) -> usize {
        let id = self.topology.molecules[molecule_index].n_chains();
        self.topology.molecules[molecule_index].add_chain(id, name)
    }

    pub fn add_residue_to_chain(&mut self, molecule_index: usize, chain_index: usize, name: impl Into<Vec<u8>>) -> usize {
        let id = self.topology.molecules[molecule_index].chains[chain_index].residues.len() as u64;
        self.topology.molecules[molecule_index].add_residue(chain_index, id, name)
    }

    pub fn add_atom_to_residue(
        &mut self,
        molecule_index: usize,
        chain_index: usize,
        residue_index: usize,
        name: impl Into<Vec<u8>>,
        atom_type: impl Into<Vec<u8>>,
    ) {
        let id = self.topology.molecules[molecule_index].chains[chain_index].residues[residue_index].atoms.len() as u64;
        self.topology.molecules[molecule_index].add_atom(chain_index, residue_index, id, name, atom_type);
    }

    pub fn set_molecule_cnt(&mut self, molecule_index: usize, count: u64) -> bool {
        self.topology.set_molecule_cnt(molecule_index, count)
    }

    pub fn get_time_str(&self) -> String {
        crate::time::format_time(self.general_info.creation_time)
    }

    /// Appends the current frame set, then runs the two-phase back-patch:
    /// the previous frame set's `next` (and, at a stride boundary, the
    /// long-stride predecessor's `long_next`), then GENERAL_INFO's root
    /// pointers. Every patched block's digest is recomputed (§4.9 write
    /// path, §4.6 back-patch arithmetic).
    pub fn write_frame_set(&mut self) -> Result<Outcome<()>, TngError> {
        let long_stride = self.general_info.long_stride_length.max(1);
        let is_stride_boundary = self.frame_sets_written % long_stride == 0;

        let fs = self.current.as_mut().ok_or(TngError::Closed)?;
        let output = self.output.as_mut().ok_or(TngError::NoOutputFile)?;

        let p = output.seek(SeekFrom::End(0))?;
        fs.prev = self.prev_frame_set_offset.unwrap_or(SENTINEL);
        fs.next = SENTINEL;
        fs.long_prev = if is_stride_boundary { self.long_prev_offset.unwrap_or(SENTINEL) } else { SENTINEL };
        fs.long_next = SENTINEL;

        let header_payload = fs.encode_header()?;
        let fs_block = RawBlock::new(block::TRAJECTORY_FRAME_SET, b"TRAJECTORY_FRAME_SET".to_vec(), 1, header_payload);
        block::write_raw_block(output, &fs_block)?;

        let mut names: Vec<Vec<u8>> = vec![b"BLOCK_TABLE_OF_CONTENTS".to_vec()];
        names.extend(fs.mappings.iter().map(|_| b"PARTICLE_MAPPING".to_vec()));
        names.extend(fs.per_particle_blocks.iter().map(|b| b.name.clone()));
        names.extend(fs.per_frame_blocks.iter().map(|b| b.name.clone()));
        names.extend(fs.extra_blocks.iter().map(|b| b.header.name.clone()));
        fs.toc = names.clone();

        let toc_payload = frameset::encode_toc(&names)?;
        let toc_block = RawBlock::new(block::BLOCK_TABLE_OF_CONTENTS, b"BLOCK_TABLE_OF_CONTENTS".to_vec(), 1, toc_payload);
        block::write_raw_block(output, &toc_block)?;

        for mapping in &fs.mappings {
            let payload = mapping.encode()?;
            let b = RawBlock::new(block::PARTICLE_MAPPING, b"PARTICLE_MAPPING".to_vec(), 1, payload);
            block::write_raw_block(output, &b)?;
        }
        for data_block in fs.per_particle_blocks.iter().chain(fs.per_frame_blocks.iter()) {
            let payload = data_block.encode()?;
            let b = RawBlock::new(data_block.id, data_block.name.clone(), 1, payload);
            block::write_raw_block(output, &b)?;
        }
        for extra in &fs.extra_blocks {
            block::write_raw_block(output, extra)?;
        }

        if let Some(prev_offset) = self.prev_frame_set_offset {
            Self::patch_frame_set_pointer(output, prev_offset, PatchField::Next, p)?;
        }
        if is_stride_boundary {
            if let Some(long_prev_offset) = self.long_prev_offset {
                Self::patch_frame_set_pointer(output, long_prev_offset, PatchField::LongNext, p)?;
            }
            self.long_prev_offset = Some(p);
        }

        if general_info::is_unset(self.general_info.first_frame_set_file_pos) {
            self.general_info.first_frame_set_file_pos = p;
        }
        self.general_info.last_frame_set_file_pos = p;
        self.rewrite_general_info()?;

        self.prev_frame_set_offset = Some(p);
        self.current_offset = Some(p);
        self.frame_sets_written += 1;
        info!(offset = p, "wrote frame set");
        Ok(Outcome::Success(()))
    }

    fn patch_frame_set_pointer(output: &mut File, block_start: u64, field: PatchField, new_value: u64) -> Result<(), TngError> {
        let saved = output.stream_position()?;

        output.seek(SeekFrom::Start(block_start))?;
        let header_size = read_u64_from(output)?;
        let contents_size = read_u64_from(output)?;
        let offsets = frameset::nav_pointer_offsets(block_start, header_size, contents_size);
        let pointer_offset = match field {
            PatchField::Next => offsets.next,
            PatchField::LongNext => offsets.long_next,
        };

        output.seek(SeekFrom::Start(pointer_offset))?;
        write_u64_to(output, new_value)?;

        let mut payload = vec![0u8; contents_size as usize];
        output.seek(SeekFrom::Start(block_start + header_size))?;
        output.read_exact(&mut payload)?;
        let digest = hash::md5_of(&payload);
        output.seek(SeekFrom::Start(block_start + frameset::DIGEST_OFFSET_IN_HEADER))?;
        output.write_all(&digest)?;

        output.seek(SeekFrom::Start(saved))?;
        debug!(block_start, ?field, new_value, "back-patched frame-set pointer");
        Ok(())
    }

    fn rewrite_general_info(&mut self) -> Result<(), TngError> {
        let offset = self.general_info_offset.ok_or(TngError::NoOutputFile)?;
        let payload = self.general_info.encode()?;
        let digest = hash::md5_of(&payload);

        let output = self.output.as_mut().ok_or(TngError::NoOutputFile)?;
        let saved = output.stream_position()?;

        output.seek(SeekFrom::Start(offset))?;
        let header_size = read_u64_from(output)?;
        output.seek(SeekFrom::Start(offset + header_size))?;
        output.write_all(&payload)?;
        output.seek(SeekFrom::Start(offset + frameset::DIGEST_OFFSET_IN_HEADER))?;
        output.write_all(&digest)?;

        output.seek(SeekFrom::Start(saved))?;
        Ok(())
    }

    /// Drops file handles and in-memory state (§5 "the caller cancels by
    /// releasing the session").
    pub fn destroy(&mut self) {
        self.input = None;
        self.output = None;
        self.current = None;
        self.state = SessionState::Closed;
        info!("session closed");
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::init()
    }
}
