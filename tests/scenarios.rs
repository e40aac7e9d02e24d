// SPDX-License-Identifier: Apache-2.0, MIT

//! End-to-end scenarios, one per concrete case in the testable-properties
//! list: round-trip, back-patch/long-stride correctness, digest integrity,
//! unknown-block passthrough, variable-N frame sets, sparse data blocks.

use std::io::{Read, Seek, SeekFrom, Write};

use pretty_assertions::assert_eq;
use tng::block::{self, RawBlock, TRAJ_BOX_SHAPE, TRAJ_POSITIONS};
use tng::data_block::DataValues;
use tng::error::Outcome;
use tng::hash;
use tng::Session;

fn build_water_topology(session: &mut Session, instances: u64) -> usize {
    let molecule_index = session.add_molecule("water", 0);
    let chain_index = session.add_chain_to_molecule(molecule_index, "A");
    let residue_index = session.add_residue_to_chain(molecule_index, chain_index, "HOH");
    session.add_atom_to_residue(molecule_index, chain_index, residue_index, "O", "OW");
    session.add_atom_to_residue(molecule_index, chain_index, residue_index, "H1", "HW");
    session.add_atom_to_residue(molecule_index, chain_index, residue_index, "H2", "HW");
    session.set_molecule_cnt(molecule_index, instances);
    molecule_index
}

/// Scenario 1: round-trip of a two-frame-set file with 200 water molecules
/// (600 particles) and synthetic float32 positions.
#[test]
fn scenario_1_roundtrip_two_frame_sets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traj.tng");
    const N_PARTICLES: u64 = 600;
    const N_FRAMES: u64 = 100;

    let mut writer = Session::init();
    build_water_topology(&mut writer, 200);
    writer.general_info_mut().frame_set_n_frames = N_FRAMES;
    writer.set_output_file(&path).unwrap();
    writer.write_file_headers().unwrap();

    let mut expected = Vec::new();
    for fs_index in 0..2u64 {
        writer.new_frame_set(fs_index * N_FRAMES, N_FRAMES);
        let values: Vec<f32> = (0..N_FRAMES * N_PARTICLES * 3)
            .map(|i| (fs_index * 1000 + i) as f32)
            .collect();
        expected.push(values.clone());
        writer
            .add_particle_data_block(TRAJ_POSITIONS, "TRAJ_POSITIONS", 3, 1, 0, 0, N_PARTICLES, 0, DataValues::F32(values))
            .unwrap();
        writer.write_frame_set().unwrap().success().unwrap();
    }
    writer.destroy();

    let mut reader = Session::init();
    reader.set_input_file(&path).unwrap();
    reader.read_file_headers().unwrap().success().unwrap();

    for expected_values in expected {
        assert!(reader.read_next_frame_set().unwrap().success().unwrap());
        let fs = reader.current_frame_set().unwrap();
        match &fs.per_particle_blocks[0].payload {
            tng::data_block::Payload::Raw(DataValues::F32(got)) => assert_eq!(*got, expected_values),
            other => panic!("unexpected payload: {other:?}"),
        }
    }
    assert!(!reader.read_next_frame_set().unwrap().success().unwrap());
}

/// Scenario 2: back-patch correctness with `stride_length = 3` over 10 frame
/// sets, verified by independently re-parsing the raw block stream.
#[test]
fn scenario_2_long_stride_back_patch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traj.tng");

    let mut writer = Session::init();
    build_water_topology(&mut writer, 1);
    writer.general_info_mut().long_stride_length = 3;
    writer.set_output_file(&path).unwrap();
    writer.write_file_headers().unwrap();

    for i in 0..10u64 {
        writer.new_frame_set(i, 1);
        writer
            .add_particle_data_block(TRAJ_POSITIONS, "TRAJ_POSITIONS", 3, 1, 0, 0, 3, 0, DataValues::F32(vec![i as f32; 9]))
            .unwrap();
        writer.write_frame_set().unwrap().success().unwrap();
    }
    writer.destroy();

    // Independently parse the raw block stream, collecting each
    // TRAJECTORY_FRAME_SET's offset and decoded navigation pointers.
    let mut file = std::fs::File::open(&path).unwrap();
    let mut frame_set_offsets = Vec::new();
    let mut long_nexts = Vec::new();
    loop {
        let before = file.stream_position().unwrap();
        match block::read_raw_block(&mut file).unwrap() {
            Outcome::Success(block::BlockRead::Eof) => break,
            Outcome::Failure(reason) => panic!("unexpected failure: {reason}"),
            Outcome::Success(block::BlockRead::Block(raw)) => {
                if raw.header.id == block::TRAJECTORY_FRAME_SET {
                    let fs = tng::frameset::FrameSet::decode_header(&raw.payload, false, 0).unwrap();
                    frame_set_offsets.push(before);
                    long_nexts.push(fs.long_next);
                }
            }
        }
    }

    assert_eq!(frame_set_offsets.len(), 10);
    assert_eq!(long_nexts[0], frame_set_offsets[3]);
    assert_eq!(long_nexts[3], frame_set_offsets[6]);
    assert_eq!(long_nexts[6], frame_set_offsets[9]);
    assert_eq!(long_nexts[9], tng::general_info::SENTINEL);
}

/// Scenario 3: flipping a byte inside a data block's payload makes that
/// block fail its digest check on re-read while other blocks still succeed.
#[test]
fn scenario_3_digest_integrity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traj.tng");

    let mut writer = Session::init();
    build_water_topology(&mut writer, 1);
    writer.set_output_file(&path).unwrap();
    writer.write_file_headers().unwrap();

    for i in 0..2u64 {
        writer.new_frame_set(i, 1);
        writer
            .add_particle_data_block(TRAJ_POSITIONS, "TRAJ_POSITIONS", 3, 1, 0, 0, 3, 0, DataValues::F32(vec![i as f32; 9]))
            .unwrap();
        writer.write_frame_set().unwrap().success().unwrap();
    }
    writer.destroy();

    // Flip one byte inside the first frame set's TRAJ_POSITIONS payload.
    let mut file = std::fs::OpenOptions::new().read(true).write(true).open(&path).unwrap();
    let mut offset = 0u64;
    loop {
        let before = file.stream_position().unwrap();
        match block::read_raw_block(&mut file).unwrap() {
            Outcome::Success(block::BlockRead::Eof) => panic!("TRAJ_POSITIONS not found"),
            Outcome::Failure(reason) => panic!("unexpected failure: {reason}"),
            Outcome::Success(block::BlockRead::Block(raw)) => {
                if raw.header.id == TRAJ_POSITIONS {
                    offset = before;
                    break;
                }
            }
        }
    }
    // header_size + contents_size + id + digest(16) puts us past the fixed
    // fields; flipping a byte a few bytes into the payload is enough.
    let header_size_buf_offset = offset;
    file.seek(SeekFrom::Start(header_size_buf_offset)).unwrap();
    let mut header_size_buf = [0u8; 8];
    file.read_exact(&mut header_size_buf).unwrap();
    let header_size = u64::from_be_bytes(header_size_buf);
    let payload_byte_offset = offset + header_size + 4;
    file.seek(SeekFrom::Start(payload_byte_offset)).unwrap();
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte).unwrap();
    byte[0] ^= 0xFF;
    file.seek(SeekFrom::Start(payload_byte_offset)).unwrap();
    file.write_all(&byte).unwrap();
    drop(file);

    let mut reader = Session::init();
    reader.set_input_file(&path).unwrap();
    reader.read_file_headers().unwrap().success().unwrap();

    assert!(reader.read_next_frame_set().unwrap().success().unwrap());
    let fs = reader.current_frame_set().unwrap();
    assert!(!fs.failed_blocks.is_empty(), "corrupted block should be reported as a failure");

    assert!(reader.read_next_frame_set().unwrap().success().unwrap());
    let fs2 = reader.current_frame_set().unwrap();
    assert!(fs2.failed_blocks.is_empty());
    assert_eq!(fs2.per_particle_blocks.len(), 1);
}

/// Scenario 4: a block with an id this crate doesn't interpret survives a
/// read-then-write cycle byte-identical.
#[test]
fn scenario_4_unknown_block_passthrough() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traj.tng");

    let unknown_payload: Vec<u8> = (0..128u32).map(|i| ((i * 167 + 13) % 256) as u8).collect();
    let unknown_block = RawBlock::new(999_999, b"UNKNOWN".to_vec(), 1, unknown_payload);

    let mut writer = Session::init();
    build_water_topology(&mut writer, 1);
    writer.set_output_file(&path).unwrap();
    writer.write_file_headers().unwrap();

    writer.new_frame_set(0, 1);
    writer
        .add_particle_data_block(TRAJ_POSITIONS, "TRAJ_POSITIONS", 3, 1, 0, 0, 3, 0, DataValues::F32(vec![0.0; 9]))
        .unwrap();
    writer.current_frame_set_mut().unwrap().extra_blocks.push(unknown_block.clone());
    writer.write_frame_set().unwrap().success().unwrap();
    writer.destroy();

    let mut reader = Session::init();
    reader.set_input_file(&path).unwrap();
    reader.read_file_headers().unwrap().success().unwrap();
    assert!(reader.read_next_frame_set().unwrap().success().unwrap());
    assert_eq!(reader.current_frame_set().unwrap().extra_blocks, vec![unknown_block.clone()]);

    // Read-then-write cycle: copy headers and the frame set into a second
    // file, confirm the unknown block is still byte-identical.
    let path2 = dir.path().join("traj2.tng");
    let mut writer2 = Session::init();
    *writer2.topology_mut() = reader.topology().clone();
    writer2.set_output_file(&path2).unwrap();
    writer2.write_file_headers().unwrap();
    writer2.new_frame_set(0, 1);
    *writer2.current_frame_set_mut().unwrap() = reader.current_frame_set().unwrap().clone();
    writer2.write_frame_set().unwrap().success().unwrap();
    writer2.destroy();

    let mut verifier = Session::init();
    verifier.set_input_file(&path2).unwrap();
    verifier.read_file_headers().unwrap().success().unwrap();
    assert!(verifier.read_next_frame_set().unwrap().success().unwrap());
    assert_eq!(verifier.current_frame_set().unwrap().extra_blocks, vec![unknown_block]);
}

/// Scenario 5: three frame sets with varying molecule instance counts (600,
/// 603, 600 particles) round-trip their per-frame-set counts correctly.
#[test]
fn scenario_5_variable_n_frame_sets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traj.tng");
    let atoms_per_molecule = [3u64];
    let counts = [200u64, 201, 200];

    let mut writer = Session::init();
    writer.set_variable_n(true);
    build_water_topology(&mut writer, 0); // count is a no-op in variable-N mode
    writer.set_output_file(&path).unwrap();
    writer.write_file_headers().unwrap();

    for &count in &counts {
        writer.new_frame_set(0, 1);
        writer.current_frame_set_mut().unwrap().molecule_counts = Some(vec![count]);
        let n_particles = count * atoms_per_molecule[0];
        writer
            .add_particle_data_block(
                TRAJ_POSITIONS,
                "TRAJ_POSITIONS",
                3,
                1,
                0,
                0,
                n_particles,
                0,
                DataValues::F32(vec![0.0; (n_particles * 3) as usize]),
            )
            .unwrap();
        writer.write_frame_set().unwrap().success().unwrap();
    }
    writer.destroy();

    let mut reader = Session::init();
    reader.set_input_file(&path).unwrap();
    reader.read_file_headers().unwrap().success().unwrap();
    assert!(reader.topology().is_variable_n());

    let mut seen_particles = Vec::new();
    while reader.read_next_frame_set().unwrap().success().unwrap() {
        let fs = reader.current_frame_set().unwrap();
        seen_particles.push(fs.n_particles(&atoms_per_molecule).unwrap());
    }
    assert_eq!(seen_particles, vec![600, 603, 600]);
}

/// Scenario 6: a sparse per-frame scalar block over 100 frames reports
/// exactly 10 stored samples.
#[test]
fn scenario_6_sparse_data_block() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traj.tng");

    let mut writer = Session::init();
    build_water_topology(&mut writer, 1);
    writer.set_output_file(&path).unwrap();
    writer.write_file_headers().unwrap();

    writer.new_frame_set(0, 100);
    writer
        .add_data_block(TRAJ_BOX_SHAPE, "TRAJ_BOX_SHAPE", 1, 10, 5, 0, DataValues::F64(vec![1.0; 10]))
        .unwrap();
    writer.write_frame_set().unwrap().success().unwrap();
    writer.destroy();

    let mut reader = Session::init();
    reader.set_input_file(&path).unwrap();
    reader.read_file_headers().unwrap().success().unwrap();
    assert!(reader.read_next_frame_set().unwrap().success().unwrap());

    let fs = reader.current_frame_set().unwrap();
    let block = &fs.per_frame_blocks[0];
    let sparsity = block.sparsity.unwrap();
    assert_eq!(sparsity.sample_count(100), 10);
    assert_eq!(sparsity.sampled_frames(100), vec![5, 15, 25, 35, 45, 55, 65, 75, 85, 95]);
    match &block.payload {
        tng::data_block::Payload::Raw(DataValues::F64(v)) => assert_eq!(v.len(), 10),
        other => panic!("unexpected payload: {other:?}"),
    }

    // MD5 over hash::md5_of is exercised by unit tests; here we just confirm
    // the block verified cleanly (no entry in failed_blocks).
    assert!(fs.failed_blocks.is_empty());
    let _ = hash::DIGEST_LEN;
}
