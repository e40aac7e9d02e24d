// SPDX-License-Identifier: Apache-2.0, MIT

//! Property-based tests for the invariants listed in the testable-properties
//! section: endianness round-trips, hash determinism, topology round-trip,
//! sparsity sample counts, and particle-mapping disjointness.

use quickcheck_macros::quickcheck;

use tng::endian::{read_f64, read_i64, read_u64, write_f64, write_i64, write_u64};
use tng::hash::md5_of;
use tng::mapping::{mappings_are_disjoint, ParticleMapping};

#[quickcheck]
fn u64_roundtrips_through_canonical_be(v: u64) -> bool {
    let mut buf = [0u8; 8];
    write_u64(&mut buf, v);
    read_u64(&buf) == v
}

#[quickcheck]
fn i64_roundtrips_through_canonical_be(v: i64) -> bool {
    let mut buf = [0u8; 8];
    write_i64(&mut buf, v);
    read_i64(&buf) == v
}

#[quickcheck]
fn f64_roundtrips_through_canonical_be(v: f64) -> bool {
    let mut buf = [0u8; 8];
    write_f64(&mut buf, v);
    let back = read_f64(&buf);
    back.to_bits() == v.to_bits() || (v.is_nan() && back.is_nan())
}

#[quickcheck]
fn md5_is_deterministic(payload: Vec<u8>) -> bool {
    md5_of(&payload) == md5_of(&payload)
}

#[quickcheck]
fn md5_changes_with_payload(a: Vec<u8>, b: Vec<u8>) -> bool {
    a == b || md5_of(&a) != md5_of(&b)
}

/// A topology's encode/decode round-trip preserves molecule structure and
/// wired-up back-pointers for any number of atoms in a single chain/residue.
#[quickcheck]
fn topology_roundtrip_preserves_atom_count(n_atoms: u8) -> bool {
    use tng::topology::{Molecule, Topology};

    let n_atoms = n_atoms as u64 % 64; // keep test fast
    let mut topo = Topology::new(false);
    let mut molecule = Molecule::new(1, "m", 0);
    let chain = molecule.add_chain(1, "c");
    let residue = molecule.add_residue(chain, 1, "r");
    for i in 0..n_atoms {
        molecule.add_atom(chain, residue, i, "a", "t");
    }
    topo.add_molecule(molecule);
    topo.set_molecule_cnt(0, 5);

    let bytes = topo.encode().unwrap();
    let back = Topology::decode(&bytes, false).unwrap();
    back == topo && back.total_particles(&[5]) == n_atoms * 5
}

/// Disjoint, contiguous mapping ranges always report as disjoint; a second
/// mapping that starts before the first one ends never does.
#[quickcheck]
fn disjoint_contiguous_mappings_detected(a_len: u8, b_len: u8) -> bool {
    let a_len = (a_len as u64 % 20) + 1;
    let b_len = (b_len as u64 % 20) + 1;
    let a = ParticleMapping::new(0, vec![0; a_len as usize]);
    let b = ParticleMapping::new(a_len, vec![0; b_len as usize]);
    mappings_are_disjoint(&[a, b])
}

#[quickcheck]
fn overlapping_mappings_are_rejected(a_len: u8, overlap: u8) -> bool {
    let a_len = (a_len as u64 % 20) + 2;
    let overlap = (overlap as u64 % (a_len - 1)) + 1;
    let a = ParticleMapping::new(0, vec![0; a_len as usize]);
    let b = ParticleMapping::new(a_len - overlap, vec![0; 4]);
    !mappings_are_disjoint(&[a, b])
}

/// `Sparsity::sample_count` matches the closed-form "how many multiples of
/// stride, starting at first_frame_with_data, fall below n_frames".
#[quickcheck]
fn sparsity_sample_count_matches_brute_force(first: u8, stride: u8, n_frames: u8) -> bool {
    use tng::data_block::Sparsity;

    let stride = (stride as u64 % 10) + 1;
    let first = first as u64 % 50;
    let n_frames = n_frames as u64 % 100;

    let sparsity = Sparsity {
        first_frame_with_data: first,
        stride_length: stride,
    };
    let expected = (0..n_frames).filter(|f| *f >= first && (*f - first) % stride == 0).count() as u64;
    sparsity.sample_count(n_frames) == expected
}
