// SPDX-License-Identifier: Apache-2.0, MIT

//! MOLECULES block (§4.4): molecules own their chains/residues/atoms/bonds
//! by value; back-references are plain indices rather than owning pointers,
//! which dissolves the atom->residue->chain->molecule cycle a naive port
//! would otherwise have to represent with `Rc`/`Weak` (§9).

use std::io::{Read, Write};

use crate::endian::{checked_capacity, cstring_len, read_cstring, read_u64_from, write_cstring, write_u64_to};
use crate::error::TngError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub id: u64,
    pub name: Vec<u8>,
    pub atom_type: Vec<u8>,
    /// Index of the owning residue within `Chain::residues`.
    pub residue_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Residue {
    pub id: u64,
    pub name: Vec<u8>,
    /// Index of the owning chain within `Molecule::chains`.
    pub chain_index: usize,
    pub atoms: Vec<Atom>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub id: u64,
    pub name: Vec<u8>,
    /// Index of the owning molecule within `Topology::molecules`.
    pub molecule_index: usize,
    pub residues: Vec<Residue>,
}

/// A bond between two atoms of the same molecule, addressed by each atom's
/// position in the molecule's flattened (chain, residue, atom) traversal
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    pub from_atom: u64,
    pub to_atom: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Molecule {
    pub id: u64,
    pub name: Vec<u8>,
    /// Recorded but never interpreted by the core — preserved on round-trip
    /// only (§9 open question).
    pub quaternary_str: i64,
    pub chains: Vec<Chain>,
    pub bonds: Vec<Bond>,
}

impl Molecule {
    pub fn new(id: u64, name: impl Into<Vec<u8>>, quaternary_str: i64) -> Self {
        Molecule {
            id,
            name: name.into(),
            quaternary_str,
            chains: Vec::new(),
            bonds: Vec::new(),
        }
    }

    pub fn n_chains(&self) -> u64 {
        self.chains.len() as u64
    }

    pub fn n_residues(&self) -> u64 {
        self.chains.iter().map(|c| c.residues.len() as u64).sum()
    }

    pub fn n_atoms(&self) -> u64 {
        self.chains
            .iter()
            .flat_map(|c| &c.residues)
            .map(|r| r.atoms.len() as u64)
            .sum()
    }

    pub fn add_chain(&mut self, id: u64, name: impl Into<Vec<u8>>) -> usize {
        let index = self.chains.len();
        self.chains.push(Chain {
            id,
            name: name.into(),
            molecule_index: 0, // filled in by Topology::add_molecule's caller context
            residues: Vec::new(),
        });
        index
    }

    pub fn add_residue(&mut self, chain_index: usize, id: u64, name: impl Into<Vec<u8>>) -> usize {
        let chain = &mut self.chains[chain_index];
        let index = chain.residues.len();
        chain.residues.push(Residue {
            id,
            name: name.into(),
            chain_index,
            atoms: Vec::new(),
        });
        index
    }

    pub fn add_atom(
        &mut self,
        chain_index: usize,
        residue_index: usize,
        id: u64,
        name: impl Into<Vec<u8>>,
        atom_type: impl Into<Vec<u8>>,
    ) {
        let residue = &mut self.chains[chain_index].residues[residue_index];
        residue.atoms.push(Atom {
            id,
            name: name.into(),
            atom_type: atom_type.into(),
            residue_index,
        });
    }

    pub fn add_bond(&mut self, from_atom: u64, to_atom: u64) {
        self.bonds.push(Bond { from_atom, to_atom });
    }
}

/// Whether molecule instance counts live in the trajectory's MOLECULES block
/// (constant for the whole trajectory) or in each frame-set header (may vary
/// per frame set), selected by GENERAL_INFO's `var_num_atoms_flag` (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub molecules: Vec<Molecule>,
    /// `Some` in constant-N mode (one count per molecule); `None` in
    /// variable-N mode, where counts are carried by each frame set instead.
    pub molecule_counts: Option<Vec<u64>>,
}

impl Topology {
    pub fn new(var_num_atoms: bool) -> Self {
        Topology {
            molecules: Vec::new(),
            molecule_counts: if var_num_atoms { None } else { Some(Vec::new()) },
        }
    }

    pub fn is_variable_n(&self) -> bool {
        self.molecule_counts.is_none()
    }

    pub fn add_molecule(&mut self, mut molecule: Molecule) -> usize {
        let index = self.molecules.len();
        for chain in &mut molecule.chains {
            chain.molecule_index = index;
        }
        self.molecules.push(molecule);
        if let Some(counts) = &mut self.molecule_counts {
            counts.push(0);
        }
        index
    }

    /// Sets the instance count of `molecule_index` — only valid in
    /// constant-N mode; a no-op (returning `false`) otherwise, since in
    /// variable-N mode the count belongs to the current frame set.
    pub fn set_molecule_cnt(&mut self, molecule_index: usize, count: u64) -> bool {
        match &mut self.molecule_counts {
            Some(counts) => {
                counts[molecule_index] = count;
                true
            }
            None => false,
        }
    }

    /// Total particle count implied by this topology, given the molecule
    /// instance counts of the constant-N trajectory or of one frame set.
    pub fn total_particles(&self, counts: &[u64]) -> u64 {
        self.molecules
            .iter()
            .zip(counts)
            .map(|(m, &n)| m.n_atoms() * n)
            .sum()
    }

    pub fn encode(&self) -> Result<Vec<u8>, TngError> {
        let mut buf = Vec::new();
        write_u64_to(&mut buf, self.molecules.len() as u64)?;
        for (i, molecule) in self.molecules.iter().enumerate() {
            write_u64_to(&mut buf, molecule.id)?;
            write_cstring(&mut buf, &molecule.name)?;
            write_i64(&mut buf, molecule.quaternary_str);
            if let Some(counts) = &self.molecule_counts {
                write_u64_to(&mut buf, counts[i])?;
            }
            write_u64_to(&mut buf, molecule.n_chains())?;
            write_u64_to(&mut buf, molecule.n_residues())?;
            write_u64_to(&mut buf, molecule.n_atoms())?;
            for chain in &molecule.chains {
                write_u64_to(&mut buf, chain.id)?;
                write_cstring(&mut buf, &chain.name)?;
                write_u64_to(&mut buf, chain.residues.len() as u64)?;
                for residue in &chain.residues {
                    write_u64_to(&mut buf, residue.id)?;
                    write_cstring(&mut buf, &residue.name)?;
                    write_u64_to(&mut buf, residue.atoms.len() as u64)?;
                    for atom in &residue.atoms {
                        write_u64_to(&mut buf, atom.id)?;
                        write_cstring(&mut buf, &atom.name)?;
                        write_cstring(&mut buf, &atom.atom_type)?;
                    }
                }
            }
            write_u64_to(&mut buf, molecule.bonds.len() as u64)?;
            for bond in &molecule.bonds {
                write_u64_to(&mut buf, bond.from_atom)?;
                write_u64_to(&mut buf, bond.to_atom)?;
            }
        }
        Ok(buf)
    }

    pub fn decode(payload: &[u8], var_num_atoms: bool) -> Result<Self, TngError> {
        let mut cursor = std::io::Cursor::new(payload);
        let n_molecules = read_u64_from(&mut cursor)?;
        let remaining = payload.len() as u64 - cursor.position();
        let mut molecules = Vec::with_capacity(checked_capacity(n_molecules, 8, remaining)?);
        let mut counts = if var_num_atoms { None } else { Some(Vec::new()) };

        for molecule_index in 0..n_molecules as usize {
            let id = read_u64_from(&mut cursor)?;
            let name = read_cstring(&mut cursor)?;
            let quaternary_str = read_i64(&mut cursor)?;
            if let Some(counts) = &mut counts {
                counts.push(read_u64_from(&mut cursor)?);
            }
            let n_chains = read_u64_from(&mut cursor)?;
            let _n_residues = read_u64_from(&mut cursor)?;
            let _n_atoms = read_u64_from(&mut cursor)?;

            let mut molecule = Molecule::new(id, name, quaternary_str);
            for _ in 0..n_chains {
                let chain_id = read_u64_from(&mut cursor)?;
                let chain_name = read_cstring(&mut cursor)?;
                let chain_index = molecule.add_chain(chain_id, chain_name);
                molecule.chains[chain_index].molecule_index = molecule_index;
                let n_residues = read_u64_from(&mut cursor)?;
                for _ in 0..n_residues {
                    let residue_id = read_u64_from(&mut cursor)?;
                    let residue_name = read_cstring(&mut cursor)?;
                    let residue_index = molecule.add_residue(chain_index, residue_id, residue_name);
                    let n_atoms = read_u64_from(&mut cursor)?;
                    for _ in 0..n_atoms {
                        let atom_id = read_u64_from(&mut cursor)?;
                        let atom_name = read_cstring(&mut cursor)?;
                        let atom_type = read_cstring(&mut cursor)?;
                        molecule.add_atom(chain_index, residue_index, atom_id, atom_name, atom_type);
                    }
                }
            }

            let n_bonds = read_u64_from(&mut cursor)?;
            for _ in 0..n_bonds {
                let from_atom = read_u64_from(&mut cursor)?;
                let to_atom = read_u64_from(&mut cursor)?;
                molecule.add_bond(from_atom, to_atom);
            }

            molecules.push(molecule);
        }

        Ok(Topology {
            molecules,
            molecule_counts: counts,
        })
    }

    /// Serialized length of the MOLECULES payload this topology would
    /// produce, without allocating it — used by callers that just need
    /// `contents_size` ahead of time.
    pub fn encoded_len(&self) -> u64 {
        let mut len = 8u64;
        for (i, molecule) in self.molecules.iter().enumerate() {
            len += 8 + cstring_len(&molecule.name) + 8; // id, name, quaternary_str
            if self.molecule_counts.is_some() {
                len += 8;
            }
            let _ = i;
            len += 8 + 8 + 8; // n_chains, n_residues, n_atoms
            for chain in &molecule.chains {
                len += 8 + cstring_len(&chain.name) + 8;
                for residue in &chain.residues {
                    len += 8 + cstring_len(&residue.name) + 8;
                    for atom in &residue.atoms {
                        len += 8 + cstring_len(&atom.name) + cstring_len(&atom.atom_type);
                    }
                }
            }
            len += 8 + molecule.bonds.len() as u64 * 16;
        }
        len
    }
}

fn write_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn read_i64<R: Read>(r: &mut R) -> Result<i64, TngError> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(i64::from_be_bytes(b))
}
