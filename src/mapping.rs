// SPDX-License-Identifier: Apache-2.0, MIT

//! PARTICLE_MAPPING blocks (§4.7): partition the global particle index
//! space for one frame set so following data blocks can describe a subset
//! of particles.

use crate::endian::{checked_capacity, read_u64_from, write_u64_to};
use crate::error::TngError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticleMapping {
    pub num_first_particle: u64,
    /// `real_particle_index[slot]` gives the global particle number for
    /// in-block slot `slot`.
    pub real_particle_index: Vec<u64>,
}

impl ParticleMapping {
    pub fn new(num_first_particle: u64, real_particle_index: Vec<u64>) -> Self {
        ParticleMapping {
            num_first_particle,
            real_particle_index,
        }
    }

    pub fn n_particles(&self) -> u64 {
        self.real_particle_index.len() as u64
    }

    pub fn encode(&self) -> Result<Vec<u8>, TngError> {
        let mut buf = Vec::new();
        write_u64_to(&mut buf, self.num_first_particle)?;
        write_u64_to(&mut buf, self.n_particles())?;
        for &idx in &self.real_particle_index {
            write_u64_to(&mut buf, idx)?;
        }
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, TngError> {
        let mut cursor = std::io::Cursor::new(payload);
        let num_first_particle = read_u64_from(&mut cursor)?;
        let n_particles = read_u64_from(&mut cursor)?;
        let remaining = payload.len() as u64 - cursor.position();
        let mut real_particle_index = Vec::with_capacity(checked_capacity(n_particles, 8, remaining)?);
        for _ in 0..n_particles {
            real_particle_index.push(read_u64_from(&mut cursor)?);
        }
        Ok(ParticleMapping {
            num_first_particle,
            real_particle_index,
        })
    }

    pub fn encoded_len(&self) -> u64 {
        16 + self.real_particle_index.len() as u64 * 8
    }
}

/// `true` if no two mappings in `mappings` claim overlapping in-block slot
/// ranges (§4.7 invariant).
pub fn mappings_are_disjoint(mappings: &[ParticleMapping]) -> bool {
    let mut ranges: Vec<(u64, u64)> = mappings
        .iter()
        .map(|m| (m.num_first_particle, m.num_first_particle + m.n_particles()))
        .collect();
    ranges.sort_unstable();
    ranges.windows(2).all(|w| w[0].1 <= w[1].0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mapping = ParticleMapping::new(0, vec![5, 6, 7, 8]);
        let bytes = mapping.encode().unwrap();
        assert_eq!(bytes.len() as u64, mapping.encoded_len());
        let back = ParticleMapping::decode(&bytes).unwrap();
        assert_eq!(back, mapping);
    }

    #[test]
    fn detects_overlap() {
        let a = ParticleMapping::new(0, vec![0, 1, 2]);
        let b = ParticleMapping::new(2, vec![0, 1]);
        assert!(!mappings_are_disjoint(&[a, b]));

        let c = ParticleMapping::new(0, vec![0, 1, 2]);
        let d = ParticleMapping::new(3, vec![0, 1]);
        assert!(mappings_are_disjoint(&[c, d]));
    }
}
