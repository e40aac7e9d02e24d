// SPDX-License-Identifier: Apache-2.0, MIT

//! GENERAL_INFO block (§4.5): program/user/computer/signature metadata plus
//! the two root pointers into the frame-set linked list.

use std::io::{Read, Write};

use crate::endian::{cstring_len, read_cstring, read_u64_from, write_cstring, write_u64_to};
use crate::error::TngError;

/// Sentinel used for an unset navigation pointer. Readers must also accept a
/// literal `0` (§6) since both appear in files written by different tools.
pub const SENTINEL: u64 = u64::MAX;

pub fn is_unset(pointer: u64) -> bool {
    pointer == SENTINEL || pointer == 0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralInfo {
    pub program_name: Vec<u8>,
    pub forcefield_name: Vec<u8>,
    pub user_name: Vec<u8>,
    pub creation_time: i64,
    pub computer_name: Vec<u8>,
    pub pgp_signature: Vec<u8>,
    pub var_num_atoms_flag: bool,
    pub frame_set_n_frames: u64,
    pub first_frame_set_file_pos: u64,
    pub last_frame_set_file_pos: u64,
    pub long_stride_length: u64,
}

impl GeneralInfo {
    pub fn new(program_name: impl Into<Vec<u8>>, frame_set_n_frames: u64, long_stride_length: u64) -> Self {
        GeneralInfo {
            program_name: program_name.into(),
            forcefield_name: Vec::new(),
            user_name: Vec::new(),
            creation_time: 0,
            computer_name: Vec::new(),
            pgp_signature: Vec::new(),
            var_num_atoms_flag: false,
            frame_set_n_frames,
            first_frame_set_file_pos: SENTINEL,
            last_frame_set_file_pos: SENTINEL,
            long_stride_length,
        }
    }

    pub fn has_frame_sets(&self) -> bool {
        !is_unset(self.first_frame_set_file_pos)
    }

    pub fn encode(&self) -> Result<Vec<u8>, TngError> {
        let mut buf = Vec::new();
        write_cstring(&mut buf, &self.program_name)?;
        write_cstring(&mut buf, &self.forcefield_name)?;
        write_cstring(&mut buf, &self.user_name)?;
        buf.extend_from_slice(&self.creation_time.to_be_bytes());
        write_cstring(&mut buf, &self.computer_name)?;
        write_cstring(&mut buf, &self.pgp_signature)?;
        buf.push(self.var_num_atoms_flag as u8);
        write_u64_to(&mut buf, self.frame_set_n_frames)?;
        write_u64_to(&mut buf, self.first_frame_set_file_pos)?;
        write_u64_to(&mut buf, self.last_frame_set_file_pos)?;
        write_u64_to(&mut buf, self.long_stride_length)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, TngError> {
        let mut cursor = std::io::Cursor::new(payload);
        let program_name = read_cstring(&mut cursor)?;
        let forcefield_name = read_cstring(&mut cursor)?;
        let user_name = read_cstring(&mut cursor)?;
        let mut time_buf = [0u8; 8];
        cursor.read_exact(&mut time_buf)?;
        let creation_time = i64::from_be_bytes(time_buf);
        let computer_name = read_cstring(&mut cursor)?;
        let pgp_signature = read_cstring(&mut cursor)?;
        let mut flag = [0u8; 1];
        cursor.read_exact(&mut flag)?;
        let var_num_atoms_flag = flag[0] != 0;
        let frame_set_n_frames = read_u64_from(&mut cursor)?;
        let first_frame_set_file_pos = read_u64_from(&mut cursor)?;
        let last_frame_set_file_pos = read_u64_from(&mut cursor)?;
        let long_stride_length = read_u64_from(&mut cursor)?;
        Ok(GeneralInfo {
            program_name,
            forcefield_name,
            user_name,
            creation_time,
            computer_name,
            pgp_signature,
            var_num_atoms_flag,
            frame_set_n_frames,
            first_frame_set_file_pos,
            last_frame_set_file_pos,
            long_stride_length,
        })
    }

    pub fn encoded_len(&self) -> u64 {
        cstring_len(&self.program_name)
            + cstring_len(&self.forcefield_name)
            + cstring_len(&self.user_name)
            + 8 // creation_time
            + cstring_len(&self.computer_name)
            + cstring_len(&self.pgp_signature)
            + 1 // var_num_atoms_flag
            + 8 * 4 // frame_set_n_frames, first/last pointers, long_stride_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut gi = GeneralInfo::new("tng-rs", 100, 10);
        gi.user_name = b"alice".to_vec();
        gi.creation_time = 1_700_000_000;
        gi.first_frame_set_file_pos = 64;
        gi.last_frame_set_file_pos = 4096;

        let bytes = gi.encode().unwrap();
        assert_eq!(bytes.len() as u64, gi.encoded_len());
        let back = GeneralInfo::decode(&bytes).unwrap();
        assert_eq!(back, gi);
    }

    #[test]
    fn both_sentinel_forms_are_unset() {
        assert!(is_unset(0));
        assert!(is_unset(SENTINEL));
        assert!(!is_unset(42));
    }
}
