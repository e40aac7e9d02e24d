// SPDX-License-Identifier: Apache-2.0, MIT

//! Typed data blocks (§4.8): per-particle or per-frame value tensors with
//! optional sparsity and an optional external codec. IDs `TRAJ_BOX_SHAPE`
//! and above plus any user-defined id `>= 10000` decode through this module.

use crate::codec::Codec;
use crate::endian::{
    checked_capacity, cstring_len, read_cstring, read_f32_from, read_f64_from, read_i64_from, read_u64_from, write_cstring,
    write_u64_to,
};
use crate::error::TngError;

pub const FRAME_DEPENDENT: u8 = 0b10;
pub const PARTICLE_DEPENDENT: u8 = 0b01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Char,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    fn tag(self) -> u8 {
        match self {
            DataType::Char => 0,
            DataType::Int64 => 1,
            DataType::Float32 => 2,
            DataType::Float64 => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, TngError> {
        Ok(match tag {
            0 => DataType::Char,
            1 => DataType::Int64,
            2 => DataType::Float32,
            3 => DataType::Float64,
            other => return Err(TngError::MalformedHeaderSize(other as u64)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataValues {
    Char(Vec<String>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl DataValues {
    pub fn len(&self) -> usize {
        match self {
            DataValues::Char(v) => v.len(),
            DataValues::I64(v) => v.len(),
            DataValues::F32(v) => v.len(),
            DataValues::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn datatype(&self) -> DataType {
        match self {
            DataValues::Char(_) => DataType::Char,
            DataValues::I64(_) => DataType::Int64,
            DataValues::F32(_) => DataType::Float32,
            DataValues::F64(_) => DataType::Float64,
        }
    }
}

/// `first_frame_with_data`/`stride_length`: only frames congruent to
/// `first_frame_with_data (mod stride_length)` are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sparsity {
    pub first_frame_with_data: u64,
    pub stride_length: u64,
}

impl Sparsity {
    /// Number of sampled frames within a frame set of `frameset_n_frames`
    /// frames (scenario 6: `first=5, stride=10, n_frames=100` -> 10 samples).
    pub fn sample_count(&self, frameset_n_frames: u64) -> u64 {
        if self.first_frame_with_data >= frameset_n_frames || self.stride_length == 0 {
            return 0;
        }
        (frameset_n_frames - 1 - self.first_frame_with_data) / self.stride_length + 1
    }

    pub fn sampled_frames(&self, frameset_n_frames: u64) -> Vec<u64> {
        let mut frames = Vec::new();
        let mut f = self.first_frame_with_data;
        while f < frameset_n_frames {
            frames.push(f);
            f += self.stride_length;
        }
        frames
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticleRange {
    pub first_particle: u64,
    pub n_particles: u64,
}

/// Payload as stored: either canonical big-endian values the core
/// understands directly (`codec_id == 0`), or opaque bytes produced by an
/// external codec the core never interprets (§1, §6).
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Raw(DataValues),
    Encoded(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    pub id: u64,
    pub name: Vec<u8>,
    pub datatype: DataType,
    pub dependency: u8,
    pub sparsity: Option<Sparsity>,
    pub n_values_per_frame: u64,
    pub codec_id: u64,
    pub compression_multiplier: Option<f64>,
    pub particle_range: Option<ParticleRange>,
    pub payload: Payload,
}

impl DataBlock {
    pub fn is_frame_dependent(&self) -> bool {
        self.dependency & FRAME_DEPENDENT != 0
    }

    pub fn is_particle_dependent(&self) -> bool {
        self.dependency & PARTICLE_DEPENDENT != 0
    }

    /// Number of (frame) groups this block covers, given the enclosing
    /// frame set's frame count (§4.8: not frame-dependent -> 1; sparse ->
    /// the sampled count; otherwise the frame set's own count).
    pub fn n_frame_groups(&self, frameset_n_frames: u64) -> u64 {
        if !self.is_frame_dependent() {
            return 1;
        }
        match &self.sparsity {
            Some(s) => s.sample_count(frameset_n_frames),
            None => frameset_n_frames,
        }
    }

    fn n_particles_factor(&self) -> u64 {
        self.particle_range.as_ref().map_or(1, |p| p.n_particles)
    }

    pub fn expected_value_count(&self, frameset_n_frames: u64) -> u64 {
        self.n_frame_groups(frameset_n_frames) * self.n_particles_factor() * self.n_values_per_frame
    }

    pub fn new_raw(
        id: u64,
        name: impl Into<Vec<u8>>,
        dependency: u8,
        sparsity: Option<Sparsity>,
        n_values_per_frame: u64,
        particle_range: Option<ParticleRange>,
        values: DataValues,
    ) -> Self {
        let datatype = values.datatype();
        DataBlock {
            id,
            name: name.into(),
            datatype,
            dependency,
            sparsity,
            n_values_per_frame,
            codec_id: 0,
            compression_multiplier: None,
            particle_range,
            payload: Payload::Raw(values),
        }
    }

    /// Validates that the stored value count matches the shape implied by
    /// the header fields, given the enclosing frame set's frame count.
    pub fn check_shape(&self, frameset_n_frames: u64) -> Result<(), TngError> {
        if let Payload::Raw(values) = &self.payload {
            let expected = self.expected_value_count(frameset_n_frames);
            if values.len() as u64 != expected {
                return Err(TngError::ShapeMismatch {
                    expected,
                    got: values.len() as u64,
                });
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, TngError> {
        let mut buf = Vec::new();
        buf.push(self.datatype.tag());
        buf.push(self.dependency);
        if self.is_frame_dependent() {
            buf.push(self.sparsity.is_some() as u8);
            if let Some(s) = &self.sparsity {
                write_u64_to(&mut buf, s.first_frame_with_data)?;
                write_u64_to(&mut buf, s.stride_length)?;
            }
        }
        write_u64_to(&mut buf, self.n_values_per_frame)?;
        write_u64_to(&mut buf, self.codec_id)?;
        if self.codec_id != 0 {
            let m = self.compression_multiplier.unwrap_or(1.0);
            buf.extend_from_slice(&m.to_be_bytes());
        }
        if self.is_particle_dependent() {
            let range = self.particle_range.ok_or(TngError::ShapeMismatch { expected: 1, got: 0 })?;
            write_u64_to(&mut buf, range.first_particle)?;
            write_u64_to(&mut buf, range.n_particles)?;
        }
        match &self.payload {
            Payload::Raw(values) => encode_values(&mut buf, values)?,
            Payload::Encoded(bytes) => buf.extend_from_slice(bytes),
        }
        Ok(buf)
    }

    /// Decodes an external-codec payload's opaque bytes into values, using
    /// `codec` to undo whatever transform produced them. The codec itself
    /// only knows fixed-point `i32`s; `self.datatype` says what the block
    /// actually is, and for the floating types `compression_multiplier` is
    /// the fixed-point scale to divide back out (§4.13).
    pub fn decode_with_codec(&self, codec: &dyn Codec, frameset_n_frames: u64) -> Result<DataValues, TngError> {
        match &self.payload {
            Payload::Raw(v) => Ok(v.clone()),
            Payload::Encoded(bytes) => {
                let multiplier = self.compression_multiplier.unwrap_or(1.0);
                let expected = self.expected_value_count(frameset_n_frames) as usize;
                let ints = codec.unpack(bytes, expected, multiplier)?;
                Ok(match self.datatype {
                    DataType::Int64 => DataValues::I64(ints.into_iter().map(|v| v as i64).collect()),
                    DataType::Float32 => DataValues::F32(ints.into_iter().map(|v| (v as f64 / multiplier) as f32).collect()),
                    DataType::Float64 => DataValues::F64(ints.into_iter().map(|v| v as f64 / multiplier).collect()),
                    DataType::Char => {
                        return Err(TngError::ShapeMismatch {
                            expected: expected as u64,
                            got: ints.len() as u64,
                        })
                    }
                })
            }
        }
    }
}

/// Decodes a generic data-block payload given the block's `id`/`name` (taken
/// from the enclosing generic block header) and the enclosing frame set's
/// frame count (needed to size a non-sparse, frame-dependent value tensor).
pub fn decode_data_block(id: u64, name: Vec<u8>, payload: &[u8], frameset_n_frames: u64) -> Result<DataBlock, TngError> {
    let mut cursor = std::io::Cursor::new(payload);
    let mut tag = [0u8; 1];
    std::io::Read::read_exact(&mut cursor, &mut tag)?;
    let datatype = DataType::from_tag(tag[0])?;
    let mut dep = [0u8; 1];
    std::io::Read::read_exact(&mut cursor, &mut dep)?;
    let dependency = dep[0];

    let mut sparsity = None;
    if dependency & FRAME_DEPENDENT != 0 {
        let mut sparse_flag = [0u8; 1];
        std::io::Read::read_exact(&mut cursor, &mut sparse_flag)?;
        if sparse_flag[0] != 0 {
            let first_frame_with_data = read_u64_from(&mut cursor)?;
            let stride_length = read_u64_from(&mut cursor)?;
            sparsity = Some(Sparsity {
                first_frame_with_data,
                stride_length,
            });
        }
    }

    let n_values_per_frame = read_u64_from(&mut cursor)?;
    let codec_id = read_u64_from(&mut cursor)?;
    let compression_multiplier = if codec_id != 0 {
        Some(read_f64_from(&mut cursor)?)
    } else {
        None
    };

    let particle_range = if dependency & PARTICLE_DEPENDENT != 0 {
        let first_particle = read_u64_from(&mut cursor)?;
        let n_particles = read_u64_from(&mut cursor)?;
        Some(ParticleRange {
            first_particle,
            n_particles,
        })
    } else {
        None
    };

    let mut block = DataBlock {
        id,
        name,
        datatype,
        dependency,
        sparsity,
        n_values_per_frame,
        codec_id,
        compression_multiplier,
        particle_range,
        payload: Payload::Encoded(Vec::new()),
    };

    let n_groups = block.n_frame_groups(frameset_n_frames);
    let n_values = n_groups * block.n_particles_factor() * n_values_per_frame;

    if codec_id != 0 {
        let rest = &payload[cursor.position() as usize..];
        block.payload = Payload::Encoded(rest.to_vec());
    } else {
        block.payload = Payload::Raw(decode_values(&mut cursor, datatype, n_values)?);
    }

    Ok(block)
}

fn encode_values(buf: &mut Vec<u8>, values: &DataValues) -> Result<(), TngError> {
    match values {
        DataValues::Char(strings) => {
            for s in strings {
                write_cstring(buf, s.as_bytes())?;
            }
        }
        DataValues::I64(ints) => {
            for &v in ints {
                buf.extend_from_slice(&v.to_be_bytes());
            }
        }
        DataValues::F32(floats) => {
            for &v in floats {
                buf.extend_from_slice(&v.to_be_bytes());
            }
        }
        DataValues::F64(floats) => {
            for &v in floats {
                buf.extend_from_slice(&v.to_be_bytes());
            }
        }
    }
    Ok(())
}

fn decode_values(cursor: &mut std::io::Cursor<&[u8]>, datatype: DataType, n_values: u64) -> Result<DataValues, TngError> {
    let remaining = cursor.get_ref().len() as u64 - cursor.position();
    Ok(match datatype {
        DataType::Char => {
            let mut out = Vec::with_capacity(checked_capacity(n_values, 1, remaining)?);
            for _ in 0..n_values {
                let bytes = read_cstring(cursor)?;
                out.push(String::from_utf8_lossy(&bytes).into_owned());
            }
            DataValues::Char(out)
        }
        DataType::Int64 => {
            let mut out = Vec::with_capacity(checked_capacity(n_values, 8, remaining)?);
            for _ in 0..n_values {
                out.push(read_i64_from(cursor)?);
            }
            DataValues::I64(out)
        }
        DataType::Float32 => {
            let mut out = Vec::with_capacity(checked_capacity(n_values, 4, remaining)?);
            for _ in 0..n_values {
                out.push(read_f32_from(cursor)?);
            }
            DataValues::F32(out)
        }
        DataType::Float64 => {
            let mut out = Vec::with_capacity(checked_capacity(n_values, 8, remaining)?);
            for _ in 0..n_values {
                out.push(read_f64_from(cursor)?);
            }
            DataValues::F64(out)
        }
    })
}

/// Serialized length of the payload `encode` would produce, without
/// allocating it.
pub fn encoded_len(block: &DataBlock) -> u64 {
    let mut len = 2u64; // datatype tag, dependency
    if block.is_frame_dependent() {
        len += 1;
        if block.sparsity.is_some() {
            len += 16;
        }
    }
    len += 8 + 8; // n_values_per_frame, codec_id
    if block.codec_id != 0 {
        len += 8;
    }
    if block.is_particle_dependent() {
        len += 16;
    }
    len += match &block.payload {
        Payload::Raw(DataValues::Char(strings)) => strings.iter().map(|s| cstring_len(s.as_bytes())).sum(),
        Payload::Raw(DataValues::I64(v)) => v.len() as u64 * 8,
        Payload::Raw(DataValues::F32(v)) => v.len() as u64 * 4,
        Payload::Raw(DataValues::F64(v)) => v.len() as u64 * 8,
        Payload::Encoded(bytes) => bytes.len() as u64,
    };
    len
}
