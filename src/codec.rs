// SPDX-License-Identifier: Apache-2.0, MIT

//! The codec interface the core consumes (§6) and its built-in passthrough
//! implementation. Real compressors (XTC2, XTC3, the bit-level coder) are
//! external collaborators out of scope for this crate (§1) — this module
//! only defines the seam they plug into.

use std::collections::HashMap;

use crate::error::TngError;

pub const NULL_CODEC_ID: u64 = 0;

/// Packs/unpacks a data block's values to/from opaque bytes. `compression_multiplier`
/// is supplied by the core and opaque to it; a codec is free to ignore it.
pub trait Codec: Send + Sync {
    fn id(&self) -> u64;
    fn pack(&self, input: &[i32], compression_multiplier: f64) -> Result<Vec<u8>, TngError>;
    fn unpack(&self, input: &[u8], expected_len: usize, compression_multiplier: f64) -> Result<Vec<i32>, TngError>;
}

/// Identity codec: big-endian `i32` values in, the same bytes out. Used for
/// `codec_id == 0` ("uncompressed", §3) and as a reference implementation
/// for anyone wiring in a real compressor.
pub struct NullCodec;

impl Codec for NullCodec {
    fn id(&self) -> u64 {
        NULL_CODEC_ID
    }

    fn pack(&self, input: &[i32], _compression_multiplier: f64) -> Result<Vec<u8>, TngError> {
        let mut out = Vec::with_capacity(input.len() * 4);
        for &v in input {
            out.extend_from_slice(&v.to_be_bytes());
        }
        Ok(out)
    }

    fn unpack(&self, input: &[u8], expected_len: usize, _compression_multiplier: f64) -> Result<Vec<i32>, TngError> {
        if input.len() != expected_len * 4 {
            return Err(TngError::ShapeMismatch {
                expected: (expected_len * 4) as u64,
                got: input.len() as u64,
            });
        }
        Ok(input.chunks_exact(4).map(|c| i32::from_be_bytes(c.try_into().unwrap())).collect())
    }
}

/// Maps `codec_id` to a registered [`Codec`]. The core ships only
/// [`NullCodec`]; callers register real compressors themselves.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<u64, Box<dyn Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        let mut registry = CodecRegistry {
            codecs: HashMap::new(),
        };
        registry.register(Box::new(NullCodec));
        registry
    }

    pub fn register(&mut self, codec: Box<dyn Codec>) {
        self.codecs.insert(codec.id(), codec);
    }

    pub fn get(&self, codec_id: u64) -> Result<&dyn Codec, TngError> {
        self.codecs.get(&codec_id).map(|c| c.as_ref()).ok_or(TngError::UnknownCodec(codec_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_codec_roundtrips() {
        let codec = NullCodec;
        let values = vec![1, -2, 3, i32::MAX, i32::MIN];
        let packed = codec.pack(&values, 1.0).unwrap();
        let unpacked = codec.unpack(&packed, values.len(), 1.0).unwrap();
        assert_eq!(unpacked, values);
    }

    #[test]
    fn registry_looks_up_by_id() {
        let registry = CodecRegistry::new();
        assert_eq!(registry.get(NULL_CODEC_ID).unwrap().id(), 0);
        assert!(registry.get(42).is_err());
    }
}
