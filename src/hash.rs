// SPDX-License-Identifier: Apache-2.0, MIT

//! MD5 digest over a block's payload, used for tamper-evidence only.

use digest::Digest;
use md5::Md5;

pub const DIGEST_LEN: usize = 16;

pub type Digest16 = [u8; DIGEST_LEN];

pub const ZERO_DIGEST: Digest16 = [0u8; DIGEST_LEN];

/// Computes the 16-byte MD5 digest of `payload`.
///
/// # Example
/// ```
/// use tng::hash::md5_of;
///
/// let digest = md5_of(b"");
/// assert_eq!(digest.len(), 16);
/// ```
pub fn md5_of(payload: &[u8]) -> Digest16 {
    let mut hasher = Md5::new();
    hasher.update(payload);
    let out = hasher.finalize();
    let mut ret = [0u8; DIGEST_LEN];
    ret.copy_from_slice(&out);
    ret
}

/// A stored digest of all zeroes means "unverified; accept" (invariant 3).
pub fn is_unverified(stored: &Digest16) -> bool {
    *stored == ZERO_DIGEST
}

/// `true` if `stored` is the zero sentinel, or matches MD5(payload).
pub fn verify(payload: &[u8], stored: &Digest16) -> bool {
    is_unverified(stored) || md5_of(payload) == *stored
}
