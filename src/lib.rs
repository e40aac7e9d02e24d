// SPDX-License-Identifier: Apache-2.0, MIT

//! `tng`: a self-describing, block-structured binary container for
//! molecular-dynamics trajectories.
//!
//! A trajectory file opens with a GENERAL_INFO block and a MOLECULES block
//! describing the topology, followed by a doubly linked list of
//! TRAJECTORY_FRAME_SET blocks, each carrying its own table of contents,
//! particle mappings, and typed data blocks (positions, velocities, forces,
//! box shape, or user-defined blocks). Every block is big-endian on disk
//! regardless of the writing host's native layout, and carries an MD5
//! digest over its payload for tamper evidence. See [`session::Session`]
//! for the entry point most callers want.

pub mod block;
pub mod codec;
pub mod data_block;
pub mod endian;
pub mod error;
pub mod frameset;
pub mod general_info;
pub mod hash;
pub mod mapping;
pub mod session;
pub mod time;
pub mod topology;

pub use codec::{Codec, CodecRegistry, NullCodec};
pub use error::{FailureReason, Outcome, TngError};
pub use session::{Session, SessionState};
