//! entropy_coding — Tile-Parallel HEVC Entropy-Coding Stage
//!
//! The entropy stage sits between mode decision and the packetizer.
//! Mode-decision workers post completed LCU-row batches through a
//! [`muxpool`] resource; entropy workers pick them up, advance per-tile
//! row bookkeeping, and serialize LCU syntax into each tile's bitstream
//! through the [`SyntaxCoder`] seam. Every coded row reports its bit count
//! to rate control; when the last tile of a picture drains, the references
//! are released and the picture is handed to the packetizer.
//!
//! # Synchronization
//!
//! - Rows of one tile run strictly in order, one worker at a time
//!   ([`EntropyTileInfo::update_rows`]); rows of distinct tiles run
//!   concurrently
//! - CABAC state is reset once per picture, by whichever tile first enters
//!   row 0, under the picture mutex
//! - Lock order: tile state, then tile coder, then picture mutex — with
//!   the coder lock always released before the picture mutex is taken on
//!   the finalize path
//!
//! # Example
//!
//! See the crate tests for a full pipeline: mode-decision stand-ins
//! posting row batches, entropy workers draining them, and rate-control
//! and packetizer consumers on the far side.

mod coder;
mod kernel;
mod messages;
mod picture;
pub mod qp;
mod sequence;

pub use coder::SyntaxCoder;
pub use kernel::EntropyCodingContext;
pub use messages::{EncDecResult, EntropyCodingResult, RateControlTask, RateControlTaskKind};
pub use picture::{
    EntropyTileInfo, Lcu, NeighborArray, NeighborArrays, PictureControlSet, PictureParams,
    ReferencePicture, SliceType,
};
pub use sequence::{ConfigError, SequenceControlSet};
