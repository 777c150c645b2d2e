
//! The lossy bitstream: a key frame of macroblocks, each predicted from its reconstructed
//! neighbours and corrected by a quantized, transformed residual, all coded with a binary range coder.
//! Only key frames are supported.

pub mod tables;
pub mod bool_coder;
pub mod header;
pub mod planes;
pub mod idct;
pub mod predict;
pub mod residual;
pub mod modes;
pub mod filter;
pub mod decode;
pub mod encode;

pub use self::decode::decode;
pub use self::encode::{encode, LossyOptions, Partitions};
