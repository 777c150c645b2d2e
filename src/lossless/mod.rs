
//! The lossless bitstream: a header, a list of reversible transforms,
//! and an entropy-coded stream of literals, backward copies and color cache references.

pub mod transform;
pub mod cache;
pub mod lz77;
pub mod decode;
pub mod encode;

pub use self::decode::{decode, decode_headerless};
pub use self::encode::{encode, encode_headerless, LosslessOptions};
pub use self::transform::{TransformKind, TransformSet};

use crate::bits::{BitReader, BitWriter};
use crate::error::{Error, Result, INVALID_VERSION};
use crate::image::MAX_IMAGE_SIZE;
use crate::math::Vec2;


/// The first byte of every lossless stream.
pub const SIGNATURE: u8 = 0x2F;

const SIZE_BITS: u32 = 14;
const VERSION_BITS: u32 = 3;

/// Number of green symbols that encode copy lengths instead of literals.
pub(crate) const LENGTH_CODES: usize = lz77::LENGTH_SYMBOL_COUNT;

/// Alphabet sizes of red, blue and alpha.
pub(crate) const LITERAL_ALPHABET_SIZE: usize = 256;


/// The five byte header in front of the transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {

    /// Width and height, each between 1 and 16384.
    pub size: Vec2<usize>,

    /// Whether the encoder saw transparent pixels. Decoders ignore this hint.
    pub alpha_hint: bool,
}

impl Header {

    /// Read the signature, size, alpha hint and version.
    pub fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        if reader.read(8)? != u32::from(SIGNATURE) {
            return Err(Error::invalid("lossless signature"));
        }

        let width = reader.read(SIZE_BITS)? as usize + 1;
        let height = reader.read(SIZE_BITS)? as usize + 1;
        let alpha_hint = reader.read_bit()?;

        if reader.read(VERSION_BITS)? != 0 {
            return Err(Error::invalid(INVALID_VERSION));
        }

        Ok(Header { size: Vec2(width, height), alpha_hint })
    }

    /// Write the signature, size, alpha hint and version.
    pub fn write(&self, writer: &mut BitWriter) -> Result<()> {
        let size = self.size.validate(MAX_IMAGE_SIZE, "lossless image size")?;

        writer.write(u32::from(SIGNATURE), 8);
        writer.write(size.0 as u32 - 1, SIZE_BITS);
        writer.write(size.1 as u32 - 1, SIZE_BITS);
        writer.write_bit(self.alpha_hint);
        writer.write(0, VERSION_BITS);
        Ok(())
    }
}
