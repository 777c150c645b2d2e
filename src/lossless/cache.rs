
//! Hash table of recently emitted pixels, addressed by short codes.

use crate::error::{Error, Result, INVALID_COLOR_CACHE};
use crate::image::Rgba;


const HASH_MULTIPLIER: u32 = 0x1e35_a7bd;

/// The largest allowed number of index bits.
pub const MAX_CACHE_BITS: u32 = 11;

/// Pack a pixel in the alpha, red, green, blue order used for hashing.
#[inline]
pub fn argb(pixel: Rgba) -> u32 {
    let [red, green, blue, alpha] = pixel;
    u32::from_be_bytes([alpha, red, green, blue])
}

/// Multiplicative hash, truncated to the given number of bits.
#[inline]
pub fn hash(argb: u32, bits: u32) -> usize {
    (argb.wrapping_mul(HASH_MULTIPLIER) >> (32 - bits)) as usize
}


/// A fixed-size array of pixels, indexed by the hash of their value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorCache {
    bits: u32,
    colors: Vec<Rgba>,
}

impl ColorCache {

    /// Create an empty cache with `1 << bits` entries.
    /// Fails for bit counts outside of `1 ..= 11`.
    pub fn new(bits: u32) -> Result<Self> {
        if bits == 0 || bits > MAX_CACHE_BITS {
            return Err(Error::invalid(INVALID_COLOR_CACHE));
        }

        Ok(ColorCache { bits, colors: vec![[0; 4]; 1 << bits] })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Number of index bits.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Where the pixel would be stored.
    #[inline]
    pub fn index_of(&self, pixel: Rgba) -> usize {
        hash(argb(pixel), self.bits)
    }

    /// Store the pixel at its hash position.
    #[inline]
    pub fn insert(&mut self, pixel: Rgba) {
        let index = self.index_of(pixel);
        self.colors[index] = pixel;
    }

    /// Return the index of the pixel if it is currently cached.
    #[inline]
    pub fn find(&self, pixel: Rgba) -> Option<usize> {
        let index = self.index_of(pixel);
        if self.colors[index] == pixel { Some(index) } else { None }
    }

    /// Read an entry, failing for indices outside of the cache.
    #[inline]
    pub fn lookup(&self, index: usize) -> Result<Rgba> {
        self.colors.get(index).copied().ok_or_else(|| Error::invalid(INVALID_COLOR_CACHE))
    }
}
