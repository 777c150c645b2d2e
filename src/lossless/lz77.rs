
//! Backward references: the prefix coding of lengths and distances,
//! the mapping of short two-dimensional distances, and the encoder's match finder.

use crate::bits::BitReader;
use crate::error::Result;
use crate::image::Rgba;
use super::cache::{ColorCache, argb, hash};


/// Number of length prefix symbols in the green alphabet.
pub const LENGTH_SYMBOL_COUNT: usize = 24;

/// Size of the distance alphabet.
pub const DISTANCE_SYMBOL_COUNT: usize = 40;

/// The longest copy the encoder emits.
pub const MAX_MATCH_LENGTH: usize = 4096;

/// The shortest copy the encoder emits.
pub const MIN_MATCH_LENGTH: usize = 3;

/// Distance codes up to this value address the neighbourhood table.
const NEIGHBOURHOOD_CODE_COUNT: usize = 120;

/// The largest distance the encoder references.
pub const MAX_DISTANCE: usize = (1 << 20) - NEIGHBOURHOOD_CODE_COUNT;

const HASH_BITS: u32 = 14;
const MAX_CHAIN_PROBES: usize = 8;


/// Each entry encodes a vertical offset in the high nibble and `8 - horizontal offset` in the low nibble.
const NEIGHBOURHOOD: [u8; NEIGHBOURHOOD_CODE_COUNT] = [
    0x18, 0x07, 0x17, 0x19, 0x28, 0x06, 0x27, 0x29, 0x16, 0x1a,
    0x26, 0x2a, 0x38, 0x05, 0x37, 0x39, 0x15, 0x1b, 0x36, 0x3a,
    0x25, 0x2b, 0x48, 0x04, 0x47, 0x49, 0x14, 0x1c, 0x35, 0x3b,
    0x46, 0x4a, 0x24, 0x2c, 0x58, 0x45, 0x4b, 0x34, 0x3c, 0x03,
    0x57, 0x59, 0x13, 0x1d, 0x56, 0x5a, 0x23, 0x2d, 0x44, 0x4c,
    0x55, 0x5b, 0x33, 0x3d, 0x68, 0x02, 0x67, 0x69, 0x12, 0x1e,
    0x66, 0x6a, 0x22, 0x2e, 0x54, 0x5c, 0x43, 0x4d, 0x65, 0x6b,
    0x32, 0x3e, 0x78, 0x01, 0x77, 0x79, 0x53, 0x5d, 0x11, 0x1f,
    0x64, 0x6c, 0x42, 0x4e, 0x76, 0x7a, 0x21, 0x2f, 0x75, 0x7b,
    0x31, 0x3f, 0x63, 0x6d, 0x52, 0x5e, 0x00, 0x74, 0x7c, 0x41,
    0x4f, 0x10, 0x20, 0x62, 0x6e, 0x30, 0x73, 0x7d, 0x51, 0x5f,
    0x40, 0x72, 0x7e, 0x61, 0x6f, 0x50, 0x71, 0x7f, 0x60, 0x70,
];

/// Inverse of `NEIGHBOURHOOD`, indexed by `row * 16 + 8 - column`. Unreachable slots hold 255.
const NEIGHBOURHOOD_CODES: [u8; 128] = [
     96,  73,  55,  39,  23,  13,   5,   1, 255, 255, 255, 255, 255, 255, 255, 255,
    101,  78,  58,  42,  26,  16,   8,   2,   0,   3,   9,  17,  27,  43,  59,  79,
    102,  86,  62,  46,  32,  20,  10,   6,   4,   7,  11,  21,  33,  47,  63,  87,
    105,  90,  70,  52,  37,  28,  18,  14,  12,  15,  19,  29,  38,  53,  71,  91,
    110,  99,  82,  66,  48,  35,  30,  24,  22,  25,  31,  36,  49,  67,  83, 100,
    115, 108,  94,  76,  64,  50,  44,  40,  34,  41,  45,  51,  65,  77,  95, 109,
    118, 113, 103,  92,  80,  68,  60,  56,  54,  57,  61,  69,  81,  93, 104, 114,
    119, 116, 111, 106,  97,  88,  84,  74,  72,  75,  85,  89,  98, 107, 112, 117,
];


/// Read the extra bits of a length or distance prefix symbol and return the value, starting at one.
#[inline]
pub fn read_prefix_value(reader: &mut BitReader<'_>, symbol: u32) -> Result<usize> {
    if symbol < 4 {
        return Ok(symbol as usize + 1);
    }

    let extra_bits = (symbol - 2) >> 1;
    let offset = (2 + (symbol as usize & 1)) << extra_bits;
    Ok(offset + reader.read(extra_bits)? as usize + 1)
}

/// A value split into its prefix symbol and extra bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix {

    /// The prefix symbol.
    pub symbol: u16,

    /// Number of extra bits following the symbol.
    pub extra_bit_count: u32,

    /// Value of the extra bits.
    pub extra_bits: u32,
}

impl Prefix {

    /// Split a value of at least one.
    pub fn encode(value: usize) -> Self {
        debug_assert!(value >= 1, "prefix values start at one");

        if value <= 4 {
            return Prefix { symbol: (value - 1) as u16, extra_bit_count: 0, extra_bits: 0 };
        }

        let mut shift = 0;
        let mut remaining = value - 1;
        while remaining > 3 {
            remaining >>= 1;
            shift += 1;
        }

        let symbol = 2 * shift + remaining;
        let extra_bits = value - (remaining << shift) - 1;
        Prefix { symbol: symbol as u16, extra_bit_count: shift as u32, extra_bits: extra_bits as u32 }
    }
}

/// Translate a distance code into a pixel distance for an image of the given width.
#[inline]
pub fn code_to_distance(width: usize, code: usize) -> usize {
    if code > NEIGHBOURHOOD_CODE_COUNT {
        return code - NEIGHBOURHOOD_CODE_COUNT;
    }

    let entry = NEIGHBOURHOOD[code.saturating_sub(1).min(NEIGHBOURHOOD_CODE_COUNT - 1)] as isize;
    let row = entry >> 4;
    let column = 8 - (entry & 0xF);

    (row * width as isize + column).max(1) as usize
}

/// Translate a pixel distance into the shortest distance code for an image of the given width.
#[inline]
pub fn distance_to_code(width: usize, distance: usize) -> usize {
    let row = distance / width;
    let column = distance - row * width;

    if column <= 8 && row < 8 {
        usize::from(NEIGHBOURHOOD_CODES[row * 16 + 8 - column]) + 1
    }
    else if column + 8 > width && row < 7 {
        usize::from(NEIGHBOURHOOD_CODES[(row + 1) * 16 + 8 + (width - column)]) + 1
    }
    else {
        distance + NEIGHBOURHOOD_CODE_COUNT
    }
}


/// A token of the entropy-coded pixel stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {

    /// A pixel stored verbatim.
    Literal(Rgba),

    /// A pixel taken from the color cache.
    CacheIndex(u16),

    /// Copy `length` pixels from the given distance code.
    Copy { length: usize, distance_code: usize },
}

fn window_hash(pixels: &[Rgba], index: usize) -> usize {
    let mut value = hash(argb(pixels[index]), HASH_BITS) as u32;
    value ^= (hash(argb(pixels[index + 1]), HASH_BITS) as u32).wrapping_mul(0x9E37_79B9);
    value ^= (hash(argb(pixels[index + 2]), HASH_BITS) as u32).wrapping_mul(0x85EB_CA6B);
    value as usize & ((1 << HASH_BITS) - 1)
}

/// Hash chains over windows of three pixels.
struct MatchFinder {
    head: Vec<Option<usize>>,
    previous: Vec<Option<usize>>,
}

impl MatchFinder {
    fn new(pixel_count: usize) -> Self {
        MatchFinder { head: vec![None; 1 << HASH_BITS], previous: vec![None; pixel_count] }
    }

    fn insert(&mut self, pixels: &[Rgba], index: usize) {
        if index + 2 < pixels.len() {
            let hash = window_hash(pixels, index);
            self.previous[index] = self.head[hash];
            self.head[hash] = Some(index);
        }
    }

    /// The longest earlier match, preferring the most recent among equals.
    fn longest_match(&self, pixels: &[Rgba], index: usize) -> Option<(usize, usize)> {
        if index + 2 >= pixels.len() { return None; }

        let max_length = MAX_MATCH_LENGTH.min(pixels.len() - index);
        let mut candidate = self.head[window_hash(pixels, index)];
        let mut best: Option<(usize, usize)> = None;

        for _ in 0 .. MAX_CHAIN_PROBES {
            let start = match candidate { Some(start) => start, None => break };
            let distance = index - start;
            if distance > MAX_DISTANCE { break; }

            let length = pixels[start ..].iter().zip(&pixels[index .. index + max_length])
                .take_while(|(a, b)| a == b)
                .count();

            if length > best.map_or(0, |(length, _)| length) {
                best = Some((length, distance));
                if length == max_length { break; }
            }

            candidate = self.previous[start];
        }

        best.filter(|&(length, _)| length >= MIN_MATCH_LENGTH)
    }
}

/// Convert pixels into literals, cache references and backward copies.
/// Every emitted pixel passes through the cache in raster order, as the decoder expects.
pub fn tokenize(pixels: &[Rgba], width: usize, mut cache: Option<ColorCache>) -> Vec<Symbol> {
    let mut finder = MatchFinder::new(pixels.len());
    let mut symbols = Vec::with_capacity(pixels.len());
    let mut index = 0;

    while index < pixels.len() {
        if let Some((length, distance)) = finder.longest_match(pixels, index) {
            symbols.push(Symbol::Copy { length, distance_code: distance_to_code(width, distance) });

            for copied in index .. index + length {
                finder.insert(pixels, copied);
                if let Some(cache) = cache.as_mut() { cache.insert(pixels[copied]); }
            }

            index += length;
            continue;
        }

        let pixel = pixels[index];
        let symbol = match cache.as_mut() {
            Some(cache) => match cache.find(pixel) {
                Some(cache_index) => Symbol::CacheIndex(cache_index as u16),
                None => {
                    cache.insert(pixel);
                    Symbol::Literal(pixel)
                }
            },

            None => Symbol::Literal(pixel),
        };

        symbols.push(symbol);
        finder.insert(pixels, index);
        index += 1;
    }

    symbols
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::bits::BitWriter;

    #[test]
    fn prefix_values_round_trip(){
        for value in (1 .. 5000).chain(vec![MAX_DISTANCE + NEIGHBOURHOOD_CODE_COUNT, 1 << 19]) {
            let prefix = Prefix::encode(value);

            let mut writer = BitWriter::new();
            writer.write(prefix.extra_bits, prefix.extra_bit_count);
            let bytes = writer.into_bytes();

            let decoded = read_prefix_value(&mut BitReader::new(&bytes), u32::from(prefix.symbol)).unwrap();
            assert_eq!(decoded, value);
        }

        assert_eq!(Prefix::encode(MAX_MATCH_LENGTH).symbol as usize, LENGTH_SYMBOL_COUNT - 1);
        assert!((Prefix::encode(MAX_DISTANCE + NEIGHBOURHOOD_CODE_COUNT).symbol as usize) < DISTANCE_SYMBOL_COUNT);
    }

    #[test]
    fn neighbourhood_tables_are_inverse(){
        for &width in &[1_usize, 2, 3, 7, 8, 9, 16, 100, 5000] {
            for distance in 1 .. 2000 {
                let code = distance_to_code(width, distance);
                assert_eq!(code_to_distance(width, code), distance, "width {} distance {}", width, distance);
            }
        }
    }

    #[test]
    fn short_distances_use_short_codes(){
        assert_eq!(distance_to_code(100, 100), 1);
        assert_eq!(distance_to_code(100, 1), 2);
        assert_eq!(code_to_distance(100, 1), 100);
        assert_eq!(code_to_distance(100, 200), 80);
    }

    fn expand(symbols: &[Symbol], width: usize, cache_bits: u32) -> Vec<Rgba> {
        let mut cache = ColorCache::new(cache_bits).ok();
        let mut pixels = Vec::new();

        for symbol in symbols {
            match *symbol {
                Symbol::Literal(pixel) => pixels.push(pixel),
                Symbol::CacheIndex(index) => pixels.push(cache.as_ref().unwrap().lookup(index as usize).unwrap()),
                Symbol::Copy { length, distance_code } => {
                    let distance = code_to_distance(width, distance_code);
                    for _ in 0 .. length { pixels.push(pixels[pixels.len() - distance]); }
                    if let Some(cache) = cache.as_mut() {
                        for &pixel in &pixels[pixels.len() - length ..] { cache.insert(pixel); }
                    }
                    continue;
                },
            }

            if let Some(cache) = cache.as_mut() { cache.insert(*pixels.last().unwrap()); }
        }

        pixels
    }

    #[test]
    fn tokens_reproduce_pixels(){
        let width = 17;
        let pixels: Vec<Rgba> = (0 .. width * 23).map(|index| {
            let value = ((index % 5) * 40 + (index / 50) % 3) as u8;
            [value, value / 2, 255 - value, 255]
        }).collect();

        for &cache_bits in &[0_u32, 1, 4, 11] {
            let symbols = tokenize(&pixels, width, ColorCache::new(cache_bits).ok());
            assert!(symbols.len() < pixels.len() / 2);
            assert!(symbols.iter().any(|symbol| matches!(symbol, Symbol::Copy { .. })));
            assert_eq!(expand(&symbols, width, cache_bits), pixels);
        }
    }

    #[test]
    fn overlapping_copy_of_a_run(){
        let pixels = vec![[7, 7, 7, 7]; 5000];
        let symbols = tokenize(&pixels, 5000, None);
        assert_eq!(symbols[0], Symbol::Literal([7, 7, 7, 7]));
        assert_eq!(expand(&symbols, 5000, 0), pixels);
    }
}
