
//! The binary range coder that carries every header field, mode and token of the lossy bitstream.
//! Each decision is coded against an explicit probability, in 1/256 units, that the bit is zero.

use crate::error::{Error, Result, UNEXPECTED_END_OF_STREAM};


/// The probability of a bit that is equally likely zero or one.
pub const EVEN: u8 = 128;

/// Shift count to renormalize a range that dropped below 127.
#[rustfmt::skip]
const NORMALIZE_SHIFT: [u8; 127] = [
      7,   6,   6,   5,   5,   5,   5,   4,   4,   4,   4,   4,   4,   4,   4,   3,
      3,   3,   3,   3,   3,   3,   3,   3,   3,   3,   3,   3,   3,   3,   3,   2,
      2,   2,   2,   2,   2,   2,   2,   2,   2,   2,   2,   2,   2,   2,   2,   2,
      2,   2,   2,   2,   2,   2,   2,   2,   2,   2,   2,   2,   2,   2,   2,   1,
      1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,
      1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,
      1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,
      1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,   1,
];

/// The range minus one after renormalizing a range that dropped below 127.
#[rustfmt::skip]
const NORMALIZED_RANGE: [u8; 127] = [
    127, 127, 191, 127, 159, 191, 223, 127, 143, 159, 175, 191, 207, 223, 239, 127,
    135, 143, 151, 159, 167, 175, 183, 191, 199, 207, 215, 223, 231, 239, 247, 127,
    131, 135, 139, 143, 147, 151, 155, 159, 163, 167, 171, 175, 179, 183, 187, 191,
    195, 199, 203, 207, 211, 215, 219, 223, 227, 231, 235, 239, 243, 247, 251, 127,
    129, 131, 133, 135, 137, 139, 141, 143, 145, 147, 149, 151, 153, 155, 157, 159,
    161, 163, 165, 167, 169, 171, 173, 175, 177, 179, 181, 183, 185, 187, 189, 191,
    193, 195, 197, 199, 201, 203, 205, 207, 209, 211, 213, 215, 217, 219, 221, 223,
    225, 227, 229, 231, 233, 235, 237, 239, 241, 243, 245, 247, 249, 251, 253,
];


/// Reads decisions from one partition.
///
/// Running out of bytes does not fail immediately, as a single token may need
/// many decisions. Instead the decoder returns zeros from then on and remembers
/// the fact, which the caller checks with `finish` once a unit of data is parsed.
#[derive(Debug, Clone)]
pub struct BoolDecoder<'b> {
    bytes: &'b [u8],
    range_minus_one: u32,

    /// The current byte occupies the bits 8 to 15, pending bits follow below.
    value: u32,
    bit_count: u32,
    exhausted: bool,
}

impl<'b> BoolDecoder<'b> {

    /// Start decoding at the first byte of a partition.
    pub fn new(bytes: &'b [u8]) -> Self {
        BoolDecoder { bytes, range_minus_one: 254, value: 0, bit_count: 0, exhausted: false }
    }

    /// Decode one decision, where `probability / 256` is the chance of `false`.
    pub fn read_bit(&mut self, probability: u8) -> bool {
        if self.bit_count < 8 {
            match self.bytes.split_first() {
                Some((&byte, rest)) => {
                    self.value |= u32::from(byte) << (8 - self.bit_count);
                    self.bytes = rest;
                    self.bit_count += 8;
                },

                None => {
                    self.exhausted = true;
                    return false;
                }
            }
        }

        let split = ((self.range_minus_one * u32::from(probability)) >> 8) + 1;

        let bit = if self.value >= split << 8 {
            self.range_minus_one -= split;
            self.value -= split << 8;
            true
        }
        else {
            self.range_minus_one = split - 1;
            false
        };

        if self.range_minus_one < 127 {
            let index = self.range_minus_one as usize;
            let shift = u32::from(NORMALIZE_SHIFT[index]);
            self.range_minus_one = u32::from(NORMALIZED_RANGE[index]);
            self.value <<= shift;
            self.bit_count -= shift;
        }

        bit
    }

    /// Decode an evenly distributed flag.
    #[inline]
    pub fn read_flag(&mut self) -> bool {
        self.read_bit(EVEN)
    }

    /// Decode an unsigned integer of `bits` evenly distributed bits, most significant first.
    pub fn read_literal(&mut self, bits: u32) -> u32 {
        (0 .. bits).fold(0, |value, _| value << 1 | u32::from(self.read_flag()))
    }

    /// Decode a magnitude of `bits` bits followed by a sign flag.
    pub fn read_signed(&mut self, bits: u32) -> i32 {
        let magnitude = self.read_literal(bits) as i32;
        if self.read_flag() { -magnitude } else { magnitude }
    }

    /// Decode a flag, and if set, a signed value. Absent values are zero.
    pub fn read_optional_signed(&mut self, bits: u32) -> i32 {
        if self.read_flag() { self.read_signed(bits) } else { 0 }
    }

    /// Whether a decision was requested after the last byte.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Returns an error if the partition was too short for the data read from it.
    pub fn finish(&self) -> Result<()> {
        if self.exhausted { Err(Error::invalid(UNEXPECTED_END_OF_STREAM)) }
        else { Ok(()) }
    }
}


/// Writes decisions that a `BoolDecoder` reads back.
#[derive(Debug, Clone)]
pub struct BoolEncoder {
    bytes: Vec<u8>,
    range: u32,

    /// The lowest value of the interval, with pending carries in its upper bits.
    bottom: u32,

    /// Shifts remaining until the next byte of `bottom` is complete.
    bit_count: u32,
}

impl Default for BoolEncoder {
    fn default() -> Self { Self::new() }
}

impl BoolEncoder {

    /// An encoder with an empty output.
    pub fn new() -> Self {
        BoolEncoder { bytes: Vec::new(), range: 255, bottom: 0, bit_count: 24 }
    }

    /// Encode one decision, where `probability / 256` is the chance of `false`.
    pub fn write_bit(&mut self, probability: u8, bit: bool) {
        let split = 1 + (((self.range - 1) * u32::from(probability)) >> 8);

        if bit {
            self.bottom = self.bottom.wrapping_add(split);
            self.range -= split;
        }
        else {
            self.range = split;
        }

        while self.range < 128 {
            self.range <<= 1;

            if self.bottom & (1 << 31) != 0 {
                self.propagate_carry();
            }

            self.bottom <<= 1;
            self.bit_count -= 1;

            if self.bit_count == 0 {
                self.bytes.push((self.bottom >> 24) as u8);
                self.bottom &= (1 << 24) - 1;
                self.bit_count = 8;
            }
        }
    }

    /// Add one to the bytes written so far.
    fn propagate_carry(&mut self) {
        for byte in self.bytes.iter_mut().rev() {
            if *byte == 255 { *byte = 0; }
            else {
                *byte += 1;
                return;
            }
        }
    }

    /// Encode an evenly distributed flag.
    #[inline]
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bit(EVEN, flag)
    }

    /// Encode the lowest `bits` bits of the value, most significant first.
    pub fn write_literal(&mut self, bits: u32, value: u32) {
        debug_assert!(bits == 32 || value >> bits == 0, "literal does not fit");

        for index in (0 .. bits).rev() {
            self.write_flag(value >> index & 1 != 0);
        }
    }

    /// Encode a magnitude of `bits` bits followed by a sign flag.
    pub fn write_signed(&mut self, bits: u32, value: i32) {
        self.write_literal(bits, value.unsigned_abs());
        self.write_flag(value < 0);
    }

    /// Encode a presence flag, and a signed value if it is not zero.
    pub fn write_optional_signed(&mut self, bits: u32, value: i32) {
        self.write_flag(value != 0);
        if value != 0 { self.write_signed(bits, value); }
    }

    /// Flush the pending bits of the interval and return the partition bytes.
    pub fn finish(mut self) -> Vec<u8> {
        let mut bit_count = self.bit_count;
        let mut value = self.bottom;

        if value & (1 << (32 - bit_count)) != 0 {
            self.propagate_carry();
        }

        value <<= bit_count & 7;
        bit_count >>= 3;

        for _ in 0 .. bit_count {
            value <<= 8;
        }

        for _ in 0 .. 4 {
            self.bytes.push((value >> 24) as u8);
            value <<= 8;
        }

        self.bytes
    }
}
