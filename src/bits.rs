
//! Least-significant-bit-first bit streams, as used by the lossless bitstream.

use crate::error::{Error, Result, UNEXPECTED_END_OF_STREAM};


/// Reads variable-width integers from a byte slice, starting at the lowest bit of each byte.
/// The accumulator always holds the unconsumed bits right-aligned.
#[derive(Debug, Clone)]
pub struct BitReader<'b> {
    bytes: &'b [u8],
    position: usize,
    buffer: u64,
    count: u32,
}

impl<'b> BitReader<'b> {

    /// Start reading at the first bit of the slice.
    pub fn new(bytes: &'b [u8]) -> Self {
        BitReader { bytes, position: 0, buffer: 0, count: 0 }
    }

    /// Move whole bytes into the accumulator while they fit.
    #[inline]
    fn refill(&mut self) {
        while self.count <= 56 {
            match self.bytes.get(self.position) {
                Some(&byte) => {
                    self.buffer |= u64::from(byte) << self.count;
                    self.position += 1;
                    self.count += 8;
                },

                None => break,
            }
        }
    }

    /// Read `bit_count` bits, where `bit_count` is at most 32.
    /// Reading zero bits always succeeds and yields zero.
    #[inline]
    pub fn read(&mut self, bit_count: u32) -> Result<u32> {
        debug_assert!(bit_count <= 32, "bit count too large");
        if bit_count == 0 { return Ok(0); }

        if self.count < bit_count {
            self.refill();

            if self.count < bit_count {
                return Err(Error::invalid(UNEXPECTED_END_OF_STREAM));
            }
        }

        let value = (self.buffer & ((1_u64 << bit_count) - 1)) as u32;
        self.buffer >>= bit_count;
        self.count -= bit_count;
        Ok(value)
    }

    /// Read a single bit as a flag.
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read(1)? == 1)
    }

    /// Look at the next bits without consuming them.
    /// Returns the bits and how many of them are actually backed by the source.
    #[inline]
    pub fn peek(&mut self) -> (u64, u32) {
        if self.count < 32 { self.refill(); }
        (self.buffer, self.count)
    }

    /// Consume bits that were previously inspected with `peek`.
    #[inline]
    pub fn consume(&mut self, bit_count: u32) -> Result<()> {
        if bit_count > self.count {
            return Err(Error::invalid(UNEXPECTED_END_OF_STREAM));
        }

        self.buffer = if bit_count == 64 { 0 } else { self.buffer >> bit_count };
        self.count -= bit_count;
        Ok(())
    }
}


/// Writes variable-width integers, filling each byte starting at its lowest bit.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    buffer: u64,
    count: u32,
}

impl BitWriter {

    /// An empty bit stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the lowest `bit_count` bits of the value, where `bit_count` is at most 32.
    #[inline]
    pub fn write(&mut self, value: u32, bit_count: u32) {
        debug_assert!(bit_count <= 32, "bit count too large");
        debug_assert!(bit_count == 32 || value >> bit_count == 0, "value exceeds bit count");
        if bit_count == 0 { return; }

        self.buffer |= u64::from(value) << self.count;
        self.count += bit_count;

        while self.count >= 8 {
            self.bytes.push(self.buffer as u8);
            self.buffer >>= 8;
            self.count -= 8;
        }
    }

    /// Append a single flag bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        self.write(bit as u32, 1)
    }

    /// Append whole bytes, aligning to the next byte first.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.align_to_byte();
        self.bytes.extend_from_slice(bytes);
    }

    /// Pad the current byte with zero bits.
    pub fn align_to_byte(&mut self) {
        if self.count > 0 {
            self.bytes.push(self.buffer as u8);
            self.buffer = 0;
            self.count = 0;
        }
    }

    /// Number of bits written so far.
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8 + self.count as usize
    }

    /// Pad the last byte and return all bytes.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.bytes
    }
}
