
//! Canonical prefix codes of the lossless bitstream.
//! Decoding builds a binary trie with a small lookup table for short codes,
//! encoding builds length-limited codes from a histogram and serializes them.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use crate::bits::{BitReader, BitWriter};
use crate::error::{Error, Result, INVALID_CODE_LENGTHS, INVALID_HUFFMAN_TREE, UNEXPECTED_END_OF_STREAM};


/// Longest code of the pixel alphabets.
pub const MAX_CODE_LENGTH: u8 = 15;

/// Longest code of the code length alphabet.
pub const MAX_CODE_LENGTH_CODE_LENGTH: u8 = 7;

/// Size of the alphabet that describes code lengths.
pub const CODE_LENGTH_ALPHABET_SIZE: usize = 19;

/// The order in which the code lengths of the code length alphabet are stored.
pub const CODE_LENGTH_ORDER: [usize; CODE_LENGTH_ALPHABET_SIZE] = [
    17, 18, 0, 1, 2, 3, 4, 5, 16, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15
];

const REPEAT_PREVIOUS: u8 = 16;
const REPEAT_ZERO_SHORT: u8 = 17;
const REPEAT_ZERO_LONG: u8 = 18;

/// Extra bits and offset of the three repetition codes.
const REPEAT_EXTRA_BITS: [u32; 3] = [2, 3, 7];
const REPEAT_OFFSETS: [usize; 3] = [3, 3, 11];

/// Code lengths are capped at 15 bits, so the code of length 8 is the initial repetition value.
const INITIAL_REPEATED_LENGTH: u8 = 8;

const LOOKUP_BITS: u32 = 7;
const LOOKUP_SIZE: usize = 1 << LOOKUP_BITS;


/// Assign canonical codes: shorter codes first, ties ordered by symbol.
/// Codes are returned most significant bit first. Unused symbols get code zero.
fn canonical_codes(lengths: &[u8]) -> Vec<u32> {
    let mut counts = [0_u32; MAX_CODE_LENGTH as usize + 1];
    for &length in lengths {
        if length > 0 { counts[length as usize] += 1; }
    }

    let mut next_code = [0_u32; MAX_CODE_LENGTH as usize + 1];
    let mut code = 0;
    for length in 1 ..= MAX_CODE_LENGTH as usize {
        code = (code + counts[length - 1]) << 1;
        next_code[length] = code;
    }

    lengths.iter().map(|&length| {
        if length == 0 { 0 }
        else {
            let code = next_code[length as usize];
            next_code[length as usize] += 1;
            code
        }
    }).collect()
}

/// Whether the lengths describe a complete prefix code.
fn is_complete(lengths: &[u8]) -> bool {
    let capacity = 1_u32 << MAX_CODE_LENGTH;
    let used: u32 = lengths.iter()
        .filter(|&&length| length > 0)
        .map(|&length| capacity >> length)
        .sum();

    used == capacity
}

#[inline]
fn reverse_bits(code: u32, length: u8) -> u32 {
    if length == 0 { 0 } else { code.reverse_bits() >> (32 - u32::from(length)) }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Child {
    Empty,
    Leaf(u16),
    Node(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lookup {
    Invalid,
    Leaf { symbol: u16, length: u8 },
    Node(u32),
}

/// A prefix code ready for decoding symbols.
#[derive(Clone, Debug)]
pub struct HuffmanTree {
    single_symbol: Option<u16>,
    nodes: Vec<[Child; 2]>,
    lookup: Vec<Lookup>,
}

impl HuffmanTree {

    /// Build the trie for the given code lengths, indexed by symbol.
    /// A single used symbol is decoded without consuming any bits.
    pub fn from_lengths(lengths: &[u8]) -> Result<Self> {
        let mut used = lengths.iter().enumerate().filter(|(_, &length)| length > 0);

        let first = match used.next() {
            Some((symbol, _)) => symbol,
            None => return Err(Error::invalid(INVALID_HUFFMAN_TREE)),
        };

        if used.next().is_none() {
            return Ok(HuffmanTree { single_symbol: Some(first as u16), nodes: Vec::new(), lookup: Vec::new() });
        }

        if lengths.iter().any(|&length| length > MAX_CODE_LENGTH) || !is_complete(lengths) {
            return Err(Error::invalid(INVALID_HUFFMAN_TREE));
        }

        let codes = canonical_codes(lengths);
        let mut nodes = vec![ [Child::Empty; 2] ];

        for (symbol, (&length, &code)) in lengths.iter().zip(&codes).enumerate() {
            if length == 0 { continue; }

            let mut node = 0_usize;
            for depth in (0 .. length).rev() {
                let bit = ((code >> depth) & 1) as usize;
                let is_last = depth == 0;

                let child = nodes[node][bit];
                node = match child {
                    Child::Empty if is_last => {
                        nodes[node][bit] = Child::Leaf(symbol as u16);
                        break;
                    },

                    Child::Empty => {
                        nodes.push([Child::Empty; 2]);
                        let next = nodes.len() - 1;
                        nodes[node][bit] = Child::Node(next as u32);
                        next
                    },

                    Child::Node(next) if !is_last => next as usize,
                    _ => return Err(Error::invalid(INVALID_HUFFMAN_TREE)),
                };
            }
        }

        let lookup = (0 .. LOOKUP_SIZE).map(|bits| {
            let mut node = 0_usize;

            for depth in 0 .. LOOKUP_BITS {
                match nodes[node][(bits >> depth) & 1] {
                    Child::Empty => return Lookup::Invalid,
                    Child::Leaf(symbol) => return Lookup::Leaf { symbol, length: depth as u8 + 1 },
                    Child::Node(next) => node = next as usize,
                }
            }

            Lookup::Node(node as u32)
        }).collect();

        Ok(HuffmanTree { single_symbol: None, nodes, lookup })
    }

    /// Decode the next symbol.
    #[inline]
    pub fn read_symbol(&self, reader: &mut BitReader<'_>) -> Result<u16> {
        if let Some(symbol) = self.single_symbol {
            return Ok(symbol);
        }

        let (bits, available) = reader.peek();

        match self.lookup[(bits as usize) & (LOOKUP_SIZE - 1)] {
            Lookup::Leaf { symbol, length } => {
                reader.consume(u32::from(length))?;
                Ok(symbol)
            },

            Lookup::Node(mut node) => {
                for depth in LOOKUP_BITS .. u32::from(MAX_CODE_LENGTH) {
                    if depth >= available {
                        return Err(Error::invalid(UNEXPECTED_END_OF_STREAM));
                    }

                    match self.nodes[node as usize][((bits >> depth) & 1) as usize] {
                        Child::Leaf(symbol) => {
                            reader.consume(depth + 1)?;
                            return Ok(symbol);
                        },

                        Child::Node(next) => node = next,
                        Child::Empty => break,
                    }
                }

                Err(Error::invalid(INVALID_HUFFMAN_TREE))
            },

            Lookup::Invalid => Err(Error::invalid(INVALID_HUFFMAN_TREE)),
        }
    }

    /// Read a serialized code for an alphabet of the given size, in either the simple or the full form.
    pub fn read(reader: &mut BitReader<'_>, alphabet_size: usize) -> Result<Self> {
        let mut lengths = vec![0_u8; alphabet_size];

        let is_simple = reader.read_bit()?;
        if is_simple {
            let symbol_count = reader.read(1)? + 1;
            let first_symbol_bits = if reader.read_bit()? { 8 } else { 1 };

            let first = reader.read(first_symbol_bits)? as usize;
            *lengths.get_mut(first).ok_or_else(|| Error::invalid(INVALID_HUFFMAN_TREE))? = 1;

            if symbol_count == 2 {
                let second = reader.read(8)? as usize;
                *lengths.get_mut(second).ok_or_else(|| Error::invalid(INVALID_HUFFMAN_TREE))? = 1;
            }
        }
        else {
            let mut code_length_lengths = [0_u8; CODE_LENGTH_ALPHABET_SIZE];
            let code_count = reader.read(4)? as usize + 4;

            for &symbol in &CODE_LENGTH_ORDER[.. code_count] {
                code_length_lengths[symbol] = reader.read(3)? as u8;
            }

            let code_length_tree = HuffmanTree::from_lengths(&code_length_lengths)?;
            read_code_lengths(reader, &code_length_tree, &mut lengths)?;
        }

        HuffmanTree::from_lengths(&lengths)
    }
}

/// Decode the lengths of the target alphabet, expanding the repetition codes.
fn read_code_lengths(reader: &mut BitReader<'_>, code_length_tree: &HuffmanTree, lengths: &mut [u8]) -> Result<()> {
    let alphabet_size = lengths.len();

    let mut max_symbol = if reader.read_bit()? {
        let bit_count = 2 + 2 * reader.read(3)?;
        let max_symbol = reader.read(bit_count)? as usize + 2;

        if max_symbol > alphabet_size {
            return Err(Error::invalid(INVALID_CODE_LENGTHS));
        }

        max_symbol
    }
    else {
        alphabet_size
    };

    let mut previous = INITIAL_REPEATED_LENGTH;
    let mut symbol = 0;

    while symbol < alphabet_size && max_symbol > 0 {
        max_symbol -= 1;
        let code = code_length_tree.read_symbol(reader)? as u8;

        if code < REPEAT_PREVIOUS {
            lengths[symbol] = code;
            symbol += 1;
            if code != 0 { previous = code; }
        }
        else {
            let index = (code - REPEAT_PREVIOUS) as usize;
            let repeat = reader.read(REPEAT_EXTRA_BITS[index])? as usize + REPEAT_OFFSETS[index];

            if symbol + repeat > alphabet_size {
                return Err(Error::invalid(INVALID_CODE_LENGTHS));
            }

            let value = if code == REPEAT_PREVIOUS { previous } else { 0 };
            for length in &mut lengths[symbol .. symbol + repeat] { *length = value; }
            symbol += repeat;
        }
    }

    Ok(())
}


/// A single canonical code, most significant bit first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HuffmanCode {

    /// The code bits.
    pub code: u16,

    /// Number of bits, or zero for unused symbols.
    pub length: u8,
}

/// Codes for a complete alphabet, built from symbol frequencies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HuffmanCodes {
    codes: Vec<HuffmanCode>,
    used_symbols: usize,
}

#[derive(Eq, PartialEq)]
struct HeapFrequency {
    position: usize,
    frequency: u64,
}

impl Ord for HeapFrequency {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .frequency
            .cmp(&self.frequency)
            .then_with(|| other.position.cmp(&self.position))
    }
}

impl PartialOrd for HeapFrequency {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compute the depth of every used symbol by repeatedly merging the two lightest subtrees.
/// Weights below the floor are raised to it, which bounds the depth of rare symbols.
fn tree_depths(histogram: &[u32], floor: u64) -> Vec<u8> {
    let mut heap = BinaryHeap::new();
    let mut parents: Vec<usize> = Vec::with_capacity(histogram.len() * 2);

    for (symbol, &count) in histogram.iter().enumerate() {
        parents.push(usize::MAX);

        if count > 0 {
            heap.push(HeapFrequency { position: symbol, frequency: u64::from(count).max(floor) });
        }
    }

    while heap.len() > 1 {
        let (lightest, second) = match (heap.pop(), heap.pop()) {
            (Some(lightest), Some(second)) => (lightest, second),
            _ => break,
        };

        let parent = parents.len();
        parents.push(usize::MAX);
        parents[lightest.position] = parent;
        parents[second.position] = parent;

        heap.push(HeapFrequency { position: parent, frequency: lightest.frequency + second.frequency });
    }

    histogram.iter().enumerate().map(|(symbol, &count)| {
        if count == 0 { return 0; }

        let mut depth = 0_u8;
        let mut node = symbol;
        while parents[node] != usize::MAX {
            node = parents[node];
            depth = depth.saturating_add(1);
        }

        depth
    }).collect()
}

impl HuffmanCodes {

    /// Build length-limited canonical codes. Symbols with zero frequency receive no code.
    /// A lone used symbol is declared with length one but is written with zero bits.
    pub fn from_histogram(histogram: &[u32], max_length: u8) -> Self {
        let used_symbols = histogram.iter().filter(|&&count| count > 0).count();

        let lengths = if used_symbols <= 1 {
            histogram.iter().map(|&count| if count > 0 { 1 } else { 0 }).collect()
        }
        else {
            let total: u64 = histogram.iter().map(|&count| u64::from(count)).sum();
            let mut floor = (total >> (max_length - 2)).max(1);

            loop {
                let depths = tree_depths(histogram, floor);
                if depths.iter().all(|&depth| depth <= max_length) { break depths; }
                floor *= 2;
            }
        };

        let codes = canonical_codes(&lengths).into_iter().zip(lengths)
            .map(|(code, length)| HuffmanCode { code: code as u16, length })
            .collect();

        HuffmanCodes { codes, used_symbols }
    }

    /// The code of each symbol.
    pub fn codes(&self) -> &[HuffmanCode] {
        &self.codes
    }

    /// The declared length of each symbol.
    pub fn lengths(&self) -> Vec<u8> {
        self.codes.iter().map(|code| code.length).collect()
    }

    /// Write the code of the symbol, least significant bit first as the reader expects.
    #[inline]
    pub fn write_symbol(&self, writer: &mut BitWriter, symbol: usize) {
        if self.used_symbols <= 1 { return; }

        let code = self.codes[symbol];
        debug_assert_ne!(code.length, 0, "symbol has no code");
        writer.write(reverse_bits(u32::from(code.code), code.length), u32::from(code.length));
    }

    /// Serialize the code lengths so that `HuffmanTree::read` reconstructs these codes.
    pub fn write(&self, writer: &mut BitWriter) {
        let used: Vec<usize> = self.codes.iter().enumerate()
            .filter(|(_, code)| code.length > 0)
            .map(|(symbol, _)| symbol)
            .collect();

        if used.is_empty() {
            writer.write(1, 1);
            writer.write(0, 3);
            return;
        }

        if used.len() <= 2 && used.iter().all(|&symbol| symbol < 256) {
            writer.write(1, 1);
            writer.write(used.len() as u32 - 1, 1);

            if used[0] <= 1 {
                writer.write(0, 1);
                writer.write(used[0] as u32, 1);
            }
            else {
                writer.write(1, 1);
                writer.write(used[0] as u32, 8);
            }

            if let Some(&second) = used.get(1) {
                writer.write(second as u32, 8);
            }

            return;
        }

        let tokens = length_tokens(&self.lengths());

        let mut token_histogram = [0_u32; CODE_LENGTH_ALPHABET_SIZE];
        for token in &tokens { token_histogram[token.symbol as usize] += 1; }
        let length_codes = HuffmanCodes::from_histogram(&token_histogram, MAX_CODE_LENGTH_CODE_LENGTH);

        let code_count = CODE_LENGTH_ORDER.iter()
            .rposition(|&symbol| length_codes.codes[symbol].length > 0)
            .map_or(0, |index| index + 1)
            .max(4);

        writer.write(0, 1);
        writer.write(code_count as u32 - 4, 4);

        for &symbol in &CODE_LENGTH_ORDER[.. code_count] {
            writer.write(u32::from(length_codes.codes[symbol].length), 3);
        }

        writer.write(0, 1); // code lengths span the whole alphabet

        for token in tokens {
            length_codes.write_symbol(writer, token.symbol as usize);

            if token.symbol >= REPEAT_PREVIOUS {
                let index = (token.symbol - REPEAT_PREVIOUS) as usize;
                writer.write(u32::from(token.extra_bits), REPEAT_EXTRA_BITS[index]);
            }
        }
    }
}

/// A symbol of the code length alphabet with the value of its extra bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LengthToken {
    symbol: u8,
    extra_bits: u8,
}

/// Compress code lengths with the repetition codes.
fn length_tokens(lengths: &[u8]) -> Vec<LengthToken> {
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < lengths.len() {
        let value = lengths[index];
        let run = lengths[index ..].iter().take_while(|&&length| length == value).count();
        index += run;

        let mut remaining = run;

        if value == 0 {
            while remaining > 0 {
                if remaining < 3 {
                    for _ in 0 .. remaining { tokens.push(LengthToken { symbol: 0, extra_bits: 0 }); }
                    remaining = 0;
                }
                else if remaining <= 10 {
                    tokens.push(LengthToken { symbol: REPEAT_ZERO_SHORT, extra_bits: (remaining - 3) as u8 });
                    remaining = 0;
                }
                else {
                    let count = remaining.min(138);
                    tokens.push(LengthToken { symbol: REPEAT_ZERO_LONG, extra_bits: (count - 11) as u8 });
                    remaining -= count;
                }
            }
        }
        else {
            tokens.push(LengthToken { symbol: value, extra_bits: 0 });
            remaining -= 1;

            while remaining > 0 {
                if remaining < 3 {
                    for _ in 0 .. remaining { tokens.push(LengthToken { symbol: value, extra_bits: 0 }); }
                    remaining = 0;
                }
                else {
                    let count = remaining.min(6);
                    tokens.push(LengthToken { symbol: REPEAT_PREVIOUS, extra_bits: (count - 3) as u8 });
                    remaining -= count;
                }
            }
        }
    }

    tokens
}


#[cfg(test)]
mod test {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    fn random_histogram(rng: &mut StdRng, size: usize) -> Vec<u32> {
        (0 .. size).map(|_| {
            if rng.random_bool(0.3) { 0 } else { rng.random_range(1 .. 10_000) }
        }).collect()
    }

    fn assert_canonical(codes: &HuffmanCodes, max_length: u8) {
        let lengths = codes.lengths();
        assert!(lengths.iter().all(|&length| length <= max_length));

        if codes.used_symbols > 1 {
            assert!(is_complete(&lengths), "kraft equality violated: {:?}", lengths);
        }

        let mut used: Vec<(u8, usize, u16)> = codes.codes().iter().enumerate()
            .filter(|(_, code)| code.length > 0)
            .map(|(symbol, code)| (code.length, symbol, code.code))
            .collect();

        used.sort();

        for pair in used.windows(2) {
            let (previous_length, _, previous_code) = pair[0];
            let (length, _, code) = pair[1];

            // the left-aligned codes must be strictly increasing in canonical order
            let left_aligned = |code: u16, length: u8| u32::from(code) << (16 - length);
            assert!(left_aligned(previous_code, previous_length) < left_aligned(code, length));
        }
    }

    fn round_trip(histogram: &[u32], max_length: u8) {
        let codes = HuffmanCodes::from_histogram(histogram, max_length);
        assert_canonical(&codes, max_length);

        let symbols: Vec<usize> = histogram.iter().enumerate()
            .filter(|(_, &count)| count > 0)
            .flat_map(|(symbol, &count)| std::iter::repeat(symbol).take(count.min(3) as usize))
            .collect();

        let mut writer = BitWriter::new();
        codes.write(&mut writer);
        for &symbol in &symbols { codes.write_symbol(&mut writer, symbol); }
        writer.write(0b1011, 4);

        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        let tree = HuffmanTree::read(&mut reader, histogram.len()).unwrap();

        for &symbol in &symbols {
            assert_eq!(tree.read_symbol(&mut reader).unwrap() as usize, symbol);
        }

        assert_eq!(reader.read(4).unwrap(), 0b1011);
    }

    #[test]
    fn kraft_and_canonical_order(){
        let mut rng = StdRng::seed_from_u64(23);

        for size in [2_usize, 19, 40, 256, 280, 2328].iter().copied() {
            for _ in 0 .. 10 {
                let histogram = random_histogram(&mut rng, size);
                let max_length = if size == 19 { MAX_CODE_LENGTH_CODE_LENGTH } else { MAX_CODE_LENGTH };
                assert_canonical(&HuffmanCodes::from_histogram(&histogram, max_length), max_length);
            }
        }
    }

    #[test]
    fn depth_is_limited(){
        // fibonacci weights produce the deepest possible unconstrained tree
        let mut histogram = vec![1_u32, 1];
        while histogram.len() < 30 {
            let next = histogram[histogram.len() - 1] + histogram[histogram.len() - 2];
            histogram.push(next);
        }

        let codes = HuffmanCodes::from_histogram(&histogram, MAX_CODE_LENGTH);
        assert_canonical(&codes, MAX_CODE_LENGTH);

        let small = HuffmanCodes::from_histogram(&histogram[.. 19], MAX_CODE_LENGTH_CODE_LENGTH);
        assert_canonical(&small, MAX_CODE_LENGTH_CODE_LENGTH);
    }

    #[test]
    fn serialized_codes_round_trip(){
        let mut rng = StdRng::seed_from_u64(7);

        for size in [40_usize, 256, 280, 2328].iter().copied() {
            for _ in 0 .. 5 {
                round_trip(&random_histogram(&mut rng, size), MAX_CODE_LENGTH);
            }
        }
    }

    #[test]
    fn simple_codes_round_trip(){
        let mut histogram = vec![0_u32; 256];
        round_trip(&histogram, MAX_CODE_LENGTH);

        histogram[1] = 5;
        round_trip(&histogram, MAX_CODE_LENGTH);

        histogram[200] = 3;
        round_trip(&histogram, MAX_CODE_LENGTH);

        let mut histogram = vec![0_u32; 256];
        histogram[77] = 9;
        round_trip(&histogram, MAX_CODE_LENGTH);
    }

    #[test]
    fn lone_large_symbol_uses_full_form(){
        let mut histogram = vec![0_u32; 280];
        histogram[270] = 12;
        round_trip(&histogram, MAX_CODE_LENGTH);

        let mut histogram = vec![0_u32; 280];
        histogram[3] = 1;
        histogram[279] = 1;
        round_trip(&histogram, MAX_CODE_LENGTH);
    }

    #[test]
    fn rejects_incomplete_and_oversubscribed(){
        assert!(HuffmanTree::from_lengths(&[0, 0, 0]).is_err());
        assert!(HuffmanTree::from_lengths(&[1, 2, 0]).is_err());
        assert!(HuffmanTree::from_lengths(&[1, 1, 1]).is_err());
        assert!(HuffmanTree::from_lengths(&[1, 2, 2]).is_ok());
        assert!(HuffmanTree::from_lengths(&[0, 3, 0]).is_ok());
    }

    #[test]
    fn long_codes_decode_past_lookup(){
        let lengths = [1_u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 15];
        let tree = HuffmanTree::from_lengths(&lengths).unwrap();
        let codes = canonical_codes(&lengths);

        let mut writer = BitWriter::new();
        for (symbol, &length) in lengths.iter().enumerate().rev() {
            writer.write(reverse_bits(codes[symbol], length), u32::from(length));
        }

        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        for symbol in (0 .. lengths.len()).rev() {
            assert_eq!(tree.read_symbol(&mut reader).unwrap() as usize, symbol);
        }
    }

    #[test]
    fn declared_maximum_symbol(){
        // full form, code length code with symbols 0 and 1 at length 1 each
        let mut writer = BitWriter::new();
        writer.write(0, 1);
        writer.write(0, 4); // four code length codes: 17, 18, 0, 1
        for &length in &[0, 0, 1, 1] { writer.write(length, 3); }
        writer.write(1, 1); // max symbol present
        writer.write(0, 3); // two bits
        writer.write(3, 2); // max symbol 5, exceeds an alphabet of four

        let bytes = writer.into_bytes();
        let result = HuffmanTree::read(&mut BitReader::new(&bytes), 4);
        assert!(matches!(result, Err(Error::Invalid(message)) if message == INVALID_CODE_LENGTHS));
    }

    #[test]
    fn repetition_tokens(){
        let mut lengths = vec![0_u8; 150];
        lengths.extend_from_slice(&[5; 9]);
        lengths.extend_from_slice(&[0, 0, 3]);

        let tokens = length_tokens(&lengths);
        let expanded: Vec<u8> = {
            let mut expanded = Vec::new();
            let mut previous = INITIAL_REPEATED_LENGTH;

            for token in &tokens {
                match token.symbol {
                    REPEAT_PREVIOUS => expanded.extend(std::iter::repeat(previous).take(token.extra_bits as usize + 3)),
                    REPEAT_ZERO_SHORT => expanded.extend(std::iter::repeat(0).take(token.extra_bits as usize + 3)),
                    REPEAT_ZERO_LONG => expanded.extend(std::iter::repeat(0).take(token.extra_bits as usize + 11)),
                    value => {
                        expanded.push(value);
                        if value != 0 { previous = value; }
                    },
                }
            }

            expanded
        };

        assert_eq!(expanded, lengths);
        assert!(tokens.len() < 10);
    }
}
