
//! The uncompressed frame tag and the frame header at the start of the first partition:
//! segmentation, loop filter, partition layout, quantizers and token probabilities.

use smallvec::SmallVec;
use crate::error::{Error, Result, UNEXPECTED_END_OF_STREAM};
use crate::io::take_n;
use crate::math::Vec2;
use super::bool_coder::{BoolDecoder, BoolEncoder};
use super::tables::{TokenProbabilities, DEFAULT_TOKEN_PROBABILITIES, TOKEN_UPDATE_PROBABILITIES, DC_STEPS, AC_STEPS};


/// The three bytes that follow the frame tag of every key frame.
pub const START_CODE: [u8; 3] = [0x9D, 0x01, 0x2A];

/// Segments that may each use their own quantizer and filter strength.
pub const SEGMENT_COUNT: usize = 4;

/// The most token partitions a frame may have.
pub const MAX_PARTITIONS: usize = 8;

/// The largest quantizer index.
pub const MAX_QUANTIZER: u8 = 127;

/// The largest loop filter level.
pub const MAX_FILTER_LEVEL: u8 = 63;

/// Width and height are stored in 14 bits each.
pub const MAX_DIMENSION: usize = (1 << 14) - 1;


/// The first three bytes of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTag {

    /// Only key frames can be decoded without a previous frame.
    pub key_frame: bool,

    /// The reconstruction profile, between zero and three.
    pub version: u8,

    /// Whether the frame is meant to be displayed.
    pub show_frame: bool,

    /// Byte length of the first partition, which holds the header and all modes.
    pub first_partition_len: usize,
}

impl FrameTag {

    /// The byte size of the tag.
    pub const BYTE_SIZE: usize = 3;

    /// Parse the tag, advancing the slice.
    pub fn read(bytes: &mut &[u8]) -> Result<Self> {
        let tag = take_n(bytes, Self::BYTE_SIZE)?;
        let bits = u32::from(tag[0]) | u32::from(tag[1]) << 8 | u32::from(tag[2]) << 16;

        Ok(FrameTag {
            key_frame: bits & 1 == 0,
            version: (bits >> 1 & 7) as u8,
            show_frame: bits >> 4 & 1 != 0,
            first_partition_len: (bits >> 5) as usize,
        })
    }

    /// Append the tag bytes.
    pub fn write(&self, bytes: &mut Vec<u8>) -> Result<()> {
        if self.first_partition_len >= 1 << 19 {
            return Err(Error::invalid("first partition too large"));
        }

        let bits = u32::from(!self.key_frame)
            | u32::from(self.version & 7) << 1
            | u32::from(self.show_frame) << 4
            | (self.first_partition_len as u32) << 5;

        bytes.extend_from_slice(&bits.to_le_bytes()[.. 3]);
        Ok(())
    }
}


/// The start code and dimensions that follow the tag of a key frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFrameHeader {

    /// Width and height in pixels.
    pub size: Vec2<usize>,

    /// Upscaling hints, which decoders of still images ignore.
    pub scale: Vec2<u8>,
}

impl KeyFrameHeader {

    /// The byte size of the start code and the dimensions.
    pub const BYTE_SIZE: usize = 7;

    /// Parse the start code and the dimensions, advancing the slice.
    pub fn read(bytes: &mut &[u8]) -> Result<Self> {
        let header = take_n(bytes, Self::BYTE_SIZE)?;

        if header[.. 3] != START_CODE {
            return Err(Error::invalid("key frame start code"));
        }

        let width = u16::from_le_bytes([header[3], header[4]]);
        let height = u16::from_le_bytes([header[5], header[6]]);

        let size = Vec2(usize::from(width & 0x3FFF), usize::from(height & 0x3FFF));
        if size.0 == 0 || size.1 == 0 {
            return Err(Error::invalid("lossy frame size"));
        }

        Ok(KeyFrameHeader { size, scale: Vec2((width >> 14) as u8, (height >> 14) as u8) })
    }

    /// Append the start code and the dimensions.
    pub fn write(&self, bytes: &mut Vec<u8>) -> Result<()> {
        let size = self.size.validate(MAX_DIMENSION, "lossy frame size")?;

        bytes.extend_from_slice(&START_CODE);
        bytes.extend_from_slice(&(size.0 as u16 | u16::from(self.scale.0) << 14).to_le_bytes());
        bytes.extend_from_slice(&(size.1 as u16 | u16::from(self.scale.1) << 14).to_le_bytes());
        Ok(())
    }

    /// Number of macroblocks covering the frame, horizontally and vertically.
    pub fn macroblocks(&self) -> Vec2<usize> {
        self.size.map(|size| (size + 15) / 16)
    }
}


/// Splits the frame into segments with individual quantizers and filter strengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentHeader {

    /// Whether macroblocks have a segment at all.
    pub enabled: bool,

    /// Whether each macroblock header carries its segment.
    pub update_map: bool,

    /// Whether the segment values are added to the frame values instead of replacing them.
    pub relative: bool,

    /// Quantizer index or index delta of each segment.
    pub quantizer: [i32; SEGMENT_COUNT],

    /// Filter level or level delta of each segment.
    pub filter_level: [i32; SEGMENT_COUNT],

    /// Probabilities of the segment tree in the macroblock headers.
    pub tree_probabilities: [u8; 3],
}

impl SegmentHeader {

    /// Parse the segmentation flags and values.
    pub fn read(decoder: &mut BoolDecoder<'_>) -> Self {
        let mut header = SegmentHeader { tree_probabilities: [255; 3], .. SegmentHeader::default() };

        header.enabled = decoder.read_flag();
        if !header.enabled { return header; }

        header.update_map = decoder.read_flag();
        let update_data = decoder.read_flag();

        if update_data {
            header.relative = !decoder.read_flag();

            for quantizer in &mut header.quantizer {
                *quantizer = decoder.read_optional_signed(7);
            }

            for level in &mut header.filter_level {
                *level = decoder.read_optional_signed(6);
            }
        }

        if header.update_map {
            for probability in &mut header.tree_probabilities {
                *probability = if decoder.read_flag() { decoder.read_literal(8) as u8 } else { 255 };
            }
        }

        header
    }

    /// Only writes disabled segmentation.
    pub fn write_disabled(encoder: &mut BoolEncoder) {
        encoder.write_flag(false);
    }

    /// Decode the segment of one macroblock, if the frame has a segment map.
    pub fn read_segment(&self, decoder: &mut BoolDecoder<'_>) -> Option<usize> {
        if !self.update_map { return None; }

        let [root, low, high] = self.tree_probabilities;
        Some(
            if !decoder.read_bit(root) { usize::from(decoder.read_bit(low)) }
            else { 2 + usize::from(decoder.read_bit(high)) }
        )
    }
}


/// The deblocking parameters of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterHeader {

    /// Whether to use the simple filter, which only touches luma.
    pub simple: bool,

    /// The filter level between 0 and 63, where zero disables the filter.
    pub level: u8,

    /// Reduces the interior limit, between 0 and 7.
    pub sharpness: u8,

    /// Whether the level is adjusted per reference frame and prediction mode.
    pub use_deltas: bool,

    /// Level adjustment per reference frame, of which only intra applies to key frames.
    pub reference_deltas: [i32; 4],

    /// Level adjustment per prediction mode, of which only 4x4 prediction applies to key frames.
    pub mode_deltas: [i32; 4],
}

/// The filter strength for one kind of macroblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterParameters {

    /// Edge limit of inner edges. Zero means the macroblock is not filtered.
    pub limit: u8,

    /// Limit on differences between pixels on the same side of an edge.
    pub interior_limit: u8,

    /// Differences above this count as high edge variance.
    pub hev_threshold: u8,

    /// Whether inner edges are filtered in addition to macroblock edges.
    pub inner: bool,
}

impl FilterHeader {

    /// Parse the filter type, level, sharpness and deltas.
    pub fn read(decoder: &mut BoolDecoder<'_>) -> Self {
        let mut header = FilterHeader {
            simple: decoder.read_flag(),
            level: decoder.read_literal(6) as u8,
            sharpness: decoder.read_literal(3) as u8,
            use_deltas: decoder.read_flag(),
            .. FilterHeader::default()
        };

        if header.use_deltas && decoder.read_flag() {
            for delta in &mut header.reference_deltas { *delta = decoder.read_optional_signed(6); }
            for delta in &mut header.mode_deltas { *delta = decoder.read_optional_signed(6); }
        }

        header
    }

    /// Write the filter type, level and sharpness, without deltas.
    pub fn write(&self, encoder: &mut BoolEncoder) {
        encoder.write_flag(self.simple);
        encoder.write_literal(6, u32::from(self.level.min(MAX_FILTER_LEVEL)));
        encoder.write_literal(3, u32::from(self.sharpness.min(7)));
        encoder.write_flag(false);
    }

    /// The parameters for each segment, for 16x16 prediction at index 0 and 4x4 prediction at index 1.
    pub fn parameters(&self, segments: &SegmentHeader) -> [[FilterParameters; 2]; SEGMENT_COUNT] {
        let mut parameters = [[FilterParameters::default(); 2]; SEGMENT_COUNT];
        if self.level == 0 { return parameters; }

        for (segment, parameters) in parameters.iter_mut().enumerate() {
            let mut base = i32::from(self.level);

            if segments.enabled {
                base = segments.filter_level[segment];
                if segments.relative { base += i32::from(self.level); }
            }

            for (sub_blocks, parameters) in parameters.iter_mut().enumerate() {
                *parameters = self.parameters_for_level(base, sub_blocks != 0);
            }
        }

        parameters
    }

    fn parameters_for_level(&self, base: i32, sub_blocks: bool) -> FilterParameters {
        let mut level = base;

        if self.use_deltas {
            level += self.reference_deltas[0];
            if sub_blocks { level += self.mode_deltas[0]; }
        }

        if level <= 0 {
            return FilterParameters { inner: sub_blocks, .. FilterParameters::default() };
        }

        let level = level.min(i32::from(MAX_FILTER_LEVEL)) as u8;
        let mut interior_limit = level;

        if self.sharpness > 0 {
            interior_limit >>= if self.sharpness > 4 { 2 } else { 1 };
            interior_limit = interior_limit.min(9 - self.sharpness.min(7));
        }

        let interior_limit = interior_limit.max(1);

        FilterParameters {
            limit: 2 * level + interior_limit,
            interior_limit,
            hev_threshold: if level >= 40 { 2 } else if level >= 15 { 1 } else { 0 },
            inner: sub_blocks,
        }
    }
}


/// Quantizer indices of the frame, as a base index and deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuantIndices {

    /// The index of the luma AC coefficients.
    pub base: u8,

    /// Deltas for luma DC, second order DC, second order AC, chroma DC and chroma AC.
    pub deltas: [i32; 5],
}

/// Dequantization factors of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuantSteps {

    /// DC and AC factors of luma blocks.
    pub luma: [i32; 2],

    /// DC and AC factors of the second order block.
    pub second_order: [i32; 2],

    /// DC and AC factors of chroma blocks.
    pub chroma: [i32; 2],
}

impl QuantIndices {

    /// Parse the base index and the optional deltas.
    pub fn read(decoder: &mut BoolDecoder<'_>) -> Self {
        let base = decoder.read_literal(7) as u8;
        let mut deltas = [0; 5];

        for delta in &mut deltas {
            *delta = decoder.read_optional_signed(4);
        }

        QuantIndices { base, deltas }
    }

    /// Write the base index and the deltas.
    pub fn write(&self, encoder: &mut BoolEncoder) {
        encoder.write_literal(7, u32::from(self.base.min(MAX_QUANTIZER)));

        for &delta in &self.deltas {
            encoder.write_optional_signed(4, delta.max(-15).min(15));
        }
    }

    /// The dequantization factors of each segment.
    pub fn steps(&self, segments: &SegmentHeader) -> [QuantSteps; SEGMENT_COUNT] {
        let mut steps = [QuantSteps::default(); SEGMENT_COUNT];

        for (segment, steps) in steps.iter_mut().enumerate() {
            let mut base = i32::from(self.base);

            if segments.enabled {
                base = segments.quantizer[segment];
                if segments.relative { base += i32::from(self.base); }
            }

            *steps = self.steps_for_index(base);
        }

        steps
    }

    /// The dequantization factors for a base index without segments.
    pub fn steps_for_index(&self, base: i32) -> QuantSteps {
        let dc = |delta: i32| i32::from(DC_STEPS[(base + delta).max(0).min(127) as usize]);
        let ac = |delta: i32| i32::from(AC_STEPS[(base + delta).max(0).min(127) as usize]);
        let [luma_dc, second_dc, second_ac, chroma_dc, chroma_ac] = self.deltas;

        QuantSteps {
            luma: [dc(luma_dc), ac(0)],
            second_order: [dc(second_dc) * 2, (ac(second_ac) * 155 / 100).max(8)],
            chroma: [dc(chroma_dc).min(132), ac(chroma_ac)],
        }
    }
}


/// Everything the first partition declares before the macroblock headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {

    /// Zero for the default color space, one for a reserved one.
    pub color_space: bool,

    /// Whether reconstructed pixels need no clamping.
    pub clamping_not_required: bool,

    /// Segmentation of the frame.
    pub segments: SegmentHeader,

    /// The loop filter.
    pub filter: FilterHeader,

    /// Number of token partitions, one of 1, 2, 4 or 8.
    pub partition_count: usize,

    /// Quantizer indices.
    pub quant: QuantIndices,

    /// Token probabilities after the updates of this frame.
    pub token_probabilities: TokenProbabilities,

    /// Probability that a macroblock has coefficients, if macroblocks may skip them.
    pub skip_probability: Option<u8>,
}

impl FrameHeader {

    /// Parse the header fields of a key frame from its first partition.
    pub fn read(decoder: &mut BoolDecoder<'_>) -> Result<Self> {
        let color_space = decoder.read_flag();
        let clamping_not_required = decoder.read_flag();
        let segments = SegmentHeader::read(decoder);
        let filter = FilterHeader::read(decoder);
        let partition_count = 1 << decoder.read_literal(2);
        let quant = QuantIndices::read(decoder);

        // only affects the next frame
        let _refresh_probabilities = decoder.read_flag();

        let mut token_probabilities = DEFAULT_TOKEN_PROBABILITIES;
        for (probabilities, updates) in token_probabilities.iter_mut().flatten().flatten()
            .zip(TOKEN_UPDATE_PROBABILITIES.iter().flatten().flatten())
        {
            for (probability, &update) in probabilities.iter_mut().zip(updates) {
                if decoder.read_bit(update) {
                    *probability = decoder.read_literal(8) as u8;
                }
            }
        }

        let skip_probability = if decoder.read_flag() { Some(decoder.read_literal(8) as u8) } else { None };

        decoder.finish()?;

        Ok(FrameHeader {
            color_space, clamping_not_required, segments, filter,
            partition_count, quant, token_probabilities, skip_probability,
        })
    }

    /// Write the header fields, without segmentation and with unchanged token probabilities.
    pub fn write(&self, encoder: &mut BoolEncoder) {
        debug_assert!(!self.segments.enabled, "segments are not written");

        encoder.write_flag(self.color_space);
        encoder.write_flag(self.clamping_not_required);
        SegmentHeader::write_disabled(encoder);
        self.filter.write(encoder);
        encoder.write_literal(2, self.partition_count.trailing_zeros());
        self.quant.write(encoder);
        encoder.write_flag(false);

        for updates in TOKEN_UPDATE_PROBABILITIES.iter().flatten().flatten() {
            for &update in updates {
                encoder.write_bit(update, false);
            }
        }

        encoder.write_flag(self.skip_probability.is_some());
        if let Some(probability) = self.skip_probability {
            encoder.write_literal(8, u32::from(probability));
        }
    }
}


/// Split the bytes after the first partition into token partitions.
/// All but the last partition are preceded by their 24 bit little endian length.
pub fn split_partitions(bytes: &[u8], count: usize) -> Result<SmallVec<[&[u8]; MAX_PARTITIONS]>> {
    debug_assert!(count >= 1 && count <= MAX_PARTITIONS, "invalid partition count");

    let mut rest = bytes;
    let lengths = take_n(&mut rest, 3 * (count - 1))?;
    let mut partitions = SmallVec::new();

    for length in lengths.chunks_exact(3) {
        let length = usize::from(length[0]) | usize::from(length[1]) << 8 | usize::from(length[2]) << 16;
        let partition = take_n(&mut rest, length).map_err(|_| Error::invalid(UNEXPECTED_END_OF_STREAM))?;
        partitions.push(partition);
    }

    partitions.push(rest);
    Ok(partitions)
}

/// Append the lengths of all but the last partition, then all partitions.
pub fn write_partitions(bytes: &mut Vec<u8>, partitions: &[Vec<u8>]) -> Result<()> {
    if let Some((_, leading)) = partitions.split_last() {
        for partition in leading {
            if partition.len() >= 1 << 24 {
                return Err(Error::invalid("token partition too large"));
            }

            bytes.extend_from_slice(&(partition.len() as u32).to_le_bytes()[.. 3]);
        }
    }

    for partition in partitions {
        bytes.extend_from_slice(partition);
    }

    Ok(())
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn frame_tag_fields(){
        // key frame, version 0, shown, first partition of 0x1234 bytes
        let tag = FrameTag { key_frame: true, version: 0, show_frame: true, first_partition_len: 0x1234 };

        let mut bytes = Vec::new();
        tag.write(&mut bytes).unwrap();
        assert_eq!(bytes, [0x90, 0x46, 0x02]);
        assert_eq!(FrameTag::read(&mut bytes.as_slice()).unwrap(), tag);

        let inter = FrameTag::read(&mut [0x01_u8, 0, 0].as_ref()).unwrap();
        assert!(!inter.key_frame);
    }

    #[test]
    fn key_frame_dimensions(){
        let bytes = [0x9D, 0x01, 0x2A, 0x10, 0x40, 0x05, 0x00];
        let header = KeyFrameHeader::read(&mut bytes.as_ref()).unwrap();
        assert_eq!(header.size, Vec2(16, 5));
        assert_eq!(header.scale, Vec2(1, 0));
        assert_eq!(header.macroblocks(), Vec2(1, 1));

        assert!(KeyFrameHeader::read(&mut [0x9D, 0x01, 0x2B, 1, 0, 1, 0].as_ref()).is_err());
        assert!(KeyFrameHeader::read(&mut [0x9D, 0x01, 0x2A, 0, 0, 1, 0].as_ref()).is_err());
    }

    #[test]
    fn header_round_trip(){
        let header = FrameHeader {
            color_space: false,
            clamping_not_required: false,
            segments: SegmentHeader { tree_probabilities: [255; 3], .. SegmentHeader::default() },
            filter: FilterHeader { simple: true, level: 20, sharpness: 3, .. FilterHeader::default() },
            partition_count: 4,
            quant: QuantIndices { base: 60, deltas: [0, -3, 2, 0, 15] },
            token_probabilities: DEFAULT_TOKEN_PROBABILITIES,
            skip_probability: Some(200),
        };

        let mut encoder = BoolEncoder::new();
        header.write(&mut encoder);
        let bytes = encoder.finish();

        let decoded = FrameHeader::read(&mut BoolDecoder::new(&bytes)).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn quantizer_steps_are_clamped(){
        let quant = QuantIndices { base: 127, deltas: [15, 15, 15, 15, 15] };
        let steps = quant.steps(&SegmentHeader::default());
        assert_eq!(steps[0].luma, [157, 284]);
        assert_eq!(steps[0].second_order, [314, 284 * 155 / 100]);
        assert_eq!(steps[0].chroma, [132, 284]);

        let lowest = QuantIndices { base: 0, deltas: [-15, -15, -15, -15, -15] }.steps_for_index(0);
        assert_eq!(lowest.luma, [4, 4]);
        assert_eq!(lowest.second_order, [8, 8]);
    }

    #[test]
    fn segment_quantizers(){
        let segments = SegmentHeader {
            enabled: true, relative: true,
            quantizer: [0, -10, 10, 100],
            .. SegmentHeader::default()
        };

        let steps = QuantIndices { base: 50, deltas: [0; 5] }.steps(&segments);
        assert_eq!(steps[0].luma[1], i32::from(AC_STEPS[50]));
        assert_eq!(steps[1].luma[1], i32::from(AC_STEPS[40]));
        assert_eq!(steps[3].luma[1], i32::from(AC_STEPS[127]));
    }

    #[test]
    fn filter_parameters(){
        let filter = FilterHeader { level: 32, sharpness: 0, .. FilterHeader::default() };
        let parameters = filter.parameters(&SegmentHeader::default());
        assert_eq!(parameters[0][0], FilterParameters { limit: 96, interior_limit: 32, hev_threshold: 1, inner: false });
        assert!(parameters[0][1].inner);

        let sharp = FilterHeader { level: 63, sharpness: 5, .. FilterHeader::default() };
        let parameters = sharp.parameters(&SegmentHeader::default());
        assert_eq!(parameters[2][0].interior_limit, 4);
        assert_eq!(parameters[2][0].hev_threshold, 2);

        let disabled = FilterHeader::default().parameters(&SegmentHeader::default());
        assert!(disabled.iter().flatten().all(|parameters| parameters.limit == 0));
    }

    #[test]
    fn partitions_are_split_by_their_lengths(){
        let bytes = [2, 0, 0, 1, 0, 0, 0xA, 0xB, 0xC, 0xD, 0xE];
        let partitions = split_partitions(&bytes, 3).unwrap();
        assert_eq!(partitions.as_slice(), &[&[0xA, 0xB][..], &[0xC], &[0xD, 0xE]]);

        let mut written = Vec::new();
        write_partitions(&mut written, &[vec![0xA, 0xB], vec![0xC], vec![0xD, 0xE]]).unwrap();
        assert_eq!(written, bytes);

        assert!(split_partitions(&[9, 0, 0, 1], 2).is_err());
        assert!(split_partitions(&[9, 0], 2).is_err());
    }
}
