
//! A key frame encoder that predicts each macroblock as a whole,
//! quantizes its transformed residual with a single quantizer, and codes the levels
//! with the default token probabilities.

use log::debug;
use crate::error::{Error, Result};
use crate::image::YuvImage;
use crate::math::Vec2;
use super::bool_coder::BoolEncoder;
use super::header::{
    FilterHeader, FrameHeader, FrameTag, KeyFrameHeader, QuantIndices, QuantSteps, SegmentHeader,
    write_partitions, MAX_DIMENSION, MAX_FILTER_LEVEL, MAX_QUANTIZER,
};
use super::idct::{forward_dct, forward_wht};
use super::modes::{MacroblockHeader, ModeContext};
use super::planes::MacroblockPlanes;
use super::predict::{
    chroma_block_origin, luma_block_origin, LumaPrediction, MacroblockModes, PlaneMode, Workspace,
    BLUE, LUMA, RED,
};
use super::residual::{dequantize, has_levels, write_levels, Levels, TokenContext, MAX_LEVEL, SECOND_ORDER};
use super::tables::DEFAULT_TOKEN_PROBABILITIES;


/// Into how many partitions the tokens are split. Rows of macroblocks are distributed round robin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partitions {

    /// All tokens in a single partition.
    One,

    /// Two partitions.
    Two,

    /// Four partitions.
    Four,

    /// Eight partitions, the most the format allows.
    Eight,
}

impl Partitions {

    /// The number of partitions.
    pub fn count(self) -> usize {
        match self {
            Partitions::One => 1,
            Partitions::Two => 2,
            Partitions::Four => 4,
            Partitions::Eight => 8,
        }
    }
}

/// How the lossy encoder compresses the planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossyOptions {

    /// Quantizer index between 0 (finest) and 127 (coarsest).
    pub quantizer: u8,

    /// Number of token partitions.
    pub partitions: Partitions,

    /// Loop filter level between 0 and 63. Zero disables the filter.
    pub filter_level: u8,

    /// Whether decoders should use the simple loop filter.
    pub simple_filter: bool,

    /// Filter sharpness between 0 and 7.
    pub sharpness: u8,
}

impl Default for LossyOptions {
    fn default() -> Self {
        LossyOptions {
            quantizer: 30,
            partitions: Partitions::One,
            filter_level: 20,
            simple_filter: false,
            sharpness: 0,
        }
    }
}

impl LossyOptions {

    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.quantizer > MAX_QUANTIZER { return Err(Error::invalid("quantizer must be at most 127")); }
        if self.filter_level > MAX_FILTER_LEVEL { return Err(Error::invalid("filter level must be at most 63")); }
        if self.sharpness > 7 { return Err(Error::invalid("filter sharpness must be at most 7")); }
        Ok(())
    }
}


/// What the first pass decided for one macroblock.
struct EncodedMacroblock {
    header: MacroblockHeader,
    levels: Levels,
}


/// Encode the luma and chroma planes as the payload of a `VP8 ` chunk. Alpha is ignored.
pub fn encode(image: &YuvImage, options: &LossyOptions) -> Result<Vec<u8>> {
    encode_with_reconstruction(image, options).map(|(bytes, _)| bytes)
}

/// Encode the planes and also return what a decoder reconstructs before the loop filter.
pub(crate) fn encode_with_reconstruction(image: &YuvImage, options: &LossyOptions) -> Result<(Vec<u8>, YuvImage)> {
    options.validate()?;
    image.size.validate(MAX_DIMENSION, "lossy frame size")?;
    image.validate()?;

    let source = MacroblockPlanes::from_image(image);
    let macroblocks = source.macroblocks;

    let quant = QuantIndices { base: options.quantizer, deltas: [0; 5] };
    let steps = quant.steps_for_index(i32::from(options.quantizer));

    let mut reconstruction = MacroblockPlanes::new(macroblocks);
    let mut workspace = Workspace::default();
    let mut encoded = Vec::with_capacity(macroblocks.area());

    for y in 0 .. macroblocks.1 {
        for x in 0 .. macroblocks.0 {
            let position = Vec2(x, y);
            workspace.prepare(&reconstruction, position);

            let luma = best_mode(&mut workspace, &source, position, &[(LUMA, 16)]);
            let chroma = best_mode(&mut workspace, &source, position, &[(BLUE, 8), (RED, 8)]);

            let levels = quantize_macroblock(&mut workspace, &source, position, luma, chroma, &steps);
            let modes = MacroblockModes { luma: LumaPrediction::Whole(luma), chroma };
            let residual = dequantize(&levels, &steps, true);

            workspace.reconstruct(&modes, &residual, position);
            workspace.store(&mut reconstruction, position);

            let skip_coefficients = levels.coded == 0;
            encoded.push(EncodedMacroblock { header: MacroblockHeader { segment: 0, skip_coefficients, modes }, levels });
        }
    }

    let skipped = encoded.iter().filter(|macroblock| macroblock.header.skip_coefficients).count();
    let skip_probability = (255 * (encoded.len() - skipped) / encoded.len()).max(1).min(254) as u8;

    let header = FrameHeader {
        color_space: false,
        clamping_not_required: false,
        segments: SegmentHeader { tree_probabilities: [255; 3], .. SegmentHeader::default() },
        filter: FilterHeader {
            simple: options.simple_filter,
            level: options.filter_level,
            sharpness: options.sharpness,
            .. FilterHeader::default()
        },
        partition_count: options.partitions.count(),
        quant,
        token_probabilities: DEFAULT_TOKEN_PROBABILITIES,
        skip_probability: Some(skip_probability),
    };

    debug!(
        "lossy encoding of {}x{} pixels, quantizer {}, {} of {} macroblocks without coefficients",
        image.size.0, image.size.1, options.quantizer, skipped, encoded.len()
    );

    let mut modes_encoder = BoolEncoder::new();
    header.write(&mut modes_encoder);

    let mut token_encoders = vec![BoolEncoder::new(); header.partition_count];
    let mut mode_context = ModeContext::new(macroblocks.0);
    let mut above = vec![TokenContext::default(); macroblocks.0];

    for (y, row) in encoded.chunks_exact(macroblocks.0).enumerate() {
        let tokens = &mut token_encoders[y % header.partition_count];
        let mut left = TokenContext::default();
        mode_context.start_row();

        for (x, (macroblock, above)) in row.iter().zip(above.iter_mut()).enumerate() {
            mode_context.write(&mut modes_encoder, &header, x, &macroblock.header);

            if macroblock.header.skip_coefficients {
                above.clear(true);
                left.clear(true);
            }
            else {
                write_levels(tokens, &header.token_probabilities, &macroblock.levels, true, above, &mut left);
            }
        }
    }

    let first_partition = modes_encoder.finish();
    let partitions: Vec<Vec<u8>> = token_encoders.into_iter().map(BoolEncoder::finish).collect();

    let mut bytes = Vec::with_capacity(first_partition.len() + partitions.iter().map(Vec::len).sum::<usize>() + 32);
    FrameTag { key_frame: true, version: 0, show_frame: true, first_partition_len: first_partition.len() }.write(&mut bytes)?;
    KeyFrameHeader { size: image.size, scale: Vec2(0, 0) }.write(&mut bytes)?;
    bytes.extend_from_slice(&first_partition);
    write_partitions(&mut bytes, &partitions)?;

    Ok((bytes, reconstruction.crop(image.size)))
}


/// The plane mode whose prediction is closest to the source,
/// over the given `(workspace origin, size)` squares.
fn best_mode(
    workspace: &mut Workspace, source: &MacroblockPlanes, position: Vec2<usize>,
    regions: &[(Vec2<usize>, usize)],
) -> PlaneMode
{
    let mut best = (PlaneMode::DC, u32::MAX);

    for &mode in &PlaneMode::ALL {
        let mut difference = 0;

        for &(origin, size) in regions {
            workspace.predict_plane(origin, size, mode, position);
            difference += region_difference(workspace, source, position, origin, Vec2(size, size));
        }

        if difference < best.1 { best = (mode, difference); }
    }

    best.0
}

/// The sum of absolute differences between the workspace and the source.
fn region_difference(
    workspace: &Workspace, source: &MacroblockPlanes, macroblock: Vec2<usize>,
    origin: Vec2<usize>, size: Vec2<usize>,
) -> u32
{
    let mut sum = 0;

    for y in 0 .. size.1 {
        for x in 0 .. size.0 {
            let offset = Vec2(origin.0 + x, origin.1 + y);
            let difference = i32::from(workspace.sample(offset)) - i32::from(source_sample(source, macroblock, offset));
            sum += difference.unsigned_abs();
        }
    }

    sum
}

/// The source sample at the same place as a workspace position.
fn source_sample(source: &MacroblockPlanes, macroblock: Vec2<usize>, workspace_position: Vec2<usize>) -> u8 {
    let Vec2(x, y) = workspace_position;

    if y < BLUE.1 {
        let stride = source.luma_stride();
        source.y[(16 * macroblock.1 + y - LUMA.1) * stride + 16 * macroblock.0 + x - LUMA.0]
    }
    else {
        let stride = source.chroma_stride();
        let (plane, origin) = if x < RED.0 { (&source.u, BLUE) } else { (&source.v, RED) };
        plane[(8 * macroblock.1 + y - origin.1) * stride + 8 * macroblock.0 + x - origin.0]
    }
}

/// Predict the macroblock, then transform and quantize the difference to the source.
fn quantize_macroblock(
    workspace: &mut Workspace, source: &MacroblockPlanes, position: Vec2<usize>,
    luma: PlaneMode, chroma: PlaneMode, steps: &QuantSteps,
) -> Levels
{
    workspace.predict_plane(LUMA, 16, luma, position);
    workspace.predict_plane(BLUE, 8, chroma, position);
    workspace.predict_plane(RED, 8, chroma, position);

    let transform = |origin: Vec2<usize>| {
        let mut residual = [0_i32; 16];
        for (index, value) in residual.iter_mut().enumerate() {
            let offset = Vec2(origin.0 + index % 4, origin.1 + index / 4);
            *value = i32::from(source_sample(source, position, offset)) - i32::from(workspace.sample(offset));
        }
        forward_dct(&residual)
    };

    let mut levels = Levels::default();
    let mut dcs = [0_i32; 16];

    for block in 0 .. 16 {
        let coefficients = transform(luma_block_origin(block));
        dcs[block] = coefficients[0];
        levels.blocks[block] = quantize_block(&coefficients, [0, steps.luma[1]]);
    }

    levels.blocks[SECOND_ORDER] = quantize_block(&forward_wht(&dcs), steps.second_order);

    for (plane, &origin) in [BLUE, RED].iter().enumerate() {
        for index in 0 .. 4 {
            let coefficients = transform(chroma_block_origin(origin, index));
            levels.blocks[16 + plane * 4 + index] = quantize_block(&coefficients, steps.chroma);
        }
    }

    for (block, levels_of_block) in levels.blocks.iter().enumerate() {
        let first = if block < 16 { 1 } else { 0 };
        levels.coded |= u32::from(has_levels(levels_of_block, first)) << block;
    }

    levels
}

/// Divide each coefficient by its step, rounding to the nearest level.
/// A zero DC step leaves the DC level at zero.
fn quantize_block(coefficients: &[i32; 16], [dc, ac]: [i32; 2]) -> [i16; 16] {
    let mut levels = [0_i16; 16];

    for (index, (level, &coefficient)) in levels.iter_mut().zip(coefficients).enumerate() {
        let step = if index == 0 { dc } else { ac };
        if step == 0 { continue; }

        let magnitude = ((coefficient.abs() + step / 2) / step).min(MAX_LEVEL);
        *level = (if coefficient < 0 { -magnitude } else { magnitude }) as i16;
    }

    levels
}
