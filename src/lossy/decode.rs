
//! Decode a lossy key frame into luma and chroma planes.

use log::debug;
use smallvec::SmallVec;
use crate::error::{Error, Result, UNEXPECTED_END_OF_STREAM};
use crate::image::YuvImage;
use crate::io::take_n;
use crate::math::Vec2;
use super::bool_coder::BoolDecoder;
use super::filter::{self, FilterType};
use super::header::{FrameHeader, FrameTag, KeyFrameHeader, split_partitions, MAX_PARTITIONS};
use super::modes::ModeContext;
use super::planes::MacroblockPlanes;
use super::predict::{LumaPrediction, Workspace};
use super::residual::{dequantize, read_levels, Residual, TokenContext};


/// Decode the payload of a `VP8 ` chunk.
/// Only key frames are supported, as a still image has no previous frame to refer to.
pub fn decode(bytes: &[u8]) -> Result<YuvImage> {
    let mut remaining = bytes;
    let tag = FrameTag::read(&mut remaining)?;

    if !tag.key_frame { return Err(Error::unsupported("inter frame")); }
    if tag.version > 3 { return Err(Error::invalid("lossy version")); }
    if !tag.show_frame { return Err(Error::unsupported("hidden frame")); }

    let key_frame = KeyFrameHeader::read(&mut remaining)?;

    let first_partition = take_n(&mut remaining, tag.first_partition_len)
        .map_err(|_| Error::invalid(UNEXPECTED_END_OF_STREAM))?;

    let mut modes_decoder = BoolDecoder::new(first_partition);
    let header = FrameHeader::read(&mut modes_decoder)?;

    let partitions = split_partitions(remaining, header.partition_count)?;
    let mut token_decoders: SmallVec<[BoolDecoder<'_>; MAX_PARTITIONS]> =
        partitions.iter().map(|&partition| BoolDecoder::new(partition)).collect();

    let macroblocks = key_frame.macroblocks();
    debug!(
        "lossy frame of {}x{} pixels, {} token partitions, quantizer {}, filter level {}",
        key_frame.size.0, key_frame.size.1, header.partition_count, header.quant.base, header.filter.level
    );

    let steps = header.quant.steps(&header.segments);
    let filter_parameters = header.filter.parameters(&header.segments);

    let mut planes = MacroblockPlanes::new(macroblocks);
    let mut workspace = Workspace::default();
    let mut mode_context = ModeContext::new(macroblocks.0);
    let mut above = vec![TokenContext::default(); macroblocks.0];
    let mut filters = Vec::with_capacity(macroblocks.area());
    let partition_count = token_decoders.len();

    for y in 0 .. macroblocks.1 {
        let tokens = &mut token_decoders[y % partition_count];
        let mut left = TokenContext::default();
        mode_context.start_row();

        for (x, above) in above.iter_mut().enumerate() {
            let position = Vec2(x, y);
            let macroblock = mode_context.read(&mut modes_decoder, &header, x);
            let whole = matches!(macroblock.modes.luma, LumaPrediction::Whole(_));

            let residual = if macroblock.skip_coefficients {
                above.clear(whole);
                left.clear(whole);
                Residual::default()
            }
            else {
                let levels = read_levels(tokens, &header.token_probabilities, whole, above, &mut left);
                dequantize(&levels, &steps[macroblock.segment], whole)
            };

            workspace.prepare(&planes, position);
            workspace.reconstruct(&macroblock.modes, &residual, position);
            workspace.store(&mut planes, position);

            let mut parameters = filter_parameters[macroblock.segment][usize::from(!whole)];
            parameters.inner |= !residual.is_empty();
            filters.push(parameters);
        }

        modes_decoder.finish()?;
        tokens.finish()?;
    }

    if header.filter.level != 0 {
        let filter_type = if header.filter.simple { FilterType::Simple } else { FilterType::Normal };
        filter::apply(&mut planes, &filters, filter_type);
    }

    Ok(planes.crop(key_frame.size))
}
