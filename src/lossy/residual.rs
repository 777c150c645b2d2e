
//! Quantized coefficient levels of a macroblock: their token coding and their dequantization.
//! Whether a neighbouring block had coefficients selects the probabilities of the first token.

use super::bool_coder::{BoolDecoder, BoolEncoder};
use super::header::QuantSteps;
use super::idct::inverse_wht;
use super::tables::{TokenProbabilities, TOKEN_PROBABILITY_COUNT, BANDS, ZIGZAG, LARGE_CATEGORY_PROBABILITIES};


/// The largest magnitude a token can express.
pub const MAX_LEVEL: i32 = 67 + 2047;

/// Index of the second order block among the levels.
pub const SECOND_ORDER: usize = 24;

/// Probabilities of one plane type, by band and context.
type PlaneProbabilities = [[[u8; TOKEN_PROBABILITY_COUNT]; 3]; 8];

/// Token probabilities of luma blocks whose DC term is in the second order block.
const LUMA_WITHOUT_DC: usize = 0;
const SECOND_ORDER_PLANE: usize = 1;
const CHROMA: usize = 2;
const LUMA_WITH_DC: usize = 3;


/// The quantized levels of one macroblock, in raster order within each block.
/// Blocks 0 to 15 are luma, 16 to 19 blue, 20 to 23 red, and 24 the second order block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Levels {

    /// The levels of each block.
    pub blocks: [[i16; 16]; 25],

    /// One bit per block that has any token.
    pub coded: u32,
}

/// The dequantized coefficients of one macroblock, ready for the inverse transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Residual {

    /// Coefficients of the 16 luma, 4 blue and 4 red blocks.
    pub blocks: [[i16; 16]; 24],

    /// One bit per block that needs the full inverse transform.
    pub non_zero_ac: u32,

    /// One bit per block with a non-zero DC coefficient.
    pub non_zero_dc: u32,
}

impl Residual {

    /// Whether the macroblock has no coefficients at all.
    pub fn is_empty(&self) -> bool {
        self.non_zero_ac | self.non_zero_dc == 0
    }
}

/// Whether the neighbouring blocks had tokens,
/// for the row of blocks above or the column of blocks to the left of a macroblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenContext {

    /// One entry per 4x4 luma block.
    pub luma: [u8; 4],

    /// One entry per blue block.
    pub blue: [u8; 2],

    /// One entry per red block.
    pub red: [u8; 2],

    /// The second order block, which only macroblocks with 16x16 prediction have.
    pub second_order: u8,
}

impl TokenContext {

    /// Forget the blocks of a macroblock without coefficients.
    /// The second order entry survives macroblocks that predict 4x4 blocks.
    pub fn clear(&mut self, whole: bool) {
        let second_order = self.second_order;
        *self = TokenContext::default();
        if !whole { self.second_order = second_order; }
    }
}


/// Visit every block of a macroblock in bitstream order, with its token plane,
/// its first coefficient, and the two context entries it reads and updates.
fn for_each_block(
    whole: bool, above: &mut TokenContext, left: &mut TokenContext,
    mut visit: impl FnMut(usize, usize, usize, &mut u8, &mut u8),
){
    if whole {
        visit(SECOND_ORDER, SECOND_ORDER_PLANE, 0, &mut above.second_order, &mut left.second_order);
    }

    let (luma_plane, luma_first) = if whole { (LUMA_WITHOUT_DC, 1) } else { (LUMA_WITH_DC, 0) };

    for y in 0 .. 4 {
        for x in 0 .. 4 {
            visit(y * 4 + x, luma_plane, luma_first, &mut above.luma[x], &mut left.luma[y]);
        }
    }

    for y in 0 .. 2 {
        for x in 0 .. 2 {
            visit(16 + y * 2 + x, CHROMA, 0, &mut above.blue[x], &mut left.blue[y]);
        }
    }

    for y in 0 .. 2 {
        for x in 0 .. 2 {
            visit(20 + y * 2 + x, CHROMA, 0, &mut above.red[x], &mut left.red[y]);
        }
    }
}

/// Decode the tokens of a macroblock, updating the contexts.
pub fn read_levels(
    decoder: &mut BoolDecoder<'_>, probabilities: &TokenProbabilities,
    whole: bool, above: &mut TokenContext, left: &mut TokenContext,
) -> Levels
{
    let mut levels = Levels::default();

    for_each_block(whole, above, left, |block, plane, first, above, left| {
        let context = usize::from(*above + *left);
        let coded = read_block(decoder, &probabilities[plane], context, first, &mut levels.blocks[block]);

        *above = u8::from(coded);
        *left = u8::from(coded);
        levels.coded |= u32::from(coded) << block;
    });

    levels
}

/// Encode the tokens of a macroblock, updating the contexts.
pub fn write_levels(
    encoder: &mut BoolEncoder, probabilities: &TokenProbabilities,
    levels: &Levels, whole: bool, above: &mut TokenContext, left: &mut TokenContext,
){
    for_each_block(whole, above, left, |block, plane, first, above, left| {
        let context = usize::from(*above + *left);
        let coded = write_block(encoder, &probabilities[plane], context, first, &levels.blocks[block]);

        *above = u8::from(coded);
        *left = u8::from(coded);
    });
}

/// Whether a block has any level that would be coded.
pub fn has_levels(levels: &[i16; 16], first: usize) -> bool {
    (first .. 16).any(|n| levels[ZIGZAG[n]] != 0)
}

/// Multiply the levels by their quantizer steps and restore the luma DC terms from the second order block.
/// Products are truncated to 16 bits.
pub fn dequantize(levels: &Levels, steps: &QuantSteps, whole: bool) -> Residual {
    let mut residual = Residual::default();

    let scale = |block: &[i16; 16], [dc, ac]: [i32; 2]| -> [i16; 16] {
        let mut coefficients = [0_i16; 16];
        for (index, (coefficient, &level)) in coefficients.iter_mut().zip(block).enumerate() {
            let step = if index == 0 { dc } else { ac };
            *coefficient = (i32::from(level) * step) as i16;
        }
        coefficients
    };

    for block in 0 .. 24 {
        let steps = if block < 16 { steps.luma } else { steps.chroma };
        residual.blocks[block] = scale(&levels.blocks[block], steps);
    }

    if whole {
        let second_order = scale(&levels.blocks[SECOND_ORDER], steps.second_order);
        let dcs = inverse_wht(&second_order);

        for (block, &dc) in residual.blocks[.. 16].iter_mut().zip(&dcs) {
            block[0] = dc;
        }
    }

    for (index, block) in residual.blocks.iter().enumerate() {
        // luma levels of 16x16 prediction only signal the AC coefficients
        let has_ac = if whole && index < 16 { levels.coded >> index & 1 != 0 }
            else { block[1 ..].iter().any(|&coefficient| coefficient != 0) };

        residual.non_zero_ac |= u32::from(has_ac) << index;
        residual.non_zero_dc |= u32::from(block[0] != 0) << index;
    }

    residual
}


/// Decode the tokens of one block into its levels. Returns whether there was any token.
fn read_block(
    decoder: &mut BoolDecoder<'_>, probabilities: &PlaneProbabilities,
    context: usize, first: usize, levels: &mut [i16; 16],
) -> bool
{
    let mut position = first;
    let mut probability = &probabilities[BANDS[position]][context];

    if !decoder.read_bit(probability[0]) {
        return false;
    }

    loop {
        // a zero is never followed by the end of the block
        if !decoder.read_bit(probability[1]) {
            position += 1;
            if position == 16 { return true; }

            probability = &probabilities[BANDS[position]][0];
            continue;
        }

        let (magnitude, next_context) =
            if !decoder.read_bit(probability[2]) { (1, 1) }
            else { (read_large_magnitude(decoder, probability), 2) };

        let level = if decoder.read_flag() { -magnitude } else { magnitude };
        levels[ZIGZAG[position]] = level as i16;

        position += 1;
        if position == 16 { return true; }

        probability = &probabilities[BANDS[position]][next_context];
        if !decoder.read_bit(probability[0]) { return true; }
    }
}

fn read_large_magnitude(decoder: &mut BoolDecoder<'_>, probability: &[u8; TOKEN_PROBABILITY_COUNT]) -> i32 {
    if !decoder.read_bit(probability[3]) {
        if !decoder.read_bit(probability[4]) { 2 }
        else { 3 + i32::from(decoder.read_bit(probability[5])) }
    }
    else if !decoder.read_bit(probability[6]) {
        if !decoder.read_bit(probability[7]) { 5 + i32::from(decoder.read_bit(159)) }
        else { 7 + 2 * i32::from(decoder.read_bit(165)) + i32::from(decoder.read_bit(145)) }
    }
    else {
        let high = usize::from(decoder.read_bit(probability[8]));
        let low = usize::from(decoder.read_bit(probability[9 + high]));
        let category = 2 * high + low;

        let extra = LARGE_CATEGORY_PROBABILITIES[category].iter()
            .fold(0, |extra, &probability| extra << 1 | i32::from(decoder.read_bit(probability)));

        3 + (8 << category) + extra
    }
}

/// Encode the levels of one block, ending the block after its last non-zero level.
/// Returns whether there was any token.
fn write_block(
    encoder: &mut BoolEncoder, probabilities: &PlaneProbabilities,
    context: usize, first: usize, levels: &[i16; 16],
) -> bool
{
    let mut probability = &probabilities[BANDS[first]][context];

    let last = match (first .. 16).rev().find(|&n| levels[ZIGZAG[n]] != 0) {
        Some(last) => last,
        None => {
            encoder.write_bit(probability[0], false);
            return false;
        }
    };

    encoder.write_bit(probability[0], true);

    for position in first ..= last {
        let level = i32::from(levels[ZIGZAG[position]]);

        if level == 0 {
            encoder.write_bit(probability[1], false);
            probability = &probabilities[BANDS[position + 1]][0];
            continue;
        }

        encoder.write_bit(probability[1], true);

        let magnitude = level.abs().min(MAX_LEVEL);
        let next_context = if magnitude == 1 {
            encoder.write_bit(probability[2], false);
            1
        }
        else {
            encoder.write_bit(probability[2], true);
            write_large_magnitude(encoder, probability, magnitude);
            2
        };

        encoder.write_flag(level < 0);

        if position + 1 < 16 {
            probability = &probabilities[BANDS[position + 1]][next_context];
            encoder.write_bit(probability[0], position < last);
        }
    }

    true
}

fn write_large_magnitude(encoder: &mut BoolEncoder, probability: &[u8; TOKEN_PROBABILITY_COUNT], magnitude: i32) {
    if magnitude <= 4 {
        encoder.write_bit(probability[3], false);
        encoder.write_bit(probability[4], magnitude != 2);
        if magnitude != 2 { encoder.write_bit(probability[5], magnitude == 4); }
    }
    else if magnitude <= 10 {
        encoder.write_bit(probability[3], true);
        encoder.write_bit(probability[6], false);

        if magnitude <= 6 {
            encoder.write_bit(probability[7], false);
            encoder.write_bit(159, magnitude == 6);
        }
        else {
            let offset = magnitude - 7;
            encoder.write_bit(probability[7], true);
            encoder.write_bit(165, offset >> 1 != 0);
            encoder.write_bit(145, offset & 1 != 0);
        }
    }
    else {
        encoder.write_bit(probability[3], true);
        encoder.write_bit(probability[6], true);

        let category = match magnitude {
            11 ..= 18 => 0,
            19 ..= 34 => 1,
            35 ..= 66 => 2,
            _ => 3,
        };

        let high = category >> 1;
        encoder.write_bit(probability[8], high != 0);
        encoder.write_bit(probability[9 + high], category & 1 != 0);

        let extra = magnitude - (3 + (8 << category));
        let probabilities = LARGE_CATEGORY_PROBABILITIES[category];

        for (index, &probability) in probabilities.iter().enumerate() {
            let shift = probabilities.len() - 1 - index;
            encoder.write_bit(probability, extra >> shift & 1 != 0);
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::lossy::tables::DEFAULT_TOKEN_PROBABILITIES;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    #[test]
    fn every_magnitude_survives_the_token_tree(){
        let probabilities = &DEFAULT_TOKEN_PROBABILITIES[CHROMA];

        let mut encoder = BoolEncoder::new();
        for magnitude in 1 ..= MAX_LEVEL {
            let level = if magnitude % 3 == 0 { -magnitude } else { magnitude };
            let mut levels = [0_i16; 16];
            levels[ZIGZAG[(magnitude % 16) as usize]] = level as i16;
            assert!(write_block(&mut encoder, probabilities, (magnitude % 3) as usize, 0, &levels));
        }

        let bytes = encoder.finish();
        let mut decoder = BoolDecoder::new(&bytes);

        for magnitude in 1 ..= MAX_LEVEL {
            let mut levels = [0_i16; 16];
            assert!(read_block(&mut decoder, probabilities, (magnitude % 3) as usize, 0, &mut levels));

            let expected = if magnitude % 3 == 0 { -magnitude } else { magnitude };
            assert_eq!(i32::from(levels[ZIGZAG[(magnitude % 16) as usize]]), expected);
        }

        decoder.finish().unwrap();
    }

    #[test]
    fn macroblock_levels_round_trip(){
        let mut random = StdRng::seed_from_u64(3);

        for &whole in &[true, false] {
            let mut written = Vec::new();
            let mut encoder = BoolEncoder::new();
            let mut above = TokenContext::default();

            for _ in 0 .. 12 {
                let mut levels = Levels::default();

                for block in levels.blocks.iter_mut() {
                    for level in block.iter_mut() {
                        if random.random_range(0 .. 4) == 0 {
                            *level = random.random_range(-40 .. 40);
                        }
                    }
                }

                // levels that are not coded do not survive
                if whole { for block in &mut levels.blocks[.. 16] { block[0] = 0; } }
                else { levels.blocks[SECOND_ORDER] = [0; 16]; }

                let mut left = TokenContext::default();
                write_levels(&mut encoder, &DEFAULT_TOKEN_PROBABILITIES, &levels, whole, &mut above, &mut left);
                written.push(levels);
            }

            let bytes = encoder.finish();
            let mut decoder = BoolDecoder::new(&bytes);
            let mut above = TokenContext::default();

            for expected in &written {
                let mut left = TokenContext::default();
                let levels = read_levels(&mut decoder, &DEFAULT_TOKEN_PROBABILITIES, whole, &mut above, &mut left);
                assert_eq!(levels.blocks, expected.blocks);
            }

            decoder.finish().unwrap();
        }
    }

    #[test]
    fn dequantized_second_order_dc(){
        let steps = QuantSteps { luma: [10, 20], second_order: [16, 30], chroma: [7, 9] };

        let mut levels = Levels::default();
        levels.blocks[SECOND_ORDER][0] = 4;
        levels.blocks[5][3] = -2;
        levels.blocks[17][0] = 1;
        levels.coded = 1 << 5 | 1 << 17 | 1 << SECOND_ORDER;

        let residual = dequantize(&levels, &steps, true);

        // a lone second order DC spreads evenly over all luma blocks
        assert!(residual.blocks[.. 16].iter().all(|block| block[0] == (64 + 3) >> 3));
        assert_eq!(residual.blocks[5][3], -40);
        assert_eq!(residual.blocks[17][0], 7);

        assert_eq!(residual.non_zero_ac, 1 << 5);
        assert_eq!(residual.non_zero_dc, 0xFFFF | 1 << 17);
        assert!(!residual.is_empty());

        let without_dc = dequantize(&Levels::default(), &steps, false);
        assert!(without_dc.is_empty());
    }

    #[test]
    fn empty_blocks_clear_the_context(){
        let mut context = TokenContext { luma: [1; 4], blue: [1; 2], red: [0, 1], second_order: 1 };
        context.clear(false);
        assert_eq!(context, TokenContext { second_order: 1, .. TokenContext::default() });

        context.clear(true);
        assert_eq!(context, TokenContext::default());
    }
}
