
//! The per-macroblock header in the first partition: segment, skip flag and prediction modes.
//! Sub-block modes are coded against the modes of the blocks above and to the left.

use super::bool_coder::{BoolDecoder, BoolEncoder};
use super::header::FrameHeader;
use super::predict::{LumaPrediction, MacroblockModes, PlaneMode, SubBlockMode};
use super::tables::{CHROMA_MODE_PROBABILITIES, LUMA_MODE_PROBABILITIES, SUB_BLOCK_MODE_PROBABILITIES};


/// Everything the first partition says about one macroblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroblockHeader {

    /// Selects quantizer and filter strength.
    pub segment: usize,

    /// Whether the macroblock has no tokens at all.
    pub skip_coefficients: bool,

    /// How luma and chroma are predicted.
    pub modes: MacroblockModes,
}

/// The sub-block modes bordering the current macroblock.
/// Macroblocks predicted as a whole count as four blocks of the equivalent sub-block mode.
#[derive(Debug, Clone)]
pub struct ModeContext {
    above: Vec<[SubBlockMode; 4]>,
    left: [SubBlockMode; 4],
}

impl ModeContext {

    /// Contexts for a frame that is `width` macroblocks wide.
    pub fn new(width: usize) -> Self {
        ModeContext { above: vec![[SubBlockMode::DC; 4]; width], left: [SubBlockMode::DC; 4] }
    }

    /// Reset the left context at the start of each macroblock row.
    pub fn start_row(&mut self) {
        self.left = [SubBlockMode::DC; 4];
    }

    /// Parse the header of the macroblock in column `x`.
    pub fn read(&mut self, decoder: &mut BoolDecoder<'_>, frame: &FrameHeader, x: usize) -> MacroblockHeader {
        let segment = frame.segments.read_segment(decoder).unwrap_or(0);
        let skip_coefficients = frame.skip_probability.map_or(false, |probability| decoder.read_bit(probability));

        let [sub_blocks, root, low, high] = LUMA_MODE_PROBABILITIES;
        let luma = if !decoder.read_bit(sub_blocks) {
            let above = &mut self.above[x];
            let left = &mut self.left;
            let mut modes = [SubBlockMode::DC; 16];

            for (index, mode) in modes.iter_mut().enumerate() {
                let (column, row) = (index % 4, index / 4);
                let probabilities = &SUB_BLOCK_MODE_PROBABILITIES[above[column] as usize][left[row] as usize];

                *mode = read_sub_block_mode(decoder, probabilities);
                above[column] = *mode;
                left[row] = *mode;
            }

            LumaPrediction::SubBlocks(modes)
        }
        else {
            let mode =
                if !decoder.read_bit(root) {
                    if !decoder.read_bit(low) { PlaneMode::DC } else { PlaneMode::Vertical }
                }
                else if !decoder.read_bit(high) { PlaneMode::Horizontal }
                else { PlaneMode::TrueMotion };

            self.above[x] = [mode.as_sub_block_mode(); 4];
            self.left = [mode.as_sub_block_mode(); 4];
            LumaPrediction::Whole(mode)
        };

        let [dc, vertical, horizontal] = CHROMA_MODE_PROBABILITIES;
        let chroma =
            if !decoder.read_bit(dc) { PlaneMode::DC }
            else if !decoder.read_bit(vertical) { PlaneMode::Vertical }
            else if !decoder.read_bit(horizontal) { PlaneMode::Horizontal }
            else { PlaneMode::TrueMotion };

        MacroblockHeader { segment, skip_coefficients, modes: MacroblockModes { luma, chroma } }
    }

    /// Write the header of the macroblock in column `x`, for a frame without segment map.
    pub fn write(&mut self, encoder: &mut BoolEncoder, frame: &FrameHeader, x: usize, header: &MacroblockHeader) {
        debug_assert!(!frame.segments.update_map, "segment maps are not written");

        if let Some(probability) = frame.skip_probability {
            encoder.write_bit(probability, header.skip_coefficients);
        }

        let [sub_blocks, root, low, high] = LUMA_MODE_PROBABILITIES;
        match header.modes.luma {
            LumaPrediction::SubBlocks(modes) => {
                encoder.write_bit(sub_blocks, false);
                let above = &mut self.above[x];
                let left = &mut self.left;

                for (index, &mode) in modes.iter().enumerate() {
                    let (column, row) = (index % 4, index / 4);
                    let probabilities = &SUB_BLOCK_MODE_PROBABILITIES[above[column] as usize][left[row] as usize];

                    write_sub_block_mode(encoder, probabilities, mode);
                    above[column] = mode;
                    left[row] = mode;
                }
            },

            LumaPrediction::Whole(mode) => {
                encoder.write_bit(sub_blocks, true);

                match mode {
                    PlaneMode::DC => { encoder.write_bit(root, false); encoder.write_bit(low, false); },
                    PlaneMode::Vertical => { encoder.write_bit(root, false); encoder.write_bit(low, true); },
                    PlaneMode::Horizontal => { encoder.write_bit(root, true); encoder.write_bit(high, false); },
                    PlaneMode::TrueMotion => { encoder.write_bit(root, true); encoder.write_bit(high, true); },
                }

                self.above[x] = [mode.as_sub_block_mode(); 4];
                self.left = [mode.as_sub_block_mode(); 4];
            },
        }

        let path: &[(usize, bool)] = match header.modes.chroma {
            PlaneMode::DC => &[(0, false)],
            PlaneMode::Vertical => &[(0, true), (1, false)],
            PlaneMode::Horizontal => &[(0, true), (1, true), (2, false)],
            PlaneMode::TrueMotion => &[(0, true), (1, true), (2, true)],
        };

        for &(index, bit) in path {
            encoder.write_bit(CHROMA_MODE_PROBABILITIES[index], bit);
        }
    }
}


/// The branches of the sub-block mode tree leading to each mode, as probability index and bit.
fn sub_block_mode_path(mode: SubBlockMode) -> &'static [(usize, bool)] {
    match mode {
        SubBlockMode::DC => &[(0, false)],
        SubBlockMode::TM => &[(0, true), (1, false)],
        SubBlockMode::VE => &[(0, true), (1, true), (2, false)],
        SubBlockMode::HE => &[(0, true), (1, true), (2, true), (3, false), (4, false)],
        SubBlockMode::RD => &[(0, true), (1, true), (2, true), (3, false), (4, true), (5, false)],
        SubBlockMode::VR => &[(0, true), (1, true), (2, true), (3, false), (4, true), (5, true)],
        SubBlockMode::LD => &[(0, true), (1, true), (2, true), (3, true), (6, false)],
        SubBlockMode::VL => &[(0, true), (1, true), (2, true), (3, true), (6, true), (7, false)],
        SubBlockMode::HD => &[(0, true), (1, true), (2, true), (3, true), (6, true), (7, true), (8, false)],
        SubBlockMode::HU => &[(0, true), (1, true), (2, true), (3, true), (6, true), (7, true), (8, true)],
    }
}

fn read_sub_block_mode(decoder: &mut BoolDecoder<'_>, probabilities: &[u8; 9]) -> SubBlockMode {
    let mut bit = |index: usize| decoder.read_bit(probabilities[index]);

    if !bit(0) { SubBlockMode::DC }
    else if !bit(1) { SubBlockMode::TM }
    else if !bit(2) { SubBlockMode::VE }
    else if !bit(3) {
        if !bit(4) { SubBlockMode::HE }
        else if !bit(5) { SubBlockMode::RD }
        else { SubBlockMode::VR }
    }
    else if !bit(6) { SubBlockMode::LD }
    else if !bit(7) { SubBlockMode::VL }
    else if !bit(8) { SubBlockMode::HD }
    else { SubBlockMode::HU }
}

fn write_sub_block_mode(encoder: &mut BoolEncoder, probabilities: &[u8; 9], mode: SubBlockMode) {
    for &(index, bit) in sub_block_mode_path(mode) {
        encoder.write_bit(probabilities[index], bit);
    }
}
