
//! Intra prediction and reconstruction of one macroblock
//! inside a small workspace that also holds the reconstructed samples above and to the left.

use crate::math::{Vec2, clamp_u8};
use super::idct::{inverse_dct, inverse_dct_dc_only};
use super::planes::MacroblockPlanes;
use super::residual::Residual;


const ROWS: usize = 26;
const COLUMNS: usize = 32;

/// Top left luma sample of the macroblock inside the workspace.
pub const LUMA: Vec2<usize> = Vec2(8, 1);

/// Top left blue-difference sample of the macroblock inside the workspace.
pub const BLUE: Vec2<usize> = Vec2(8, 18);

/// Top left red-difference sample of the macroblock inside the workspace.
pub const RED: Vec2<usize> = Vec2(24, 18);

/// Stands in for the missing row above the frame.
const MISSING_ABOVE: u8 = 127;

/// Stands in for the missing column left of the frame.
const MISSING_LEFT: u8 = 129;


/// Prediction of a whole 16x16 luma or 8x8 chroma block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneMode {

    /// The average of the samples above and to the left.
    DC,

    /// Repeat the row above.
    Vertical,

    /// Repeat the column to the left.
    Horizontal,

    /// The left sample plus the gradient of the row above.
    TrueMotion,
}

impl PlaneMode {

    /// Every mode, in the order of the mode trees.
    pub const ALL: [PlaneMode; 4] = [PlaneMode::DC, PlaneMode::Vertical, PlaneMode::Horizontal, PlaneMode::TrueMotion];

    /// The sub-block mode that neighbouring 4x4 blocks use as their context.
    pub fn as_sub_block_mode(self) -> SubBlockMode {
        match self {
            PlaneMode::DC => SubBlockMode::DC,
            PlaneMode::Vertical => SubBlockMode::VE,
            PlaneMode::Horizontal => SubBlockMode::HE,
            PlaneMode::TrueMotion => SubBlockMode::TM,
        }
    }
}

/// Prediction of one 4x4 luma block.
/// The discriminants index the sub-block mode probability table.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubBlockMode {
    DC = 0, TM = 1, VE = 2, HE = 3, LD = 4,
    RD = 5, VR = 6, VL = 7, HD = 8, HU = 9,
}

/// How the luma of a macroblock is predicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LumaPrediction {

    /// All 16x16 samples at once, with a second order transform of the DC terms.
    Whole(PlaneMode),

    /// Each 4x4 block on its own, in raster order.
    SubBlocks([SubBlockMode; 16]),
}

/// The prediction modes of one macroblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroblockModes {

    /// Luma prediction.
    pub luma: LumaPrediction,

    /// Prediction of both chroma planes.
    pub chroma: PlaneMode,
}


/// Samples of the current macroblock, with one row above and one column to the left.
/// The luma rows above also reach four samples past the right edge.
#[derive(Clone)]
pub struct Workspace {
    samples: [[u8; COLUMNS]; ROWS],
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("Workspace").finish()
    }
}

impl Default for Workspace {
    fn default() -> Self { Workspace { samples: [[0; COLUMNS]; ROWS] } }
}

impl Workspace {

    /// The sample at the given workspace position.
    #[inline]
    pub fn sample(&self, position: Vec2<usize>) -> u8 {
        self.samples[position.1][position.0]
    }

    /// Fill the borders for the macroblock at the given position.
    /// Macroblocks must be visited in raster order, as the left border
    /// is taken from the previous macroblock in the workspace.
    pub fn prepare(&mut self, planes: &MacroblockPlanes, position: Vec2<usize>) {
        let Vec2(x, y) = position;
        let rows = &mut self.samples;

        if x == 0 {
            for row in &mut rows[.. 17] { row[7] = MISSING_LEFT; }
            for row in &mut rows[17 ..] {
                row[7] = MISSING_LEFT;
                row[23] = MISSING_LEFT;
            }
        }
        else {
            for row in &mut rows[.. 17] { row[7] = row[23]; }
            for row in &mut rows[17 ..] {
                row[7] = row[15];
                row[23] = row[31];
            }
        }

        if y == 0 {
            for sample in &mut rows[0][7 .. 28] { *sample = MISSING_ABOVE; }
            for sample in &mut rows[17][7 .. 16] { *sample = MISSING_ABOVE; }
            for sample in &mut rows[17][23 .. 32] { *sample = MISSING_ABOVE; }
        }
        else {
            let luma_stride = planes.luma_stride();
            let chroma_stride = planes.chroma_stride();

            let above = (16 * y - 1) * luma_stride + 16 * x;
            rows[0][8 .. 24].copy_from_slice(&planes.y[above .. above + 16]);

            // the last macroblock of a row repeats its last sample above instead
            if x + 1 == planes.macroblocks.0 {
                let last = planes.y[above + 15];
                for sample in &mut rows[0][24 .. 28] { *sample = last; }
            }
            else {
                rows[0][24 .. 28].copy_from_slice(&planes.y[above + 16 .. above + 20]);
            }

            let above = (8 * y - 1) * chroma_stride + 8 * x;
            rows[17][8 .. 16].copy_from_slice(&planes.u[above .. above + 8]);
            rows[17][24 .. 32].copy_from_slice(&planes.v[above .. above + 8]);
        }

        // the right column of 4x4 blocks uses the samples above right of the macroblock
        let above_right = [rows[0][24], rows[0][25], rows[0][26], rows[0][27]];
        for &row in &[4, 8, 12] {
            rows[row][24 .. 28].copy_from_slice(&above_right);
        }
    }

    /// Copy the reconstructed macroblock into the planes.
    pub fn store(&self, planes: &mut MacroblockPlanes, position: Vec2<usize>) {
        let Vec2(x, y) = position;
        let luma_stride = planes.luma_stride();
        let chroma_stride = planes.chroma_stride();

        for row in 0 .. 16 {
            let start = (16 * y + row) * luma_stride + 16 * x;
            planes.y[start .. start + 16].copy_from_slice(&self.samples[LUMA.1 + row][LUMA.0 .. LUMA.0 + 16]);
        }

        for row in 0 .. 8 {
            let start = (8 * y + row) * chroma_stride + 8 * x;
            planes.u[start .. start + 8].copy_from_slice(&self.samples[BLUE.1 + row][BLUE.0 .. BLUE.0 + 8]);
            planes.v[start .. start + 8].copy_from_slice(&self.samples[RED.1 + row][RED.0 .. RED.0 + 8]);
        }
    }

    /// Predict a 16x16 luma or 8x8 chroma block.
    /// The availability of neighbours only matters to the DC mode.
    pub fn predict_plane(&mut self, origin: Vec2<usize>, size: usize, mode: PlaneMode, macroblock: Vec2<usize>) {
        let Vec2(x0, y0) = origin;
        let rows = &mut self.samples;

        match mode {
            PlaneMode::DC => {
                let above: u32 = rows[y0 - 1][x0 .. x0 + size].iter().map(|&sample| u32::from(sample)).sum();
                let left: u32 = rows[y0 .. y0 + size].iter().map(|row| u32::from(row[x0 - 1])).sum();
                let shift = size.trailing_zeros();
                let half = size as u32 / 2;

                let average = match (macroblock.1 > 0, macroblock.0 > 0) {
                    (true, true) => (above + left + size as u32) >> (shift + 1),
                    (true, false) => (above + half) >> shift,
                    (false, true) => (left + half) >> shift,
                    (false, false) => 0x80,
                };

                for row in &mut rows[y0 .. y0 + size] {
                    for sample in &mut row[x0 .. x0 + size] { *sample = average as u8; }
                }
            },

            PlaneMode::Vertical => {
                let mut above = [0_u8; 16];
                above[.. size].copy_from_slice(&rows[y0 - 1][x0 .. x0 + size]);

                for row in &mut rows[y0 .. y0 + size] {
                    row[x0 .. x0 + size].copy_from_slice(&above[.. size]);
                }
            },

            PlaneMode::Horizontal => {
                for row in &mut rows[y0 .. y0 + size] {
                    let left = row[x0 - 1];
                    for sample in &mut row[x0 .. x0 + size] { *sample = left; }
                }
            },

            PlaneMode::TrueMotion => {
                let mut above = [0_u8; 16];
                above[.. size].copy_from_slice(&rows[y0 - 1][x0 .. x0 + size]);
                let corner = i32::from(rows[y0 - 1][x0 - 1]);

                for row in &mut rows[y0 .. y0 + size] {
                    let delta = i32::from(row[x0 - 1]) - corner;

                    for (sample, &above) in row[x0 .. x0 + size].iter_mut().zip(&above[.. size]) {
                        *sample = clamp_u8(i32::from(above) + delta);
                    }
                }
            },
        }
    }

    /// Predict a 4x4 luma block from its reconstructed neighbours.
    pub fn predict_sub_block(&mut self, origin: Vec2<usize>, mode: SubBlockMode) {
        let Vec2(x0, y0) = origin;

        let corner = self.samples[y0 - 1][x0 - 1];
        let mut above = [0_u8; 8];
        above.copy_from_slice(&self.samples[y0 - 1][x0 .. x0 + 8]);
        let left = [0, 1, 2, 3].map(|y| self.samples[y0 + y][x0 - 1]);

        let block = predict_sub_block(corner, above, left, mode);

        for (row, predicted) in self.samples[y0 .. y0 + 4].iter_mut().zip(&block) {
            row[x0 .. x0 + 4].copy_from_slice(predicted);
        }
    }

    /// Add the inverse transform of the coefficients to a 4x4 block.
    /// Without AC coefficients, the DC term alone is transformed.
    pub fn add_residual(&mut self, origin: Vec2<usize>, coefficients: &[i16; 16], has_ac: bool) {
        let Vec2(x0, y0) = origin;

        if has_ac {
            let residual = inverse_dct(coefficients);

            for (row, residual) in self.samples[y0 .. y0 + 4].iter_mut().zip(residual.chunks_exact(4)) {
                for (sample, &residual) in row[x0 .. x0 + 4].iter_mut().zip(residual) {
                    *sample = clamp_u8(i32::from(*sample) + residual);
                }
            }
        }
        else {
            let residual = inverse_dct_dc_only(coefficients[0]);

            for row in &mut self.samples[y0 .. y0 + 4] {
                for sample in &mut row[x0 .. x0 + 4] {
                    *sample = clamp_u8(i32::from(*sample) + residual);
                }
            }
        }
    }

    /// Predict the macroblock and add its residual.
    /// The workspace must have been prepared for this position.
    pub fn reconstruct(&mut self, modes: &MacroblockModes, residual: &Residual, position: Vec2<usize>) {
        match modes.luma {
            LumaPrediction::Whole(mode) => {
                self.predict_plane(LUMA, 16, mode, position);

                for block in 0 .. 16 {
                    self.add_luma_residual(block, residual);
                }
            },

            LumaPrediction::SubBlocks(modes) => {
                for (block, &mode) in modes.iter().enumerate() {
                    self.predict_sub_block(luma_block_origin(block), mode);
                    self.add_luma_residual(block, residual);
                }
            },
        }

        for (plane, &origin) in [BLUE, RED].iter().enumerate() {
            self.predict_plane(origin, 8, modes.chroma, position);

            let blocks = 16 + plane * 4 .. 20 + plane * 4;
            let mask = 0xF << blocks.start;

            if residual.non_zero_ac & mask != 0 || residual.non_zero_dc & mask != 0 {
                let has_ac = residual.non_zero_ac & mask != 0;

                for (index, block) in blocks.enumerate() {
                    let origin = Vec2(origin.0 + (index % 2) * 4, origin.1 + (index / 2) * 4);
                    self.add_residual(origin, &residual.blocks[block], has_ac);
                }
            }
        }
    }

    fn add_luma_residual(&mut self, block: usize, residual: &Residual) {
        let bit = 1 << block;

        if residual.non_zero_ac & bit != 0 {
            self.add_residual(luma_block_origin(block), &residual.blocks[block], true);
        }
        else if residual.non_zero_dc & bit != 0 {
            self.add_residual(luma_block_origin(block), &residual.blocks[block], false);
        }
    }
}

/// Workspace position of one of the 16 luma blocks.
#[inline]
pub fn luma_block_origin(block: usize) -> Vec2<usize> {
    Vec2(LUMA.0 + (block % 4) * 4, LUMA.1 + (block / 4) * 4)
}

/// Workspace position of one of the four blocks of a chroma plane.
#[inline]
pub fn chroma_block_origin(plane_origin: Vec2<usize>, block: usize) -> Vec2<usize> {
    Vec2(plane_origin.0 + (block % 2) * 4, plane_origin.1 + (block / 2) * 4)
}


#[inline]
fn average2(a: u8, b: u8) -> u8 {
    ((u16::from(a) + u16::from(b) + 1) >> 1) as u8
}

#[inline]
fn average3(a: u8, b: u8, c: u8) -> u8 {
    ((u16::from(a) + 2 * u16::from(b) + u16::from(c) + 2) >> 2) as u8
}

/// The predicted rows of a 4x4 block, from the sample above left,
/// the eight samples above and above right, and the four samples to the left.
fn predict_sub_block(corner: u8, above: [u8; 8], left: [u8; 4], mode: SubBlockMode) -> [[u8; 4]; 4] {
    let p = corner;
    let [a0, a1, a2, a3, a4, a5, a6, a7] = above;
    let [l0, l1, l2, l3] = left;

    match mode {
        SubBlockMode::DC => {
            let sum: u32 = above[.. 4].iter().chain(&left).map(|&sample| u32::from(sample)).sum();
            [[((sum + 4) >> 3) as u8; 4]; 4]
        },

        SubBlockMode::TM => {
            let mut block = [[0; 4]; 4];
            for (row, &left) in block.iter_mut().zip(&left) {
                for (sample, &above) in row.iter_mut().zip(&above[.. 4]) {
                    *sample = clamp_u8(i32::from(left) + i32::from(above) - i32::from(p));
                }
            }
            block
        },

        SubBlockMode::VE => [[
            average3(p, a0, a1), average3(a0, a1, a2),
            average3(a1, a2, a3), average3(a2, a3, a4),
        ]; 4],

        SubBlockMode::HE => [
            [average3(p, l0, l1); 4],
            [average3(l0, l1, l2); 4],
            [average3(l1, l2, l3); 4],
            [average3(l2, l3, l3); 4],
        ],

        SubBlockMode::LD => {
            let mut block = [[0; 4]; 4];
            for (y, row) in block.iter_mut().enumerate() {
                for (x, sample) in row.iter_mut().enumerate() {
                    let i = x + y;
                    *sample = if i < 6 { average3(above[i], above[i + 1], above[i + 2]) }
                        else { average3(a6, a7, a7) };
                }
            }
            block
        },

        SubBlockMode::RD => {
            let edge = [l3, l2, l1, l0, p, a0, a1, a2, a3];
            let mut block = [[0; 4]; 4];
            for (y, row) in block.iter_mut().enumerate() {
                for (x, sample) in row.iter_mut().enumerate() {
                    let i = 3 + x - y;
                    *sample = average3(edge[i], edge[i + 1], edge[i + 2]);
                }
            }
            block
        },

        SubBlockMode::VR => [
            [average2(p, a0), average2(a0, a1), average2(a1, a2), average2(a2, a3)],
            [average3(l0, p, a0), average3(p, a0, a1), average3(a0, a1, a2), average3(a1, a2, a3)],
            [average3(l1, l0, p), average2(p, a0), average2(a0, a1), average2(a1, a2)],
            [average3(l2, l1, l0), average3(l0, p, a0), average3(p, a0, a1), average3(a0, a1, a2)],
        ],

        SubBlockMode::VL => [
            [average2(a0, a1), average2(a1, a2), average2(a2, a3), average2(a3, a4)],
            [average3(a0, a1, a2), average3(a1, a2, a3), average3(a2, a3, a4), average3(a3, a4, a5)],
            [average2(a1, a2), average2(a2, a3), average2(a3, a4), average3(a4, a5, a6)],
            [average3(a1, a2, a3), average3(a2, a3, a4), average3(a3, a4, a5), average3(a5, a6, a7)],
        ],

        SubBlockMode::HD => [
            [average2(l0, p), average3(l0, p, a0), average3(p, a0, a1), average3(a0, a1, a2)],
            [average2(l1, l0), average3(l1, l0, p), average2(l0, p), average3(l0, p, a0)],
            [average2(l2, l1), average3(l2, l1, l0), average2(l1, l0), average3(l1, l0, p)],
            [average2(l3, l2), average3(l3, l2, l1), average2(l2, l1), average3(l2, l1, l0)],
        ],

        SubBlockMode::HU => [
            [average2(l0, l1), average3(l0, l1, l2), average2(l1, l2), average3(l1, l2, l3)],
            [average2(l1, l2), average3(l1, l2, l3), average2(l2, l3), average3(l2, l3, l3)],
            [average2(l2, l3), average3(l2, l3, l3), l3, l3],
            [l3; 4],
        ],
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_macroblock_sees_missing_neighbours(){
        let planes = MacroblockPlanes::new(Vec2(2, 2));
        let mut workspace = Workspace::default();
        workspace.prepare(&planes, Vec2(0, 0));

        assert_eq!(workspace.sample(Vec2(LUMA.0 - 1, LUMA.1 - 1)), MISSING_ABOVE);
        assert_eq!(workspace.sample(Vec2(LUMA.0 + 19, LUMA.1 - 1)), MISSING_ABOVE);
        assert_eq!(workspace.sample(Vec2(LUMA.0 - 1, LUMA.1 + 5)), MISSING_LEFT);
        assert_eq!(workspace.sample(Vec2(RED.0 - 1, RED.1 + 7)), MISSING_LEFT);

        // without any neighbour, DC predicts the middle gray
        workspace.predict_plane(LUMA, 16, PlaneMode::DC, Vec2(0, 0));
        assert_eq!(workspace.sample(LUMA), 0x80);

        // true motion at the top edge extends the left column
        workspace.predict_plane(BLUE, 8, PlaneMode::TrueMotion, Vec2(0, 0));
        assert_eq!(workspace.sample(BLUE), MISSING_LEFT);
    }

    #[test]
    fn neighbours_come_from_the_planes(){
        let mut planes = MacroblockPlanes::new(Vec2(2, 2));
        for (index, sample) in planes.y.iter_mut().enumerate() { *sample = (index % 251) as u8; }
        for sample in &mut planes.u { *sample = 60; }

        let mut workspace = Workspace::default();
        workspace.prepare(&planes, Vec2(1, 1));

        let stride = planes.luma_stride();
        assert_eq!(workspace.sample(Vec2(LUMA.0 + 3, 0)), planes.y[15 * stride + 16 + 3]);
        assert_eq!(workspace.sample(Vec2(LUMA.0 + 17, 0)), planes.y[15 * stride + 31], "last column repeats");
        assert_eq!(workspace.sample(Vec2(LUMA.0 + 17, 8)), planes.y[15 * stride + 31]);
        assert_eq!(workspace.sample(Vec2(BLUE.0, BLUE.1 - 1)), 60);

        workspace.predict_plane(LUMA, 16, PlaneMode::Vertical, Vec2(1, 1));
        assert_eq!(workspace.sample(Vec2(LUMA.0 + 3, LUMA.1 + 15)), planes.y[15 * stride + 16 + 3]);
    }

    #[test]
    fn stored_macroblocks_round_trip(){
        let mut planes = MacroblockPlanes::new(Vec2(1, 1));
        let mut workspace = Workspace::default();
        workspace.prepare(&planes, Vec2(0, 0));

        let modes = MacroblockModes { luma: LumaPrediction::Whole(PlaneMode::DC), chroma: PlaneMode::DC };
        let mut residual = Residual::default();
        residual.blocks[16][0] = 80;
        residual.non_zero_dc = 1 << 16;

        workspace.reconstruct(&modes, &residual, Vec2(0, 0));
        workspace.store(&mut planes, Vec2(0, 0));

        assert!(planes.y.iter().all(|&sample| sample == 0x80));
        assert_eq!(planes.u[0], 0x80 + 10);
        assert_eq!(planes.u[4], 0x80, "only the first chroma block has a residual");
        assert!(planes.v.iter().all(|&sample| sample == 0x80));
    }

    #[test]
    fn sub_block_modes(){
        let above = [10, 20, 30, 40, 50, 60, 70, 80];
        let left = [12, 14, 16, 18];

        assert_eq!(predict_sub_block(0, above, left, SubBlockMode::DC), [[20; 4]; 4]);
        assert_eq!(predict_sub_block(10, above, left, SubBlockMode::TM)[3], [18, 28, 38, 48]);
        assert_eq!(predict_sub_block(10, above, left, SubBlockMode::HU)[3], [18; 4]);
        assert_eq!(predict_sub_block(10, above, left, SubBlockMode::LD)[3][3], 78);

        let down_right = predict_sub_block(10, above, left, SubBlockMode::RD);
        for i in 0 .. 3 { assert_eq!(down_right[i][i], down_right[i + 1][i + 1]); }
    }
}
