
//! The four reversible pixel transforms of the lossless bitstream.
//! The encoder applies them in registration order, the decoder undoes them in reverse.

use std::collections::HashMap;
use bit_field::BitField;
use log::trace;
use crate::error::{Error, Result, PALETTE_TOO_LARGE};
use crate::image::Rgba;
use crate::math::{Vec2, tile_count, clamp_u8, abs_diff};


/// Tile size exponent used by the encoder for the predictor transform.
pub const PREDICTOR_TILE_BITS: u32 = 4;

/// Tile size exponent used by the encoder for the cross-color transform.
pub const CROSS_COLOR_TILE_BITS: u32 = 5;

/// Number of distinct predictor modes the encoder chooses from.
pub const PREDICTOR_MODE_COUNT: u8 = 14;

/// The largest palette the color-indexing transform can carry.
pub const MAX_PALETTE_SIZE: usize = 256;


/// The kind of a transform, with the two-bit code used in the bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {

    /// Spatial prediction from already decoded neighbours.
    Predictor = 0,

    /// Decorrelation of red and blue from green.
    CrossColor = 1,

    /// Green is subtracted from red and blue.
    SubtractGreen = 2,

    /// Pixels are replaced by packed palette indices.
    ColorIndexing = 3,
}

impl TransformKind {

    /// All kinds, in the order the encoder registers them.
    pub const ENCODING_ORDER: [TransformKind; 4] = [
        TransformKind::ColorIndexing, TransformKind::SubtractGreen,
        TransformKind::CrossColor, TransformKind::Predictor,
    ];

    /// Interpret the two-bit transform code.
    pub fn from_code(code: u32) -> Self {
        match code & 3 {
            0 => TransformKind::Predictor,
            1 => TransformKind::CrossColor,
            2 => TransformKind::SubtractGreen,
            _ => TransformKind::ColorIndexing,
        }
    }

    /// The two-bit transform code.
    pub fn code(self) -> u32 {
        self as u32
    }
}


/// A set of transform kinds, stored as one bit per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TransformSet {
    bits: u8,
}

impl TransformSet {

    /// No transform at all.
    pub const NONE: TransformSet = TransformSet { bits: 0 };

    /// Only subtract-green.
    pub const SUBTRACT_GREEN: TransformSet = TransformSet { bits: 1 << 2 };

    /// Predictor and subtract-green, suited to photographic content.
    pub const PHOTOGRAPHIC: TransformSet = TransformSet { bits: 1 << 0 | 1 << 2 };

    /// All spatial and color transforms except the palette.
    pub const ALL_BUT_PALETTE: TransformSet = TransformSet { bits: 1 << 0 | 1 << 1 | 1 << 2 };

    /// Only the color-indexing transform, suited to images with few colors.
    pub const PALETTE: TransformSet = TransformSet { bits: 1 << 3 };

    /// Add a kind to this set.
    pub fn with(mut self, kind: TransformKind) -> Self {
        self.bits.set_bit(kind as usize, true);
        self
    }

    /// Remove a kind from this set.
    pub fn without(mut self, kind: TransformKind) -> Self {
        self.bits.set_bit(kind as usize, false);
        self
    }

    /// Whether the kind is part of this set.
    pub fn contains(self, kind: TransformKind) -> bool {
        self.bits.get_bit(kind as usize)
    }

    /// Whether the set is empty.
    pub fn is_empty(self) -> bool {
        self.bits == 0
    }
}

impl std::iter::FromIterator<TransformKind> for TransformSet {
    fn from_iter<I: IntoIterator<Item = TransformKind>>(kinds: I) -> Self {
        kinds.into_iter().fold(TransformSet::NONE, TransformSet::with)
    }
}


/// A decoded transform together with its auxiliary image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {

    /// Per-tile predictor modes, stored in the green channel.
    Predictor { bits: u32, modes: Vec<Rgba> },

    /// Per-tile color multipliers: red holds red-to-blue,
    /// green holds green-to-blue and blue holds green-to-red.
    CrossColor { bits: u32, multipliers: Vec<Rgba> },

    /// Green was subtracted from red and blue.
    SubtractGreen,

    /// Pixels hold packed indices into this palette.
    /// The palette is already prefix-summed and padded to 256 entries.
    ColorIndexing { bits: u32, original_width: usize, palette: Vec<Rgba> },
}

impl Transform {

    /// The kind of this transform.
    pub fn kind(&self) -> TransformKind {
        match self {
            Transform::Predictor { .. } => TransformKind::Predictor,
            Transform::CrossColor { .. } => TransformKind::CrossColor,
            Transform::SubtractGreen => TransformKind::SubtractGreen,
            Transform::ColorIndexing { .. } => TransformKind::ColorIndexing,
        }
    }

    /// Undo this transform on pixels of the given width.
    /// Returns the restored pixels and their width.
    pub fn inverse(&self, mut pixels: Vec<Rgba>, width: usize) -> (Vec<Rgba>, usize) {
        match self {
            Transform::Predictor { bits, modes } => {
                inverse_predictor(&mut pixels, width, *bits, modes);
                (pixels, width)
            },

            Transform::CrossColor { bits, multipliers } => {
                inverse_cross_color(&mut pixels, width, *bits, multipliers);
                (pixels, width)
            },

            Transform::SubtractGreen => {
                inverse_subtract_green(&mut pixels);
                (pixels, width)
            },

            Transform::ColorIndexing { bits, original_width, palette } => {
                let expanded = inverse_color_indexing(&pixels, width, *original_width, *bits, palette);
                (expanded, *original_width)
            },
        }
    }
}


#[inline]
fn add_pixels(a: Rgba, b: Rgba) -> Rgba {
    [a[0].wrapping_add(b[0]), a[1].wrapping_add(b[1]), a[2].wrapping_add(b[2]), a[3].wrapping_add(b[3])]
}

#[inline]
fn sub_pixels(a: Rgba, b: Rgba) -> Rgba {
    [a[0].wrapping_sub(b[0]), a[1].wrapping_sub(b[1]), a[2].wrapping_sub(b[2]), a[3].wrapping_sub(b[3])]
}

#[inline]
fn average2(a: Rgba, b: Rgba) -> Rgba {
    std::array::from_fn(|channel| ((u16::from(a[channel]) + u16::from(b[channel])) / 2) as u8)
}

#[inline]
fn select(left: Rgba, top: Rgba, top_left: Rgba) -> Rgba {
    let left_distance: i32 = (0..4).map(|channel| abs_diff(top[channel], top_left[channel])).sum();
    let top_distance: i32 = (0..4).map(|channel| abs_diff(left[channel], top_left[channel])).sum();
    if left_distance < top_distance { left } else { top }
}

#[inline]
fn clamp_add_subtract_full(a: Rgba, b: Rgba, c: Rgba) -> Rgba {
    std::array::from_fn(|channel| clamp_u8(i32::from(a[channel]) + i32::from(b[channel]) - i32::from(c[channel])))
}

#[inline]
fn clamp_add_subtract_half(a: Rgba, b: Rgba) -> Rgba {
    std::array::from_fn(|channel| {
        let a = i32::from(a[channel]);
        clamp_u8(a + (a - i32::from(b[channel])) / 2)
    })
}

const OPAQUE_BLACK: Rgba = [0, 0, 0, 255];

/// Predict the pixel at `index` from its neighbours in the same buffer.
/// The caller guarantees that the pixel is neither in the first row nor in the first column.
#[inline]
fn predict(mode: u8, pixels: &[Rgba], index: usize, width: usize) -> Rgba {
    let left = pixels[index - 1];
    let top = pixels[index - width];
    let top_left = pixels[index - width - 1];

    // in the last column, this is the first pixel of the current row
    let top_right = pixels[index - width + 1];

    match mode {
        1 => left,
        2 => top,
        3 => top_right,
        4 => top_left,
        5 => average2(average2(left, top_right), top),
        6 => average2(left, top_left),
        7 => average2(left, top),
        8 => average2(top_left, top),
        9 => average2(top, top_right),
        10 => average2(average2(left, top_left), average2(top, top_right)),
        11 => select(left, top, top_left),
        12 => clamp_add_subtract_full(left, top, top_left),
        13 => clamp_add_subtract_half(average2(left, top), top_left),
        _ => OPAQUE_BLACK,
    }
}

/// Prediction including the fixed rules of the first row and column.
#[inline]
fn predict_at(mode: u8, pixels: &[Rgba], position: Vec2<usize>, width: usize) -> Rgba {
    let Vec2(x, y) = position;
    let index = y * width + x;

    if x == 0 && y == 0 { OPAQUE_BLACK }
    else if y == 0 { pixels[index - 1] }
    else if x == 0 { pixels[index - width] }
    else { predict(mode, pixels, index, width) }
}

fn tile_index(position: Vec2<usize>, width: usize, bits: u32) -> usize {
    (position.1 >> bits) * tile_count(width, bits) + (position.0 >> bits)
}

fn inverse_predictor(pixels: &mut [Rgba], width: usize, bits: u32, modes: &[Rgba]) {
    if width == 0 { return; }

    for index in 0 .. pixels.len() {
        let position = Vec2(index % width, index / width);
        let mode = modes.get(tile_index(position, width, bits)).map_or(0, |tile| tile[1] & 0xF);
        let prediction = predict_at(mode, pixels, position, width);
        pixels[index] = add_pixels(pixels[index], prediction);
    }
}

#[inline]
fn color_transform_delta(multiplier: u8, color: u8) -> i32 {
    (i32::from(multiplier as i8) * i32::from(color as i8)) >> 5
}

fn inverse_cross_color(pixels: &mut [Rgba], width: usize, bits: u32, multipliers: &[Rgba]) {
    if width == 0 { return; }

    for (index, pixel) in pixels.iter_mut().enumerate() {
        let position = Vec2(index % width, index / width);
        let [red_to_blue, green_to_blue, green_to_red, _] = multipliers
            .get(tile_index(position, width, bits)).copied().unwrap_or_default();

        let [red, green, blue, _] = *pixel;
        let red = (i32::from(red) + color_transform_delta(green_to_red, green)) as u8;
        let blue = i32::from(blue) + color_transform_delta(green_to_blue, green) + color_transform_delta(red_to_blue, red);

        pixel[0] = red;
        pixel[2] = blue as u8;
    }
}

fn inverse_subtract_green(pixels: &mut [Rgba]) {
    for pixel in pixels {
        pixel[0] = pixel[0].wrapping_add(pixel[1]);
        pixel[2] = pixel[2].wrapping_add(pixel[1]);
    }
}

/// Number of palette index bits packed into each green byte, as a power of two exponent.
pub fn palette_packing_bits(palette_size: usize) -> u32 {
    match palette_size {
        0 ..= 2 => 3,
        3 ..= 4 => 2,
        5 ..= 16 => 1,
        _ => 0,
    }
}

fn inverse_color_indexing(packed: &[Rgba], packed_width: usize, width: usize, bits: u32, palette: &[Rgba]) -> Vec<Rgba> {
    let color = |index: u8| palette.get(index as usize).copied().unwrap_or_default();
    if packed_width == 0 { return Vec::new(); }

    let height = packed.len() / packed_width;
    let bits_per_index = 8_usize >> bits;
    let index_mask = ((1_usize << bits_per_index) - 1) as u8;
    let x_mask = (1 << bits) - 1;

    let mut pixels = Vec::with_capacity(width * height);

    for row in packed.chunks_exact(packed_width) {
        for x in 0 .. width {
            let indices = row[x >> bits][1];
            let index = if bits == 0 { indices } else { (indices >> ((x & x_mask) * bits_per_index)) & index_mask };
            pixels.push(color(index));
        }
    }

    pixels
}


/// Replace red and blue with their difference to green.
pub fn subtract_green(pixels: &mut [Rgba]) {
    for pixel in pixels {
        pixel[0] = pixel[0].wrapping_sub(pixel[1]);
        pixel[2] = pixel[2].wrapping_sub(pixel[1]);
    }
}

/// Evaluate one value per tile. Tile rows are distributed over the thread pool if available.
fn map_tiles<F>(tiles: Vec2<usize>, select: &F) -> Vec<Rgba> where F: Fn(Vec2<usize>) -> Rgba + Sync {
    map_tile_rows(0, tiles.height(), tiles.width(), select)
}

#[cfg(feature = "rayon")]
fn map_tile_rows<F>(start: usize, end: usize, width: usize, select: &F) -> Vec<Rgba> where F: Fn(Vec2<usize>) -> Rgba + Sync {
    if end - start <= 1 {
        return (start .. end).flat_map(|y| (0 .. width).map(move |x| select(Vec2(x, y)))).collect();
    }

    let middle = start + (end - start) / 2;
    let (mut upper, lower) = rayon_core::join(
        || map_tile_rows(start, middle, width, select),
        || map_tile_rows(middle, end, width, select),
    );

    upper.extend(lower);
    upper
}

#[cfg(not(feature = "rayon"))]
fn map_tile_rows<F>(start: usize, end: usize, width: usize, select: &F) -> Vec<Rgba> where F: Fn(Vec2<usize>) -> Rgba + Sync {
    (start .. end).flat_map(|y| (0 .. width).map(move |x| select(Vec2(x, y)))).collect()
}

/// Positions of all pixels inside a tile, clipped to the image.
fn tile_pixels(tile: Vec2<usize>, size: Vec2<usize>, bits: u32) -> impl Iterator<Item = Vec2<usize>> {
    let start = tile.map(|coordinate| coordinate << bits);
    let end = Vec2((start.0 + (1 << bits)).min(size.0), (start.1 + (1 << bits)).min(size.1));
    (start.1 .. end.1).flat_map(move |y| (start.0 .. end.0).map(move |x| Vec2(x, y)))
}


/// Choose the cross-color multipliers of each tile and decorrelate the pixels.
/// Returns the multiplier image.
pub fn cross_color(pixels: &mut [Rgba], size: Vec2<usize>, bits: u32) -> Vec<Rgba> {
    let tiles = size.tiles(bits);
    let source: &[Rgba] = pixels;

    let multipliers = map_tiles(tiles, &|tile| {
        let tile_colors: Vec<Rgba> = tile_pixels(tile, size, bits)
            .map(|position| source[position.1 * size.0 + position.0])
            .collect();

        let best = |cost: &dyn Fn(u8) -> u32| -> u8 {
            let mut best = (cost(0), 0_u8);
            for multiplier in (-32_i32 ..= 32).map(|multiplier| multiplier as i8 as u8) {
                let candidate = cost(multiplier);
                if candidate < best.0 { best = (candidate, multiplier); }
            }

            best.1
        };

        let residual_cost = |value: i32| u32::from((value as i8).unsigned_abs());

        let green_to_red = best(&|multiplier| tile_colors.iter()
            .map(|&[red, green, _, _]| residual_cost(i32::from(red) - color_transform_delta(multiplier, green)))
            .sum());

        let green_to_blue = best(&|multiplier| tile_colors.iter()
            .map(|&[_, green, blue, _]| residual_cost(i32::from(blue) - color_transform_delta(multiplier, green)))
            .sum());

        let red_to_blue = best(&|multiplier| tile_colors.iter()
            .map(|&[red, green, blue, _]| residual_cost(
                i32::from(blue) - color_transform_delta(green_to_blue, green) - color_transform_delta(multiplier, red)
            ))
            .sum());

        trace!("cross color tile {:?}: {} {} {}", tile, green_to_red as i8, green_to_blue as i8, red_to_blue as i8);
        [red_to_blue, green_to_blue, green_to_red, 255]
    });

    for (index, pixel) in pixels.iter_mut().enumerate() {
        let position = Vec2(index % size.0, index / size.0);
        let [red_to_blue, green_to_blue, green_to_red, _] = multipliers[tile_index(position, size.0, bits)];
        let [red, green, blue, _] = *pixel;

        pixel[0] = (i32::from(red) - color_transform_delta(green_to_red, green)) as u8;
        pixel[2] = (i32::from(blue) - color_transform_delta(green_to_blue, green) - color_transform_delta(red_to_blue, red)) as u8;
    }

    multipliers
}


type ChannelHistograms = [[u32; 256]; 4];

/// Lower values mean more concentrated residuals.
fn entropy_proxy(accumulated: &ChannelHistograms, tile: &ChannelHistograms) -> f64 {
    accumulated.iter().zip(tile.iter()).map(|(accumulated, tile)| {
        let (sum, squares) = accumulated.iter().zip(tile.iter()).fold((0_u64, 0_u64), |(sum, squares), (&a, &b)| {
            let count = u64::from(a + b);
            (sum + count, squares + count * count)
        });

        if sum == 0 { 0.0 } else { 1.0 - squares as f64 / (sum as f64 * sum as f64) }
    }).sum()
}

fn residual_histograms(pixels: &[Rgba], size: Vec2<usize>, tile: Vec2<usize>, bits: u32, mode: u8) -> Box<ChannelHistograms> {
    let mut histograms = Box::new([[0_u32; 256]; 4]);

    for position in tile_pixels(tile, size, bits) {
        let prediction = predict_at(mode, pixels, position, size.0);
        let residual = sub_pixels(pixels[position.1 * size.0 + position.0], prediction);
        for channel in 0 .. 4 { histograms[channel][residual[channel] as usize] += 1; }
    }

    histograms
}

/// Score a range of modes for one tile and return the best score and mode.
/// Ties are resolved towards the lower mode.
fn best_mode_sequential(pixels: &[Rgba], size: Vec2<usize>, tile: Vec2<usize>, bits: u32, accumulated: &ChannelHistograms, modes: std::ops::Range<u8>) -> (f64, u8) {
    let mut best = (f64::INFINITY, modes.start);

    for mode in modes {
        let score = entropy_proxy(accumulated, &residual_histograms(pixels, size, tile, bits, mode));
        if score < best.0 { best = (score, mode); }
    }

    best
}

#[cfg(feature = "rayon")]
fn best_mode(pixels: &[Rgba], size: Vec2<usize>, tile: Vec2<usize>, bits: u32, accumulated: &ChannelHistograms, modes: std::ops::Range<u8>) -> (f64, u8) {
    if modes.len() <= 2 {
        return best_mode_sequential(pixels, size, tile, bits, accumulated, modes);
    }

    let middle = modes.start + (modes.end - modes.start) / 2;

    let (lower, upper) = rayon_core::join(
        || best_mode(pixels, size, tile, bits, accumulated, modes.start .. middle),
        || best_mode(pixels, size, tile, bits, accumulated, middle .. modes.end),
    );

    if upper.0 < lower.0 { upper } else { lower }
}

#[cfg(not(feature = "rayon"))]
fn best_mode(pixels: &[Rgba], size: Vec2<usize>, tile: Vec2<usize>, bits: u32, accumulated: &ChannelHistograms, modes: std::ops::Range<u8>) -> (f64, u8) {
    best_mode_sequential(pixels, size, tile, bits, accumulated, modes)
}

/// Choose the predictor mode of each tile and replace pixels by their prediction residuals.
/// Returns the mode image.
pub fn predictor(pixels: &mut [Rgba], size: Vec2<usize>, bits: u32) -> Vec<Rgba> {
    let tiles = size.tiles(bits);
    let mut accumulated: Box<ChannelHistograms> = Box::new([[0; 256]; 4]);
    let mut modes = Vec::with_capacity(tiles.area());

    for tile_y in 0 .. tiles.1 {
        for tile_x in 0 .. tiles.0 {
            let tile = Vec2(tile_x, tile_y);
            let (_, mode) = best_mode(pixels, size, tile, bits, &accumulated, 0 .. PREDICTOR_MODE_COUNT);

            let chosen = residual_histograms(pixels, size, tile, bits, mode);
            for (sum, add) in accumulated.iter_mut().zip(chosen.iter()) {
                for (sum, add) in sum.iter_mut().zip(add.iter()) { *sum += add; }
            }

            trace!("predictor tile {:?}: mode {}", tile, mode);
            modes.push([0, mode, 0, 255]);
        }
    }

    // residuals must be computed from the original neighbours
    let residuals: Vec<Rgba> = (0 .. pixels.len()).map(|index| {
        let position = Vec2(index % size.0, index / size.0);
        let mode = modes[tile_index(position, size.0, bits)][1];
        sub_pixels(pixels[index], predict_at(mode, pixels, position, size.0))
    }).collect();

    pixels.copy_from_slice(&residuals);
    modes
}


/// Replace each pixel by its index in a sorted palette, packing several indices into one green byte.
/// Returns the palette, the packed pixels, and the packed width.
pub fn color_indexing(pixels: &[Rgba], size: Vec2<usize>) -> Result<(Vec<Rgba>, Vec<Rgba>, usize)> {
    let mut palette: Vec<Rgba> = Vec::new();
    let mut indices: HashMap<Rgba, u8> = HashMap::new();

    for &pixel in pixels {
        if !indices.contains_key(&pixel) {
            if palette.len() == MAX_PALETTE_SIZE {
                return Err(Error::invalid(PALETTE_TOO_LARGE));
            }

            indices.insert(pixel, 0);
            palette.push(pixel);
        }
    }

    let argb = |[red, green, blue, alpha]: Rgba| u32::from_be_bytes([alpha, red, green, blue]);
    palette.sort_by_key(|&color| argb(color));

    for (index, &color) in palette.iter().enumerate() {
        indices.insert(color, index as u8);
    }

    let bits = palette_packing_bits(palette.len());
    let packed_width = tile_count(size.0, bits);
    let bits_per_index = 8_usize >> bits;
    let x_mask = (1 << bits) - 1;

    let mut packed = vec![[0, 0, 0, 255]; packed_width * size.1];

    for (index, pixel) in pixels.iter().enumerate() {
        let Vec2(x, y) = Vec2(index % size.0, index / size.0);
        let palette_index = indices.get(pixel).copied().unwrap_or_default();
        packed[y * packed_width + (x >> bits)][1] |= palette_index << ((x & x_mask) * bits_per_index);
    }

    Ok((palette, packed, packed_width))
}

/// Replace each palette entry but the first by its difference to the previous entry.
pub fn delta_code_palette(palette: &[Rgba]) -> Vec<Rgba> {
    let mut deltas = palette.to_vec();
    for index in (1 .. deltas.len()).rev() {
        deltas[index] = sub_pixels(palette[index], palette[index - 1]);
    }

    deltas
}

/// Undo the delta coding and pad the palette to its maximum size with transparent black.
pub fn expand_palette(deltas: &[Rgba]) -> Vec<Rgba> {
    let mut palette = vec![[0; 4]; MAX_PALETTE_SIZE.max(deltas.len())];

    let mut previous = [0; 4];
    for (entry, &delta) in palette.iter_mut().zip(deltas) {
        previous = add_pixels(previous, delta);
        *entry = previous;
    }

    palette
}


#[cfg(test)]
mod test {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    fn random_pixels(rng: &mut StdRng, size: Vec2<usize>) -> Vec<Rgba> {
        (0 .. size.area()).map(|_| {
            let base: u8 = rng.random_range(100 .. 140);
            [base, base.wrapping_add(rng.random_range(0 .. 8)), base / 2, rng.random()]
        }).collect()
    }

    #[test]
    fn transform_set_bits(){
        let set = TransformSet::NONE.with(TransformKind::Predictor).with(TransformKind::ColorIndexing);
        assert!(set.contains(TransformKind::Predictor));
        assert!(set.contains(TransformKind::ColorIndexing));
        assert!(!set.contains(TransformKind::CrossColor));
        assert!(set.without(TransformKind::Predictor).without(TransformKind::ColorIndexing).is_empty());

        let collected: TransformSet = vec![TransformKind::Predictor, TransformKind::SubtractGreen].into_iter().collect();
        assert_eq!(collected, TransformSet::PHOTOGRAPHIC);

        for kind in TransformKind::ENCODING_ORDER.iter().copied() {
            assert_eq!(TransformKind::from_code(kind.code()), kind);
        }
    }

    #[test]
    fn subtract_green_is_reversible(){
        let mut rng = StdRng::seed_from_u64(1);
        let original = random_pixels(&mut rng, Vec2(9, 7));

        let mut pixels = original.clone();
        subtract_green(&mut pixels);
        assert_ne!(pixels, original);

        let (restored, width) = Transform::SubtractGreen.inverse(pixels, 9);
        assert_eq!(width, 9);
        assert_eq!(restored, original);
    }

    #[test]
    fn predictor_is_reversible(){
        let mut rng = StdRng::seed_from_u64(2);

        for &size in &[Vec2(1, 1), Vec2(37, 19), Vec2(16, 16), Vec2(1, 20), Vec2(20, 1)] {
            let original = random_pixels(&mut rng, size);

            let mut pixels = original.clone();
            let modes = predictor(&mut pixels, size, PREDICTOR_TILE_BITS);
            assert_eq!(modes.len(), size.tiles(PREDICTOR_TILE_BITS).area());

            let transform = Transform::Predictor { bits: PREDICTOR_TILE_BITS, modes };
            assert_eq!(transform.inverse(pixels, size.0).0, original);
        }
    }

    #[test]
    fn every_predictor_mode_is_reversible(){
        let mut rng = StdRng::seed_from_u64(3);
        let size = Vec2(13, 6);
        let original = random_pixels(&mut rng, size);

        for mode in 0 .. 16 {
            let modes = vec![[0, mode, 0, 255]; size.tiles(2).area()];
            let residuals: Vec<Rgba> = (0 .. original.len())
                .map(|index| sub_pixels(original[index], predict_at(mode, &original, Vec2(index % 13, index / 13), 13)))
                .collect();

            let transform = Transform::Predictor { bits: 2, modes };
            assert_eq!(transform.inverse(residuals, 13).0, original, "mode {}", mode);
        }
    }

    #[test]
    fn cross_color_is_reversible(){
        let mut rng = StdRng::seed_from_u64(4);
        let size = Vec2(70, 40);
        let original = random_pixels(&mut rng, size);

        let mut pixels = original.clone();
        let multipliers = cross_color(&mut pixels, size, CROSS_COLOR_TILE_BITS);

        let transform = Transform::CrossColor { bits: CROSS_COLOR_TILE_BITS, multipliers };
        assert_eq!(transform.inverse(pixels, size.0).0, original);
    }

    #[test]
    fn color_indexing_is_reversible(){
        let colors: [Rgba; 5] = [[1, 2, 3, 255], [200, 0, 0, 255], [0, 0, 0, 0], [9, 9, 9, 9], [5, 4, 3, 2]];

        for &color_count in &[1_usize, 2, 3, 4, 5] {
            let size = Vec2(11, 3);
            let original: Vec<Rgba> = (0 .. size.area()).map(|index| colors[index * 7 % color_count]).collect();

            let (palette, packed, packed_width) = color_indexing(&original, size).unwrap();
            let bits = palette_packing_bits(palette.len());
            assert_eq!(packed_width, tile_count(11, bits));

            let transform = Transform::ColorIndexing {
                bits, original_width: size.0,
                palette: expand_palette(&delta_code_palette(&palette)),
            };

            assert_eq!(transform.inverse(packed, packed_width), (original, size.0));
        }
    }

    #[test]
    fn palette_packing_widths(){
        assert_eq!(tile_count(16, palette_packing_bits(2)), 2);
        assert_eq!(tile_count(16, palette_packing_bits(4)), 4);
        assert_eq!(tile_count(16, palette_packing_bits(16)), 8);
        assert_eq!(tile_count(16, palette_packing_bits(17)), 16);
    }

    #[test]
    fn too_many_colors(){
        let pixels: Vec<Rgba> = (0 .. 257_u32).map(|index| [index as u8, (index >> 8) as u8, 0, 255]).collect();
        let result = color_indexing(&pixels, Vec2(257, 1));
        assert!(matches!(result, Err(Error::Invalid(message)) if message == PALETTE_TOO_LARGE));
    }

    #[test]
    fn select_prefers_smaller_gradient(){
        let left = [10, 10, 10, 10];
        let top = [200, 200, 200, 200];
        let top_left = [190, 190, 190, 190];

        // top is close to top left, so the horizontal gradient is small and left wins
        assert_eq!(select(left, top, top_left), left);
        assert_eq!(select(left, top, [20, 20, 20, 20]), top);
    }
}
