
//! The `ALPH` chunk, which adds transparency to a lossy image.
//! The plane is stored raw or as the green channel of a headerless lossless stream,
//! optionally after a spatial prediction filter.

use bit_field::BitField;
use log::debug;
use crate::error::{Error, Result, UNEXPECTED_END_OF_STREAM};
use crate::image::{Rgba, RgbaImage};
use crate::io::take_1;
use crate::lossless::{self, LosslessOptions};
use crate::math::{Vec2, clamp_u8};


/// How the alpha samples are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlphaCompression {

    /// One byte per sample.
    Raw,

    /// The green channel of a lossless stream without header.
    Lossless,
}

/// The spatial prediction applied before compression. Each sample stores the difference to its prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlphaFilter {

    /// Samples are stored as they are.
    None,

    /// Predict from the left neighbour.
    Horizontal,

    /// Predict from the neighbour above.
    Vertical,

    /// Predict the clamped gradient `left + above - above left`.
    Gradient,
}

/// The first byte of the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphaHeader {

    /// How the samples are stored.
    pub compression: AlphaCompression,

    /// How the samples are predicted.
    pub filter: AlphaFilter,

    /// Whether the encoder reduced the number of alpha levels. Only a hint.
    pub level_reduction: bool,
}

impl AlphaHeader {

    /// Parse the header byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        let compression = match byte.get_bits(0 .. 2) {
            0 => AlphaCompression::Raw,
            1 => AlphaCompression::Lossless,
            _ => return Err(Error::unsupported("alpha compression method")),
        };

        let filter = match byte.get_bits(2 .. 4) {
            0 => AlphaFilter::None,
            1 => AlphaFilter::Horizontal,
            2 => AlphaFilter::Vertical,
            _ => AlphaFilter::Gradient,
        };

        Ok(AlphaHeader { compression, filter, level_reduction: byte.get_bits(4 .. 6) == 1 })
    }

    /// Serialize the header byte.
    pub fn to_byte(&self) -> u8 {
        let mut byte = 0_u8;

        byte.set_bits(0 .. 2, match self.compression {
            AlphaCompression::Raw => 0,
            AlphaCompression::Lossless => 1,
        });

        byte.set_bits(2 .. 4, match self.filter {
            AlphaFilter::None => 0,
            AlphaFilter::Horizontal => 1,
            AlphaFilter::Vertical => 2,
            AlphaFilter::Gradient => 3,
        });

        byte.set_bits(4 .. 6, u8::from(self.level_reduction));
        byte
    }
}


/// Decode the alpha plane of an image of the given size from the chunk payload.
pub fn decode(data: &[u8], size: Vec2<usize>) -> Result<Vec<u8>> {
    let mut data = data;
    let header = AlphaHeader::from_byte(take_1(&mut data)?)?;
    debug!("alpha plane: {:?}", header);

    let mut samples = match header.compression {
        AlphaCompression::Raw => {
            let samples = data.get(.. size.area()).ok_or_else(|| Error::invalid(UNEXPECTED_END_OF_STREAM))?;
            samples.to_vec()
        },

        AlphaCompression::Lossless => {
            let image = lossless::decode_headerless(data, size)?;
            image.pixels.iter().map(|pixel| pixel[1]).collect()
        },
    };

    unfilter(&mut samples, size.0, header.filter);
    Ok(samples)
}

/// Encode the alpha plane as a chunk payload, as a lossless stream after the given filter.
pub fn encode(samples: &[u8], size: Vec2<usize>, filter: AlphaFilter, options: &LosslessOptions) -> Result<Vec<u8>> {
    if samples.len() != size.area() {
        return Err(Error::invalid("alpha sample count does not match image size"));
    }

    let filtered = apply_filter(samples, size.0, filter);
    let pixels: Vec<Rgba> = filtered.iter().map(|&alpha| [0, alpha, 0, 255]).collect();
    let image = RgbaImage::new(size, pixels)?;

    let header = AlphaHeader { compression: AlphaCompression::Lossless, filter, level_reduction: false };
    let mut bytes = vec![header.to_byte()];
    bytes.extend(lossless::encode_headerless(&image, options)?);
    Ok(bytes)
}


/// The prediction of the sample at `(x, y)` from already reconstructed samples of the same plane.
#[inline]
fn prediction(samples: &[u8], width: usize, x: usize, y: usize, filter: AlphaFilter) -> u8 {
    let index = y * width + x;

    match (filter, x, y) {
        (AlphaFilter::None, _, _) | (_, 0, 0) => 0,

        // the first row always predicts from the left, the first column from above
        (_, _, 0) => samples[index - 1],
        (_, 0, _) => samples[index - width],

        (AlphaFilter::Horizontal, _, _) => samples[index - 1],
        (AlphaFilter::Vertical, _, _) => samples[index - width],
        (AlphaFilter::Gradient, _, _) => {
            let left = i32::from(samples[index - 1]);
            let above = i32::from(samples[index - width]);
            let above_left = i32::from(samples[index - width - 1]);
            clamp_u8(left + above - above_left)
        },
    }
}

/// Add the predictions back, in raster order.
pub fn unfilter(samples: &mut [u8], width: usize, filter: AlphaFilter) {
    if filter == AlphaFilter::None || width == 0 { return; }

    for index in 0 .. samples.len() {
        let predicted = prediction(samples, width, index % width, index / width, filter);
        samples[index] = samples[index].wrapping_add(predicted);
    }
}

/// Replace each sample by its difference to the prediction from the original samples.
pub fn apply_filter(samples: &[u8], width: usize, filter: AlphaFilter) -> Vec<u8> {
    if filter == AlphaFilter::None || width == 0 { return samples.to_vec(); }

    samples.iter().enumerate()
        .map(|(index, &sample)| sample.wrapping_sub(prediction(samples, width, index % width, index / width, filter)))
        .collect()
}


#[cfg(test)]
mod test {
    use super::*;

    fn plane(size: Vec2<usize>) -> Vec<u8> {
        (0 .. size.area()).map(|index| ((index * 37) % 251) as u8 ^ ((index / size.0) as u8)).collect()
    }

    #[test]
    fn header_byte(){
        let header = AlphaHeader { compression: AlphaCompression::Lossless, filter: AlphaFilter::Gradient, level_reduction: true };
        assert_eq!(header.to_byte(), 0b0001_1101);
        assert_eq!(AlphaHeader::from_byte(0b0001_1101).unwrap(), header);

        assert!(matches!(AlphaHeader::from_byte(2), Err(Error::NotSupported(_))));
        assert!(matches!(AlphaHeader::from_byte(3), Err(Error::NotSupported(_))));
    }

    #[test]
    fn filters_are_reversible(){
        let size = Vec2(13, 7);
        let samples = plane(size);

        for &filter in &[AlphaFilter::None, AlphaFilter::Horizontal, AlphaFilter::Vertical, AlphaFilter::Gradient] {
            let mut filtered = apply_filter(&samples, size.0, filter);
            unfilter(&mut filtered, size.0, filter);
            assert_eq!(filtered, samples, "{:?}", filter);
        }
    }

    #[test]
    fn raw_planes(){
        let mut data = vec![AlphaHeader { compression: AlphaCompression::Raw, filter: AlphaFilter::Horizontal, level_reduction: false }.to_byte()];
        data.extend_from_slice(&[10, 1, 1, 5, 0, 0]);

        assert_eq!(decode(&data, Vec2(3, 2)).unwrap(), vec![10, 11, 12, 15, 15, 15]);
        assert!(decode(&data[.. 5], Vec2(3, 2)).is_err());
    }

    #[test]
    fn lossless_planes_round_trip(){
        let size = Vec2(21, 9);
        let samples = plane(size);

        for &filter in &[AlphaFilter::None, AlphaFilter::Gradient] {
            let bytes = encode(&samples, size, filter, &LosslessOptions::default()).unwrap();
            assert_eq!(decode(&bytes, size).unwrap(), samples);
        }

        assert!(encode(&samples[1 ..], size, AlphaFilter::None, &LosslessOptions::default()).is_err());
    }
}
