
//! Apply the selected transforms and write the entropy-coded pixels of a lossless stream.

use log::debug;
use crate::bits::BitWriter;
use crate::error::{Error, Result};
use crate::huffman::{HuffmanCodes, MAX_CODE_LENGTH};
use crate::image::{Rgba, RgbaImage, MAX_IMAGE_SIZE};
use crate::math::Vec2;
use super::cache::{ColorCache, MAX_CACHE_BITS};
use super::lz77::{tokenize, Prefix, Symbol, DISTANCE_SYMBOL_COUNT};
use super::transform::*;
use super::{Header, LENGTH_CODES, LITERAL_ALPHABET_SIZE};


/// How the lossless encoder compresses the pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LosslessOptions {

    /// Number of color cache index bits. Zero disables the cache.
    pub color_cache_bits: u8,

    /// Which transforms to apply before entropy coding.
    pub transforms: TransformSet,
}

impl Default for LosslessOptions {
    fn default() -> Self {
        LosslessOptions { color_cache_bits: 4, transforms: TransformSet::PHOTOGRAPHIC }
    }
}

impl LosslessOptions {

    /// Returns an error if the cache size is out of range.
    pub fn validate(&self) -> Result<()> {
        if u32::from(self.color_cache_bits) > MAX_CACHE_BITS {
            return Err(Error::invalid("color cache bits must be at most 11"));
        }

        Ok(())
    }
}


/// Encode the image as a complete lossless stream, padded to an even length.
pub fn encode(image: &RgbaImage, options: &LosslessOptions) -> Result<Vec<u8>> {
    let mut writer = BitWriter::new();
    Header { size: image.size, alpha_hint: image.has_alpha() }.write(&mut writer)?;
    encode_image_stream(&mut writer, image, options)?;

    let mut bytes = writer.into_bytes();
    if bytes.len() % 2 == 1 { bytes.push(0); }
    Ok(bytes)
}

/// Encode the image without the header, as embedded in alpha chunks.
pub fn encode_headerless(image: &RgbaImage, options: &LosslessOptions) -> Result<Vec<u8>> {
    image.size.validate(MAX_IMAGE_SIZE, "lossless image size")?;

    let mut writer = BitWriter::new();
    encode_image_stream(&mut writer, image, options)?;
    Ok(writer.into_bytes())
}


fn encode_image_stream(writer: &mut BitWriter, image: &RgbaImage, options: &LosslessOptions) -> Result<()> {
    options.validate()?;

    if image.pixels.len() != image.size.area() {
        return Err(Error::invalid("pixel count does not match image size"));
    }

    let mut pixels = image.pixels.clone();
    let mut size = image.size;

    let enabled = TransformKind::ENCODING_ORDER.iter().copied()
        .filter(|&kind| options.transforms.contains(kind));

    for kind in enabled {
        writer.write_bit(true);
        writer.write(kind.code(), 2);

        match kind {
            TransformKind::ColorIndexing => {
                let (palette, packed, packed_width) = color_indexing(&pixels, size)?;
                debug!("palette of {} colors, packed width {}", palette.len(), packed_width);

                writer.write(palette.len() as u32 - 1, 8);
                write_image_data(writer, &delta_code_palette(&palette), Vec2(palette.len(), 1), 0, false)?;

                pixels = packed;
                size = Vec2(packed_width, size.1);
            },

            TransformKind::SubtractGreen => subtract_green(&mut pixels),

            TransformKind::CrossColor => {
                let multipliers = cross_color(&mut pixels, size, CROSS_COLOR_TILE_BITS);
                writer.write(CROSS_COLOR_TILE_BITS - 2, 3);
                write_image_data(writer, &multipliers, size.tiles(CROSS_COLOR_TILE_BITS), 0, false)?;
            },

            TransformKind::Predictor => {
                let modes = predictor(&mut pixels, size, PREDICTOR_TILE_BITS);
                writer.write(PREDICTOR_TILE_BITS - 2, 3);
                write_image_data(writer, &modes, size.tiles(PREDICTOR_TILE_BITS), 0, false)?;
            },
        }
    }

    writer.write_bit(false);
    write_image_data(writer, &pixels, size, u32::from(options.color_cache_bits), true)
}


/// Histograms of the five alphabets of one group.
struct Histograms {
    green: Vec<u32>,
    red: Vec<u32>,
    blue: Vec<u32>,
    alpha: Vec<u32>,
    distance: Vec<u32>,
}

impl Histograms {
    fn new(cache_size: usize) -> Self {
        Histograms {
            green: vec![0; LITERAL_ALPHABET_SIZE + LENGTH_CODES + cache_size],
            red: vec![0; LITERAL_ALPHABET_SIZE],
            blue: vec![0; LITERAL_ALPHABET_SIZE],
            alpha: vec![0; LITERAL_ALPHABET_SIZE],
            distance: vec![0; DISTANCE_SYMBOL_COUNT],
        }
    }

    fn add(&mut self, symbol: &Symbol) {
        match *symbol {
            Symbol::Literal([red, green, blue, alpha]) => {
                self.green[usize::from(green)] += 1;
                self.red[usize::from(red)] += 1;
                self.blue[usize::from(blue)] += 1;
                self.alpha[usize::from(alpha)] += 1;
            },

            Symbol::CacheIndex(index) => {
                self.green[LITERAL_ALPHABET_SIZE + LENGTH_CODES + usize::from(index)] += 1;
            },

            Symbol::Copy { length, distance_code } => {
                self.green[LITERAL_ALPHABET_SIZE + usize::from(Prefix::encode(length).symbol)] += 1;
                self.distance[usize::from(Prefix::encode(distance_code).symbol)] += 1;
            },
        }
    }
}

/// The codes of one group, in the order they are serialized.
struct Codes {
    green: HuffmanCodes,
    red: HuffmanCodes,
    blue: HuffmanCodes,
    alpha: HuffmanCodes,
    distance: HuffmanCodes,
}

impl Codes {
    fn from_histograms(histograms: &Histograms) -> Self {
        let codes = |histogram: &[u32]| HuffmanCodes::from_histogram(histogram, MAX_CODE_LENGTH);

        Codes {
            green: codes(&histograms.green),
            red: codes(&histograms.red),
            blue: codes(&histograms.blue),
            alpha: codes(&histograms.alpha),
            distance: codes(&histograms.distance),
        }
    }

    fn write(&self, writer: &mut BitWriter) {
        for codes in &[&self.green, &self.red, &self.blue, &self.alpha, &self.distance] {
            codes.write(writer);
        }
    }

    fn write_prefix(writer: &mut BitWriter, prefix: Prefix) {
        writer.write(prefix.extra_bits, prefix.extra_bit_count);
    }

    fn write_symbol(&self, writer: &mut BitWriter, symbol: &Symbol) {
        match *symbol {
            Symbol::Literal([red, green, blue, alpha]) => {
                self.green.write_symbol(writer, usize::from(green));
                self.red.write_symbol(writer, usize::from(red));
                self.blue.write_symbol(writer, usize::from(blue));
                self.alpha.write_symbol(writer, usize::from(alpha));
            },

            Symbol::CacheIndex(index) => {
                self.green.write_symbol(writer, LITERAL_ALPHABET_SIZE + LENGTH_CODES + usize::from(index));
            },

            Symbol::Copy { length, distance_code } => {
                let length = Prefix::encode(length);
                let distance = Prefix::encode(distance_code);

                self.green.write_symbol(writer, LITERAL_ALPHABET_SIZE + usize::from(length.symbol));
                Self::write_prefix(writer, length);

                self.distance.write_symbol(writer, usize::from(distance.symbol));
                Self::write_prefix(writer, distance);
            },
        }
    }
}


/// Write an entropy-coded image with a single group of codes.
fn write_image_data(writer: &mut BitWriter, pixels: &[Rgba], size: Vec2<usize>, cache_bits: u32, is_main_image: bool) -> Result<()> {
    let cache = if cache_bits > 0 {
        writer.write_bit(true);
        writer.write(cache_bits, 4);
        Some(ColorCache::new(cache_bits)?)
    }
    else {
        writer.write_bit(false);
        None
    };

    if is_main_image {
        writer.write_bit(false); // no entropy image
    }

    let cache_size = cache.as_ref().map_or(0, ColorCache::len);
    let symbols = tokenize(pixels, size.0, cache);

    let mut histograms = Histograms::new(cache_size);
    for symbol in &symbols { histograms.add(symbol); }

    let codes = Codes::from_histograms(&histograms);
    codes.write(writer);

    for symbol in &symbols {
        codes.write_symbol(writer, symbol);
    }

    Ok(())
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::bits::BitReader;
    use crate::error::PALETTE_TOO_LARGE;
    use crate::lossless::{decode, decode_headerless};
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    fn gradient(size: Vec2<usize>) -> RgbaImage {
        RgbaImage::from_fn(size, |Vec2(x, y)| [(x * 3) as u8, (y * 5) as u8, (x + y) as u8, 255 - (x / 4) as u8])
    }

    fn round_trip(image: &RgbaImage, options: LosslessOptions) -> Vec<u8> {
        let bytes = encode(image, &options).unwrap();
        assert_eq!(bytes.len() % 2, 0);
        assert_eq!(&decode(&bytes).unwrap(), image, "options {:?}", options);
        bytes
    }

    #[test]
    fn every_transform_combination(){
        let image = gradient(Vec2(37, 21));

        for bits in 0 .. 16_u8 {
            let transforms: TransformSet = TransformKind::ENCODING_ORDER.iter().copied()
                .filter(|&kind| bits & (1 << kind.code()) != 0 && kind != TransformKind::ColorIndexing)
                .collect();

            for &color_cache_bits in &[0, 3, 10] {
                round_trip(&image, LosslessOptions { color_cache_bits, transforms });
            }
        }
    }

    #[test]
    fn palette_with_four_colors_packs_four_pixels_per_byte(){
        let colors = [[0, 0, 0, 255], [255, 0, 0, 255], [0, 255, 0, 128], [0, 0, 255, 0]];
        let image = RgbaImage::from_fn(Vec2(16, 16), |Vec2(x, y)| colors[(x * 7 + y) % 4]);

        let options = LosslessOptions { color_cache_bits: 0, transforms: TransformSet::PALETTE };
        let bytes = round_trip(&image, options);

        let mut reader = BitReader::new(&bytes);
        Header::read(&mut reader).unwrap();
        assert!(reader.read_bit().unwrap());
        assert_eq!(TransformKind::from_code(reader.read(2).unwrap()), TransformKind::ColorIndexing);
        assert_eq!(reader.read(8).unwrap() + 1, 4);
        assert_eq!(palette_packing_bits(4), 2);
        assert_eq!(crate::math::tile_count(16, palette_packing_bits(4)), 4);
    }

    #[test]
    fn palette_combined_with_other_transforms(){
        let mut rng = StdRng::seed_from_u64(7);
        let colors: Vec<Rgba> = (0 .. 40).map(|_| rng.random()).collect();
        let image = RgbaImage::from_fn(Vec2(23, 9), |_| colors[rng.random_range(0 .. colors.len())]);

        round_trip(&image, LosslessOptions { color_cache_bits: 2, transforms: TransformSet::PALETTE.with(TransformKind::Predictor) });
        round_trip(&image, LosslessOptions { color_cache_bits: 0, transforms: TransformSet::ALL_BUT_PALETTE.with(TransformKind::ColorIndexing) });
    }

    #[test]
    fn too_many_colors_for_a_palette(){
        let image = RgbaImage::from_fn(Vec2(32, 32), |Vec2(x, y)| [x as u8, y as u8, 0, 255]);
        let options = LosslessOptions { color_cache_bits: 0, transforms: TransformSet::PALETTE };

        match encode(&image, &options) {
            Err(Error::Invalid(message)) => assert_eq!(message, PALETTE_TOO_LARGE),
            other => panic!("unexpected result {:?}", other.map(|bytes| bytes.len())),
        }
    }

    #[test]
    fn tiny_and_narrow_images(){
        for &size in &[Vec2(1, 1), Vec2(1, 40), Vec2(40, 1), Vec2(2, 3)] {
            round_trip(&gradient(size), LosslessOptions::default());
            round_trip(&gradient(size), LosslessOptions { color_cache_bits: 11, transforms: TransformSet::ALL_BUT_PALETTE });
        }
    }

    #[test]
    fn random_noise(){
        let mut rng = StdRng::seed_from_u64(1);
        let size = Vec2(29, 31);
        let pixels = (0 .. size.area()).map(|_| rng.random()).collect();
        let image = RgbaImage::new(size, pixels).unwrap();

        round_trip(&image, LosslessOptions::default());
        round_trip(&image, LosslessOptions { color_cache_bits: 1, transforms: TransformSet::NONE });
    }

    #[test]
    fn repetitive_content_compresses(){
        let image = RgbaImage::from_fn(Vec2(64, 64), |Vec2(x, _)| if x % 8 < 4 { [10, 20, 30, 255] } else { [200, 100, 50, 255] });
        let bytes = round_trip(&image, LosslessOptions::default());
        assert!(bytes.len() < 1000, "{} bytes", bytes.len());
    }

    #[test]
    fn rejects_invalid_options(){
        let image = gradient(Vec2(4, 4));
        assert!(encode(&image, &LosslessOptions { color_cache_bits: 12, transforms: TransformSet::NONE }).is_err());

        let oversized = RgbaImage { size: Vec2(16385, 1), pixels: vec![[0; 4]; 16385] };
        assert!(encode(&oversized, &LosslessOptions::default()).is_err());
    }

    #[test]
    fn headerless_streams(){
        let image = gradient(Vec2(13, 7));
        let bytes = encode_headerless(&image, &LosslessOptions::default()).unwrap();
        assert_eq!(decode_headerless(&bytes, image.size).unwrap(), image);
    }
}
