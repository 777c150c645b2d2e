
//! Decode the transforms and the entropy-coded pixels of a lossless stream.

use log::debug;
use smallvec::SmallVec;
use crate::bits::BitReader;
use crate::error::{Error, Result, REPEATED_TRANSFORM, INVALID_COLOR_CACHE, INVALID_LZ77};
use crate::huffman::HuffmanTree;
use crate::image::{Rgba, RgbaImage};
use crate::math::{Vec2, tile_count};
use super::cache::ColorCache;
use super::lz77::{read_prefix_value, code_to_distance, DISTANCE_SYMBOL_COUNT};
use super::transform::{Transform, TransformKind, TransformSet, palette_packing_bits, expand_palette};
use super::{Header, LENGTH_CODES, LITERAL_ALPHABET_SIZE};


/// Never reserve more pixels than this before they are decoded.
const SOFT_MAX_PIXELS: usize = 1 << 20;


/// Decode a complete lossless stream, starting with its signature byte.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage> {
    let mut reader = BitReader::new(bytes);
    let header = Header::read(&mut reader)?;
    debug!("lossless image of size {:?}", header.size);

    let pixels = decode_image_stream(&mut reader, header.size)?;
    RgbaImage::new(header.size, pixels)
}

/// Decode a stream that has no header, as embedded in alpha chunks.
/// The size is known from the surrounding image.
pub fn decode_headerless(bytes: &[u8], size: Vec2<usize>) -> Result<RgbaImage> {
    let mut reader = BitReader::new(bytes);
    let pixels = decode_image_stream(&mut reader, size)?;
    RgbaImage::new(size, pixels)
}


/// Read the transforms, the pixels, and undo the transforms.
fn decode_image_stream(reader: &mut BitReader<'_>, size: Vec2<usize>) -> Result<Vec<Rgba>> {
    let mut transforms: SmallVec<[Transform; 4]> = SmallVec::new();
    let mut seen = TransformSet::NONE;
    let mut width = size.0;

    while reader.read_bit()? {
        let kind = TransformKind::from_code(reader.read(2)?);

        if seen.contains(kind) {
            return Err(Error::invalid(REPEATED_TRANSFORM));
        }

        seen = seen.with(kind);

        let transform = read_transform(reader, kind, Vec2(width, size.1))?;
        if let Transform::ColorIndexing { bits, .. } = transform {
            width = tile_count(width, bits);
        }

        transforms.push(transform);
    }

    debug!("lossless transforms: {:?}", transforms.iter().map(Transform::kind).collect::<SmallVec<[_; 4]>>());

    let pixels = decode_pixels(reader, Vec2(width, size.1), true)?;

    let (pixels, width) = transforms.iter().rev()
        .fold((pixels, width), |(pixels, width), transform| transform.inverse(pixels, width));

    debug_assert_eq!(width, size.0, "transforms did not restore the width");
    Ok(pixels)
}

/// Read the parameters and the auxiliary image of one transform.
fn read_transform(reader: &mut BitReader<'_>, kind: TransformKind, size: Vec2<usize>) -> Result<Transform> {
    Ok(match kind {
        TransformKind::Predictor => {
            let bits = reader.read(3)? + 2;
            let modes = decode_pixels(reader, size.tiles(bits), false)?;
            Transform::Predictor { bits, modes }
        },

        TransformKind::CrossColor => {
            let bits = reader.read(3)? + 2;
            let multipliers = decode_pixels(reader, size.tiles(bits), false)?;
            Transform::CrossColor { bits, multipliers }
        },

        TransformKind::SubtractGreen => Transform::SubtractGreen,

        TransformKind::ColorIndexing => {
            let color_count = reader.read(8)? as usize + 1;
            let bits = palette_packing_bits(color_count);
            let deltas = decode_pixels(reader, Vec2(color_count, 1), false)?;

            Transform::ColorIndexing {
                bits, original_width: size.0,
                palette: expand_palette(&deltas),
            }
        },
    })
}


/// The five codes used for one region of the image.
#[derive(Debug)]
struct HuffmanGroup {
    green: HuffmanTree,
    red: HuffmanTree,
    blue: HuffmanTree,
    alpha: HuffmanTree,
    distance: HuffmanTree,
}

impl HuffmanGroup {
    fn read(reader: &mut BitReader<'_>, cache_size: usize) -> Result<Self> {
        Ok(HuffmanGroup {
            green: HuffmanTree::read(reader, LITERAL_ALPHABET_SIZE + LENGTH_CODES + cache_size)?,
            red: HuffmanTree::read(reader, LITERAL_ALPHABET_SIZE)?,
            blue: HuffmanTree::read(reader, LITERAL_ALPHABET_SIZE)?,
            alpha: HuffmanTree::read(reader, LITERAL_ALPHABET_SIZE)?,
            distance: HuffmanTree::read(reader, DISTANCE_SYMBOL_COUNT)?,
        })
    }
}

/// Which group codes each tile of the image, from the optional entropy image.
struct GroupMap {
    tile_bits: u32,
    tiles_per_row: usize,
    groups: Vec<usize>,
}

impl GroupMap {

    #[inline]
    fn group_at(&self, x: usize, y: usize) -> usize {
        if self.tile_bits == 0 { return 0; }
        self.groups[(y >> self.tile_bits) * self.tiles_per_row + (x >> self.tile_bits)]
    }
}


/// Decode an entropy-coded image of the given size.
/// Only the main image may carry an entropy image that splits it into several groups.
fn decode_pixels(reader: &mut BitReader<'_>, size: Vec2<usize>, is_main_image: bool) -> Result<Vec<Rgba>> {
    let mut cache = if reader.read_bit()? {
        Some(ColorCache::new(reader.read(4)?)?)
    }
    else {
        None
    };

    let cache_size = cache.as_ref().map_or(0, ColorCache::len);

    let group_map = if is_main_image && reader.read_bit()? {
        let tile_bits = reader.read(3)? + 2;
        let entropy_image = decode_pixels(reader, size.tiles(tile_bits), false)?;

        GroupMap {
            tile_bits,
            tiles_per_row: tile_count(size.0, tile_bits),
            groups: entropy_image.iter().map(|pixel| usize::from(pixel[0]) << 8 | usize::from(pixel[1])).collect(),
        }
    }
    else {
        GroupMap { tile_bits: 0, tiles_per_row: 0, groups: Vec::new() }
    };

    let group_count = group_map.groups.iter().max().map_or(1, |&max| max + 1);
    let groups = (0 .. group_count)
        .map(|_| HuffmanGroup::read(reader, cache_size))
        .collect::<Result<Vec<HuffmanGroup>>>()?;

    let width = size.0;
    let pixel_count = size.area();
    // the declared size is not trusted until the pixels are actually there
    let mut pixels: Vec<Rgba> = Vec::with_capacity(pixel_count.min(SOFT_MAX_PIXELS));

    // pixels before this index are already inserted into the cache
    let mut cached_until = 0;
    let Vec2(mut x, mut y) = Vec2(0, 0);

    while pixels.len() < pixel_count {
        let group = &groups[group_map.group_at(x, y)];
        let green = usize::from(group.green.read_symbol(reader)?);

        if green < LITERAL_ALPHABET_SIZE {
            let red = group.red.read_symbol(reader)? as u8;
            let blue = group.blue.read_symbol(reader)? as u8;
            let alpha = group.alpha.read_symbol(reader)? as u8;
            pixels.push([red, green as u8, blue, alpha]);
            x += 1;
        }

        else if green < LITERAL_ALPHABET_SIZE + LENGTH_CODES {
            let length = read_prefix_value(reader, (green - LITERAL_ALPHABET_SIZE) as u32)?;
            let distance_symbol = group.distance.read_symbol(reader)?;
            let distance_code = read_prefix_value(reader, u32::from(distance_symbol))?;
            let distance = code_to_distance(width, distance_code);

            let position = pixels.len();
            if distance > position || length > pixel_count - position {
                return Err(Error::invalid(INVALID_LZ77));
            }

            // source and destination may overlap, so copy one pixel at a time
            for source in position - distance .. position - distance + length {
                let pixel = pixels[source];
                pixels.push(pixel);
            }

            x += length;
        }

        else {
            let cache = cache.as_mut().ok_or_else(|| Error::invalid(INVALID_COLOR_CACHE))?;

            for &pixel in &pixels[cached_until ..] {
                cache.insert(pixel);
            }

            cached_until = pixels.len();
            pixels.push(cache.lookup(green - LITERAL_ALPHABET_SIZE - LENGTH_CODES)?);
            x += 1;
        }

        if x >= width {
            y += x / width;
            x %= width;
        }
    }

    Ok(pixels)
}
