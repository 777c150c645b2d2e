
//! Luma and chroma planes padded to whole macroblocks, which the decoder reconstructs into
//! and the encoder reads its source from.

use crate::image::YuvImage;
use crate::math::Vec2;


/// Planes covering whole macroblocks: 16x16 luma and 8x8 chroma samples per macroblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroblockPlanes {

    /// Number of macroblocks horizontally and vertically.
    pub macroblocks: Vec2<usize>,

    /// Luma samples, `luma_stride()` per row.
    pub y: Vec<u8>,

    /// Blue-difference samples, `chroma_stride()` per row.
    pub u: Vec<u8>,

    /// Red-difference samples, `chroma_stride()` per row.
    pub v: Vec<u8>,
}

impl MacroblockPlanes {

    /// Black planes for the given number of macroblocks.
    pub fn new(macroblocks: Vec2<usize>) -> Self {
        let luma = macroblocks.area() * 256;
        MacroblockPlanes { macroblocks, y: vec![0; luma], u: vec![0; luma / 4], v: vec![0; luma / 4] }
    }

    /// Copy an image, repeating its last row and column into the padding.
    pub fn from_image(image: &YuvImage) -> Self {
        let macroblocks = image.size.map(|size| (size + 15) / 16);
        let mut planes = Self::new(macroblocks);

        let luma_stride = planes.luma_stride();
        let chroma_stride = planes.chroma_stride();
        pad_plane(&mut planes.y, luma_stride, &image.y, image.size);
        pad_plane(&mut planes.u, chroma_stride, &image.u, image.chroma_size());
        pad_plane(&mut planes.v, chroma_stride, &image.v, image.chroma_size());
        planes
    }

    /// Samples per luma row.
    #[inline]
    pub fn luma_stride(&self) -> usize { self.macroblocks.0 * 16 }

    /// Samples per chroma row.
    #[inline]
    pub fn chroma_stride(&self) -> usize { self.macroblocks.0 * 8 }

    /// Cut the visible part of the planes.
    pub fn crop(&self, size: Vec2<usize>) -> YuvImage {
        let chroma_size = YuvImage::chroma_size_of(size);

        YuvImage {
            size,
            y: crop_plane(&self.y, self.luma_stride(), size),
            u: crop_plane(&self.u, self.chroma_stride(), chroma_size),
            v: crop_plane(&self.v, self.chroma_stride(), chroma_size),
            alpha: None,
        }
    }
}

fn pad_plane(target: &mut [u8], stride: usize, source: &[u8], size: Vec2<usize>) {
    for (target_y, row) in target.chunks_exact_mut(stride).enumerate() {
        let source_y = target_y.min(size.1 - 1);
        let source_row = &source[source_y * size.0 .. (source_y + 1) * size.0];

        row[.. size.0].copy_from_slice(source_row);
        let last = source_row[size.0 - 1];
        for sample in &mut row[size.0 ..] { *sample = last; }
    }
}

fn crop_plane(source: &[u8], stride: usize, size: Vec2<usize>) -> Vec<u8> {
    source.chunks_exact(stride).take(size.1)
        .flat_map(|row| row[.. size.0].iter().copied())
        .collect()
}
