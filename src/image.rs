
//! The decoded pixel planes handed to and returned from the codec.
//! Conversion between these planes and host bitmaps is left to the caller.

use crate::error::{Error, Result};
use crate::math::Vec2;


/// One pixel as red, green, blue and alpha bytes.
pub type Rgba = [u8; 4];

/// The largest width or height of a single image in any of the bitstreams.
pub const MAX_IMAGE_SIZE: usize = 1 << 14;


/// A packed four channel image, as produced by the lossless bitstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {

    /// Width and height in pixels.
    pub size: Vec2<usize>,

    /// Rows of pixels, top to bottom, each row left to right.
    pub pixels: Vec<Rgba>,
}

impl RgbaImage {

    /// Wrap pixels, checking that their count matches the size.
    pub fn new(size: impl Into<Vec2<usize>>, pixels: Vec<Rgba>) -> Result<Self> {
        let size = size.into();

        if pixels.len() != size.area() {
            return Err(Error::invalid("pixel count does not match image size"));
        }

        Ok(RgbaImage { size, pixels })
    }

    /// Compute each pixel from its position.
    pub fn from_fn(size: impl Into<Vec2<usize>>, mut pixel: impl FnMut(Vec2<usize>) -> Rgba) -> Self {
        let size = size.into();
        let pixels = (0 .. size.height())
            .flat_map(|y| (0 .. size.width()).map(move |x| Vec2(x, y)))
            .map(|position| pixel(position))
            .collect();

        RgbaImage { size, pixels }
    }

    /// The pixel at the given position.
    pub fn pixel(&self, position: Vec2<usize>) -> Rgba {
        self.pixels[position.1 * self.size.0 + position.0]
    }

    /// Whether any pixel is not fully opaque.
    pub fn has_alpha(&self) -> bool {
        self.pixels.iter().any(|pixel| pixel[3] != 255)
    }
}


/// Luma and two half-resolution chroma planes, as produced by the lossy bitstream,
/// optionally paired with a full-resolution alpha plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YuvImage {

    /// Width and height of the luma and alpha planes.
    pub size: Vec2<usize>,

    /// Luma samples, `size.area()` of them.
    pub y: Vec<u8>,

    /// Blue-difference chroma samples, `chroma_size().area()` of them.
    pub u: Vec<u8>,

    /// Red-difference chroma samples, `chroma_size().area()` of them.
    pub v: Vec<u8>,

    /// Alpha samples, `size.area()` of them.
    pub alpha: Option<Vec<u8>>,
}

impl YuvImage {

    /// Create an image with all planes filled with a constant sample.
    pub fn filled(size: impl Into<Vec2<usize>>, y: u8, u: u8, v: u8) -> Self {
        let size = size.into();
        let chroma = Self::chroma_size_of(size).area();

        YuvImage {
            size,
            y: vec![y; size.area()],
            u: vec![u; chroma],
            v: vec![v; chroma],
            alpha: None,
        }
    }

    /// The size of the chroma planes for a luma plane of the given size.
    pub fn chroma_size_of(size: Vec2<usize>) -> Vec2<usize> {
        size.map(|luma| (luma + 1) / 2)
    }

    /// The size of the chroma planes.
    pub fn chroma_size(&self) -> Vec2<usize> {
        Self::chroma_size_of(self.size)
    }

    /// Returns an error if any plane has the wrong number of samples.
    pub fn validate(&self) -> Result<()> {
        let luma = self.size.area();
        let chroma = self.chroma_size().area();

        let alpha_ok = self.alpha.as_ref().map_or(true, |alpha| alpha.len() == luma);

        if self.y.len() != luma || self.u.len() != chroma || self.v.len() != chroma || !alpha_ok {
            return Err(Error::invalid("plane sample count does not match image size"));
        }

        Ok(())
    }
}


/// The result of decoding a still image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelPlanes {

    /// Four interleaved channels.
    Rgba(RgbaImage),

    /// Separate luma, chroma and alpha planes.
    Yuv(YuvImage),
}

impl PixelPlanes {

    /// Width and height in pixels.
    pub fn size(&self) -> Vec2<usize> {
        match self {
            PixelPlanes::Rgba(image) => image.size,
            PixelPlanes::Yuv(image) => image.size,
        }
    }

    /// Whether the planes carry transparency.
    pub fn has_alpha(&self) -> bool {
        match self {
            PixelPlanes::Rgba(image) => image.has_alpha(),
            PixelPlanes::Yuv(image) => image.alpha.is_some(),
        }
    }
}

impl From<RgbaImage> for PixelPlanes {
    fn from(image: RgbaImage) -> Self { PixelPlanes::Rgba(image) }
}

impl From<YuvImage> for PixelPlanes {
    fn from(image: YuvImage) -> Self { PixelPlanes::Yuv(image) }
}


/// One image of an animation, placed on the canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {

    /// Position of the top left corner on the canvas. Always even.
    pub offset: Vec2<usize>,

    /// Display duration in milliseconds.
    pub duration: u32,

    /// Clear the frame's area to the background color before the next frame.
    pub dispose_to_background: bool,

    /// Replace the canvas pixels instead of alpha-blending onto them.
    pub skip_blending: bool,

    /// The pixels of the frame.
    pub image: PixelPlanes,
}

impl Frame {

    /// A frame at the canvas origin that blends and is kept.
    pub fn new(image: impl Into<PixelPlanes>, duration: u32) -> Self {
        Frame {
            offset: Vec2(0, 0),
            duration,
            dispose_to_background: false,
            skip_blending: false,
            image: image.into(),
        }
    }
}


/// A sequence of frames with global playback parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Animation {

    /// Size of the area that all frames are placed on.
    pub canvas_size: Vec2<usize>,

    /// Suggested background as a blue, green, red, alpha ordered value.
    pub background_color: u32,

    /// Number of repetitions, zero meaning forever.
    pub loop_count: u16,

    /// The frames in display order.
    pub frames: Vec<Frame>,
}
