
//! Read and write complete webp files.
//! Walks the riff chunks, routes each bitstream chunk to the matching decoder,
//! and assembles minimal still or animated files when encoding.

use log::debug;
use crate::alpha::{self, AlphaFilter};
use crate::container::*;
use crate::error::*;
use crate::image::{Animation, Frame, PixelPlanes};
use crate::lossless::{self, LosslessOptions, TransformSet};
use crate::lossy::{self, LossyOptions};
use crate::math::Vec2;


/// How to write a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {

    /// Write a `VP8X` header even if the image does not require one.
    /// Images with a separate alpha plane and animations always use the extended format.
    pub use_extended_container: bool,

    /// Number of color cache index bits of the lossless encoder. Zero disables the cache.
    pub color_cache_bits: u8,

    /// Which transforms the lossless encoder applies.
    pub transforms: TransformSet,

    /// How luma and chroma planes are compressed.
    pub lossy: LossyOptions,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        let lossless = LosslessOptions::default();

        EncodeOptions {
            use_extended_container: false,
            color_cache_bits: lossless.color_cache_bits,
            transforms: lossless.transforms,
            lossy: LossyOptions::default(),
        }
    }
}

impl EncodeOptions {

    /// Always write the extended header.
    pub fn with_extended_container(self, use_extended_container: bool) -> Self {
        EncodeOptions { use_extended_container, ..self }
    }

    /// Use a color cache with `1 << bits` entries, or none if zero.
    pub fn with_color_cache_bits(self, color_cache_bits: u8) -> Self {
        EncodeOptions { color_cache_bits, ..self }
    }

    /// Select the lossless transforms.
    pub fn with_transforms(self, transforms: TransformSet) -> Self {
        EncodeOptions { transforms, ..self }
    }

    /// Select the lossy compression parameters.
    pub fn with_lossy(self, lossy: LossyOptions) -> Self {
        EncodeOptions { lossy, ..self }
    }

    /// The options for the lossless encoder, used for rgba images and alpha planes.
    pub fn lossless(&self) -> LosslessOptions {
        LosslessOptions { color_cache_bits: self.color_cache_bits, transforms: self.transforms }
    }
}


/// Decode a still image.
/// Returns the first frame for animated files, without placing it on the canvas.
pub fn decode(bytes: &[u8]) -> Result<PixelPlanes> {
    let mut chunks = open(bytes)?;
    let mut extended: Option<ExtendedHeader> = None;
    let mut image = ImageChunks::default();

    while let Some(chunk) = chunks.next_chunk()? {
        let flags = extended.map(|header| header.flags).unwrap_or_default();

        match chunk.tag {
            VP8X => extended = Some(read_extended_header(chunk.data, extended)?),

            ANMF if flags.animation => {
                debug!("decoding the first animation frame");
                return decode_frame(chunk.data).map(|frame| frame.image);
            },

            ALPH if !flags.alpha => return Err(Error::invalid("alpha chunk without alpha flag")),
            VP8 if flags.alpha && image.alpha.is_none() => return Err(Error::invalid("alpha flag without alpha chunk")),

            _ => if let Some(planes) = image.push(chunk)? {
                return Ok(planes);
            },
        }
    }

    Err(Error::invalid(NO_IMAGE_CHUNK))
}

/// Decode every frame of an animated file.
/// Frames are decoded independently and are not composited onto the canvas.
pub fn decode_animation(bytes: &[u8]) -> Result<Animation> {
    let mut chunks = open(bytes)?;
    let mut extended: Option<ExtendedHeader> = None;
    let mut header: Option<AnimationHeader> = None;
    let mut frames = Vec::new();

    while let Some(chunk) = chunks.next_chunk()? {
        match chunk.tag {
            VP8X => extended = Some(read_extended_header(chunk.data, extended)?),
            ANIM => header = Some(AnimationHeader::read(chunk.data)?),
            ANMF => frames.push(decode_frame(chunk.data)?),
            _ => {},
        }
    }

    let extended = extended
        .filter(|extended| extended.flags.animation)
        .ok_or_else(|| Error::invalid("file is not animated"))?;

    let header = header.ok_or_else(|| Error::invalid("animation header missing"))?;
    if frames.is_empty() { return Err(Error::invalid(NO_IMAGE_CHUNK)); }

    for frame in &frames {
        let end = Vec2(frame.offset.0 + frame.image.size().0, frame.offset.1 + frame.image.size().1);

        if end.0 > extended.canvas_size.0 || end.1 > extended.canvas_size.1 {
            return Err(Error::invalid("animation frame exceeds the canvas"));
        }
    }

    debug!("animation with {} frames, loop count {}", frames.len(), header.loop_count);

    Ok(Animation {
        canvas_size: extended.canvas_size,
        background_color: header.background_color,
        loop_count: header.loop_count,
        frames,
    })
}


/// Encode a still image. Rgba images are compressed losslessly,
/// yuv images lossy with an optional lossless alpha plane.
pub fn encode(planes: &PixelPlanes, options: &EncodeOptions) -> Result<Vec<u8>> {
    let image_chunks = encode_image_chunks(planes, options)?;
    let mut writer = ChunkWriter::new();

    let separate_alpha = matches!(planes, PixelPlanes::Yuv(image) if image.alpha.is_some());

    if options.use_extended_container || separate_alpha {
        let flags = ExtendedFlags { alpha: planes.has_alpha(), .. ExtendedFlags::default() };
        let header = ExtendedHeader { flags, canvas_size: planes.size() };
        writer.write_chunk(VP8X, &header.to_bytes()?)?;
    }

    for (tag, data) in &image_chunks {
        writer.write_chunk(*tag, data)?;
    }

    writer.finish(WEBP)
}

/// Encode an animation. The canvas grows to contain every frame.
pub fn encode_animation(animation: &Animation, options: &EncodeOptions) -> Result<Vec<u8>> {
    if animation.frames.is_empty() {
        return Err(Error::invalid("animation without frames"));
    }

    let mut canvas_size = animation.canvas_size;
    for frame in &animation.frames {
        let size = frame.image.size();
        canvas_size.0 = canvas_size.0.max(frame.offset.0 + size.0);
        canvas_size.1 = canvas_size.1.max(frame.offset.1 + size.1);
    }

    let flags = ExtendedFlags {
        animation: true,
        alpha: animation.frames.iter().any(|frame| frame.image.has_alpha()),
        .. ExtendedFlags::default()
    };

    let mut writer = ChunkWriter::new();
    writer.write_chunk(VP8X, &ExtendedHeader { flags, canvas_size }.to_bytes()?)?;

    let header = AnimationHeader { background_color: animation.background_color, loop_count: animation.loop_count };
    writer.write_chunk(ANIM, &header.to_bytes()?)?;

    for frame in &animation.frames {
        if frame.offset.0 % 2 != 0 || frame.offset.1 % 2 != 0 {
            return Err(Error::invalid("animation frame offsets must be even"));
        }

        let header = FrameHeader {
            offset: frame.offset,
            size: frame.image.size(),
            duration: frame.duration,
            dispose_to_background: frame.dispose_to_background,
            skip_blending: frame.skip_blending,
        };

        let mut nested = ChunkWriter::new();
        for (tag, data) in &encode_image_chunks(&frame.image, options)? {
            nested.write_chunk(*tag, data)?;
        }

        let mut payload = Vec::new();
        header.write(&mut payload)?;
        payload.extend(nested.into_list());
        writer.write_chunk(ANMF, &payload)?;
    }

    debug!("encoded animation with {} frames on a {}x{} canvas", animation.frames.len(), canvas_size.0, canvas_size.1);
    writer.finish(WEBP)
}


/// Accepts the chunks of a single image and decodes the image
/// as soon as its bitstream chunk arrives.
#[derive(Debug, Default)]
struct ImageChunks<'b> {
    alpha: Option<&'b [u8]>,
}

impl<'b> ImageChunks<'b> {

    fn push(&mut self, chunk: Chunk<'b>) -> Result<Option<PixelPlanes>> {
        match chunk.tag {
            ALPH => {
                if self.alpha.is_some() { return Err(Error::invalid("repeated alpha chunk")); }
                self.alpha = Some(chunk.data);
                Ok(None)
            },

            VP8 => {
                debug!("decoding lossy bitstream");
                let mut image = lossy::decode(chunk.data)?;

                if let Some(alpha) = self.alpha {
                    image.alpha = Some(alpha::decode(alpha, image.size)?);
                }

                Ok(Some(image.into()))
            },

            VP8L => {
                if self.alpha.is_some() { return Err(Error::invalid("lossless bitstream after alpha chunk")); }

                debug!("decoding lossless bitstream");
                Ok(Some(lossless::decode(chunk.data)?.into()))
            },

            _ => {
                debug!("skipping chunk {:?}", chunk.tag_name());
                Ok(None)
            },
        }
    }
}

fn open(bytes: &[u8]) -> Result<ChunkReader<'_>> {
    let chunks = ChunkReader::new(bytes)?;

    if chunks.form_type() != WEBP {
        return Err(Error::invalid(MISSING_HEADER));
    }

    Ok(chunks)
}

fn read_extended_header(data: &[u8], previous: Option<ExtendedHeader>) -> Result<ExtendedHeader> {
    if previous.is_some() {
        return Err(Error::invalid("repeated extended header"));
    }

    let header = ExtendedHeader::read(data)?;
    debug!("extended header: {:?}", header);
    Ok(header)
}

fn decode_frame(data: &[u8]) -> Result<Frame> {
    let (header, nested) = FrameHeader::read(data)?;
    let mut image = ImageChunks::default();

    for chunk in ChunkReader::list(ANMF, nested) {
        if let Some(planes) = image.push(chunk?)? {
            if planes.size() != header.size {
                return Err(Error::invalid("animation frame size does not match its bitstream"));
            }

            return Ok(Frame {
                offset: header.offset,
                duration: header.duration,
                dispose_to_background: header.dispose_to_background,
                skip_blending: header.skip_blending,
                image: planes,
            });
        }
    }

    Err(Error::invalid(NO_IMAGE_CHUNK))
}

/// The chunks that hold one image, in file order.
fn encode_image_chunks(planes: &PixelPlanes, options: &EncodeOptions) -> Result<Vec<(FourCC, Vec<u8>)>> {
    match planes {
        PixelPlanes::Rgba(image) => {
            Ok(vec![ (VP8L, lossless::encode(image, &options.lossless())?) ])
        },

        PixelPlanes::Yuv(image) => {
            let mut chunks = Vec::with_capacity(2);

            if let Some(samples) = &image.alpha {
                chunks.push((ALPH, alpha::encode(samples, image.size, AlphaFilter::None, &options.lossless())?));
            }

            chunks.push((VP8, lossy::encode(image, &options.lossy)?));
            Ok(chunks)
        },
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::image::{RgbaImage, YuvImage};

    fn gradient(size: Vec2<usize>) -> RgbaImage {
        RgbaImage::from_fn(size, |Vec2(x, y)| [(x * 9) as u8, (y * 5) as u8, (x + y) as u8, 255 - (x as u8 & 3)])
    }

    fn tags(bytes: &[u8]) -> Vec<FourCC> {
        ChunkReader::new(bytes).unwrap().map(|chunk| chunk.unwrap().tag).collect()
    }

    fn file(chunks: &[(FourCC, Vec<u8>)]) -> Vec<u8> {
        let mut writer = ChunkWriter::new();
        for (tag, data) in chunks { writer.write_chunk(*tag, data).unwrap(); }
        writer.finish(WEBP).unwrap()
    }

    fn extended(alpha: bool, animation: bool) -> (FourCC, Vec<u8>) {
        let flags = ExtendedFlags { alpha, animation, .. ExtendedFlags::default() };
        (VP8X, ExtendedHeader { flags, canvas_size: Vec2(4, 4) }.to_bytes().unwrap())
    }

    #[test]
    fn lossless_in_both_containers(){
        let image = gradient(Vec2(7, 5));
        let planes = PixelPlanes::from(image.clone());

        let plain = encode(&planes, &EncodeOptions::default()).unwrap();
        assert_eq!(tags(&plain), vec![VP8L]);
        assert_eq!(decode(&plain).unwrap(), planes);

        let extended = encode(&planes, &EncodeOptions::default().with_extended_container(true)).unwrap();
        assert_eq!(tags(&extended), vec![VP8X, VP8L]);
        assert_eq!(decode(&extended).unwrap(), planes);
    }

    #[test]
    fn lossy_with_alpha(){
        let mut image = YuvImage::filled(Vec2(9, 6), 90, 120, 140);
        image.alpha = Some((0 .. 54).map(|index| (index * 4) as u8).collect());

        let bytes = encode(&image.clone().into(), &EncodeOptions::default()).unwrap();
        assert_eq!(tags(&bytes), vec![VP8X, ALPH, VP8]);

        match decode(&bytes).unwrap() {
            PixelPlanes::Yuv(decoded) => {
                assert_eq!(decoded.size, image.size);
                assert_eq!(decoded.alpha, image.alpha);
            },
            other => panic!("unexpected planes {:?}", other),
        }
    }

    #[test]
    fn chunk_order_is_validated(){
        let lossless_stream = lossless::encode(&gradient(Vec2(4, 4)), &LosslessOptions::default()).unwrap();
        let alpha_plane = alpha::encode(&[7; 16], Vec2(4, 4), AlphaFilter::None, &LosslessOptions::default()).unwrap();
        let lossy_stream = lossy::encode(&YuvImage::filled(Vec2(4, 4), 50, 128, 128), &LossyOptions::default()).unwrap();

        let alpha_without_flag = file(&[ extended(false, false), (ALPH, alpha_plane.clone()), (VP8, lossy_stream.clone()) ]);
        assert!(matches!(decode(&alpha_without_flag), Err(Error::Invalid(_))));

        let flag_without_alpha = file(&[ extended(true, false), (VP8, lossy_stream.clone()) ]);
        assert!(matches!(decode(&flag_without_alpha), Err(Error::Invalid(_))));

        let lossless_after_alpha = file(&[ extended(true, false), (ALPH, alpha_plane.clone()), (VP8L, lossless_stream.clone()) ]);
        assert!(matches!(decode(&lossless_after_alpha), Err(Error::Invalid(_))));

        let repeated_header = file(&[ extended(false, false), extended(false, false), (VP8L, lossless_stream.clone()) ]);
        assert!(matches!(decode(&repeated_header), Err(Error::Invalid(_))));

        let valid = file(&[ extended(true, false), (ALPH, alpha_plane), (VP8, lossy_stream) ]);
        assert!(decode(&valid).unwrap().has_alpha());
    }

    #[test]
    fn unknown_chunks_are_skipped(){
        let lossless_stream = lossless::encode(&gradient(Vec2(3, 3)), &LosslessOptions::default()).unwrap();

        let bytes = file(&[ (*b"ICCP", vec![1, 2, 3]), (VP8L, lossless_stream) ]);
        assert_eq!(decode(&bytes).unwrap().size(), Vec2(3, 3));

        let bytes = file(&[ (*b"EXIF", vec![1, 2, 3]) ]);
        assert!(matches!(decode(&bytes), Err(Error::Invalid(message)) if message == NO_IMAGE_CHUNK));
    }

    #[test]
    fn other_form_types(){
        let mut writer = ChunkWriter::new();
        writer.write_chunk(VP8L, &[0x2F]).unwrap();
        let bytes = writer.finish(*b"AVI ").unwrap();

        assert!(matches!(decode(&bytes), Err(Error::Invalid(message)) if message == MISSING_HEADER));
    }

    #[test]
    fn animation_round_trip(){
        let first = gradient(Vec2(6, 4));
        let second = RgbaImage::from_fn(Vec2(3, 3), |Vec2(x, y)| [x as u8, y as u8, 200, 10]);

        let mut moved = Frame::new(second, 250);
        moved.offset = Vec2(2, 4);
        moved.dispose_to_background = true;
        moved.skip_blending = true;

        let animation = Animation {
            canvas_size: Vec2(6, 4),
            background_color: 0xFF00_80FF,
            loop_count: 3,
            frames: vec![ Frame::new(first.clone(), 100), moved ],
        };

        let bytes = encode_animation(&animation, &EncodeOptions::default()).unwrap();
        assert_eq!(tags(&bytes), vec![VP8X, ANIM, ANMF, ANMF]);

        let decoded = decode_animation(&bytes).unwrap();
        assert_eq!(decoded.canvas_size, Vec2(6, 7));
        assert_eq!(decoded.frames, animation.frames);
        assert_eq!(decoded.background_color, animation.background_color);
        assert_eq!(decoded.loop_count, 3);

        assert_eq!(decode(&bytes).unwrap(), PixelPlanes::Rgba(first));
    }

    #[test]
    fn invalid_animations(){
        let empty = Animation { canvas_size: Vec2(1, 1), background_color: 0, loop_count: 0, frames: Vec::new() };
        assert!(matches!(encode_animation(&empty, &EncodeOptions::default()), Err(Error::Invalid(_))));

        let mut odd = Frame::new(gradient(Vec2(2, 2)), 10);
        odd.offset = Vec2(1, 0);
        let odd = Animation { frames: vec![ odd ], .. empty };
        assert!(encode_animation(&odd, &EncodeOptions::default()).is_err());

        let still = encode(&gradient(Vec2(2, 2)).into(), &EncodeOptions::default()).unwrap();
        assert!(matches!(decode_animation(&still), Err(Error::Invalid(_))));
    }
}
