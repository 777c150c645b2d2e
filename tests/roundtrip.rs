extern crate webp;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use webp::prelude::*;
use webp::error::PALETTE_TOO_LARGE;


fn noise(size: Vec2<usize>, seed: u64) -> RgbaImage {
    let mut random = StdRng::seed_from_u64(seed);
    RgbaImage::from_fn(size, |_| [random.random(), random.random(), random.random(), random.random()])
}

/// Smooth gradients with a little noise, which is what the predictor and cross color transforms are made for.
fn photograph(size: Vec2<usize>, seed: u64) -> RgbaImage {
    let mut random = StdRng::seed_from_u64(seed);

    RgbaImage::from_fn(size, |Vec2(x, y)| {
        let jitter: u8 = random.random_range(0 .. 4);
        let red = ((x * 255) / size.0.max(1)) as u8;
        let green = ((y * 255) / size.1.max(1)) as u8;
        [red.wrapping_add(jitter), green, red / 2 + green / 2, 255]
    })
}

fn few_colors(size: Vec2<usize>, count: usize, seed: u64) -> RgbaImage {
    let mut random = StdRng::seed_from_u64(seed);
    let palette: Vec<Rgba> = (0 .. count).map(|_| [random.random(), random.random(), random.random(), 255]).collect();
    RgbaImage::from_fn(size, |_| palette[random.random_range(0 .. count)])
}

fn check_lossless(image: RgbaImage, options: &EncodeOptions) {
    let planes = PixelPlanes::from(image);
    let bytes = webp::encode(&planes, options).unwrap();
    assert_eq!(webp::decode(&bytes).unwrap(), planes, "with {:?}", options);
}

fn transforms() -> Vec<TransformSet> {
    vec![
        TransformSet::NONE,
        TransformSet::SUBTRACT_GREEN,
        TransformSet::NONE.with(TransformKind::Predictor),
        TransformSet::NONE.with(TransformKind::CrossColor),
        TransformSet::PHOTOGRAPHIC,
        TransformSet::ALL_BUT_PALETTE,
    ]
}


#[test]
fn lossless_transforms_are_exact(){
    let image = photograph(Vec2(67, 45), 1);

    for transforms in transforms() {
        for &cache_bits in &[0, 4, 10] {
            let options = EncodeOptions::default().with_transforms(transforms).with_color_cache_bits(cache_bits);
            check_lossless(image.clone(), &options);
        }
    }
}

#[test]
fn lossless_noise_is_exact(){
    check_lossless(noise(Vec2(33, 29), 2), &EncodeOptions::default());
    check_lossless(noise(Vec2(16, 16), 3), &EncodeOptions::default().with_transforms(TransformSet::ALL_BUT_PALETTE));
}

#[test]
fn palettes_of_every_packing_width(){
    for &colors in &[1, 2, 3, 4, 11, 16, 17, 200, 256] {
        let image = few_colors(Vec2(37, 13), colors, colors as u64);

        for &cache_bits in &[0, 3] {
            let options = EncodeOptions::default()
                .with_transforms(TransformSet::PALETTE)
                .with_color_cache_bits(cache_bits);

            check_lossless(image.clone(), &options);
        }
    }
}

#[test]
fn palette_with_too_many_colors(){
    let image = noise(Vec2(40, 40), 4);
    let options = EncodeOptions::default().with_transforms(TransformSet::PALETTE);

    match webp::encode(&image.into(), &options) {
        Err(Error::Invalid(message)) => assert_eq!(message, PALETTE_TOO_LARGE),
        other => panic!("expected palette error, got {:?}", other.map(|bytes| bytes.len())),
    }
}

#[test]
fn degenerate_sizes(){
    for &size in &[Vec2(1, 1), Vec2(300, 1), Vec2(1, 300), Vec2(2, 129)] {
        for transforms in transforms() {
            check_lossless(photograph(size, 5), &EncodeOptions::default().with_transforms(transforms));
        }

        check_lossless(few_colors(size, 3, 6), &EncodeOptions::default().with_transforms(TransformSet::PALETTE));
    }
}

#[test]
fn oversized_images_are_rejected(){
    let image = RgbaImage::from_fn(Vec2(16385, 1), |_| [0, 0, 0, 255]);
    assert!(matches!(webp::encode(&image.into(), &EncodeOptions::default()), Err(Error::Invalid(_))));
}

#[test]
fn extended_container_is_transparent(){
    let options = EncodeOptions::default().with_extended_container(true);
    check_lossless(noise(Vec2(12, 9), 7), &options);
    check_lossless(photograph(Vec2(12, 9), 8), &options);
}

#[test]
fn lossless_streams_have_even_length(){
    for seed in 0 .. 8 {
        let bytes = webp::lossless::encode(&noise(Vec2(5, 3), seed), &LosslessOptions::default()).unwrap();
        assert_eq!(bytes.len() % 2, 0);
    }
}

#[test]
fn animation_frames_are_exact(){
    let frames = (0 .. 4_u64)
        .map(|index| {
            let mut frame = Frame::new(photograph(Vec2(20, 14), index), 40 * index as u32);
            frame.offset = Vec2(2 * index as usize, 4);
            frame.dispose_to_background = index % 2 == 1;
            frame
        })
        .collect();

    let animation = Animation { canvas_size: Vec2(26, 18), background_color: 0x1020_3040, loop_count: 0, frames };
    let bytes = webp::encode_animation(&animation, &EncodeOptions::default()).unwrap();
    let decoded = webp::decode_animation(&bytes).unwrap();

    assert_eq!(decoded, animation);
    assert_eq!(webp::decode(&bytes).unwrap(), animation.frames[0].image);
}

#[test]
fn lossy_animation_frames(){
    let mut transparent = YuvImage::filled(Vec2(8, 8), 200, 90, 100);
    transparent.alpha = Some(vec![128; 64]);

    let animation = Animation {
        canvas_size: Vec2(8, 8), background_color: 0, loop_count: 1,
        frames: vec![ Frame::new(YuvImage::filled(Vec2(8, 8), 20, 128, 128), 100), Frame::new(transparent, 100) ],
    };

    let decoded = webp::decode_animation(&webp::encode_animation(&animation, &EncodeOptions::default()).unwrap()).unwrap();
    assert_eq!(decoded.frames.len(), 2);
    assert!(!decoded.frames[0].image.has_alpha());

    match &decoded.frames[1].image {
        PixelPlanes::Yuv(image) => assert_eq!(image.alpha, Some(vec![128; 64])),
        other => panic!("unexpected planes {:?}", other),
    }
}


fn smooth_planes(size: Vec2<usize>) -> YuvImage {
    let mut image = YuvImage::filled(size, 0, 0, 0);

    for (index, sample) in image.y.iter_mut().enumerate() {
        let (x, y) = (index % size.0, index / size.0);
        *sample = (16 + x * 2 + y).min(235) as u8;
    }

    let chroma_width = image.chroma_size().0;
    for (index, (u, v)) in image.u.iter_mut().zip(image.v.iter_mut()).enumerate() {
        *u = (100 + index % chroma_width) as u8;
        *v = (150 - index / chroma_width) as u8;
    }

    image
}

fn decode_yuv(bytes: &[u8]) -> YuvImage {
    match webp::decode(bytes).unwrap() {
        PixelPlanes::Yuv(image) => image,
        other => panic!("unexpected planes {:?}", other),
    }
}

#[test]
fn lossy_single_pixel(){
    let image = YuvImage::filled(Vec2(1, 1), 200, 30, 220);
    let decoded = decode_yuv(&webp::encode(&image.into(), &EncodeOptions::default().with_extended_container(true)).unwrap());

    assert_eq!(decoded.size, Vec2(1, 1));
    assert_eq!(decoded.u.len(), 1);
    assert!((i32::from(decoded.y[0]) - 200).abs() <= 3, "{:?}", decoded);
    assert!((i32::from(decoded.v[0]) - 220).abs() <= 3, "{:?}", decoded);
}

#[test]
fn partitions_do_not_change_pixels(){
    let image = smooth_planes(Vec2(50, 70));
    let mut decoded = Vec::new();

    for &partitions in &[Partitions::One, Partitions::Two, Partitions::Four, Partitions::Eight] {
        let lossy = LossyOptions { partitions, .. LossyOptions::default() };
        let bytes = webp::encode(&image.clone().into(), &EncodeOptions::default().with_lossy(lossy)).unwrap();
        decoded.push(decode_yuv(&bytes));
    }

    for other in &decoded[1 ..] {
        assert_eq!(other, &decoded[0]);
    }
}

#[test]
fn lossy_planes_stay_close(){
    let image = smooth_planes(Vec2(40, 24));

    for &quantizer in &[0, 30, 80] {
        let lossy = LossyOptions { quantizer, .. LossyOptions::default() };
        let decoded = decode_yuv(&webp::encode(&image.clone().into(), &EncodeOptions::default().with_lossy(lossy)).unwrap());

        let error: u64 = image.y.iter().zip(&decoded.y)
            .map(|(&a, &b)| (i64::from(a) - i64::from(b)).unsigned_abs())
            .sum();

        let mean_error = error as f64 / image.y.len() as f64;
        assert!(mean_error < 2.0 + f64::from(quantizer) / 6.0, "quantizer {}: mean error {}", quantizer, mean_error);
    }
}

#[test]
fn lossy_with_alpha_keeps_alpha(){
    let mut image = smooth_planes(Vec2(19, 23));
    image.alpha = Some((0 .. 19 * 23).map(|index| (index % 7 * 40) as u8).collect());

    let decoded = decode_yuv(&webp::encode(&image.clone().into(), &EncodeOptions::default()).unwrap());
    assert_eq!(decoded.size, image.size);
    assert_eq!(decoded.alpha, image.alpha);
}
