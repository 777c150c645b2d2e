#[macro_use]
extern crate bencher;

extern crate webp;
use webp::prelude::*;

use bencher::Bencher;


fn photograph() -> RgbaImage {
    RgbaImage::from_fn(Vec2(512, 384), |Vec2(x, y)| {
        let wave = ((x * 7 + y * 3) % 23) as u8;
        [(x / 2) as u8, (y / 2) as u8, wave, 255]
    })
}

/// Encode with predictor and subtract green, on all cores if enabled
fn encode_photograph(bench: &mut Bencher) {
    let image: PixelPlanes = photograph().into();

    bench.iter(||{
        let bytes = webp::encode(&image, &EncodeOptions::default()).unwrap();
        bencher::black_box(bytes);
    })
}

/// Encode with every transform except the palette
fn encode_photograph_all_transforms(bench: &mut Bencher) {
    let image: PixelPlanes = photograph().into();
    let options = EncodeOptions::default().with_transforms(TransformSet::ALL_BUT_PALETTE);

    bench.iter(||{
        let bytes = webp::encode(&image, &options).unwrap();
        bencher::black_box(bytes);
    })
}

fn decode_photograph(bench: &mut Bencher) {
    let bytes = webp::encode(&photograph().into(), &EncodeOptions::default()).unwrap();

    bench.iter(||{
        let image = webp::decode(&bytes).unwrap();
        bencher::black_box(image);
    })
}

/// Decode a palette image without color cache
fn decode_palette(bench: &mut Bencher) {
    let image = RgbaImage::from_fn(Vec2(512, 384), |Vec2(x, y)| [(x / 64 * 30) as u8, (y / 64 * 40) as u8, 0, 255]);
    let options = EncodeOptions::default().with_transforms(TransformSet::PALETTE).with_color_cache_bits(0);
    let bytes = webp::encode(&image.into(), &options).unwrap();

    bench.iter(||{
        let image = webp::decode(&bytes).unwrap();
        bencher::black_box(image);
    })
}


benchmark_group!(lossless,
    encode_photograph,
    encode_photograph_all_transforms,
    decode_photograph,
    decode_palette
);

benchmark_main!(lossless);
