#[macro_use]
extern crate bencher;

extern crate webp;
use webp::prelude::*;

use bencher::Bencher;


fn planes() -> YuvImage {
    let mut image = YuvImage::filled(Vec2(640, 480), 0, 128, 128);

    for (index, sample) in image.y.iter_mut().enumerate() {
        let (x, y) = (index % 640, index / 640);
        *sample = ((x / 3 + y / 2) % 220 + 16) as u8;
    }

    image
}

fn encoded(lossy: LossyOptions) -> Vec<u8> {
    webp::encode(&planes().into(), &EncodeOptions::default().with_lossy(lossy)).unwrap()
}

fn decode_single_partition(bench: &mut Bencher) {
    let bytes = encoded(LossyOptions::default());

    bench.iter(||{
        let image = webp::decode(&bytes).unwrap();
        bencher::black_box(image);
    })
}

/// Decode without loop filter, to compare against the filtered decode
fn decode_unfiltered(bench: &mut Bencher) {
    let bytes = encoded(LossyOptions { filter_level: 0, .. LossyOptions::default() });

    bench.iter(||{
        let image = webp::decode(&bytes).unwrap();
        bencher::black_box(image);
    })
}

fn decode_eight_partitions_simple_filter(bench: &mut Bencher) {
    let bytes = encoded(LossyOptions { partitions: Partitions::Eight, simple_filter: true, .. LossyOptions::default() });

    bench.iter(||{
        let image = webp::decode(&bytes).unwrap();
        bencher::black_box(image);
    })
}

fn encode_planes(bench: &mut Bencher) {
    let image: PixelPlanes = planes().into();

    bench.iter(||{
        let bytes = webp::encode(&image, &EncodeOptions::default()).unwrap();
        bencher::black_box(bytes);
    })
}


benchmark_group!(lossy,
    decode_single_partition,
    decode_unfiltered,
    decode_eight_partitions_simple_filter,
    encode_planes
);

benchmark_main!(lossy);
