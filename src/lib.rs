
//! Read and write webp images.
//!
//! Decodes lossless (`VP8L`) and lossy key-frame (`VP8 `) bitstreams,
//! separate alpha planes and animations, and encodes all of them again.
//! Conversion between the returned pixel planes and other color spaces is up to the caller.
//!
//! ```no_run
//! use webp::prelude::*;
//!
//! let bytes = std::fs::read("image.webp").unwrap();
//! let planes = webp::decode(&bytes).unwrap();
//! let again = webp::encode(&planes, &EncodeOptions::default()).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(
    rust_2018_idioms,
    unused_must_use,
)]


pub mod error;
pub mod io;
pub mod math;
pub mod bits;
pub mod container;
pub mod huffman;
pub mod image;
pub mod lossless;
pub mod lossy;
pub mod alpha;
pub mod codec;

pub use crate::codec::{decode, decode_animation, encode, encode_animation, EncodeOptions};


pub mod prelude {

    // main exports
    pub use crate::codec::{decode, decode_animation, encode, encode_animation, EncodeOptions};

    // core data types
    pub use crate::image::{
        PixelPlanes, RgbaImage, YuvImage, Rgba,
        Frame, Animation,
    };

    pub use crate::lossless::{LosslessOptions, TransformKind, TransformSet};
    pub use crate::lossy::{LossyOptions, Partitions};

    // secondary data types
    pub use crate::math::Vec2;
    pub use crate::error::{self, Error, Result};
}
