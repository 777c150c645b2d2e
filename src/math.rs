
//! Simple math utilities.

use crate::error::{Error, Result};

/// Simple two-dimensional vector of any numerical type.
/// Supports only few mathematical operations
/// as this is used mainly as data struct.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Vec2<T> (pub T, pub T);

impl<T> Vec2<T> {

    /// Maps all components of this vector to a new type, yielding a vector of that new type.
    pub fn map<B>(self, map: impl Fn(T) -> B) -> Vec2<B> {
        Vec2(map(self.0), map(self.1))
    }

    /// Seeing this vector as a dimension or size (width and height),
    /// this returns the area that this dimensions contains (`width * height`).
    pub fn area(self) -> T where T: std::ops::Mul<T, Output = T> {
        self.0 * self.1
    }

    /// The first component of this 2D vector.
    #[inline]
    pub fn width(self) -> T { self.0 }

    /// The second component of this 2D vector.
    #[inline]
    pub fn height(self) -> T { self.1 }
}

impl Vec2<usize> {

    /// Returns an error if either component is zero or exceeds the maximum.
    /// Lossless streams store sizes minus one in 14 bits, the extended header in 24 bits.
    pub fn validate(self, max: usize, error_message: &'static str) -> Result<Self> {
        if self.0 == 0 || self.1 == 0 || self.0 > max || self.1 > max {
            Err(Error::invalid(error_message))
        }
        else {
            Ok(self)
        }
    }

    /// The number of tiles of size `1 << bits` needed to cover this size.
    pub fn tiles(self, bits: u32) -> Vec2<usize> {
        self.map(|size| tile_count(size, bits))
    }
}

impl<T> From<(T, T)> for Vec2<T> {
    fn from((x, y): (T, T)) -> Self { Vec2(x, y) }
}

impl<T> From<Vec2<T>> for (T, T) {
    fn from(vec2: Vec2<T>) -> Self { (vec2.0, vec2.1) }
}


/// Round up or down in specific calculations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RoundingMode {

    /// Round down.
    Down,

    /// Round up.
    Up,
}

impl RoundingMode {
    pub(crate) fn divide(self, dividend: usize, divisor: usize) -> usize {
        match self {
            RoundingMode::Up => (dividend + divisor - 1) / divisor, // only works for positive numbers
            RoundingMode::Down => dividend / divisor,
        }
    }
}

/// How many tiles of size `1 << bits` cover `size` pixels.
#[inline]
pub(crate) fn tile_count(size: usize, bits: u32) -> usize {
    RoundingMode::Up.divide(size, 1 << bits)
}

/// Saturate a signed value into the byte range.
#[inline]
pub(crate) fn clamp_u8(value: i32) -> u8 {
    value.max(0).min(255) as u8
}

/// Absolute difference of two bytes.
#[inline]
pub(crate) fn abs_diff(a: u8, b: u8) -> i32 {
    (i32::from(a) - i32::from(b)).abs()
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tile_counts(){
        assert_eq!(tile_count(16, 4), 1);
        assert_eq!(tile_count(17, 4), 2);
        assert_eq!(tile_count(1, 2), 1);
        assert_eq!(Vec2(33_usize, 5).tiles(3), Vec2(5, 1));
    }

    #[test]
    fn size_validation(){
        assert!(Vec2(0_usize, 1).validate(16384, "size").is_err());
        assert!(Vec2(16385_usize, 1).validate(16384, "size").is_err());
        assert_eq!(Vec2(1_usize, 16384).validate(16384, "size").unwrap(), Vec2(1, 16384));
    }

    #[test]
    fn clamping(){
        assert_eq!(clamp_u8(-3), 0);
        assert_eq!(clamp_u8(300), 255);
        assert_eq!(clamp_u8(77), 77);
        assert_eq!(abs_diff(3, 250), 247);
    }
}
