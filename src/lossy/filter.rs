
//! The loop filter, which smooths the edges between blocks of the reconstructed frame.
//! Macroblocks are filtered in raster order, each first across its vertical then across its horizontal edges.

use crate::math::{Vec2, clamp_u8};
use super::header::FilterParameters;
use super::planes::MacroblockPlanes;


/// Which of the two filters the frame header selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {

    /// Only filters luma, adjusting at most one sample on either side of an edge.
    Simple,

    /// Filters all planes, adjusting up to three samples on either side of a macroblock edge.
    Normal,
}


/// Filter all macroblocks of the planes in place, with one set of parameters per macroblock in raster order.
pub fn apply(planes: &mut MacroblockPlanes, parameters: &[FilterParameters], filter_type: FilterType) {
    debug_assert_eq!(parameters.len(), planes.macroblocks.area(), "filter parameter count");

    let luma_stride = planes.luma_stride();
    let chroma_stride = planes.chroma_stride();
    let width = planes.macroblocks.0;

    for (index, parameters) in parameters.iter().enumerate() {
        if parameters.limit == 0 { continue; }
        let position = Vec2(index % width, index / width);

        let luma = Plane { stride: luma_stride, origin: 16 * (position.1 * luma_stride + position.0), size: 16 };

        match filter_type {
            FilterType::Simple => luma.filter_simple(&mut planes.y, position, parameters),

            FilterType::Normal => {
                luma.filter_normal(&mut planes.y, position, parameters);

                let chroma = Plane { stride: chroma_stride, origin: 8 * (position.1 * chroma_stride + position.0), size: 8 };
                chroma.filter_normal(&mut planes.u, position, parameters);
                chroma.filter_normal(&mut planes.v, position, parameters);
            },
        }
    }
}


/// The square of one macroblock in one plane.
struct Plane {
    stride: usize,
    origin: usize,
    size: usize,
}

impl Plane {

    fn filter_simple(&self, samples: &mut [u8], position: Vec2<usize>, parameters: &FilterParameters) {
        let limit = i32::from(parameters.limit);
        let column = |x: usize| (self.origin + x, 1, self.stride);
        let row = |y: usize| (self.origin + y * self.stride, self.stride, 1);

        if position.0 > 0 { simple_edge(samples, column(0), self.size, limit + 4); }
        if parameters.inner {
            for x in (4 .. self.size).step_by(4) { simple_edge(samples, column(x), self.size, limit); }
        }

        if position.1 > 0 { simple_edge(samples, row(0), self.size, limit + 4); }
        if parameters.inner {
            for y in (4 .. self.size).step_by(4) { simple_edge(samples, row(y), self.size, limit); }
        }
    }

    fn filter_normal(&self, samples: &mut [u8], position: Vec2<usize>, parameters: &FilterParameters) {
        let limit = i32::from(parameters.limit);
        let column = |x: usize| (self.origin + x, 1, self.stride);
        let row = |y: usize| (self.origin + y * self.stride, self.stride, 1);

        let edge = |limit: i32, macroblock_edge: bool| NormalEdge {
            limit: 2 * limit + 1,
            interior_limit: i32::from(parameters.interior_limit),
            hev_threshold: i32::from(parameters.hev_threshold),
            macroblock_edge,
        };

        if position.0 > 0 { edge(limit + 4, true).filter(samples, column(0), self.size); }
        if parameters.inner {
            for x in (4 .. self.size).step_by(4) { edge(limit, false).filter(samples, column(x), self.size); }
        }

        if position.1 > 0 { edge(limit + 4, true).filter(samples, row(0), self.size); }
        if parameters.inner {
            for y in (4 .. self.size).step_by(4) { edge(limit, false).filter(samples, row(y), self.size); }
        }
    }
}


/// Clamp to the signed byte range.
#[inline]
fn clamp_i8(value: i32) -> i32 {
    value.max(-128).min(127)
}

/// Clamp to the range of a filter adjustment.
#[inline]
fn clamp_adjustment(value: i32) -> i32 {
    value.max(-16).min(15)
}

/// The samples on both sides of one position of an edge,
/// where `step` goes from `p0` across the edge to `q0`.
#[derive(Clone, Copy)]
struct Taps { index: usize, step: usize }

impl Taps {

    /// The sample at a signed distance from the edge, where zero is the first sample after the edge.
    #[inline]
    fn get(self, samples: &[u8], offset: isize) -> i32 {
        i32::from(samples[self.at(offset)])
    }

    #[inline]
    fn set(self, samples: &mut [u8], offset: isize, value: i32) {
        samples[self.at(offset)] = clamp_u8(value);
    }

    #[inline]
    fn at(self, offset: isize) -> usize {
        if offset < 0 { self.index - offset.unsigned_abs() * self.step }
        else { self.index + offset as usize * self.step }
    }

    /// Whether the step across the edge is small enough to be a blocking artifact.
    fn is_edge_below(self, samples: &[u8], limit: i32) -> bool {
        let [p1, p0, q0, q1] = [-2, -1, 0, 1].map(|offset| self.get(samples, offset));
        4 * (p0 - q0).abs() + (p1 - q1).abs() <= limit
    }

    /// Adjust only the two samples next to the edge, also taking the outer samples into account.
    fn filter_two(self, samples: &mut [u8]) {
        let [p1, p0, q0, q1] = [-2, -1, 0, 1].map(|offset| self.get(samples, offset));

        let a = 3 * (q0 - p0) + clamp_i8(p1 - q1);
        let a1 = clamp_adjustment((a + 4) >> 3);
        let a2 = clamp_adjustment((a + 3) >> 3);

        self.set(samples, -1, p0 + a2);
        self.set(samples, 0, q0 - a1);
    }

    /// Adjust two samples on either side of an inner edge.
    fn filter_four(self, samples: &mut [u8]) {
        let [p1, p0, q0, q1] = [-2, -1, 0, 1].map(|offset| self.get(samples, offset));

        let a = 3 * (q0 - p0);
        let a1 = clamp_adjustment((a + 4) >> 3);
        let a2 = clamp_adjustment((a + 3) >> 3);
        let a3 = (a1 + 1) >> 1;

        self.set(samples, -2, p1 + a3);
        self.set(samples, -1, p0 + a2);
        self.set(samples, 0, q0 - a1);
        self.set(samples, 1, q1 - a3);
    }

    /// Adjust three samples on either side of a macroblock edge, with decreasing weights.
    fn filter_six(self, samples: &mut [u8]) {
        let [p2, p1, p0, q0, q1, q2] = [-3, -2, -1, 0, 1, 2].map(|offset| self.get(samples, offset));

        let a = clamp_i8(3 * (q0 - p0) + clamp_i8(p1 - q1));
        let a1 = (27 * a + 63) >> 7;
        let a2 = (18 * a + 63) >> 7;
        let a3 = (9 * a + 63) >> 7;

        self.set(samples, -3, p2 + a3);
        self.set(samples, -2, p1 + a2);
        self.set(samples, -1, p0 + a1);
        self.set(samples, 0, q0 - a1);
        self.set(samples, 1, q1 - a2);
        self.set(samples, 2, q2 - a3);
    }
}

/// Filter `count` positions along an edge given as `(first index, step across, step along)`.
fn simple_edge(samples: &mut [u8], (index, across, along): (usize, usize, usize), count: usize, limit: i32) {
    let limit = 2 * limit + 1;

    for position in 0 .. count {
        let taps = Taps { index: index + position * along, step: across };
        if taps.is_edge_below(samples, limit) { taps.filter_two(samples); }
    }
}

/// The thresholds of the normal filter for one edge.
struct NormalEdge {
    limit: i32,
    interior_limit: i32,
    hev_threshold: i32,
    macroblock_edge: bool,
}

impl NormalEdge {

    fn filter(&self, samples: &mut [u8], (index, across, along): (usize, usize, usize), count: usize) {
        for position in 0 .. count {
            let taps = Taps { index: index + position * along, step: across };
            if !self.is_filtered(samples, taps) { continue; }

            let [p1, p0, q0, q1] = [-2, -1, 0, 1].map(|offset| taps.get(samples, offset));
            let high_variance = (p1 - p0).abs() > self.hev_threshold || (q1 - q0).abs() > self.hev_threshold;

            if high_variance { taps.filter_two(samples); }
            else if self.macroblock_edge { taps.filter_six(samples); }
            else { taps.filter_four(samples); }
        }
    }

    /// Whether the edge is small and both sides are smooth.
    fn is_filtered(&self, samples: &[u8], taps: Taps) -> bool {
        if !taps.is_edge_below(samples, self.limit) { return false; }

        let [p3, p2, p1, p0, q0, q1, q2, q3] = [-4, -3, -2, -1, 0, 1, 2, 3].map(|offset| taps.get(samples, offset));

        [p3 - p2, p2 - p1, p1 - p0, q3 - q2, q2 - q1, q1 - q0].iter()
            .all(|difference| difference.abs() <= self.interior_limit)
    }
}
