//! Reference curve geometry.
//!
//! The engine never walks a curve directly. It asks a [`CurveGeometry`]
//! for the total arc length and for the point at a given arc-length
//! distance, the same two queries a browser offers for a measured SVG
//! path. [`PolylineCurve`] is the in-crate implementation over a
//! flattened [`Polyline`].

use crate::types::{Point, Polyline};

/// Arc-length queries over a reference curve.
///
/// Implementations must be deterministic and side-effect free: the
/// projector and the scheduler query the same provider and rely on
/// getting the same answer for the same distance.
pub trait CurveGeometry {
    /// Whether the curve can be measured yet.
    ///
    /// Hosts whose curve is laid out asynchronously return `false` until
    /// layout has happened.
    fn is_ready(&self) -> bool {
        true
    }

    /// Total arc length. Constant for a given curve.
    fn total_length(&self) -> f64;

    /// The point at `distance` along the curve, for `distance` in
    /// `[0, total_length()]`.
    fn point_at(&self, distance: f64) -> Point;
}

impl<G: CurveGeometry + ?Sized> CurveGeometry for &G {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn total_length(&self) -> f64 {
        (**self).total_length()
    }

    fn point_at(&self, distance: f64) -> Point {
        (**self).point_at(distance)
    }
}

/// Measured length of `geometry`, or `None` if it cannot be measured.
///
/// A provider that reports ready but returns a negative or non-finite
/// length is treated the same as one that is not ready.
pub(crate) fn measured_length<G: CurveGeometry + ?Sized>(geometry: &G) -> Option<f64> {
    if !geometry.is_ready() {
        return None;
    }
    let length = geometry.total_length();
    (length.is_finite() && length >= 0.0).then_some(length)
}

/// A polyline parameterized by arc length.
///
/// Cumulative distances are computed once at construction so
/// [`point_at`](CurveGeometry::point_at) is a binary search plus one
/// interpolation.
#[derive(Debug, Clone, PartialEq)]
pub struct PolylineCurve {
    points: Vec<Point>,
    /// `cumulative[i]` is the arc length from the first point to `points[i]`.
    cumulative: Vec<f64>,
}

impl PolylineCurve {
    /// Build a curve through `polyline`'s points in order.
    #[must_use]
    pub fn new(polyline: &Polyline) -> Self {
        let points = polyline.points().to_vec();
        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        for (i, p) in points.iter().enumerate() {
            if i > 0 {
                total += points[i - 1].distance(*p);
            }
            cumulative.push(total);
        }
        Self { points, cumulative }
    }

    /// A two-point straight curve from `start` to `end`.
    #[must_use]
    pub fn line(start: Point, end: Point) -> Self {
        Self::new(&Polyline::new(vec![start, end]))
    }

    /// The vertices of the curve.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }
}

impl CurveGeometry for PolylineCurve {
    fn is_ready(&self) -> bool {
        !self.points.is_empty()
    }

    fn total_length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    fn point_at(&self, distance: f64) -> Point {
        let (Some(&first), Some(&last)) = (self.points.first(), self.points.last()) else {
            return Point::new(0.0, 0.0);
        };
        if distance.is_nan() || distance <= 0.0 {
            return first;
        }
        if distance >= self.total_length() {
            return last;
        }

        // First vertex strictly beyond `distance`; the segment ends there.
        let end = self.cumulative.partition_point(|&c| c <= distance);
        let start = end - 1;
        let span = self.cumulative[end] - self.cumulative[start];
        if span <= 0.0 {
            return self.points[start];
        }
        let t = (distance - self.cumulative[start]) / span;
        self.points[start].lerp(self.points[end], t)
    }
}
