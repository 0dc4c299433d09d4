//! Nearest-point projection of waypoints onto the reference curve.
//!
//! Each waypoint is mapped to the arc-length distance whose curve point is
//! closest to it, using a two-phase grid search:
//!
//! 1. a coarse scan every `coarse_interval` units from 0 to the total length,
//! 2. a fine scan every `refine_step` units within one coarse interval on
//!    either side of the coarse winner.
//!
//! The result is a local minimum. That is enough for curves that visit
//! the waypoints roughly in order, which is how routes are drawn. For a
//! waypoint lying on the curve the error is at most one `refine_step`.

use serde::{Deserialize, Serialize};

use crate::curve::{CurveGeometry, measured_length};
use crate::types::{Point, ProjectionError, ProjectorConfig, Waypoint};

/// Arc-length distances, one per waypoint, index-aligned with the waypoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectedDistances(Vec<f64>);

impl ProjectedDistances {
    /// Wrap already computed distances.
    #[must_use]
    pub const fn new(distances: Vec<f64>) -> Self {
        Self(distances)
    }

    /// `count` distances of zero, used when the curve is degenerate.
    #[must_use]
    pub fn zeros(count: usize) -> Self {
        Self(vec![0.0; count])
    }

    /// Number of distances.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no distances.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The distances as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Start and end distance of segment `index`.
    ///
    /// Segment 0 runs from the start of the curve to the first waypoint;
    /// segment `i` runs from waypoint `i - 1` to waypoint `i`.
    #[must_use]
    pub fn segment(&self, index: usize) -> Option<(f64, f64)> {
        let end = *self.0.get(index)?;
        let start = index.checked_sub(1).map_or(0.0, |prev| self.0[prev]);
        Some((start, end))
    }

    /// Raise every distance to at least its predecessor.
    ///
    /// Returns the number of distances that were changed.
    pub fn clamp_monotonic(&mut self) -> usize {
        let mut changed = 0;
        let mut floor = f64::NEG_INFINITY;
        for d in &mut self.0 {
            if *d < floor {
                *d = floor;
                changed += 1;
            }
            floor = *d;
        }
        changed
    }
}

/// Project every waypoint onto `geometry`.
///
/// An empty waypoint list yields empty distances without touching the
/// curve.
///
/// # Errors
///
/// Returns [`ProjectionError::NotReady`] if the curve cannot be measured.
/// Returns [`ProjectionError::DegenerateCurve`] if its length is zero; the
/// caller is expected to fall back to [`ProjectedDistances::zeros`].
pub fn project_waypoints<G: CurveGeometry + ?Sized>(
    waypoints: &[Waypoint],
    geometry: &G,
    config: &ProjectorConfig,
) -> Result<ProjectedDistances, ProjectionError> {
    if waypoints.is_empty() {
        return Ok(ProjectedDistances::default());
    }
    let total = measured_length(geometry).ok_or(ProjectionError::NotReady)?;
    if total <= 0.0 {
        return Err(ProjectionError::DegenerateCurve {
            waypoints: waypoints.len(),
        });
    }

    let distances = waypoints
        .iter()
        .map(|w| nearest_distance(geometry, total, w.position(), config))
        .collect();
    Ok(ProjectedDistances::new(distances))
}

/// Arc-length distance of the curve point nearest to `target`.
///
/// Steps below [`ProjectorConfig::MIN_STEP`] are raised to it.
#[must_use]
pub fn nearest_distance<G: CurveGeometry + ?Sized>(
    geometry: &G,
    total: f64,
    target: Point,
    config: &ProjectorConfig,
) -> f64 {
    let interval = config.coarse_interval.max(ProjectorConfig::MIN_STEP);
    let refine = config.refine_step.max(ProjectorConfig::MIN_STEP);
    let mut best = Candidate::default();
    scan(geometry, target, 0.0, total, interval, &mut best);

    let start = (best.distance - interval).max(0.0);
    let end = (best.distance + interval).min(total);
    scan(geometry, target, start, end, refine, &mut best);

    best.distance
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    distance_sq: f64,
}

impl Default for Candidate {
    fn default() -> Self {
        Self {
            distance: 0.0,
            distance_sq: f64::INFINITY,
        }
    }
}

/// Sample `start, start + step, ...` up to `end` and keep strict improvements.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn scan<G: CurveGeometry + ?Sized>(
    geometry: &G,
    target: Point,
    start: f64,
    end: f64,
    step: f64,
    best: &mut Candidate,
) {
    if end < start {
        return;
    }
    // Multiply instead of accumulating so long curves don't drift.
    let samples = ((end - start) / step).floor() as usize;
    for k in 0..=samples {
        let distance = (k as f64).mul_add(step, start).min(end);
        let distance_sq = geometry.point_at(distance).distance_squared(target);
        if distance_sq < best.distance_sq {
            *best = Candidate {
                distance,
                distance_sq,
            };
        }
    }
}
