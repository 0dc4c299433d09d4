//! Shared types for the waytrail engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A 2D point in the shared percentage plane.
///
/// Both axes nominally span `[0, 100]`. `x` grows to the right and `y`
/// grows downward, matching the `left`/`top` convention of [`Waypoint`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (percent from the left edge).
    pub x: f64,
    /// Vertical position (percent from the top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Linear interpolation towards `other`; `t = 0` is `self`, `t = 1` is `other`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self {
            x: (other.x - self.x).mul_add(t, self.x),
            y: (other.y - self.y).mul_add(t, self.y),
        }
    }
}

/// An ordered run of points, used as a flattened curve.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polyline(Vec<Point>);

impl Polyline {
    /// Create a new polyline from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the polyline has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Sum of the straight segment lengths between consecutive points.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.0.windows(2).map(|w| w[0].distance(w[1])).sum()
    }
}

impl FromIterator<Point> for Polyline {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One stop along the route.
///
/// Field names follow the JSON shape hosts already produce, so a course
/// can be loaded with `serde_json` directly:
///
/// ```
/// # use waytrail_core::Waypoint;
/// let json = r#"{ "title": "Final", "description": "", "top": 50, "left": 80, "final": true }"#;
/// let waypoint: Waypoint = serde_json::from_str(json).unwrap();
/// assert!(waypoint.is_final);
/// assert_eq!(waypoint.position().x, 80.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Optional heading shown on the waypoint card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Body text shown on the waypoint card. Empty when the field is
    /// missing from the input.
    #[serde(default)]
    pub description: String,
    /// Vertical coordinate, percent from the top edge.
    pub top: f64,
    /// Horizontal coordinate, percent from the left edge.
    pub left: f64,
    /// Marks the destination waypoint.
    #[serde(rename = "final", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_final: bool,
}

impl Waypoint {
    /// A waypoint at (`left`, `top`) with no title or description.
    #[must_use]
    pub const fn at(left: f64, top: f64) -> Self {
        Self {
            title: None,
            description: String::new(),
            top,
            left,
            is_final: false,
        }
    }

    /// The waypoint as a point in the shared plane (`x = left`, `y = top`).
    #[must_use]
    pub const fn position(&self) -> Point {
        Point::new(self.left, self.top)
    }
}

/// Sampling parameters for nearest-point projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorConfig {
    /// Spacing of the coarse scan along the curve, in plane units.
    pub coarse_interval: f64,
    /// Step of the refinement scan around the coarse minimum.
    pub refine_step: f64,
}

impl ProjectorConfig {
    /// Default coarse scan spacing.
    pub const DEFAULT_COARSE_INTERVAL: f64 = 8.0;
    /// Default refinement step.
    pub const DEFAULT_REFINE_STEP: f64 = 1.0;
    /// Smallest accepted scan step. Projection raises smaller steps to this.
    pub const MIN_STEP: f64 = 1e-3;
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            coarse_interval: Self::DEFAULT_COARSE_INTERVAL,
            refine_step: Self::DEFAULT_REFINE_STEP,
        }
    }
}

/// Serde support for `Duration` as whole milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Engine configuration.
///
/// Every field has a default, so a partial JSON object is enough to
/// override a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames per segment; the marker reaches the segment end on the last one.
    pub frame_count: u32,

    /// Pause at each waypoint before the next segment starts.
    #[serde(rename = "dwell_ms", with = "duration_millis")]
    pub dwell: Duration,

    /// Force projected distances to be non-decreasing so the marker never
    /// runs backwards when waypoints are placed out of order.
    pub clamp_monotonic: bool,

    /// Nearest-point search parameters.
    pub projector: ProjectorConfig,
}

impl EngineConfig {
    /// Default frames per segment.
    pub const DEFAULT_FRAME_COUNT: u32 = 100;
    /// Default dwell at each waypoint.
    pub const DEFAULT_DWELL: Duration = Duration::from_millis(1500);

    /// Check the configuration for values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `frame_count` is zero or a
    /// projector step is not finite or is below [`ProjectorConfig::MIN_STEP`].
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.frame_count == 0 {
            return Err(EngineError::InvalidConfig(
                "frame_count must be at least 1".to_string(),
            ));
        }
        let steps = [
            ("coarse_interval", self.projector.coarse_interval),
            ("refine_step", self.projector.refine_step),
        ];
        for (name, value) in steps {
            if !value.is_finite() || value < ProjectorConfig::MIN_STEP {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be finite and at least {}, got {value}",
                    ProjectorConfig::MIN_STEP
                )));
            }
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_count: Self::DEFAULT_FRAME_COUNT,
            dwell: Self::DEFAULT_DWELL,
            clamp_monotonic: true,
            projector: ProjectorConfig::default(),
        }
    }
}

/// Errors from nearest-point projection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    /// The reference curve has zero length; every waypoint sits at distance 0.
    #[error("reference curve has zero length ({waypoints} waypoints projected to 0)")]
    DegenerateCurve {
        /// Number of waypoints that were projected.
        waypoints: usize,
    },

    /// The reference curve cannot be measured yet.
    #[error("reference curve is not ready to be measured")]
    NotReady,
}

/// Errors surfaced by the animation engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// The geometry provider cannot answer queries yet. Retry once it can.
    #[error("geometry provider is not ready")]
    NotReady,

    /// `start` was called while a run is animating or paused.
    #[error("an animation run is already in progress")]
    AlreadyRunning,

    /// `start` was called after a run finished or was cancelled.
    #[error("the previous run has ended; call reset() before starting again")]
    RunFinished,

    /// Configuration is invalid.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

/// A render sink rejected an update.
///
/// The scheduler abandons the frame that produced it and asks for
/// another one; animation state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("render sink failed: {0}")]
pub struct RenderError(pub String);
