//! waytrail-core: waypoint projection, route synthesis, and marker
//! animation (sans-IO).
//!
//! Given an ordered list of [`Waypoint`]s and a reference curve, the
//! engine:
//!
//! 1. projects every waypoint onto the curve as an arc-length distance
//!    ([`project`]),
//! 2. builds a winding cubic route through the waypoints ([`route`]),
//! 3. animates a marker along the curve one segment at a time, pausing at
//!    each waypoint and reporting arrivals ([`schedule`]).
//!
//! This crate has **no I/O dependencies**. Frames, timers, and rendering
//! are injected through the traits in [`schedule`]; [`sim`] provides a
//! virtual-time host for tests and command-line playback.

pub mod curve;
pub mod project;
pub mod route;
pub mod schedule;
pub mod sim;
pub mod types;

pub use curve::{CurveGeometry, PolylineCurve};
pub use project::{ProjectedDistances, project_waypoints};
pub use route::{PathCommand, RouteDefinition, build_route};
pub use schedule::{
    AnimationScheduler, AnimationSnapshot, CancelToken, ConfigureOutcome, FrameClock, Host,
    MAX_RENDER_FAILURES, Phase, RenderSink, StepListener, Ticket, Timer,
};
pub use types::{
    EngineConfig, EngineError, Point, Polyline, ProjectionError, ProjectorConfig, RenderError,
    Waypoint,
};

/// The static part of an animation: route, reference-curve length, and
/// projected distances.
#[derive(Debug, Clone, PartialEq)]
pub struct CoursePlan {
    /// The winding route through the waypoints.
    pub route: RouteDefinition,
    /// Arc-length distance of each waypoint along the reference curve.
    pub distances: ProjectedDistances,
    /// Length of the reference curve.
    pub total_length: f64,
    /// Whether the reference curve had zero length.
    pub degenerate: bool,
}

/// Compute the route and projected distances without animating.
///
/// Applies the same monotonic clamping as
/// [`AnimationScheduler::configure`] when `config.clamp_monotonic` is set.
///
/// # Errors
///
/// Returns [`EngineError::InvalidConfig`] if `config` is invalid and
/// [`EngineError::NotReady`] if `geometry` cannot be measured.
///
/// # Examples
///
/// ```
/// use waytrail_core::{EngineConfig, Point, PolylineCurve, Waypoint, plan_course};
///
/// let curve = PolylineCurve::line(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
/// let waypoints = [Waypoint::at(0.0, 0.0), Waypoint::at(50.0, 0.0)];
/// let plan = plan_course(&waypoints, &curve, &EngineConfig::default()).unwrap();
/// assert_eq!(plan.distances.len(), 2);
/// assert!((plan.distances.as_slice()[1] - 50.0).abs() <= 1.0);
/// ```
pub fn plan_course<G: CurveGeometry + ?Sized>(
    waypoints: &[Waypoint],
    geometry: &G,
    config: &EngineConfig,
) -> Result<CoursePlan, EngineError> {
    config.validate()?;
    let (mut distances, degenerate) =
        match project_waypoints(waypoints, geometry, &config.projector) {
            Ok(distances) => (distances, false),
            Err(ProjectionError::NotReady) => return Err(EngineError::NotReady),
            Err(ProjectionError::DegenerateCurve { waypoints }) => {
                (ProjectedDistances::zeros(waypoints), true)
            }
        };
    if config.clamp_monotonic {
        distances.clamp_monotonic();
    }
    Ok(CoursePlan {
        route: build_route(waypoints),
        distances,
        total_length: if degenerate {
            0.0
        } else {
            geometry.total_length()
        },
        degenerate,
    })
}
