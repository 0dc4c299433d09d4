//! waytrail-export: SVG and PNG serializers for routes and animation
//! frames (sans-IO).
//!
//! Both formats draw the same [`Scene`]: the route in a muted stroke, the
//! traveled part of it highlighted, the waypoints, and the marker. The
//! plane is the 100 x 100 percentage space the waypoints live in.

use waytrail_core::sim::FrameState;
use waytrail_core::{AnimationScheduler, CurveGeometry, Host, RouteDefinition, Waypoint};

pub mod raster;
pub mod svg;

pub use raster::{ExportError, to_png};
pub use svg::{SvgMetadata, route_path_data, to_svg};

/// Side of the square drawing plane, in plane units.
pub const PLANE_SIZE: f64 = 100.0;

/// Stroke widths and radii, in plane units.
const ROUTE_WIDTH: f64 = 1.0;
const WAYPOINT_RADIUS: f64 = 1.2;
const MARKER_RADIUS: f64 = 1.8;

/// Colors shared by both formats, as RGB.
mod palette {
    pub const BACKGROUND: [u8; 3] = [255, 255, 255];
    pub const ROUTE: [u8; 3] = [200, 200, 200];
    pub const TRAIL: [u8; 3] = [30, 136, 229];
    pub const WAYPOINT: [u8; 3] = [120, 120, 120];
    pub const REACHED: [u8; 3] = [67, 160, 71];
    pub const MARKER: [u8; 3] = [229, 57, 53];
}

/// Everything needed to draw one moment of an animation.
#[derive(Debug, Clone)]
pub struct Scene<'a> {
    pub route: &'a RouteDefinition,
    pub waypoints: &'a [Waypoint],
    /// Per-waypoint visibility, index-aligned with `waypoints`.
    pub visible: Vec<bool>,
    pub frame: FrameState,
}

impl<'a> Scene<'a> {
    /// A scene with every waypoint hidden and no marker.
    #[must_use]
    pub fn new(route: &'a RouteDefinition, waypoints: &'a [Waypoint]) -> Self {
        Self {
            route,
            waypoints,
            visible: vec![false; waypoints.len()],
            frame: FrameState::default(),
        }
    }

    /// Capture the scheduler's route, waypoints, and visibility together
    /// with the last rendered frame.
    #[must_use]
    pub fn capture<G: CurveGeometry, H: Host>(
        scheduler: &'a AnimationScheduler<G, H>,
        frame: FrameState,
    ) -> Self {
        let waypoints = scheduler.waypoints();
        Self {
            route: scheduler.route(),
            waypoints,
            visible: (0..waypoints.len()).map(|i| scheduler.is_visible(i)).collect(),
            frame,
        }
    }

    /// Traveled and remaining arc length, with negative and non-finite
    /// values read as zero.
    #[must_use]
    pub fn extent(&self) -> (f64, f64) {
        let clean = |v: f64| if v.is_finite() { v.max(0.0) } else { 0.0 };
        (clean(self.frame.traveled), clean(self.frame.remaining))
    }

    /// Whether waypoint `index` is drawn as reached.
    #[must_use]
    pub fn is_visible(&self, index: usize) -> bool {
        self.visible.get(index).copied().unwrap_or(false)
    }
}
