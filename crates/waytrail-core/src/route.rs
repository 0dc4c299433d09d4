//! Route synthesis: a winding cubic curve through the waypoints.
//!
//! The route starts with a move to the first waypoint and adds one cubic
//! Bézier segment per consecutive pair. Both control points of a segment
//! sit at the vertical midpoint of the pair and are pushed sideways by
//! [`BULGE_OFFSET`], alternating direction from segment to segment, so
//! the route swings left and right like a road down a hillside.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Point, Polyline, Waypoint};

/// Horizontal control-point offset of each segment, in plane units.
pub const BULGE_OFFSET: f64 = 13.0;

/// One drawing command of a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PathCommand {
    /// Start a new subpath at the point.
    MoveTo(Point),
    /// Cubic Bézier from the current point to `end`.
    CubicTo {
        control1: Point,
        control2: Point,
        end: Point,
    },
}

/// A cubic Bézier segment with its start point resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicSegment {
    pub start: Point,
    pub control1: Point,
    pub control2: Point,
    pub end: Point,
}

impl CubicSegment {
    /// Evaluate the curve at parameter `t` in `[0, 1]`.
    #[must_use]
    pub fn point_at(&self, t: f64) -> Point {
        // De Casteljau.
        let a = self.start.lerp(self.control1, t);
        let b = self.control1.lerp(self.control2, t);
        let c = self.control2.lerp(self.end, t);
        let ab = a.lerp(b, t);
        let bc = b.lerp(c, t);
        ab.lerp(bc, t)
    }
}

/// The synthesized route, as an ordered list of drawing commands.
///
/// A pure function of the waypoint sequence: build it once and cache it
/// until the waypoints change. Formats as path data via [`fmt::Display`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteDefinition {
    commands: Vec<PathCommand>,
}

impl RouteDefinition {
    /// The drawing commands in order.
    #[must_use]
    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    /// Returns `true` if the route has no commands.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The cubic segments, each with the point it starts from.
    pub fn segments(&self) -> impl Iterator<Item = CubicSegment> + '_ {
        let mut current = None;
        self.commands.iter().filter_map(move |command| match *command {
            PathCommand::MoveTo(p) => {
                current = Some(p);
                None
            }
            PathCommand::CubicTo {
                control1,
                control2,
                end,
            } => {
                let start = current.replace(end)?;
                Some(CubicSegment {
                    start,
                    control1,
                    control2,
                    end,
                })
            }
        })
    }

    /// Sample every segment at `samples_per_segment` evenly spaced
    /// parameters and join the results into one polyline.
    ///
    /// The polyline can be wrapped in a
    /// [`PolylineCurve`](crate::PolylineCurve) to use the drawn route as
    /// the reference curve.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn flatten(&self, samples_per_segment: usize) -> Polyline {
        let samples = samples_per_segment.max(1);
        let mut points = Vec::new();
        for segment in self.segments() {
            if points.is_empty() {
                points.push(segment.start);
            }
            points.extend((1..=samples).map(|k| segment.point_at(k as f64 / samples as f64)));
        }
        Polyline::new(points)
    }
}

impl fmt::Display for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, command) in self.commands.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match command {
                PathCommand::MoveTo(p) => write!(f, "M {} {}", p.x, p.y)?,
                PathCommand::CubicTo {
                    control1,
                    control2,
                    end,
                } => write!(
                    f,
                    "C {} {}, {} {}, {} {}",
                    control1.x, control1.y, control2.x, control2.y, end.x, end.y,
                )?,
            }
        }
        Ok(())
    }
}

/// Build the winding route through `waypoints`.
///
/// For segment `i` (1-based) the offset is `+BULGE_OFFSET` when `i` is
/// even and `-BULGE_OFFSET` when odd. The first control point is the
/// previous waypoint shifted by the offset, the second is the current
/// waypoint shifted against it. Fewer than two waypoints give an empty
/// route.
#[must_use]
pub fn build_route(waypoints: &[Waypoint]) -> RouteDefinition {
    if waypoints.len() < 2 {
        return RouteDefinition::default();
    }

    let mut commands = Vec::with_capacity(waypoints.len());
    commands.push(PathCommand::MoveTo(waypoints[0].position()));
    for (i, pair) in waypoints.windows(2).enumerate() {
        let (prev, curr) = (&pair[0], &pair[1]);
        let offset = if (i + 1) % 2 == 0 {
            BULGE_OFFSET
        } else {
            -BULGE_OFFSET
        };
        let mid_y = (prev.top + curr.top) / 2.0;
        commands.push(PathCommand::CubicTo {
            control1: Point::new(prev.left + offset, mid_y),
            control2: Point::new(curr.left - offset, mid_y),
            end: curr.position(),
        });
    }
    RouteDefinition { commands }
}
