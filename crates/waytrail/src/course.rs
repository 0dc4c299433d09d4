//! Loading waypoint courses and building their reference curves.

use std::path::Path;

use waytrail_core::{Point, Polyline, PolylineCurve, Waypoint, build_route};

/// Stops of the built-in course as `(left, top)`, before the final one.
const DEMO_STOPS: [(f64, f64); 12] = [
    (16.0, 8.0),
    (23.0, 20.0),
    (40.0, 11.0),
    (52.0, 20.0),
    (43.0, 26.0),
    (30.0, 34.0),
    (21.0, 41.0),
    (34.0, 49.0),
    (45.0, 58.0),
    (29.0, 73.0),
    (20.0, 60.0),
    (24.0, 83.0),
];

/// The built-in course: twelve stops winding down the plane, then a
/// final waypoint off to the right.
pub fn demo_course() -> Vec<Waypoint> {
    let mut course: Vec<Waypoint> = DEMO_STOPS
        .iter()
        .enumerate()
        .map(|(i, &(left, top))| Waypoint {
            description: format!("Stop {}", i + 1),
            ..Waypoint::at(left, top)
        })
        .collect();
    course.push(Waypoint {
        title: Some("Final".to_owned()),
        description: "Destination".to_owned(),
        is_final: true,
        ..Waypoint::at(80.0, 50.0)
    });
    course
}

/// Read a JSON array of waypoints from `path`.
pub fn load_course(path: &Path) -> Result<Vec<Waypoint>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("Error parsing {}: {e}", path.display()))
}

/// The drawn route, flattened with `samples` points per segment.
///
/// With fewer than two waypoints there is no route; the curve then
/// collapses onto the first waypoint (zero length) or stays empty.
pub fn reference_curve(waypoints: &[Waypoint], samples: usize) -> PolylineCurve {
    let flattened = build_route(waypoints).flatten(samples);
    if flattened.is_empty() {
        let points: Vec<Point> = waypoints.first().map(Waypoint::position).into_iter().collect();
        return PolylineCurve::new(&Polyline::new(points));
    }
    PolylineCurve::new(&flattened)
}
