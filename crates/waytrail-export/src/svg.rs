//! SVG serializer.
//!
//! Produces a standalone SVG document in the 100 x 100 plane. The route
//! is drawn twice with the same path data: once as the full muted course
//! and once as the highlight, whose dash pattern reveals only the traveled
//! part. `pathLength` is set on the highlight so the dash lengths, which
//! are measured along the reference curve, map onto the drawn path.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Circle, Description, Element, Path, Title};
use svg::node::{Node, Text, Value};

use waytrail_core::{PathCommand, RouteDefinition};

use crate::{MARKER_RADIUS, PLANE_SIZE, ROUTE_WIDTH, Scene, WAYPOINT_RADIUS, palette};

/// Metadata to embed in the SVG document.
///
/// When present, `title` and `description` become `<title>` and `<desc>`
/// right after the opening `<svg>` tag. Text is XML-escaped by the `svg`
/// crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    /// Engine configuration JSON, emitted inside `<metadata>` so exported
    /// frames can be reproduced.
    pub config_json: Option<&'a str>,
}

/// Build an SVG path `d` attribute string from a route.
///
/// Coordinates are formatted by the [`svg`] crate using `f32` precision.
/// An empty route gives an empty string.
///
/// # Examples
///
/// ```
/// use waytrail_core::{Waypoint, build_route};
/// use waytrail_export::route_path_data;
///
/// let route = build_route(&[Waypoint::at(16.0, 8.0), Waypoint::at(23.0, 20.0)]);
/// assert_eq!(route_path_data(&route), "M16,8 C3,14,36,14,23,20");
/// ```
#[must_use]
pub fn route_path_data(route: &RouteDefinition) -> String {
    if route.is_empty() {
        return String::new();
    }

    let mut data = Data::new();
    for command in route.commands() {
        data = match *command {
            PathCommand::MoveTo(p) => data.move_to((p.x, p.y)),
            PathCommand::CubicTo {
                control1,
                control2,
                end,
            } => data.cubic_curve_to((
                control1.x, control1.y, control2.x, control2.y, end.x, end.y,
            )),
        };
    }
    String::from(Value::from(data))
}

fn rgb([r, g, b]: [u8; 3]) -> String {
    format!("rgb({r},{g},{b})")
}

/// Serialize a scene into an SVG document string.
///
/// Layers, bottom to top: the route, the highlight (only once something
/// has been traveled), one circle per waypoint, and the marker (only
/// once a frame has been rendered).
#[must_use]
pub fn to_svg(scene: &Scene<'_>, metadata: &SvgMetadata<'_>) -> String {
    let mut doc = Document::new()
        .set("width", PLANE_SIZE)
        .set("height", PLANE_SIZE)
        .set("viewBox", format!("0 0 {PLANE_SIZE} {PLANE_SIZE}"));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }
    if let Some(config_json) = metadata.config_json {
        let mut engine_el = Element::new("waytrail:engine");
        engine_el.assign("xmlns:waytrail", "https://waytrail.dev/ns/1");
        engine_el.append(Text::new(config_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(engine_el);
        doc = doc.add(metadata_el);
    }

    let d = route_path_data(scene.route);
    if !d.is_empty() {
        doc = doc.add(
            Path::new()
                .set("id", "route")
                .set("d", d.clone())
                .set("fill", "none")
                .set("stroke", rgb(palette::ROUTE))
                .set("stroke-width", ROUTE_WIDTH),
        );

        let (traveled, remaining) = scene.extent();
        if traveled > 0.0 {
            let mut highlight = Path::new()
                .set("id", "trail")
                .set("d", d)
                .set("fill", "none")
                .set("stroke", rgb(palette::TRAIL))
                .set("stroke-width", ROUTE_WIDTH)
                .set("pathLength", traveled + remaining);
            if remaining > 0.0 {
                highlight = highlight.set("stroke-dasharray", format!("{traveled} {remaining}"));
            }
            doc = doc.add(highlight);
        }
    }

    for (i, waypoint) in scene.waypoints.iter().enumerate() {
        let (class, color) = if scene.is_visible(i) {
            ("waypoint reached", palette::REACHED)
        } else {
            ("waypoint", palette::WAYPOINT)
        };
        let mut circle = Circle::new()
            .set("class", class)
            .set("cx", waypoint.left)
            .set("cy", waypoint.top)
            .set("r", WAYPOINT_RADIUS)
            .set("fill", rgb(color));
        let label = waypoint.title.as_deref().unwrap_or(&waypoint.description);
        if !label.is_empty() {
            circle = circle.add(Title::new(label));
        }
        doc = doc.add(circle);
    }

    if let Some(marker) = scene.frame.marker {
        doc = doc.add(
            Circle::new()
                .set("id", "marker")
                .set("cx", marker.x)
                .set("cy", marker.y)
                .set("r", MARKER_RADIUS)
                .set("fill", rgb(palette::MARKER)),
        );
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}
