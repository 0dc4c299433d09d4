//! PNG rasterizer built on tiny-skia.
//!
//! Draws the same layers as [`to_svg`](crate::to_svg) into a square
//! pixmap. The plane is scaled to the requested size with a single
//! transform, so all geometry stays in plane units.

use tiny_skia::{
    Color, FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, Stroke, StrokeDash,
    Transform,
};
use waytrail_core::{PathCommand, RouteDefinition};

use crate::{MARKER_RADIUS, PLANE_SIZE, ROUTE_WIDTH, Scene, WAYPOINT_RADIUS, palette};

/// Largest accepted image side, in pixels.
pub const MAX_SIZE: u32 = 8192;

/// Samples per segment when measuring the drawn route.
const MEASURE_SAMPLES: usize = 32;

/// Errors from raster export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("image size must be between 1 and {max} pixels, got {size}", max = MAX_SIZE)]
    InvalidSize { size: u32 },

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// Render a scene into a `size` x `size` pixmap.
///
/// # Errors
///
/// Returns [`ExportError::InvalidSize`] if `size` is zero or larger than
/// [`MAX_SIZE`].
#[allow(clippy::cast_possible_truncation)]
pub fn render(scene: &Scene<'_>, size: u32) -> Result<Pixmap, ExportError> {
    if size == 0 || size > MAX_SIZE {
        return Err(ExportError::InvalidSize { size });
    }
    let mut pixmap = Pixmap::new(size, size).ok_or(ExportError::InvalidSize { size })?;
    pixmap.fill(color(palette::BACKGROUND));

    let scale = (f64::from(size) / PLANE_SIZE) as f32;
    let transform = Transform::from_scale(scale, scale);

    if let Some(path) = route_path(scene.route) {
        let stroke = Stroke {
            width: ROUTE_WIDTH as f32,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint(palette::ROUTE), &stroke, transform, None);

        if let Some(trail) = trail_stroke(scene, &stroke) {
            pixmap.stroke_path(&path, &paint(palette::TRAIL), &trail, transform, None);
        }
    }

    for (i, waypoint) in scene.waypoints.iter().enumerate() {
        let fill = if scene.is_visible(i) {
            palette::REACHED
        } else {
            palette::WAYPOINT
        };
        fill_circle(
            &mut pixmap,
            waypoint.left,
            waypoint.top,
            WAYPOINT_RADIUS,
            fill,
            transform,
        );
    }

    if let Some(marker) = scene.frame.marker {
        fill_circle(
            &mut pixmap,
            marker.x,
            marker.y,
            MARKER_RADIUS,
            palette::MARKER,
            transform,
        );
    }

    Ok(pixmap)
}

/// Render a scene and encode it as PNG.
///
/// # Errors
///
/// Returns [`ExportError::InvalidSize`] for an out-of-range `size` and
/// [`ExportError::Encode`] if PNG encoding fails.
pub fn to_png(scene: &Scene<'_>, size: u32) -> Result<Vec<u8>, ExportError> {
    let pixmap = render(scene, size)?;
    pixmap
        .encode_png()
        .map_err(|e| ExportError::Encode(e.to_string()))
}

#[allow(clippy::cast_possible_truncation)]
fn route_path(route: &RouteDefinition) -> Option<Path> {
    let mut pb = PathBuilder::new();
    for command in route.commands() {
        match *command {
            PathCommand::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
            PathCommand::CubicTo {
                control1,
                control2,
                end,
            } => pb.cubic_to(
                control1.x as f32,
                control1.y as f32,
                control2.x as f32,
                control2.y as f32,
                end.x as f32,
                end.y as f32,
            ),
        }
    }
    pb.finish()
}

/// The highlight stroke, or `None` while nothing has been traveled.
///
/// Traveled and remaining are measured along the reference curve, so the
/// dash is rescaled to the drawn route's own length.
#[allow(clippy::cast_possible_truncation)]
fn trail_stroke(scene: &Scene<'_>, base: &Stroke) -> Option<Stroke> {
    let (traveled, remaining) = scene.extent();
    if traveled <= 0.0 {
        return None;
    }
    if remaining <= 0.0 {
        return Some(base.clone());
    }

    let drawn = scene.route.flatten(MEASURE_SAMPLES).length();
    let ratio = drawn / (traveled + remaining);
    let Some(dash) = StrokeDash::new(
        vec![(traveled * ratio) as f32, (remaining * ratio) as f32],
        0.0,
    ) else {
        log::debug!("unusable trail dash {traveled}/{remaining}; trail skipped");
        return None;
    };
    Some(Stroke {
        dash: Some(dash),
        ..base.clone()
    })
}

#[allow(clippy::cast_possible_truncation)]
fn fill_circle(
    pixmap: &mut Pixmap,
    x: f64,
    y: f64,
    radius: f64,
    rgb: [u8; 3],
    transform: Transform,
) {
    if let Some(circle) = PathBuilder::from_circle(x as f32, y as f32, radius as f32) {
        pixmap.fill_path(&circle, &paint(rgb), FillRule::Winding, transform, None);
    }
}

fn color([r, g, b]: [u8; 3]) -> Color {
    Color::from_rgba8(r, g, b, 255)
}

fn paint(rgb: [u8; 3]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color(rgb));
    paint.anti_alias = true;
    paint
}
