//! End-to-end export of an animated course.
//!
//! Drives a scheduler through the virtual-time simulation, captures the
//! scene partway through and at the end, and checks both output formats.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use waytrail_core::sim::{Recorder, Simulation, deliver_next, run_to_end};
use waytrail_core::{AnimationScheduler, EngineConfig, Phase, PolylineCurve, Waypoint, build_route};
use waytrail_export::{Scene, SvgMetadata, to_png, to_svg};

fn course() -> Vec<Waypoint> {
    let mut waypoints = vec![
        Waypoint::at(16.0, 8.0),
        Waypoint::at(23.0, 20.0),
        Waypoint::at(40.0, 11.0),
        Waypoint::at(52.0, 20.0),
    ];
    waypoints[3].title = Some("Finish".to_owned());
    waypoints[3].is_final = true;
    waypoints
}

fn scheduler() -> AnimationScheduler<PolylineCurve, Simulation<Recorder>> {
    let waypoints = course();
    let curve = PolylineCurve::new(&build_route(&waypoints).flatten(64));
    let config = EngineConfig {
        frame_count: 10,
        dwell: Duration::from_millis(100),
        ..EngineConfig::default()
    };
    let sim = Simulation::new(Recorder::default()).with_frame_interval(Duration::from_millis(10));
    let mut scheduler = AnimationScheduler::new(curve, sim, config).unwrap();
    scheduler.configure(waypoints, false).unwrap();
    scheduler.start().unwrap();
    scheduler
}

#[test]
fn midway_frame_has_partial_trail() {
    let mut scheduler = scheduler();
    // Segment 0 (10 frames) and its dwell, then 5 frames into segment 1.
    for _ in 0..16 {
        deliver_next(&mut scheduler).unwrap();
    }
    assert!(matches!(scheduler.phase(), Phase::Animating { segment: 1, .. }));

    let frame = scheduler.host().sink().frame();
    assert!(frame.traveled > 0.0);
    assert!(frame.remaining > 0.0);

    let scene = Scene::capture(&scheduler, frame);
    assert_eq!(scene.visible, vec![true, false, false, false]);

    let svg = to_svg(&scene, &SvgMetadata::default());
    assert!(svg.contains("stroke-dasharray"));
    assert!(svg.contains("id=\"marker\""));
    assert_eq!(svg.matches("class=\"waypoint reached\"").count(), 1);
}

#[test]
fn finished_run_exports_every_waypoint_reached() {
    let mut scheduler = scheduler();
    run_to_end(&mut scheduler);
    assert_eq!(scheduler.phase(), Phase::Done);

    let frame = scheduler.host().sink().frame();
    let scene = Scene::capture(&scheduler, frame);
    assert!(scene.visible.iter().all(|&v| v));

    let svg = to_svg(
        &scene,
        &SvgMetadata {
            title: Some("demo"),
            ..SvgMetadata::default()
        },
    );
    assert!(svg.contains("<title>demo</title>"));
    assert!(svg.contains("<title>Finish</title>"));
    assert!(svg.contains("id=\"trail\""));

    let png = to_png(&scene, 128).unwrap();
    assert!(png.starts_with(b"\x89PNG"));
}
