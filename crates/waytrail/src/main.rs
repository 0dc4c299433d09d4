//! waytrail: play a waypoint route animation and export frames.
//!
//! Projects a course of waypoints onto its own drawn route, then animates
//! the marker segment by segment in virtual time, printing each arrival
//! with its timestamp. The final (or interrupted) frame can be written as
//! SVG or PNG.
//!
//! # Usage
//!
//! ```text
//! cargo run --bin waytrail -- [OPTIONS] [COURSE_JSON]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod course;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use serde::Serialize;
use waytrail_core::sim::{Recorder, Simulation, deliver_next};
use waytrail_core::{
    AnimationScheduler, AnimationSnapshot, ConfigureOutcome, EngineConfig, PolylineCurve,
    Waypoint,
};
use waytrail_export::{Scene, SvgMetadata, to_png, to_svg};

/// Play a waypoint route animation in virtual time.
///
/// Loads a course (or the built-in demo), runs the marker from the first
/// waypoint to the last, and reports when it arrives at each one.
#[derive(Parser)]
#[command(name = "waytrail", version)]
struct Cli {
    /// JSON file with an array of waypoints. Defaults to the built-in
    /// demo course.
    course: Option<PathBuf>,

    /// Show only the waypoint the marker last arrived at.
    #[arg(long)]
    hide_after_exit: bool,

    /// Frame rate of the virtual display, in Hz.
    #[arg(long, default_value_t = 60.0)]
    frame_rate: f64,

    /// Frames per segment.
    #[arg(long, default_value_t = EngineConfig::DEFAULT_FRAME_COUNT, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    frames: u32,

    /// Pause at each waypoint, in milliseconds [default: 1500].
    #[arg(long)]
    dwell_ms: Option<u64>,

    /// Let the marker run backwards when waypoints project out of order.
    #[arg(long)]
    no_clamp: bool,

    /// Points per route segment when flattening the route into the
    /// reference curve.
    #[arg(long, default_value_t = 64, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    samples: usize,

    /// Full engine config as a JSON string.
    ///
    /// When provided, `--frames`, `--dwell-ms`, and `--no-clamp` are
    /// ignored. Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Cancel the run once virtual time passes this many milliseconds.
    #[arg(long, value_name = "MS")]
    stop_after_ms: Option<u64>,

    /// Wait in real time until each callback is due.
    #[arg(long)]
    realtime: bool,

    /// Print a JSON report instead of one line per arrival.
    #[arg(long)]
    json: bool,

    /// Write the last frame as SVG.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Write the last frame as PNG.
    #[arg(long)]
    png: Option<PathBuf>,

    /// Side of the PNG image, in pixels.
    #[arg(long, default_value_t = 800)]
    png_size: u32,

    /// Log engine transitions.
    #[arg(short, long)]
    verbose: bool,
}

type Player = AnimationScheduler<PolylineCurve, Simulation<Recorder>>;

/// Build an [`EngineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<EngineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(EngineConfig {
        frame_count: cli.frames,
        dwell: cli
            .dwell_ms
            .map_or(EngineConfig::DEFAULT_DWELL, Duration::from_millis),
        clamp_monotonic: !cli.no_clamp,
        ..EngineConfig::default()
    })
}

fn frame_interval(frame_rate: f64) -> Result<Duration, String> {
    if !frame_rate.is_finite() || frame_rate <= 0.0 {
        return Err(format!("--frame-rate must be positive, got {frame_rate}"));
    }
    Duration::try_from_secs_f64(frame_rate.recip())
        .map_err(|e| format!("--frame-rate {frame_rate} is out of range: {e}"))
}

fn build_player(cli: &Cli, waypoints: Vec<Waypoint>) -> Result<Player, String> {
    let config = config_from_cli(cli)?;
    let interval = frame_interval(cli.frame_rate)?;
    let curve = course::reference_curve(&waypoints, cli.samples);
    let sim = Simulation::new(Recorder::default()).with_frame_interval(interval);

    let mut player = AnimationScheduler::new(curve, sim, config).map_err(|e| e.to_string())?;
    match player.configure(waypoints, cli.hide_after_exit) {
        Ok(ConfigureOutcome::Ready) => {}
        Ok(ConfigureOutcome::DegenerateCurve) => {
            eprintln!("Route has zero length; every segment completes on its first frame.");
        }
        Err(e) => return Err(e.to_string()),
    }
    Ok(player)
}

/// Deliver callbacks until the queue drains.
///
/// Once a callback is due after `stop_after` the run is cancelled; that
/// callback then ends it without rendering. Returns the number of
/// callbacks delivered.
fn play(player: &mut Player, stop_after: Option<Duration>, realtime: bool) -> usize {
    let started = Instant::now();
    let mut delivered = 0;
    while let Some(due) = player.host().next_due() {
        if stop_after.is_some_and(|limit| due > limit) && player.cancel() {
            log::info!("cancelled at {} ms of virtual time", due.as_millis());
        }
        if realtime {
            if let Some(wait) = due.checked_sub(started.elapsed()) {
                std::thread::sleep(wait);
            }
        }
        if deliver_next(player).is_none() {
            break;
        }
        delivered += 1;
    }
    delivered
}

/// One arrival, as printed in the JSON report.
#[derive(Serialize)]
struct Arrival<'a> {
    index: usize,
    at_ms: f64,
    title: Option<&'a str>,
    is_final: bool,
}

/// Everything `--json` prints.
#[derive(Serialize)]
struct Report<'a> {
    config: &'a EngineConfig,
    route: String,
    total_length: f64,
    distances: &'a [f64],
    arrivals: Vec<Arrival<'a>>,
    frames_requested: usize,
    timers_scheduled: usize,
    elapsed_ms: f64,
    snapshot: AnimationSnapshot,
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn arrivals(player: &Player) -> Vec<Arrival<'_>> {
    player
        .host()
        .steps()
        .iter()
        .map(|step| {
            let waypoint = player.waypoints().get(step.index);
            Arrival {
                index: step.index,
                at_ms: millis(step.at),
                title: waypoint.and_then(|w| w.title.as_deref()),
                is_final: waypoint.is_some_and(|w| w.is_final),
            }
        })
        .collect()
}

fn print_report(player: &Player) -> Result<(), String> {
    let report = Report {
        config: player.config(),
        route: player.route().to_string(),
        total_length: player.total_length(),
        distances: player.distances().as_slice(),
        arrivals: arrivals(player),
        frames_requested: player.host().frames_requested(),
        timers_scheduled: player.host().timers_scheduled(),
        elapsed_ms: millis(player.host().now()),
        snapshot: player.snapshot(),
    };
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| format!("Error serializing report: {e}"))?;
    println!("{json}");
    Ok(())
}

fn print_summary(player: &Player) {
    for arrival in arrivals(player) {
        let label = arrival.title.unwrap_or("");
        let flag = if arrival.is_final { " (final)" } else { "" };
        println!(
            "{:>10.1} ms  step {:>3}  {label}{flag}",
            arrival.at_ms, arrival.index
        );
    }
    let host = player.host();
    eprintln!();
    eprintln!(
        "{:?} after {:.1} ms ({} frames, {} timers)",
        player.phase(),
        millis(host.now()),
        host.frames_requested(),
        host.timers_scheduled(),
    );
}

fn export(cli: &Cli, player: &Player) -> Result<(), String> {
    let scene = Scene::capture(player, player.host().sink().frame());

    if let Some(ref svg_path) = cli.svg {
        let config_json = serde_json::to_string(player.config())
            .map_err(|e| format!("Error serializing config: {e}"))?;
        let description = format!(
            "{} waypoints, {:?} after {:.1} ms",
            player.waypoints().len(),
            player.phase(),
            millis(player.host().now()),
        );
        let title = cli
            .course
            .as_deref()
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .unwrap_or("demo course");
        let metadata = SvgMetadata {
            title: Some(title),
            description: Some(&description),
            config_json: Some(&config_json),
        };
        std::fs::write(svg_path, to_svg(&scene, &metadata))
            .map_err(|e| format!("Error writing SVG to {}: {e}", svg_path.display()))?;
        eprintln!("SVG written to {}", svg_path.display());
    }

    if let Some(ref png_path) = cli.png {
        let png = to_png(&scene, cli.png_size).map_err(|e| e.to_string())?;
        std::fs::write(png_path, png)
            .map_err(|e| format!("Error writing PNG to {}: {e}", png_path.display()))?;
        eprintln!("PNG written to {}", png_path.display());
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), String> {
    let waypoints = match cli.course {
        Some(ref path) => course::load_course(path)?,
        None => course::demo_course(),
    };
    if waypoints.is_empty() {
        return Err("Course has no waypoints".to_owned());
    }

    let mut player = build_player(cli, waypoints)?;
    player.start().map_err(|e| e.to_string())?;
    let delivered = play(
        &mut player,
        cli.stop_after_ms.map(Duration::from_millis),
        cli.realtime,
    );
    log::debug!("delivered {delivered} callbacks");

    if cli.json {
        print_report(&player)?;
    } else {
        print_summary(&player);
    }
    export(cli, &player)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}
