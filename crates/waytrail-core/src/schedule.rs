//! The animation scheduler: a state machine that walks a marker along the
//! reference curve one segment at a time.
//!
//! ```text
//!             start()                 last frame               dwell
//!   Idle ───────────────▶ Animating(i) ──────────▶ Paused(i) ─────────▶ Animating(i + 1)
//!                              │                       │      (i + 1 = N)
//!                              │ cancelled             └────────────────▶ Done
//!                              ▼
//!                          Cancelled
//! ```
//!
//! The scheduler never waits or sleeps itself. It asks its [`Host`] for a
//! frame ([`FrameClock::request_frame`]) or a timer
//! ([`Timer::schedule_after`]) and hands over a [`Ticket`]. When the frame
//! or timer arrives, the host passes the ticket back through
//! [`AnimationScheduler::on_frame`] or [`AnimationScheduler::on_timer`].
//! At most one ticket is outstanding at a time, and tickets from an
//! earlier run are ignored, so a host that keeps delivering callbacks
//! after a run was cancelled or reconfigured cannot disturb the current
//! one.
//!
//! Everything runs on one thread. Cancellation is cooperative: raising
//! the [`CancelToken`] takes effect at the next frame or timer callback,
//! which then schedules nothing further.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::curve::{CurveGeometry, measured_length};
use crate::project::{ProjectedDistances, project_waypoints};
use crate::route::{RouteDefinition, build_route};
use crate::types::{EngineConfig, EngineError, Point, ProjectionError, RenderError, Waypoint};

/// Handle for one requested frame or timer callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    generation: u64,
    sequence: u64,
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.generation, self.sequence)
    }
}

/// Source of display-refresh callbacks.
pub trait FrameClock {
    /// Arrange for [`AnimationScheduler::on_frame`] to be called with
    /// `ticket` on the next frame.
    fn request_frame(&mut self, ticket: Ticket);
}

/// Source of delayed callbacks.
pub trait Timer {
    /// Arrange for [`AnimationScheduler::on_timer`] to be called with
    /// `ticket` once `delay` has elapsed.
    fn schedule_after(&mut self, delay: Duration, ticket: Ticket);
}

/// Receives the visual state of each frame.
pub trait RenderSink {
    /// Move the marker.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the update could not be applied.
    fn set_marker_position(&mut self, position: Point) -> Result<(), RenderError>;

    /// Split the reference curve into its traveled and remaining parts.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the update could not be applied.
    fn set_highlight_extent(&mut self, traveled: f64, remaining: f64) -> Result<(), RenderError>;

    /// Set the route drawn under the highlight.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the update could not be applied.
    fn set_route_definition(&mut self, route: &RouteDefinition) -> Result<(), RenderError>;
}

/// Receives `stepChanged` events.
pub trait StepListener {
    /// The marker has arrived at waypoint `index`.
    fn step_changed(&mut self, index: usize);
}

/// Everything the scheduler needs from its surroundings.
pub trait Host: FrameClock + Timer + RenderSink + StepListener {}

impl<T: FrameClock + Timer + RenderSink + StepListener + ?Sized> Host for T {}

/// Shared cancellation flag.
///
/// Clones share the flag, so a host can keep one and raise it when the
/// component that owns the scheduler goes away. A scheduler keeps the same
/// flag for its whole life: [`configure`](AnimationScheduler::configure)
/// and [`reset`](AnimationScheduler::reset) lower it rather than replace
/// it, so a handle taken earlier still reaches later runs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    /// Raise the flag. Idempotent.
    pub fn cancel(&self) {
        self.0.set(true);
    }

    /// Whether the flag has been raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }

    fn clear(&self) {
        self.0.set(false);
    }
}

/// Where the scheduler is in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Phase {
    /// Configured but not started, or reset.
    Idle,
    /// Moving along segment `segment`; `frame` frames have been rendered.
    Animating { segment: usize, frame: u32 },
    /// Dwelling at waypoint `segment`.
    Paused { segment: usize },
    /// Every waypoint has been visited and the last dwell has elapsed.
    Done,
    /// The run was cancelled.
    Cancelled,
}

impl Phase {
    /// `true` while animating or paused.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Animating { .. } | Self::Paused { .. })
    }
}

/// Result of a successful [`AnimationScheduler::configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureOutcome {
    /// Waypoints were projected onto the reference curve.
    Ready,
    /// The reference curve has zero length; every waypoint sits at distance
    /// 0 and every segment completes on its first frame.
    DegenerateCurve,
}

/// Serializable view of the animation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationSnapshot {
    pub phase: Phase,
    /// Last waypoint the marker arrived at; `None` before the first arrival.
    pub active_index: Option<usize>,
    /// Waypoints arrived at so far, ascending.
    pub visited: Vec<usize>,
    pub running: bool,
}

/// Data derived from the waypoints, cached until they are replaced.
#[derive(Debug, Clone, Default)]
struct Course {
    waypoints: Vec<Waypoint>,
    route: RouteDefinition,
    distances: ProjectedDistances,
    total_length: f64,
    hide_after_exit: bool,
}

/// Mutable state of the current run.
#[derive(Debug, Default)]
struct RunState {
    visited: BTreeSet<usize>,
    active: Option<usize>,
    render_failures: u32,
}

/// Consecutive render failures after which a run is abandoned.
pub const MAX_RENDER_FAILURES: u32 = 120;

/// Drives a marker along the reference curve, waypoint by waypoint.
///
/// `G` answers curve queries, `H` supplies frames and timers and receives
/// render updates and step events.
pub struct AnimationScheduler<G, H> {
    geometry: G,
    host: H,
    config: EngineConfig,
    course: Course,
    run: RunState,
    cancel: CancelToken,
    phase: Phase,
    pending: Option<Ticket>,
    generation: u64,
    sequence: u64,
}

impl<G: CurveGeometry, H: Host> AnimationScheduler<G, H> {
    /// Create an idle scheduler with no waypoints.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `config` fails
    /// [`EngineConfig::validate`].
    pub fn new(geometry: G, host: H, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            geometry,
            host,
            config,
            course: Course::default(),
            run: RunState::default(),
            cancel: CancelToken::default(),
            phase: Phase::Idle,
            pending: None,
            generation: 0,
            sequence: 0,
        })
    }

    /// Replace the waypoints and recompute the route and projected
    /// distances.
    ///
    /// Allowed in any phase: an active run is abandoned, outstanding
    /// tickets become stale, and the scheduler returns to
    /// [`Phase::Idle`]. On error nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotReady`] if the reference curve cannot be
    /// measured yet. Retry once it can.
    pub fn configure(
        &mut self,
        waypoints: Vec<Waypoint>,
        hide_after_exit: bool,
    ) -> Result<ConfigureOutcome, EngineError> {
        let (mut distances, outcome) =
            match project_waypoints(&waypoints, &self.geometry, &self.config.projector) {
                Ok(distances) => (distances, ConfigureOutcome::Ready),
                Err(ProjectionError::NotReady) => return Err(EngineError::NotReady),
                Err(err @ ProjectionError::DegenerateCurve { .. }) => {
                    log::warn!("{err}");
                    (
                        ProjectedDistances::zeros(waypoints.len()),
                        ConfigureOutcome::DegenerateCurve,
                    )
                }
            };

        if self.config.clamp_monotonic {
            let clamped = distances.clamp_monotonic();
            if clamped > 0 {
                log::warn!("{clamped} waypoint(s) project behind their predecessor; clamped");
            }
        }

        let total_length = if waypoints.is_empty() {
            0.0
        } else {
            measured_length(&self.geometry).unwrap_or(0.0)
        };
        log::debug!(
            "configured {} waypoints over a curve of length {total_length}",
            waypoints.len(),
        );

        self.course = Course {
            route: build_route(&waypoints),
            waypoints,
            distances,
            total_length,
            hide_after_exit,
        };
        self.invalidate_run();
        Ok(outcome)
    }

    /// Begin a run from the first waypoint.
    ///
    /// With no waypoints this is a no-op and the scheduler stays idle.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyRunning`] while animating or paused,
    /// [`EngineError::RunFinished`] after [`Phase::Done`] or
    /// [`Phase::Cancelled`] (call [`reset`](Self::reset) first), and
    /// [`EngineError::NotReady`] if the reference curve cannot be measured.
    pub fn start(&mut self) -> Result<(), EngineError> {
        match self.phase {
            Phase::Idle => {}
            Phase::Animating { .. } | Phase::Paused { .. } => {
                return Err(EngineError::AlreadyRunning);
            }
            Phase::Done | Phase::Cancelled => return Err(EngineError::RunFinished),
        }
        if self.course.waypoints.is_empty() {
            log::debug!("start ignored: no waypoints");
            return Ok(());
        }
        if measured_length(&self.geometry).is_none() {
            return Err(EngineError::NotReady);
        }
        if self.cancel.is_cancelled() {
            self.enter_cancelled();
            return Ok(());
        }

        log::info!("starting run over {} waypoints", self.course.waypoints.len());
        self.phase = Phase::Animating {
            segment: 0,
            frame: 0,
        };
        self.request_frame();
        Ok(())
    }

    /// Raise the cancellation signal.
    ///
    /// A running animation stops at its next frame or timer callback.
    /// Raised while idle, the signal holds until [`configure`](Self::configure)
    /// or [`reset`](Self::reset), and a [`start`](Self::start) in between
    /// ends in [`Phase::Cancelled`] without rendering. Returns `true` if a
    /// run was in progress.
    pub fn cancel(&mut self) -> bool {
        log::debug!("cancellation requested in {:?}", self.phase);
        self.cancel.cancel();
        self.phase.is_running()
    }

    /// Return to [`Phase::Idle`] with the same waypoints, forgetting
    /// visited waypoints and invalidating outstanding tickets.
    pub fn reset(&mut self) {
        self.invalidate_run();
    }

    /// Frame callback. Advances the marker by one frame.
    ///
    /// Tickets that are not the outstanding one are ignored.
    pub fn on_frame(&mut self, ticket: Ticket) {
        if !self.accept(ticket) {
            return;
        }
        if self.cancel.is_cancelled() {
            self.enter_cancelled();
            return;
        }
        let Phase::Animating { segment, frame } = self.phase else {
            log::debug!("frame {ticket} arrived in {:?}; ignored", self.phase);
            return;
        };
        let Some((start, end)) = self.course.distances.segment(segment) else {
            log::debug!("segment {segment} out of range; finishing run");
            self.phase = Phase::Done;
            return;
        };

        let frame_count = self.config.frame_count;
        let next = if self.course.total_length > 0.0 {
            frame + 1
        } else {
            frame_count
        };
        let distance = if next >= frame_count {
            end
        } else {
            (end - start).mul_add(f64::from(next) / f64::from(frame_count), start)
        };

        if let Err(err) = self.render(distance) {
            self.run.render_failures += 1;
            let failures = self.run.render_failures;
            if failures >= MAX_RENDER_FAILURES {
                log::error!("render failed {failures} times in a row, last: {err}; giving up");
                self.enter_cancelled();
                return;
            }
            if failures == 1 {
                log::warn!("segment {segment} frame {next} abandoned: {err}");
            } else {
                log::debug!("segment {segment} frame {next} abandoned again ({failures}): {err}");
            }
            self.request_frame();
            return;
        }
        self.run.render_failures = 0;

        if next < frame_count {
            self.phase = Phase::Animating {
                segment,
                frame: next,
            };
            self.request_frame();
        } else {
            self.complete_segment(segment);
        }
    }

    /// Timer callback. Ends the dwell at the current waypoint.
    ///
    /// Tickets that are not the outstanding one are ignored.
    pub fn on_timer(&mut self, ticket: Ticket) {
        if !self.accept(ticket) {
            return;
        }
        if self.cancel.is_cancelled() {
            self.enter_cancelled();
            return;
        }
        let Phase::Paused { segment } = self.phase else {
            log::debug!("timer {ticket} fired in {:?}; ignored", self.phase);
            return;
        };

        let next = segment + 1;
        if next < self.course.waypoints.len() {
            self.phase = Phase::Animating {
                segment: next,
                frame: 0,
            };
            self.request_frame();
        } else {
            log::info!("run finished after {} waypoints", self.course.waypoints.len());
            self.phase = Phase::Done;
        }
    }

    /// Whether the card for waypoint `index` should be shown.
    ///
    /// With `hide_after_exit`, only the waypoint the marker last arrived
    /// at is visible; otherwise every waypoint arrived at so far is.
    /// Out-of-range indices are never visible.
    #[must_use]
    pub fn is_visible(&self, index: usize) -> bool {
        if self.course.hide_after_exit {
            self.run.active == Some(index)
        } else {
            self.run.visited.contains(&index)
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Last waypoint the marker arrived at, `None` before the first.
    #[must_use]
    pub const fn active_index(&self) -> Option<usize> {
        self.run.active
    }

    /// Waypoints arrived at during the current run.
    #[must_use]
    pub const fn visited(&self) -> &BTreeSet<usize> {
        &self.run.visited
    }

    /// The waypoints of the current configuration.
    #[must_use]
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.course.waypoints
    }

    /// The cached route through the waypoints.
    #[must_use]
    pub const fn route(&self) -> &RouteDefinition {
        &self.course.route
    }

    /// The cached projected distances.
    #[must_use]
    pub const fn distances(&self) -> &ProjectedDistances {
        &self.course.distances
    }

    /// Length of the reference curve at configuration time.
    #[must_use]
    pub const fn total_length(&self) -> f64 {
        self.course.total_length
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The outstanding ticket, if a callback is expected.
    #[must_use]
    pub const fn pending(&self) -> Option<Ticket> {
        self.pending
    }

    /// A handle on the scheduler's cancellation flag.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The reference curve.
    #[must_use]
    pub const fn geometry(&self) -> &G {
        &self.geometry
    }

    /// The host.
    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// The host, mutably. Drivers use this to pull due callbacks.
    pub const fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Consume the scheduler and return its host.
    pub fn into_host(self) -> H {
        self.host
    }

    /// Serializable copy of the animation state.
    #[must_use]
    pub fn snapshot(&self) -> AnimationSnapshot {
        AnimationSnapshot {
            phase: self.phase,
            active_index: self.run.active,
            visited: self.run.visited.iter().copied().collect(),
            running: self.phase.is_running(),
        }
    }

    fn render(&mut self, distance: f64) -> Result<(), RenderError> {
        let position = self.geometry.point_at(distance);
        self.host.set_marker_position(position)?;
        self.host
            .set_highlight_extent(distance, self.course.total_length - distance)?;
        self.host.set_route_definition(&self.course.route)
    }

    fn complete_segment(&mut self, segment: usize) {
        self.run.visited.insert(segment);
        self.run.active = Some(segment);
        self.phase = Phase::Paused { segment };
        log::debug!("arrived at waypoint {segment}");
        self.host.step_changed(segment);

        let ticket = self.next_ticket();
        self.host.schedule_after(self.config.dwell, ticket);
    }

    fn enter_cancelled(&mut self) {
        log::info!("run cancelled in {:?}", self.phase);
        self.pending = None;
        self.phase = Phase::Cancelled;
    }

    /// Consume `ticket` if it is the outstanding one.
    fn accept(&mut self, ticket: Ticket) -> bool {
        if self.pending == Some(ticket) {
            self.pending = None;
            true
        } else {
            log::debug!("ignoring stale ticket {ticket}");
            false
        }
    }

    fn request_frame(&mut self) {
        let ticket = self.next_ticket();
        self.host.request_frame(ticket);
    }

    fn next_ticket(&mut self) -> Ticket {
        self.sequence = self.sequence.wrapping_add(1);
        let ticket = Ticket {
            generation: self.generation,
            sequence: self.sequence,
        };
        self.pending = Some(ticket);
        ticket
    }

    fn invalidate_run(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.pending = None;
        self.phase = Phase::Idle;
        self.run = RunState::default();
        self.cancel.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::curve::PolylineCurve;
    use crate::types::Polyline;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Request {
        Frame(Ticket),
        Timer(Duration, Ticket),
    }

    /// Host that records everything and lets the test deliver callbacks.
    #[derive(Default)]
    struct MockHost {
        requests: Vec<Request>,
        markers: Vec<Point>,
        extents: Vec<(f64, f64)>,
        routes: usize,
        steps: Vec<usize>,
        fail_marker: bool,
    }

    impl FrameClock for MockHost {
        fn request_frame(&mut self, ticket: Ticket) {
            self.requests.push(Request::Frame(ticket));
        }
    }

    impl Timer for MockHost {
        fn schedule_after(&mut self, delay: Duration, ticket: Ticket) {
            self.requests.push(Request::Timer(delay, ticket));
        }
    }

    impl RenderSink for MockHost {
        fn set_marker_position(&mut self, position: Point) -> Result<(), RenderError> {
            if self.fail_marker {
                return Err(RenderError("marker detached".to_string()));
            }
            self.markers.push(position);
            Ok(())
        }

        fn set_highlight_extent(&mut self, traveled: f64, remaining: f64) -> Result<(), RenderError> {
            self.extents.push((traveled, remaining));
            Ok(())
        }

        fn set_route_definition(&mut self, _route: &RouteDefinition) -> Result<(), RenderError> {
            self.routes += 1;
            Ok(())
        }
    }

    impl StepListener for MockHost {
        fn step_changed(&mut self, index: usize) {
            self.steps.push(index);
        }
    }

    type Scheduler = AnimationScheduler<PolylineCurve, MockHost>;

    fn straight_line() -> PolylineCurve {
        PolylineCurve::line(Point::new(0.0, 0.0), Point::new(100.0, 0.0))
    }

    fn three_stops() -> Vec<Waypoint> {
        vec![
            Waypoint::at(0.0, 0.0),
            Waypoint::at(50.0, 0.0),
            Waypoint::at(100.0, 0.0),
        ]
    }

    fn config(frame_count: u32) -> EngineConfig {
        EngineConfig {
            frame_count,
            ..EngineConfig::default()
        }
    }

    fn scheduler(frame_count: u32) -> Scheduler {
        let mut s =
            AnimationScheduler::new(straight_line(), MockHost::default(), config(frame_count))
                .unwrap();
        s.configure(three_stops(), false).unwrap();
        s
    }

    /// Deliver the most recent request. Returns `false` if there was none.
    fn deliver<G: CurveGeometry>(s: &mut AnimationScheduler<G, MockHost>) -> bool {
        match s.host().requests.last().copied() {
            Some(Request::Frame(ticket)) if s.pending() == Some(ticket) => {
                s.on_frame(ticket);
                true
            }
            Some(Request::Timer(_, ticket)) if s.pending() == Some(ticket) => {
                s.on_timer(ticket);
                true
            }
            _ => false,
        }
    }

    fn run_to_end<G: CurveGeometry>(s: &mut AnimationScheduler<G, MockHost>) {
        while deliver(s) {}
    }

    #[test]
    fn new_rejects_invalid_config() {
        let result = AnimationScheduler::new(straight_line(), MockHost::default(), config(0));
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn configure_caches_route_and_distances() {
        let s = scheduler(4);
        assert_eq!(s.distances().len(), 3);
        assert_eq!(s.route().segments().count(), 2);
        assert!((s.total_length() - 100.0).abs() < 1e-12);
        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(s.active_index(), None);
    }

    #[test]
    fn start_without_waypoints_is_a_noop() {
        let mut s =
            AnimationScheduler::new(straight_line(), MockHost::default(), config(4)).unwrap();
        s.start().unwrap();
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.host().requests.is_empty());
    }

    #[test]
    fn start_requests_first_frame() {
        let mut s = scheduler(4);
        s.start().unwrap();
        assert_eq!(
            s.phase(),
            Phase::Animating {
                segment: 0,
                frame: 0
            }
        );
        assert!(matches!(s.host().requests.as_slice(), [Request::Frame(_)]));
    }

    #[test]
    fn start_while_running_fails() {
        let mut s = scheduler(4);
        s.start().unwrap();
        assert_eq!(s.start(), Err(EngineError::AlreadyRunning));
        assert_eq!(s.host().requests.len(), 1);
    }

    #[test]
    fn start_after_done_requires_reset() {
        let mut s = scheduler(2);
        s.start().unwrap();
        run_to_end(&mut s);
        assert_eq!(s.phase(), Phase::Done);
        assert_eq!(s.start(), Err(EngineError::RunFinished));

        s.reset();
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.visited().is_empty());
        s.start().unwrap();
        run_to_end(&mut s);
        assert_eq!(s.host().steps, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn full_run_emits_steps_in_order_with_dwell() {
        let mut s = scheduler(4);
        s.start().unwrap();
        run_to_end(&mut s);

        assert_eq!(s.host().steps, vec![0, 1, 2]);
        assert_eq!(s.phase(), Phase::Done);
        assert_eq!(s.active_index(), Some(2));

        let timers: Vec<Duration> = s
            .host()
            .requests
            .iter()
            .filter_map(|r| match r {
                Request::Timer(delay, _) => Some(*delay),
                Request::Frame(_) => None,
            })
            .collect();
        assert_eq!(timers, vec![Duration::from_millis(1500); 3]);
    }

    #[test]
    fn frames_interpolate_between_projected_distances() {
        let mut s = scheduler(4);
        s.start().unwrap();
        // Segment 0 runs from 0 to ~0: four frames.
        for _ in 0..4 {
            assert!(deliver(&mut s));
        }
        assert!(matches!(s.phase(), Phase::Paused { segment: 0 }));
        assert!(deliver(&mut s)); // dwell
        for _ in 0..4 {
            assert!(deliver(&mut s));
        }
        let start = s.distances().as_slice()[0];
        let end = s.distances().as_slice()[1];
        let traveled: Vec<f64> = s.host().extents[4..8].iter().map(|e| e.0).collect();
        for (k, got) in traveled.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let want = start + (end - start) * (k as f64 + 1.0) / 4.0;
            assert!((got - want).abs() < 1e-9, "frame {k}: want {want}, got {got}");
        }
        for (traveled, remaining) in &s.host().extents {
            assert!((traveled + remaining - 100.0).abs() < 1e-9);
        }
        assert_eq!(s.host().routes, s.host().markers.len());
    }

    #[test]
    fn last_frame_snaps_to_segment_end() {
        let mut s = scheduler(3);
        s.start().unwrap();
        for _ in 0..3 {
            deliver(&mut s);
        }
        let end = s.distances().as_slice()[0];
        let last = *s.host().markers.last().unwrap();
        assert_eq!(last, s.geometry().point_at(end));
    }

    #[test]
    fn visited_tracks_active_index() {
        let mut s = scheduler(2);
        s.start().unwrap();
        let mut last_len = 0;
        while deliver(&mut s) {
            let len = s.visited().len();
            assert!(len >= last_len);
            if let Some(active) = s.active_index() {
                assert_eq!(len, active + 1);
            } else {
                assert_eq!(len, 0);
            }
            last_len = len;
        }
        assert_eq!(last_len, 3);
    }

    #[test]
    fn visibility_without_hide_after_exit_accumulates() {
        let mut s = scheduler(2);
        s.start().unwrap();
        assert!(!s.is_visible(0));
        run_to_end(&mut s);
        assert!(s.is_visible(0));
        assert!(s.is_visible(1));
        assert!(s.is_visible(2));
        assert!(!s.is_visible(3));
        assert!(!s.is_visible(usize::MAX));
    }

    #[test]
    fn visibility_with_hide_after_exit_is_exclusive() {
        let mut s = scheduler(2);
        s.configure(three_stops(), true).unwrap();
        s.start().unwrap();
        while deliver(&mut s) {
            for j in 0..4 {
                assert_eq!(s.is_visible(j), s.active_index() == Some(j));
            }
        }
        assert!(s.is_visible(2));
        assert!(!s.is_visible(0));
    }

    #[test]
    fn cancel_mid_segment_stops_everything() {
        let mut s = scheduler(10);
        s.start().unwrap();
        for _ in 0..3 {
            deliver(&mut s);
        }
        assert!(s.cancel());
        let requests_before = s.host().requests.len();
        let markers_before = s.host().markers.len();

        // The in-flight frame is delivered, observes the signal, and stops.
        assert!(deliver(&mut s));
        assert_eq!(s.phase(), Phase::Cancelled);
        assert!(!deliver(&mut s));
        assert_eq!(s.host().requests.len(), requests_before);
        assert_eq!(s.host().markers.len(), markers_before);
        assert!(s.host().steps.is_empty());
        assert!(!s.cancel());
    }

    #[test]
    fn cancel_during_dwell_stops_at_timer() {
        let mut s = scheduler(2);
        s.start().unwrap();
        deliver(&mut s);
        deliver(&mut s);
        assert!(matches!(s.phase(), Phase::Paused { segment: 0 }));
        s.cancel_token().cancel();
        assert!(deliver(&mut s));
        assert_eq!(s.phase(), Phase::Cancelled);
        assert_eq!(s.host().steps, vec![0]);
        assert!(s.pending().is_none());
    }

    #[test]
    fn cancel_when_idle_returns_false() {
        let mut s = scheduler(2);
        assert!(!s.cancel());
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn cancel_before_start_ends_the_next_run() {
        let mut s = scheduler(2);
        s.cancel();
        s.start().unwrap();
        assert_eq!(s.phase(), Phase::Cancelled);
        assert!(s.host().requests.is_empty());

        s.reset();
        s.start().unwrap();
        run_to_end(&mut s);
        assert_eq!(s.phase(), Phase::Done);
        assert_eq!(s.host().steps, vec![0, 1, 2]);
    }

    #[test]
    fn held_token_cancels_after_reconfigure() {
        let mut s = scheduler(4);
        let token = s.cancel_token();
        s.configure(three_stops(), false).unwrap();
        s.start().unwrap();
        deliver(&mut s);

        token.cancel();
        let requests_before = s.host().requests.len();
        assert!(deliver(&mut s));
        assert_eq!(s.phase(), Phase::Cancelled);
        assert_eq!(s.host().requests.len(), requests_before);

        s.reset();
        assert!(!token.is_cancelled());
        s.start().unwrap();
        token.cancel();
        assert!(deliver(&mut s));
        assert_eq!(s.phase(), Phase::Cancelled);
    }

    #[test]
    fn stale_tickets_are_ignored() {
        let mut s = scheduler(2);
        s.start().unwrap();
        let Some(Request::Frame(old)) = s.host().requests.last().copied() else {
            unreachable!("start requests a frame");
        };
        s.configure(three_stops(), false).unwrap();
        s.on_frame(old);
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.host().markers.is_empty());
    }

    #[test]
    fn duplicate_ticket_is_ignored() {
        let mut s = scheduler(4);
        s.start().unwrap();
        let Some(Request::Frame(ticket)) = s.host().requests.last().copied() else {
            unreachable!("start requests a frame");
        };
        s.on_frame(ticket);
        s.on_frame(ticket);
        assert_eq!(s.host().markers.len(), 1);
        assert_eq!(
            s.phase(),
            Phase::Animating {
                segment: 0,
                frame: 1
            }
        );
    }

    #[test]
    fn render_failure_abandons_frame_and_retries() {
        let mut s = scheduler(2);
        s.start().unwrap();
        s.host_mut().fail_marker = true;
        assert!(deliver(&mut s));
        assert_eq!(
            s.phase(),
            Phase::Animating {
                segment: 0,
                frame: 0
            }
        );
        assert!(s.pending().is_some());

        s.host_mut().fail_marker = false;
        run_to_end(&mut s);
        assert_eq!(s.host().steps, vec![0, 1, 2]);
    }

    #[test]
    fn persistent_render_failure_ends_the_run() {
        let mut s = scheduler(2);
        s.host_mut().fail_marker = true;
        s.start().unwrap();
        run_to_end(&mut s);
        assert_eq!(s.phase(), Phase::Cancelled);
        assert!(s.pending().is_none());
        assert!(s.host().steps.is_empty());
        assert!(s.host().markers.is_empty());
        assert_eq!(s.host().requests.len(), MAX_RENDER_FAILURES as usize);
    }

    #[test]
    fn render_failure_count_resets_after_a_good_frame() {
        let mut s = scheduler(1000);
        s.start().unwrap();
        for _ in 0..2 {
            s.host_mut().fail_marker = true;
            for _ in 1..MAX_RENDER_FAILURES {
                assert!(deliver(&mut s));
            }
            s.host_mut().fail_marker = false;
            assert!(deliver(&mut s));
        }
        assert!(s.phase().is_running());
        assert_eq!(s.host().markers.len(), 2);
    }

    #[test]
    fn degenerate_curve_completes_each_segment_in_one_frame() {
        let point = PolylineCurve::new(&Polyline::new(vec![Point::new(5.0, 5.0)]));
        let mut s = AnimationScheduler::new(point, MockHost::default(), config(100)).unwrap();
        let outcome = s.configure(three_stops(), false).unwrap();
        assert_eq!(outcome, ConfigureOutcome::DegenerateCurve);
        assert_eq!(s.distances().as_slice(), &[0.0, 0.0, 0.0]);

        s.start().unwrap();
        run_to_end(&mut s);
        assert_eq!(s.host().steps, vec![0, 1, 2]);
        assert_eq!(s.host().markers.len(), 3);
        assert_eq!(s.phase(), Phase::Done);
    }

    #[test]
    fn not_ready_geometry_fails_configure_and_keeps_state() {
        let empty = PolylineCurve::new(&Polyline::default());
        let mut s = AnimationScheduler::new(empty, MockHost::default(), config(2)).unwrap();
        assert_eq!(
            s.configure(three_stops(), false),
            Err(EngineError::NotReady)
        );
        assert!(s.waypoints().is_empty());
    }

    /// A straight line whose readiness the test flips.
    struct Gated {
        ready: Cell<bool>,
        line: PolylineCurve,
    }

    impl CurveGeometry for Gated {
        fn is_ready(&self) -> bool {
            self.ready.get()
        }

        fn total_length(&self) -> f64 {
            self.line.total_length()
        }

        fn point_at(&self, distance: f64) -> Point {
            self.line.point_at(distance)
        }
    }

    #[test]
    fn geometry_becoming_ready_recovers_from_not_ready() {
        let curve = Gated {
            ready: Cell::new(false),
            line: straight_line(),
        };
        let mut s = AnimationScheduler::new(&curve, MockHost::default(), config(2)).unwrap();
        assert_eq!(
            s.configure(three_stops(), false),
            Err(EngineError::NotReady)
        );

        curve.ready.set(true);
        assert_eq!(
            s.configure(three_stops(), false),
            Ok(ConfigureOutcome::Ready)
        );

        curve.ready.set(false);
        assert_eq!(s.start(), Err(EngineError::NotReady));
        assert_eq!(s.phase(), Phase::Idle);
        assert!(s.host().requests.is_empty());

        curve.ready.set(true);
        s.start().unwrap();
        run_to_end(&mut s);
        assert_eq!(s.phase(), Phase::Done);
        assert_eq!(s.host().steps, vec![0, 1, 2]);
    }

    #[test]
    fn out_of_order_waypoints_are_clamped() {
        let mut s =
            AnimationScheduler::new(straight_line(), MockHost::default(), config(2)).unwrap();
        s.configure(
            vec![
                Waypoint::at(60.0, 0.0),
                Waypoint::at(20.0, 0.0),
                Waypoint::at(90.0, 0.0),
            ],
            false,
        )
        .unwrap();
        let d = s.distances().as_slice();
        assert!(d[0] <= d[1] && d[1] <= d[2], "distances {d:?}");
    }

    #[test]
    fn snapshot_reflects_progress() {
        let mut s = scheduler(2);
        s.start().unwrap();
        deliver(&mut s);
        deliver(&mut s);
        let snapshot = s.snapshot();
        assert_eq!(snapshot.phase, Phase::Paused { segment: 0 });
        assert_eq!(snapshot.active_index, Some(0));
        assert_eq!(snapshot.visited, vec![0]);
        assert!(snapshot.running);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains(r#""state":"paused""#), "got {json}");
    }
}
