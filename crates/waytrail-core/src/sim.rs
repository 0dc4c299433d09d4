//! Deterministic virtual-time host.
//!
//! [`Simulation`] plays the frame clock and the timer for an
//! [`AnimationScheduler`] without a display: frames arrive every
//! `frame_interval` of virtual time, timers after their delay, and the
//! driver pulls callbacks in due order with [`deliver_next`] or
//! [`run_to_end`]. Render updates and step events are forwarded to an
//! inner sink, typically a [`Recorder`].

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

use crate::curve::CurveGeometry;
use crate::route::RouteDefinition;
use crate::schedule::{AnimationScheduler, FrameClock, RenderSink, StepListener, Ticket, Timer};
use crate::types::{Point, RenderError};

/// A callback waiting in the simulation queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    Frame(Ticket),
    Timer(Ticket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scheduled {
    due: Duration,
    /// Insertion order, so equal due times pop first-in first-out.
    order: u64,
    callback: Callback,
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.order).cmp(&(other.due, other.order))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A step event with the virtual time it fired at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRecord {
    pub index: usize,
    pub at: Duration,
}

/// Virtual frame clock and timer wrapped around a render sink.
#[derive(Debug)]
pub struct Simulation<S> {
    now: Duration,
    frame_interval: Duration,
    queue: BinaryHeap<Reverse<Scheduled>>,
    order: u64,
    frames_requested: usize,
    timers_scheduled: usize,
    steps: Vec<StepRecord>,
    sink: S,
}

impl<S> Simulation<S> {
    /// One frame at 60 Hz.
    pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

    /// A simulation at time zero with a 60 Hz frame clock.
    pub const fn new(sink: S) -> Self {
        Self {
            now: Duration::ZERO,
            frame_interval: Self::DEFAULT_FRAME_INTERVAL,
            queue: BinaryHeap::new(),
            order: 0,
            frames_requested: 0,
            timers_scheduled: 0,
            steps: Vec::new(),
            sink,
        }
    }

    /// Use `interval` between frames instead of the 60 Hz default.
    #[must_use]
    pub const fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Current virtual time.
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// Due time of the next queued callback.
    #[must_use]
    pub fn next_due(&self) -> Option<Duration> {
        self.queue.peek().map(|Reverse(s)| s.due)
    }

    /// Number of queued callbacks.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Frames requested so far.
    #[must_use]
    pub const fn frames_requested(&self) -> usize {
        self.frames_requested
    }

    /// Timers scheduled so far.
    #[must_use]
    pub const fn timers_scheduled(&self) -> usize {
        self.timers_scheduled
    }

    /// Step events with their virtual times.
    #[must_use]
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// The inner sink.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// The inner sink, mutably.
    pub const fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the simulation and return the inner sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Remove the earliest callback and advance virtual time to it.
    pub fn pop(&mut self) -> Option<Callback> {
        let Reverse(next) = self.queue.pop()?;
        self.now = self.now.max(next.due);
        Some(next.callback)
    }

    fn push(&mut self, delay: Duration, callback: Callback) {
        self.order += 1;
        self.queue.push(Reverse(Scheduled {
            due: self.now + delay,
            order: self.order,
            callback,
        }));
    }
}

impl<S> FrameClock for Simulation<S> {
    fn request_frame(&mut self, ticket: Ticket) {
        self.frames_requested += 1;
        self.push(self.frame_interval, Callback::Frame(ticket));
    }
}

impl<S> Timer for Simulation<S> {
    fn schedule_after(&mut self, delay: Duration, ticket: Ticket) {
        self.timers_scheduled += 1;
        self.push(delay, Callback::Timer(ticket));
    }
}

impl<S: RenderSink> RenderSink for Simulation<S> {
    fn set_marker_position(&mut self, position: Point) -> Result<(), RenderError> {
        self.sink.set_marker_position(position)
    }

    fn set_highlight_extent(&mut self, traveled: f64, remaining: f64) -> Result<(), RenderError> {
        self.sink.set_highlight_extent(traveled, remaining)
    }

    fn set_route_definition(&mut self, route: &RouteDefinition) -> Result<(), RenderError> {
        self.sink.set_route_definition(route)
    }
}

impl<S: StepListener> StepListener for Simulation<S> {
    fn step_changed(&mut self, index: usize) {
        self.steps.push(StepRecord {
            index,
            at: self.now,
        });
        self.sink.step_changed(index);
    }
}

/// Deliver the earliest queued callback to `scheduler`.
///
/// Returns the callback, or `None` when the queue is empty.
pub fn deliver_next<G, S>(scheduler: &mut AnimationScheduler<G, Simulation<S>>) -> Option<Callback>
where
    G: CurveGeometry,
    S: RenderSink + StepListener,
{
    let callback = scheduler.host_mut().pop()?;
    match callback {
        Callback::Frame(ticket) => scheduler.on_frame(ticket),
        Callback::Timer(ticket) => scheduler.on_timer(ticket),
    }
    Some(callback)
}

/// Deliver callbacks until none are queued. Returns how many were delivered.
pub fn run_to_end<G, S>(scheduler: &mut AnimationScheduler<G, Simulation<S>>) -> usize
where
    G: CurveGeometry,
    S: RenderSink + StepListener,
{
    let mut delivered = 0;
    while deliver_next(scheduler).is_some() {
        delivered += 1;
    }
    delivered
}

/// The most recent render state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameState {
    /// Marker position, once a frame has been rendered.
    pub marker: Option<Point>,
    /// Arc length already traveled.
    pub traveled: f64,
    /// Arc length still ahead.
    pub remaining: f64,
}

/// Render sink and step listener that keeps what it was told.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    frame: FrameState,
    route: Option<RouteDefinition>,
    trail: Vec<Point>,
    steps: Vec<usize>,
}

impl Recorder {
    /// The latest render state.
    #[must_use]
    pub const fn frame(&self) -> FrameState {
        self.frame
    }

    /// The latest route definition.
    #[must_use]
    pub const fn route(&self) -> Option<&RouteDefinition> {
        self.route.as_ref()
    }

    /// Every marker position, in order.
    #[must_use]
    pub fn trail(&self) -> &[Point] {
        &self.trail
    }

    /// Step indices in the order they fired.
    #[must_use]
    pub fn steps(&self) -> &[usize] {
        &self.steps
    }
}

impl RenderSink for Recorder {
    fn set_marker_position(&mut self, position: Point) -> Result<(), RenderError> {
        self.frame.marker = Some(position);
        self.trail.push(position);
        Ok(())
    }

    fn set_highlight_extent(&mut self, traveled: f64, remaining: f64) -> Result<(), RenderError> {
        self.frame.traveled = traveled;
        self.frame.remaining = remaining;
        Ok(())
    }

    fn set_route_definition(&mut self, route: &RouteDefinition) -> Result<(), RenderError> {
        // The scheduler resends the cached route every frame.
        if self.route.as_ref() != Some(route) {
            self.route = Some(route.clone());
        }
        Ok(())
    }
}

impl StepListener for Recorder {
    fn step_changed(&mut self, index: usize) {
        self.steps.push(index);
    }
}
