//! The per-fault timeline.
//!
//! Every declared fault runs as one task: pre-injection wait, the pattern's
//! active phase, post-injection wait. Sleeps are the only suspension points;
//! command execution blocks the task until the subprocess exits. Faults
//! interleave at sleep boundaries, so there is no shared state to guard
//! inside the engine. The kernel qdisc tree is the one implicit shared
//! resource: callers must not aim two faults at the same handle on the same
//! interface.

use crate::fault::{FaultPattern, Shape, Timing};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Timeline position of a live fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreWait,
    Active,
    /// The off part of a burst or degradation cycle.
    Gap,
    PostWait,
    Done,
}

/// Scheduler-local view of one fault's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveState {
    pub phase: Phase,
    pub step_index: usize,
    pub intensity: f64,
}

impl LiveState {
    fn new() -> Self {
        Self {
            phase: Phase::PreWait,
            step_index: 0,
            intensity: 0.0,
        }
    }
}

/// How a timeline finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
}

/// One activation toggle: the shape to synthesize with and how long the
/// fault stays on before the matching deactivation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StepCtx {
    pub shape: Shape,
    pub active_for: Duration,
}

/// The injector-specific half of the scheduler: turning a toggle into
/// commands and running them. Implementations must pair every `activate`
/// with the logger's active record and every `deactivate` with its
/// inactive record; the timeline guarantees the calls themselves pair up
/// on all exit paths, including cancellation.
#[async_trait]
pub(crate) trait Surface: Send + Sync {
    fn tag(&self) -> &str;

    /// Whether the fault can realize this pattern's toggle shapes. Refused
    /// patterns skip the active phase; the pre/post waits still happen.
    fn supports(&self, pattern: &FaultPattern) -> bool;

    async fn activate(&self, ctx: &StepCtx);
    async fn deactivate(&self, ctx: &StepCtx);
}

/// Sleep that loses the race against cancellation. Returns true when the
/// token fired first.
async fn cancelled_during(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

/// Drive one fault through its full timeline.
pub(crate) async fn drive(
    surface: &dyn Surface,
    pattern: &FaultPattern,
    timing: &Timing,
    cancel: &CancellationToken,
) -> Outcome {
    let tag = surface.tag();
    let mut state = LiveState::new();

    info!(
        "Fault {} waits {:?} of pre-injection time",
        tag, timing.pre
    );
    if cancelled_during(timing.pre, cancel).await {
        debug!("Fault {} cancelled before activation", tag);
        return Outcome::Cancelled;
    }

    if !surface.supports(pattern) {
        error!(
            "Fault {} cannot run pattern {:?}; skipping active phase",
            tag, pattern
        );
    } else {
        let cancelled = match pattern {
            FaultPattern::Persistent => {
                persistent(surface, Shape::Persistent, timing, &mut state, cancel).await
            }
            FaultPattern::Random { percent } => {
                persistent(surface, Shape::Random(*percent), timing, &mut state, cancel).await
            }
            FaultPattern::Burst { duration, period } => {
                burst(surface, *duration, *period, timing, &mut state, cancel).await
            }
            FaultPattern::Degradation {
                step,
                step_length,
                start,
                end,
            } => {
                degradation(
                    surface,
                    *step,
                    *step_length,
                    *start,
                    *end,
                    timing,
                    &mut state,
                    cancel,
                )
                .await
            }
        };
        if cancelled {
            info!("Fault {} cancelled, injection torn down", tag);
            return Outcome::Cancelled;
        }
    }

    state.phase = Phase::PostWait;
    info!(
        "Fault {} waits {:?} of post-injection time",
        tag, timing.post
    );
    if cancelled_during(timing.post, cancel).await {
        return Outcome::Cancelled;
    }

    state.phase = Phase::Done;
    debug!("Fault {} done", tag);
    Outcome::Completed
}

/// Single add, one full-length active window, single del. Also covers the
/// random pattern, whose probability is baked into the synthesized command.
async fn persistent(
    surface: &dyn Surface,
    shape: Shape,
    timing: &Timing,
    state: &mut LiveState,
    cancel: &CancellationToken,
) -> bool {
    info!("Fault {} commencing {:?}", surface.tag(), shape);
    let ctx = StepCtx {
        shape,
        active_for: timing.injection,
    };
    state.phase = Phase::Active;
    surface.activate(&ctx).await;
    let cancelled = cancelled_during(timing.injection, cancel).await;
    surface.deactivate(&ctx).await;
    cancelled
}

/// On/off cycles: `⌊injection / period⌋` of them, each `duration` on and
/// `period − duration` off. The sub-step sleeps always sum to one period,
/// so drift cannot accumulate inside the loop; the floor on the cycle
/// count absorbs the remainder of the injection window.
async fn burst(
    surface: &dyn Surface,
    duration: Duration,
    period: Duration,
    timing: &Timing,
    state: &mut LiveState,
    cancel: &CancellationToken,
) -> bool {
    let tag = surface.tag();
    if period.is_zero() {
        error!("Fault {} burst period is zero; skipping active phase", tag);
        return false;
    }
    let cycles = (timing.injection.as_secs_f64() / period.as_secs_f64()) as u64;
    let idle = period.saturating_sub(duration);
    info!(
        "Fault {} commencing burst: {} cycles of {:?} per {:?}",
        tag, cycles, duration, period
    );

    let ctx = StepCtx {
        shape: Shape::Persistent,
        active_for: duration,
    };
    for cycle in 0..cycles {
        state.step_index = cycle as usize;
        debug!("Fault {} burst cycle #{} enable", tag, cycle);
        state.phase = Phase::Active;
        surface.activate(&ctx).await;
        let cancelled = cancelled_during(duration, cancel).await;
        surface.deactivate(&ctx).await;
        if cancelled {
            return true;
        }
        debug!("Fault {} burst cycle #{} idle for {:?}", tag, cycle, idle);
        state.phase = Phase::Gap;
        if cancelled_during(idle, cancel).await {
            return true;
        }
    }
    false
}

/// The intensity ramp a degradation walks: starts at `start`, moves by
/// `step`, never exceeds `end`.
pub(crate) fn intensity_sequence(start: f64, step: f64, end: f64, steps: u64) -> Vec<f64> {
    let mut values = Vec::with_capacity(steps as usize);
    let mut intensity = start;
    for _ in 0..steps {
        values.push(intensity);
        intensity = (intensity + step).min(end);
    }
    values
}

/// Linear ramp: `⌊injection / step_length⌋` steps, each synthesized at the
/// ramp's current intensity, torn down, then stepped up.
#[allow(clippy::too_many_arguments)]
async fn degradation(
    surface: &dyn Surface,
    step: f64,
    step_length: Duration,
    start: f64,
    end: f64,
    timing: &Timing,
    state: &mut LiveState,
    cancel: &CancellationToken,
) -> bool {
    let tag = surface.tag();
    if step_length.is_zero() {
        error!(
            "Fault {} degradation step length is zero; skipping active phase",
            tag
        );
        return false;
    }
    let steps = (timing.injection.as_secs_f64() / step_length.as_secs_f64()) as u64;
    info!(
        "Fault {} commencing degradation: {} steps of {:?} from {} towards {}",
        tag, steps, step_length, start, end
    );

    for (index, intensity) in intensity_sequence(start, step, end, steps)
        .into_iter()
        .enumerate()
    {
        state.step_index = index;
        state.intensity = intensity;
        debug!("Fault {} degradation step #{} at {}", tag, index, intensity);
        let ctx = StepCtx {
            shape: Shape::Random(intensity),
            active_for: step_length,
        };
        state.phase = Phase::Active;
        surface.activate(&ctx).await;
        let cancelled = cancelled_during(step_length, cancel).await;
        state.phase = Phase::Gap;
        surface.deactivate(&ctx).await;
        if cancelled {
            return true;
        }
    }
    false
}
