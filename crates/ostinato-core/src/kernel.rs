//! One move queue and the steppers generating from it.

use crate::{
    config::{ConfigError, KernelConfig},
    diagnostics::{DiagnosticKind, DiagnosticSink, QUEUE_SOURCE},
    itersolve::IterativeSolver,
    move_queue::{Coord, MoveQueue, MoveSegment, QueueError, SegmentId},
    step_gen::{GenerateError, GenerateStatus, Stepper},
};

/// Per-status stepper counts for one [`MotionKernel::generate`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub complete: usize,
    pub exhausted: usize,
    pub buffer_full: usize,
    pub faulted: usize,
    /// Segments trimmed from the queue after generation.
    pub trimmed: usize,
}

impl TickSummary {
    fn record(&mut self, status: GenerateStatus) {
        match status {
            GenerateStatus::Complete => self.complete += 1,
            GenerateStatus::Exhausted => self.exhausted += 1,
            GenerateStatus::BufferFull => self.buffer_full += 1,
            GenerateStatus::Faulted => self.faulted += 1,
        }
    }
}

/// Result of [`MotionKernel::flush`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlushSummary {
    /// Time motion was actually cut at; the new queue tail.
    pub cutoff: f64,
    pub dropped: usize,
}

pub struct MotionKernel {
    queue: MoveQueue,
    solver: IterativeSolver,
    steppers: Vec<Stepper>,
}

impl MotionKernel {
    pub fn new(config: &KernelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let steppers = config
            .steppers
            .iter()
            .map(|s| {
                Stepper::new(
                    s.name.clone(),
                    s.kinematics.build(),
                    s.step_distance,
                    &config.generator,
                )
            })
            .collect();
        tracing::debug!(
            steppers = config.steppers.len(),
            capacity = config.queue.capacity,
            "motion kernel configured"
        );
        Ok(Self {
            queue: MoveQueue::with_capacity(config.queue.capacity),
            solver: IterativeSolver::new(config.solver),
            steppers,
        })
    }

    pub fn queue(&self) -> &MoveQueue {
        &self.queue
    }

    pub fn solver(&self) -> &IterativeSolver {
        &self.solver
    }

    pub fn steppers(&self) -> &[Stepper] {
        &self.steppers
    }

    pub fn steppers_mut(&mut self) -> &mut [Stepper] {
        &mut self.steppers
    }

    pub fn stepper(&self, name: &str) -> Option<&Stepper> {
        self.steppers.iter().find(|s| s.name() == name)
    }

    pub fn stepper_mut(&mut self, name: &str) -> Option<&mut Stepper> {
        self.steppers.iter_mut().find(|s| s.name() == name)
    }

    /// Queue a planner segment. An ordering violation is reported to the
    /// sink and halts every stepper on the queue.
    pub fn append<S: DiagnosticSink>(
        &mut self,
        segment: MoveSegment,
        sink: &mut S,
    ) -> Result<SegmentId, QueueError> {
        let err = match self.queue.append(segment) {
            Ok(id) => return Ok(id),
            Err(err) => err,
        };
        if matches!(err, QueueError::Ordering { .. }) {
            sink.report(QUEUE_SOURCE, DiagnosticKind::Ordering(err.clone()));
            tracing::error!(%err, "halting steppers on move ordering violation");
            for stepper in &mut self.steppers {
                stepper.halt(GenerateError::Queue(err.clone()), sink);
            }
        }
        Err(err)
    }

    /// Discard queued motion after `cutoff`.
    ///
    /// Steps already emitted cannot be recalled, so the cut never lands
    /// before the furthest point a live stepper has generated to. Cursors
    /// on discarded motion re-seek from the new tail immediately; the
    /// planner appends replacement motion from `FlushSummary::cutoff`.
    pub fn flush<S: DiagnosticSink>(&mut self, cutoff: f64, sink: &mut S) -> FlushSummary {
        let frontier = self
            .steppers
            .iter()
            .filter(|s| !s.is_faulted())
            .filter_map(|s| s.cursor_time())
            .fold(f64::NEG_INFINITY, f64::max);
        let cutoff = cutoff.max(frontier);
        let dropped = self.queue.flush(cutoff);
        for stepper in self.steppers.iter_mut().filter(|s| !s.is_faulted()) {
            stepper.revalidate(&self.queue, sink);
        }
        tracing::debug!(cutoff, dropped, "flushed move queue");
        FlushSummary { cutoff, dropped }
    }

    /// Declare the toolhead stationary at `pos` from `time` on, rebasing
    /// every stepper onto it.
    pub fn set_position(&mut self, time: f64, pos: Coord) -> Result<(), QueueError> {
        self.queue.set_position(time, pos)?;
        for stepper in &mut self.steppers {
            stepper.set_position(time, pos);
        }
        Ok(())
    }

    /// Run every stepper up to `limit`, then trim segments all live
    /// steppers are done with. A faulted stepper is skipped and no longer
    /// holds back trimming.
    pub fn generate<S: DiagnosticSink>(&mut self, limit: f64, sink: &mut S) -> TickSummary {
        let mut summary = TickSummary::default();
        for stepper in &mut self.steppers {
            let status = stepper
                .generate(&self.queue, &self.solver, limit, sink)
                .unwrap_or(GenerateStatus::Faulted);
            summary.record(status);
        }
        summary.trimmed = self.trim();
        summary
    }

    fn trim(&mut self) -> usize {
        let mut oldest: Option<f64> = None;
        for stepper in self.steppers.iter().filter(|s| !s.is_faulted()) {
            match stepper.cursor_time() {
                Some(t) => oldest = Some(oldest.map_or(t, |o| o.min(t))),
                // not started yet; everything queued is still needed
                None => return 0,
            }
        }
        oldest.map_or(0, |t| self.queue.trim(t))
    }
}
