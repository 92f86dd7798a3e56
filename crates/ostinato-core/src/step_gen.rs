//! Per-stepper step generation.
//!
//! A [`Stepper`] walks the move queue forward, asking the solver for the
//! time of each successive step boundary on its rail. Segments are cut into
//! monotone pieces at rail velocity reversals, so every solver call sees a
//! rail moving one way only, and the bracket restarts at the start of each
//! piece rather than carrying floating-point state across a turn.

use crate::{
    diagnostics::{DiagnosticKind, DiagnosticSink},
    itersolve::{Direction, IterativeSolver, Search, SolveOutcome},
    kinematics::{ActiveFlags, Kinematics, RailTransform},
    move_queue::{Coord, MoveQueue, MoveSegment, QueueError, SegmentId},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenerateError {
    #[error("no queued segment covers stepper cursor at {time}")]
    NotFound { time: f64 },
    #[error(transparent)]
    Queue(QueueError),
}

impl From<QueueError> for GenerateError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound { time } => GenerateError::NotFound { time },
            other => GenerateError::Queue(other),
        }
    }
}

pub type Result<T, E = GenerateError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Furthest a single `generate` call runs past the cursor, in seconds.
    pub horizon: f64,
    /// Capacity of each stepper's event buffer.
    pub step_buffer: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            step_buffer: default_step_buffer(),
        }
    }
}

fn default_horizon() -> f64 {
    0.1
}

fn default_step_buffer() -> usize {
    4096
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepEvent {
    Step { time: f64, dir: Direction },
    /// Direction pin change; precedes the first step in the new direction
    /// and is stamped with the start of the piece that moves that way.
    DirectionChange { time: f64, dir: Direction },
}

impl StepEvent {
    pub fn time(&self) -> f64 {
        match *self {
            StepEvent::Step { time, .. } | StepEvent::DirectionChange { time, .. } => time,
        }
    }

    pub fn dir(&self) -> Direction {
        match *self {
            StepEvent::Step { dir, .. } | StepEvent::DirectionChange { dir, .. } => dir,
        }
    }

    pub fn is_step(&self) -> bool {
        matches!(self, StepEvent::Step { .. })
    }
}

/// Fixed-capacity event buffer drained by the step transmitter.
#[derive(Debug)]
pub struct StepBuffer {
    events: Vec<StepEvent>,
    capacity: usize,
}

impl StepBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn free(&self) -> usize {
        self.capacity - self.events.len()
    }

    pub fn events(&self) -> &[StepEvent] {
        &self.events
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, StepEvent> {
        self.events.drain(..)
    }

    fn push(&mut self, event: StepEvent) {
        debug_assert!(self.events.len() < self.capacity);
        self.events.push(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateStatus {
    /// Reached the requested limit or the per-call horizon.
    Complete,
    /// Ran past the last queued segment; resumes once more is appended.
    Exhausted,
    /// The event buffer filled; resumes once it is drained.
    BufferFull,
    /// Halted on a fatal error; see [`Stepper::fault`].
    Faulted,
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    segment: Option<SegmentId>,
    // relative to the segment start while `segment` is set
    move_time: f64,
    time: f64,
    // absolute start of the monotone stretch the cursor is on; direction
    // changes are stamped here however generation is split into calls
    dir_origin: f64,
}

impl Cursor {
    fn at(time: f64) -> Self {
        Self {
            segment: None,
            move_time: 0.0,
            time,
            dir_origin: time,
        }
    }
}

// Why a monotone piece of a segment ends.
#[derive(Debug, Clone, Copy, PartialEq)]
enum PieceEnd {
    Reversal,
    Horizon,
    SegmentEnd,
}

/// Step generation state for one motor rail bound to one move queue.
pub struct Stepper<K = Kinematics> {
    name: String,
    kin: K,
    active: ActiveFlags,
    step_dist: f64,
    horizon: f64,
    origin: f64,
    step_count: i64,
    cursor: Cursor,
    last_dir: Option<Direction>,
    last_step_time: f64,
    buffer: StepBuffer,
    status: Option<GenerateStatus>,
    fault: Option<GenerateError>,
}

impl<K: RailTransform> Stepper<K> {
    pub fn new(name: impl Into<String>, kin: K, step_dist: f64, config: &GeneratorConfig) -> Self {
        let active = kin.active_axes();
        Self {
            name: name.into(),
            kin,
            active,
            step_dist,
            horizon: config.horizon,
            origin: 0.0,
            step_count: 0,
            cursor: Cursor::at(f64::NEG_INFINITY),
            last_dir: None,
            last_step_time: f64::NEG_INFINITY,
            buffer: StepBuffer::with_capacity(config.step_buffer),
            status: None,
            fault: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kinematics(&self) -> &K {
        &self.kin
    }

    pub fn step_dist(&self) -> f64 {
        self.step_dist
    }

    /// Signed number of steps taken since the last `set_position`.
    pub fn step_count(&self) -> i64 {
        self.step_count
    }

    /// Rail coordinate of the last emitted step boundary.
    pub fn position(&self) -> f64 {
        self.origin + self.step_count as f64 * self.step_dist
    }

    /// Absolute time generation has progressed to, if it has started.
    pub fn cursor_time(&self) -> Option<f64> {
        self.cursor.time.is_finite().then_some(self.cursor.time)
    }

    pub fn last_dir(&self) -> Option<Direction> {
        self.last_dir
    }

    pub fn fault(&self) -> Option<&GenerateError> {
        self.fault.as_ref()
    }

    /// Status returned by the most recent `generate` call.
    pub fn status(&self) -> Option<GenerateStatus> {
        self.status
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    pub fn buffer(&self) -> &StepBuffer {
        &self.buffer
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, StepEvent> {
        self.buffer.drain()
    }

    /// Place the rail at the coordinate of a stationary toolhead at `pos`,
    /// with generation resuming from `time`.
    pub fn set_position(&mut self, time: f64, pos: Coord) {
        self.origin = self.kin.position_from_coord(pos);
        self.step_count = 0;
        self.cursor = Cursor::at(time);
    }

    /// Stop generating with `err`. Later `generate` calls return it.
    pub fn halt<S: DiagnosticSink>(&mut self, err: GenerateError, sink: &mut S) {
        if self.fault.is_some() {
            return;
        }
        sink.report(&self.name, DiagnosticKind::Fault(err.clone()));
        self.fault = Some(err);
        self.status = Some(GenerateStatus::Faulted);
    }

    /// Generate steps up to `limit`, bounded by the configured horizon and
    /// by free buffer space.
    pub fn generate<S: DiagnosticSink>(
        &mut self,
        queue: &MoveQueue,
        solver: &IterativeSolver,
        limit: f64,
        sink: &mut S,
    ) -> Result<GenerateStatus> {
        if let Some(err) = &self.fault {
            return Err(err.clone());
        }
        let result = self.run(queue, solver, limit, sink);
        match &result {
            Ok(GenerateStatus::Exhausted) => sink.report(
                &self.name,
                DiagnosticKind::Exhausted {
                    time: self.cursor.time,
                },
            ),
            Ok(_) => {}
            Err(err) => {
                sink.report(&self.name, DiagnosticKind::Fault(err.clone()));
                self.fault = Some(err.clone());
            }
        }
        self.status = Some(match &result {
            Ok(status) => *status,
            Err(_) => GenerateStatus::Faulted,
        });
        result
    }

    fn run<S: DiagnosticSink>(
        &mut self,
        queue: &MoveQueue,
        solver: &IterativeSolver,
        limit: f64,
        sink: &mut S,
    ) -> Result<GenerateStatus> {
        if !self.cursor.time.is_finite() {
            match queue.start_time() {
                Some(start) => self.cursor = Cursor::at(start),
                None => return Ok(GenerateStatus::Exhausted),
            }
        }
        let end = limit.min(self.cursor.time + self.horizon);

        loop {
            if self.cursor.time >= end {
                return Ok(GenerateStatus::Complete);
            }
            // room for a direction change plus a step
            if self.buffer.free() < 2 {
                return Ok(GenerateStatus::BufferFull);
            }

            self.revalidate(queue, sink);
            let current = self
                .cursor
                .segment
                .and_then(|id| queue.get(id).map(|m| (id, m)));
            let (id, m) = match current {
                Some(found) => found,
                None => match queue.find_segment(self.cursor.time) {
                    Ok((id, m)) => {
                        self.cursor.segment = Some(id);
                        self.cursor.move_time = (self.cursor.time - m.start_time).clamp(0.0, m.duration);
                        self.cursor.dir_origin = self.cursor.dir_origin.max(m.start_time);
                        (id, m)
                    }
                    Err(QueueError::NotFound { time }) => {
                        // behind the queue head means the data was dropped
                        // under us; anything else is just not queued yet
                        return match queue.start_time() {
                            Some(start) if time < start => Err(GenerateError::NotFound { time }),
                            _ => Ok(GenerateStatus::Exhausted),
                        };
                    }
                    Err(err) => return Err(err.into()),
                },
            };

            let lo = self.cursor.move_time;
            let (hi, piece_end) = self.piece(m, lo, end);
            let dir = if self.active.is_active(m) {
                Direction::from_velocity(self.kin.velocity(m, 0.5 * (lo + hi)))
            } else {
                None
            };

            if let Some(dir) = dir {
                let search = Search {
                    lo,
                    hi,
                    target: self.position() + dir.sign() * self.step_dist,
                    dir,
                    step_dist: self.step_dist,
                    is_tail: piece_end == PieceEnd::SegmentEnd && queue.next_after(id).is_none(),
                };
                let outcome = solver.solve(&self.kin, m, search);
                if let SolveOutcome::Imprecise { move_time, warning } = outcome {
                    sink.report(
                        &self.name,
                        DiagnosticKind::Imprecision {
                            time: m.start_time + move_time,
                            warning,
                        },
                    );
                }
                if let Some(move_time) = outcome.move_time() {
                    self.emit(m, move_time, dir, sink);
                    continue;
                }
            }

            // Nothing left on this piece; move to the next one.
            match piece_end {
                PieceEnd::Reversal => {
                    self.cursor.move_time = hi;
                    self.cursor.dir_origin = m.start_time + hi;
                }
                PieceEnd::Horizon => {
                    self.cursor.move_time = hi;
                    self.cursor.time = end;
                    return Ok(GenerateStatus::Complete);
                }
                PieceEnd::SegmentEnd => match queue.next_after(id) {
                    Some((next_id, next)) => {
                        self.cursor.segment = Some(next_id);
                        self.cursor.move_time = 0.0;
                        self.cursor.time = next.start_time;
                        self.cursor.dir_origin = next.start_time;
                        continue;
                    }
                    None => {
                        // Detach so trimming the finished segment cannot
                        // strand the cursor.
                        self.cursor.segment = None;
                        self.cursor.time = m.end_time();
                        return Ok(if self.cursor.time >= end {
                            GenerateStatus::Complete
                        } else {
                            GenerateStatus::Exhausted
                        });
                    }
                },
            }
            self.cursor.time = m.start_time + self.cursor.move_time;
        }
    }

    /// Re-seek a cursor whose segment a flush cut short or discarded.
    ///
    /// `generate` does this on every pass. Call it right after flushing the
    /// queue so the cursor lands on the new tail before replacement motion
    /// is appended after it.
    pub fn revalidate<S: DiagnosticSink>(&mut self, queue: &MoveQueue, sink: &mut S) {
        let Some(id) = self.cursor.segment else {
            // detached at the end of a queue that has since shrunk
            if let Some(end) = queue.end_time()
                && self.cursor.time > end
            {
                self.reseek(None, end, sink);
            }
            return;
        };
        let reseek = match queue.get(id) {
            Some(m) if self.cursor.move_time > m.duration => m.end_time(),
            Some(_) => return,
            None => {
                let in_range = queue.end_time().is_none_or(|end| self.cursor.time <= end);
                let trimmed = queue.segments().next().is_none_or(|(front, _)| front > id);
                if in_range && trimmed {
                    // consumed and trimmed from the front
                    self.cursor.segment = None;
                    return;
                }
                // the flush left the segment before ours as the tail
                queue
                    .segments()
                    .take_while(|(other, _)| *other < id)
                    .last()
                    .map(|(_, m)| m.end_time())
                    .or(queue.end_time())
                    .unwrap_or(self.cursor.time)
            }
        };
        self.reseek(Some(id), reseek, sink);
    }

    fn reseek<S: DiagnosticSink>(&mut self, segment: Option<SegmentId>, time: f64, sink: &mut S) {
        let time = time.min(self.cursor.time);
        self.cursor = Cursor::at(time);
        sink.report(&self.name, DiagnosticKind::Invalidated { segment, time });
    }

    // End of the monotone piece starting at move time `lo`.
    fn piece(&self, m: &MoveSegment, lo: f64, end: f64) -> (f64, PieceEnd) {
        let (limit, kind) = if end < m.end_time() {
            ((end - m.start_time).clamp(lo, m.duration), PieceEnd::Horizon)
        } else {
            (m.duration, PieceEnd::SegmentEnd)
        };
        if self.active.is_active(m)
            && let Some(r) = self.kin.reversal_time(m, lo)
            && r < limit
        {
            return (r, PieceEnd::Reversal);
        }
        (limit, kind)
    }

    fn emit<S: DiagnosticSink>(
        &mut self,
        m: &MoveSegment,
        move_time: f64,
        dir: Direction,
        sink: &mut S,
    ) {
        let solved = m.start_time + move_time;
        debug_assert!(
            solved > self.last_step_time,
            "step at {solved} does not follow {}",
            self.last_step_time
        );
        let time = if solved > self.last_step_time {
            solved
        } else {
            let time = self.last_step_time + self.last_step_time.abs().max(1.0) * f64::EPSILON;
            sink.report(&self.name, DiagnosticKind::Retimed { solved, time });
            time
        };
        if self.last_dir != Some(dir) {
            self.buffer.push(StepEvent::DirectionChange {
                time: self.cursor.dir_origin.min(time).max(self.last_step_time),
                dir,
            });
            self.last_dir = Some(dir);
        }
        self.buffer.push(StepEvent::Step { time, dir });
        self.step_count += match dir {
            Direction::Forward => 1,
            Direction::Backward => -1,
        };
        self.last_step_time = time;
        self.cursor.move_time = move_time;
        self.cursor.time = m.start_time + move_time;
    }
}
