//! Signals raised while queueing moves and generating steps.
//!
//! Generation never fails silently: every pause, re-seek, imprecise
//! crossing and fault is reported to a [`DiagnosticSink`] tagged with its
//! source (a stepper name, or [`QUEUE_SOURCE`] for planner-facing errors).

use crate::{
    itersolve::ImprecisionWarning,
    move_queue::{QueueError, SegmentId},
    step_gen::GenerateError,
};

/// Source tag for errors raised by the move queue itself.
pub const QUEUE_SOURCE: &str = "queue";

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticKind {
    /// A crossing was returned as the bracket midpoint after the iteration
    /// bound was reached.
    Imprecision {
        time: f64,
        warning: ImprecisionWarning,
    },
    /// A solved step time did not advance past the previous step and was
    /// emitted at `time` instead.
    Retimed { solved: f64, time: f64 },
    /// Generation paused at `time` waiting for more queued motion.
    Exhausted { time: f64 },
    /// The segment under the cursor was discarded by a flush; the cursor
    /// re-seeks from `time`.
    Invalidated {
        segment: Option<SegmentId>,
        time: f64,
    },
    /// A planner append broke queue ordering.
    Ordering(QueueError),
    /// The stepper stopped generating.
    Fault(GenerateError),
}

impl DiagnosticKind {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DiagnosticKind::Ordering(_) | DiagnosticKind::Fault(_))
    }
}

pub trait DiagnosticSink {
    fn report(&mut self, source: &str, kind: DiagnosticKind);
}

// Null implementation for when diagnostics are not needed
impl DiagnosticSink for () {
    fn report(&mut self, _source: &str, _kind: DiagnosticKind) {}
}

#[derive(Default, Debug)]
pub struct RecordingSink {
    pub records: Vec<(String, DiagnosticKind)>,
}

impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&DiagnosticKind) -> bool) -> usize {
        self.records.iter().filter(|(_, k)| pred(k)).count()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&mut self, source: &str, kind: DiagnosticKind) {
        self.records.push((source.to_string(), kind));
    }
}

/// Forwards diagnostics to `tracing` at a level matching their severity.
#[derive(Default, Debug, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&mut self, source: &str, kind: DiagnosticKind) {
        match kind {
            DiagnosticKind::Imprecision { time, warning } => tracing::warn!(
                source,
                time,
                error = warning.error,
                step_time = warning.step_time,
                iterations = warning.iterations,
                "imprecise step time"
            ),
            DiagnosticKind::Retimed { solved, time } => {
                tracing::warn!(source, solved, time, "step time retimed to keep order")
            }
            DiagnosticKind::Exhausted { time } => {
                tracing::debug!(source, time, "waiting for queued moves")
            }
            DiagnosticKind::Invalidated { segment, time } => tracing::warn!(
                source,
                time,
                segment = ?segment,
                "cursor invalidated by flush, re-seeking"
            ),
            DiagnosticKind::Ordering(err) => tracing::error!(source, %err, "move rejected"),
            DiagnosticKind::Fault(err) => tracing::error!(source, %err, "step generation halted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_kinds() {
        assert!(DiagnosticKind::Fault(GenerateError::NotFound { time: 1.0 }).is_fatal());
        assert!(
            DiagnosticKind::Ordering(QueueError::Ordering {
                start_time: 0.0,
                tail_time: 1.0
            })
            .is_fatal()
        );
        assert!(!DiagnosticKind::Exhausted { time: 1.0 }.is_fatal());
        assert!(
            !DiagnosticKind::Retimed {
                solved: 1.0,
                time: 1.0 + f64::EPSILON
            }
            .is_fatal()
        );
    }

    #[test]
    fn recording_sink_keeps_source() {
        let mut sink = RecordingSink::default();
        sink.report("x", DiagnosticKind::Exhausted { time: 2.0 });
        TracingSink.report("x", DiagnosticKind::Exhausted { time: 2.0 });
        assert_eq!(sink.records.len(), 1);
        assert_eq!(sink.records[0].0, "x");
        assert_eq!(sink.count(|k| matches!(k, DiagnosticKind::Exhausted { .. })), 1);
    }
}
