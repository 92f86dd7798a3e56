use anyhow::{Context, Result, bail};
use ostinato_core::{
    config::KernelConfig,
    diagnostics::DiagnosticSink,
    itersolve::Direction,
    kernel::MotionKernel,
    move_queue::{MoveSegment, QueueError},
    step_gen::{GenerateStatus, StepEvent},
};
use serde::Serialize;
use std::fmt::Write as _;

/// Everything one stepper emitted over a run.
#[derive(Debug, Clone, Serialize)]
pub struct StepperOutput {
    pub name: String,
    /// Rail coordinate of the last step boundary crossed
    pub position: f64,
    pub steps: usize,
    pub events: Vec<StepEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

/// Feed `moves` through a fresh kernel and generate up to `until`.
///
/// Moves are appended as queue space allows; generation between appends
/// drains step buffers and trims consumed segments to make room.
pub fn run<S: DiagnosticSink>(
    config: &KernelConfig,
    moves: &[MoveSegment],
    until: f64,
    sink: &mut S,
) -> Result<Vec<StepperOutput>> {
    let mut kernel = MotionKernel::new(config).context("failed to build motion kernel")?;
    let mut outputs: Vec<StepperOutput> = kernel
        .steppers()
        .iter()
        .map(|s| StepperOutput {
            name: s.name().to_string(),
            position: s.position(),
            steps: 0,
            events: Vec::new(),
            fault: None,
        })
        .collect();

    let mut pending = moves.iter().enumerate().peekable();
    loop {
        let mut appended = 0;
        while let Some(&(i, m)) = pending.peek() {
            match kernel.append(*m, sink) {
                Ok(_) => appended += 1,
                Err(QueueError::Full { .. }) => break,
                Err(err) => return Err(err).with_context(|| format!("move {i} rejected")),
            }
            pending.next();
        }

        let summary = kernel.generate(until, sink);
        let mut drained = 0;
        for (stepper, output) in kernel.steppers_mut().iter_mut().zip(&mut outputs) {
            let before = output.events.len();
            output.events.extend(stepper.drain());
            drained += output.events.len() - before;
        }
        tracing::trace!(appended, drained, ?summary, "generation pass");

        let busy = kernel.steppers().iter().any(|s| match s.status() {
            Some(GenerateStatus::BufferFull) => true,
            Some(GenerateStatus::Complete) => s.cursor_time().is_some_and(|t| t < until),
            _ => false,
        });
        let starved = summary.exhausted > 0 && pending.peek().is_some();
        if !busy && !starved {
            break;
        }
        if appended == 0 && drained == 0 && summary.trimmed == 0 && !busy {
            bail!(
                "no progress with {} moves pending; queue capacity {} is too small",
                pending.len(),
                kernel.queue().capacity()
            );
        }
    }

    for (stepper, output) in kernel.steppers().iter().zip(&mut outputs) {
        output.position = stepper.position();
        output.steps = output.events.iter().filter(|e| e.is_step()).count();
        output.fault = stepper.fault().map(|err| err.to_string());
    }
    Ok(outputs)
}

/// Plain-text step table, one block per stepper.
pub fn render_text(outputs: &[StepperOutput]) -> String {
    let mut out = String::new();
    for output in outputs {
        let _ = writeln!(
            out,
            "{}: {} steps, position {:.6}",
            output.name, output.steps, output.position
        );
        if let Some(fault) = &output.fault {
            let _ = writeln!(out, "  fault: {fault}");
        }
        for event in &output.events {
            let (kind, dir) = match *event {
                StepEvent::Step { dir, .. } => ("step", dir),
                StepEvent::DirectionChange { dir, .. } => ("dir", dir),
            };
            let sign = match dir {
                Direction::Forward => '+',
                Direction::Backward => '-',
            };
            let _ = writeln!(out, "  {:.6} {kind:<4} {sign}", event.time());
        }
    }
    out
}
