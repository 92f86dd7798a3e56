//! Motion kernel turning queued move segments into timed step events.
//!
//! The crate has no transport or MCU dependencies. A planner appends
//! [`move_queue::MoveSegment`]s, each [`step_gen::Stepper`] solves for the
//! times its rail crosses successive step boundaries, and the resulting
//! [`step_gen::StepEvent`]s are drained by whatever transmits them.

pub mod config;
pub mod diagnostics;
pub mod itersolve;
pub mod kernel;
pub mod kinematics;
pub mod move_queue;
pub mod step_gen;
