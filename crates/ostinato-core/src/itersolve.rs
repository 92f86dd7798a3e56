// Iterative solver for rail crossing times
//
// Finds the move time at which a rail reaches a target coordinate inside
// one monotone window of a segment. The window must not contain a rail
// velocity reversal; the step generator splits segments at reversals
// before asking for crossings.

use crate::{kinematics::RailTransform, move_queue::MoveSegment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Bracket width, in seconds, at which a crossing counts as converged.
    pub time_epsilon: f64,
    /// Iterations before the bracket midpoint is returned as best effort.
    /// Raised per call to the floor needed for the one-step error bound.
    pub max_iterations: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_epsilon: default_time_epsilon(),
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_time_epsilon() -> f64 {
    1e-9
}

// Two iterations per halving shrinks a 4 s window below 1 ns.
fn default_max_iterations() -> u32 {
    64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Backward => -1.0,
        }
    }

    pub fn from_velocity(v: f64) -> Option<Self> {
        if v > 0.0 {
            Some(Direction::Forward)
        } else if v < 0.0 {
            Some(Direction::Backward)
        } else {
            None
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// Best-effort result of a search that ran out of iterations.
///
/// `error` is half the final bracket width and is always below
/// `step_time`, the duration of one step at the segment's peak endpoint
/// speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImprecisionWarning {
    pub error: f64,
    pub step_time: f64,
    pub iterations: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveOutcome {
    Found {
        move_time: f64,
    },
    Imprecise {
        move_time: f64,
        warning: ImprecisionWarning,
    },
    /// Target not reached before the end of the search window.
    SegmentExhausted,
    /// Target not reached before the end of the segment, and the queue
    /// holds nothing after it.
    NoCrossing,
}

impl SolveOutcome {
    pub fn move_time(&self) -> Option<f64> {
        match *self {
            SolveOutcome::Found { move_time } | SolveOutcome::Imprecise { move_time, .. } => {
                Some(move_time)
            }
            _ => None,
        }
    }
}

/// One crossing request, in move time of the segment being searched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Search {
    /// Window start; the rail has not reached `target` here.
    pub lo: f64,
    /// Window end, at most the segment duration.
    pub hi: f64,
    pub target: f64,
    pub dir: Direction,
    pub step_dist: f64,
    /// No segment is queued after this one.
    pub is_tail: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IterativeSolver {
    config: SolverConfig,
}

impl IterativeSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Find the earliest move time in `(search.lo, search.hi]` at which the
    /// rail reaches `search.target` moving in `search.dir`.
    pub fn solve<K: RailTransform + ?Sized>(
        &self,
        kin: &K,
        m: &MoveSegment,
        search: Search,
    ) -> SolveOutcome {
        let eps = self.config.time_epsilon;
        let s = search.dir.sign();
        // Signed distance past the target; non-decreasing over the window.
        let dist = |t: f64| s * (kin.position(m, t) - search.target);
        let slope = |t: f64| s * kin.velocity(m, t);

        let (mut lo, mut hi) = (search.lo, search.hi);
        if dist(hi) < 0.0 {
            return if search.is_tail && hi >= m.duration {
                SolveOutcome::NoCrossing
            } else {
                SolveOutcome::SegmentExhausted
            };
        }

        let f_lo = dist(lo);
        if f_lo >= 0.0 {
            return SolveOutcome::Found { move_time: lo };
        }

        let budget = self.iteration_budget(kin, m, lo, hi, search.step_dist);
        let mut base = lo;
        let mut f_base = f_lo;
        let mut d_base = slope(lo);
        let mut allow_newton = true;

        for _ in 0..budget {
            let width = hi - lo;
            if width <= eps {
                return SolveOutcome::Found { move_time: hi };
            }

            // Newton from the latest evaluation when it lands strictly
            // inside the bracket; bisection otherwise.
            let mut next = 0.5 * (lo + hi);
            let mut used_newton = false;
            if allow_newton && d_base > 0.0 {
                let candidate = base - f_base / d_base;
                if candidate > lo && candidate < hi {
                    next = candidate;
                    used_newton = true;
                }
            }

            let f_next = dist(next);
            let d_next = slope(next);
            if d_next > 0.0 && f_next.abs() <= 0.5 * eps * d_next {
                return SolveOutcome::Found { move_time: next };
            }

            if f_next < 0.0 {
                lo = next;
            } else {
                hi = next;
            }
            // A Newton step that failed to halve the bracket forces a bisection.
            allow_newton = !used_newton || hi - lo <= 0.5 * width;
            base = next;
            f_base = f_next;
            d_base = d_next;
        }

        if hi - lo <= eps {
            return SolveOutcome::Found { move_time: hi };
        }

        let error = 0.5 * (hi - lo);
        SolveOutcome::Imprecise {
            move_time: lo + error,
            warning: ImprecisionWarning {
                error,
                step_time: step_time(kin, m, search.lo, search.hi, search.step_dist),
                iterations: budget,
            },
        }
    }

    // The bracket at least halves every two iterations, so 2k iterations
    // shrink it below one step time once 2^k exceeds the number of steps
    // the window spans at peak speed.
    fn iteration_budget<K: RailTransform + ?Sized>(
        &self,
        kin: &K,
        m: &MoveSegment,
        lo: f64,
        hi: f64,
        step_dist: f64,
    ) -> u32 {
        let step_time = step_time(kin, m, lo, hi, step_dist);
        let steps = (hi - lo) / step_time;
        let halvings = if steps > 1.0 && steps.is_finite() {
            steps.log2().ceil() as u32
        } else {
            0
        };
        self.config.max_iterations.max(2 * halvings)
    }
}

// Duration of one step at the highest rail speed seen at the window and
// segment endpoints. Rail velocity of a linear rail is linear in time, so
// for those this is the segment peak.
fn step_time<K: RailTransform + ?Sized>(
    kin: &K,
    m: &MoveSegment,
    lo: f64,
    hi: f64,
    step_dist: f64,
) -> f64 {
    let v_max = [0.0, lo, hi, m.duration]
        .into_iter()
        .map(|t| kin.velocity(m, t).abs())
        .fold(0.0, f64::max);
    if v_max > 0.0 {
        step_dist / v_max
    } else {
        f64::INFINITY
    }
}
