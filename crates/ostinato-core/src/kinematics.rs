// Kinematics transforms mapping machine position to a single motor rail

use crate::move_queue::{Coord, MoveSegment};

pub mod cartesian;
pub mod coupled;
pub mod generic;

pub use cartesian::{Axis, CartesianKin};
pub use coupled::{CoupledKin, Sign};
pub use generic::GenericCartesianKin;

const VELOCITY_STEP: f64 = 1e-6;
const REVERSAL_SCAN_POINTS: u32 = 16;
const REVERSAL_REFINE_ITERATIONS: u32 = 52;
const REVERSAL_MIN_GAP: f64 = 1e-9;

// Active flags for axis filtering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveFlags(u8);

impl ActiveFlags {
    const X: u8 = 1 << 0;
    const Y: u8 = 1 << 1;
    const Z: u8 = 1 << 2;

    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn with_x(mut self) -> Self {
        self.0 |= Self::X;
        self
    }

    pub const fn with_y(mut self) -> Self {
        self.0 |= Self::Y;
        self
    }

    pub const fn with_z(mut self) -> Self {
        self.0 |= Self::Z;
        self
    }

    pub const fn has_x(&self) -> bool {
        self.0 & Self::X != 0
    }

    pub const fn has_y(&self) -> bool {
        self.0 & Self::Y != 0
    }

    pub const fn has_z(&self) -> bool {
        self.0 & Self::Z != 0
    }

    /// Flags for every axis with a non-zero coefficient.
    pub fn from_coefficients(c: Coord) -> Self {
        let mut flags = Self::new();
        if c.x != 0.0 {
            flags = flags.with_x();
        }
        if c.y != 0.0 {
            flags = flags.with_y();
        }
        if c.z != 0.0 {
            flags = flags.with_z();
        }
        flags
    }

    /// Whether the segment moves any flagged axis.
    pub fn is_active(&self, m: &MoveSegment) -> bool {
        (self.has_x() && (m.start_v.x != 0.0 || m.accel.x != 0.0))
            || (self.has_y() && (m.start_v.y != 0.0 || m.accel.y != 0.0))
            || (self.has_z() && (m.start_v.z != 0.0 || m.accel.z != 0.0))
    }
}

/// Maps a move segment and a move time to one rail's coordinate.
///
/// Implementations must be pure and continuous within a segment. Only
/// `position` and `active_axes` are required; the remaining methods have
/// numeric fallbacks that closed-form variants are expected to override.
pub trait RailTransform {
    fn position(&self, m: &MoveSegment, move_time: f64) -> f64;

    fn active_axes(&self) -> ActiveFlags;

    /// Instantaneous rail velocity.
    fn velocity(&self, m: &MoveSegment, move_time: f64) -> f64 {
        let ahead = self.position(m, move_time + VELOCITY_STEP);
        let behind = self.position(m, move_time - VELOCITY_STEP);
        (ahead - behind) / (2.0 * VELOCITY_STEP)
    }

    /// First move time strictly after `from` and strictly before the
    /// segment end at which the rail velocity changes sign.
    fn reversal_time(&self, m: &MoveSegment, from: f64) -> Option<f64> {
        scan_reversal(self, m, from)
    }

    /// Rail coordinate of a stationary toolhead at `c`.
    fn position_from_coord(&self, c: Coord) -> f64 {
        self.position(&MoveSegment::hold(0.0, 1.0, c), 0.0)
    }
}

fn scan_reversal<K: RailTransform + ?Sized>(kin: &K, m: &MoveSegment, from: f64) -> Option<f64> {
    let span = m.duration - from;
    if span <= 0.0 {
        return None;
    }
    let dt = span / REVERSAL_SCAN_POINTS as f64;
    let mut t0 = from;
    let mut v0 = kin.velocity(m, from);
    for i in 1..=REVERSAL_SCAN_POINTS {
        let t1 = if i == REVERSAL_SCAN_POINTS {
            m.duration
        } else {
            from + dt * i as f64
        };
        let v1 = kin.velocity(m, t1);
        if v0 != 0.0 && v1 != 0.0 && v0.signum() != v1.signum() {
            let (mut lo, mut hi) = (t0, t1);
            for _ in 0..REVERSAL_REFINE_ITERATIONS {
                let mid = 0.5 * (lo + hi);
                if kin.velocity(m, mid).signum() == v0.signum() {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            // a turn sitting on `from` is the one the caller is already past
            if hi - from > REVERSAL_MIN_GAP && hi < m.duration {
                return Some(hi);
            }
        }
        if v1 != 0.0 {
            t0 = t1;
            v0 = v1;
        }
    }
    None
}

pub(crate) fn linear_position(coeffs: &Coord, m: &MoveSegment, move_time: f64) -> f64 {
    coeffs.dot(&m.coord_at(move_time))
}

pub(crate) fn linear_velocity(coeffs: &Coord, m: &MoveSegment, move_time: f64) -> f64 {
    coeffs.dot(&m.velocity_at(move_time))
}

// Rail velocity of a linear rail is v0 + a*t, so it reverses at most once.
pub(crate) fn linear_reversal(coeffs: &Coord, m: &MoveSegment, from: f64) -> Option<f64> {
    let a = coeffs.dot(&m.accel);
    if a == 0.0 {
        return None;
    }
    let t = -coeffs.dot(&m.start_v) / a;
    (t > from && t < m.duration).then_some(t)
}

/// Closed set of supported kinematics, dispatched by variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kinematics {
    Cartesian(CartesianKin),
    Coupled(CoupledKin),
    Generic(GenericCartesianKin),
}

impl RailTransform for Kinematics {
    fn position(&self, m: &MoveSegment, move_time: f64) -> f64 {
        match self {
            Kinematics::Cartesian(k) => k.position(m, move_time),
            Kinematics::Coupled(k) => k.position(m, move_time),
            Kinematics::Generic(k) => k.position(m, move_time),
        }
    }

    fn active_axes(&self) -> ActiveFlags {
        match self {
            Kinematics::Cartesian(k) => k.active_axes(),
            Kinematics::Coupled(k) => k.active_axes(),
            Kinematics::Generic(k) => k.active_axes(),
        }
    }

    fn velocity(&self, m: &MoveSegment, move_time: f64) -> f64 {
        match self {
            Kinematics::Cartesian(k) => k.velocity(m, move_time),
            Kinematics::Coupled(k) => k.velocity(m, move_time),
            Kinematics::Generic(k) => k.velocity(m, move_time),
        }
    }

    fn reversal_time(&self, m: &MoveSegment, from: f64) -> Option<f64> {
        match self {
            Kinematics::Cartesian(k) => k.reversal_time(m, from),
            Kinematics::Coupled(k) => k.reversal_time(m, from),
            Kinematics::Generic(k) => k.reversal_time(m, from),
        }
    }
}

impl From<CartesianKin> for Kinematics {
    fn from(k: CartesianKin) -> Self {
        Kinematics::Cartesian(k)
    }
}

impl From<CoupledKin> for Kinematics {
    fn from(k: CoupledKin) -> Self {
        Kinematics::Coupled(k)
    }
}

impl From<GenericCartesianKin> for Kinematics {
    fn from(k: GenericCartesianKin) -> Self {
        Kinematics::Generic(k)
    }
}
