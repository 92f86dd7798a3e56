// Coupled-pair kinematics (CoreXY, CoreXZ)

use crate::{
    kinematics::{
        ActiveFlags, Axis, RailTransform, linear_position, linear_reversal, linear_velocity,
    },
    move_queue::{Coord, MoveSegment},
};
use serde::{Deserialize, Serialize};

/// Which belt of the pair this rail drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    /// position = primary + secondary
    #[serde(rename = "+", alias = "plus")]
    Plus,
    /// position = primary - secondary
    #[serde(rename = "-", alias = "minus")]
    Minus,
}

impl Sign {
    /// Parse sign from string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "+" | "plus" => Some(Sign::Plus),
            "-" | "minus" => Some(Sign::Minus),
            _ => None,
        }
    }

    fn factor(self) -> f64 {
        match self {
            Sign::Plus => 1.0,
            Sign::Minus => -1.0,
        }
    }
}

/// One motor of a two-motor belt-coupled axis pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoupledKin {
    primary: Axis,
    secondary: Axis,
    sign: Sign,
    coeffs: Coord,
}

impl CoupledKin {
    pub fn new(primary: Axis, secondary: Axis, sign: Sign) -> Self {
        let coeffs = primary
            .unit()
            .add(&secondary.unit().scale(sign.factor()));
        Self {
            primary,
            secondary,
            sign,
            coeffs,
        }
    }

    pub fn corexy(sign: Sign) -> Self {
        Self::new(Axis::X, Axis::Y, sign)
    }

    pub fn corexz(sign: Sign) -> Self {
        Self::new(Axis::X, Axis::Z, sign)
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }

    pub fn axes(&self) -> (Axis, Axis) {
        (self.primary, self.secondary)
    }
}

impl RailTransform for CoupledKin {
    fn position(&self, m: &MoveSegment, move_time: f64) -> f64 {
        let c = m.coord_at(move_time);
        let (a, b) = (self.primary.of(&c), self.secondary.of(&c));
        match self.sign {
            Sign::Plus => a + b,
            Sign::Minus => a - b,
        }
    }

    fn active_axes(&self) -> ActiveFlags {
        ActiveFlags::from_coefficients(self.coeffs)
    }

    fn velocity(&self, m: &MoveSegment, move_time: f64) -> f64 {
        linear_velocity(&self.coeffs, m, move_time)
    }

    fn reversal_time(&self, m: &MoveSegment, from: f64) -> Option<f64> {
        linear_reversal(&self.coeffs, m, from)
    }

    fn position_from_coord(&self, c: Coord) -> f64 {
        linear_position(&self.coeffs, &MoveSegment::hold(0.0, 1.0, c), 0.0)
    }
}
