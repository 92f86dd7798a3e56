// Cartesian kinematics - each rail follows one axis directly

use crate::{
    kinematics::{ActiveFlags, RailTransform, linear_reversal, linear_velocity},
    move_queue::{Coord, MoveSegment},
};
use serde::{Deserialize, Serialize};

/// Which axis this stepper controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    #[serde(alias = "X")]
    X,
    #[serde(alias = "Y")]
    Y,
    #[serde(alias = "Z")]
    Z,
}

impl Axis {
    /// Parse axis from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "x" => Some(Axis::X),
            "y" => Some(Axis::Y),
            "z" => Some(Axis::Z),
            _ => None,
        }
    }

    pub fn of(self, c: &Coord) -> f64 {
        match self {
            Axis::X => c.x,
            Axis::Y => c.y,
            Axis::Z => c.z,
        }
    }

    pub fn unit(self) -> Coord {
        match self {
            Axis::X => Coord::new(1.0, 0.0, 0.0),
            Axis::Y => Coord::new(0.0, 1.0, 0.0),
            Axis::Z => Coord::new(0.0, 0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartesianKin {
    axis: Axis,
}

impl CartesianKin {
    pub fn new(axis: Axis) -> Self {
        Self { axis }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }
}

impl RailTransform for CartesianKin {
    fn position(&self, m: &MoveSegment, move_time: f64) -> f64 {
        self.axis.of(&m.coord_at(move_time))
    }

    fn active_axes(&self) -> ActiveFlags {
        ActiveFlags::from_coefficients(self.axis.unit())
    }

    fn velocity(&self, m: &MoveSegment, move_time: f64) -> f64 {
        linear_velocity(&self.axis.unit(), m, move_time)
    }

    fn reversal_time(&self, m: &MoveSegment, from: f64) -> Option<f64> {
        linear_reversal(&self.axis.unit(), m, from)
    }

    fn position_from_coord(&self, c: Coord) -> f64 {
        self.axis.of(&c)
    }
}
