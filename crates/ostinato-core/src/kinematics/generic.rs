// Generic cartesian kinematics

use crate::{
    kinematics::{ActiveFlags, RailTransform, linear_position, linear_reversal, linear_velocity},
    move_queue::{Coord, MoveSegment},
};

/// Generic cartesian kinematics with arbitrary coefficients
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenericCartesianKin {
    coeffs: Coord,
}

impl GenericCartesianKin {
    pub fn new(a_x: f64, a_y: f64, a_z: f64) -> Self {
        Self {
            coeffs: Coord::new(a_x, a_y, a_z),
        }
    }

    pub fn coefficients(&self) -> Coord {
        self.coeffs
    }
}

impl RailTransform for GenericCartesianKin {
    fn position(&self, m: &MoveSegment, move_time: f64) -> f64 {
        linear_position(&self.coeffs, m, move_time)
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
}
