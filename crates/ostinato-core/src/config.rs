//! Startup configuration for a [`MotionKernel`](crate::kernel::MotionKernel).
//!
//! Loaded once before generation starts and never changed afterwards.
//! Every section has defaults, so a configuration only needs to list its
//! steppers.

use crate::{
    itersolve::SolverConfig,
    kinematics::{Axis, CartesianKin, CoupledKin, GenericCartesianKin, Kinematics, Sign},
    move_queue::Coord,
    step_gen::GeneratorConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a positive finite number (got {value})")]
    NotPositive { field: String, value: f64 },
    #[error("{field} must be at least {min}")]
    TooSmall { field: &'static str, min: u64 },
    #[error("stepper name cannot be empty")]
    EmptyName,
    #[error("duplicate stepper name {0:?}")]
    DuplicateStepper(String),
    #[error("stepper {0:?} has all-zero kinematics coefficients")]
    ZeroCoefficients(String),
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub solver: SolverConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub steppers: Vec<StepperConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of retained segments, hold segments included
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1024
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepperConfig {
    pub name: String,

    /// Rail travel per step, in rail units (mm for linear rails)
    pub step_distance: f64,

    pub kinematics: KinematicsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KinematicsConfig {
    Cartesian { axis: Axis },
    Corexy { sign: Sign },
    Corexz { sign: Sign },
    Generic { coefficients: Coord },
}

impl KinematicsConfig {
    pub fn build(&self) -> Kinematics {
        match *self {
            KinematicsConfig::Cartesian { axis } => CartesianKin::new(axis).into(),
            KinematicsConfig::Corexy { sign } => CoupledKin::corexy(sign).into(),
            KinematicsConfig::Corexz { sign } => CoupledKin::corexz(sign).into(),
            KinematicsConfig::Generic { coefficients: c } => {
                GenericCartesianKin::new(c.x, c.y, c.z).into()
            }
        }
    }
}

impl KernelConfig {
    pub fn validate(&self) -> Result<()> {
        positive("solver.time_epsilon", self.solver.time_epsilon)?;
        at_least("solver.max_iterations", self.solver.max_iterations as u64, 1)?;
        positive("generator.horizon", self.generator.horizon)?;
        // a direction change and its step must fit together
        at_least("generator.step_buffer", self.generator.step_buffer as u64, 2)?;
        at_least("queue.capacity", self.queue.capacity as u64, 1)?;

        let mut names = HashSet::new();
        for stepper in &self.steppers {
            if stepper.name.is_empty() {
                return Err(ConfigError::EmptyName);
            }
            if !names.insert(stepper.name.as_str()) {
                return Err(ConfigError::DuplicateStepper(stepper.name.clone()));
            }
            positive(
                &format!("steppers.{}.step_distance", stepper.name),
                stepper.step_distance,
            )?;
            if let KinematicsConfig::Generic { coefficients } = stepper.kinematics
                && (coefficients == Coord::ZERO || !coefficients.is_finite())
            {
                return Err(ConfigError::ZeroCoefficients(stepper.name.clone()));
            }
        }
        Ok(())
    }
}

fn positive(field: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive {
            field: field.to_string(),
            value,
        })
    }
}

fn at_least(field: &'static str, value: u64, min: u64) -> Result<()> {
    if value >= min {
        Ok(())
    } else {
        Err(ConfigError::TooSmall { field, min })
    }
}
