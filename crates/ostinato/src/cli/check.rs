use anyhow::{Context, Result};
use clap::Args;
use ostinato::config;
use ostinato_core::kernel::MotionKernel;
use std::path::PathBuf;

#[derive(Args)]
pub struct CheckArgs {
    /// Path to the kernel configuration file (TOML or JSON).
    pub config: PathBuf,
}

impl CheckArgs {
    pub fn run(&self) -> Result<()> {
        let config = config::load(&self.config)?;
        let kernel = MotionKernel::new(&config)
            .with_context(|| format!("failed to build kernel from {}", self.config.display()))?;

        println!(
            "{}: ok (queue capacity {}, horizon {}s)",
            self.config.display(),
            kernel.queue().capacity(),
            config.generator.horizon
        );
        for stepper in &config.steppers {
            println!(
                "  {} step {} {:?}",
                stepper.name, stepper.step_distance, stepper.kinematics
            );
        }
        Ok(())
    }
}
