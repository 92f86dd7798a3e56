use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use ostinato::{config, moves, simulate};
use ostinato_core::diagnostics::TracingSink;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum Format {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Path to the kernel configuration file (TOML or JSON).
    pub config: PathBuf,

    /// Path to a JSON array of move segments.
    pub moves: PathBuf,

    /// Generation limit in seconds.
    ///
    /// Defaults to the end of the last move.
    #[arg(long)]
    pub until: Option<f64>,

    #[arg(long, value_enum, default_value_t)]
    pub format: Format,
}

impl GenerateArgs {
    pub fn run(&self) -> Result<()> {
        let config = config::load(&self.config)?;
        let moves = moves::from_file(&self.moves)?;
        let until = self.until.unwrap_or_else(|| moves::end_time(&moves));
        tracing::info!(
            config = %self.config.display(),
            moves = moves.len(),
            until,
            "generating steps"
        );

        let outputs = simulate::run(&config, &moves, until, &mut TracingSink)?;
        for output in &outputs {
            if let Some(fault) = &output.fault {
                tracing::error!(stepper = %output.name, %fault, "stepper faulted");
            }
        }

        match self.format {
            Format::Text => print!("{}", simulate::render_text(&outputs)),
            Format::Json => println!(
                "{}",
                serde_json::to_string_pretty(&outputs).context("failed to encode step events")?
            ),
        }
        Ok(())
    }
}
