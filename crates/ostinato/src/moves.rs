use anyhow::{Context, Result};
use ostinato_core::move_queue::MoveSegment;
use std::{fs, path::Path};

/// Read a JSON array of move segments
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Vec<MoveSegment>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read moves file {}", path.display()))?;
    from_json(&content).with_context(|| format!("in moves file {}", path.display()))
}

pub fn from_json(content: &str) -> Result<Vec<MoveSegment>> {
    serde_json::from_str(content).context("failed to parse moves as JSON")
}

/// End of the last move, or zero when there are none.
pub fn end_time(moves: &[MoveSegment]) -> f64 {
    moves
        .iter()
        .map(MoveSegment::end_time)
        .fold(0.0, f64::max)
}
