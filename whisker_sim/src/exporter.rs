//! JSON exporter for batch results.
//!
//! Collects every `ScenarioResult` of a CLI run into one document for
//! downstream analysis.

use crate::runner::ScenarioResult;
use crate::world::SimConfig;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Complete batch export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimExport {
    /// Run identifier (also part of every trial directory name)
    pub run_id: String,

    /// Base seed
    pub seed: u64,

    /// Configuration the batch ran with
    pub config: SimConfig,

    /// Whiskers in the keyframe store
    pub whisker_count: usize,

    /// One entry per scenario
    pub results: Vec<ScenarioResult>,

    /// True if every scenario passed
    pub passed: bool,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(run_id: impl Into<String>, config: &SimConfig, whisker_count: usize) -> Self {
        Self {
            run_id: run_id.into(),
            seed: config.seed,
            config: config.clone(),
            whisker_count,
            results: Vec::new(),
            passed: true,
        }
    }

    /// Adds a scenario result.
    pub fn add_result(&mut self, result: ScenarioResult) {
        self.passed &= result.passed;
        self.results.push(result);
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
