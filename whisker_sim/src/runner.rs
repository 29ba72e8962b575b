//! Scenario runner - records a batch of trials per scenario.

use crate::recorder::TrialOutput;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};
use whisker_core::KeyframeStore;
use whisker_env::{ImageSink, PngImageSink, RunId};

/// Results from running a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed of the first trial
    pub seed: u64,

    /// Whether every trial flushed and met the scenario's expectation
    pub passed: bool,

    /// Trials completed
    pub trials: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Output directory per completed trial
    pub trial_dirs: Vec<PathBuf>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics aggregated over the trials of a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Frames sampled over all trials
    pub frames_recorded: u64,

    /// Images written over all trials
    pub images_captured: u64,

    /// Sum over whiskers and trials of frames with a contact
    pub contact_frames: u64,

    /// Largest number of whiskers touching anything in one trial
    pub max_whiskers_in_contact: usize,

    /// Mean contact position over all contact frames
    pub mean_contact_s: f64,
}

impl ScenarioMetrics {
    fn absorb(&mut self, output: &TrialOutput) {
        let summary = &output.summary;
        let mut weighted_s = self.mean_contact_s * self.contact_frames as f64;

        self.frames_recorded += summary.frames_recorded as u64;
        self.images_captured += summary.images_captured as u64;
        for whisker in &summary.whiskers {
            self.contact_frames += whisker.contact_frames as u64;
            weighted_s += whisker.mean_s * whisker.contact_frames as f64;
        }
        self.max_whiskers_in_contact = self.max_whiskers_in_contact.max(summary.whiskers_in_contact());
        self.mean_contact_s = if self.contact_frames > 0 {
            weighted_s / self.contact_frames as f64
        } else {
            0.0
        };
    }
}

/// Runs scenarios against one keyframe store.
pub struct ScenarioRunner {
    config: SimConfig,
    store: Arc<KeyframeStore>,
    output_root: PathBuf,
    trials: usize,
    run_id: RunId,
}

impl ScenarioRunner {
    /// Creates a runner writing under `output_root`.
    pub fn new(config: SimConfig, store: Arc<KeyframeStore>, output_root: impl Into<PathBuf>) -> Self {
        let run_id = RunId::from_seed(config.seed);
        Self {
            config,
            store,
            output_root: output_root.into(),
            trials: 1,
            run_id,
        }
    }

    /// Sets the number of trials per scenario.
    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials.max(1);
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Directory of one trial.
    pub fn trial_dir(&self, scenario: ScenarioId, trial: usize) -> PathBuf {
        self.output_root
            .join(format!("{}_{}", scenario.name(), self.run_id))
            .join(format!("trial_{:03}", trial))
    }

    /// Runs a scenario, writing images as PNG.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_with_sink(scenario, PngImageSink::new)
    }

    /// Runs a scenario with a caller-supplied image sink per trial.
    pub fn run_with_sink<S, F>(&self, scenario: ScenarioId, make_sink: F) -> ScenarioResult
    where
        S: ImageSink,
        F: Fn() -> S,
    {
        info!(
            "Starting scenario: {} ({} trials, seed={})",
            scenario.name(),
            self.trials,
            self.config.seed
        );

        let mut result = ScenarioResult {
            scenario,
            seed: self.config.seed,
            passed: true,
            trials: 0,
            failure_reason: None,
            trial_dirs: Vec::new(),
            metrics: ScenarioMetrics::default(),
        };

        for trial in 0..self.trials {
            let seed = self.config.seed.wrapping_add(trial as u64);
            let dir = self.trial_dir(scenario, trial);

            match self.run_trial(scenario, seed, &dir, make_sink()) {
                Ok(output) => {
                    debug!(
                        "  trial {} | frames={} | whiskers in contact={}",
                        trial,
                        output.summary.frames_recorded,
                        output.summary.whiskers_in_contact()
                    );
                    if !output.is_complete() {
                        let reason = format!("{} output files could not be written", output.files_failed.len());
                        error!("Trial {} of {}: {}", trial, scenario.name(), reason);
                        result.passed = false;
                        result.failure_reason.get_or_insert(reason);
                    }
                    result.metrics.absorb(&output);
                    result.trial_dirs.push(output.directory);
                    result.trials += 1;
                }
                Err(reason) => {
                    error!("Trial {} of {} failed: {}", trial, scenario.name(), reason);
                    result.passed = false;
                    result.failure_reason.get_or_insert(reason);
                }
            }
        }

        if let Some(reason) = self.check_expectation(scenario, &result.metrics) {
            result.passed = false;
            result.failure_reason.get_or_insert(reason);
        }

        info!(
            "Scenario {} complete: {} contact frames, mean s={:.3}",
            scenario.name(),
            result.metrics.contact_frames,
            result.metrics.mean_contact_s
        );
        result
    }

    fn run_trial<S: ImageSink>(
        &self,
        scenario: ScenarioId,
        seed: u64,
        dir: &Path,
        sink: S,
    ) -> Result<TrialOutput, String> {
        let config = self.config.clone().with_seed(seed);
        let mut world = SimWorld::new(config, self.store.clone(), sink);
        world.set_obstacles(scenario.build(seed));

        let output = world
            .run_trial(dir)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "recorder did not produce output".to_string())?;

        if output.summary.frames_recorded != self.config.frame_cap {
            return Err(format!(
                "recorded {} frames, expected {}",
                output.summary.frames_recorded, self.config.frame_cap
            ));
        }
        Ok(output)
    }

    /// Scenario-level assertion on the aggregated metrics.
    fn check_expectation(&self, scenario: ScenarioId, metrics: &ScenarioMetrics) -> Option<String> {
        match scenario {
            ScenarioId::Empty if metrics.contact_frames > 0 => Some(format!(
                "{} contact frames with no obstacles",
                metrics.contact_frames
            )),
            ScenarioId::Pole | ScenarioId::Wall if metrics.contact_frames == 0 && !self.store.names().is_empty() => {
                Some("obstacle was never touched".to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::CaptureConfig;
    use crate::synthetic::synthetic_store;

    fn quick_config() -> SimConfig {
        SimConfig {
            frame_count: 11,
            frame_cap: 8,
            capture: CaptureConfig {
                capture_width: 16,
                capture_height: 16,
                output_width: 4,
                output_height: 4,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_metrics_absorb_weights_by_contact_frames() {
        use crate::recorder::{TrialSummary, WhiskerSummary};
        use whisker_env::Side;

        let output = |frames: u32, mean_s: f64| TrialOutput {
            directory: PathBuf::new(),
            files_written: Vec::new(),
            files_failed: Vec::new(),
            summary: TrialSummary {
                frames_recorded: 10,
                images_captured: 2,
                whiskers: vec![WhiskerSummary {
                    name: "RA0".into(),
                    side: Side::Right,
                    contact_frames: frames,
                    mean_s,
                }],
            },
        };

        let mut metrics = ScenarioMetrics::default();
        metrics.absorb(&output(1, 0.2));
        metrics.absorb(&output(3, 0.6));

        assert_eq!(metrics.contact_frames, 4);
        assert_eq!(metrics.frames_recorded, 20);
        assert!((metrics.mean_contact_s - 0.5).abs() < 1e-12);
        assert_eq!(metrics.max_whiskers_in_contact, 1);
    }

    #[test]
    fn test_empty_scenario_passes_without_contacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(synthetic_store(11));
        let runner = ScenarioRunner::new(quick_config(), store, dir.path()).with_trials(2);

        let result = runner.run(ScenarioId::Empty);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.trials, 2);
        assert_eq!(result.metrics.frames_recorded, 16);
        assert_eq!(result.metrics.images_captured, 4);
        assert_eq!(result.metrics.contact_frames, 0);
        assert!(result.trial_dirs[1].ends_with("trial_001"));
    }

    #[test]
    fn test_unwritable_series_fails_scenario_but_runs_every_trial() {
        use whisker_core::KeyframeTable;

        let dir = tempfile::tempdir().unwrap();
        let names = vec!["RA0".to_string(), "missing_dir/RA1".to_string(), "RB0".to_string()];
        let store = KeyframeStore::from_tables(KeyframeTable::new(11), KeyframeTable::new(11), names);
        let runner = ScenarioRunner::new(quick_config(), Arc::new(store), dir.path()).with_trials(2);

        let result = runner.run(ScenarioId::Empty);
        assert!(!result.passed);
        assert_eq!(result.trials, 2);
        assert_eq!(result.metrics.frames_recorded, 16);
        assert!(result.failure_reason.unwrap().contains("could not be written"));
        for trial_dir in &result.trial_dirs {
            assert!(trial_dir.join("RB0.csv").exists());
            assert!(trial_dir.join("summary.json").exists());
        }
    }
}
