//! SimWorld - the host loop that drives one head through trials.
//!
//! Each tick runs strictly in this order:
//! 1. advance the animation clock,
//! 2. animate every whisker and reposition its proxies (contact phase opens),
//! 3. dispatch proxy/obstacle overlaps,
//! 4. close the contact phase and let the recorder sample,
//! 5. drop the sample phase, which resets every reading.

use crate::dispatch::{DispatchStats, OverlapDispatcher};
use crate::obstacles::SceneObstacle;
use crate::recorder::{RecorderError, TickOutcome, TrialOutput, TrialRecorder};
use crate::renderer::{CaptureConfig, SyntheticRenderer};

use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use whisker_core::whisker_keyframes::DEFAULT_FRAME_COUNT;
use whisker_core::{KeyframeStore, RigConfig, TickSummary, WhiskerRig};
use whisker_env::ImageSink;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for scenario generation
    pub seed: u64,

    /// Keyframes per whisking cycle (F)
    pub frame_count: usize,

    /// Sampled frames per trial
    pub frame_cap: u32,

    /// Tick rate in Hz
    pub tick_rate_hz: u32,

    /// Whisking cycles per second of simulated time
    pub oscillation_speed: f64,

    /// When false every whisker is held at `resting_frame`
    pub animate: bool,

    pub resting_frame: i64,

    /// Head (anatomical origin) pose in world space
    pub head_pose: Isometry3<f64>,

    pub rig: RigConfig,

    pub capture: CaptureConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            frame_count: DEFAULT_FRAME_COUNT,
            frame_cap: DEFAULT_FRAME_COUNT as u32,
            tick_rate_hz: 30,
            oscillation_speed: 1.0,
            animate: true,
            resting_frame: 0,
            head_pose: Isometry3::identity(),
            rig: RigConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl SimConfig {
    /// Parses a JSON document; absent fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Loads a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_frame_cap(mut self, frame_cap: u32) -> Self {
        self.frame_cap = frame_cap;
        self
    }

    /// Seconds per tick.
    pub fn dt(&self) -> f64 {
        1.0 / self.tick_rate_hz.max(1) as f64
    }
}

/// Triangle wave over `[0, length]` with period `2 * length`.
pub fn pingpong(t: f64, length: f64) -> f64 {
    if length <= 0.0 || !t.is_finite() {
        return 0.0;
    }
    let m = t.rem_euclid(2.0 * length);
    if m > length {
        2.0 * length - m
    } else {
        m
    }
}

/// Ping-pong clock mapping simulated time to `(frame, blend)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClock {
    timer: f64,
    speed: f64,
    frame_count: usize,
    animate: bool,
    resting_frame: i64,
}

impl AnimationClock {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            timer: 0.0,
            speed: config.oscillation_speed,
            frame_count: config.frame_count,
            animate: config.animate,
            resting_frame: config.resting_frame,
        }
    }

    pub fn timer(&self) -> f64 {
        self.timer
    }

    pub fn reset(&mut self) {
        self.timer = 0.0;
    }

    /// Advances by `dt` seconds and returns the frame to show.
    pub fn advance(&mut self, dt: f64) -> (i64, f64) {
        if !self.animate {
            return (self.resting_frame, 0.0);
        }
        self.timer += dt * self.speed;
        self.current()
    }

    /// Frame and blend at the current timer.
    pub fn current(&self) -> (i64, f64) {
        if !self.animate {
            return (self.resting_frame, 0.0);
        }
        let scaled = pingpong(self.timer, 1.0) * self.frame_count as f64;
        let frame = scaled.floor();
        (frame as i64, scaled - frame)
    }
}

/// Everything one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub frame_index: i64,
    pub blend: f64,
    pub dispatch: DispatchStats,
    pub contacts: TickSummary,
    pub outcome: TickOutcome,
}

/// The SimWorld - one head, its whiskers, the scene and the recorder.
pub struct SimWorld<S: ImageSink> {
    config: SimConfig,
    clock: AnimationClock,
    rig: WhiskerRig,
    dispatcher: OverlapDispatcher,
    obstacles: Vec<SceneObstacle>,
    recorder: TrialRecorder<SyntheticRenderer, S>,
}

impl<S: ImageSink> SimWorld<S> {
    /// Builds the rig from `store` and an idle recorder writing images
    /// through `sink`.
    pub fn new(config: SimConfig, store: Arc<KeyframeStore>, sink: S) -> Self {
        if store.frame_count() != config.frame_count {
            warn!(
                "Keyframe store has {} frames, config says {}",
                store.frame_count(),
                config.frame_count
            );
        }

        let names = store.names().to_vec();
        let mut rig = WhiskerRig::new(store, config.rig.clone());
        rig.set_head_pose(config.head_pose);

        let renderer = SyntheticRenderer::new(config.capture.clone());
        let recorder = TrialRecorder::new(names, config.frame_cap, config.capture.clone(), renderer, sink);

        Self {
            clock: AnimationClock::new(&config),
            config,
            rig,
            dispatcher: OverlapDispatcher::new(),
            obstacles: Vec::new(),
            recorder,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn rig(&self) -> &WhiskerRig {
        &self.rig
    }

    pub fn recorder(&self) -> &TrialRecorder<SyntheticRenderer, S> {
        &self.recorder
    }

    pub fn obstacles(&self) -> &[SceneObstacle] {
        &self.obstacles
    }

    /// Replaces the scene (physics and renderer).
    pub fn set_obstacles(&mut self, obstacles: Vec<SceneObstacle>) {
        self.recorder.renderer_mut().set_scene(&obstacles);
        self.obstacles = obstacles;
        self.dispatcher.clear();
    }

    pub fn set_head_pose(&mut self, pose: Isometry3<f64>) {
        self.config.head_pose = pose;
        self.rig.set_head_pose(pose);
    }

    /// Starts recording into `output_dir` and rewinds the clock.
    pub fn start_trial(&mut self, output_dir: &Path) -> Result<bool, RecorderError> {
        let started = self.recorder.start(output_dir, &self.config.head_pose)?;
        if started {
            self.clock.reset();
            self.dispatcher.clear();
        }
        Ok(started)
    }

    pub fn stop_trial(&mut self) -> Option<TrialOutput> {
        self.recorder.stop()
    }

    /// Runs one two-phase tick.
    pub fn tick(&mut self) -> TickReport {
        let (frame_index, blend) = self.clock.advance(self.config.dt());

        let mut phase = self.rig.begin_tick(frame_index, blend);
        let dispatch = self.dispatcher.dispatch(&mut phase, &self.obstacles);
        let sample = phase.finish();

        let contacts = sample.summary();
        let outcome = self.recorder.on_tick(&sample);
        drop(sample);

        TickReport {
            frame_index,
            blend,
            dispatch,
            contacts,
            outcome,
        }
    }

    /// Records one complete trial: start, tick until the frame cap stops
    /// the recorder, return the flushed output.
    pub fn run_trial(&mut self, output_dir: &Path) -> Result<Option<TrialOutput>, RecorderError> {
        if !self.start_trial(output_dir)? {
            warn!("Trial already running, not starting {}", output_dir.display());
            return Ok(None);
        }

        for _ in 0..=self.config.frame_cap {
            let report = self.tick();
            if let TickOutcome::AutoStopped(output) = report.outcome {
                return Ok(Some(output));
            }
        }

        debug!("Recorder still running after cap, stopping explicitly");
        Ok(self.stop_trial())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sim_config_default() {
        let config = SimConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.frame_count, 51);
        assert_eq!(config.frame_cap, 51);
        assert_eq!(config.tick_rate_hz, 30);
        assert!(config.animate);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimConfig::from_json(r#"{"frame_cap": 5, "rig": {"proximity_multiplier": 3.0}}"#).unwrap();
        assert_eq!(config.frame_cap, 5);
        assert_eq!(config.frame_count, 51);
        assert_eq!(config.rig.proximity_multiplier, 3.0);
        assert_eq!(config.rig.proxy.count, 5);
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        assert!(matches!(SimConfig::from_json("{ nope"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            SimConfig::load(Path::new("/definitely/not/here.json")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_pingpong() {
        assert_relative_eq!(pingpong(0.25, 1.0), 0.25);
        assert_relative_eq!(pingpong(1.25, 1.0), 0.75);
        assert_relative_eq!(pingpong(2.5, 1.0), 0.5);
        assert_relative_eq!(pingpong(-0.25, 1.0), 0.25);
        assert_eq!(pingpong(f64::NAN, 1.0), 0.0);
    }

    #[test]
    fn test_clock_frames_and_blend() {
        let config = SimConfig {
            frame_count: 10,
            ..Default::default()
        };
        let mut clock = AnimationClock::new(&config);

        let (frame, blend) = clock.advance(0.25);
        assert_eq!(frame, 2);
        assert_relative_eq!(blend, 0.5, epsilon = 1e-9);

        // Back on the way down
        let (frame, _) = clock.advance(1.0);
        assert_eq!(frame, 7);
    }

    #[test]
    fn test_clock_resting_when_not_animated() {
        let config = SimConfig {
            animate: false,
            resting_frame: 7,
            ..Default::default()
        };
        let mut clock = AnimationClock::new(&config);
        assert_eq!(clock.advance(0.5), (7, 0.0));
        assert_eq!(clock.timer(), 0.0);
    }
}
