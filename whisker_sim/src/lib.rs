//! Whisker Simulation Harness
//!
//! This crate is the host around `whisker_core`: it owns the scene, drives
//! the per-frame tick and records trials to disk.
//!
//! # Core Principle: The Two-Phase Tick
//!
//! Contact events and reading samples never interleave:
//! - **Contact phase**: animate, reposition proxies, dispatch every overlap
//! - **Sample phase**: the recorder reads immutable snapshots
//! - **Reset**: leaving the sample phase clears every reading
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌────────────────┐   (frame, blend)   ┌────────────────┐   │
//! │  │ AnimationClock │───────────────────►│   WhiskerRig   │   │
//! │  └────────────────┘                    └───────┬────────┘   │
//! │                                                │ proxies    │
//! │  ┌────────────────┐    overlaps        ┌───────▼────────┐   │
//! │  │ SceneObstacles │───────────────────►│OverlapDispatch │   │
//! │  └───────┬────────┘                    └───────┬────────┘   │
//! │          │ scene                               │ readings   │
//! │  ┌───────▼────────┐    tick 0 images   ┌───────▼────────┐   │
//! │  │SyntheticRender │───────────────────►│ TrialRecorder  │   │
//! │  └────────────────┘                    └────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use whisker_sim::{SimConfig, SimWorld, ScenarioId};
//!
//! let mut world = SimWorld::new(SimConfig::default(), store, PngImageSink::new());
//! world.set_obstacles(ScenarioId::Pole.build(42));
//! let output = world.run_trial(Path::new("out/trial_000"))?;
//! ```

pub mod dispatch;
pub mod exporter;
pub mod obstacles;
pub mod recorder;
pub mod renderer;
pub mod runner;
pub mod scenarios;
pub mod synthetic;
pub mod world;

pub use dispatch::{DispatchStats, OverlapDispatcher};
pub use exporter::SimExport;
pub use obstacles::{SceneObstacle, Shape};
pub use recorder::{RecorderError, RecorderState, TickOutcome, TrialOutput, TrialRecorder, TrialSummary};
pub use renderer::{CaptureConfig, SyntheticRenderer};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use synthetic::synthetic_store;
pub use world::{AnimationClock, ConfigError, SimConfig, SimWorld, TickReport};
