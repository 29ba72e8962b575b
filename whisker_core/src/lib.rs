//! Whisker Core - keyframe-driven whisker sensing
//!
//! This library turns recorded whisker motion into tactile readings:
//! 1. **Animation**: blend keyframed head-space curves and place them in the world
//! 2. **Collision**: approximate each curve by a handful of capsule proxies
//! 3. **Sensing**: map proxy overlaps back to a normalized arc-length contact
//!    position, strongest contact per tick wins

pub mod rig_runtime;
pub mod whisker_contact;
pub mod whisker_curve;
pub mod whisker_keyframes;
pub mod whisker_proxy;
pub mod whisker_sensor;

// Re-export key types for convenience
pub use rig_runtime::{ContactPhase, ProxyKey, RigConfig, SamplePhase, TickSummary, Whisker, WhiskerRig};
pub use whisker_contact::{project_onto_curve, ArcProjection, ContactMapper, ContactRejection, ContactSample};
pub use whisker_curve::{AnimationState, CurveAnimator};
pub use whisker_keyframes::{KeyframeError, KeyframeStore, KeyframeTable, POINTS_PER_WHISKER};
pub use whisker_proxy::{CollisionProxy, ProxyConfig, ProxyInterval, ProxySet};
pub use whisker_sensor::SensorReading;
