//! The Curve Animator - keyframe interpolation and head/world transforms
//!
//! Each tick the host supplies a frame index and a blend factor. The
//! animator linearly blends two adjacent keyframe shapes into the current
//! head-space shape and maps it into world space through the whisker's
//! anatomical-origin transform (rotation + translation, no scale).
//!
//! Out-of-range input is clamped, never reported: a trial must not die
//! because the clock overshot the last frame.

use crate::whisker_keyframes::{KeyframeStore, POINTS_PER_WHISKER};
use nalgebra::{Isometry3, Point3};
use std::sync::Arc;
use whisker_env::{Side, WhiskerId};

/// Clamps a requested frame to `[0, F-2]` and returns `(frame, next)`.
///
/// `next` is `min(frame + 1, F - 1)`, so both indices are always valid
/// frame indices whenever `F >= 1`.
pub fn clamp_frame(frame_index: i64, frame_count: usize) -> (usize, usize) {
    let last_start = frame_count.saturating_sub(2) as i64;
    let frame = frame_index.clamp(0, last_start) as usize;
    let next = (frame + 1).min(frame_count.saturating_sub(1));
    (frame, next)
}

/// Clamps a blend factor to [0, 1]; non-finite values become 0.
pub fn clamp_blend(blend: f64) -> f64 {
    if blend.is_finite() {
        blend.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Samples a polyline at normalized index parameter `s ∈ [0, 1]`.
///
/// `s` maps to the real index `s * (P - 1)`; the result blends the two
/// neighbouring samples.
pub fn sample_polyline(shape: &[Point3<f64>], s: f64) -> Point3<f64> {
    match shape.len() {
        0 => Point3::origin(),
        1 => shape[0],
        n => {
            let f = clamp_blend(s) * (n - 1) as f64;
            let i0 = f.floor() as usize;
            let i1 = (f.ceil() as usize).min(n - 1);
            let t = f - i0 as f64;
            shape[i0] + (shape[i1] - shape[i0]) * t
        }
    }
}

/// Total length of a polyline.
pub fn polyline_length(shape: &[Point3<f64>]) -> f64 {
    shape.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
}

/// Mutable animation state of one whisker.
#[derive(Debug, Clone)]
pub struct AnimationState {
    /// Clamped frame index in [0, F-2]
    pub frame_index: usize,

    /// Clamped blend factor in [0, 1]
    pub blend: f64,

    /// Interpolated shape in head space
    pub head_shape: Vec<Point3<f64>>,

    /// The same shape in world space
    pub world_shape: Vec<Point3<f64>>,
}

impl Default for AnimationState {
    fn default() -> Self {
        Self {
            frame_index: 0,
            blend: 0.0,
            head_shape: vec![Point3::origin(); POINTS_PER_WHISKER],
            world_shape: vec![Point3::origin(); POINTS_PER_WHISKER],
        }
    }
}

/// Animates one whisker over the keyframe cycle.
///
/// The keyframe store is injected at construction and shared read-only
/// between all animators.
#[derive(Debug, Clone)]
pub struct CurveAnimator {
    store: Arc<KeyframeStore>,
    side: Side,
    local_index: usize,

    /// Head (anatomical origin) → world
    head_to_world: Isometry3<f64>,

    /// Frame treated as zero whisking angle
    center_frame: f64,

    state: AnimationState,
}

impl CurveAnimator {
    /// Creates an animator positioned at frame 0.
    pub fn new(store: Arc<KeyframeStore>, id: &WhiskerId) -> Self {
        let center_frame = store.frame_count().saturating_sub(1) as f64 / 2.0;
        let mut animator = Self {
            store,
            side: id.side,
            local_index: id.local_index,
            head_to_world: Isometry3::identity(),
            center_frame,
            state: AnimationState::default(),
        };
        animator.update(0, 0.0);
        animator
    }

    /// Overrides the zero-angle frame.
    pub fn with_center_frame(mut self, center_frame: f64) -> Self {
        self.center_frame = center_frame;
        self
    }

    /// Sets the initial head pose.
    pub fn with_head_pose(mut self, pose: Isometry3<f64>) -> Self {
        self.set_head_pose(pose);
        self
    }

    /// Advances the animation and returns the new world-space shape.
    pub fn update(&mut self, frame_index: i64, blend: f64) -> &[Point3<f64>] {
        let (frame, next) = clamp_frame(frame_index, self.store.frame_count());
        let blend = clamp_blend(blend);

        let current = self.store.frame(self.side, self.local_index, frame);
        let upcoming = self.store.frame(self.side, self.local_index, next);

        for (i, slot) in self.state.head_shape.iter_mut().enumerate() {
            let a = current.get(i).copied().unwrap_or_else(Point3::origin);
            let b = upcoming.get(i).copied().unwrap_or_else(Point3::origin);
            *slot = a + (b - a) * blend;
        }

        self.state.frame_index = frame;
        self.state.blend = blend;
        self.refresh_world_shape();

        &self.state.world_shape
    }

    /// Moves the head and re-derives the world shape.
    pub fn set_head_pose(&mut self, pose: Isometry3<f64>) {
        self.head_to_world = pose;
        self.refresh_world_shape();
    }

    fn refresh_world_shape(&mut self) {
        let iso = self.head_to_world;
        for (world, head) in self
            .state
            .world_shape
            .iter_mut()
            .zip(self.state.head_shape.iter())
        {
            *world = iso.transform_point(head);
        }
    }

    pub fn head_pose(&self) -> &Isometry3<f64> {
        &self.head_to_world
    }

    pub fn head_to_world(&self, point: &Point3<f64>) -> Point3<f64> {
        self.head_to_world.transform_point(point)
    }

    pub fn world_to_head(&self, point: &Point3<f64>) -> Point3<f64> {
        self.head_to_world.inverse_transform_point(point)
    }

    pub fn state(&self) -> &AnimationState {
        &self.state
    }

    pub fn head_shape(&self) -> &[Point3<f64>] {
        &self.state.head_shape
    }

    pub fn world_shape(&self) -> &[Point3<f64>] {
        &self.state.world_shape
    }

    /// Derived telemetry: frame index relative to the centre frame.
    pub fn whisking_angle(&self) -> f64 {
        self.state.frame_index as f64 - self.center_frame
    }
}
