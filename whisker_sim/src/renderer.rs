//! Synthetic first-person renderer.
//!
//! Sphere-traces the obstacle distance field from a viewpoint, shades hits
//! by depth and a per-obstacle tint, then box-downsamples the capture to
//! the requested output size. Stands in for the engine's
//! render-to-texture path.

use crate::obstacles::SceneObstacle;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;
use whisker_env::{CapturedImage, EnvError, FrameRenderer, Obstacle, Viewpoint};

/// Ray is considered to have hit once this close to a surface.
const HIT_EPSILON: f64 = 1e-3;

/// Hard cap on march steps per ray.
const MAX_STEPS: usize = 128;

const BACKGROUND: [u8; 3] = [24, 24, 32];

const PALETTE: [[f64; 3]; 6] = [
    [0.90, 0.55, 0.30],
    [0.35, 0.70, 0.90],
    [0.55, 0.85, 0.40],
    [0.85, 0.40, 0.65],
    [0.95, 0.85, 0.35],
    [0.60, 0.60, 0.95],
];

/// Capture settings for the stereo pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Internal render resolution
    pub capture_width: u32,
    pub capture_height: u32,

    /// Resolution of the persisted images
    pub output_width: u32,
    pub output_height: u32,

    /// Horizontal field of view per eye, degrees
    pub horizontal_fov_deg: f64,

    /// Eye offset from the head origin along head ±X
    pub eye_separation: f64,

    /// Eyes look outward by this yaw, degrees
    pub eye_yaw_deg: f64,

    /// Rays stop after this distance
    pub max_distance: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_width: 256,
            capture_height: 256,
            output_width: 64,
            output_height: 64,
            horizontal_fov_deg: 140.0,
            eye_separation: 1.0,
            eye_yaw_deg: 60.0,
            max_distance: 60.0,
        }
    }
}

/// Ray-marching renderer over a set of analytic obstacles.
#[derive(Debug, Clone)]
pub struct SyntheticRenderer {
    config: CaptureConfig,
    obstacles: Vec<SceneObstacle>,
    frames_rendered: u64,
}

impl SyntheticRenderer {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            obstacles: Vec::new(),
            frames_rendered: 0,
        }
    }

    /// Replaces the scene the renderer sees.
    pub fn set_scene(&mut self, obstacles: &[SceneObstacle]) {
        self.obstacles = obstacles.to_vec();
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Marches one ray; returns hit distance and obstacle index.
    fn march(&self, origin: &Point3<f64>, direction: &Vector3<f64>) -> Option<(f64, usize)> {
        let mut t = 0.0;
        for _ in 0..MAX_STEPS {
            if t > self.config.max_distance {
                return None;
            }
            let p = origin + direction * t;

            let (index, d) = self
                .obstacles
                .iter()
                .enumerate()
                .map(|(i, o)| (i, o.distance(&p)))
                .min_by(|a, b| a.1.total_cmp(&b.1))?;

            if d < HIT_EPSILON {
                return Some((t, index));
            }
            t += d;
        }
        None
    }

    fn shade(&self, hit: Option<(f64, usize)>) -> [u8; 3] {
        match hit {
            None => BACKGROUND,
            Some((t, index)) => {
                let fog = (1.0 - t / self.config.max_distance).clamp(0.1, 1.0);
                let tint = PALETTE[index % PALETTE.len()];
                [
                    (tint[0] * fog * 255.0) as u8,
                    (tint[1] * fog * 255.0) as u8,
                    (tint[2] * fog * 255.0) as u8,
                ]
            }
        }
    }
}

impl FrameRenderer for SyntheticRenderer {
    fn render(
        &mut self,
        viewpoint: &Viewpoint,
        width: u32,
        height: u32,
    ) -> Result<CapturedImage, EnvError> {
        if width == 0 || height == 0 {
            return Err(EnvError::render(format!("invalid output size {}x{}", width, height)));
        }

        let cw = self.config.capture_width.max(width);
        let ch = self.config.capture_height.max(height);
        let aspect = cw as f64 / ch as f64;
        let origin = viewpoint.origin();

        let mut capture = CapturedImage::new(cw, ch);
        for y in 0..ch {
            let v = 1.0 - 2.0 * (y as f64 + 0.5) / ch as f64;
            for x in 0..cw {
                let u = 2.0 * (x as f64 + 0.5) / cw as f64 - 1.0;
                let dir = viewpoint.ray_direction(u, v, aspect);
                capture.put(x, y, self.shade(self.march(&origin, &dir)));
            }
        }

        self.frames_rendered += 1;
        debug!(
            "Rendered {} eye at {}x{} -> {}x{}",
            viewpoint.side, cw, ch, width, height
        );

        Ok(capture.downsample(width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Isometry3;
    use whisker_env::Side;

    fn small_config() -> CaptureConfig {
        CaptureConfig {
            capture_width: 32,
            capture_height: 32,
            output_width: 8,
            output_height: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_capture_config_default() {
        let config = CaptureConfig::default();
        assert_eq!((config.capture_width, config.capture_height), (256, 256));
        assert_eq!((config.output_width, config.output_height), (64, 64));
        assert_eq!(config.horizontal_fov_deg, 140.0);
    }

    #[test]
    fn test_empty_scene_is_background() {
        let mut renderer = SyntheticRenderer::new(small_config());
        let view = Viewpoint::new(Side::Left, Isometry3::identity(), 90.0);
        let image = renderer.render(&view, 8, 8).unwrap();

        assert_eq!((image.width, image.height), (8, 8));
        assert_eq!(image.get(4, 4), Some(BACKGROUND));
        assert_eq!(renderer.frames_rendered(), 1);
    }

    #[test]
    fn test_obstacle_in_front_is_visible() {
        let mut renderer = SyntheticRenderer::new(small_config());
        renderer.set_scene(&[SceneObstacle::sphere("ball", Point3::new(0.0, 0.0, 5.0), 2.0)]);
        let view = Viewpoint::new(Side::Right, Isometry3::identity(), 90.0);
        let image = renderer.render(&view, 8, 8).unwrap();

        assert_ne!(image.get(4, 4), Some(BACKGROUND));
        // Corners miss the ball
        assert_eq!(image.get(0, 0), Some(BACKGROUND));
    }

    #[test]
    fn test_zero_size_is_render_error() {
        let mut renderer = SyntheticRenderer::new(small_config());
        let view = Viewpoint::new(Side::Left, Isometry3::identity(), 90.0);
        assert!(matches!(renderer.render(&view, 0, 8), Err(EnvError::Render(_))));
    }
}
