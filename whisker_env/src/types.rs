//! Common types shared between the whisker engines and their collaborators.

use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the head a whisker (or an eye) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Right,
    Left,
}

impl Side {
    /// Derives the side from a whisker name (`R…` / `L…`).
    ///
    /// Names with neither prefix fall back to the right side.
    pub fn from_name(name: &str) -> Self {
        if name.starts_with('L') {
            Side::Left
        } else {
            Side::Right
        }
    }

    /// Lowercase label used in file names.
    pub fn label(&self) -> &'static str {
        match self {
            Side::Right => "right",
            Side::Left => "left",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Stable identity of one whisker.
///
/// `index` is the position in the whisker-name list; `local_index` is the
/// whisker's key inside its side's keyframe table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WhiskerId {
    /// Name from the whisker-name list (e.g. "RC1")
    pub name: String,

    /// Sequential index in the name list
    pub index: usize,

    /// Key in the side's keyframe table
    pub local_index: usize,

    /// Side, derived from the name
    pub side: Side,
}

impl WhiskerId {
    /// Builds an id, deriving the side from the name.
    pub fn new(name: impl Into<String>, index: usize, local_index: usize) -> Self {
        let name = name.into();
        let side = Side::from_name(&name);
        Self {
            name,
            index,
            local_index,
            side,
        }
    }
}

impl std::fmt::Display for WhiskerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.index)
    }
}

/// A capture viewpoint (one eye of the stereo pair).
///
/// The camera looks along its local +Z axis with +Y up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewpoint {
    /// Eye this viewpoint belongs to
    pub side: Side,

    /// Camera pose in world space
    pub pose: Isometry3<f64>,

    /// Horizontal field of view in degrees
    pub horizontal_fov_deg: f64,
}

impl Viewpoint {
    /// Creates a viewpoint.
    pub fn new(side: Side, pose: Isometry3<f64>, horizontal_fov_deg: f64) -> Self {
        Self {
            side,
            pose,
            horizontal_fov_deg,
        }
    }

    /// Vertical field of view (degrees) for the given aspect ratio (width / height).
    pub fn vertical_fov_deg(&self, aspect: f64) -> f64 {
        let half_h = (self.horizontal_fov_deg.to_radians() * 0.5).tan();
        let aspect = if aspect > 0.0 { aspect } else { 1.0 };
        (2.0 * (half_h / aspect).atan()).to_degrees()
    }

    /// Camera origin in world space.
    pub fn origin(&self) -> Point3<f64> {
        self.pose.transform_point(&Point3::origin())
    }

    /// World-space ray direction through normalized image coordinates.
    ///
    /// `u`, `v` are in [-1, 1], (0, 0) being the image centre, +v up.
    pub fn ray_direction(&self, u: f64, v: f64, aspect: f64) -> Vector3<f64> {
        let tan_h = (self.horizontal_fov_deg.to_radians() * 0.5).tan();
        let tan_v = (self.vertical_fov_deg(aspect).to_radians() * 0.5).tan();
        let local = Vector3::new(u * tan_h, v * tan_v, 1.0).normalize();
        self.pose.transform_vector(&local)
    }
}

/// An RGB8 image returned by a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub width: u32,
    pub height: u32,

    /// Row-major RGB triples, top row first
    pub pixels: Vec<u8>,
}

impl CapturedImage {
    /// Creates a black image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize) * 3],
        }
    }

    /// Sets one pixel; out-of-range coordinates are ignored.
    pub fn put(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = ((y as usize) * (self.width as usize) + x as usize) * 3;
        self.pixels[i..i + 3].copy_from_slice(&rgb);
    }

    /// Reads one pixel.
    pub fn get(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + x as usize) * 3;
        Some([self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]])
    }

    /// Box-filter downsample to the target resolution.
    pub fn downsample(&self, width: u32, height: u32) -> CapturedImage {
        let mut out = CapturedImage::new(width, height);
        if width == 0 || height == 0 || self.width == 0 || self.height == 0 {
            return out;
        }

        for oy in 0..height {
            let y0 = (oy as u64 * self.height as u64 / height as u64) as u32;
            let y1 = (((oy + 1) as u64 * self.height as u64 / height as u64) as u32).max(y0 + 1);
            for ox in 0..width {
                let x0 = (ox as u64 * self.width as u64 / width as u64) as u32;
                let x1 = (((ox + 1) as u64 * self.width as u64 / width as u64) as u32).max(x0 + 1);

                let mut acc = [0u64; 3];
                let mut n = 0u64;
                for y in y0..y1.min(self.height) {
                    for x in x0..x1.min(self.width) {
                        if let Some(px) = self.get(x, y) {
                            acc[0] += px[0] as u64;
                            acc[1] += px[1] as u64;
                            acc[2] += px[2] as u64;
                            n += 1;
                        }
                    }
                }
                let n = n.max(1);
                out.put(
                    ox,
                    oy,
                    [(acc[0] / n) as u8, (acc[1] / n) as u8, (acc[2] / n) as u8],
                );
            }
        }

        out
    }
}

/// Identifier for one simulator run (groups the trials of a batch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Creates a random RunId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic RunId from a seed, so reruns with the same
    /// seed land in the same output folder.
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_side_from_name() {
        assert_eq!(Side::from_name("RC1"), Side::Right);
        assert_eq!(Side::from_name("LA0"), Side::Left);
        assert_eq!(Side::from_name("gamma"), Side::Right);
    }

    #[test]
    fn test_vertical_fov_square() {
        let vp = Viewpoint::new(Side::Left, Isometry3::identity(), 90.0);
        assert_relative_eq!(vp.vertical_fov_deg(1.0), 90.0, epsilon = 1e-9);
        assert!(vp.vertical_fov_deg(2.0) < 90.0);
    }

    #[test]
    fn test_center_ray_is_forward() {
        let vp = Viewpoint::new(Side::Right, Isometry3::identity(), 140.0);
        let dir = vp.ray_direction(0.0, 0.0, 1.0);
        assert_relative_eq!(dir.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_downsample_averages() {
        let mut img = CapturedImage::new(2, 2);
        img.put(0, 0, [200, 0, 0]);
        img.put(1, 1, [0, 0, 100]);
        let small = img.downsample(1, 1);
        assert_eq!(small.get(0, 0), Some([50, 0, 25]));
    }

    #[test]
    fn test_run_id_from_seed_is_stable() {
        assert_eq!(RunId::from_seed(7), RunId::from_seed(7));
        assert_ne!(RunId::from_seed(7), RunId::from_seed(8));
    }
}
