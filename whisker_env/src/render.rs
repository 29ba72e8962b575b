//! Rendering collaborator used for the one-time stereo capture.

use crate::error::EnvError;
use crate::types::{CapturedImage, Viewpoint};
use std::path::Path;

/// Renders the scene from a viewpoint.
///
/// # Implementations
///
/// - **Simulation**: `SyntheticRenderer` in `whisker_sim` (ray-marched depth shading)
/// - **Engine**: render-to-texture followed by a blit to the target size
///
/// The returned pixels must reflect the scene state at the moment of the call.
pub trait FrameRenderer {
    /// Renders `viewpoint` and returns an image downsampled to `width` x `height`.
    fn render(
        &mut self,
        viewpoint: &Viewpoint,
        width: u32,
        height: u32,
    ) -> Result<CapturedImage, EnvError>;
}

/// Persists captured images.
pub trait ImageSink {
    /// Writes `image` to `path` (the extension is chosen by the caller).
    fn write_image(&mut self, path: &Path, image: &CapturedImage) -> Result<(), EnvError>;

    /// File extension this sink produces, without the dot.
    fn extension(&self) -> &'static str;
}
