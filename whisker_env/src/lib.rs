//! Whisker Collaborator Layer
//!
//! The whisker engines never talk to a game engine, a GPU or the filesystem
//! directly. Everything outside the geometry is reached through the traits
//! in this crate, so the same engine code runs against the analytic
//! simulation host in `whisker_sim` or against a real engine binding.
//!
//! - **Physics**: [`Obstacle`] answers closest-surface-point queries
//! - **Rendering**: [`FrameRenderer`] returns a downsampled colour image
//! - **Output**: [`ImageSink`] persists captured frames ([`PngImageSink`] in production)

mod error;
mod obstacle;
mod png_sink;
mod render;
mod types;

pub use error::EnvError;
pub use obstacle::{Obstacle, OverlapPhase};
pub use png_sink::PngImageSink;
pub use render::{FrameRenderer, ImageSink};
pub use types::{CapturedImage, RunId, Side, Viewpoint, WhiskerId};
