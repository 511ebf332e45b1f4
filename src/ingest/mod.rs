//! Frame acquisition.
//!
//! - Camera devices (feature: camera-v4l2), with a synthetic `stub://` scene
//! - Image sequences on disk, for offline replay
//!
//! Frames are handed to the detection worker and dropped after observation;
//! nothing in this module stores or forwards pixels.

use anyhow::Result;

use crate::frame::Frame;

pub mod camera;
#[cfg(feature = "camera-v4l2")]
mod normalize;
pub mod sequence;

pub use camera::{CameraConfig, CameraSource};
pub use sequence::ImageSequenceSource;

/// Producer of frames for the detection worker.
pub trait FrameSource: Send {
    /// Open the underlying device or directory.
    fn connect(&mut self) -> Result<()>;

    /// Next frame, `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool {
        true
    }

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}
