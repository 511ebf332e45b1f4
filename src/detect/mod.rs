//! Motion detection.
//!
//! - `background`: per-pixel mixture-of-Gaussians model with shadow tagging
//! - `morphology`: masks, elliptical footprints, opening and closing
//! - `regions`: external connected components and their enclosed area
//! - `estimator`: the per-frame evidence decision built from the above
//! - `backends`: alternative evidence producers (demo)

mod backend;
pub mod backends;
pub mod background;
pub mod estimator;
pub mod morphology;
pub mod regions;
mod result;

pub use backend::DetectorBackend;
pub use backends::RandomBackend;
pub use estimator::{DimensionMismatch, EstimatorConfig, MotionEstimator};
pub use morphology::{Mask, StructuringElement};
pub use result::{Observation, Region};
