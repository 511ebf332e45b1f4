//! Motion estimator: background subtraction, morphological cleanup and region
//! filtering combined into a single per-frame evidence decision.

use anyhow::Result;

use crate::detect::background::{BackgroundModel, BackgroundParams};
use crate::detect::backend::DetectorBackend;
use crate::detect::morphology::{close, open, StructuringElement};
use crate::detect::regions::external_regions;
use crate::detect::result::Observation;
use crate::frame::Frame;

pub const DEFAULT_MIN_REGION_AREA: u32 = 1000;
pub const DEFAULT_SENSITIVITY: f32 = 50.0;
pub const DEFAULT_KERNEL_SIZE: u32 = 5;

/// Estimator tunables.
#[derive(Clone, Debug)]
pub struct EstimatorConfig {
    /// Regions must enclose strictly more than this area, in square pixels.
    pub min_region_area: u32,
    /// Background variance gate; larger values need bigger changes.
    pub sensitivity: f32,
    /// Frames of background history.
    pub history: u32,
    /// Fixed learning rate, `None` for automatic.
    pub learning_rate: Option<f32>,
    pub detect_shadows: bool,
    /// Elliptical footprint size for opening and closing.
    pub kernel_size: u32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_region_area: DEFAULT_MIN_REGION_AREA,
            sensitivity: DEFAULT_SENSITIVITY,
            history: 500,
            learning_rate: None,
            detect_shadows: true,
            kernel_size: DEFAULT_KERNEL_SIZE,
        }
    }
}

impl EstimatorConfig {
    fn background_params(&self) -> BackgroundParams {
        BackgroundParams {
            history: self.history,
            variance_threshold: self.sensitivity,
            detect_shadows: self.detect_shadows,
            learning_rate: self.learning_rate,
            ..BackgroundParams::default()
        }
    }
}

/// A frame did not match the resolution the background model was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionMismatch {
    pub expected: (u32, u32),
    pub actual: (u32, u32),
}

impl std::fmt::Display for DimensionMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "frame dimensions {}x{} do not match background model {}x{}",
            self.actual.0, self.actual.1, self.expected.0, self.expected.1
        )
    }
}

impl std::error::Error for DimensionMismatch {}

/// Background-subtraction motion estimator.
pub struct MotionEstimator {
    config: EstimatorConfig,
    element: StructuringElement,
    model: Option<BackgroundModel>,
}

impl MotionEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        let element = StructuringElement::ellipse(config.kernel_size);
        Self {
            config,
            element,
            model: None,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Resolution the model is bound to, once the first frame arrived.
    pub fn model_dimensions(&self) -> Option<(u32, u32)> {
        self.model.as_ref().map(|m| m.dimensions())
    }

    /// Observe one frame.
    ///
    /// The first frame after creation or `reset` seeds the background model and
    /// never reports evidence. A frame of a different resolution than the model
    /// fails with `DimensionMismatch` and leaves the model untouched.
    pub fn observe(&mut self, frame: &Frame) -> Result<Observation> {
        let Some(model) = self.model.as_mut() else {
            self.model = Some(BackgroundModel::seed(
                frame,
                self.config.background_params(),
            ));
            return Ok(Observation::default());
        };

        if model.dimensions() != frame.dimensions() {
            return Err(DimensionMismatch {
                expected: model.dimensions(),
                actual: frame.dimensions(),
            }
            .into());
        }

        let segmentation = model.apply(frame);
        let cleaned = close(&open(&segmentation.foreground, &self.element), &self.element);
        let min_area = f64::from(self.config.min_region_area);
        let regions = external_regions(&cleaned)
            .into_iter()
            .filter(|region| region.area > min_area)
            .collect();

        Ok(Observation::from_regions(regions))
    }

    /// Forget the background model; the next frame re-seeds it.
    pub fn reset(&mut self) {
        self.model = None;
    }
}

impl DetectorBackend for MotionEstimator {
    fn name(&self) -> &'static str {
        "mog"
    }

    fn observe(&mut self, frame: &Frame) -> Result<Observation> {
        MotionEstimator::observe(self, frame)
    }

    fn reset(&mut self) {
        MotionEstimator::reset(self);
    }
}
