//! Adaptive per-pixel background model.
//!
//! Each pixel keeps a small mixture of Gaussians (weight, RGB mean, isotropic
//! variance) learned incrementally from the frame stream. A pixel is background
//! when it fits one of the dominant modes; a pixel that misses every mode but is
//! a darker copy of a dominant mode is tagged as shadow and kept out of the
//! foreground mask.

use crate::detect::morphology::Mask;
use crate::frame::{Frame, CHANNELS};

/// Maximum Gaussian modes per pixel.
pub const MAX_MODES: usize = 5;

/// Tunables of the mixture model.
#[derive(Clone, Debug)]
pub struct BackgroundParams {
    /// Frames of history behind the automatic learning rate.
    pub history: u32,
    /// Squared Mahalanobis distance gate for "background" (the sensitivity).
    pub variance_threshold: f32,
    /// Squared distance gate for updating an existing mode.
    pub variance_threshold_gen: f32,
    /// Cumulative weight of modes considered background.
    pub background_ratio: f32,
    pub variance_init: f32,
    pub variance_min: f32,
    pub variance_max: f32,
    /// Weight decay that prunes rarely supported modes.
    pub complexity_reduction: f32,
    pub detect_shadows: bool,
    /// Lower brightness ratio for a shadow (upper bound is 1.0).
    pub shadow_threshold: f32,
    /// Fixed learning rate; `None` selects `1 / min(2 * frames, history)`.
    pub learning_rate: Option<f32>,
}

impl Default for BackgroundParams {
    fn default() -> Self {
        Self {
            history: 500,
            variance_threshold: 50.0,
            variance_threshold_gen: 9.0,
            background_ratio: 0.9,
            variance_init: 15.0,
            variance_min: 4.0,
            variance_max: 75.0,
            complexity_reduction: 0.05,
            detect_shadows: true,
            shadow_threshold: 0.5,
            learning_rate: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Gaussian {
    weight: f32,
    mean: [f32; 3],
    variance: f32,
}

impl Gaussian {
    fn seeded(sample: [f32; 3], weight: f32, variance: f32) -> Self {
        Self {
            weight,
            mean: sample,
            variance,
        }
    }

    fn distance2(&self, sample: &[f32; 3]) -> f32 {
        self.mean
            .iter()
            .zip(sample)
            .map(|(m, s)| (m - s) * (m - s))
            .sum()
    }
}

/// Per-frame segmentation output.
#[derive(Clone, Debug)]
pub struct Segmentation {
    /// Foreground pixels, shadows already excluded.
    pub foreground: Mask,
    /// Pixels classified as cast shadow.
    pub shadow: Mask,
}

/// Mixture-of-Gaussians background model bound to one resolution.
pub struct BackgroundModel {
    params: BackgroundParams,
    width: u32,
    height: u32,
    modes: Vec<Gaussian>,
    modes_used: Vec<u8>,
    frames_seen: u64,
}

impl BackgroundModel {
    /// Seed a model from the first frame. Every pixel starts with one mode
    /// centered on its first sample.
    pub fn seed(frame: &Frame, params: BackgroundParams) -> Self {
        let (width, height) = frame.dimensions();
        let pixel_count = width as usize * height as usize;
        let mut modes = vec![Gaussian::default(); pixel_count * MAX_MODES];
        for (idx, rgb) in frame.pixels().chunks_exact(CHANNELS).enumerate() {
            modes[idx * MAX_MODES] = Gaussian::seeded(to_sample(rgb), 1.0, params.variance_init);
        }
        Self {
            params,
            width,
            height,
            modes,
            modes_used: vec![1; pixel_count],
            frames_seen: 1,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Learning rate applied to the next frame.
    pub fn learning_rate(&self) -> f32 {
        match self.params.learning_rate {
            Some(rate) => rate.clamp(0.0, 1.0),
            None => {
                let n = (self.frames_seen + 1).saturating_mul(2);
                1.0 / n.min(self.params.history.max(1) as u64) as f32
            }
        }
    }

    /// Classify a frame against the model, then fold it into the model.
    ///
    /// The caller guarantees the frame matches `dimensions()`.
    pub fn apply(&mut self, frame: &Frame) -> Segmentation {
        debug_assert_eq!(frame.dimensions(), self.dimensions());
        let alpha = self.learning_rate();
        let mut foreground = Mask::new(self.width, self.height);
        let mut shadow = Mask::new(self.width, self.height);

        for (idx, rgb) in frame.pixels().chunks_exact(CHANNELS).enumerate() {
            let sample = to_sample(rgb);
            let start = idx * MAX_MODES;
            let slot = &mut self.modes[start..start + MAX_MODES];
            let used = &mut self.modes_used[idx];
            match update_pixel(slot, used, &sample, alpha, &self.params) {
                PixelClass::Background => {}
                PixelClass::Foreground => foreground.set_index(idx, true),
                PixelClass::Shadow => shadow.set_index(idx, true),
            }
        }

        self.frames_seen += 1;
        Segmentation { foreground, shadow }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PixelClass {
    Background,
    Foreground,
    Shadow,
}

fn to_sample(rgb: &[u8]) -> [f32; 3] {
    [rgb[0] as f32, rgb[1] as f32, rgb[2] as f32]
}

/// Classify one pixel and update its modes. Modes stay sorted by descending
/// weight, with weights summing to one.
fn update_pixel(
    modes: &mut [Gaussian],
    used: &mut u8,
    sample: &[f32; 3],
    alpha: f32,
    params: &BackgroundParams,
) -> PixelClass {
    let mut count = *used as usize;

    // Classification walks modes strongest first until one fits.
    let mut background = false;
    let mut matched: Option<(usize, f32)> = None;
    let mut cumulative = 0.0f32;
    for (i, mode) in modes[..count].iter().enumerate() {
        let d2 = mode.distance2(sample);
        if cumulative < params.background_ratio && d2 < params.variance_threshold * mode.variance
        {
            background = true;
        }
        if d2 < params.variance_threshold_gen * mode.variance {
            matched = Some((i, d2));
            break;
        }
        cumulative += mode.weight;
    }

    let class = if background {
        PixelClass::Background
    } else if params.detect_shadows && is_shadow(&modes[..count], sample, params) {
        PixelClass::Shadow
    } else {
        PixelClass::Foreground
    };

    // Decay every mode, reinforce the matched one.
    let prune = -alpha * params.complexity_reduction;
    for mode in modes[..count].iter_mut() {
        mode.weight = (1.0 - alpha) * mode.weight + prune;
    }
    if let Some((i, d2)) = matched {
        let mode = &mut modes[i];
        mode.weight += alpha;
        let k = alpha / mode.weight;
        for c in 0..3 {
            mode.mean[c] -= k * (mode.mean[c] - sample[c]);
        }
        mode.variance = (mode.variance + k * (d2 - mode.variance))
            .clamp(params.variance_min, params.variance_max);
    }

    // Drop modes whose weight decayed away.
    let mut kept = 0;
    for i in 0..count {
        if modes[i].weight > 0.0 {
            modes[kept] = modes[i];
            kept += 1;
        }
    }
    count = kept;

    if matched.is_none() {
        let weight = if count == 0 { 1.0 } else { alpha };
        let slot = if count == MAX_MODES {
            MAX_MODES - 1
        } else {
            count += 1;
            count - 1
        };
        modes[slot] = Gaussian::seeded(*sample, weight, params.variance_init);
    }

    let total: f32 = modes[..count].iter().map(|m| m.weight).sum();
    if total > 0.0 {
        for mode in modes[..count].iter_mut() {
            mode.weight /= total;
        }
    }
    modes[..count].sort_by(|a, b| b.weight.total_cmp(&a.weight));
    *used = count as u8;

    class
}

/// A shadow keeps the chromaticity of a dominant background mode at reduced
/// brightness.
fn is_shadow(modes: &[Gaussian], sample: &[f32; 3], params: &BackgroundParams) -> bool {
    let mut cumulative = 0.0f32;
    for mode in modes {
        let numerator: f32 = mode.mean.iter().zip(sample).map(|(m, s)| m * s).sum();
        let denominator: f32 = mode.mean.iter().map(|m| m * m).sum();
        if denominator == 0.0 {
            return false;
        }
        if numerator <= denominator && numerator >= params.shadow_threshold * denominator {
            let a = numerator / denominator;
            let dist2a: f32 = mode
                .mean
                .iter()
                .zip(sample)
                .map(|(m, s)| (a * m - s) * (a * m - s))
                .sum();
            if dist2a < params.variance_threshold * mode.variance * a * a {
                return true;
            }
        }
        cumulative += mode.weight;
        if cumulative > params.background_ratio {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn gray(width: u32, height: u32, level: u8) -> Result<Frame> {
        Frame::filled(width, height, [level, level, level])
    }

    #[test]
    fn static_scene_stays_background() -> Result<()> {
        let first = gray(8, 8, 80)?;
        let mut model = BackgroundModel::seed(&first, BackgroundParams::default());
        for _ in 0..5 {
            let seg = model.apply(&gray(8, 8, 80)?);
            assert_eq!(seg.foreground.count(), 0);
            assert_eq!(seg.shadow.count(), 0);
        }
        assert_eq!(model.frames_seen(), 6);
        Ok(())
    }

    #[test]
    fn bright_change_is_foreground() -> Result<()> {
        let mut model = BackgroundModel::seed(&gray(4, 4, 50)?, BackgroundParams::default());
        model.apply(&gray(4, 4, 50)?);
        let seg = model.apply(&gray(4, 4, 220)?);
        assert_eq!(seg.foreground.count(), 16);
        assert_eq!(seg.shadow.count(), 0);
        Ok(())
    }

    #[test]
    fn darker_copy_of_background_is_shadow() -> Result<()> {
        let mut model = BackgroundModel::seed(&gray(4, 4, 120)?, BackgroundParams::default());
        for _ in 0..4 {
            model.apply(&gray(4, 4, 120)?);
        }
        let seg = model.apply(&gray(4, 4, 84)?);
        assert_eq!(seg.foreground.count(), 0);
        assert_eq!(seg.shadow.count(), 16);
        Ok(())
    }

    #[test]
    fn shadows_count_as_foreground_when_detection_disabled() -> Result<()> {
        let params = BackgroundParams {
            detect_shadows: false,
            ..BackgroundParams::default()
        };
        let mut model = BackgroundModel::seed(&gray(4, 4, 120)?, params);
        for _ in 0..4 {
            model.apply(&gray(4, 4, 120)?);
        }
        let seg = model.apply(&gray(4, 4, 84)?);
        assert_eq!(seg.foreground.count(), 16);
        Ok(())
    }

    #[test]
    fn persistent_change_is_absorbed_into_background() -> Result<()> {
        let mut model = BackgroundModel::seed(&gray(2, 2, 40)?, BackgroundParams::default());
        let mut last = 0;
        for _ in 0..200 {
            last = model.apply(&gray(2, 2, 200)?).foreground.count();
        }
        assert_eq!(last, 0);
        Ok(())
    }

    #[test]
    fn automatic_learning_rate_decreases_until_history() -> Result<()> {
        let params = BackgroundParams {
            history: 10,
            ..BackgroundParams::default()
        };
        let mut model = BackgroundModel::seed(&gray(1, 1, 0)?, params);
        assert!((model.learning_rate() - 0.25).abs() < f32::EPSILON);
        for _ in 0..20 {
            model.apply(&gray(1, 1, 0)?);
        }
        assert!((model.learning_rate() - 0.1).abs() < f32::EPSILON);
        Ok(())
    }
}
