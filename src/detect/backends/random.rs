use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Observation;
use crate::frame::Frame;

/// Demo backend that ignores pixels and reports evidence with a fixed
/// probability per frame.
pub struct RandomBackend {
    probability: f64,
    rng: StdRng,
}

impl RandomBackend {
    pub fn new(probability: f64) -> Result<Self> {
        Self::with_rng(probability, StdRng::from_entropy())
    }

    /// Deterministic sequence for reproducible demos.
    pub fn seeded(probability: f64, seed: u64) -> Result<Self> {
        Self::with_rng(probability, StdRng::seed_from_u64(seed))
    }

    fn with_rng(probability: f64, rng: StdRng) -> Result<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(anyhow!(
                "motion probability must be within 0..=1, got {}",
                probability
            ));
        }
        Ok(Self { probability, rng })
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl DetectorBackend for RandomBackend {
    fn name(&self) -> &'static str {
        "random"
    }

    fn observe(&mut self, _frame: &Frame) -> Result<Observation> {
        Ok(Observation {
            evidence_detected: self.rng.gen_bool(self.probability),
            regions: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_probability() {
        assert!(RandomBackend::new(1.5).is_err());
        assert!(RandomBackend::new(-0.1).is_err());
        assert!(RandomBackend::new(0.3).is_ok());
    }

    #[test]
    fn extremes_are_deterministic() -> Result<()> {
        let frame = Frame::filled(2, 2, [0, 0, 0])?;
        let mut never = RandomBackend::seeded(0.0, 7)?;
        let mut always = RandomBackend::seeded(1.0, 7)?;
        for _ in 0..20 {
            assert!(!never.observe(&frame)?.evidence_detected);
            assert!(always.observe(&frame)?.evidence_detected);
        }
        Ok(())
    }

    #[test]
    fn same_seed_same_sequence() -> Result<()> {
        let frame = Frame::filled(2, 2, [0, 0, 0])?;
        let mut a = RandomBackend::seeded(0.3, 42)?;
        let mut b = RandomBackend::seeded(0.3, 42)?;
        for _ in 0..50 {
            assert_eq!(
                a.observe(&frame)?.evidence_detected,
                b.observe(&frame)?.evidence_detected
            );
        }
        Ok(())
    }
}
