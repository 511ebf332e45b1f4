use anyhow::Result;

use energy_saver::ingest::camera::{SYNTHETIC_CYCLE, SYNTHETIC_PRESENT};
use energy_saver::{
    CameraConfig, CameraSource, EstimatorConfig, Frame, FrameSource, MotionEstimator,
};

fn synthetic_frames(cycles: u64) -> Result<Vec<Frame>> {
    let mut source = CameraSource::new(CameraConfig {
        device: "stub://classroom".to_string(),
        target_fps: 30,
        width: 64,
        height: 48,
    })?;
    source.connect()?;
    (0..SYNTHETIC_CYCLE * cycles)
        .map(|_| source.next_frame().map(|f| f.expect("synthetic frame")))
        .collect()
}

fn evidence(frames: &[Frame], min_region_area: u32) -> Result<Vec<bool>> {
    let mut estimator = MotionEstimator::new(EstimatorConfig {
        min_region_area,
        ..EstimatorConfig::default()
    });
    frames
        .iter()
        .map(|f| estimator.observe(f).map(|o| o.evidence_detected))
        .collect()
}

#[test]
fn occupant_is_seen_only_while_in_view() -> Result<()> {
    let frames = synthetic_frames(1)?;
    let seen = evidence(&frames, 60)?;

    for (i, detected) in seen.iter().enumerate() {
        let present = SYNTHETIC_PRESENT.contains(&(i as u64));
        if !present {
            assert!(!detected, "false evidence at frame {}", i);
        }
    }
    assert!(seen[SYNTHETIC_PRESENT.start as usize], "entry was missed");
    let in_view = SYNTHETIC_PRESENT.filter(|i| seen[*i as usize]).count();
    assert!(in_view >= 8, "occupant seen in only {} frames", in_view);
    Ok(())
}

#[test]
fn raising_min_area_never_adds_evidence() -> Result<()> {
    let frames = synthetic_frames(2)?;
    let runs = [0u32, 50, 100, 140, 1000]
        .iter()
        .map(|area| evidence(&frames, *area))
        .collect::<Result<Vec<_>>>()?;
    for pair in runs.windows(2) {
        for (low, high) in pair[0].iter().zip(&pair[1]) {
            assert!(*low || !*high);
        }
    }
    // The occupant covers 12x12 pixels, so 1000 filters it out entirely.
    assert!(runs[4].iter().all(|e| !*e));
    Ok(())
}
