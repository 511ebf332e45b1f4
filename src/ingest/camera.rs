//! Camera frame source.
//!
//! `CameraSource` captures from a local V4L2 device node (e.g. /dev/video0)
//! when built with the `camera-v4l2` feature. Device paths starting with
//! `stub://` select a synthetic classroom scene instead: a static background
//! that a bright block periodically enters, crosses and leaves.

use anyhow::Result;
#[cfg(not(feature = "camera-v4l2"))]
use anyhow::anyhow;

use super::FrameSource;
use crate::config::CameraSettings;
use crate::frame::Frame;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or `stub://name`.
    pub device: String,
    /// Requested capture rate.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

impl From<&CameraSettings> for CameraConfig {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            device: settings.device.clone(),
            target_fps: settings.target_fps,
            width: settings.width,
            height: settings.height,
        }
    }
}

pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticScene),
    #[cfg(feature = "camera-v4l2")]
    Device(device::DeviceCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.device.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticScene::new(config)),
            });
        }
        Self::device(config)
    }

    #[cfg(feature = "camera-v4l2")]
    fn device(config: CameraConfig) -> Result<Self> {
        Ok(Self {
            backend: CameraBackend::Device(device::DeviceCamera::new(config)),
        })
    }

    #[cfg(not(feature = "camera-v4l2"))]
    fn device(config: CameraConfig) -> Result<Self> {
        Err(anyhow!(
            "camera {} requires the camera-v4l2 feature (use stub:// for the synthetic scene)",
            config.device
        ))
    }

    pub fn frames_captured(&self) -> u64 {
        match &self.backend {
            CameraBackend::Synthetic(scene) => scene.frame_count,
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(camera) => camera.frame_count(),
        }
    }
}

impl FrameSource for CameraSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(scene) => {
                log::info!("CameraSource: connected to {} (synthetic)", scene.config.device);
                Ok(())
            }
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(camera) => camera.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            CameraBackend::Synthetic(scene) => scene.next_frame().map(Some),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(camera) => camera.next_frame().map(Some),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(_) => true,
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(camera) => camera.is_healthy(),
        }
    }

    fn describe(&self) -> String {
        match &self.backend {
            CameraBackend::Synthetic(scene) => format!("{} (synthetic)", scene.config.device),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::Device(camera) => camera.describe(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic scene (stub://)
// ----------------------------------------------------------------------------

/// Frames per enter/cross/leave cycle of the synthetic occupant.
pub const SYNTHETIC_CYCLE: u64 = 30;
/// Cycle frames during which the occupant is in view.
pub const SYNTHETIC_PRESENT: std::ops::Range<u64> = 10..20;

const OCCUPANT_RGB: [u8; 3] = [230, 215, 190];

struct SyntheticScene {
    config: CameraConfig,
    frame_count: u64,
}

impl SyntheticScene {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let phase = self.frame_count % SYNTHETIC_CYCLE;
        self.frame_count += 1;

        let (w, h) = (self.config.width, self.config.height);
        let occupant = SYNTHETIC_PRESENT.contains(&phase).then(|| {
            let side = (w.min(h) / 4).max(1);
            let steps = (SYNTHETIC_PRESENT.end - SYNTHETIC_PRESENT.start) as u32;
            let travel = w.saturating_sub(side);
            let x0 = travel * (phase - SYNTHETIC_PRESENT.start) as u32 / steps.max(1);
            let y0 = (h - side.min(h)) / 2;
            (x0, y0, side)
        });

        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            // Vertical gradient so the background is not a flat color.
            let shade = (y * 40 / h.max(1)) as u8;
            for x in 0..w {
                let inside = occupant.is_some_and(|(x0, y0, side)| {
                    x >= x0 && x < x0 + side && y >= y0 && y < y0 + side
                });
                if inside {
                    data.extend_from_slice(&OCCUPANT_RGB);
                } else {
                    data.extend_from_slice(&[40 + shade, 50 + shade, 60 + shade]);
                }
            }
        }
        Frame::from_rgb(data, w, h)
    }
}

// ----------------------------------------------------------------------------
// V4L2 device capture
// ----------------------------------------------------------------------------

#[cfg(feature = "camera-v4l2")]
mod device {
    use anyhow::{anyhow, Context, Result};
    use ouroboros::self_referencing;
    use std::time::{Duration, Instant};

    use super::CameraConfig;
    use crate::frame::Frame;
    use crate::ingest::normalize::{normalize_to_rgb, PixelFormat};

    pub(super) struct DeviceCamera {
        config: CameraConfig,
        state: Option<DeviceState>,
        format: PixelFormat,
        frame_count: u64,
        last_frame_at: Option<Instant>,
        last_error: Option<String>,
        active_width: u32,
        active_height: u32,
    }

    #[self_referencing]
    struct DeviceState {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    impl DeviceCamera {
        pub(super) fn new(config: CameraConfig) -> Self {
            Self {
                active_width: config.width,
                active_height: config.height,
                config,
                state: None,
                format: PixelFormat::Rgb24,
                frame_count: 0,
                last_frame_at: None,
                last_error: None,
            }
        }

        pub(super) fn connect(&mut self) -> Result<()> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let mut device = v4l::Device::with_path(&self.config.device)
                .with_context(|| format!("open camera {}", self.config.device))?;
            let mut format = device.format().context("read camera format")?;
            format.width = self.config.width;
            format.height = self.config.height;
            format.fourcc = v4l::FourCC::new(b"RGB3");

            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    log::warn!(
                        "CameraSource: failed to set format on {}: {}",
                        self.config.device,
                        err
                    );
                    device
                        .format()
                        .context("read camera format after set failure")?
                }
            };
            self.format = match &format.fourcc.repr {
                b"RGB3" => PixelFormat::Rgb24,
                b"YUYV" => PixelFormat::Yuyv,
                other => {
                    return Err(anyhow!(
                        "camera {} offers unsupported pixel format {}",
                        self.config.device,
                        String::from_utf8_lossy(other)
                    ))
                }
            };

            if self.config.target_fps > 0 {
                let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
                if let Err(err) = device.set_params(&params) {
                    log::warn!(
                        "CameraSource: failed to set fps on {}: {}",
                        self.config.device,
                        err
                    );
                }
            }

            self.active_width = format.width;
            self.active_height = format.height;
            self.last_error = None;

            let state = DeviceStateBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| anyhow::Error::new(err).context("create camera buffer stream"))
                },
            }
            .try_build()
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                err
            })?;
            self.state = Some(state);

            log::info!(
                "CameraSource: connected to {} ({}x{}, {:?})",
                self.config.device,
                self.active_width,
                self.active_height,
                self.format
            );
            Ok(())
        }

        pub(super) fn next_frame(&mut self) -> Result<Frame> {
            use v4l::io::traits::CaptureStream;

            let state = self.state.as_mut().context("camera not connected")?;
            let (buf, _meta) = state
                .with_mut(|fields| fields.stream.next())
                .map_err(|err| {
                    self.last_error = Some(err.to_string());
                    anyhow::Error::new(err).context("capture camera frame")
                })?;

            let rgb = normalize_to_rgb(buf, self.active_width, self.active_height, self.format)?;
            self.frame_count += 1;
            self.last_frame_at = Some(Instant::now());
            Frame::from_rgb(rgb, self.active_width, self.active_height)
        }

        pub(super) fn is_healthy(&self) -> bool {
            if self.last_error.is_some() {
                return false;
            }
            let Some(last_frame_at) = self.last_frame_at else {
                return true;
            };
            last_frame_at.elapsed() <= self.health_grace()
        }

        pub(super) fn frame_count(&self) -> u64 {
            self.frame_count
        }

        pub(super) fn describe(&self) -> String {
            format!(
                "{} ({}x{})",
                self.config.device, self.active_width, self.active_height
            )
        }

        fn health_grace(&self) -> Duration {
            let base_ms = if self.config.target_fps == 0 {
                2_000
            } else {
                (1000 / self.config.target_fps).saturating_mul(6)
            };
            Duration::from_millis(base_ms.max(2_000) as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(width: u32, height: u32) -> CameraConfig {
        CameraConfig {
            device: "stub://classroom".to_string(),
            target_fps: 30,
            width,
            height,
        }
    }

    #[test]
    fn synthetic_source_produces_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_config(64, 48))?;
        source.connect()?;
        let frame = source.next_frame()?.expect("synthetic sources never run dry");
        assert_eq!(frame.dimensions(), (64, 48));
        assert_eq!(source.frames_captured(), 1);
        assert!(source.is_healthy());
        assert!(source.describe().contains("synthetic"));
        Ok(())
    }

    #[test]
    fn synthetic_occupant_enters_and_leaves() -> Result<()> {
        let mut source = CameraSource::new(stub_config(64, 48))?;
        source.connect()?;
        let frames: Vec<Frame> = (0..SYNTHETIC_CYCLE)
            .map(|_| source.next_frame().map(|f| f.expect("frame")))
            .collect::<Result<_>>()?;

        let empty = &frames[0];
        assert_eq!(empty.pixels(), frames[SYNTHETIC_PRESENT.start as usize - 1].pixels());
        assert_eq!(empty.pixels(), frames[SYNTHETIC_PRESENT.end as usize].pixels());

        let present = &frames[SYNTHETIC_PRESENT.start as usize];
        assert_ne!(empty.pixels(), present.pixels());
        // The occupant moves while in view.
        assert_ne!(
            present.pixels(),
            frames[SYNTHETIC_PRESENT.start as usize + 3].pixels()
        );
        Ok(())
    }

    #[cfg(not(feature = "camera-v4l2"))]
    #[test]
    fn device_paths_need_capture_support() {
        let err = CameraSource::new(CameraConfig::default())
            .err()
            .expect("device capture is feature-gated");
        assert!(err.to_string().contains("camera-v4l2"));
    }
}
