//! Image sequence frame source.
//!
//! Replays PNG/JPEG files from a directory in file-name order. Useful for
//! exercising detection offline against recorded stills.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::FrameSource;
use crate::frame::Frame;

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
    last_error: Option<String>,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            next: 0,
            looping: false,
            last_error: None,
        }
    }

    /// Restart from the first file instead of running dry.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn decode(&mut self, path: &Path) -> Result<Frame> {
        let image = image::open(path)
            .map_err(|e| {
                self.last_error = Some(e.to_string());
                anyhow!("failed to decode {}: {}", path.display(), e)
            })?
            .to_rgb8();
        Frame::from_image(image)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn connect(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list {}", self.dir.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("no PNG or JPEG files in {}", self.dir.display()));
        }
        files.sort();
        log::info!(
            "ImageSequenceSource: {} frames from {}",
            files.len(),
            self.dir.display()
        );
        self.files = files;
        self.next = 0;
        self.last_error = None;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next >= self.files.len() {
            if !self.looping || self.files.is_empty() {
                return Ok(None);
            }
            self.next = 0;
        }
        let path = self.files[self.next].clone();
        self.next += 1;
        self.decode(&path).map(Some)
    }

    fn is_healthy(&self) -> bool {
        self.last_error.is_none()
    }

    fn describe(&self) -> String {
        format!("{} (image sequence)", self.dir.display())
    }
}
