/// Result of observing one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Observation {
    /// At least one region cleared the minimum area.
    pub evidence_detected: bool,
    /// Regions that cleared the minimum area. Used for display only.
    pub regions: Vec<Region>,
}

impl Observation {
    pub fn from_regions(regions: Vec<Region>) -> Self {
        Self {
            evidence_detected: !regions.is_empty(),
            regions,
        }
    }

    /// Area of the largest region, zero when there is none.
    pub fn largest_area(&self) -> f64 {
        self.regions.iter().map(|r| r.area).fold(0.0, f64::max)
    }
}

/// Connected foreground region in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Polygon area of the outer boundary through pixel centres.
    pub area: f64,
}
