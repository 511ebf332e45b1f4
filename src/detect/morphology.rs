//! Binary masks and morphological filtering.

/// Row-major binary mask.
#[derive(Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    /// Build a mask from a predicate over coordinates.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let mut mask = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                if f(x, y) {
                    mask.set(x, y, true);
                }
            }
        }
        mask
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        let idx = self.index(x, y);
        self.bits[idx] = value;
    }

    pub(crate) fn get_index(&self, idx: usize) -> bool {
        self.bits[idx]
    }

    pub(crate) fn set_index(&mut self, idx: usize, value: bool) {
        self.bits[idx] = value;
    }

    /// Number of set pixels.
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|b| *b)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn signed_get(&self, x: i64, y: i64) -> Option<bool> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(self.get(x as u32, y as u32))
    }
}

impl std::fmt::Debug for Mask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mask")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("set", &self.count())
            .finish()
    }
}

/// Structuring element as a list of offsets from its anchor (the center).
#[derive(Clone, Debug)]
pub struct StructuringElement {
    offsets: Vec<(i64, i64)>,
}

impl StructuringElement {
    /// Elliptical footprint inscribed in a `size` x `size` box. `size` is
    /// rounded up to the next odd number.
    pub fn ellipse(size: u32) -> Self {
        let size = if size % 2 == 0 { size + 1 } else { size.max(1) };
        let r = (size / 2) as i64;
        let mut offsets = Vec::new();
        for dy in -r..=r {
            let half = if r == 0 {
                0
            } else {
                let ratio = 1.0 - (dy * dy) as f64 / (r * r) as f64;
                (r as f64 * ratio.max(0.0).sqrt()).round() as i64
            };
            for dx in -half..=half {
                offsets.push((dx, dy));
            }
        }
        Self { offsets }
    }

    /// Full square footprint.
    pub fn rect(size: u32) -> Self {
        let r = (size.max(1) / 2) as i64;
        let mut offsets = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                offsets.push((dx, dy));
            }
        }
        Self { offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn contains(&self, dx: i64, dy: i64) -> bool {
        self.offsets.contains(&(dx, dy))
    }
}

/// A pixel survives erosion when every in-bounds footprint neighbor is set.
/// Out-of-bounds neighbors never erode.
pub fn erode(mask: &Mask, element: &StructuringElement) -> Mask {
    let mut out = Mask::new(mask.width, mask.height);
    for y in 0..mask.height {
        for x in 0..mask.width {
            if !mask.get(x, y) {
                continue;
            }
            let keep = element.offsets.iter().all(|(dx, dy)| {
                mask.signed_get(x as i64 + dx, y as i64 + dy)
                    .unwrap_or(true)
            });
            if keep {
                out.set(x, y, true);
            }
        }
    }
    out
}

/// A pixel is set after dilation when any footprint neighbor is set.
pub fn dilate(mask: &Mask, element: &StructuringElement) -> Mask {
    let mut out = Mask::new(mask.width, mask.height);
    for y in 0..mask.height {
        for x in 0..mask.width {
            let hit = element.offsets.iter().any(|(dx, dy)| {
                mask.signed_get(x as i64 - dx, y as i64 - dy)
                    .unwrap_or(false)
            });
            if hit {
                out.set(x, y, true);
            }
        }
    }
    out
}

/// Erosion then dilation: removes specks smaller than the footprint.
pub fn open(mask: &Mask, element: &StructuringElement) -> Mask {
    dilate(&erode(mask, element), element)
}

/// Dilation then erosion: bridges gaps narrower than the footprint.
pub fn close(mask: &Mask, element: &StructuringElement) -> Mask {
    erode(&dilate(mask, element), element)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(width: u32, height: u32, x0: u32, y0: u32, side: u32) -> Mask {
        Mask::from_fn(width, height, |x, y| {
            x >= x0 && x < x0 + side && y >= y0 && y < y0 + side
        })
    }

    #[test]
    fn ellipse_five_matches_expected_footprint() {
        let element = StructuringElement::ellipse(5);
        // Rows: 1, 5, 5, 5, 1
        assert_eq!(element.len(), 17);
        assert!(element.contains(0, -2));
        assert!(!element.contains(-1, -2));
        assert!(element.contains(-2, -1));
        assert!(element.contains(2, 1));
        assert!(!element.contains(2, 2));
    }

    #[test]
    fn ellipse_size_one_is_single_pixel() {
        let element = StructuringElement::ellipse(1);
        assert_eq!(element.len(), 1);
        assert!(element.contains(0, 0));
    }

    #[test]
    fn opening_removes_isolated_pixels() {
        let mut mask = square(30, 30, 5, 5, 12);
        mask.set(25, 25, true);
        mask.set(0, 29, true);
        let opened = open(&mask, &StructuringElement::ellipse(5));
        assert!(!opened.get(25, 25));
        assert!(!opened.get(0, 29));
        assert!(opened.get(11, 11));
        // The footprint's top and bottom rows are a single pixel, so the
        // first and last rows lose two pixels at each end.
        assert!(!opened.get(5, 5));
        assert!(!opened.get(6, 5));
        assert!(opened.get(5, 6));
        assert_eq!(opened.count(), 12 * 12 - 8);
    }

    #[test]
    fn closing_bridges_narrow_gaps() {
        // Two bars separated by a two-pixel gap.
        let mask = Mask::from_fn(30, 20, |x, y| {
            (5..=19).contains(&y) && ((2..=12).contains(&x) || (15..=25).contains(&x))
        });
        let closed = close(&mask, &StructuringElement::ellipse(5));
        assert!(closed.get(13, 10));
        assert!(closed.get(14, 10));
    }

    #[test]
    fn erosion_does_not_eat_frame_border() {
        let mask = Mask::from_fn(6, 6, |_, _| true);
        let eroded = erode(&mask, &StructuringElement::rect(3));
        assert_eq!(eroded.count(), 36);
    }

    #[test]
    fn dilation_grows_single_pixel_to_footprint() {
        let mut mask = Mask::new(9, 9);
        mask.set(4, 4, true);
        let element = StructuringElement::ellipse(5);
        let dilated = dilate(&mask, &element);
        assert_eq!(dilated.count(), element.len());
        assert!(dilated.get(4, 2));
        assert!(!dilated.get(2, 2));
    }
}
