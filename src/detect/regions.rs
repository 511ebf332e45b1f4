//! External connected-component extraction.
//!
//! Only outer boundaries count: a hole inside a blob, and anything nested in
//! that hole, belongs to the enclosing blob. Area is the polygon area of the
//! outer boundary traced through pixel centres, so a lone pixel or a
//! one-pixel-wide line has zero area.

use std::collections::VecDeque;

use crate::detect::morphology::Mask;
use crate::detect::result::Region;

const NEIGHBORS_4: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const NEIGHBORS_8: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Chain-code directions, counterclockwise on screen starting east.
const DIRECTIONS: [(i64, i64); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];
const WEST: usize = 4;

/// Extract every external region of `mask`, in raster order of their
/// top-left-most pixel.
pub fn external_regions(mask: &Mask) -> Vec<Region> {
    let width = mask.width() as usize;
    let height = mask.height() as usize;
    if width == 0 || height == 0 || mask.is_empty() {
        return Vec::new();
    }

    let filled = fill_holes(mask);
    let mut visited = vec![false; width * height];
    let mut regions = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..width * height {
        if !filled[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);

        let (mut min_x, mut min_y) = (usize::MAX, usize::MAX);
        let (mut max_x, mut max_y) = (0usize, 0usize);

        while let Some(idx) = queue.pop_front() {
            let (x, y) = (idx % width, idx / width);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            for (dx, dy) in NEIGHBORS_8 {
                let Some(next) = offset(x, y, dx, dy, width, height) else {
                    continue;
                };
                if filled[next] && !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }

        regions.push(Region {
            x: min_x as u32,
            y: min_y as u32,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
            area: polygon_area(&trace_outer_border(&filled, start, width, height)),
        });
    }

    regions
}

/// Outer border of the component whose first pixel in raster order is
/// `start`, as pixel centres in counterclockwise order.
///
/// Suzuki-Abe border following: the west neighbour of `start` is background,
/// so the search begins there. Stops when the walk is about to leave the last
/// border pixel for `start` again.
fn trace_outer_border(
    filled: &[bool],
    start: usize,
    width: usize,
    height: usize,
) -> Vec<(i64, i64)> {
    let at = |idx: usize| ((idx % width) as i64, (idx / width) as i64);
    let step = |idx: usize, dir: usize| {
        let (x, y) = (idx % width, idx / width);
        let (dx, dy) = DIRECTIONS[dir % 8];
        offset(x, y, dx, dy, width, height).filter(|next| filled[*next])
    };
    let direction = |from: usize, to: usize| {
        let ((fx, fy), (tx, ty)) = (at(from), at(to));
        DIRECTIONS
            .iter()
            .position(|d| *d == (tx - fx, ty - fy))
            .unwrap_or(WEST)
    };

    // Clockwise from the west neighbour: the pixel preceding `start` on the border.
    let Some(last) = (0..8).find_map(|i| step(start, WEST + 8 - i)) else {
        return vec![at(start)];
    };

    let mut border = Vec::new();
    let (mut previous, mut current) = (last, start);
    loop {
        border.push(at(current));
        let from = direction(current, previous);
        let Some(next) = (1..=8).find_map(|i| step(current, from + i)) else {
            break;
        };
        if next == start && current == last {
            break;
        }
        previous = current;
        current = next;
    }
    border
}

/// Shoelace area of a closed polygon.
fn polygon_area(points: &[(i64, i64)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|((x0, y0), (x1, y1))| x0 * y1 - x1 * y0)
        .sum();
    twice.unsigned_abs() as f64 / 2.0
}

/// Foreground plus every background pixel not reachable from the frame edge.
///
/// Background connectivity is 4-way, the dual of 8-way foreground, so a
/// diagonal chain of foreground pixels still seals a hole.
fn fill_holes(mask: &Mask) -> Vec<bool> {
    let width = mask.width() as usize;
    let height = mask.height() as usize;
    let mut outside = vec![false; width * height];
    let mut queue = VecDeque::new();

    let edge = (0..width)
        .flat_map(|x| [x, (height - 1) * width + x])
        .chain((0..height).flat_map(|y| [y * width, y * width + width - 1]));
    for idx in edge {
        if !mask.get_index(idx) && !outside[idx] {
            outside[idx] = true;
            queue.push_back(idx);
        }
    }

    while let Some(idx) = queue.pop_front() {
        let (x, y) = (idx % width, idx / width);
        for (dx, dy) in NEIGHBORS_4 {
            let Some(next) = offset(x, y, dx, dy, width, height) else {
                continue;
            };
            if !mask.get_index(next) && !outside[next] {
                outside[next] = true;
                queue.push_back(next);
            }
        }
    }

    outside.into_iter().map(|o| !o).collect()
}

fn offset(x: usize, y: usize, dx: i64, dy: i64, width: usize, height: usize) -> Option<usize> {
    let nx = x as i64 + dx;
    let ny = y as i64 + dy;
    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
        return None;
    }
    Some(ny as usize * width + nx as usize)
}
