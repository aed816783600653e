//! Isoline tracing using the marching squares algorithm.
//!
//! Works in grid space: `x` is the column and `y` the row of the sample grid,
//! so points lie in `[0, width - 1] × [0, height - 1]`.

use std::collections::{HashMap, VecDeque};

/// A point in grid space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Hashable key; endpoints shared by neighbouring cells are computed from
    /// identical inputs, so quantising only absorbs float noise.
    fn key(&self) -> (i64, i64) {
        ((self.x * 1e6).round() as i64, (self.y * 1e6).round() as i64)
    }
}

/// A line segment between two points
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

/// A connected polyline at one level.
#[derive(Debug, Clone)]
pub struct Polyline {
    pub points: Vec<Point>,
    pub closed: bool,
}

/// Marching squares over a row-major grid.
///
/// Cells with any `NaN` corner are skipped.
pub fn march_squares(data: &[f32], width: usize, height: usize, level: f32) -> Vec<Segment> {
    if width < 2 || height < 2 || data.len() != width * height {
        return vec![];
    }

    let mut segments = Vec::new();

    for y in 0..(height - 1) {
        for x in 0..(width - 1) {
            let tl = data[y * width + x];
            let tr = data[y * width + x + 1];
            let bl = data[(y + 1) * width + x];
            let br = data[(y + 1) * width + x + 1];

            if tl.is_nan() || tr.is_nan() || bl.is_nan() || br.is_nan() {
                continue;
            }

            let mut cell_index = 0u8;
            if tl >= level {
                cell_index |= 1;
            }
            if tr >= level {
                cell_index |= 2;
            }
            if br >= level {
                cell_index |= 4;
            }
            if bl >= level {
                cell_index |= 8;
            }

            if cell_index == 0 || cell_index == 15 {
                continue;
            }

            push_cell_segments(
                &mut segments,
                cell_index,
                x as f64,
                y as f64,
                [tl, tr, br, bl],
                level,
            );
        }
    }

    segments
}

fn push_cell_segments(
    out: &mut Vec<Segment>,
    cell_index: u8,
    x: f64,
    y: f64,
    corners: [f32; 4],
    level: f32,
) {
    let [tl, tr, br, bl] = corners;
    let top = interpolate_edge((x, y), (x + 1.0, y), tl, tr, level);
    let right = interpolate_edge((x + 1.0, y), (x + 1.0, y + 1.0), tr, br, level);
    let bottom = interpolate_edge((x, y + 1.0), (x + 1.0, y + 1.0), bl, br, level);
    let left = interpolate_edge((x, y), (x, y + 1.0), tl, bl, level);

    let mut push = |start, end| out.push(Segment { start, end });

    match cell_index {
        1 | 14 => push(left, top),
        2 | 13 => push(top, right),
        3 | 12 => push(left, right),
        4 | 11 => push(right, bottom),
        5 => {
            // Saddle
            push(left, top);
            push(right, bottom);
        }
        6 | 9 => push(top, bottom),
        7 | 8 => push(left, bottom),
        10 => {
            // Saddle
            push(top, right);
            push(left, bottom);
        }
        _ => {}
    }
}

/// Linearly interpolate where `level` crosses the edge `a -> b`.
fn interpolate_edge(a: (f64, f64), b: (f64, f64), val_a: f32, val_b: f32, level: f32) -> Point {
    let delta = f64::from(val_b) - f64::from(val_a);
    if delta.abs() < 1e-9 {
        return Point::new((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
    }

    let t = ((f64::from(level) - f64::from(val_a)) / delta).clamp(0.0, 1.0);
    Point::new(a.0 + t * (b.0 - a.0), a.1 + t * (b.1 - a.1))
}

/// Join unordered segments into polylines by matching shared endpoints.
pub fn connect_segments(segments: &[Segment]) -> Vec<Polyline> {
    if segments.is_empty() {
        return vec![];
    }

    let mut by_endpoint: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (idx, seg) in segments.iter().enumerate() {
        by_endpoint.entry(seg.start.key()).or_default().push(idx);
        by_endpoint.entry(seg.end.key()).or_default().push(idx);
    }

    let mut used = vec![false; segments.len()];
    let mut lines = Vec::new();

    // Finds an unused segment touching `point` and returns its far endpoint.
    let take_next = |point: Point, used: &mut Vec<bool>| -> Option<Point> {
        let candidates = by_endpoint.get(&point.key())?;
        let idx = candidates.iter().copied().find(|&i| !used[i])?;
        used[idx] = true;
        let seg = &segments[idx];
        if seg.start.key() == point.key() {
            Some(seg.end)
        } else {
            Some(seg.start)
        }
    };

    for start_idx in 0..segments.len() {
        if used[start_idx] {
            continue;
        }
        used[start_idx] = true;

        let seed = segments[start_idx];
        let mut points = VecDeque::from([seed.start, seed.end]);

        while let Some(next) = points.back().copied().and_then(|p| take_next(p, &mut used)) {
            points.push_back(next);
        }
        while let Some(prev) = points.front().copied().and_then(|p| take_next(p, &mut used)) {
            points.push_front(prev);
        }

        let closed = points.len() > 2
            && points.front().map(Point::key) == points.back().map(Point::key);

        lines.push(Polyline {
            points: points.into_iter().collect(),
            closed,
        });
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_peak_forms_closed_ring() {
        #[rustfmt::skip]
        let data = [
            0.0, 0.0, 0.0,
            0.0, 10.0, 0.0,
            0.0, 0.0, 0.0,
        ];
        let segments = march_squares(&data, 3, 3, 5.0);
        assert_eq!(segments.len(), 4);

        let lines = connect_segments(&segments);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].closed);
        assert_eq!(lines[0].points.len(), 5);
    }

    #[test]
    fn test_ramp_forms_open_line() {
        #[rustfmt::skip]
        let data = [
            0.0, 10.0, 20.0,
            0.0, 10.0, 20.0,
            0.0, 10.0, 20.0,
        ];
        let lines = connect_segments(&march_squares(&data, 3, 3, 15.0));
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].closed);
        assert_eq!(lines[0].points.len(), 3);
        for p in &lines[0].points {
            assert!((p.x - 1.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_nan_cells_are_skipped() {
        let data = [0.0, f32::NAN, 0.0, 10.0];
        assert!(march_squares(&data, 2, 2, 5.0).is_empty());
    }

    #[test]
    fn test_invalid_dimensions() {
        assert!(march_squares(&[1.0, 2.0], 2, 2, 1.5).is_empty());
        assert!(march_squares(&[1.0], 1, 1, 0.5).is_empty());
    }
}
