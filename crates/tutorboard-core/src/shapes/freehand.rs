//! Freehand drawing shape.

use super::{ShapeId, ShapeStyle, ShapeTrait, point_to_polyline_dist};
use kurbo::{Affine, BezPath, Point, Rect};
use serde::{Deserialize, Serialize};

/// A freehand drawing (series of points).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Freehand {
    pub(crate) id: ShapeId,
    /// Points in the freehand path.
    pub points: Vec<Point>,
    /// Style properties.
    pub style: ShapeStyle,
}

impl Freehand {
    /// Create from existing points.
    pub fn from_points(points: Vec<Point>) -> Self {
        Self::with_id(ShapeId::generate(), points)
    }

    pub fn with_id(id: ShapeId, points: Vec<Point>) -> Self {
        Self {
            id,
            points,
            style: ShapeStyle::default(),
        }
    }

    /// Get the number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the path is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Simplify the path by removing redundant points.
    pub fn simplify(&mut self, tolerance: f64) {
        if self.points.len() < 3 {
            return;
        }

        // Ramer-Douglas-Peucker algorithm
        self.points = rdp_simplify(&self.points, tolerance);
    }
}

/// Ramer-Douglas-Peucker line simplification.
fn rdp_simplify(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let first = points[0];
    let last = points[points.len() - 1];

    let mut max_dist = 0.0;
    let mut max_index = 0;

    for (i, point) in points.iter().enumerate().skip(1).take(points.len() - 2) {
        let dist = perpendicular_distance(*point, first, last);
        if dist > max_dist {
            max_dist = dist;
            max_index = i;
        }
    }

    if max_dist > tolerance {
        let mut left = rdp_simplify(&points[..=max_index], tolerance);
        let right = rdp_simplify(&points[max_index..], tolerance);

        // Junction point appears in both halves
        left.pop();
        left.extend(right);
        left
    } else {
        vec![first, last]
    }
}

/// Calculate perpendicular distance from point to line.
fn perpendicular_distance(point: Point, line_start: Point, line_end: Point) -> f64 {
    let dx = line_end.x - line_start.x;
    let dy = line_end.y - line_start.y;

    let line_len_sq = dx * dx + dy * dy;
    if line_len_sq < f64::EPSILON {
        return point.distance(line_start);
    }

    let area2 = ((point.x - line_start.x) * dy - (point.y - line_start.y) * dx).abs();
    area2 / line_len_sq.sqrt()
}

impl ShapeTrait for Freehand {
    fn id(&self) -> &ShapeId {
        &self.id
    }

    fn bounds(&self) -> Rect {
        let Some(first) = self.points.first() else {
            return Rect::ZERO;
        };
        self.points
            .iter()
            .fold(Rect::from_points(*first, *first), |acc, p| acc.union_pt(*p))
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        point_to_polyline_dist(point, &self.points) <= tolerance + self.style.stroke_width / 2.0
    }

    fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let Some((first, rest)) = self.points.split_first() else {
            return path;
        };
        path.move_to(*first);
        if rest.is_empty() {
            // A single tap still leaves a visible dot
            path.line_to(*first);
        }
        for p in rest {
            path.line_to(*p);
        }
        path
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        for p in &mut self.points {
            *p = affine * *p;
        }
    }
}
