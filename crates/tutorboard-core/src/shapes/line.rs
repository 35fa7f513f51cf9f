//! Line shape.

use super::{ShapeId, ShapeStyle, ShapeTrait, point_to_segment_dist};
use kurbo::{Affine, BezPath, Line as KurboLine, Point, Rect};
use serde::{Deserialize, Serialize};

/// A straight line segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub(crate) id: ShapeId,
    /// Start point.
    pub start: Point,
    /// End point.
    pub end: Point,
    /// Style properties.
    pub style: ShapeStyle,
}

impl Line {
    /// Create a new line.
    pub fn new(start: Point, end: Point) -> Self {
        Self::with_id(ShapeId::generate(), start, end)
    }

    pub fn with_id(id: ShapeId, start: Point, end: Point) -> Self {
        Self {
            id,
            start,
            end,
            style: ShapeStyle::default(),
        }
    }

    /// Get the length of the line.
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    /// Get as a kurbo Line.
    pub fn as_kurbo(&self) -> KurboLine {
        KurboLine::new(self.start, self.end)
    }
}

impl ShapeTrait for Line {
    fn id(&self) -> &ShapeId {
        &self.id
    }

    fn bounds(&self) -> Rect {
        Rect::from_points(self.start, self.end)
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        point_to_segment_dist(point, self.start, self.end) <= tolerance + self.style.stroke_width / 2.0
    }

    fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        path.move_to(self.start);
        path.line_to(self.end);
        path
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        self.start = affine * self.start;
        self.end = affine * self.end;
    }
}
