//! Isosceles triangle inscribed in a bounding box.

use super::{ShapeId, ShapeStyle, ShapeTrait, point_to_polyline_dist};
use kurbo::{Affine, BezPath, Point, Rect};
use serde::{Deserialize, Serialize};

/// A triangle with its apex at the top center of its box and its base along
/// the bottom edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub(crate) id: ShapeId,
    /// Top-left corner of the bounding box.
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub style: ShapeStyle,
}

impl Triangle {
    pub fn new(position: Point, width: f64, height: f64) -> Self {
        Self::with_id(ShapeId::generate(), position, width, height)
    }

    pub fn with_id(id: ShapeId, position: Point, width: f64, height: f64) -> Self {
        Self {
            id,
            position,
            width,
            height,
            style: ShapeStyle::default(),
        }
    }

    pub fn as_rect(&self) -> Rect {
        Rect::new(
            self.position.x,
            self.position.y,
            self.position.x + self.width,
            self.position.y + self.height,
        )
    }

    pub fn set_frame(&mut self, frame: Rect) {
        let frame = frame.abs();
        self.position = frame.origin();
        self.width = frame.width();
        self.height = frame.height();
    }

    /// Apex, bottom-right and bottom-left vertices.
    pub fn vertices(&self) -> [Point; 3] {
        let Point { x, y } = self.position;
        [
            Point::new(x + self.width / 2.0, y),
            Point::new(x + self.width, y + self.height),
            Point::new(x, y + self.height),
        ]
    }

    fn contains(&self, point: Point) -> bool {
        let [a, b, c] = self.vertices();
        let sign = |p1: Point, p2: Point, p3: Point| {
            (p1.x - p3.x) * (p2.y - p3.y) - (p2.x - p3.x) * (p1.y - p3.y)
        };
        let d1 = sign(point, a, b);
        let d2 = sign(point, b, c);
        let d3 = sign(point, c, a);
        let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
        let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
        !(has_neg && has_pos)
    }
}

impl ShapeTrait for Triangle {
    fn id(&self) -> &ShapeId {
        &self.id
    }

    fn bounds(&self) -> Rect {
        self.as_rect()
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        if self.style.fill_color.is_some() && self.contains(point) {
            return true;
        }
        let [a, b, c] = self.vertices();
        point_to_polyline_dist(point, &[a, b, c, a]) <= tolerance + self.style.stroke_width / 2.0
    }

    fn to_path(&self) -> BezPath {
        let [a, b, c] = self.vertices();
        let mut path = BezPath::new();
        path.move_to(a);
        path.line_to(b);
        path.line_to(c);
        path.close_path();
        path
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        self.position = affine * self.position;
        let scale = affine.as_coeffs();
        self.width *= scale[0].abs();
        self.height *= scale[3].abs();
    }
}
