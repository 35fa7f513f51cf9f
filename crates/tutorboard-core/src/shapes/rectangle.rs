//! Rectangle shape.

use super::{ShapeId, ShapeStyle, ShapeTrait, hit_test_frame};
use kurbo::{Affine, BezPath, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub(crate) id: ShapeId,
    /// Top-left corner position.
    pub position: Point,
    /// Width of the rectangle.
    pub width: f64,
    /// Height of the rectangle.
    pub height: f64,
    /// Style properties.
    pub style: ShapeStyle,
}

impl Rectangle {
    /// Create a new rectangle with a freshly generated ID.
    pub fn new(position: Point, width: f64, height: f64) -> Self {
        Self::with_id(ShapeId::generate(), position, width, height)
    }

    /// Create a rectangle with a specific ID.
    pub fn with_id(id: ShapeId, position: Point, width: f64, height: f64) -> Self {
        Self {
            id,
            position,
            width,
            height,
            style: ShapeStyle::default(),
        }
    }

    /// Create a rectangle from two corner points.
    pub fn from_corners(p1: Point, p2: Point) -> Self {
        let mut rect = Self::new(Point::ZERO, 0.0, 0.0);
        rect.set_frame(Rect::from_points(p1, p2));
        rect
    }

    /// Get the rectangle as a kurbo Rect.
    pub fn as_rect(&self) -> Rect {
        Rect::new(
            self.position.x,
            self.position.y,
            self.position.x + self.width,
            self.position.y + self.height,
        )
    }

    /// Replace position and size from a (possibly unnormalised) rect.
    pub fn set_frame(&mut self, frame: Rect) {
        let frame = frame.abs();
        self.position = frame.origin();
        self.width = frame.width();
        self.height = frame.height();
    }
}

impl ShapeTrait for Rectangle {
    fn id(&self) -> &ShapeId {
        &self.id
    }

    fn bounds(&self) -> Rect {
        self.as_rect()
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        hit_test_frame(self.as_rect(), &self.style, point, tolerance)
    }

    fn to_path(&self) -> BezPath {
        self.as_rect().to_path(0.1)
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        self.position = affine * self.position;
        // Note: This is a simplified transform that doesn't handle rotation/skew
        let scale = affine.as_coeffs();
        self.width *= scale[0].abs();
        self.height *= scale[3].abs();
    }
}
