//! Circle shape.

use super::{ShapeId, ShapeStyle, ShapeTrait};
use kurbo::{Affine, BezPath, Circle as KurboCircle, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};

/// A circle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub(crate) id: ShapeId,
    /// Center point.
    pub center: Point,
    /// Radius.
    pub radius: f64,
    /// Style properties.
    pub style: ShapeStyle,
}

impl Circle {
    pub fn new(center: Point, radius: f64) -> Self {
        Self::with_id(ShapeId::generate(), center, radius)
    }

    pub fn with_id(id: ShapeId, center: Point, radius: f64) -> Self {
        Self {
            id,
            center,
            radius,
            style: ShapeStyle::default(),
        }
    }

    /// Circle spanned by a drag from `anchor` to `pointer`.
    ///
    /// The diameter equals the drag distance and the circle's box is anchored
    /// at the drag's minimum corner.
    pub fn geometry_from_drag(anchor: Point, pointer: Point) -> (Point, f64) {
        let radius = anchor.distance(pointer) / 2.0;
        let left = anchor.x.min(pointer.x);
        let top = anchor.y.min(pointer.y);
        (Point::new(left + radius, top + radius), radius)
    }

    pub fn as_kurbo(&self) -> KurboCircle {
        KurboCircle::new(self.center, self.radius)
    }
}

impl ShapeTrait for Circle {
    fn id(&self) -> &ShapeId {
        &self.id
    }

    fn bounds(&self) -> Rect {
        Rect::new(
            self.center.x - self.radius,
            self.center.y - self.radius,
            self.center.x + self.radius,
            self.center.y + self.radius,
        )
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let half_sw = self.style.stroke_width / 2.0;
        let dist = self.center.distance(point);
        if dist > self.radius + tolerance + half_sw {
            return false;
        }
        if self.style.fill_color.is_some() {
            return true;
        }
        // Outline only: reject if inside inner circle
        dist >= (self.radius - tolerance - half_sw).max(0.0)
    }

    fn to_path(&self) -> BezPath {
        self.as_kurbo().to_path(0.1)
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        self.center = affine * self.center;
        let scale = affine.as_coeffs();
        self.radius *= scale[0].abs().max(scale[3].abs());
    }
}
