//! Partial updates merged into an existing shape in place.

use super::{SerializableColor, Shape, ShapeKind, ShapeStyle};
use kurbo::{Affine, Point, Rect, Vec2};

/// Kind-specific geometry replacement.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryPatch {
    /// Replace every point of a freehand path.
    Points(Vec<Point>),
    /// Append points to a freehand path.
    AppendPoints(Vec<Point>),
    /// Replace both endpoints of a line.
    Endpoints { start: Point, end: Point },
    /// Replace the bounding box of a rectangle, triangle or image.
    Frame(Rect),
    /// Replace center and radius of a circle.
    Circle { center: Point, radius: f64 },
    /// Move the anchor of a text.
    Anchor(Point),
    /// Replace the content of a text.
    Content(String),
    /// Move any shape by an offset.
    Translate(Vec2),
}

impl GeometryPatch {
    /// Whether this patch can be merged into a shape of `kind`.
    pub fn fits(&self, kind: ShapeKind) -> bool {
        use ShapeKind as K;
        match self {
            GeometryPatch::Points(_) | GeometryPatch::AppendPoints(_) => kind == K::Path,
            GeometryPatch::Endpoints { .. } => kind == K::Line,
            GeometryPatch::Frame(_) => matches!(kind, K::Rectangle | K::Triangle | K::Image),
            GeometryPatch::Circle { .. } => kind == K::Circle,
            GeometryPatch::Anchor(_) | GeometryPatch::Content(_) => kind == K::Text,
            GeometryPatch::Translate(_) => true,
        }
    }
}

/// Style fields to overwrite; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StylePatch {
    pub stroke_color: Option<SerializableColor>,
    pub stroke_width: Option<f64>,
    /// `Some(None)` removes the fill.
    pub fill_color: Option<Option<SerializableColor>>,
}

impl StylePatch {
    pub fn is_empty(&self) -> bool {
        self.stroke_color.is_none() && self.stroke_width.is_none() && self.fill_color.is_none()
    }

    fn apply(&self, style: &mut ShapeStyle) {
        if let Some(color) = self.stroke_color {
            style.stroke_color = color;
        }
        if let Some(width) = self.stroke_width {
            style.stroke_width = width;
        }
        if let Some(fill) = self.fill_color {
            style.fill_color = fill;
        }
    }
}

/// A partial geometry and/or style change for one shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapePatch {
    pub geometry: Option<GeometryPatch>,
    pub style: StylePatch,
}

impl ShapePatch {
    pub fn from_geometry(geometry: GeometryPatch) -> Self {
        Self {
            geometry: Some(geometry),
            style: StylePatch::default(),
        }
    }

    pub fn from_style(style: StylePatch) -> Self {
        Self {
            geometry: None,
            style,
        }
    }
}

impl Shape {
    /// Merge a patch into this shape, keeping its id.
    ///
    /// When the geometry does not fit this shape's kind the shape is left
    /// untouched and its kind is returned as the error.
    pub fn apply_patch(&mut self, patch: &ShapePatch) -> Result<(), ShapeKind> {
        let kind = self.kind();
        if let Some(geometry) = &patch.geometry {
            if !geometry.fits(kind) {
                return Err(kind);
            }
            self.apply_geometry(geometry);
        }
        patch.style.apply(self.style_mut());
        Ok(())
    }

    fn apply_geometry(&mut self, geometry: &GeometryPatch) {
        match (self, geometry) {
            (shape, GeometryPatch::Translate(offset)) => shape.transform(Affine::translate(*offset)),
            (Shape::Path(s), GeometryPatch::Points(points)) => s.points = points.clone(),
            (Shape::Path(s), GeometryPatch::AppendPoints(points)) => {
                s.points.extend_from_slice(points)
            }
            (Shape::Line(s), GeometryPatch::Endpoints { start, end }) => {
                s.start = *start;
                s.end = *end;
            }
            (Shape::Rectangle(s), GeometryPatch::Frame(frame)) => s.set_frame(*frame),
            (Shape::Triangle(s), GeometryPatch::Frame(frame)) => s.set_frame(*frame),
            (Shape::Image(s), GeometryPatch::Frame(frame)) => s.set_frame(*frame),
            (Shape::Circle(s), GeometryPatch::Circle { center, radius }) => {
                s.center = *center;
                s.radius = radius.abs();
            }
            (Shape::Text(s), GeometryPatch::Anchor(position)) => s.position = *position,
            (Shape::Text(s), GeometryPatch::Content(content)) => s.content = content.clone(),
            // Rejected by `fits` before we get here
            _ => {}
        }
    }
}
