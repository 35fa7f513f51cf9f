//! Shape definitions for the whiteboard.

mod circle;
mod freehand;
mod image;
mod line;
mod patch;
mod rectangle;
mod text;
mod triangle;

pub use circle::Circle;
pub use freehand::Freehand;
pub use image::{Image, ImageFormat};
pub use line::Line;
pub use patch::{GeometryPatch, ShapePatch, StylePatch};
pub use rectangle::Rectangle;
pub use text::Text;
pub use triangle::Triangle;

use kurbo::{Affine, BezPath, Point, Rect};
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    pub fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Parse a CSS-style color (`#rgb`, `#rrggbb`, `#rrggbbaa` or `transparent`).
    pub fn from_hex(color: &str) -> Option<Self> {
        let color = color.trim();
        if color.eq_ignore_ascii_case("transparent") {
            return Some(Self::transparent());
        }

        let hex = color.strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
        match hex.len() {
            3 => {
                // #rgb -> #rrggbb
                let r = channel(0..1)? * 17;
                let g = channel(1..2)? * 17;
                let b = channel(2..3)? * 17;
                Some(Self::new(r, g, b, 255))
            }
            6 => Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?, 255)),
            8 => Some(Self::new(
                channel(0..2)?,
                channel(2..4)?,
                channel(4..6)?,
                channel(6..8)?,
            )),
            _ => None,
        }
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Style properties for shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    /// Stroke color.
    pub stroke_color: SerializableColor,
    /// Stroke width.
    pub stroke_width: f64,
    /// Fill color (None = no fill).
    #[serde(default)]
    pub fill_color: Option<SerializableColor>,
}

impl ShapeStyle {
    /// Create a stroke-only style.
    pub fn stroked(color: SerializableColor, width: f64) -> Self {
        Self {
            stroke_color: color,
            stroke_width: width,
            fill_color: None,
        }
    }

    /// Get the stroke color as a peniko Color.
    pub fn stroke(&self) -> Color {
        self.stroke_color.into()
    }

    /// Get the fill color as a peniko Color.
    pub fn fill(&self) -> Option<Color> {
        self.fill_color.map(|c| c.into())
    }
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self::stroked(SerializableColor::black(), 2.0)
    }
}

/// Unique identifier for shapes.
///
/// Assigned once by the authoring client and never changed afterwards.
/// Any string is accepted from the wire; locally created shapes use a v4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    /// Generate a fresh collision-resistant identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShapeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ShapeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Discriminant of a [`Shape`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Path,
    Line,
    Rectangle,
    Circle,
    Triangle,
    Text,
    Image,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeKind::Path => "path",
            ShapeKind::Line => "line",
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Circle => "circle",
            ShapeKind::Triangle => "triangle",
            ShapeKind::Text => "text",
            ShapeKind::Image => "image",
        };
        f.write_str(name)
    }
}

/// Distance from a point to a line segment (a→b).
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    let seg = kurbo::Vec2::new(b.x - a.x, b.y - a.y);
    let pv = kurbo::Vec2::new(point.x - a.x, point.y - a.y);
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    let proj = Point::new(a.x + t * seg.x, a.y + t * seg.y);
    ((point.x - proj.x).powi(2) + (point.y - proj.y).powi(2)).sqrt()
}

/// Minimum distance from a point to a polyline (sequence of connected segments).
pub fn point_to_polyline_dist(point: Point, points: &[Point]) -> f64 {
    match points {
        [] => f64::INFINITY,
        [single] => single.distance(point),
        _ => points
            .windows(2)
            .map(|w| point_to_segment_dist(point, w[0], w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Hit test against the outline of a rectangle, or its interior when filled.
pub(crate) fn hit_test_frame(rect: Rect, style: &ShapeStyle, point: Point, tolerance: f64) -> bool {
    let reach = tolerance + style.stroke_width / 2.0;
    if style.fill_color.is_some() {
        return rect.inflate(reach, reach).contains(point);
    }
    let outer = rect.inflate(reach, reach);
    let inner = rect.inflate(-reach, -reach);
    outer.contains(point) && !(inner.width() > 0.0 && inner.height() > 0.0 && inner.contains(point))
}

/// Common trait for all shapes.
pub trait ShapeTrait {
    /// Get the unique identifier.
    fn id(&self) -> &ShapeId;

    /// Get the bounding box in world coordinates.
    fn bounds(&self) -> Rect;

    /// Check if a point (in world coordinates) hits this shape.
    fn hit_test(&self, point: Point, tolerance: f64) -> bool;

    /// Get the path representation for rendering.
    fn to_path(&self) -> BezPath;

    /// Get the style.
    fn style(&self) -> &ShapeStyle;

    /// Get mutable style.
    fn style_mut(&mut self) -> &mut ShapeStyle;

    /// Apply a transform to this shape.
    fn transform(&mut self, affine: Affine);
}

/// Enum wrapper for all shape types.
///
/// Serialized with a `kind` discriminant next to the kind's own fields, so
/// an unknown kind fails to decode instead of producing a partial shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Path(Freehand),
    Line(Line),
    Rectangle(Rectangle),
    Circle(Circle),
    Triangle(Triangle),
    Text(Text),
    Image(Image),
}

impl Shape {
    pub fn id(&self) -> &ShapeId {
        match self {
            Shape::Path(s) => s.id(),
            Shape::Line(s) => s.id(),
            Shape::Rectangle(s) => s.id(),
            Shape::Circle(s) => s.id(),
            Shape::Triangle(s) => s.id(),
            Shape::Text(s) => s.id(),
            Shape::Image(s) => s.id(),
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Path(_) => ShapeKind::Path,
            Shape::Line(_) => ShapeKind::Line,
            Shape::Rectangle(_) => ShapeKind::Rectangle,
            Shape::Circle(_) => ShapeKind::Circle,
            Shape::Triangle(_) => ShapeKind::Triangle,
            Shape::Text(_) => ShapeKind::Text,
            Shape::Image(_) => ShapeKind::Image,
        }
    }

    pub fn bounds(&self) -> Rect {
        match self {
            Shape::Path(s) => s.bounds(),
            Shape::Line(s) => s.bounds(),
            Shape::Rectangle(s) => s.bounds(),
            Shape::Circle(s) => s.bounds(),
            Shape::Triangle(s) => s.bounds(),
            Shape::Text(s) => s.bounds(),
            Shape::Image(s) => s.bounds(),
        }
    }

    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        match self {
            Shape::Path(s) => s.hit_test(point, tolerance),
            Shape::Line(s) => s.hit_test(point, tolerance),
            Shape::Rectangle(s) => s.hit_test(point, tolerance),
            Shape::Circle(s) => s.hit_test(point, tolerance),
            Shape::Triangle(s) => s.hit_test(point, tolerance),
            Shape::Text(s) => s.hit_test(point, tolerance),
            Shape::Image(s) => s.hit_test(point, tolerance),
        }
    }

    pub fn to_path(&self) -> BezPath {
        match self {
            Shape::Path(s) => s.to_path(),
            Shape::Line(s) => s.to_path(),
            Shape::Rectangle(s) => s.to_path(),
            Shape::Circle(s) => s.to_path(),
            Shape::Triangle(s) => s.to_path(),
            Shape::Text(s) => s.to_path(),
            Shape::Image(s) => s.to_path(),
        }
    }

    pub fn style(&self) -> &ShapeStyle {
        match self {
            Shape::Path(s) => s.style(),
            Shape::Line(s) => s.style(),
            Shape::Rectangle(s) => s.style(),
            Shape::Circle(s) => s.style(),
            Shape::Triangle(s) => s.style(),
            Shape::Text(s) => s.style(),
            Shape::Image(s) => s.style(),
        }
    }

    pub fn style_mut(&mut self) -> &mut ShapeStyle {
        match self {
            Shape::Path(s) => s.style_mut(),
            Shape::Line(s) => s.style_mut(),
            Shape::Rectangle(s) => s.style_mut(),
            Shape::Circle(s) => s.style_mut(),
            Shape::Triangle(s) => s.style_mut(),
            Shape::Text(s) => s.style_mut(),
            Shape::Image(s) => s.style_mut(),
        }
    }

    pub fn transform(&mut self, affine: Affine) {
        match self {
            Shape::Path(s) => s.transform(affine),
            Shape::Line(s) => s.transform(affine),
            Shape::Rectangle(s) => s.transform(affine),
            Shape::Circle(s) => s.transform(affine),
            Shape::Triangle(s) => s.transform(affine),
            Shape::Text(s) => s.transform(affine),
            Shape::Image(s) => s.transform(affine),
        }
    }

    /// Full geometry of this shape, expressed as a patch that would
    /// reproduce it on a shape of the same kind.
    pub fn geometry(&self) -> GeometryPatch {
        match self {
            Shape::Path(s) => GeometryPatch::Points(s.points.clone()),
            Shape::Line(s) => GeometryPatch::Endpoints {
                start: s.start,
                end: s.end,
            },
            Shape::Rectangle(s) => GeometryPatch::Frame(s.as_rect()),
            Shape::Circle(s) => GeometryPatch::Circle {
                center: s.center,
                radius: s.radius,
            },
            Shape::Triangle(s) => GeometryPatch::Frame(s.as_rect()),
            Shape::Text(s) => GeometryPatch::Anchor(s.position),
            Shape::Image(s) => GeometryPatch::Frame(s.as_rect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_from_hex() {
        assert_eq!(
            SerializableColor::from_hex("#FF0000"),
            Some(SerializableColor::new(255, 0, 0, 255))
        );
        assert_eq!(
            SerializableColor::from_hex("#0f0"),
            Some(SerializableColor::new(0, 255, 0, 255))
        );
        assert_eq!(
            SerializableColor::from_hex("#00000080"),
            Some(SerializableColor::new(0, 0, 0, 128))
        );
        assert_eq!(
            SerializableColor::from_hex("transparent"),
            Some(SerializableColor::transparent())
        );
        assert_eq!(SerializableColor::from_hex("red"), None);
        assert_eq!(SerializableColor::from_hex("#12345"), None);
    }

    #[test]
    fn test_shape_serializes_with_kind_tag() {
        let rect = Rectangle::with_id("r1".into(), Point::new(10.0, 10.0), 40.0, 40.0);
        let json = serde_json::to_value(Shape::Rectangle(rect)).unwrap();
        assert_eq!(json["kind"], "rectangle");
        assert_eq!(json["id"], "r1");
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{"kind":"hexagon","id":"h1","style":{"stroke_color":{"r":0,"g":0,"b":0,"a":255},"stroke_width":2.0}}"#;
        assert!(serde_json::from_str::<Shape>(json).is_err());
    }

    #[test]
    fn test_missing_geometry_rejected() {
        let json = r#"{"kind":"rectangle","id":"r1","style":{"stroke_color":{"r":0,"g":0,"b":0,"a":255},"stroke_width":2.0}}"#;
        assert!(serde_json::from_str::<Shape>(json).is_err());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ShapeId::generate();
        let b = ShapeId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_polyline_distance() {
        let points = [Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        assert!((point_to_polyline_dist(Point::new(5.0, 3.0), &points) - 3.0).abs() < 1e-9);
        assert!(point_to_polyline_dist(Point::ZERO, &[]).is_infinite());
    }
}
