//! Text shape.

use super::{ShapeId, ShapeStyle, ShapeTrait};
use kurbo::{Affine, BezPath, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};

/// Default font family for typed text.
pub const DEFAULT_FONT_FAMILY: &str = "sans-serif";

/// Average glyph advance as a fraction of the font size.
const GLYPH_ADVANCE: f64 = 0.6;
/// Line height as a multiple of the font size.
const LINE_HEIGHT: f64 = 1.2;

/// A text shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub(crate) id: ShapeId,
    /// Top-left anchor.
    pub position: Point,
    /// Text content.
    pub content: String,
    /// Font size in canvas units.
    pub font_size: f64,
    /// Font family name.
    #[serde(default = "default_font_family")]
    pub font_family: String,
    /// Style properties (stroke color is the text color).
    pub style: ShapeStyle,
}

fn default_font_family() -> String {
    DEFAULT_FONT_FAMILY.to_string()
}

impl Text {
    /// Create a new text shape.
    pub fn new(position: Point, content: String) -> Self {
        Self::with_id(ShapeId::generate(), position, content)
    }

    pub fn with_id(id: ShapeId, position: Point, content: String) -> Self {
        Self {
            id,
            position,
            content,
            font_size: 16.0,
            font_family: default_font_family(),
            style: ShapeStyle::default(),
        }
    }

    /// Approximate width of the widest line.
    pub fn approximate_width(&self) -> f64 {
        let widest = self
            .content
            .lines()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0);
        widest as f64 * self.font_size * GLYPH_ADVANCE
    }

    /// Approximate height of all lines.
    pub fn approximate_height(&self) -> f64 {
        let lines = self.content.lines().count().max(1);
        lines as f64 * self.font_size * LINE_HEIGHT
    }
}

impl ShapeTrait for Text {
    fn id(&self) -> &ShapeId {
        &self.id
    }

    fn bounds(&self) -> Rect {
        let width = self.approximate_width().max(20.0);
        let height = self.approximate_height();
        Rect::new(
            self.position.x,
            self.position.y,
            self.position.x + width,
            self.position.y + height,
        )
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        self.bounds().inflate(tolerance, tolerance).contains(point)
    }

    fn to_path(&self) -> BezPath {
        self.bounds().to_path(0.1)
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
        self.font_size *= scale[3].abs();
    }
}
