//! Tool system for the whiteboard.
//!
//! Turns pointer gestures under the active tool into document operations.
//! The controller never mutates the document itself; every operation it
//! produces goes through the collaboration layer.

use crate::document::{ShapeDocument, ShapeOp};
use crate::settings::SessionSettings;
use crate::shapes::{
    Circle, Freehand, GeometryPatch, Line, Rectangle, SerializableColor, Shape, ShapeId, ShapePatch,
    ShapeStyle, ShapeTrait, Text, Triangle,
};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder content for newly placed text.
pub const TEXT_PLACEHOLDER: &str = "Click to edit";

/// Pick radius for the select tool.
const HIT_TOLERANCE: f64 = 4.0;

/// Freehand strokes are simplified with this tolerance on release.
const SIMPLIFY_TOLERANCE: f64 = 0.5;

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    #[default]
    Select,
    Pen,
    Eraser,
    Line,
    Rectangle,
    Circle,
    Triangle,
    Text,
}

impl ToolKind {
    /// Tools that drag out a shape from an anchor point.
    pub fn is_shape_tool(&self) -> bool {
        matches!(
            self,
            ToolKind::Line | ToolKind::Rectangle | ToolKind::Circle | ToolKind::Triangle
        )
    }
}

/// Tool errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("Cannot switch tools while a {0:?} gesture is in progress")]
    GestureInProgress(ToolKind),
}

/// Style applied to newly created shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolStyle {
    pub color: SerializableColor,
    pub width: f64,
    pub font_size: f64,
    /// Canvas background, painted by the eraser.
    pub background: SerializableColor,
}

impl Default for ToolStyle {
    fn default() -> Self {
        Self::from_settings(&SessionSettings::default())
    }
}

impl ToolStyle {
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            color: settings.stroke_color,
            width: settings.stroke_width,
            font_size: settings.font_size,
            background: settings.background,
        }
    }

    fn pen(&self) -> ShapeStyle {
        ShapeStyle::stroked(self.color, self.width)
    }

    fn eraser(&self) -> ShapeStyle {
        ShapeStyle::stroked(self.background, self.width * 2.0)
    }
}

/// State of the current pointer gesture.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Gesture {
    #[default]
    Idle,
    /// Dragging out a provisional shape from `anchor`.
    Drawing { id: ShapeId, anchor: Point },
    /// Appending points to a freehand path.
    Stroking { id: ShapeId },
    /// Moving an existing shape with the select tool.
    Dragging { id: ShapeId, last: Point },
}

/// Tracks the active tool, its style and the gesture in progress.
#[derive(Debug, Clone, Default)]
pub struct ToolController {
    current_tool: ToolKind,
    style: ToolStyle,
    gesture: Gesture,
}

impl ToolController {
    pub fn new(style: ToolStyle) -> Self {
        Self {
            current_tool: ToolKind::default(),
            style,
            gesture: Gesture::Idle,
        }
    }

    pub fn current_tool(&self) -> ToolKind {
        self.current_tool
    }

    pub fn style(&self) -> &ToolStyle {
        &self.style
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn is_idle(&self) -> bool {
        self.gesture == Gesture::Idle
    }

    /// Switch tools. Fails while a gesture is still armed.
    pub fn set_tool(&mut self, tool: ToolKind) -> Result<(), ToolError> {
        if !self.is_idle() {
            return Err(ToolError::GestureInProgress(self.current_tool));
        }
        self.current_tool = tool;
        Ok(())
    }

    pub fn set_color(&mut self, color: SerializableColor) {
        self.style.color = color;
    }

    pub fn set_width(&mut self, width: f64) {
        self.style.width = width.max(0.0);
    }

    pub fn set_font_size(&mut self, font_size: f64) {
        self.style.font_size = font_size.max(1.0);
    }

    /// Start a gesture.
    pub fn pointer_down(&mut self, doc: &ShapeDocument, point: Point) -> Option<ShapeOp> {
        if !self.is_idle() {
            log::debug!("Ignoring pointer down during {:?}", self.gesture);
            return None;
        }

        match self.current_tool {
            ToolKind::Select => {
                let id = doc.shapes_at_point(point, HIT_TOLERANCE).into_iter().next()?;
                self.gesture = Gesture::Dragging { id, last: point };
                None
            }
            ToolKind::Pen | ToolKind::Eraser => {
                let mut path = Freehand::from_points(vec![point]);
                path.style = if self.current_tool == ToolKind::Eraser {
                    self.style.eraser()
                } else {
                    self.style.pen()
                };
                self.gesture = Gesture::Stroking {
                    id: path.id().clone(),
                };
                Some(ShapeOp::Insert(Shape::Path(path)))
            }
            ToolKind::Text => {
                let mut text = Text::new(point, TEXT_PLACEHOLDER.to_string());
                text.font_size = self.style.font_size;
                text.style = self.style.pen();
                Some(ShapeOp::Insert(Shape::Text(text)))
            }
            ToolKind::Line | ToolKind::Rectangle | ToolKind::Circle | ToolKind::Triangle => {
                let shape = self.provisional_shape(point);
                self.gesture = Gesture::Drawing {
                    id: shape.id().clone(),
                    anchor: point,
                };
                Some(ShapeOp::Insert(shape))
            }
        }
    }

    /// Continue a gesture.
    pub fn pointer_move(&mut self, point: Point) -> Option<ShapeOp> {
        match &mut self.gesture {
            Gesture::Idle => None,
            Gesture::Drawing { id, anchor } => {
                let geometry = drag_geometry(self.current_tool, *anchor, point)?;
                Some(ShapeOp::Update {
                    id: id.clone(),
                    patch: ShapePatch::from_geometry(geometry),
                })
            }
            Gesture::Stroking { id } => Some(ShapeOp::Update {
                id: id.clone(),
                patch: ShapePatch::from_geometry(GeometryPatch::AppendPoints(vec![point])),
            }),
            Gesture::Dragging { id, last } => {
                let offset = point - *last;
                *last = point;
                Some(ShapeOp::Update {
                    id: id.clone(),
                    patch: ShapePatch::from_geometry(GeometryPatch::Translate(offset)),
                })
            }
        }
    }

    /// Finish a gesture.
    ///
    /// A finished freehand stroke is simplified; the replacement points are
    /// returned as one last update when that dropped anything.
    pub fn pointer_up(&mut self, doc: &ShapeDocument) -> Option<ShapeOp> {
        match std::mem::take(&mut self.gesture) {
            Gesture::Stroking { id } => {
                let Some(Shape::Path(path)) = doc.get(&id) else {
                    return None;
                };
                let mut simplified = path.clone();
                simplified.simplify(SIMPLIFY_TOLERANCE);
                (simplified.len() < path.len()).then(|| ShapeOp::Update {
                    id,
                    patch: ShapePatch::from_geometry(GeometryPatch::Points(simplified.points)),
                })
            }
            Gesture::Idle | Gesture::Drawing { .. } | Gesture::Dragging { .. } => None,
        }
    }

    /// Abandon the gesture in progress.
    ///
    /// A shape or stroke created by the gesture is removed again; a dragged
    /// shape stays where it was moved.
    pub fn cancel(&mut self) -> Option<ShapeOp> {
        match std::mem::take(&mut self.gesture) {
            Gesture::Drawing { id, .. } | Gesture::Stroking { id } => Some(ShapeOp::Remove(id)),
            Gesture::Idle | Gesture::Dragging { .. } => None,
        }
    }

    /// Zero-size shape for the current shape tool, anchored at `anchor`.
    fn provisional_shape(&self, anchor: Point) -> Shape {
        let style = self.style.pen();
        let mut shape = match self.current_tool {
            ToolKind::Line => Shape::Line(Line::new(anchor, anchor)),
            ToolKind::Circle => Shape::Circle(Circle::new(anchor, 0.0)),
            ToolKind::Triangle => Shape::Triangle(Triangle::new(anchor, 0.0, 0.0)),
            _ => Shape::Rectangle(Rectangle::new(anchor, 0.0, 0.0)),
        };
        *shape.style_mut() = style;
        shape
    }
}

/// Geometry spanned by dragging from `anchor` to `pointer` with a shape tool.
fn drag_geometry(tool: ToolKind, anchor: Point, pointer: Point) -> Option<GeometryPatch> {
    match tool {
        ToolKind::Line => Some(GeometryPatch::Endpoints {
            start: anchor,
            end: pointer,
        }),
        ToolKind::Rectangle | ToolKind::Triangle => {
            Some(GeometryPatch::Frame(Rect::from_points(anchor, pointer)))
        }
        ToolKind::Circle => {
            let (center, radius) = Circle::geometry_from_drag(anchor, pointer);
            Some(GeometryPatch::Circle { center, radius })
        }
        ToolKind::Select | ToolKind::Pen | ToolKind::Eraser | ToolKind::Text => None,
    }
}
