//! Renderer trait and the tiny-skia rasteriser.

use kurbo::{BezPath, PathEl};
use peniko::Color;
use thiserror::Error;
use tiny_skia::{
    ColorU8, FillRule, FilterQuality, LineCap, LineJoin, Paint, PathBuilder, Pixmap, PixmapPaint,
    Stroke, Transform,
};
use tutorboard_core::document::ShapeDocument;
use tutorboard_core::shapes::{Image, SerializableColor, Shape, ShapeStyle, ShapeTrait, Text};

/// Largest surface edge we are willing to allocate, in pixels.
pub const MAX_SURFACE_SIZE: u32 = 16_384;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Invalid surface size: {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("Invalid scale factor: {0}")]
    InvalidScale(f64),
    #[error("Image {id} could not be decoded: {reason}")]
    ImageDecode { id: String, reason: String },
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// Everything needed to draw one frame of a document.
pub struct RenderContext<'a> {
    /// The document to render.
    pub document: &'a ShapeDocument,
    /// Logical canvas width.
    pub width: u32,
    /// Logical canvas height.
    pub height: u32,
    /// Surface pixels per logical unit.
    pub scale_factor: f64,
    /// Background color.
    pub background_color: Color,
}

impl<'a> RenderContext<'a> {
    pub fn new(document: &'a ShapeDocument, width: u32, height: u32) -> Self {
        Self {
            document,
            width,
            height,
            scale_factor: 1.0,
            background_color: Color::WHITE,
        }
    }

    /// Set the scale factor.
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    /// Set the background color.
    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    /// Physical surface size after scaling.
    pub fn surface_size(&self) -> RenderResult<(u32, u32)> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 0.0 {
            return Err(RendererError::InvalidScale(self.scale_factor));
        }
        let width = (self.width as f64 * self.scale_factor).round();
        let height = (self.height as f64 * self.scale_factor).round();
        let invalid = RendererError::InvalidSize {
            width: width.min(u32::MAX as f64) as u32,
            height: height.min(u32::MAX as f64) as u32,
        };
        if width < 1.0 || height < 1.0 {
            return Err(invalid);
        }
        if width > MAX_SURFACE_SIZE as f64 || height > MAX_SURFACE_SIZE as f64 {
            return Err(invalid);
        }
        Ok((width as u32, height as u32))
    }
}

/// Trait for rendering backends.
pub trait Renderer: Send + Sync {
    /// Draw the whole document onto a fresh surface.
    fn render(&self, ctx: &RenderContext) -> RenderResult<Pixmap>;

    /// Get the background color (for clearing).
    fn background_color(&self, ctx: &RenderContext) -> Color {
        ctx.background_color
    }
}

/// Stateless adapter drawing shapes onto a tiny-skia pixmap.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShapeRenderer;

impl ShapeRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render a single shape with the given surface transform.
    pub fn render_shape(
        &self,
        pixmap: &mut Pixmap,
        shape: &Shape,
        transform: Transform,
    ) -> RenderResult<()> {
        match shape {
            Shape::Text(text) => {
                self.render_text(pixmap, text, transform);
                Ok(())
            }
            Shape::Image(image) => {
                self.render_image(pixmap, image, transform)?;
                // Optional border
                self.render_path(pixmap, &shape.to_path(), shape.style(), false, transform);
                Ok(())
            }
            Shape::Path(_) | Shape::Line(_) => {
                self.render_path(pixmap, &shape.to_path(), shape.style(), false, transform);
                Ok(())
            }
            _ => {
                self.render_path(pixmap, &shape.to_path(), shape.style(), true, transform);
                Ok(())
            }
        }
    }

    fn render_path(
        &self,
        pixmap: &mut Pixmap,
        path: &BezPath,
        style: &ShapeStyle,
        closed: bool,
        transform: Transform,
    ) {
        let Some(path) = to_skia_path(path) else {
            return;
        };

        if closed {
            if let Some(fill) = style.fill_color.filter(|c| c.a > 0) {
                pixmap.fill_path(&path, &paint(fill), FillRule::Winding, transform, None);
            }
        }

        if style.stroke_width > 0.0 && style.stroke_color.a > 0 {
            let stroke = Stroke {
                width: style.stroke_width as f32,
                line_cap: LineCap::Round,
                line_join: LineJoin::Round,
                ..Stroke::default()
            };
            pixmap.stroke_path(&path, &paint(style.stroke_color), &stroke, transform, None);
        }
    }

    /// Text has no glyph shaping here: each line is drawn as a bar covering
    /// its estimated extent.
    fn render_text(&self, pixmap: &mut Pixmap, text: &Text, transform: Transform) {
        let line_height = text.font_size * 1.2;
        let advance = text.font_size * 0.6;
        let paint = paint(text.style.stroke_color);

        for (i, line) in text.content.lines().enumerate() {
            let chars = line.chars().count();
            if chars == 0 {
                continue;
            }
            let x = text.position.x;
            let y = text.position.y + i as f64 * line_height + text.font_size * 0.25;
            let rect = tiny_skia::Rect::from_xywh(
                x as f32,
                y as f32,
                (chars as f64 * advance) as f32,
                (text.font_size * 0.7) as f32,
            );
            if let Some(rect) = rect {
                pixmap.fill_rect(rect, &paint, transform, None);
            }
        }
    }

    fn render_image(
        &self,
        pixmap: &mut Pixmap,
        image: &Image,
        transform: Transform,
    ) -> RenderResult<()> {
        let id = image.id().to_string();
        let raw = image.data().ok_or_else(|| RendererError::ImageDecode {
            id: id.clone(),
            reason: "payload is not valid base64".to_string(),
        })?;
        let decoded = ::image::load_from_memory(&raw)
            .map_err(|e| RendererError::ImageDecode {
                id: id.clone(),
                reason: e.to_string(),
            })?
            .to_rgba8();

        let (width, height) = decoded.dimensions();
        let mut source = Pixmap::new(width, height).ok_or(RendererError::ImageDecode {
            id,
            reason: format!("empty image ({}x{})", width, height),
        })?;
        for (dst, px) in source.pixels_mut().iter_mut().zip(decoded.pixels()) {
            let [r, g, b, a] = px.0;
            *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
        }

        if image.width <= 0.0 || image.height <= 0.0 {
            return Ok(());
        }
        let image_transform = transform
            .pre_translate(image.position.x as f32, image.position.y as f32)
            .pre_scale(
                (image.width / width as f64) as f32,
                (image.height / height as f64) as f32,
            );
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, image_transform, None);
        Ok(())
    }
}

impl Renderer for ShapeRenderer {
    fn render(&self, ctx: &RenderContext) -> RenderResult<Pixmap> {
        let (width, height) = ctx.surface_size()?;
        let mut pixmap =
            Pixmap::new(width, height).ok_or(RendererError::InvalidSize { width, height })?;
        pixmap.fill(to_skia_color(self.background_color(ctx)));

        let scale = ctx.scale_factor as f32;
        let transform = Transform::from_scale(scale, scale);
        for shape in ctx.document.list() {
            self.render_shape(&mut pixmap, shape, transform)?;
        }

        log::debug!(
            "Rendered {} shapes onto {}x{} surface",
            ctx.document.len(),
            width,
            height
        );
        Ok(pixmap)
    }
}

fn paint(color: SerializableColor) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

fn to_skia_color(color: Color) -> tiny_skia::Color {
    let rgba = color.to_rgba8();
    tiny_skia::Color::from_rgba8(rgba.r, rgba.g, rgba.b, rgba.a)
}

/// Convert a kurbo path; `None` when nothing drawable remains.
fn to_skia_path(path: &BezPath) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => pb.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(p1, p2) => {
                pb.quad_to(p1.x as f32, p1.y as f32, p2.x as f32, p2.y as f32)
            }
            PathEl::CurveTo(p1, p2, p3) => pb.cubic_to(
                p1.x as f32,
                p1.y as f32,
                p2.x as f32,
                p2.y as f32,
                p3.x as f32,
                p3.y as f32,
            ),
            PathEl::ClosePath => pb.close(),
        }
    }
    pb.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;
    use tutorboard_core::shapes::{Circle, ImageFormat, Rectangle};

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let c = pixmap.pixel(x, y).unwrap().demultiply();
        (c.red(), c.green(), c.blue(), c.alpha())
    }

    fn tiny_png(r: u8, g: u8, b: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buf, 2, 2);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[r, g, b, 255].repeat(4)).unwrap();
        }
        buf
    }

    #[test]
    fn test_empty_document_is_background() {
        let doc = ShapeDocument::new();
        let ctx = RenderContext::new(&doc, 40, 30)
            .with_background(Color::from_rgba8(10, 20, 30, 255));
        let pixmap = ShapeRenderer::new().render(&ctx).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (40, 30));
        assert_eq!(pixel(&pixmap, 20, 15), (10, 20, 30, 255));
    }

    #[test]
    fn test_scale_factor_scales_surface_and_shapes() {
        let mut doc = ShapeDocument::new();
        let mut rect = Rectangle::new(Point::new(10.0, 10.0), 10.0, 10.0);
        rect.style.fill_color = Some(SerializableColor::new(255, 0, 0, 255));
        doc.insert(Shape::Rectangle(rect)).unwrap();

        let ctx = RenderContext::new(&doc, 50, 40).with_scale_factor(2.0);
        let pixmap = ShapeRenderer::new().render(&ctx).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (100, 80));
        assert_eq!(pixel(&pixmap, 30, 30), (255, 0, 0, 255));
        assert_eq!(pixel(&pixmap, 50, 50), (255, 255, 255, 255));
    }

    #[test]
    fn test_invalid_surface_rejected() {
        let doc = ShapeDocument::new();
        let renderer = ShapeRenderer::new();
        assert!(matches!(
            renderer.render(&RenderContext::new(&doc, 0, 10)),
            Err(RendererError::InvalidSize { .. })
        ));
        assert!(matches!(
            renderer.render(&RenderContext::new(&doc, 10, 10).with_scale_factor(f64::NAN)),
            Err(RendererError::InvalidScale(_))
        ));
        assert!(matches!(
            renderer.render(&RenderContext::new(&doc, MAX_SURFACE_SIZE + 1, 10)),
            Err(RendererError::InvalidSize { .. })
        ));
    }

    #[test]
    fn test_unfilled_circle_keeps_interior() {
        let mut doc = ShapeDocument::new();
        doc.insert(Shape::Circle(Circle::new(Point::new(50.0, 50.0), 30.0)))
            .unwrap();
        let pixmap = ShapeRenderer::new()
            .render(&RenderContext::new(&doc, 100, 100))
            .unwrap();
        assert_eq!(pixel(&pixmap, 50, 50), (255, 255, 255, 255));
        // Just inside the rightmost point of the outline
        let (r, _, _, a) = pixel(&pixmap, 79, 50);
        assert!(r < 64 && a == 255);
    }

    #[test]
    fn test_text_draws_estimated_extent() {
        let mut doc = ShapeDocument::new();
        let mut text = Text::new(Point::new(10.0, 10.0), "abc".to_string());
        text.font_size = 20.0;
        doc.insert(Shape::Text(text)).unwrap();
        let pixmap = ShapeRenderer::new()
            .render(&RenderContext::new(&doc, 100, 60))
            .unwrap();
        // Bar spans x 10..46, y 15..29
        assert_eq!(pixel(&pixmap, 20, 22), (0, 0, 0, 255));
        assert_eq!(pixel(&pixmap, 80, 22), (255, 255, 255, 255));
    }

    #[test]
    fn test_image_scaled_into_frame() {
        let mut doc = ShapeDocument::new();
        let image = Image::new(Point::new(10.0, 10.0), &tiny_png(0, 0, 255), 2, 2, ImageFormat::Png)
            .with_size(20.0, 20.0);
        doc.insert(Shape::Image(image)).unwrap();
        let pixmap = ShapeRenderer::new()
            .render(&RenderContext::new(&doc, 50, 50))
            .unwrap();
        assert_eq!(pixel(&pixmap, 20, 20), (0, 0, 255, 255));
        assert_eq!(pixel(&pixmap, 40, 40), (255, 255, 255, 255));
    }

    #[test]
    fn test_corrupt_image_is_an_error() {
        let mut doc = ShapeDocument::new();
        let image = Image::new(Point::ORIGIN, b"not an image", 4, 4, ImageFormat::Png);
        doc.insert(Shape::Image(image)).unwrap();
        let result = ShapeRenderer::new().render(&RenderContext::new(&doc, 20, 20));
        assert!(matches!(result, Err(RendererError::ImageDecode { .. })));
    }
}
