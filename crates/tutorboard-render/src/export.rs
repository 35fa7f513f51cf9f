//! PNG and PDF export of a whiteboard document.
//!
//! Both formats go through the same raster: the document is drawn at the
//! export scale on the session background, then either encoded as PNG or
//! placed as an image on a single PDF page.

use crate::renderer::{RenderContext, Renderer, RendererError, ShapeRenderer};
use peniko::Color;
use std::io::Write;
use std::path::Path;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tiny_skia::Pixmap;
use tutorboard_core::document::ShapeDocument;
use tutorboard_core::settings::SessionSettings;

/// Default raster multiplier.
pub const DEFAULT_EXPORT_SCALE: f64 = 2.0;

/// Export errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Invalid page size: {width}x{height}pt")]
    InvalidPage { width: f64, height: f64 },
    #[error(transparent)]
    Render(#[from] RendererError),
    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Export worker failed: {0}")]
    Worker(String),
}

/// Page size in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub const A4_LANDSCAPE: Self = Self::new(842.0, 595.0);
    pub const A4_PORTRAIT: Self = Self::new(595.0, 842.0);

    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::A4_LANDSCAPE
    }
}

/// Export tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    /// Raster pixels per canvas unit.
    pub scale: f64,
    /// Page used by [`ExportService::export_document`].
    pub page_size: PageSize,
    /// Blank border around the placed raster, in points.
    pub margin: f64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            scale: DEFAULT_EXPORT_SCALE,
            page_size: PageSize::default(),
            margin: 36.0,
        }
    }
}

/// Renders documents to shareable files.
#[derive(Debug, Clone)]
pub struct ExportService {
    renderer: ShapeRenderer,
    canvas_width: u32,
    canvas_height: u32,
    background: Color,
    options: ExportOptions,
}

impl ExportService {
    /// Export using the canvas size and background of a session.
    pub fn new(settings: &SessionSettings) -> Self {
        Self {
            renderer: ShapeRenderer::new(),
            canvas_width: settings.canvas_width,
            canvas_height: settings.canvas_height,
            background: settings.background.into(),
            options: ExportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Draw the document at export scale.
    pub fn rasterize(&self, doc: &ShapeDocument) -> Result<Pixmap, ExportError> {
        let ctx = RenderContext::new(doc, self.canvas_width, self.canvas_height)
            .with_scale_factor(self.options.scale)
            .with_background(self.background);
        Ok(self.renderer.render(&ctx)?)
    }

    /// Lossless RGBA8 PNG of the document.
    pub fn export_raster(&self, doc: &ShapeDocument) -> Result<Vec<u8>, ExportError> {
        let pixmap = self.rasterize(doc)?;
        encode_png(&pixmap)
    }

    /// Write the PNG export to `path`.
    pub fn save_raster(&self, doc: &ShapeDocument, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let bytes = self.export_raster(doc)?;
        std::fs::write(path.as_ref(), bytes)?;
        log::info!("Exported raster to {}", path.as_ref().display());
        Ok(())
    }

    /// Single-page PDF with the raster fitted inside the page margins.
    pub fn export_document(&self, doc: &ShapeDocument) -> Result<Vec<u8>, ExportError> {
        let page = self.options.page_size;
        if !(page.width.is_finite() && page.height.is_finite())
            || page.width <= 2.0 * self.options.margin
            || page.height <= 2.0 * self.options.margin
        {
            return Err(ExportError::InvalidPage {
                width: page.width,
                height: page.height,
            });
        }

        let pixmap = self.rasterize(doc)?;
        write_pdf(&pixmap, page, self.options.margin)
    }

    /// Export a PDF on a worker thread.
    ///
    /// The document is snapshotted now; later mutations do not show up in
    /// the result.
    pub fn spawn_export_document(&self, doc: &ShapeDocument) -> Result<ExportTask, ExportError> {
        let service = self.clone();
        let snapshot = doc.clone();
        let handle = thread::Builder::new()
            .name("tutorboard-export".to_string())
            .spawn(move || service.export_document(&snapshot))
            .map_err(|e| ExportError::Worker(e.to_string()))?;
        Ok(ExportTask { handle })
    }
}

/// A PDF export running in the background.
pub struct ExportTask {
    handle: JoinHandle<Result<Vec<u8>, ExportError>>,
}

impl ExportTask {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the export completes.
    pub fn wait(self) -> Result<Vec<u8>, ExportError> {
        self.handle
            .join()
            .map_err(|_| ExportError::Worker("export thread panicked".to_string()))?
    }
}

/// Encode a pixmap as an RGBA8 PNG.
fn encode_png(pixmap: &Pixmap) -> Result<Vec<u8>, ExportError> {
    let mut rgba = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let c = px.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }

    let mut buf = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut buf, pixmap.width(), pixmap.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&rgba)?;
    }
    Ok(buf)
}

/// Byte-offset tracking for PDF objects.
struct PdfWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> std::io::Result<Self> {
        let mut buf = Vec::new();
        buf.write_all(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n")?;
        Ok(Self {
            buf,
            offsets: Vec::new(),
        })
    }

    fn object(&mut self, body: &str) -> std::io::Result<()> {
        self.begin()?;
        writeln!(self.buf, "{}", body)?;
        writeln!(self.buf, "endobj")
    }

    fn stream(&mut self, dict: &str, data: &[u8]) -> std::io::Result<()> {
        self.begin()?;
        writeln!(self.buf, "<< {} /Length {} >>", dict, data.len())?;
        writeln!(self.buf, "stream")?;
        self.buf.write_all(data)?;
        writeln!(self.buf, "\nendstream")?;
        writeln!(self.buf, "endobj")
    }

    fn begin(&mut self) -> std::io::Result<()> {
        self.offsets.push(self.buf.len());
        writeln!(self.buf, "{} 0 obj", self.offsets.len())
    }

    fn finish(mut self, root: usize, info: usize) -> std::io::Result<Vec<u8>> {
        let xref = self.buf.len();
        let size = self.offsets.len() + 1;
        writeln!(self.buf, "xref")?;
        writeln!(self.buf, "0 {}", size)?;
        writeln!(self.buf, "0000000000 65535 f ")?;
        for offset in &self.offsets {
            writeln!(self.buf, "{:010} 00000 n ", offset)?;
        }
        writeln!(self.buf, "trailer")?;
        writeln!(
            self.buf,
            "<< /Size {} /Root {} 0 R /Info {} 0 R >>",
            size, root, info
        )?;
        write!(self.buf, "startxref\n{}\n%%EOF\n", xref)?;
        Ok(self.buf)
    }
}

fn write_pdf(pixmap: &Pixmap, page: PageSize, margin: f64) -> Result<Vec<u8>, ExportError> {
    let (px_w, px_h) = (pixmap.width() as f64, pixmap.height() as f64);
    let fit = ((page.width - 2.0 * margin) / px_w).min((page.height - 2.0 * margin) / px_h);
    let (draw_w, draw_h) = (px_w * fit, px_h * fit);
    let x = (page.width - draw_w) / 2.0;
    let y = (page.height - draw_h) / 2.0;

    // DeviceRGB has no alpha: composite onto white
    let mut rgb = Vec::with_capacity(pixmap.pixels().len() * 3);
    for px in pixmap.pixels() {
        let c = px.demultiply();
        let a = c.alpha() as u32;
        for channel in [c.red(), c.green(), c.blue()] {
            rgb.push(((channel as u32 * a + 255 * (255 - a)) / 255) as u8);
        }
    }

    let content = format!(
        "q\n{:.2} 0 0 {:.2} {:.2} {:.2} cm\n/Im0 Do\nQ\n",
        draw_w, draw_h, x, y
    );

    let mut pdf = PdfWriter::new()?;
    pdf.object("<< /Type /Catalog /Pages 2 0 R >>")?;
    pdf.object("<< /Type /Pages /Kids [3 0 R] /Count 1 >>")?;
    pdf.object(&format!(
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
         /Resources << /XObject << /Im0 4 0 R >> >> /Contents 5 0 R >>",
        page.width, page.height
    ))?;
    pdf.stream(
        &format!(
            "/Type /XObject /Subtype /Image /Width {} /Height {} \
             /ColorSpace /DeviceRGB /BitsPerComponent 8",
            pixmap.width(),
            pixmap.height()
        ),
        &rgb,
    )?;
    pdf.stream("", content.as_bytes())?;
    pdf.object("<< /Producer (Tutorboard) >>")?;
    Ok(pdf.finish(1, 6)?)
}
