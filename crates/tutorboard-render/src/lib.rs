//! Tutorboard Render Library
//!
//! CPU rasterisation of whiteboard documents with tiny-skia, plus PNG and
//! single-page PDF export.

pub mod export;
mod renderer;

pub use export::{ExportError, ExportOptions, ExportService, ExportTask, PageSize};
pub use renderer::{
    MAX_SURFACE_SIZE, RenderContext, RenderResult, Renderer, RendererError, ShapeRenderer,
};
