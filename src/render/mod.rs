//! Raster drawing used by the grid overlay and the annotator.

pub mod draw;
pub mod text;

pub use text::TextRenderer;
