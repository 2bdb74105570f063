//! Font-size search and line/column breaking for bubble text.

mod fit;
mod vertical;
mod wrap;

use serde::Serialize;

pub use fit::{
    FIT_LINE_SPACING, FONT_SIZE_STEP, FitBounds, MAX_FONT_SIZE, MIN_FONT_SIZE, REFERENCE_GLYPH,
    TextFitter, column_spacing,
};
pub use wrap::wrap_text;
pub(crate) use vertical::block_width;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Horizontal,
    Vertical,
}

impl Direction {
    pub fn from_vertical(vertical: bool) -> Self {
        if vertical {
            Direction::Vertical
        } else {
            Direction::Horizontal
        }
    }
}

/// Text broken for one bubble: wrapped lines, or columns in production
/// order (rendered right to left).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "direction", rename_all = "snake_case")]
pub enum Layout {
    Horizontal { text: String },
    Vertical { columns: Vec<String> },
}

impl Layout {
    pub fn direction(&self) -> Direction {
        match self {
            Layout::Horizontal { .. } => Direction::Horizontal,
            Layout::Vertical { .. } => Direction::Vertical,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Layout::Horizontal { text } => text.is_empty(),
            Layout::Vertical { columns } => columns.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FitResult {
    pub layout: Layout,
    pub font_size: u32,
}
