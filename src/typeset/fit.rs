use anyhow::{Result, anyhow};
use tracing::debug;

use super::vertical::{block_width, split_columns};
use super::wrap::wrap_text;
use super::{Direction, FitResult, Layout};
use crate::font::GlyphMeasure;

pub const MIN_FONT_SIZE: u32 = 10;
pub const MAX_FONT_SIZE: u32 = 100;
pub const FONT_SIZE_STEP: u32 = 2;

/// Glyph whose width stands for every column in vertical layout.
pub const REFERENCE_GLYPH: char = 'あ';

/// Line spacing used while measuring horizontal candidates.
pub const FIT_LINE_SPACING: f32 = 4.0;

const HORIZONTAL_FILL_RATIO: f32 = 0.95;
const HINT_HEADROOM: f32 = 1.5;

/// Spacing between stacked characters while fitting, and between columns.
pub fn column_spacing(font_size: u32) -> f32 {
    (font_size as f32 * 0.2).floor()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitBounds {
    pub min: u32,
    pub max: u32,
    pub step: u32,
}

impl Default for FitBounds {
    fn default() -> Self {
        Self {
            min: MIN_FONT_SIZE,
            max: MAX_FONT_SIZE,
            step: FONT_SIZE_STEP,
        }
    }
}

impl FitBounds {
    pub fn new(min: u32, max: u32, step: u32) -> Result<Self> {
        if min == 0 {
            return Err(anyhow!("minimum font size must be positive"));
        }
        if max < min {
            return Err(anyhow!(
                "maximum font size {} is below the minimum {}",
                max,
                min
            ));
        }
        if step == 0 {
            return Err(anyhow!("font size step must be positive"));
        }
        Ok(Self { min, max, step })
    }
}

/// Finds the largest font size at which text fits a box.
#[derive(Debug, Clone)]
pub struct TextFitter<M> {
    measure: M,
    bounds: FitBounds,
}

impl<M: GlyphMeasure> TextFitter<M> {
    pub fn new(measure: M) -> Self {
        Self {
            measure,
            bounds: FitBounds::default(),
        }
    }

    pub fn with_bounds(mut self, bounds: FitBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn bounds(&self) -> FitBounds {
        self.bounds
    }

    pub fn measure(&self) -> &M {
        &self.measure
    }

    /// First candidate size. A usable hint starts the search just above the
    /// estimate instead of at the maximum, snapped down onto the step grid so
    /// hinted candidates are always a subset of the full search.
    pub fn start_size(&self, estimated_font_size: Option<f32>) -> u32 {
        let FitBounds { min, max, step } = self.bounds;
        let Some(hint) = estimated_font_size.filter(|h| h.is_finite() && *h > min as f32) else {
            return max;
        };
        let wanted = ((hint * HINT_HEADROOM).floor() as u32).min(max);
        let offset = (max - wanted).div_ceil(step) * step;
        max.saturating_sub(offset).max(min)
    }

    /// Candidate sizes in search order.
    pub fn candidates(&self, estimated_font_size: Option<f32>) -> impl Iterator<Item = u32> {
        let start = self.start_size(estimated_font_size);
        (self.bounds.min..=start)
            .rev()
            .step_by(self.bounds.step as usize)
    }

    /// Largest size in bounds at which `text` fits the box.
    ///
    /// The hint only changes which sizes are tried first: when the hinted
    /// start already fits, the larger sizes it skipped are tried too, so the
    /// chosen size is the same with or without a hint.
    pub fn fit(
        &self,
        text: &str,
        box_width: u32,
        box_height: u32,
        direction: Direction,
        estimated_font_size: Option<f32>,
    ) -> FitResult {
        let start = self.start_size(estimated_font_size);
        let at_start = self.layout_at(text, box_width, box_height, direction, start);
        if at_start.is_empty() {
            return FitResult {
                layout: at_start,
                font_size: start,
            };
        }

        let found = if self.fits(&at_start, box_width, box_height, start) {
            let above = self.candidates(None).take_while(|&size| size > start);
            self.first_fit(above, text, box_width, box_height, direction)
                .or(Some(FitResult {
                    layout: at_start,
                    font_size: start,
                }))
        } else {
            let below = self.candidates(estimated_font_size).skip(1);
            self.first_fit(below, text, box_width, box_height, direction)
        };

        found.unwrap_or_else(|| {
            let font_size = self.bounds.min;
            debug!(
                "text does not fit {}x{} at any size; overflowing at {}px",
                box_width, box_height, font_size
            );
            FitResult {
                layout: self.layout_at(text, box_width, box_height, direction, font_size),
                font_size,
            }
        })
    }

    fn first_fit(
        &self,
        mut sizes: impl Iterator<Item = u32>,
        text: &str,
        box_width: u32,
        box_height: u32,
        direction: Direction,
    ) -> Option<FitResult> {
        sizes.find_map(|font_size| {
            let layout = self.layout_at(text, box_width, box_height, direction, font_size);
            self.fits(&layout, box_width, box_height, font_size)
                .then_some(FitResult { layout, font_size })
        })
    }

    /// Breaks text into lines or columns for one candidate size.
    pub fn layout_at(
        &self,
        text: &str,
        box_width: u32,
        box_height: u32,
        direction: Direction,
        font_size: u32,
    ) -> Layout {
        match direction {
            Direction::Vertical => Layout::Vertical {
                columns: split_columns(
                    text,
                    &self.measure,
                    font_size as f32,
                    box_height as f32,
                    column_spacing(font_size),
                ),
            },
            Direction::Horizontal => {
                let chars_per_line = (HORIZONTAL_FILL_RATIO * box_width as f32
                    / font_size as f32)
                    .floor()
                    .max(1.0) as usize;
                Layout::Horizontal {
                    text: wrap_text(text, chars_per_line).join("\n"),
                }
            }
        }
    }

    fn fits(&self, layout: &Layout, box_width: u32, box_height: u32, font_size: u32) -> bool {
        let size = font_size as f32;
        match layout {
            Layout::Vertical { columns } => {
                let (column_width, _) = self.measure.char_box(REFERENCE_GLYPH, size);
                block_width(columns.len(), column_width, column_spacing(font_size))
                    <= box_width as f32
            }
            Layout::Horizontal { text } => {
                let (width, height) = self.measure.block_box(text, size, FIT_LINE_SPACING);
                width <= box_width as f32 && height <= box_height as f32
            }
        }
    }
}
