use super::{DrawOp, Rgb};
use crate::bubble::{Alignment, BubbleRegion};
use crate::font::GlyphMeasure;
use crate::typeset::{REFERENCE_GLYPH, block_width};

/// Spacing between stacked characters when drawing vertical text.
pub fn char_spacing(font_size: u32) -> f32 {
    (font_size as f32 * 0.1).floor()
}

/// Draws columns right to left, characters top to bottom.
///
/// The block of columns is centered horizontally. Each column is centered
/// vertically on its own height, so columns of different lengths do not
/// share a top edge.
pub fn render_vertical<M: GlyphMeasure + ?Sized>(
    columns: &[String],
    font_size: u32,
    measure: &M,
    region: &BubbleRegion,
    color: Rgb,
    column_spacing: f32,
) -> Vec<DrawOp> {
    let size = font_size as f32;
    let (char_width, _) = measure.char_box(REFERENCE_GLYPH, size);
    let spacing = char_spacing(font_size);
    let total_width = block_width(columns.len(), char_width, column_spacing);
    let center_x = region.xmin as f32 + region.width() as f32 / 2.0;
    let center_y = region.ymin as f32 + region.height() as f32 / 2.0;
    let start_x = center_x + total_width / 2.0 - char_width;

    let mut ops = Vec::new();
    for (idx, column) in columns.iter().enumerate() {
        let x = start_x - idx as f32 * (char_width + column_spacing);
        let heights: Vec<f32> = column
            .chars()
            .map(|ch| measure.char_box(ch, size).1)
            .collect();
        let column_height = heights.iter().map(|h| h + spacing).sum::<f32>() - spacing;
        let mut y = center_y - column_height / 2.0;
        for (ch, height) in column.chars().zip(heights) {
            ops.push(DrawOp::Text {
                text: ch.to_string(),
                x,
                y,
                font_size,
                color,
            });
            y += height + spacing;
        }
    }
    ops
}

/// Draws a wrapped block centered in the region; `alignment` positions each
/// line inside the block.
pub fn render_horizontal<M: GlyphMeasure + ?Sized>(
    wrapped: &str,
    font_size: u32,
    measure: &M,
    region: &BubbleRegion,
    color: Rgb,
    alignment: Alignment,
    line_spacing: f32,
) -> Vec<DrawOp> {
    if wrapped.is_empty() {
        return Vec::new();
    }
    let size = font_size as f32;
    let (block_w, block_h) = measure.block_box(wrapped, size, line_spacing);
    let x0 = region.xmin as f32 + region.width() as f32 / 2.0 - block_w / 2.0;
    let y0 = region.ymin as f32 + region.height() as f32 / 2.0 - block_h / 2.0;
    let advance = measure.line_height(size) + line_spacing;

    let mut ops = Vec::new();
    for (idx, line) in wrapped.split('\n').enumerate() {
        if line.is_empty() {
            continue;
        }
        let line_w = measure.line_width(line, size);
        let x = match alignment {
            Alignment::Left => x0,
            Alignment::Center => x0 + (block_w - line_w) / 2.0,
            Alignment::Right => x0 + block_w - line_w,
        };
        ops.push(DrawOp::Text {
            text: line.to_string(),
            x,
            y: y0 + idx as f32 * advance,
            font_size,
            color,
        });
    }
    ops
}
