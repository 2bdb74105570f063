mod place;
mod svg;

use serde::Serialize;

use crate::bubble::{BubbleRecord, BubbleRegion};
use crate::font::GlyphMeasure;
use crate::typeset::{Direction, Layout, TextFitter};

pub use place::{char_spacing, render_horizontal, render_vertical};
pub use svg::{encode_png, rasterize_svg, render_page_svg};

/// Background channel sum above which a bubble is treated as light.
pub const LIGHT_BACKGROUND_THRESHOLD: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const WHITE: Rgb = Rgb([255, 255, 255]);
    pub const BLACK: Rgb = Rgb([0, 0, 0]);

    pub fn to_hex(self) -> String {
        let [r, g, b] = self.0;
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub fill: Rgb,
    pub text: Rgb,
}

/// White fill with black text on light backgrounds, the inverse otherwise.
pub fn palette_for_background(background: [u8; 3]) -> Palette {
    let sum: u32 = background.iter().map(|channel| *channel as u32).sum();
    if sum > LIGHT_BACKGROUND_THRESHOLD {
        Palette {
            fill: Rgb::WHITE,
            text: Rgb::BLACK,
        }
    } else {
        Palette {
            fill: Rgb::BLACK,
            text: Rgb::WHITE,
        }
    }
}

/// Pixel-level draw instruction in image coordinates. `Text` positions are
/// the top-left corner of the line box.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawOp {
    FillRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgb,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        font_size: u32,
        color: Rgb,
    },
}

/// Pixel gap between lines or columns for a bubble's spacing ratio.
pub fn line_spacing_px(font_size: u32, ratio: f32) -> f32 {
    (font_size as f32 * ratio * 0.2).floor()
}

/// Clears the bubble and typesets its display text into it.
pub fn typeset_bubble<M: GlyphMeasure>(
    record: &BubbleRecord,
    region: &BubbleRegion,
    fitter: &TextFitter<M>,
) -> Vec<DrawOp> {
    let meta = record.metadata();
    let palette = palette_for_background(meta.bg_color);
    let mut ops = vec![DrawOp::FillRect {
        x: region.xmin as f32,
        y: region.ymin as f32,
        width: region.width() as f32,
        height: region.height() as f32,
        color: palette.fill,
    }];

    let fit = fitter.fit(
        record.display_text(),
        region.width(),
        region.height(),
        Direction::from_vertical(meta.vertical),
        meta.font_size,
    );
    let spacing = line_spacing_px(fit.font_size, meta.line_spacing);
    let text_ops = match &fit.layout {
        Layout::Vertical { columns } => render_vertical(
            columns,
            fit.font_size,
            fitter.measure(),
            region,
            palette.text,
            spacing,
        ),
        Layout::Horizontal { text } => render_horizontal(
            text,
            fit.font_size,
            fitter.measure(),
            region,
            palette.text,
            meta.alignment,
            spacing,
        ),
    };
    ops.extend(text_ops);
    ops
}
