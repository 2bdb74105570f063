use insta::assert_json_snapshot;
use manga_typesetter::{Direction, FitResult, GlyphMeasure, TextFitter};
use serde::Serialize;

/// Every glyph is a `font_size` square; whitespace has no ink.
struct SquareGlyphs;

impl GlyphMeasure for SquareGlyphs {
    fn char_box(&self, ch: char, font_size: f32) -> (f32, f32) {
        if ch.is_whitespace() {
            (font_size, 0.0)
        } else {
            (font_size, font_size)
        }
    }

    fn line_width(&self, line: &str, font_size: f32) -> f32 {
        line.chars().count() as f32 * font_size
    }

    fn line_height(&self, font_size: f32) -> f32 {
        font_size
    }

    fn ascent(&self, font_size: f32) -> f32 {
        font_size * 0.8
    }
}

#[derive(Serialize)]
struct Case {
    name: &'static str,
    fit: FitResult,
}

#[test]
fn fits_bubble_text() {
    let fitter = TextFitter::new(SquareGlyphs);
    let cases = vec![
        Case {
            name: "vertical_two_columns",
            fit: fitter.fit("ありがとう", 100, 120, Direction::Vertical, None),
        },
        Case {
            name: "vertical_with_low_hint",
            fit: fitter.fit("ありがとう", 100, 120, Direction::Vertical, Some(12.0)),
        },
        Case {
            name: "horizontal_word_wrap",
            fit: fitter.fit("the quick brown fox", 120, 80, Direction::Horizontal, None),
        },
    ];
    assert_json_snapshot!(cases);
}
