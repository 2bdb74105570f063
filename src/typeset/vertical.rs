use crate::font::GlyphMeasure;

/// Splits text into top-to-bottom columns, left to right in reading order of
/// production (the renderer places them right to left).
///
/// A character starts a new column when the current one is non-empty and
/// its advance (glyph height plus `char_spacing`) would overflow
/// `box_height`. Newlines force a break.
pub(crate) fn split_columns<M: GlyphMeasure + ?Sized>(
    text: &str,
    measure: &M,
    font_size: f32,
    box_height: f32,
    char_spacing: f32,
) -> Vec<String> {
    let mut columns = Vec::new();
    let mut current = String::new();
    let mut current_height = 0.0;

    for ch in text.chars() {
        if ch == '\n' {
            if !current.is_empty() {
                columns.push(std::mem::take(&mut current));
            }
            current_height = 0.0;
            continue;
        }
        let (_, char_height) = measure.char_box(ch, font_size);
        let advance = char_height + char_spacing;
        if !current.is_empty() && current_height + advance > box_height {
            columns.push(std::mem::take(&mut current));
            current_height = 0.0;
        }
        current.push(ch);
        current_height += advance;
    }

    if !current.is_empty() {
        columns.push(current);
    }
    columns
}

/// Width of `count` columns of `column_width` separated by `spacing`.
pub(crate) fn block_width(count: usize, column_width: f32, spacing: f32) -> f32 {
    if count == 0 {
        return 0.0;
    }
    count as f32 * column_width + (count - 1) as f32 * spacing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::FixedMetrics;

    #[test]
    fn breaks_columns_on_height() {
        let metrics = FixedMetrics::default();
        // advance per character is 10 + 2 = 12; 30px holds two.
        let columns = split_columns("あいうえお", &metrics, 10.0, 30.0, 2.0);
        assert_eq!(columns, vec!["あい", "うえ", "お"]);
    }

    #[test]
    fn oversized_glyph_still_occupies_a_column() {
        let metrics = FixedMetrics::default();
        let columns = split_columns("あい", &metrics, 50.0, 20.0, 10.0);
        assert_eq!(columns, vec!["あ", "い"]);
    }

    #[test]
    fn newline_forces_column_break() {
        let metrics = FixedMetrics::default();
        let columns = split_columns("あ\nい\n\nう", &metrics, 10.0, 500.0, 2.0);
        assert_eq!(columns, vec!["あ", "い", "う"]);
    }

    #[test]
    fn shorter_boxes_never_need_fewer_columns() {
        let metrics = FixedMetrics::default();
        let text = "吾輩は猫である。名前はまだ無い。";
        let mut previous = 0;
        for height in (10..=400).rev().step_by(7) {
            let count = split_columns(text, &metrics, 16.0, height as f32, 3.0).len();
            assert!(count >= previous, "height {} gave {} columns", height, count);
            previous = count;
        }
    }

    #[test]
    fn block_width_counts_gaps_between_columns() {
        assert_eq!(block_width(0, 20.0, 4.0), 0.0);
        assert_eq!(block_width(1, 20.0, 4.0), 20.0);
        assert_eq!(block_width(3, 20.0, 4.0), 68.0);
    }
}
