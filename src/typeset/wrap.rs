/// Greedy word wrap to `width` characters per line.
///
/// Runs of whitespace (newlines included) separate words and collapse to a
/// single space. A word longer than the width is broken, filling whatever is
/// left of the current line first. Unspaced CJK text is one long word, so it
/// wraps every `width` characters.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut rest = word;
        loop {
            let rest_len = rest.chars().count();
            let sep = usize::from(current_len > 0);
            if current_len + sep + rest_len <= width {
                if sep == 1 {
                    current.push(' ');
                }
                current.push_str(rest);
                current_len += sep + rest_len;
                break;
            }
            if rest_len > width {
                let space_left = width.saturating_sub(current_len + sep);
                if space_left > 0 {
                    let split = char_boundary(rest, space_left);
                    if sep == 1 {
                        current.push(' ');
                    }
                    current.push_str(&rest[..split]);
                    rest = &rest[split..];
                }
            }
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn char_boundary(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::wrap_text;

    #[test]
    fn packs_words_greedily() {
        assert_eq!(
            wrap_text("the quick brown fox jumps", 10),
            vec!["the quick", "brown fox", "jumps"]
        );
    }

    #[test]
    fn breaks_unspaced_cjk_runs() {
        assert_eq!(wrap_text("こんにちは世界", 3), vec!["こんに", "ちは世", "界"]);
    }

    #[test]
    fn long_word_fills_rest_of_line_first() {
        assert_eq!(wrap_text("ab cdefghij", 5), vec!["ab cd", "efghi", "j"]);
    }

    #[test]
    fn whitespace_collapses_and_empty_text_has_no_lines() {
        assert_eq!(wrap_text("a  \n b", 10), vec!["a b"]);
        assert!(wrap_text("", 4).is_empty());
        assert!(wrap_text("   ", 4).is_empty());
    }

    #[test]
    fn zero_width_behaves_like_one() {
        assert_eq!(wrap_text("abc", 0), vec!["a", "b", "c"]);
    }
}
