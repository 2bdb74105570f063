use crate::font::GlyphMeasure;

/// Square glyphs of exactly `font_size` pixels; whitespace has no height.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FixedMetrics;

impl GlyphMeasure for FixedMetrics {
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

pub(crate) fn with_temp_home<F, R>(func: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    static HOME_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
    let _guard = HOME_MUTEX.lock().unwrap_or_else(|err| err.into_inner());
    let dir = tempfile::tempdir().expect("tempdir");
    let old_home = std::env::var("HOME").ok();
    // SAFETY: callers serialize on HOME_MUTEX.
    unsafe { std::env::set_var("HOME", dir.path()) };
    let result = func(dir.path());
    unsafe {
        match old_home {
            Some(old) => std::env::set_var("HOME", old),
            None => std::env::remove_var("HOME"),
        }
    }
    result
}
