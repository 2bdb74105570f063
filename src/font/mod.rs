mod metrics;

use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};
use usvg::fontdb;

pub use metrics::{EstimatedMetrics, FontMetrics, load_font_metrics};
pub(crate) use metrics::is_cjk;

/// Families tried, in order, when no font is configured.
pub const FALLBACK_FAMILIES: &[&str] = &[
    "Hiragino Kaku Gothic ProN",
    "Hiragino Sans",
    "PingFang SC",
    "Noto Sans CJK JP",
    "Noto Sans JP",
    "Source Han Sans JP",
    "Arial Unicode MS",
    "sans-serif",
];

/// Measurement oracle used by the fitter and the renderer.
///
/// Boxes are ink extents in pixels at the given font size. Implementations
/// must be pure: the same inputs always produce the same numbers.
pub trait GlyphMeasure {
    /// Width and height of the ink box of a single character.
    fn char_box(&self, ch: char, font_size: f32) -> (f32, f32);

    /// Horizontal advance of a single line.
    fn line_width(&self, line: &str, font_size: f32) -> f32;

    fn line_height(&self, font_size: f32) -> f32;

    /// Distance from the top of a line box to its baseline.
    fn ascent(&self, font_size: f32) -> f32;

    /// Bounding box of a `\n` separated block with `spacing` pixels between lines.
    fn block_box(&self, text: &str, font_size: f32, spacing: f32) -> (f32, f32) {
        if text.is_empty() {
            return (0.0, 0.0);
        }
        let mut width: f32 = 0.0;
        let mut count = 0usize;
        for line in text.split('\n') {
            width = width.max(self.line_width(line, font_size));
            count += 1;
        }
        let height =
            count as f32 * self.line_height(font_size) + (count - 1) as f32 * spacing;
        (width, height)
    }
}

impl<T: GlyphMeasure + ?Sized> GlyphMeasure for &T {
    fn char_box(&self, ch: char, font_size: f32) -> (f32, f32) {
        (**self).char_box(ch, font_size)
    }

    fn line_width(&self, line: &str, font_size: f32) -> f32 {
        (**self).line_width(line, font_size)
    }

    fn line_height(&self, font_size: f32) -> f32 {
        (**self).line_height(font_size)
    }

    fn ascent(&self, font_size: f32) -> f32 {
        (**self).ascent(font_size)
    }

    fn block_box(&self, text: &str, font_size: f32, spacing: f32) -> (f32, f32) {
        (**self).block_box(text, font_size, spacing)
    }
}

impl<T: GlyphMeasure + ?Sized> GlyphMeasure for Arc<T> {
    fn char_box(&self, ch: char, font_size: f32) -> (f32, f32) {
        (**self).char_box(ch, font_size)
    }

    fn line_width(&self, line: &str, font_size: f32) -> f32 {
        (**self).line_width(line, font_size)
    }

    fn line_height(&self, font_size: f32) -> f32 {
        (**self).line_height(font_size)
    }

    fn ascent(&self, font_size: f32) -> f32 {
        (**self).ascent(font_size)
    }

    fn block_box(&self, text: &str, font_size: f32, spacing: f32) -> (f32, f32) {
        (**self).block_box(text, font_size, spacing)
    }
}

/// The font used for both measuring and rasterizing a page.
#[derive(Clone)]
pub struct Typeface {
    measure: Arc<dyn GlyphMeasure + Send + Sync>,
    family: Option<String>,
    data: Option<Arc<Vec<u8>>>,
}

impl std::fmt::Debug for Typeface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Typeface")
            .field("family", &self.family)
            .field("embedded", &self.data.is_some())
            .finish()
    }
}

impl Typeface {
    pub fn from_metrics(metrics: FontMetrics) -> Self {
        let family = metrics.family().map(|name| name.to_string());
        let data = Some(Arc::new(metrics.data().to_vec()));
        Self {
            measure: Arc::new(metrics),
            family,
            data,
        }
    }

    pub fn estimated() -> Self {
        Self::with_measure(EstimatedMetrics)
    }

    /// A typeface backed by an arbitrary oracle and no font data; rasterized
    /// text then uses the system's default family.
    pub fn with_measure(measure: impl GlyphMeasure + Send + Sync + 'static) -> Self {
        Self {
            measure: Arc::new(measure),
            family: None,
            data: None,
        }
    }

    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_ref().map(|data| data.as_slice())
    }
}

impl GlyphMeasure for Typeface {
    fn char_box(&self, ch: char, font_size: f32) -> (f32, f32) {
        self.measure.char_box(ch, font_size)
    }

    fn line_width(&self, line: &str, font_size: f32) -> f32 {
        self.measure.line_width(line, font_size)
    }

    fn line_height(&self, font_size: f32) -> f32 {
        self.measure.line_height(font_size)
    }

    fn ascent(&self, font_size: f32) -> f32 {
        self.measure.ascent(font_size)
    }

    fn block_box(&self, text: &str, font_size: f32, spacing: f32) -> (f32, f32) {
        self.measure.block_box(text, font_size, spacing)
    }
}

/// System fonts, scanned once per process.
pub(crate) fn system_fonts() -> &'static fontdb::Database {
    static SYSTEM_FONTS: OnceLock<fontdb::Database> = OnceLock::new();
    SYSTEM_FONTS.get_or_init(|| {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        debug!("loaded {} system font faces", db.len());
        db
    })
}

/// Resolves the page typeface. Never fails: an unusable font falls through
/// to the next candidate and finally to estimated metrics.
pub fn resolve_typeface(font_path: Option<&Path>, font_family: Option<&str>) -> Typeface {
    if let Some(path) = font_path {
        match load_font_metrics(path) {
            Ok(metrics) => return Typeface::from_metrics(metrics),
            Err(err) => warn!("{:#}; trying system fonts", err),
        }
    }

    let db = system_fonts();
    let requested = font_family.into_iter();
    for family in requested.chain(FALLBACK_FAMILIES.iter().copied()) {
        match load_font_metrics_from_family(db, family) {
            Some(metrics) => {
                debug!("using font family '{}'", family);
                return Typeface::from_metrics(metrics);
            }
            None => debug!("font family '{}' unavailable", family),
        }
    }

    warn!("no usable font found; using estimated glyph metrics");
    Typeface::estimated()
}

fn load_font_metrics_from_family(db: &fontdb::Database, family: &str) -> Option<FontMetrics> {
    let is_sans = family.eq_ignore_ascii_case("sans-serif");
    let families = if is_sans {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db.query(&query)?;
    let data = db.with_face_data(id, |data, _index| data.to_vec())?;
    let preferred = if is_sans { None } else { Some(family) };
    metrics::load_font_metrics_from_data(&data, preferred)
        .or_else(|_| metrics::load_font_metrics_from_data(&data, None))
        .ok()
}
