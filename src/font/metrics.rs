use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use ttf_parser::{Face, name_id};

use super::GlyphMeasure;

/// Measurements taken from a parsed TrueType/OpenType face.
#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    face_index: u32,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    space_advance: u16,
    family: Option<String>,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("face_index", &self.face_index)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn scale(&self, font_size: f32) -> f32 {
        font_size / self.units_per_em.max(1) as f32
    }

    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, self.face_index).ok()
    }
}

impl GlyphMeasure for FontMetrics {
    fn char_box(&self, ch: char, font_size: f32) -> (f32, f32) {
        let Some(face) = self.face() else {
            return estimate_char_box(ch, font_size);
        };
        let Some(glyph) = face.glyph_index(ch) else {
            return estimate_char_box(ch, font_size);
        };
        let scale = self.scale(font_size);
        match face.glyph_bounding_box(glyph) {
            Some(rect) => {
                let width = rect.x_max as i32 - rect.x_min as i32;
                let height = rect.y_max as i32 - rect.y_min as i32;
                (width as f32 * scale, height as f32 * scale)
            }
            None => {
                let advance = face
                    .glyph_hor_advance(glyph)
                    .unwrap_or(self.space_advance);
                (advance as f32 * scale, 0.0)
            }
        }
    }

    fn line_width(&self, line: &str, font_size: f32) -> f32 {
        let Some(face) = self.face() else {
            return estimate_text_units(line) * font_size;
        };
        let mut advance = 0u32;
        for ch in line.chars() {
            if ch == '\n' {
                continue;
            }
            if ch == ' ' {
                advance = advance.saturating_add(self.space_advance as u32);
                continue;
            }
            let glyph_advance = face
                .glyph_index(ch)
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .unwrap_or(self.units_per_em);
            advance = advance.saturating_add(glyph_advance as u32);
        }
        advance as f32 * self.scale(font_size)
    }

    fn line_height(&self, font_size: f32) -> f32 {
        (self.ascender as i32 - self.descender as i32) as f32 * self.scale(font_size)
    }

    fn ascent(&self, font_size: f32) -> f32 {
        self.ascender as f32 * self.scale(font_size)
    }
}

/// Character-class estimates used when no font file is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatedMetrics;

impl GlyphMeasure for EstimatedMetrics {
    fn char_box(&self, ch: char, font_size: f32) -> (f32, f32) {
        estimate_char_box(ch, font_size)
    }

    fn line_width(&self, line: &str, font_size: f32) -> f32 {
        estimate_text_units(line) * font_size
    }

    fn line_height(&self, font_size: f32) -> f32 {
        font_size * 1.1
    }

    fn ascent(&self, font_size: f32) -> f32 {
        font_size * 0.88
    }
}

fn estimate_char_box(ch: char, font_size: f32) -> (f32, f32) {
    let width = estimate_char_units(ch) * font_size;
    if ch.is_whitespace() {
        (width, 0.0)
    } else {
        (width, font_size)
    }
}

fn estimate_char_units(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if is_cjk(ch) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_units(text: &str) -> f32 {
    text.chars()
        .filter(|ch| *ch != '\n')
        .map(estimate_char_units)
        .sum()
}

pub(crate) fn is_cjk(ch: char) -> bool {
    matches!(
        ch as u32,
        0x3000..=0x303F | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0x4E00..=0x9FFF | 0xFF00..=0xFFEF
    )
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

pub(super) fn load_font_metrics_from_data(
    data: &[u8],
    preferred_family: Option<&str>,
) -> Result<FontMetrics> {
    let data = Arc::new(data.to_vec());
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
    for index in 0..count {
        let Ok(face) = Face::parse(&data, index) else {
            continue;
        };
        let family = extract_family_name(&face);
        let units_per_em = face.units_per_em().max(1);
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 4);
        let metrics = FontMetrics {
            data: Arc::clone(&data),
            face_index: index,
            units_per_em,
            ascender: face.ascender(),
            descender: face.descender(),
            space_advance,
            family: family.clone(),
        };
        if let (Some(preferred), Some(found)) = (preferred_family, &family) {
            if found.eq_ignore_ascii_case(preferred) {
                return Ok(metrics);
            }
        }
        if fallback.is_none() {
            fallback = Some(metrics);
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}
