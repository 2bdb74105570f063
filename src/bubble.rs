use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

pub const DEFAULT_LANGUAGE: &str = "unknown";

/// Axis-aligned bubble rectangle in image pixels. Always non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BubbleRegion {
    pub xmin: u32,
    pub ymin: u32,
    pub xmax: u32,
    pub ymax: u32,
}

impl BubbleRegion {
    pub fn new(xmin: u32, ymin: u32, xmax: u32, ymax: u32) -> Option<Self> {
        if xmax <= xmin || ymax <= ymin {
            return None;
        }
        Some(Self {
            xmin,
            ymin,
            xmax,
            ymax,
        })
    }

    /// Builds a region from raw detector coordinates, clamped to the image.
    pub fn from_position(position: [i64; 4], image_width: u32, image_height: u32) -> Option<Self> {
        let clamp = |value: i64, limit: u32| value.clamp(0, limit as i64) as u32;
        Self::new(
            clamp(position[0], image_width),
            clamp(position[1], image_height),
            clamp(position[2], image_width),
            clamp(position[3], image_height),
        )
    }

    pub fn width(&self) -> u32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> u32 {
        self.ymax - self.ymin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
}

impl From<u8> for Alignment {
    fn from(value: u8) -> Self {
        match value {
            0 => Alignment::Left,
            2 => Alignment::Right,
            _ => Alignment::Center,
        }
    }
}

impl From<Alignment> for u8 {
    fn from(value: Alignment) -> Self {
        match value {
            Alignment::Left => 0,
            Alignment::Center => 1,
            Alignment::Right => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BubbleMetadata {
    /// Detector's font size estimate; a search hint only.
    pub font_size: Option<f32>,
    pub angle: i32,
    pub vertical: bool,
    pub fg_color: [u8; 3],
    pub bg_color: [u8; 3],
    pub line_spacing: f32,
    pub alignment: Alignment,
    pub language: String,
}

/// One bubble as exchanged with detectors and saved record files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubbleRecord {
    #[serde(default)]
    pub id: usize,
    pub position: [i64; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(default)]
    pub angle: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical: Option<bool>,
    #[serde(default = "default_fg_color")]
    pub fg_color: [u8; 3],
    #[serde(default = "default_bg_color")]
    pub bg_color: [u8; 3],
    #[serde(default = "default_line_spacing")]
    pub line_spacing: f32,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

fn default_fg_color() -> [u8; 3] {
    [0, 0, 0]
}

fn default_bg_color() -> [u8; 3] {
    [255, 255, 255]
}

fn default_line_spacing() -> f32 {
    1.0
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl BubbleRecord {
    pub fn new(position: [i64; 4]) -> Self {
        Self {
            id: 0,
            position,
            font_size: None,
            angle: 0,
            vertical: None,
            fg_color: default_fg_color(),
            bg_color: default_bg_color(),
            line_spacing: default_line_spacing(),
            alignment: Alignment::default(),
            language: default_language(),
            text: None,
            translation: None,
        }
    }

    /// Region clamped to the image, or `None` when it has no area.
    pub fn region(&self, image_width: u32, image_height: u32) -> Option<BubbleRegion> {
        BubbleRegion::from_position(self.position, image_width, image_height)
    }

    pub fn metadata(&self) -> BubbleMetadata {
        let width = (self.position[2] - self.position[0]).max(0) as f32;
        let height = (self.position[3] - self.position[1]).max(0) as f32;
        let vertical = self.vertical.unwrap_or(height > width * 1.5);
        let line_spacing = if self.line_spacing.is_finite() && self.line_spacing > 0.0 {
            self.line_spacing
        } else {
            default_line_spacing()
        };
        let font_size = self
            .font_size
            .filter(|size| size.is_finite() && *size > 0.0);
        let language = if self.language.trim().is_empty() {
            default_language()
        } else {
            self.language.clone()
        };
        BubbleMetadata {
            font_size,
            angle: self.angle,
            vertical,
            fg_color: self.fg_color,
            bg_color: self.bg_color,
            line_spacing,
            alignment: self.alignment,
            language,
        }
    }

    /// The text to typeset: the translation when present, else the OCR text.
    pub fn display_text(&self) -> &str {
        self.translation
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or("")
    }
}

/// Drops records without area and renumbers the rest in input order.
pub fn retain_valid(
    records: Vec<BubbleRecord>,
    image_width: u32,
    image_height: u32,
) -> Vec<BubbleRecord> {
    let mut kept = Vec::with_capacity(records.len());
    for mut record in records {
        let Some(region) = record.region(image_width, image_height) else {
            warn!("skipping bubble with empty region {:?}", record.position);
            continue;
        };
        record.position = [
            region.xmin as i64,
            region.ymin as i64,
            region.xmax as i64,
            region.ymax as i64,
        ];
        record.id = kept.len();
        kept.push(record);
    }
    kept
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Json,
    Yaml,
}

impl RecordFormat {
    /// `.yaml` and `.yml` files hold YAML; anything else is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml" | "yml") => RecordFormat::Yaml,
            _ => RecordFormat::Json,
        }
    }
}

pub fn parse_records(content: &str) -> Result<Vec<BubbleRecord>> {
    serde_json::from_str(content).with_context(|| "failed to parse bubble records")
}

pub fn parse_yaml_records(content: &str) -> Result<Vec<BubbleRecord>> {
    serde_yaml::from_str(content).with_context(|| "failed to parse bubble records")
}

pub fn load_records(path: &Path) -> Result<Vec<BubbleRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read bubble records: {}", path.display()))?;
    let records = match RecordFormat::from_path(path) {
        RecordFormat::Json => parse_records(&content),
        RecordFormat::Yaml => parse_yaml_records(&content),
    };
    records.with_context(|| format!("invalid bubble records: {}", path.display()))
}

pub fn save_records(path: &Path, records: &[BubbleRecord]) -> Result<()> {
    let content = match RecordFormat::from_path(path) {
        RecordFormat::Json => serde_json::to_string_pretty(records)?,
        RecordFormat::Yaml => serde_yaml::to_string(records)?,
    };
    std::fs::write(path, content)
        .with_context(|| format!("failed to write bubble records: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_documented_defaults() {
        let records = parse_records(r#"[{"position": [10, 20, 110, 70]}]"#).unwrap();
        let record = &records[0];
        assert_eq!(record.fg_color, [0, 0, 0]);
        assert_eq!(record.bg_color, [255, 255, 255]);
        assert_eq!(record.alignment, Alignment::Center);
        assert_eq!(record.language, "unknown");
        let meta = record.metadata();
        assert!(!meta.vertical);
        assert_eq!(meta.line_spacing, 1.0);
        assert_eq!(meta.font_size, None);
    }

    #[test]
    fn vertical_defaults_to_tall_geometry() {
        let record = BubbleRecord::new([0, 0, 40, 100]);
        assert!(record.metadata().vertical);
        let mut explicit = BubbleRecord::new([0, 0, 40, 100]);
        explicit.vertical = Some(false);
        assert!(!explicit.metadata().vertical);
    }

    #[test]
    fn alignment_uses_numeric_codes() {
        let records = parse_records(
            r#"[{"position": [0, 0, 1, 1], "alignment": 0},
                {"position": [0, 0, 1, 1], "alignment": 2},
                {"position": [0, 0, 1, 1], "alignment": 7}]"#,
        )
        .unwrap();
        let alignments: Vec<_> = records.iter().map(|r| r.alignment).collect();
        assert_eq!(
            alignments,
            vec![Alignment::Left, Alignment::Right, Alignment::Center]
        );
        let json = serde_json::to_value(&records[1]).unwrap();
        assert_eq!(json["alignment"], 2);
    }

    #[test]
    fn invalid_line_spacing_falls_back_to_one() {
        let mut record = BubbleRecord::new([0, 0, 10, 10]);
        record.line_spacing = -3.0;
        assert_eq!(record.metadata().line_spacing, 1.0);
    }

    #[test]
    fn retain_valid_drops_empty_regions_and_renumbers() {
        let records = vec![
            BubbleRecord::new([10, 10, 10, 50]),
            BubbleRecord::new([0, 0, 30, 30]),
            BubbleRecord::new([50, 60, 40, 90]),
            BubbleRecord::new([-5, 90, 120, 140]),
        ];
        let kept = retain_valid(records, 100, 120);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, 0);
        assert_eq!(kept[1].id, 1);
        assert_eq!(kept[1].position, [0, 90, 100, 120]);
    }

    #[test]
    fn display_text_prefers_translation() {
        let mut record = BubbleRecord::new([0, 0, 10, 10]);
        assert_eq!(record.display_text(), "");
        record.text = Some("こんにちは".to_string());
        assert_eq!(record.display_text(), "こんにちは");
        record.translation = Some("Hello".to_string());
        assert_eq!(record.display_text(), "Hello");
    }

    #[test]
    fn records_round_trip_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("page.json");
        let mut record = BubbleRecord::new([1, 2, 30, 40]);
        record.text = Some("テスト".to_string());
        record.font_size = Some(24.0);
        save_records(&path, std::slice::from_ref(&record)).unwrap();
        let loaded = load_records(&path).unwrap();
        assert_eq!(loaded, vec![record]);
    }

    #[test]
    fn record_format_follows_extension() {
        assert_eq!(RecordFormat::from_path(Path::new("a.yaml")), RecordFormat::Yaml);
        assert_eq!(RecordFormat::from_path(Path::new("a.YML")), RecordFormat::Yaml);
        assert_eq!(RecordFormat::from_path(Path::new("a.json")), RecordFormat::Json);
        assert_eq!(RecordFormat::from_path(Path::new("records")), RecordFormat::Json);
    }

    #[test]
    fn yaml_records_load_and_save() {
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/bubbles.yaml");
        let records = load_records(&fixture).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.position, [120, 40, 180, 260]);
        assert_eq!(first.text.as_deref(), Some("どうして\nここに"));
        assert_eq!(first.fg_color, [20, 20, 20]);
        assert_eq!(first.bg_color, [250, 250, 245]);
        assert_eq!(first.alignment, Alignment::Center);
        let meta = first.metadata();
        assert_eq!(meta.font_size, None);
        assert!(meta.vertical);
        assert_eq!(meta.angle, 0);
        assert_eq!(meta.language, "ja");

        let second = records[1].metadata();
        assert_eq!(second.font_size, Some(18.0));
        assert!(!second.vertical);
        assert_eq!(second.angle, -4);
        assert_eq!(second.line_spacing, 1.2);
        assert_eq!(second.alignment, Alignment::Left);
        assert_eq!(second.fg_color, [255, 255, 255]);
        assert_eq!(second.bg_color, [0, 0, 0]);

        let dir = tempfile::tempdir().expect("tempdir");
        let yaml = dir.path().join("page.yml");
        save_records(&yaml, &records).unwrap();
        let written = std::fs::read_to_string(&yaml).unwrap();
        assert!(written.starts_with("- id: 0"));
        assert_eq!(load_records(&yaml).unwrap(), records);

        let json = dir.path().join("page.json");
        save_records(&json, &records).unwrap();
        assert_eq!(load_records(&json).unwrap(), records);
    }
}
