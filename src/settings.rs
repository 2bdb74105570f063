use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::translate::{DEFAULT_PLACEHOLDER, RetryPolicy};
use crate::typeset::{FONT_SIZE_STEP, FitBounds, MAX_FONT_SIZE, MIN_FONT_SIZE};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub font_path: Option<PathBuf>,
    pub font_family: Option<String>,
    pub min_font_size: u32,
    pub max_font_size: u32,
    pub font_size_step: u32,
    pub ocr_enabled: bool,
    pub ocr_program: String,
    pub ocr_horizontal_languages: String,
    pub ocr_vertical_languages: String,
    pub detector_command: Vec<String>,
    pub target_language: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub placeholder: String,
    pub max_retries: usize,
    pub base_delay_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            font_path: None,
            font_family: None,
            min_font_size: MIN_FONT_SIZE,
            max_font_size: MAX_FONT_SIZE,
            font_size_step: FONT_SIZE_STEP,
            ocr_enabled: true,
            ocr_program: "tesseract".to_string(),
            ocr_horizontal_languages: "jpn".to_string(),
            ocr_vertical_languages: "jpn_vert".to_string(),
            detector_command: Vec::new(),
            target_language: "English".to_string(),
            model: None,
            base_url: None,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            max_retries: 3,
            base_delay_secs: 2,
        }
    }
}

impl Settings {
    pub fn fit_bounds(&self) -> Result<FitBounds> {
        FitBounds::new(self.min_font_size, self.max_font_size, self.font_size_step)
            .with_context(|| "invalid [typeset] settings")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs(self.base_delay_secs),
            placeholder: self.placeholder.clone(),
            ..RetryPolicy::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    font: Option<FontSettings>,
    typeset: Option<TypesetSettings>,
    ocr: Option<OcrSettings>,
    detector: Option<DetectorSettings>,
    translation: Option<TranslationSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct FontSettings {
    path: Option<String>,
    family: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TypesetSettings {
    min_font_size: Option<u32>,
    max_font_size: Option<u32>,
    font_size_step: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    enabled: Option<bool>,
    program: Option<String>,
    horizontal_languages: Option<String>,
    vertical_languages: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DetectorSettings {
    command: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    language: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    placeholder: Option<String>,
    max_retries: Option<usize>,
    base_delay_secs: Option<u64>,
}

/// Loads settings from the built-in defaults, then `./settings.toml`,
/// `./settings.local.toml`, the same two files under
/// `~/.manga-typesetter/`, and finally `extra_path`. Later files win.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;
    settings.merge(parse_settings(DEFAULT_SETTINGS_TOML, Path::new("<built-in>"))?);

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge(parse_settings(&content, &path)?);
        }
    }

    Ok(settings)
}

fn parse_settings(content: &str, path: &Path) -> Result<SettingsFile> {
    toml::from_str(content).with_context(|| format!("failed to parse settings: {}", path.display()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(font) = incoming.font {
            if let Some(path) = non_blank(font.path) {
                self.font_path = Some(PathBuf::from(path));
            }
            if let Some(family) = non_blank(font.family) {
                self.font_family = Some(family);
            }
        }
        if let Some(typeset) = incoming.typeset {
            if let Some(size) = typeset.min_font_size {
                self.min_font_size = size;
            }
            if let Some(size) = typeset.max_font_size {
                self.max_font_size = size;
            }
            if let Some(step) = typeset.font_size_step {
                self.font_size_step = step;
            }
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(enabled) = ocr.enabled {
                self.ocr_enabled = enabled;
            }
            if let Some(program) = non_blank(ocr.program) {
                self.ocr_program = program;
            }
            if let Some(languages) = non_blank(ocr.horizontal_languages) {
                self.ocr_horizontal_languages = languages;
            }
            if let Some(languages) = non_blank(ocr.vertical_languages) {
                self.ocr_vertical_languages = languages;
            }
        }
        if let Some(detector) = incoming.detector
            && let Some(command) = detector.command
            && !command.is_empty()
        {
            self.detector_command = command;
        }
        if let Some(translation) = incoming.translation {
            if let Some(language) = non_blank(translation.language) {
                self.target_language = language;
            }
            if let Some(model) = non_blank(translation.model) {
                self.model = Some(model);
            }
            if let Some(base_url) = non_blank(translation.base_url) {
                self.base_url = Some(base_url);
            }
            if let Some(placeholder) = translation.placeholder {
                self.placeholder = placeholder;
            }
            if let Some(retries) = translation.max_retries {
                self.max_retries = retries;
            }
            if let Some(delay) = translation.base_delay_secs
                && delay > 0
            {
                self.base_delay_secs = delay;
            }
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".manga-typesetter"))
        }
    })
}
