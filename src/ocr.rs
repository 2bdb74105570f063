use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use std::io::Write;
use std::process::Command;

use crate::font::is_cjk;

/// Reads the text of one cropped bubble. An empty string is a valid result.
pub trait Recognizer: Send + Sync {
    fn recognize(&self, crop: &DynamicImage, vertical: bool) -> Result<String>;
}

/// OCR through the `tesseract` command line tool.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    program: String,
    horizontal_languages: String,
    vertical_languages: String,
}

impl TesseractRecognizer {
    pub fn new(
        program: impl Into<String>,
        horizontal_languages: impl Into<String>,
        vertical_languages: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            horizontal_languages: horizontal_languages.into(),
            vertical_languages: vertical_languages.into(),
        }
    }

    fn run(&self, path: &std::path::Path, languages: &str, psm: u32) -> Result<String> {
        let output = Command::new(&self.program)
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(languages)
            .arg("--oem")
            .arg("1")
            .arg("--psm")
            .arg(psm.to_string())
            .output()
            .with_context(|| format!("failed to run {} (is it installed?)", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("{} failed: {}", self.program, stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new("tesseract", "jpn", "jpn_vert")
    }
}

impl Recognizer for TesseractRecognizer {
    fn recognize(&self, crop: &DynamicImage, vertical: bool) -> Result<String> {
        let mut tmp = tempfile::Builder::new()
            .prefix("manga-typesetter-")
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        crop.write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush().ok();

        // psm 5: a single uniform block of vertically aligned text.
        let (languages, psm) = if vertical {
            (self.vertical_languages.as_str(), 5)
        } else {
            (self.horizontal_languages.as_str(), 6)
        };
        let raw = self.run(tmp.path(), languages, psm)?;
        Ok(normalize_ocr_text(&raw))
    }
}

/// Joins OCR output into one line, dropping the spaces OCR engines insert
/// between CJK characters while keeping single spaces between other words.
pub fn normalize_ocr_text(raw: &str) -> String {
    let mut out = String::new();
    let mut pending_space = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            let previous = out.chars().next_back();
            let joins_cjk = previous.is_some_and(is_cjk) || is_cjk(ch);
            if !joins_cjk {
                out.push(' ');
            }
            pending_space = false;
        }
        out.push(ch);
    }
    out
}
