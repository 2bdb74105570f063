use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::bubble::{self, BubbleRecord};

/// Source of bubble regions and metadata for a page.
///
/// Records come back in reading order. Overlapping and empty regions are
/// allowed; callers filter them.
pub trait Detector: Send + Sync {
    fn detect(&self, image_path: &Path, image: &DynamicImage) -> Result<Vec<BubbleRecord>>;
}

/// Replays records saved from an earlier run.
#[derive(Debug, Clone)]
pub struct RecordFileDetector {
    path: PathBuf,
}

impl RecordFileDetector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Detector for RecordFileDetector {
    fn detect(&self, _image_path: &Path, _image: &DynamicImage) -> Result<Vec<BubbleRecord>> {
        bubble::load_records(&self.path)
    }
}

/// Runs an external detector that prints a JSON array of records for the
/// image path given as its last argument.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
}

impl CommandDetector {
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("detector command is empty"))?;
        if program.trim().is_empty() {
            return Err(anyhow!("detector command is empty"));
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Detector for CommandDetector {
    fn detect(&self, image_path: &Path, _image: &DynamicImage) -> Result<Vec<BubbleRecord>> {
        debug!("running detector {} on {}", self.program, image_path.display());
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image_path)
            .output()
            .with_context(|| format!("failed to run detector '{}'", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("detector failed: {}", stderr.trim()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        bubble::parse_records(stdout.trim())
            .with_context(|| format!("detector '{}' printed invalid records", self.program))
    }
}
