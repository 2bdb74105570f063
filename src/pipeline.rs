use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bubble::{self, BubbleRecord};
use crate::detect::Detector;
use crate::font::Typeface;
use crate::ocr::Recognizer;
use crate::render;
use crate::translate::{self, BatchTranslator, RetryPolicy};
use crate::typeset::{FitBounds, TextFitter};

/// Everything needed to process pages, built once at startup and shared by
/// reference.
pub struct Engine {
    detector: Box<dyn Detector>,
    recognizer: Option<Box<dyn Recognizer>>,
    translator: Option<Arc<dyn BatchTranslator>>,
    fitter: TextFitter<Typeface>,
    retry_policy: RetryPolicy,
}

/// Outcome of one page in a batch. Exactly one of `output` or `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageReport {
    pub input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub bubbles: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl Engine {
    pub fn new(detector: Box<dyn Detector>, typeface: Typeface) -> Self {
        Self {
            detector,
            recognizer: None,
            translator: None,
            fitter: TextFitter::new(typeface),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_recognizer(mut self, recognizer: Box<dyn Recognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn BatchTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_bounds(mut self, bounds: FitBounds) -> Self {
        self.fitter = self.fitter.with_bounds(bounds);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn typeface(&self) -> &Typeface {
        self.fitter.measure()
    }

    pub fn translates(&self) -> bool {
        self.translator.is_some()
    }

    /// Detects the bubbles of a page and fills in missing text with OCR.
    pub fn extract(&self, image_path: &Path) -> Result<Vec<BubbleRecord>> {
        let image = load_image(image_path)?;
        self.extract_from(image_path, &image)
    }

    fn extract_from(&self, image_path: &Path, image: &DynamicImage) -> Result<Vec<BubbleRecord>> {
        let (width, height) = image.dimensions();
        let detected = self
            .detector
            .detect(image_path, image)
            .with_context(|| format!("bubble detection failed: {}", image_path.display()))?;
        let mut records = bubble::retain_valid(detected, width, height);

        if let Some(recognizer) = &self.recognizer {
            for record in records.iter_mut().filter(|record| record.text.is_none()) {
                let Some(region) = record.region(width, height) else {
                    continue;
                };
                let crop = image.crop_imm(region.xmin, region.ymin, region.width(), region.height());
                let text = recognizer
                    .recognize(&crop, record.metadata().vertical)
                    .with_context(|| format!("OCR failed for bubble {}", record.id))?;
                debug!("bubble {}: {:?}", record.id, text);
                record.text = Some(text);
            }
        }

        info!("{}: {} bubbles", image_path.display(), records.len());
        Ok(records)
    }

    /// Translates the text of every record in one batch.
    ///
    /// Without a translator this is a no-op. Records without text are left
    /// alone; on failure the others get the placeholder and keep their OCR
    /// text.
    pub async fn translate(&self, records: &mut [BubbleRecord]) {
        let Some(translator) = &self.translator else {
            return;
        };
        let indices: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| {
                record
                    .text
                    .as_deref()
                    .is_some_and(|text| !text.trim().is_empty())
            })
            .map(|(index, _)| index)
            .collect();
        let texts: Vec<String> = indices
            .iter()
            .map(|&index| records[index].text.clone().unwrap_or_default())
            .collect();
        let translated =
            translate::translate_or_placeholder(translator.as_ref(), &texts, &self.retry_policy)
                .await;
        for (index, translation) in indices.into_iter().zip(translated) {
            records[index].translation = Some(translation);
        }
    }

    /// Typesets `records` into the page at `image_path` and writes the result.
    pub fn annotate(
        &self,
        image_path: &Path,
        records: &[BubbleRecord],
        output_path: &Path,
    ) -> Result<()> {
        let image = load_image(image_path)?;
        self.annotate_image(&image, records, output_path)
    }

    fn annotate_image(
        &self,
        image: &DynamicImage,
        records: &[BubbleRecord],
        output_path: &Path,
    ) -> Result<()> {
        let format = ImageFormat::from_path(output_path).unwrap_or(ImageFormat::Png);
        let bytes = self.render_page(image, records, format)?;
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(output_path, bytes)
            .with_context(|| format!("failed to write image: {}", output_path.display()))?;
        info!("wrote {}", output_path.display());
        Ok(())
    }

    /// Renders the typeset page and encodes it as `format`.
    pub fn render_page(
        &self,
        image: &DynamicImage,
        records: &[BubbleRecord],
        format: ImageFormat,
    ) -> Result<Vec<u8>> {
        let (width, height) = image.dimensions();
        let mut ops = Vec::new();
        for record in records {
            let Some(region) = record.region(width, height) else {
                warn!("bubble {} lies outside the page; skipped", record.id);
                continue;
            };
            ops.extend(render::typeset_bubble(record, &region, &self.fitter));
        }
        let page_png = render::encode_png(image)?;
        let typeface = self.fitter.measure();
        let svg = render::render_page_svg(&page_png, width, height, &ops, typeface);
        render::rasterize_svg(&svg, format, typeface.data())
    }

    /// Extract, translate when configured, and annotate one page.
    pub async fn process_page(
        &self,
        image_path: &Path,
        output_path: &Path,
    ) -> Result<Vec<BubbleRecord>> {
        let image = load_image(image_path)?;
        let mut records = self.extract_from(image_path, &image)?;
        self.translate(&mut records).await;
        self.annotate_image(&image, &records, output_path)?;
        Ok(records)
    }

    /// Processes pages in order into `out_dir`. A failing page is reported
    /// and the batch moves on.
    pub async fn process_batch<F>(
        &self,
        inputs: &[PathBuf],
        out_dir: &Path,
        mut on_page: F,
    ) -> Vec<PageReport>
    where
        F: FnMut(usize, usize) + Send,
    {
        let total = inputs.len();
        let mut reports = Vec::with_capacity(total);
        for (index, input) in inputs.iter().enumerate() {
            let report = match output_path_for(input, out_dir) {
                Ok(output) => match self.process_page(input, &output).await {
                    Ok(records) => PageReport {
                        input: input.clone(),
                        output: Some(output),
                        bubbles: records.len(),
                        error: None,
                    },
                    Err(err) => failed_page(input, &err),
                },
                Err(err) => failed_page(input, &err),
            };
            reports.push(report);
            on_page(index + 1, total);
        }
        reports
    }
}

fn failed_page(input: &Path, err: &anyhow::Error) -> PageReport {
    warn!("{}: {:#}", input.display(), err);
    PageReport {
        input: input.to_path_buf(),
        output: None,
        bubbles: 0,
        error: Some(format!("{:#}", err)),
    }
}

pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).with_context(|| format!("failed to read image: {}", path.display()))
}

/// `out_dir/<file name>`, refusing to overwrite the input itself.
pub fn output_path_for(input: &Path, out_dir: &Path) -> Result<PathBuf> {
    let name = input
        .file_name()
        .ok_or_else(|| anyhow!("input has no file name: {}", input.display()))?;
    let output = out_dir.join(name);
    let same = match (input.canonicalize(), output.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if same {
        return Err(anyhow!(
            "output would overwrite the input: {}",
            output.display()
        ));
    }
    Ok(output)
}
