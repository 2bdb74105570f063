use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub mod bubble;
pub mod detect;
pub mod font;
pub mod jobs;
pub mod logging;
pub mod ocr;
pub mod pipeline;
pub mod render;
pub mod settings;
pub mod translate;
pub mod typeset;

#[cfg(test)]
mod test_util;

pub use bubble::{Alignment, BubbleMetadata, BubbleRecord, BubbleRegion};
pub use font::{GlyphMeasure, Typeface};
pub use jobs::{BatchJob, JobQueue, JobStatus};
pub use pipeline::{Engine, PageReport};
pub use typeset::{Direction, FitResult, Layout, TextFitter};

const DEFAULT_OUTPUT_DIR: &str = "output";
const CLI_JOB_ID: &str = "cli";

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub inputs: Vec<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub records: Option<PathBuf>,
    pub extract_only: bool,
    pub save_records: Option<PathBuf>,
    pub translate: bool,
    pub lang: Option<String>,
    pub model: Option<String>,
    pub key: Option<String>,
    pub font: Option<PathBuf>,
    pub background: bool,
    pub settings_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct ExtractedPage<'a> {
    input: &'a Path,
    bubbles: Vec<BubbleRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn run(config: Config) -> Result<String> {
    if config.inputs.is_empty() {
        return Err(anyhow!("no input images given"));
    }
    if config.save_records.is_some() && config.inputs.len() != 1 {
        return Err(anyhow!("--save-records needs exactly one input image"));
    }
    let settings = settings::load_settings(config.settings_path.as_deref())?;
    let engine = build_engine(&config, &settings)?;
    let out_dir = config
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    if config.extract_only {
        return extract_records(&engine, &config).await;
    }

    if let Some(records_path) = &config.save_records {
        let input = &config.inputs[0];
        let output = pipeline::output_path_for(input, &out_dir)?;
        let records = engine.process_page(input, &output).await?;
        bubble::save_records(records_path, &records)?;
        return Ok(output.display().to_string());
    }

    let reports = if config.background {
        run_as_job(engine, config.inputs.clone(), out_dir).await?
    } else {
        engine
            .process_batch(&config.inputs, &out_dir, |done, total| {
                info!("processed {}/{} pages", done, total)
            })
            .await
    };
    serde_json::to_string_pretty(&reports).with_context(|| "failed to format page reports")
}

fn build_engine(config: &Config, settings: &settings::Settings) -> Result<Engine> {
    let detector: Box<dyn detect::Detector> = if let Some(path) = &config.records {
        Box::new(detect::RecordFileDetector::new(path))
    } else if !settings.detector_command.is_empty() {
        Box::new(detect::CommandDetector::new(&settings.detector_command)?)
    } else {
        return Err(anyhow!(
            "no bubble detector: pass --records or set [detector] command in settings"
        ));
    };

    let font_path = config.font.as_deref().or(settings.font_path.as_deref());
    let typeface = font::resolve_typeface(font_path, settings.font_family.as_deref());

    let mut engine = Engine::new(detector, typeface)
        .with_bounds(settings.fit_bounds()?)
        .with_retry_policy(settings.retry_policy());

    if settings.ocr_enabled {
        engine = engine.with_recognizer(Box::new(ocr::TesseractRecognizer::new(
            settings.ocr_program.clone(),
            settings.ocr_horizontal_languages.clone(),
            settings.ocr_vertical_languages.clone(),
        )));
    }

    if config.translate {
        let key = config
            .key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("translation needs an API key (--key or OPENAI_API_KEY)"))?;
        let language = config
            .lang
            .clone()
            .unwrap_or_else(|| settings.target_language.clone());
        let mut translator = translate::ChatTranslator::new(key, language);
        if let Some(model) = config.model.as_ref().or(settings.model.as_ref()) {
            translator = translator.with_model(model.clone());
        }
        if let Some(base_url) = &settings.base_url {
            translator = translator.with_base_url(base_url.clone());
        }
        engine = engine.with_translator(Arc::new(translator));
    }

    Ok(engine)
}

async fn extract_records(engine: &Engine, config: &Config) -> Result<String> {
    if let [input] = config.inputs.as_slice() {
        let mut bubbles = engine.extract(input)?;
        engine.translate(&mut bubbles).await;
        if let Some(path) = &config.save_records {
            bubble::save_records(path, &bubbles)?;
        }
        return serde_json::to_string_pretty(&bubbles)
            .with_context(|| "failed to format bubble records");
    }

    let mut pages = Vec::with_capacity(config.inputs.len());
    for input in &config.inputs {
        let page = match engine.extract(input) {
            Ok(mut bubbles) => {
                engine.translate(&mut bubbles).await;
                ExtractedPage {
                    input,
                    bubbles,
                    error: None,
                }
            }
            Err(err) => {
                warn!("{}: {:#}", input.display(), err);
                ExtractedPage {
                    input,
                    bubbles: Vec::new(),
                    error: Some(format!("{:#}", err)),
                }
            }
        };
        pages.push(page);
    }
    serde_json::to_string_pretty(&pages).with_context(|| "failed to format bubble records")
}

async fn run_as_job(
    engine: Engine,
    inputs: Vec<PathBuf>,
    out_dir: PathBuf,
) -> Result<Vec<PageReport>> {
    let queue = JobQueue::start(Arc::new(engine));
    queue.submit(BatchJob {
        id: CLI_JOB_ID.to_string(),
        inputs,
        out_dir,
    })?;
    match queue.wait(CLI_JOB_ID).await {
        Some(JobStatus::Completed { pages }) => Ok(pages),
        Some(JobStatus::Failed { error }) => Err(anyhow!(error)),
        other => Err(anyhow!("job ended in unexpected state: {:?}", other)),
    }
}
