use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "manga-typesetter",
    version,
    about = "Detect, OCR, translate and re-typeset manga speech bubbles"
)]
struct Cli {
    /// Page image to process (repeatable)
    #[arg(short = 'i', long = "input", required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory for typeset pages (default: output)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Use saved bubble records (JSON, or YAML by extension) instead of running the detector
    #[arg(short = 'r', long = "records")]
    records: Option<PathBuf>,

    /// Print the detected bubble records as JSON and skip rendering
    #[arg(long = "extract-only")]
    extract_only: bool,

    /// Write the bubble records of the (single) page to this file (.yaml/.yml for YAML)
    #[arg(long = "save-records")]
    save_records: Option<PathBuf>,

    /// Translate bubble text before typesetting
    #[arg(short = 't', long = "translate")]
    translate: bool,

    /// Target language for translation (default from settings)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Chat model used for translation
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides OPENAI_API_KEY)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Font file used for measuring and drawing text
    #[arg(long = "font")]
    font: Option<PathBuf>,

    /// Run the batch as a queued background job and report its progress
    #[arg(long = "background")]
    background: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'R', long = "read-settings")]
    read_settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    manga_typesetter::logging::init(cli.verbose)?;

    let config = manga_typesetter::Config {
        inputs: cli.inputs,
        output_dir: cli.output,
        records: cli.records,
        extract_only: cli.extract_only,
        save_records: cli.save_records,
        translate: cli.translate,
        lang: cli.lang,
        model: cli.model,
        key: cli.key,
        font: cli.font,
        background: cli.background,
        settings_path: cli.read_settings,
    };
    let output = manga_typesetter::run(config).await?;
    println!("{}", output);
    Ok(())
}
