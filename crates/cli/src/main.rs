//! CLI tool for linking slide regions to image regions and rewriting decks.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linker_core::{parse_mapping, ApplyReport, DocumentFormat, MappingEntry, SessionStore};
use linker_pptx::{apply_with_report, extract_regions, PptxDocument};
use linker_vision::{Detection, Detector, VisionConfig};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Map text regions of a reference image onto slide shapes and write the
/// recognized text back into the deck.
#[derive(Parser, Debug)]
#[command(name = "slide-linker")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every slide with its mappable regions
    Slides {
        /// Input PowerPoint file (.pptx)
        input: PathBuf,
    },

    /// Render one slide's canvas and print its regions
    Extract {
        /// Input PowerPoint file (.pptx)
        input: PathBuf,

        /// Slide number (1-based; out of range means slide 1)
        #[arg(short, long, default_value = "1", allow_hyphen_values = true)]
        slide: i64,

        /// Canvas PNG path (default: <input>_slide<n>.png next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Detect text regions in an image
    Detect {
        /// Reference image
        image: PathBuf,

        #[command(flatten)]
        ocr: OcrArgs,
    },

    /// Apply a mapping file to a deck
    Apply {
        /// Input PowerPoint file (.pptx)
        input: PathBuf,

        /// Mapping JSON: [{"shape_id": "Slide1-2", "new_text": "..."}]
        mapping: PathBuf,

        /// Output deck (default: <input>_updated.pptx next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the whole pipeline for one deck, image and mapping
    Link {
        /// Input PowerPoint file (.pptx)
        deck: PathBuf,

        /// Reference image
        image: PathBuf,

        /// Mapping JSON file
        mapping: PathBuf,

        /// Slide to extract regions from
        #[arg(short, long, default_value = "1", allow_hyphen_values = true)]
        slide: i64,

        /// Output directory (default: same as the deck)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        ocr: OcrArgs,
    },
}

/// Recognition service overrides. Unset flags fall back to the environment.
#[derive(clap::Args, Debug)]
struct OcrArgs {
    /// API key (default: $OPENROUTER_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Chat-completions endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Recognition model
    #[arg(long)]
    model: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl OcrArgs {
    fn config(&self) -> VisionConfig {
        let mut config = VisionConfig::from_env();
        if let Some(key) = &self.api_key {
            config = config.with_api_key(key.as_str());
        }
        if let Some(endpoint) = &self.endpoint {
            config = config.with_endpoint(endpoint.as_str());
        }
        if let Some(model) = &self.model {
            config = config.with_model(model.as_str());
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        config
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    match &args.command {
        Command::Slides { input } => list_slides(input),
        Command::Extract {
            input,
            slide,
            output,
        } => extract(input, *slide, output.as_deref()),
        Command::Detect { image, ocr } => detect(image, ocr),
        Command::Apply {
            input,
            mapping,
            output,
        } => apply(input, mapping, output.as_deref()),
        Command::Link {
            deck,
            image,
            mapping,
            slide,
            output,
            ocr,
        } => link(deck, image, mapping, *slide, output.as_deref(), ocr),
    }
}

fn list_slides(input: &Path) -> Result<()> {
    let document = open_document(input)?;
    let canvases = (1..=document.slide_count())
        .map(|n| extract_regions(&document, n as i64))
        .collect::<linker_core::Result<Vec<_>>>()
        .with_context(|| format!("Failed to enumerate slides of {}", input.display()))?;

    print_json(&canvases)
}

fn extract(input: &Path, slide: i64, output: Option<&Path>) -> Result<()> {
    let document = open_document(input)?;
    let canvas = extract_regions(&document, slide)
        .with_context(|| format!("Failed to extract slide {} of {}", slide, input.display()))?;

    let png_path = match output {
        Some(path) => path.to_path_buf(),
        None => sibling_path(input, &format!("slide{}.png", canvas.slide_number)),
    };
    write_file(&png_path, &canvas.png)?;
    log::debug!("Canvas written to {}", png_path.display());

    print_json(&canvas)
}

fn detect(image: &Path, ocr: &OcrArgs) -> Result<()> {
    let detection = Detector::new(ocr.config()).detect_file(image);
    report_degraded(&detection);
    print_json(detection.regions())
}

fn apply(input: &Path, mapping: &Path, output: Option<&Path>) -> Result<()> {
    let document = open_document(input)?;
    let entries = read_mapping(mapping)?;

    let (bytes, report) = apply_with_report(&document, &entries)
        .with_context(|| format!("Failed to apply mapping to {}", input.display()))?;

    let output_path = match output {
        Some(path) => path.to_path_buf(),
        None => sibling_path(input, "updated.pptx"),
    };
    write_file(&output_path, &bytes)?;
    log_skips(&report);

    print_json(&json!({
        "output": output_path,
        "media_type": DocumentFormat::Pptx.media_type(),
        "report": report,
    }))
}

fn link(
    deck: &Path,
    image: &Path,
    mapping: &Path,
    slide: i64,
    output_dir: Option<&Path>,
    ocr: &OcrArgs,
) -> Result<()> {
    let mut store = SessionStore::new();

    let document = open_document(deck)?;
    let session = store.register_document(deck);
    let image_id = store.register_image(image);
    log::debug!("Session {} (image {})", session, image_id);

    let canvas = extract_regions(&document, slide)
        .with_context(|| format!("Failed to extract slide {} of {}", slide, deck.display()))?;

    let detection = Detector::new(ocr.config()).detect_file(store.image(&image_id)?);
    report_degraded(&detection);

    store.save_mapping(&session, read_mapping(mapping)?);
    let entries = store.load_mapping(&session);

    let (bytes, report) = apply_with_report(&document, &entries)
        .with_context(|| format!("Failed to apply mapping to {}", deck.display()))?;

    let dir = match output_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
            dir.to_path_buf()
        }
        None => deck.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    let output_path = dir.join(format!("{}_updated.pptx", session));
    write_file(&output_path, &bytes)?;
    log_skips(&report);

    print_json(&json!({
        "session": session.as_str(),
        "slide": canvas,
        "image_regions": detection.regions(),
        "degraded": detection.is_degraded(),
        "report": report,
        "output": output_path,
    }))
}

/// Read a deck after checking it is a PPTX package.
fn open_document(path: &Path) -> Result<PptxDocument> {
    let bytes = fs::read(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let extension = path.extension().and_then(|e| e.to_str());
    match DocumentFormat::detect(&bytes, extension)
        .with_context(|| format!("Cannot load {}", path.display()))?
    {
        DocumentFormat::Pptx => log::debug!("Parsing {} as PPTX", path.display()),
    }

    PptxDocument::from_bytes(bytes).with_context(|| format!("Failed to parse {}", path.display()))
}

fn read_mapping(path: &Path) -> Result<Vec<MappingEntry>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read mapping {}", path.display()))?;
    let entries =
        parse_mapping(&json).with_context(|| format!("Invalid mapping in {}", path.display()))?;
    log::debug!("Loaded {} mapping entries", entries.len());
    Ok(entries)
}

fn report_degraded(detection: &Detection) {
    if let Some(reason) = detection.reason() {
        eprintln!("Text detection unavailable ({}); using a fallback region", reason);
    }
}

fn log_skips(report: &ApplyReport) {
    for skipped in &report.skipped {
        log::warn!("Skipped {}: {:?}", skipped.shape_id, skipped.reason);
    }
}

/// `<dir>/<stem>_<suffix>` next to `input`.
fn sibling_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let file_name = format!("{}_{}", stem, suffix);

    match input.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
