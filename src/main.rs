//! brickpub - build instruction pages from LDraw documents

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use brickpub::{
    init_logging, CameraView, CommandLineRenderer, Config, Document, FadeOptions,
    MessageDispatcher, Navigator, NullRenderer, RecordingLayout, RenderImager, RenderSettings,
    Renderer, SettingsPersistence, StaticColorTable, StepImager, WorkFileWriter, BUILD_DATE,
    VERSION,
};

/// CLI structure for the brickpub application
#[derive(Parser)]
#[command(name = "brickpub")]
#[command(version)]
#[command(about = "Build instruction pages from LDraw documents", long_about = None)]
struct Cli {
    /// Settings file to use instead of the platform one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for brickpub
#[derive(Subcommand)]
enum Commands {
    /// Count the pages of a document
    Count {
        /// The document to load
        file: PathBuf,
    },

    /// Draw one page and print its contents
    View {
        /// The document to load
        file: PathBuf,

        /// Page to draw
        #[arg(short, long, default_value_t = 1)]
        page: usize,
    },

    /// Write working files and render step images for a page range
    Export {
        /// The document to load
        file: PathBuf,

        /// Page range, for example 3..7; the whole document when omitted
        #[arg(long)]
        pages: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = "brickpub-out")]
        out: PathBuf,
    },

    /// Print the document-wide bill of materials
    Parts {
        /// The document to load
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    if init_logging().is_err() {
        eprintln!("logging initialization failed");
    }
    let cli = Cli::parse();
    info!(version = VERSION, built = BUILD_DATE, "brickpub starting");

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = load_settings(cli.config.as_deref());
    let config = settings.config();
    match cli.command {
        Commands::Count { file } => count(&file, config),
        Commands::View { file, page } => view(&file, page, config),
        Commands::Export { file, pages, out } => {
            export(&file, pages.as_deref(), &out, config).await
        }
        Commands::Parts { file } => parts(&file, config),
    }
}

/// Load settings, falling back to defaults when the platform has none
fn load_settings(path: Option<&Path>) -> SettingsPersistence {
    let loaded = match path {
        Some(path) => SettingsPersistence::load_from(path),
        None => SettingsPersistence::load(),
    };
    match loaded {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "settings unavailable, using defaults");
            SettingsPersistence::with_defaults(path.unwrap_or(Path::new("brickpub-settings.toml")))
        }
    }
}

/// Parse a document from disk into a ready navigator
fn open(file: &Path, config: &Config) -> anyhow::Result<Navigator> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let messages = Arc::new(MessageDispatcher::new());
    config.messages.apply(&messages);
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("main.ldr");
    let mut document = Document::from_text(name, &text, &messages);
    document.set_path(file);
    Ok(Navigator::new(document).with_messages(messages))
}

/// Print surfaced diagnostics and pick the exit code
///
/// A clean run exits 0; a run that completed but surfaced warnings
/// exits 1. Failures and aborts never reach here, they exit 2.
fn finish(navigator: &Navigator) -> ExitCode {
    let surfaced = navigator.messages().surfaced();
    if surfaced.is_empty() {
        return ExitCode::SUCCESS;
    }
    for message in &surfaced {
        eprintln!("{message}");
    }
    eprintln!("{} diagnostic(s)", surfaced.len());
    ExitCode::from(1)
}

fn count(file: &Path, config: &Config) -> anyhow::Result<ExitCode> {
    let mut navigator = open(file, config)?;
    let pages = navigator.count_pages()?;
    println!("{}: {} pages", file.display(), pages);
    Ok(finish(&navigator))
}

fn view(file: &Path, page: usize, config: &Config) -> anyhow::Result<ExitCode> {
    let mut navigator = open(file, config)?;
    navigator.count_pages()?;
    let mut layout = RecordingLayout::new();
    {
        let drawn = navigator.draw_page_into(page, &mut layout)?;
        if drawn.is_cover() {
            println!("Page {} (cover)", drawn.number);
        } else {
            println!("Page {}", drawn.number);
        }
        for step in drawn.steps() {
            match &step.image {
                Some(image) => println!(
                    "  step {}: {} parts, image {}",
                    step.number,
                    step.parts_added,
                    image.display()
                ),
                None => println!("  step {}: {} parts", step.number, step.parts_added),
            }
            for entry in &step.parts_list {
                match &entry.annotation {
                    Some(annotation) => println!(
                        "    {} x{} colour {} ({})",
                        entry.part, entry.count, entry.color, annotation
                    ),
                    None => println!("    {} x{} colour {}", entry.part, entry.count, entry.color),
                }
            }
        }
        for _ in &drawn.inserts {
            println!("  insert");
        }
    }
    Ok(finish(&navigator))
}

async fn export(
    file: &Path,
    pages: Option<&str>,
    out: &Path,
    config: &Config,
) -> anyhow::Result<ExitCode> {
    let work_dir = config
        .render
        .work_dir
        .clone()
        .unwrap_or_else(|| out.join("work"));
    let image_dir = config
        .render
        .image_dir
        .clone()
        .unwrap_or_else(|| out.join("images"));
    std::fs::create_dir_all(&image_dir)
        .with_context(|| format!("cannot create {}", image_dir.display()))?;

    let renderer: Arc<dyn Renderer> = match &config.render.renderer_path {
        Some(program) => Arc::new(
            CommandLineRenderer::new(program).with_args(config.render.renderer_args.clone()),
        ),
        None => {
            warn!("no renderer configured; exporting without images");
            Arc::new(NullRenderer::new())
        }
    };
    let camera = CameraView {
        fov: Some(config.render.camera_fov),
        latitude: Some(config.render.camera_latitude),
        longitude: Some(config.render.camera_longitude),
        distance: None,
    };
    let imager: Arc<dyn StepImager> = Arc::new(
        RenderImager::new(renderer, &work_dir, &image_dir)
            .with_resolution(config.render.image_width, config.render.image_height)
            .with_camera_defaults(camera),
    );

    let mut navigator = open(file, config)?.with_imager(imager);
    let total = navigator.count_pages()?;
    let (first, last) = match pages {
        Some(range) => parse_range(range, total)?,
        None => (1, total.max(1)),
    };

    let colors = StaticColorTable::new();
    let options = fade_options(&config.render);
    let mut writer = WorkFileWriter::new(&work_dir);
    let report = writer
        .write_document(navigator.document_mut(), &colors, &options)
        .await?;
    info!(
        written = report.written,
        unchanged = report.unchanged,
        "working files ready"
    );

    let mut layout = RecordingLayout::new();
    let mut failures = 0usize;
    for target in first..=last {
        if let Err(e) = navigator.draw_page_into(target, &mut layout) {
            failures += 1;
            warn!(page = target, error = %e, "page skipped");
        }
    }
    for record in layout.pages() {
        println!("page {}: {} steps", record.number, record.steps.len());
    }
    println!(
        "{} of {} pages exported to {}",
        layout.len(),
        last + 1 - first,
        out.display()
    );

    if failures > 0 {
        return Ok(ExitCode::from(1));
    }
    Ok(finish(&navigator))
}

fn parts(file: &Path, config: &Config) -> anyhow::Result<ExitCode> {
    let mut navigator = open(file, config)?;
    navigator.count_pages()?;
    let bom = navigator.bom();
    for entry in bom.entries() {
        match &entry.annotation {
            Some(annotation) => println!(
                "{:>5} x {} colour {} ({})",
                entry.count, entry.part, entry.color, annotation
            ),
            None => println!("{:>5} x {} colour {}", entry.count, entry.part, entry.color),
        }
    }
    println!("{} part lots, {} parts total", bom.len(), bom.total_parts());
    Ok(finish(&navigator))
}

fn fade_options(render: &RenderSettings) -> FadeOptions {
    FadeOptions {
        fade: render.fade,
        highlight: render.highlight,
        fade_color: render.fade_color,
        fade_opacity: render.fade_opacity,
        highlight_color: render.highlight_color,
    }
}

/// Parse a page range like `3..7`, `..5`, `4..`, or a single number
fn parse_range(range: &str, total: usize) -> anyhow::Result<(usize, usize)> {
    let (first, last) = match range.split_once("..") {
        Some((a, b)) => {
            let first = if a.is_empty() {
                1
            } else {
                a.parse()
                    .with_context(|| format!("bad page range {range}"))?
            };
            let last = if b.is_empty() {
                total
            } else {
                b.parse()
                    .with_context(|| format!("bad page range {range}"))?
            };
            (first, last)
        }
        None => {
            let page: usize = range
                .parse()
                .with_context(|| format!("bad page range {range}"))?;
            (page, page)
        }
    };
    anyhow::ensure!(
        first >= 1 && first <= last && last <= total.max(1),
        "page range {range} outside 1..{total}"
    );
    Ok((first, last))
}
