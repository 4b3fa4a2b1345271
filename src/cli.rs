use crate::engine::{Engine, spawn_engine_thread};
use crate::error::{Error, Result};
use crate::image_engine;
use crate::models::{
    CompressedImage, MarginOption, OutputFormat, PageSize, PdfSettings, ResizeOption, Settings,
    clamp_quality, format_file_size,
};
use crate::page_ranges;
use crate::session::{CompressSession, ImageToPdfSession, MergeSession, SplitSession};
use crate::storage;
use clap::{Args, Parser, Subcommand};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Compress images and convert, merge or split PDFs.
#[derive(Debug, Parser)]
#[command(name = "quickcompress", author, version)]
pub struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Re-encode images at a lower quality and/or size
    Compress(CompressArgs),
    /// Put each image on its own page of a new PDF
    ToPdf(ToPdfArgs),
    /// Join PDFs into one, in the given order
    Merge(MergeArgs),
    /// Extract pages of a PDF into separate files
    Split(SplitArgs),
    /// Show details of images and PDFs
    Info(InfoArgs),
    /// Manage stored settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Directory results are written to
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Open the results with the system viewer
    #[arg(long)]
    pub open: bool,
}

#[derive(Debug, Args)]
pub struct CompressArgs {
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// JPEG quality, 10-100
    #[arg(long)]
    pub quality: Option<u8>,

    #[arg(long, value_enum)]
    pub resize: Option<ResizeOption>,

    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Report sizes without saving anything
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct ToPdfArgs {
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    #[arg(long, value_enum)]
    pub page_size: Option<PageSize>,

    #[arg(long, value_enum)]
    pub margins: Option<MarginOption>,

    /// JPEG quality of embedded images, 10-100
    #[arg(long)]
    pub image_quality: Option<u8>,

    /// Base name of the PDF
    #[arg(short = 'o', long)]
    pub name: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    #[arg(required = true)]
    pub pdfs: Vec<PathBuf>,

    /// Base name of the merged PDF
    #[arg(short = 'o', long)]
    pub name: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct SplitArgs {
    pub pdf: PathBuf,

    /// Pages to extract, e.g. "1-3,5,8-". Defaults to every page.
    #[arg(long)]
    pub pages: Option<String>,

    /// Write every page to its own file instead of one file per range
    #[arg(long)]
    pub each: bool,

    #[arg(long, default_value = "split")]
    pub prefix: String,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// List the pages of PDFs
    #[arg(long)]
    pub pages: bool,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective settings
    Show,
    /// Change stored settings
    Set(ConfigSetArgs),
    /// Restore defaults
    Reset,
    /// Print where settings are stored
    Path,
}

#[derive(Debug, Args)]
pub struct ConfigSetArgs {
    #[arg(long)]
    pub quality: Option<u8>,

    #[arg(long, value_enum)]
    pub resize: Option<ResizeOption>,

    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    #[arg(long, value_enum)]
    pub page_size: Option<PageSize>,

    #[arg(long, value_enum)]
    pub margins: Option<MarginOption>,

    #[arg(long)]
    pub image_quality: Option<u8>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let settings = storage::load_settings();

    match cli.command {
        Command::Config(cmd) => config(cmd, settings),
        command => {
            let engine = spawn_engine_thread()?;
            match command {
                Command::Compress(args) => compress(&engine, args, settings).await,
                Command::ToPdf(args) => to_pdf(&engine, args, settings).await,
                Command::Merge(args) => merge(&engine, args).await,
                Command::Split(args) => split(&engine, args).await,
                Command::Info(args) => show_info(&engine, args).await,
                Command::Config(_) => Ok(()),
            }
        }
    }
}

async fn compress(engine: &Engine, args: CompressArgs, settings: Settings) -> Result<()> {
    let mut session = CompressSession::new(settings.compression.overridden(
        args.quality,
        args.resize,
        args.format,
    ));
    session.select(engine.inspect_images(args.images).await?);

    let job = session.start()?;
    session.finish(engine.compress(job, storage::staging_dir()).await)?;
    print!("{}", compression_report(session.results()));

    if args.dry_run {
        image_engine::discard_staged(session.results());
        return Ok(());
    }

    let output_dir = args
        .output
        .output_dir
        .unwrap_or_else(storage::compressed_images_dir);
    let saved = engine
        .save_compressed(session.save_requests(), output_dir)
        .await?;
    for path in &saved {
        println!("Saved {}", path.display());
    }
    info!("Saved {} images", saved.len());
    session.record_saved(saved);

    open_outputs(args.output.open, session.saved());
    Ok(())
}

async fn to_pdf(engine: &Engine, args: ToPdfArgs, settings: Settings) -> Result<()> {
    let pdf_settings = PdfSettings {
        page_size: args.page_size.unwrap_or(settings.pdf.page_size),
        margins: args.margins.unwrap_or(settings.pdf.margins),
        image_quality: args
            .image_quality
            .map_or(settings.pdf.image_quality, clamp_quality),
    };
    let mut session = ImageToPdfSession::new(pdf_settings);
    let images = engine.readable_images(args.images).await?;
    if images.is_empty() {
        return Err(Error::NoImages);
    }
    session.select(images);

    let job = session.start()?;
    let output = output_path(args.output.output_dir, args.name.as_deref(), "images")?;
    session.finish(engine.images_to_pdf(job, output).await)?;

    if let Some(document) = session.stage().output() {
        println!(
            "Created {} ({} pages, {})",
            document.path.display(),
            document.page_count,
            format_file_size(document.size)
        );
        open_outputs(args.output.open, std::slice::from_ref(&document.path));
    }
    Ok(())
}

async fn merge(engine: &Engine, args: MergeArgs) -> Result<()> {
    let mut session = MergeSession::new();
    session.select(engine.inspect_pdfs(args.pdfs).await?);

    let job = session.start()?;
    let output = output_path(args.output.output_dir, args.name.as_deref(), "merged")?;
    session.finish(engine.merge(job, output).await)?;

    if let Some(document) = session.stage().output() {
        println!(
            "Merged {} files into {} ({} pages, {})",
            session.documents().len(),
            document.path.display(),
            document.page_count,
            format_file_size(document.size)
        );
        open_outputs(args.output.open, std::slice::from_ref(&document.path));
    }
    Ok(())
}

async fn split(engine: &Engine, args: SplitArgs) -> Result<()> {
    let document = engine
        .inspect_pdfs(vec![args.pdf.clone()])
        .await?
        .into_iter()
        .next()
        .ok_or(Error::NoDocuments)?;
    let page_count = document.page_count;
    let pages = engine.pdf_pages(args.pdf).await?;

    let mut session = SplitSession::new();
    session.load(document, pages);

    let job = match args.pages.as_deref() {
        Some(wanted) if !args.each => {
            session.start_ranges(page_ranges::parse_ranges(wanted, page_count)?, &args.prefix)?
        }
        wanted => {
            let ranges = match wanted {
                Some(wanted) => page_ranges::parse_ranges(wanted, page_count)?,
                None => vec![page_ranges::PageRange::new(1, page_count.max(1))?],
            };
            for page in ranges.iter().flat_map(page_ranges::PageRange::pages) {
                session.toggle_page(page);
            }
            session.start(&args.prefix)?
        }
    };

    let output_dir = args.output.output_dir.unwrap_or_else(storage::pdfs_dir);
    session.finish(engine.split(job, output_dir).await)?;

    if let Some(outputs) = session.stage().output() {
        for path in outputs {
            println!("Wrote {}", path.display());
        }
        open_outputs(args.output.open, outputs);
    }
    Ok(())
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

async fn show_info(engine: &Engine, args: InfoArgs) -> Result<()> {
    let (pdfs, images): (Vec<PathBuf>, Vec<PathBuf>) =
        args.files.into_iter().partition(|p| is_pdf(p));

    for image in engine.inspect_images(images).await? {
        println!(
            "{}: {}x{}, {}, {}",
            image.name,
            image.width,
            image.height,
            image.mime_type.as_deref().unwrap_or("unknown type"),
            format_file_size(image.size)
        );
    }

    for document in engine.inspect_pdfs(pdfs).await? {
        println!(
            "{}: {} pages, {}",
            document.name,
            document.page_count,
            format_file_size(document.size)
        );
        if args.pages {
            for page in engine.pdf_pages(document.path.clone()).await? {
                println!(
                    "  page {}: {:.0} x {:.0} pt",
                    page.page_number, page.width, page.height
                );
            }
        }
    }
    Ok(())
}

fn config(cmd: ConfigCommand, mut settings: Settings) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        ConfigCommand::Set(args) => {
            settings.compression = settings
                .compression
                .overridden(args.quality, args.resize, args.format);
            if let Some(page_size) = args.page_size {
                settings.pdf.page_size = page_size;
            }
            if let Some(margins) = args.margins {
                settings.pdf.margins = margins;
            }
            if let Some(quality) = args.image_quality {
                settings.pdf.image_quality = clamp_quality(quality);
            }
            let path = storage::save_settings(&settings)?;
            println!("Saved {}", path.display());
        }
        ConfigCommand::Reset => {
            storage::reset_settings_in(&storage::get_config_dir())?;
            println!("Settings reset to defaults");
        }
        ConfigCommand::Path => {
            println!("{}", storage::settings_path().display());
        }
    }
    Ok(())
}

fn output_path(dir: Option<PathBuf>, name: Option<&str>, default_name: &str) -> Result<PathBuf> {
    let dir = storage::ensure_dir(&dir.unwrap_or_else(storage::pdfs_dir))?;
    let name = storage::with_extension(name.unwrap_or(default_name), "pdf");
    Ok(storage::unique_path(&dir, &name))
}

fn open_outputs(open: bool, paths: &[PathBuf]) {
    if !open {
        return;
    }
    for path in paths {
        if let Err(e) = open::that(path) {
            warn!("Could not open {}: {e}", path.display());
        }
    }
}

/// One line per image plus a total.
pub fn compression_report(results: &[CompressedImage]) -> String {
    let mut out = String::new();
    let mut original_total = 0u64;
    let mut compressed_total = 0u64;

    for result in results {
        original_total += result.original_size;
        compressed_total += result.compressed_size;
        let _ = writeln!(
            out,
            "{}: {} -> {} ({:.1}% saved, {}x{})",
            storage::display_name(&result.original_path),
            format_file_size(result.original_size),
            format_file_size(result.compressed_size),
            result.percentage_saved(),
            result.width,
            result.height
        );
    }

    if results.len() > 1 {
        let total = CompressedImage::new(
            PathBuf::new(),
            PathBuf::new(),
            original_total,
            compressed_total,
            (0, 0),
        );
        let _ = writeln!(
            out,
            "total: {} -> {} ({:.1}% saved)",
            format_file_size(original_total),
            format_file_size(compressed_total),
            total.percentage_saved()
        );
    }
    out
}
