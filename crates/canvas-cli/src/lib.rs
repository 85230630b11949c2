use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use speedynote_canvas_core::{
    document::DocumentMode, load_metadata, load_page_pixmap, load_tiles, migrate_legacy_metadata,
    open_or_migrate, save_metadata, CanvasConfig, Document, DocumentMetadata,
};
use speedynote_canvas_render::background::render_procedural;
use std::ffi::OsString;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "speedynote-canvas-cli")]
#[command(about = "Headless exerciser for the SpeedyNote canvas engine")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a new, empty bundle directory with fresh metadata.
    NewBundle {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
        #[arg(long, value_enum, default_value_t = ModeArg::Paged)]
        mode: ModeArg,
    },
    /// Print machine-readable bundle metadata, migrating legacy files if needed.
    Info {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Render a page (background + any saved ink) to a standalone PNG.
    RenderPage {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
        #[arg(long)]
        page: u32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Force a legacy-metadata-file migration without loading the document.
    MigrateLegacy {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Print the edgeless-mode tile manifest (allocated (x, y) coordinates).
    TileInfo {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Paged,
    Edgeless,
}

impl From<ModeArg> for DocumentMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Paged => DocumentMode::Paged,
            ModeArg::Edgeless => DocumentMode::Edgeless,
        }
    }
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    bundle: String,
    document_id: String,
    mode: String,
    linked_pdf_path: Option<String>,
    bookmark_count: usize,
    last_accessed_page: u32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::NewBundle { dir, mode } => run_new_bundle(&dir, mode.into()),
        Commands::Info { dir } => run_info(&dir),
        Commands::RenderPage { dir, page, output } => run_render_page(&dir, page, output.as_deref()),
        Commands::MigrateLegacy { dir } => run_migrate_legacy(&dir),
        Commands::TileInfo { dir } => run_tile_info(&dir),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_new_bundle(dir: &Path, mode: DocumentMode) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create bundle dir {}", dir.display()))?;

    if load_metadata(dir)?.is_some() {
        anyhow::bail!("bundle already has metadata: {}", dir.display());
    }

    let metadata = DocumentMetadata::new(mode);
    save_metadata(dir, &metadata)?;
    println!("{}", metadata.id);
    Ok(())
}

fn run_info(dir: &Path) -> Result<()> {
    ensure_bundle_exists(dir)?;

    let metadata = open_or_migrate(dir, DocumentMode::Paged).context("failed to open or migrate bundle")?;

    let payload = InfoOutput {
        bundle: dir.display().to_string(),
        document_id: metadata.id.to_string(),
        mode: format!("{:?}", metadata.mode),
        linked_pdf_path: metadata.linked_pdf_path.map(|p| p.display().to_string()),
        bookmark_count: metadata.bookmarks.len(),
        last_accessed_page: metadata.last_accessed_page,
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_render_page(dir: &Path, page: u32, output: Option<&Path>) -> Result<()> {
    ensure_bundle_exists(dir)?;

    let metadata = open_or_migrate(dir, DocumentMode::Paged).context("failed to open or migrate bundle")?;

    let mut frame = render_procedural(&metadata.background, 1240, 1754);
    if let Some(saved) = load_page_pixmap(dir, metadata.id, page)? {
        frame.composite_source_over(&saved, 0, 0);
    }

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| dir.join(format!("render-page-{page}.png")));
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    write_png(&frame, &output)?;
    println!("{}", output.display());
    Ok(())
}

fn run_migrate_legacy(dir: &Path) -> Result<()> {
    ensure_bundle_exists(dir)?;

    match migrate_legacy_metadata(dir, DocumentMode::Paged)? {
        Some(metadata) => println!("migrated: {}", metadata.id),
        None => println!("no legacy metadata found"),
    }
    Ok(())
}

fn run_tile_info(dir: &Path) -> Result<()> {
    ensure_bundle_exists(dir)?;

    let metadata = open_or_migrate(dir, DocumentMode::Edgeless).context("failed to open or migrate bundle")?;
    let mut document = Document::new(dir.to_path_buf(), metadata);
    load_tiles(dir, document.id(), &mut document, CanvasConfig::default().tile_size)?;

    let coords: Vec<(i64, i64)> = document.tile_index().coords.iter().map(|c| (c.x, c.y)).collect();
    println!("{}", serde_json::to_string_pretty(&coords)?);
    Ok(())
}

fn ensure_bundle_exists(dir: &Path) -> Result<()> {
    if !dir.exists() || !dir.is_dir() {
        anyhow::bail!("bundle directory does not exist: {}", dir.display());
    }
    Ok(())
}

fn write_png(pixmap: &speedynote_canvas_render::Pixmap, output: &Path) -> Result<()> {
    let image_buffer = image::RgbaImage::from_raw(pixmap.width, pixmap.height, pixmap.pixels.clone())
        .context("pixmap dimensions do not match its pixel buffer")?;

    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image_buffer)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .context("failed to encode PNG")?;

    fs::write(output, bytes).with_context(|| format!("failed to write {}", output.display()))
}
