use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use simplelog::{Config, LevelFilter, WriteLogger};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use pdfpane::directory_host::{DirectoryHost, write_png};
use pdfpane::panic_handler::initialize_panic_handler;
use pdfpane::pdf::{
    AnnotationRegion, DocumentSession, DocumentSource, FormField, MupdfEngine, PrintOptions,
    TextSpan, ViewerEvent,
};
use pdfpane::settings::{ViewerOptions, load_options};

#[derive(Parser)]
#[command(author, version, about = "Render, print and save PDF pages")]
struct Arguments {
    /// YAML file with viewer options
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,
    /// Write a debug log to this file
    #[arg(long, global = true)]
    log: Option<PathBuf>,
    /// Password for protected documents
    #[arg(long, global = true)]
    password: Option<String>,
    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Render visible pages and their neighbours to PNG with overlay JSON
    Render {
        file: PathBuf,
        /// Output directory
        #[arg(long, short = 'o', default_value = "out")]
        out: PathBuf,
        /// Container width in pixels
        #[arg(long, default_value_t = 800.0)]
        width: f64,
        /// Pages reported as visible
        #[arg(long, value_delimiter = ',', default_value = "1")]
        visible: Vec<u32>,
    },
    /// Render pages at print resolution into a directory
    Print {
        file: PathBuf,
        #[arg(long, short = 'o', default_value = "print")]
        out: PathBuf,
        #[arg(long, default_value_t = pdfpane::pdf::DEFAULT_PRINT_DPI)]
        dpi: u32,
        /// Document title while printing
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long)]
        all_pages: bool,
    },
    /// Save the document bytes
    Download {
        file: PathBuf,
        #[arg(long, short = 'o', default_value = ".")]
        out: PathBuf,
        #[arg(long)]
        filename: Option<String>,
    },
}

#[derive(Serialize)]
struct PageOverlays<'a> {
    page: u32,
    text: &'a [TextSpan],
    annotations: &'a [AnnotationRegion],
    forms: &'a [FormField],
}

fn main() -> Result<()> {
    let arguments = Arguments::parse();

    if let Some(path) = &arguments.log {
        WriteLogger::init(
            LevelFilter::Debug,
            Config::default(),
            File::create(path).with_context(|| format!("create log file {}", path.display()))?,
        )?;
    }
    initialize_panic_handler();
    info!("Starting pdfpane");

    let options = match &arguments.config {
        Some(path) => load_options(path)?,
        None => ViewerOptions::default(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build runtime")?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run(arguments, options))
}

async fn run(arguments: Arguments, options: ViewerOptions) -> Result<()> {
    let (file, out) = match &arguments.command {
        Action::Render { file, out, .. }
        | Action::Print { file, out, .. }
        | Action::Download { file, out, .. } => (file, out),
    };

    let host = Rc::new(DirectoryHost::new(out, ""));
    let session = DocumentSession::new(Rc::new(MupdfEngine::new()), host, options);

    let mut source = DocumentSource::path(file);
    if let Some(password) = &arguments.password {
        source = source.with_password(password);
    }
    let page_count = session
        .load(source)
        .await
        .with_context(|| format!("load {}", file.display()))?;
    info!("{} has {page_count} pages", file.display());

    match arguments.command {
        Action::Render {
            out,
            width,
            visible,
            ..
        } => render(&session, &out, width, &visible).await,
        Action::Print {
            dpi,
            title,
            all_pages,
            ..
        } => {
            let options = PrintOptions {
                dpi,
                filename: title,
                all_pages,
            };
            session.print(options).await?;
            Ok(())
        }
        Action::Download { filename, .. } => {
            session.download(filename.as_deref()).await?;
            Ok(())
        }
    }
}

async fn render(session: &DocumentSession, out: &Path, width: f64, visible: &[u32]) -> Result<()> {
    fs::create_dir_all(out).with_context(|| format!("create {}", out.display()))?;

    session.set_container_width(width);
    session.wait_for_layout().await;
    for &page in visible {
        session.report_intersection(page, 1.0);
    }

    let mut pending: BTreeSet<u32> = session
        .render_set()
        .into_iter()
        .filter(|&page| {
            session
                .controller(page)
                .is_some_and(|controller| controller.is_registered())
        })
        .collect();
    if pending.is_empty() {
        bail!("none of the pages {visible:?} can be rendered");
    }

    while !pending.is_empty() {
        match session.events().recv_async().await? {
            ViewerEvent::PageRendered { page } => {
                pending.remove(&page);
                write_page(session, out, page)?;
            }
            ViewerEvent::RenderingFailed { page, error } => {
                pending.remove(&page);
                warn!("page {page} failed: {error}");
                eprintln!("page {page} failed: {error}");
            }
            _ => {}
        }
    }
    Ok(())
}

fn write_page(session: &DocumentSession, out: &Path, page: u32) -> Result<()> {
    let Some(controller) = session.controller(page) else {
        return Ok(());
    };
    let surfaces = controller.surfaces();

    let image = out.join(format!("page-{page:03}.png"));
    write_png(&image, &surfaces.canvas.snapshot())
        .with_context(|| format!("write {}", image.display()))?;

    let overlays = PageOverlays {
        page,
        text: &surfaces.text.items,
        annotations: &surfaces.annotations.items,
        forms: &surfaces.forms.items,
    };
    let json = out.join(format!("page-{page:03}.json"));
    fs::write(&json, serde_json::to_string_pretty(&overlays)?)
        .with_context(|| format!("write {}", json.display()))?;

    info!("wrote {}", image.display());
    println!("{}", image.display());
    Ok(())
}
