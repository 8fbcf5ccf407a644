//! Print and download side flows
//!
//! Both paths work from the document handle alone; print renders its own
//! off-screen rasters and never touches the page controllers.

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};

use super::engine::{DocumentRef, EngineError, RasterRequest, RenderIntent, RenderOutcome};
use super::types::Pixmap;
use super::viewport::Rotation;

/// Print resolution used when the caller does not pick one
pub const DEFAULT_PRINT_DPI: u32 = 300;

const POINTS_PER_INCH: f64 = 72.0;
const CSS_PIXELS_PER_INCH: f64 = 96.0;

#[derive(Debug, thiserror::Error)]
pub enum ExportFault {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("page {page} could not be rendered for print: {detail}")]
    Render { page: u32, detail: String },

    #[error("host rejected the request: {0}")]
    Host(String),
}

impl ExportFault {
    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
    }
}

/// Everything the platform print dialog needs
#[derive(Clone, Debug, PartialEq)]
pub struct PrintJob {
    /// Page size of the first page, CSS pixels
    pub page_width: f64,
    pub page_height: f64,
    pub dpi: u32,
    pub pages: Vec<Pixmap>,
}

/// Print options; `Default` matches the host-facing defaults.
#[derive(Clone, Debug)]
pub struct PrintOptions {
    pub dpi: u32,
    /// Temporarily replaces the host's document title when non-empty
    pub filename: String,
    pub all_pages: bool,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_PRINT_DPI,
            filename: String::new(),
            all_pages: false,
        }
    }
}

/// Platform services the viewer cannot provide itself
#[async_trait(?Send)]
pub trait HostPlatform {
    fn document_title(&self) -> String;

    fn set_document_title(&self, title: &str);

    /// Show the print dialog for `job`
    async fn print(&self, job: PrintJob) -> Result<(), ExportFault>;

    /// Hand bytes to the platform save mechanism
    async fn save(&self, data: Vec<u8>, filename: &str) -> Result<(), ExportFault>;
}

/// Restores the host's document title on drop
pub(crate) struct TitleGuard<'a> {
    host: &'a dyn HostPlatform,
    saved: Option<String>,
}

impl<'a> TitleGuard<'a> {
    pub(crate) fn replace(host: &'a dyn HostPlatform, title: &str) -> Self {
        if title.is_empty() {
            return Self { host, saved: None };
        }
        let saved = host.document_title();
        host.set_document_title(title);
        Self {
            host,
            saved: Some(saved),
        }
    }
}

impl Drop for TitleGuard<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.host.set_document_title(&saved);
        }
    }
}

/// Render `pages` off-screen at `dpi` and send them to the host.
pub(crate) async fn print_pages(
    document: &DocumentRef,
    pages: &[u32],
    options: &PrintOptions,
    host: &dyn HostPlatform,
) -> Result<(), ExportFault> {
    let _title = TitleGuard::replace(host, &options.filename);

    let scale = f64::from(options.dpi) / POINTS_PER_INCH;
    info!("printing {} page(s) at {} dpi", pages.len(), options.dpi);

    let rendered = join_all(
        pages
            .iter()
            .map(|&number| render_for_print(document, number, scale)),
    )
    .await;
    let rendered = rendered.into_iter().collect::<Result<Vec<_>, _>>()?;

    let Some((first_size, _)) = rendered.first() else {
        debug!("nothing to print");
        return Ok(());
    };
    let css_per_point = CSS_PIXELS_PER_INCH / POINTS_PER_INCH;
    let job = PrintJob {
        page_width: first_size.0 * css_per_point,
        page_height: first_size.1 * css_per_point,
        dpi: options.dpi,
        pages: rendered.into_iter().map(|(_, pixmap)| pixmap).collect(),
    };

    host.print(job).await
}

/// Returns the unrotated page size in points alongside the raster.
async fn render_for_print(
    document: &DocumentRef,
    number: u32,
    scale: f64,
) -> Result<((f64, f64), Pixmap), ExportFault> {
    let page = document.page(number).await?;
    let base = page.viewport(1.0, Rotation::Deg0);
    let viewport = page.viewport(scale, Rotation::Deg0);

    let task = page.render(RasterRequest {
        viewport,
        intent: RenderIntent::Print,
    });
    let outcome = task.completion().await;
    page.cleanup();

    match outcome {
        RenderOutcome::Completed(pixmap) => Ok(((base.width, base.height), pixmap)),
        RenderOutcome::Cancelled => Err(ExportFault::Render {
            page: number,
            detail: "render cancelled".into(),
        }),
        RenderOutcome::Failed(error) => {
            warn!("print render of page {number} failed: {error}");
            Err(ExportFault::Render {
                page: number,
                detail: error.to_string(),
            })
        }
    }
}

/// Fetch the document bytes and save them under `filename`, falling back to
/// the transport-suggested name.
pub(crate) async fn download_document(
    document: &DocumentRef,
    filename: Option<&str>,
    host: &dyn HostPlatform,
) -> Result<(), ExportFault> {
    let data = document.data().await?;
    let metadata = document.metadata().await?;

    let filename = filename
        .map(str::to_owned)
        .or(metadata.content_disposition_filename)
        .unwrap_or_default();
    info!("saving {} bytes as {filename:?}", data.len());
    host.save(data, &filename).await
}
