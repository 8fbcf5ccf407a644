//! Engine implementation on top of MuPDF
//!
//! MuPDF works in a y-down space anchored at the page bounds; pages are
//! exposed with a y-up view box `[0, 0, width, height]` and intrinsic
//! rotation already applied, so `rotate()` is always 0.

use std::cell::Cell;
use std::fs;
use std::rc::Rc;

use async_trait::async_trait;
use log::{debug, warn};
use mupdf::pdf::{PdfObject, PdfPage};
use mupdf::text_page::TextBlockType;
use mupdf::{Colorspace, Document, Matrix, MetadataName, Rect, TextPageFlags};

use super::engine::{
    Annotation, AnnotationIntent, ButtonFlags, DocumentHandle, DocumentMetadata, DocumentRef, DocumentSource,
    EngineError, LoadProgress, PageHandle, PageRef, PdfEngine, RasterRequest, RenderOutcome,
    RenderTask, RenderTaskRef, SourceKind, TextContent, TextItem,
};
use super::types::{ContentBox, Pixmap, Transform, multiply};

const PDF_MIME: &str = "application/pdf";

// Annotation flags (/F)
const FLAG_HIDDEN: i32 = 1 << 1;
const FLAG_PRINT: i32 = 1 << 2;
const FLAG_NO_VIEW: i32 = 1 << 5;

// Field flags (/Ff)
const FIELD_RADIO: i32 = 1 << 15;
const FIELD_PUSH_BUTTON: i32 = 1 << 16;
const FIELD_COMBO: i32 = 1 << 17;

/// Loads documents with MuPDF. URL sources are not supported.
#[derive(Debug, Default)]
pub struct MupdfEngine;

impl MupdfEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl PdfEngine for MupdfEngine {
    async fn load(
        &self,
        source: &DocumentSource,
        progress: &dyn Fn(LoadProgress),
    ) -> Result<DocumentRef, EngineError> {
        let (data, filename) = match &source.kind {
            SourceKind::Bytes(data) => (data.clone(), None),
            SourceKind::Path(path) => {
                let data = fs::read(path)
                    .map_err(|e| EngineError::Load(format!("{}: {e}", path.display())))?;
                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned());
                (data, filename)
            }
            SourceKind::Url(url) => {
                return Err(EngineError::Unsupported(format!("loading from url {url}")));
            }
        };
        let total = data.len() as u64;
        progress(LoadProgress {
            loaded: total,
            total: Some(total),
        });

        let mut doc = Document::from_bytes(&data, PDF_MIME).map_err(load_error)?;
        if doc.needs_password().map_err(load_error)? {
            let Some(password) = &source.password else {
                return Err(EngineError::PasswordRequired {
                    wrong_password: false,
                });
            };
            if !doc.authenticate(password).map_err(load_error)? {
                return Err(EngineError::PasswordRequired {
                    wrong_password: true,
                });
            }
        }

        let page_count = doc.page_count().map_err(load_error)?;
        let page_count = u32::try_from(page_count)
            .map_err(|_| EngineError::Load(format!("invalid page count {page_count}")))?;
        debug!("mupdf opened document: {page_count} pages, {total} bytes");

        Ok(Rc::new(MupdfDocument {
            doc,
            data,
            filename,
            page_count,
            destroyed: Cell::new(false),
        }))
    }
}

fn load_error(e: mupdf::Error) -> EngineError {
    EngineError::Load(e.to_string())
}

struct MupdfDocument {
    doc: Document,
    data: Vec<u8>,
    filename: Option<String>,
    page_count: u32,
    destroyed: Cell<bool>,
}

#[async_trait(?Send)]
impl DocumentHandle for MupdfDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    async fn page(&self, number: u32) -> Result<PageRef, EngineError> {
        if self.destroyed.get() {
            return Err(EngineError::fetch("page", "document was destroyed"));
        }
        if !(1..=self.page_count).contains(&number) {
            return Err(EngineError::fetch("page", format!("no page {number}")));
        }
        let index = i32::try_from(number - 1)
            .map_err(|_| EngineError::fetch("page", format!("no page {number}")))?;
        let page = self
            .doc
            .load_page(index)
            .and_then(PdfPage::try_from)
            .map_err(|e| EngineError::fetch("page", e.to_string()))?;
        let bounds = page
            .bounds()
            .map_err(|e| EngineError::fetch("page bounds", e.to_string()))?;

        Ok(Rc::new(MupdfPage {
            number,
            page: Rc::new(page),
            bounds,
        }))
    }

    async fn data(&self) -> Result<Vec<u8>, EngineError> {
        Ok(self.data.clone())
    }

    async fn metadata(&self) -> Result<DocumentMetadata, EngineError> {
        let title = self
            .doc
            .metadata(MetadataName::Title)
            .ok()
            .filter(|title| !title.is_empty());
        Ok(DocumentMetadata {
            title,
            content_disposition_filename: self.filename.clone(),
        })
    }

    fn destroy(&self) {
        self.destroyed.set(true);
    }
}

struct MupdfPage {
    number: u32,
    page: Rc<PdfPage>,
    bounds: Rect,
}

impl MupdfPage {
    fn width(&self) -> f64 {
        f64::from(self.bounds.x1 - self.bounds.x0)
    }

    fn height(&self) -> f64 {
        f64::from(self.bounds.y1 - self.bounds.y0)
    }

    /// MuPDF page space to the y-up view box
    fn to_view_box(&self) -> Transform {
        [
            1.0,
            0.0,
            0.0,
            -1.0,
            -f64::from(self.bounds.x0),
            f64::from(self.bounds.y1),
        ]
    }

    fn rect_to_view_box(&self, rect: Rect) -> [f64; 4] {
        let x0 = f64::from(self.bounds.x0);
        let y1 = f64::from(self.bounds.y1);
        [
            f64::from(rect.x0) - x0,
            y1 - f64::from(rect.y1),
            f64::from(rect.x1) - x0,
            y1 - f64::from(rect.y0),
        ]
    }

    /// Entries of the page's `/Annots` array other than links and popups
    fn annots(&self, intent: AnnotationIntent) -> Result<Vec<Annotation>, mupdf::Error> {
        let Some(annots) = self.page.object().get_dict("Annots")? else {
            return Ok(Vec::new());
        };
        let ctm = self.page.ctm()?;
        let count = i32::try_from(annots.len()?).unwrap_or(i32::MAX);

        let mut annotations = Vec::new();
        for index in 0..count {
            let Some(dict) = annots.get_array(index)? else {
                continue;
            };
            let subtype = name_entry(&dict, "Subtype", false)?.unwrap_or_default();
            if matches!(subtype.as_str(), "Link" | "Popup") {
                continue;
            }
            let flags = int_entry(&dict, "F", false)?.unwrap_or(0);
            if !shown_for(intent, flags) {
                continue;
            }
            let Some(rect) = rect_entry(&dict)? else {
                continue;
            };

            let field_type = name_entry(&dict, "FT", true)?;
            let field_flags = int_entry(&dict, "Ff", true)?.unwrap_or(0);
            let button = match field_type.as_deref() {
                Some("Btn") => ButtonFlags {
                    check_box: field_flags & (FIELD_RADIO | FIELD_PUSH_BUTTON) == 0,
                    radio_button: field_flags & FIELD_RADIO != 0,
                },
                _ => ButtonFlags::default(),
            };
            let combo = field_type.as_deref() == Some("Ch") && field_flags & FIELD_COMBO != 0;

            annotations.push(Annotation {
                id: text_entry(&dict, "NM")?
                    .unwrap_or_else(|| format!("{}-annot-{index}", self.number)),
                rect: self.rect_to_view_box(rect.transform(&ctm)),
                field_name: text_entry(&dict, "T")?,
                icon: if subtype == "Text" {
                    name_entry(&dict, "Name", false)?
                } else {
                    None
                },
                contents: text_entry(&dict, "Contents")?,
                subtype,
                field_type,
                button,
                combo,
                ..Annotation::default()
            });
        }
        Ok(annotations)
    }
}

fn shown_for(intent: AnnotationIntent, flags: i32) -> bool {
    if flags & FLAG_HIDDEN != 0 {
        return false;
    }
    match intent {
        AnnotationIntent::Display => flags & FLAG_NO_VIEW == 0,
        AnnotationIntent::Print => flags & FLAG_PRINT != 0,
    }
}

fn entry(dict: &PdfObject, key: &str, inherited: bool) -> Result<Option<PdfObject>, mupdf::Error> {
    if inherited {
        dict.get_dict_inheritable(key)
    } else {
        dict.get_dict(key)
    }
}

fn name_entry(dict: &PdfObject, key: &str, inherited: bool) -> Result<Option<String>, mupdf::Error> {
    let Some(value) = entry(dict, key, inherited)? else {
        return Ok(None);
    };
    let name = String::from_utf8_lossy(value.as_name()?).into_owned();
    Ok(Some(name).filter(|name| !name.is_empty()))
}

fn int_entry(dict: &PdfObject, key: &str, inherited: bool) -> Result<Option<i32>, mupdf::Error> {
    entry(dict, key, inherited)?
        .map(|value| value.as_int())
        .transpose()
}

fn text_entry(dict: &PdfObject, key: &str) -> Result<Option<String>, mupdf::Error> {
    let Some(value) = dict.get_dict(key)? else {
        return Ok(None);
    };
    let text = decode_text_string(value.as_bytes()?);
    Ok(Some(text).filter(|text| !text.is_empty()))
}

/// `/Rect` in PDF user space, normalised
fn rect_entry(dict: &PdfObject) -> Result<Option<Rect>, mupdf::Error> {
    let Some(array) = dict.get_dict("Rect")? else {
        return Ok(None);
    };
    let mut coords = [0.0f32; 4];
    for (index, coord) in (0..).zip(coords.iter_mut()) {
        let Some(value) = array.get_array(index)? else {
            return Ok(None);
        };
        *coord = value.as_float()?;
    }
    let [x0, y0, x1, y1] = coords;
    Ok(Some(Rect {
        x0: x0.min(x1),
        y0: y0.min(y1),
        x1: x0.max(x1),
        y1: y0.max(y1),
    }))
}

/// PDF text string: UTF-16BE or UTF-8 with a byte order mark, otherwise
/// single-byte text.
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().map(|&byte| char::from(byte)).collect()
}

#[async_trait(?Send)]
impl PageHandle for MupdfPage {
    fn number(&self) -> u32 {
        self.number
    }

    fn view_box(&self) -> ContentBox {
        [0.0, 0.0, self.width(), self.height()]
    }

    fn rotate(&self) -> i32 {
        0
    }

    fn render(&self, request: RasterRequest) -> RenderTaskRef {
        let transform = multiply(&request.viewport.transform, &self.to_view_box());
        Rc::new(MupdfRenderTask {
            page: Rc::clone(&self.page),
            transform,
            size: request.viewport.pixel_size(),
            cancelled: Cell::new(false),
        })
    }

    async fn text_content(&self) -> Result<TextContent, EngineError> {
        let text_page = self
            .page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| EngineError::fetch("text content", e.to_string()))?;

        let mut items = Vec::new();
        for block in text_page.blocks() {
            if block.r#type() != TextBlockType::Text {
                continue;
            }
            for line in block.lines() {
                let text: String = line.chars().filter_map(|ch| ch.char()).collect();
                if text.trim().is_empty() {
                    continue;
                }
                let [x0, y0, x1, _] = self.rect_to_view_box(line.bounds());
                let size = f64::from(line.bounds().y1 - line.bounds().y0);
                items.push(TextItem {
                    text,
                    transform: [size, 0.0, 0.0, size, x0, y0],
                    width: x1 - x0,
                    font_name: None,
                });
            }
        }
        Ok(TextContent { items })
    }

    async fn annotations(&self, intent: AnnotationIntent) -> Result<Vec<Annotation>, EngineError> {
        let fetch_error = |e: mupdf::Error| EngineError::fetch("annotations", e.to_string());
        let links = self.page.links().map_err(fetch_error)?;

        let mut annotations: Vec<Annotation> = links
            .enumerate()
            .map(|(index, link)| Annotation {
                id: format!("{}-link-{index}", self.number),
                subtype: "Link".into(),
                rect: self.rect_to_view_box(link.bounds),
                dest_page: link
                    .dest
                    .and_then(|dest| u32::try_from(dest.loc.page_number).ok())
                    .map(|page| page + 1),
                url: Some(link.uri).filter(|uri| !uri.is_empty()),
                ..Annotation::default()
            })
            .collect();
        annotations.extend(self.annots(intent).map_err(fetch_error)?);
        Ok(annotations)
    }
}

/// Rasterizes on the first poll of `completion`; cancellation before that
/// skips the work entirely.
struct MupdfRenderTask {
    page: Rc<PdfPage>,
    transform: Transform,
    size: (u32, u32),
    cancelled: Cell<bool>,
}

#[async_trait(?Send)]
impl RenderTask for MupdfRenderTask {
    fn cancel(&self) {
        self.cancelled.set(true);
    }

    async fn completion(&self) -> RenderOutcome {
        tokio::task::yield_now().await;
        if self.cancelled.get() {
            return RenderOutcome::Cancelled;
        }

        let [a, b, c, d, e, f] = self.transform.map(|v| v as f32);
        let matrix = Matrix::new(a, b, c, d, e, f);
        let pixmap = match self
            .page
            .to_pixmap(&matrix, &Colorspace::device_rgb(), false, false)
        {
            Ok(pixmap) => pixmap,
            Err(e) => {
                warn!("mupdf raster failed: {e}");
                return RenderOutcome::Failed(EngineError::Render(e.to_string()));
            }
        };
        if self.cancelled.get() {
            return RenderOutcome::Cancelled;
        }

        match pixmap_to_rgba(&pixmap, self.size) {
            Ok(pixmap) => RenderOutcome::Completed(pixmap),
            Err(error) => RenderOutcome::Failed(error),
        }
    }
}

/// Copy MuPDF samples into an RGBA buffer of `size`, cropping or padding
/// the edge pixel that rounding may add or drop.
fn pixmap_to_rgba(pixmap: &mupdf::Pixmap, size: (u32, u32)) -> Result<Pixmap, EngineError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(EngineError::Render(format!(
            "unsupported pixmap format: {n} channels"
        )));
    }

    let src_width = pixmap.width() as usize;
    let src_height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    if samples.len() < stride.saturating_mul(src_height) || src_width * n > stride {
        return Err(EngineError::Render("pixmap buffer size mismatch".into()));
    }

    let (width, height) = size;
    let mut out = Pixmap::new(width, height);
    let copy_width = src_width.min(width as usize);
    for y in 0..src_height.min(height as usize) {
        let row = &samples[y * stride..y * stride + copy_width * n];
        let dst = y * width as usize * 4;
        for (x, px) in row.chunks_exact(n).enumerate() {
            let at = dst + x * 4;
            out.pixels[at..at + 3].copy_from_slice(&px[..3]);
            out.pixels[at + 3] = 0xFF;
        }
    }
    Ok(out)
}
