//! Host platform that writes prints and downloads into a directory

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::info;
use serde::Serialize;

use crate::pdf::{ExportFault, HostPlatform, Pixmap, PrintJob};

const DEFAULT_DOWNLOAD_NAME: &str = "document.pdf";

/// Encode an RGBA pixmap as PNG
pub fn write_png(path: &Path, pixmap: &Pixmap) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), pixmap.width, pixmap.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().map_err(std::io::Error::other)?;
    writer
        .write_image_data(&pixmap.pixels)
        .map_err(std::io::Error::other)?;
    writer.finish().map_err(std::io::Error::other)
}

#[derive(Serialize)]
struct PrintManifest<'a> {
    title: &'a str,
    page_width: f64,
    page_height: f64,
    dpi: u32,
    pages: Vec<String>,
}

/// Prints become numbered PNGs plus a `print.json` manifest; downloads are
/// written verbatim.
pub struct DirectoryHost {
    dir: PathBuf,
    title: RefCell<String>,
}

impl DirectoryHost {
    pub fn new(dir: impl Into<PathBuf>, title: &str) -> Self {
        Self {
            dir: dir.into(),
            title: RefCell::new(title.into()),
        }
    }

    fn ensure_dir(&self) -> Result<(), ExportFault> {
        fs::create_dir_all(&self.dir).map_err(|e| io_fault(&self.dir, &e))
    }
}

fn io_fault(path: &Path, error: &std::io::Error) -> ExportFault {
    ExportFault::host(format!("{}: {error}", path.display()))
}

#[async_trait(?Send)]
impl HostPlatform for DirectoryHost {
    fn document_title(&self) -> String {
        self.title.borrow().clone()
    }

    fn set_document_title(&self, title: &str) {
        *self.title.borrow_mut() = title.into();
    }

    async fn print(&self, job: PrintJob) -> Result<(), ExportFault> {
        self.ensure_dir()?;

        let mut pages = Vec::with_capacity(job.pages.len());
        for (index, pixmap) in job.pages.iter().enumerate() {
            let name = format!("print-{:03}.png", index + 1);
            let path = self.dir.join(&name);
            write_png(&path, pixmap).map_err(|e| io_fault(&path, &e))?;
            pages.push(name);
        }

        let title = self.document_title();
        let manifest = PrintManifest {
            title: &title,
            page_width: job.page_width,
            page_height: job.page_height,
            dpi: job.dpi,
            pages,
        };
        let path = self.dir.join("print.json");
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| ExportFault::host(e.to_string()))?;
        fs::write(&path, json).map_err(|e| io_fault(&path, &e))?;

        info!("wrote {} print page(s) to {:?}", job.pages.len(), self.dir);
        Ok(())
    }

    async fn save(&self, data: Vec<u8>, filename: &str) -> Result<(), ExportFault> {
        self.ensure_dir()?;

        let name = Path::new(filename)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DOWNLOAD_NAME);
        let path = self.dir.join(name);
        fs::write(&path, &data).map_err(|e| io_fault(&path, &e))?;

        info!("saved {} bytes to {path:?}", data.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn print_writes_pages_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let host = DirectoryHost::new(dir.path(), "Report");
        let job = PrintJob {
            page_width: 816.0,
            page_height: 1056.0,
            dpi: 150,
            pages: vec![Pixmap::new(4, 3), Pixmap::new(4, 3)],
        };

        host.print(job).await.unwrap();

        assert!(dir.path().join("print-001.png").exists());
        assert!(dir.path().join("print-002.png").exists());
        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("print.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["title"], "Report");
        assert_eq!(manifest["dpi"], 150);
    }

    #[tokio::test]
    async fn save_strips_directories_from_filename() {
        let dir = tempfile::tempdir().unwrap();
        let host = DirectoryHost::new(dir.path(), "");

        host.save(b"abc".to_vec(), "../escape.pdf").await.unwrap();
        host.save(b"def".to_vec(), "").await.unwrap();

        assert_eq!(fs::read(dir.path().join("escape.pdf")).unwrap(), b"abc");
        assert_eq!(fs::read(dir.path().join("document.pdf")).unwrap(), b"def");
    }
}
