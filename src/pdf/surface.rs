//! Drawing surface and overlay containers owned by one page

use serde::Serialize;

use super::annotation_layer::AnnotationRegion;
use super::forms::FormField;
use super::request::{RenderFault, TaskId};
use super::text_layer::TextSpan;
use super::types::Pixmap;

/// Raster target for a page.
///
/// Exactly one render task may write at a time: [`Canvas::claim`] hands the
/// surface to a task and any draw from another task is refused.
#[derive(Debug, Default)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    writer: Option<TaskId>,
    draws: u64,
}

impl Canvas {
    /// Resize, clear, and hand the surface to `task`
    pub fn claim(&mut self, task: TaskId, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(width as usize * height as usize * 4, 0);
        self.writer = Some(task);
    }

    /// Copy a finished raster onto the surface, clipped to its size.
    pub fn draw(&mut self, task: TaskId, pixmap: &Pixmap) -> Result<(), RenderFault> {
        if self.writer != Some(task) {
            return Err(RenderFault::Cancelled);
        }

        let copy_width = self.width.min(pixmap.width) as usize * 4;
        let rows = self.height.min(pixmap.height) as usize;
        let dst_stride = self.width as usize * 4;
        let src_stride = pixmap.width as usize * 4;
        if pixmap.pixels.len() < src_stride * pixmap.height as usize {
            return Err(RenderFault::surface("pixmap buffer size mismatch"));
        }

        for y in 0..rows {
            let dst = y * dst_stride;
            let src = y * src_stride;
            self.pixels[dst..dst + copy_width].copy_from_slice(&pixmap.pixels[src..src + copy_width]);
        }
        self.draws += 1;
        Ok(())
    }

    /// Drop the pixel buffer and any writer
    pub fn release(&mut self) {
        self.width = 0;
        self.height = 0;
        self.pixels = Vec::new();
        self.writer = None;
    }

    #[must_use]
    pub fn writer(&self) -> Option<TaskId> {
        self.writer
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of rasters drawn since creation
    #[must_use]
    pub fn draw_count(&self) -> u64 {
        self.draws
    }

    /// No pixel has been painted
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|&b| b == 0)
    }

    #[must_use]
    pub fn snapshot(&self) -> Pixmap {
        Pixmap {
            width: self.width,
            height: self.height,
            pixels: self.pixels.clone(),
        }
    }
}

/// A positioned overlay container
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Overlay<T> {
    pub width: f64,
    pub height: f64,
    pub items: Vec<T>,
}

impl<T> Default for Overlay<T> {
    fn default() -> Self {
        Self {
            width: 0.0,
            height: 0.0,
            items: Vec::new(),
        }
    }
}

impl<T> Overlay<T> {
    /// Replace the contents and size the container
    pub fn fill(&mut self, width: f64, height: f64, items: Vec<T>) {
        self.width = width;
        self.height = height;
        self.items = items;
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Everything a page draws into
#[derive(Debug, Default)]
pub struct PageSurfaces {
    pub canvas: Canvas,
    pub text: Overlay<TextSpan>,
    pub annotations: Overlay<AnnotationRegion>,
    pub forms: Overlay<FormField>,
}

impl PageSurfaces {
    /// Empty every overlay; the canvas is left alone
    pub fn clear_overlays(&mut self) {
        self.text.clear();
        self.annotations.clear();
        self.forms.clear();
    }

    /// Release the canvas and empty every overlay
    pub fn release(&mut self) {
        self.canvas.release();
        self.clear_overlays();
    }

    /// No pixels and no overlay content
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.canvas.is_blank()
            && self.text.is_empty()
            && self.annotations.is_empty()
            && self.forms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32) -> Pixmap {
        Pixmap {
            width,
            height,
            pixels: vec![0xFF; width as usize * height as usize * 4],
        }
    }

    #[test]
    fn draw_from_stale_task_is_refused() {
        let mut canvas = Canvas::default();
        canvas.claim(TaskId::new(1), 4, 4);
        canvas.claim(TaskId::new(2), 4, 4);

        assert_eq!(
            canvas.draw(TaskId::new(1), &solid(4, 4)),
            Err(RenderFault::Cancelled)
        );
        assert!(canvas.is_blank());

        canvas.draw(TaskId::new(2), &solid(4, 4)).unwrap();
        assert!(!canvas.is_blank());
        assert_eq!(canvas.draw_count(), 1);
    }

    #[test]
    fn draw_clips_to_surface() {
        let mut canvas = Canvas::default();
        canvas.claim(TaskId::new(1), 2, 2);
        canvas.draw(TaskId::new(1), &solid(3, 5)).unwrap();
        assert_eq!(canvas.snapshot().pixels, vec![0xFF; 16]);
    }

    #[test]
    fn release_leaves_nothing_behind() {
        let mut surfaces = PageSurfaces::default();
        surfaces.canvas.claim(TaskId::new(1), 2, 2);
        surfaces.canvas.draw(TaskId::new(1), &solid(2, 2)).unwrap();
        surfaces.forms.fill(10.0, 10.0, vec![FormField::default()]);

        surfaces.release();
        assert!(surfaces.is_empty());
        assert_eq!(surfaces.canvas.size(), (0, 0));
        assert_eq!(surfaces.canvas.writer(), None);
    }
}
