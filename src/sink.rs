//! Hand-off to the presentation surface.
//!
//! The surface is an external collaborator that marshals drawing onto its own thread; the sink
//! only sequences lock, draw at origin, publish. Frames are never queued: when the drawing
//! target is unavailable the frame is dropped and the next one wins.

use std::sync::Arc;

use image::RgbImage;

/// A single exclusive drawing pass. Obtained from [`Surface::lock`], consumed by
/// [`Canvas::post`].
pub trait Canvas {
    fn draw_at(&mut self, image: &RgbImage, x: u32, y: u32);
    /// Publishes the drawn contents and releases the target.
    fn post(self: Box<Self>);
}

/// The presentation boundary. Implementations must be callable from any thread and marshal
/// delivery to their own render context internally.
pub trait Surface: Send + Sync {
    /// Acquires the exclusive drawing target, or `None` when the surface is not ready.
    fn lock(&self) -> Option<Box<dyn Canvas + '_>>;
}

pub struct FrameSink {
    surface: Arc<dyn Surface>,
}

impl FrameSink {
    pub fn new(surface: Arc<dyn Surface>) -> Self {
        Self { surface }
    }

    /// Delivers one decoded frame. Safe to call from the pump thread.
    ///
    /// Never blocks on an unready surface: if the target cannot be locked the frame is dropped.
    pub fn submit(&self, image: &RgbImage) {
        match self.surface.lock() {
            Some(mut canvas) => {
                canvas.draw_at(image, 0, 0);
                canvas.post();
            }
            None => {
                log::debug!("surface unavailable, dropping frame");
            }
        }
    }
}
