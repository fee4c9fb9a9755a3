// Preview window (feature `preview`).
// Visual: a window the size of the produced image shows it until you press
// ESC or close the window.

use minifb::{Key, Window, WindowOptions};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{ColorImage, FrameBuffer};

pub struct PreviewWindow {
    window: Window, // the on-screen window you see
}

impl PreviewWindow {
    /// Create a window sized to the image.
    /// Visual: a new empty window appears with your chosen title.
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let mut window = Window::new(title, width.max(1), height.max(1), WindowOptions::default())
            .map_err(|e| Error::Preview(e.to_string()))?;
        window.set_target_fps(30);
        Ok(Self { window })
    }

    /// Push the pixels to the screen.
    pub fn present(&mut self, framebuffer: &FrameBuffer) -> Result<()> {
        self.window
            .update_with_buffer(&framebuffer.pixels, framebuffer.width, framebuffer.height)
            .map_err(|e| Error::Preview(e.to_string()))
    }

    /// Returns false when the user closes the window (so we can stop the loop).
    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    /// True while ESC is held down.
    pub fn esc_pressed(&self) -> bool {
        self.window.is_key_down(Key::Escape)
    }
}

/// Show `image` and block until the window is closed.
pub fn show(title: &str, image: &ColorImage) -> Result<()> {
    let frame = FrameBuffer::from_rgb(image);
    let mut window = PreviewWindow::new(title, frame.width, frame.height)?;
    debug!(title, "preview {}x{}", frame.width, frame.height);
    while window.is_open() && !window.esc_pressed() {
        window.present(&frame)?;
    }
    Ok(())
}
