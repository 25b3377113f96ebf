//! Window / viewport collaborator
//!
//! The engine never talks to a windowing library directly. Cameras read the
//! window size when they are constructed and the camera manager notifies the
//! window whenever the active camera changes.

/// Window-system access required by the renderer and camera manager
pub trait WindowManager {
    /// Current window size in pixels
    fn window_size(&self) -> (u32, u32);

    /// Resize the output viewport to the active camera's image size
    fn update_viewport(&mut self, width: u32, height: u32);

    /// Title shown by the window system
    fn title(&self) -> &str;

    /// Whether the user asked to close the window
    fn should_close(&self) -> bool {
        false
    }

    /// Pump window events
    fn poll_events(&mut self) {}
}

/// Window manager without an OS window
///
/// Keeps the size it was created with and remembers every viewport update.
#[derive(Debug, Clone)]
pub struct HeadlessWindow {
    title: String,
    size: (u32, u32),
    viewport: (u32, u32),
    viewport_updates: usize,
    should_close: bool,
}

impl HeadlessWindow {
    /// Create a headless window of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            title: String::new(),
            size: (width, height),
            viewport: (width, height),
            viewport_updates: 0,
            should_close: false,
        }
    }

    /// Set the title reported to the engine
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Viewport set by the last update
    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Number of viewport updates received
    pub fn viewport_update_count(&self) -> usize {
        self.viewport_updates
    }

    /// Request the frame loop to stop
    pub fn set_should_close(&mut self, should_close: bool) {
        self.should_close = should_close;
    }
}

impl WindowManager for HeadlessWindow {
    fn window_size(&self) -> (u32, u32) {
        self.size
    }

    fn update_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.viewport_updates += 1;
        log::debug!("Viewport updated to {}x{}", width, height);
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn should_close(&self) -> bool {
        self.should_close
    }
}
