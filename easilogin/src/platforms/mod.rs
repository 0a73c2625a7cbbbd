//! OS-specific automation backends behind one trait seam.
//!
//! The Windows backend drives UI Automation, synthetic input and process
//! control; other platforms get a capture-only backend so the engine and its
//! tests still build and run there.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::element::UiElement;
use crate::errors::AutomationError;
use crate::types::ScreenshotResult;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(not(target_os = "windows"))]
pub mod generic;

/// The common trait every platform backend must implement.
///
/// All blocking waits inside implementations must be bounded; callers wrap
/// the longer ones in `spawn_blocking`.
#[async_trait::async_trait]
pub trait AutomationBackend: Send + Sync {
    /// Primary monitor size in physical pixels.
    fn screen_size(&self) -> Result<(u32, u32), AutomationError>;

    /// Display scale factor of the primary monitor (1.0 = 100%).
    fn scale_factor(&self) -> Result<f64, AutomationError>;

    async fn capture_screen(&self) -> Result<ScreenshotResult, AutomationError>;

    fn click(&self, x: i32, y: i32) -> Result<(), AutomationError>;

    /// Select-all + delete, then type. `compat` uses clipboard paste instead
    /// of per-character keystrokes (IME popups can cover the field on short
    /// screens).
    fn replace_text(&self, text: &str, compat: bool) -> Result<(), AutomationError>;

    fn press_enter(&self) -> Result<(), AutomationError>;

    /// Root automation element of the target window, by process and title.
    /// `ElementNotFound` when the window exists but exposes no tree yet.
    fn window_root(
        &self,
        pid: Option<u32>,
        title: &str,
    ) -> Result<UiElement, AutomationError>;

    fn window_exists(&self, title: &str) -> Result<bool, AutomationError>;

    fn activate_window(&self, title: &str) -> Result<(), AutomationError>;

    /// First process whose name contains `needle` (case-insensitive),
    /// excluding the given pids.
    fn find_process(&self, needle: &str, exclude: &[u32]) -> Result<Option<u32>, AutomationError>;

    fn kill_process(&self, name: &str) -> Result<(), AutomationError>;

    fn launch(&self, path: &Path, args: &[String]) -> Result<(), AutomationError>;

    /// Target install path recorded by its installer, if discoverable.
    fn install_path_from_registry(&self) -> Result<Option<PathBuf>, AutomationError>;
}

/// Create the default backend for the current platform.
pub fn create_backend() -> Result<Arc<dyn AutomationBackend>, AutomationError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::WindowsBackend::new()?))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Ok(Arc::new(generic::GenericBackend::new()))
    }
}
