//! Capture-only backend for non-Windows platforms.
//!
//! The target application only ships on Windows, so everything that touches
//! its windows or input is `UnsupportedOperation` here; screen capture and
//! metrics still work, which keeps the template matcher usable in tooling
//! and tests off-target.

use std::path::{Path, PathBuf};

use tokio::task;

use crate::element::UiElement;
use crate::errors::AutomationError;
use crate::platforms::AutomationBackend;
use crate::types::ScreenshotResult;

pub struct GenericBackend;

impl GenericBackend {
    pub fn new() -> Self {
        Self
    }

    fn primary_monitor() -> Result<xcap::Monitor, AutomationError> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| AutomationError::PlatformError(format!("Failed to list monitors: {e}")))?;
        monitors
            .into_iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .ok_or_else(|| AutomationError::PlatformError("No primary monitor found".to_string()))
    }

    fn unsupported(op: &str) -> AutomationError {
        AutomationError::UnsupportedOperation(format!("{op} is only available on Windows"))
    }
}

impl Default for GenericBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AutomationBackend for GenericBackend {
    fn screen_size(&self) -> Result<(u32, u32), AutomationError> {
        let monitor = Self::primary_monitor()?;
        let width = monitor
            .width()
            .map_err(|e| AutomationError::PlatformError(format!("monitor width: {e}")))?;
        let height = monitor
            .height()
            .map_err(|e| AutomationError::PlatformError(format!("monitor height: {e}")))?;
        Ok((width, height))
    }

    fn scale_factor(&self) -> Result<f64, AutomationError> {
        let monitor = Self::primary_monitor()?;
        let factor = monitor
            .scale_factor()
            .map_err(|e| AutomationError::PlatformError(format!("monitor scale: {e}")))?;
        Ok(factor as f64)
    }

    async fn capture_screen(&self) -> Result<ScreenshotResult, AutomationError> {
        task::spawn_blocking(|| {
            let monitor = Self::primary_monitor()?;
            let image = monitor.capture_image().map_err(|e| {
                AutomationError::PlatformError(format!("Failed to capture screen: {e}"))
            })?;
            Ok(ScreenshotResult {
                width: image.width(),
                height: image.height(),
                image_data: image.into_raw(),
            })
        })
        .await
        .map_err(|e| AutomationError::PlatformError(format!("Task join error: {e}")))?
    }

    fn click(&self, _x: i32, _y: i32) -> Result<(), AutomationError> {
        Err(Self::unsupported("synthetic click"))
    }

    fn replace_text(&self, _text: &str, _compat: bool) -> Result<(), AutomationError> {
        Err(Self::unsupported("synthetic input"))
    }

    fn press_enter(&self) -> Result<(), AutomationError> {
        Err(Self::unsupported("synthetic input"))
    }

    fn window_root(
        &self,
        _pid: Option<u32>,
        _title: &str,
    ) -> Result<UiElement, AutomationError> {
        Err(Self::unsupported("automation tree access"))
    }

    fn window_exists(&self, _title: &str) -> Result<bool, AutomationError> {
        Err(Self::unsupported("window enumeration"))
    }

    fn activate_window(&self, _title: &str) -> Result<(), AutomationError> {
        Err(Self::unsupported("window activation"))
    }

    fn find_process(
        &self,
        _needle: &str,
        _exclude: &[u32],
    ) -> Result<Option<u32>, AutomationError> {
        Err(Self::unsupported("process discovery"))
    }

    fn kill_process(&self, _name: &str) -> Result<(), AutomationError> {
        Err(Self::unsupported("process control"))
    }

    fn launch(&self, _path: &Path, _args: &[String]) -> Result<(), AutomationError> {
        Err(Self::unsupported("process control"))
    }

    fn install_path_from_registry(&self) -> Result<Option<PathBuf>, AutomationError> {
        Ok(None)
    }
}
