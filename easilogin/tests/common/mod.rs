//! Shared test doubles for the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use easilogin::element::UiElement;
use easilogin::errors::AutomationError;
use easilogin::platforms::AutomationBackend;
use easilogin::types::ScreenshotResult;
use easilogin::Config;

/// Records every synthetic input call and serves a canned screenshot.
pub struct MockBackend {
    pub screen: (u32, u32),
    pub scale: f64,
    pub screenshot: Mutex<Option<ScreenshotResult>>,
    pub clicks: Mutex<Vec<(i32, i32)>>,
    pub typed: Mutex<Vec<(String, bool)>>,
    pub enters: AtomicU32,
}

impl MockBackend {
    pub fn new(screen: (u32, u32)) -> Self {
        Self {
            screen,
            scale: 1.0,
            screenshot: Mutex::new(None),
            clicks: Mutex::new(Vec::new()),
            typed: Mutex::new(Vec::new()),
            enters: AtomicU32::new(0),
        }
    }

    pub fn with_screenshot(self, shot: ScreenshotResult) -> Self {
        *self.screenshot.lock().unwrap() = Some(shot);
        self
    }

    pub fn clicks(&self) -> Vec<(i32, i32)> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn typed(&self) -> Vec<(String, bool)> {
        self.typed.lock().unwrap().clone()
    }

    pub fn enter_count(&self) -> u32 {
        self.enters.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AutomationBackend for MockBackend {
    fn screen_size(&self) -> Result<(u32, u32), AutomationError> {
        Ok(self.screen)
    }

    fn scale_factor(&self) -> Result<f64, AutomationError> {
        Ok(self.scale)
    }

    async fn capture_screen(&self) -> Result<ScreenshotResult, AutomationError> {
        self.screenshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AutomationError::UnsupportedOperation("no canned screenshot".into()))
    }

    fn click(&self, x: i32, y: i32) -> Result<(), AutomationError> {
        self.clicks.lock().unwrap().push((x, y));
        Ok(())
    }

    fn replace_text(&self, text: &str, compat: bool) -> Result<(), AutomationError> {
        self.typed.lock().unwrap().push((text.to_string(), compat));
        Ok(())
    }

    fn press_enter(&self) -> Result<(), AutomationError> {
        self.enters.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn window_root(
        &self,
        _pid: Option<u32>,
        _title: &str,
    ) -> Result<UiElement, AutomationError> {
        Err(AutomationError::UnsupportedOperation(
            "no automation tree in the mock".into(),
        ))
    }

    fn window_exists(&self, _title: &str) -> Result<bool, AutomationError> {
        Ok(true)
    }

    fn activate_window(&self, _title: &str) -> Result<(), AutomationError> {
        Ok(())
    }

    fn find_process(
        &self,
        _needle: &str,
        _exclude: &[u32],
    ) -> Result<Option<u32>, AutomationError> {
        Ok(None)
    }

    fn kill_process(&self, _name: &str) -> Result<(), AutomationError> {
        Ok(())
    }

    fn launch(&self, _path: &Path, _args: &[String]) -> Result<(), AutomationError> {
        Ok(())
    }

    fn install_path_from_registry(&self) -> Result<Option<PathBuf>, AutomationError> {
        Ok(None)
    }
}

/// Configuration with every wait zeroed so tests run fast, the warning
/// gate disabled and target relaunch off (the mock has no real process).
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.warning.enabled = false;
    config.target.relaunch = false;
    config.retry.delay_ms = 0;
    config.timeouts.enter_login_ui_ms = 0;
    config.timeouts.switch_tab_ms = 0;
    config.timeouts.after_launch_ms = 0;
    config.timeouts.terminate_ms = 0;
    config.template.poll_interval_ms = 10;
    config.template.search_budget_ms = 500;
    config
}
