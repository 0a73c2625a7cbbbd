//! Target application lifecycle: resolve the installed executable, restart
//! it into a known state and wait for its window before any locator runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{TargetConfig, TimeoutConfig};
use crate::errors::AutomationError;
use crate::platforms::AutomationBackend;

/// Stock install location, used when neither the configuration nor the
/// registry knows better.
const DEFAULT_LAUNCHER: &str =
    r"C:\Program Files (x86)\Seewo\EasiNote5\swenlauncher\swenlauncher.exe";

pub struct TargetApp {
    backend: Arc<dyn AutomationBackend>,
    target: TargetConfig,
    timeouts: TimeoutConfig,
}

impl TargetApp {
    pub fn new(
        backend: Arc<dyn AutomationBackend>,
        target: TargetConfig,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            backend,
            target,
            timeouts,
        }
    }

    /// Configuration first, then the installer's registry record, then the
    /// stock install path.
    pub fn resolve_path(&self) -> Result<PathBuf, AutomationError> {
        if let Some(path) = &self.target.path {
            return Ok(path.clone());
        }
        match self.backend.install_path_from_registry() {
            Ok(Some(path)) => {
                debug!(path = %path.display(), "install path resolved from registry");
                return Ok(path);
            }
            Ok(None) => {}
            Err(e) => warn!("registry lookup failed, using the stock path: {e}"),
        }
        Ok(PathBuf::from(DEFAULT_LAUNCHER))
    }

    /// Kill any running instance and launch a fresh one, waiting for its
    /// window. The login dialog only behaves predictably right after
    /// startup.
    pub async fn restart(&self, deadline: Instant) -> Result<(), AutomationError> {
        info!(process = %self.target.process_name, "terminating running target");
        self.backend.kill_process(&self.target.process_name)?;
        if self.target.kill_agent {
            self.backend.kill_process(&self.target.agent_process_name)?;
        }
        tokio::time::sleep(self.timeouts.terminate()).await;

        let path = self.resolve_path()?;
        if !path.exists() {
            return Err(AutomationError::InvalidArgument(format!(
                "target executable not found at {}",
                path.display()
            )));
        }

        info!(path = %path.display(), "launching target");
        self.backend.launch(&path, &self.target.args)?;

        let budget_end = Instant::now() + self.timeouts.launch_poll_budget();
        let end = budget_end.min(deadline);
        loop {
            if self.backend.window_exists(&self.target.window_title)? {
                break;
            }
            if Instant::now() + self.timeouts.launch_poll_interval() >= end {
                return Err(AutomationError::Timeout(format!(
                    "window '{}' did not appear after launch",
                    self.target.window_title
                )));
            }
            tokio::time::sleep(self.timeouts.launch_poll_interval()).await;
        }

        tokio::time::sleep(self.timeouts.after_launch()).await;
        if let Err(e) = self.backend.activate_window(&self.target.window_title) {
            warn!("cannot bring the target window to the foreground: {e}");
        }
        Ok(())
    }

    /// Bring the target into a state the locators can work against.
    pub async fn ensure_ready(&self, deadline: Instant) -> Result<(), AutomationError> {
        if self.target.relaunch {
            return self.restart(deadline).await;
        }
        // An external scheduler guarantees a fresh instance; just try to
        // bring it forward.
        if let Err(e) = self.backend.activate_window(&self.target.window_title) {
            warn!("cannot activate the target window: {e}");
        }
        Ok(())
    }
}
