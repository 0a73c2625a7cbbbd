//! Engine configuration, produced by the external settings component.
//!
//! Serde JSON with full defaults so a missing or partial file still yields a
//! runnable configuration. Durations are stored as milliseconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::AutomationError;
use crate::types::StrategyKind;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub strategies: StrategiesConfig,
    pub fixed: FixedConfig,
    pub template: TemplateConfig,
    pub inject: InjectConfig,
    pub retry: RetryConfig,
    pub warning: WarningConfig,
    pub target: TargetConfig,
    pub timeouts: TimeoutConfig,
    /// The target opens straight into its login dialog instead of the
    /// whiteboard view (launch argument dependent).
    pub direct_login: bool,
    /// Force clipboard-paste input even on tall screens.
    pub force_compat_input: bool,
    /// Backing file for the one-shot skip flag, so a skip issued by one
    /// process invocation suppresses the next scheduled one.
    pub skip_flag_path: Option<PathBuf>,
    /// When set, one JSON line per run is appended here.
    pub report_path: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, AutomationError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AutomationError::InvalidArgument(format!(
                "cannot read config {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AutomationError::InvalidArgument(format!(
                "cannot parse config {}: {e}",
                path.display()
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    /// Priority order; first success short-circuits the rest.
    pub order: Vec<StrategyKind>,
    /// Strategies removed from the order entirely.
    pub disabled: Vec<StrategyKind>,
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        Self {
            order: StrategyKind::DEFAULT_ORDER.to_vec(),
            disabled: Vec::new(),
        }
    }
}

/// Absolute screen coordinates of the login controls, with optional
/// rescaling from the resolution they were measured on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedConfig {
    /// Button that opens the login dialog from the whiteboard view,
    /// measured from the bottom-left corner region.
    pub enter_login: (i32, i32),
    pub account_tab: (i32, i32),
    pub account_input: (i32, i32),
    pub password_input: (i32, i32),
    pub agreement_checkbox: (i32, i32),
    /// Resolution the coordinates above were measured on.
    pub base_size: (u32, u32),
    /// Size of the centered login dialog at the base resolution.
    pub login_window_size: (u32, u32),
    /// Rescale dialog-relative coordinates when the current resolution
    /// differs from `base_size`.
    pub enable_scaling: bool,
}

impl Default for FixedConfig {
    fn default() -> Self {
        Self {
            enter_login: (172, 1044),
            account_tab: (830, 330),
            account_input: (960, 430),
            password_input: (960, 500),
            agreement_checkbox: (800, 560),
            base_size: (1920, 1080),
            login_window_size: (880, 660),
            enable_scaling: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Reference image of the account-login tab button.
    pub button_image: PathBuf,
    /// Variant of the button in its already-selected state; tried when the
    /// primary image misses (the tab may already be active).
    pub button_selected_image: Option<PathBuf>,
    /// Reference image of the user-agreement checkbox.
    pub checkbox_image: Option<PathBuf>,
    /// Minimum normalized similarity score for a match. Conservative by
    /// default to avoid false positives on visually similar controls.
    pub confidence_threshold: f64,
    /// Display scale multipliers to retry at before giving up.
    pub scales: Vec<f64>,
    /// Vertical offsets from the matched anchor down to the account and
    /// password fields, at scale 1.0.
    pub account_offset_y: i32,
    pub password_offset_y: i32,
    pub search_budget_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            button_image: PathBuf::from("resources/button.png"),
            button_selected_image: Some(PathBuf::from("resources/button_selected.png")),
            checkbox_image: Some(PathBuf::from("resources/checkbox.png")),
            confidence_threshold: 0.8,
            scales: vec![1.0, 1.25, 1.5],
            account_offset_y: 70,
            password_offset_y: 134,
            search_budget_ms: 10_000,
            poll_interval_ms: 500,
        }
    }
}

impl TemplateConfig {
    pub fn search_budget(&self) -> Duration {
        Duration::from_millis(self.search_budget_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectConfig {
    /// Launcher executable that loads the helper module into the target.
    pub injector_path: Option<PathBuf>,
    /// Helper module handed to the launcher.
    pub helper_path: Option<PathBuf>,
    /// Substring identifying the target's main process.
    pub process_needle: String,
    pub attach_timeout_ms: u64,
    /// Per-call reply timeout for dispatches onto the target's UI thread.
    /// A missed reply here is InjectionFailed, never assumed success.
    pub call_timeout_ms: u64,
    /// How long to wait for the login window after the out-of-band trigger.
    pub window_wait_ms: u64,
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            injector_path: None,
            helper_path: None,
            process_needle: "easinote".into(),
            attach_timeout_ms: 10_000,
            call_timeout_ms: 5_000,
            window_wait_ms: 8_000,
        }
    }
}

impl InjectConfig {
    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn window_wait(&self) -> Duration {
        Duration::from_millis(self.window_wait_ms)
    }

    pub fn is_configured(&self) -> bool {
        self.injector_path.is_some() && self.helper_path.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Lower attempt cap for hard failures (injection/invocation), which
    /// signal that falling back to the next strategy is more promising.
    pub hard_failure_cap: u32,
    pub delay_ms: u64,
    pub backoff: BackoffKind,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            hard_failure_cap: 2,
            delay_ms: 2_000,
            backoff: BackoffKind::Fixed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarningConfig {
    pub enabled: bool,
    /// Countdown shown by the prompt before it auto-proceeds.
    pub prompt_timeout_ms: u64,
    pub max_defers: u32,
    pub defer_delay_ms: u64,
}

impl Default for WarningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prompt_timeout_ms: 30_000,
            max_defers: 3,
            defer_delay_ms: 60_000,
        }
    }
}

impl WarningConfig {
    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_millis(self.prompt_timeout_ms)
    }

    pub fn defer_delay(&self) -> Duration {
        Duration::from_millis(self.defer_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Executable path; `None` means resolve from the registry, falling
    /// back to the stock install directory.
    pub path: Option<PathBuf>,
    pub args: Vec<String>,
    pub process_name: String,
    pub window_title: String,
    /// Also terminate the background agent process when restarting.
    pub kill_agent: bool,
    pub agent_process_name: String,
    /// Restart the target before locating; disable when an external
    /// scheduler already guarantees a fresh instance.
    pub relaunch: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            path: None,
            args: Vec::new(),
            process_name: "EasiNote.exe".into(),
            window_title: "希沃白板".into(),
            kill_agent: false,
            agent_process_name: "EasiAgent.exe".into(),
            relaunch: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-run budget used when the caller does not set a deadline.
    pub run_budget_ms: u64,
    /// Per-strategy locate budget for a single attempt.
    pub locate_ms: u64,
    /// Wait after terminating the old target process.
    pub terminate_ms: u64,
    pub launch_poll_interval_ms: u64,
    pub launch_poll_budget_ms: u64,
    /// Settle time after the window first appears.
    pub after_launch_ms: u64,
    /// Wait after clicking into the login dialog.
    pub enter_login_ui_ms: u64,
    /// Wait after switching to the account tab.
    pub switch_tab_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            run_budget_ms: 180_000,
            locate_ms: 15_000,
            terminate_ms: 2_000,
            launch_poll_interval_ms: 1_000,
            launch_poll_budget_ms: 60_000,
            after_launch_ms: 3_000,
            enter_login_ui_ms: 2_000,
            switch_tab_ms: 1_000,
        }
    }
}

impl TimeoutConfig {
    pub fn run_budget(&self) -> Duration {
        Duration::from_millis(self.run_budget_ms)
    }

    pub fn locate(&self) -> Duration {
        Duration::from_millis(self.locate_ms)
    }

    pub fn terminate(&self) -> Duration {
        Duration::from_millis(self.terminate_ms)
    }

    pub fn launch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.launch_poll_interval_ms)
    }

    pub fn launch_poll_budget(&self) -> Duration {
        Duration::from_millis(self.launch_poll_budget_ms)
    }

    pub fn after_launch(&self) -> Duration {
        Duration::from_millis(self.after_launch_ms)
    }

    pub fn enter_login_ui(&self) -> Duration {
        Duration::from_millis(self.enter_login_ui_ms)
    }

    pub fn switch_tab(&self) -> Duration {
        Duration::from_millis(self.switch_tab_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let cfg = Config::default();
        assert_eq!(cfg.strategies.order, StrategyKind::DEFAULT_ORDER.to_vec());
        assert!(cfg.template.confidence_threshold >= 0.8);
        assert_eq!(cfg.template.scales, vec![1.0, 1.25, 1.5]);
        assert!(cfg.retry.hard_failure_cap <= cfg.retry.max_attempts);
        assert!(!cfg.inject.is_configured());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let cfg: Config = serde_json::from_str(
            r#"{
                "strategies": { "order": ["template", "fixed"] },
                "template": { "confidence_threshold": 0.9 }
            }"#,
        )
        .unwrap();
        assert_eq!(
            cfg.strategies.order,
            vec![StrategyKind::Template, StrategyKind::Fixed]
        );
        assert_eq!(cfg.template.confidence_threshold, 0.9);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.target.window_title, "希沃白板");
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = Config::default();
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.strategies.order, cfg.strategies.order);
        assert_eq!(back.timeouts.run_budget_ms, cfg.timeouts.run_budget_ms);
    }
}
