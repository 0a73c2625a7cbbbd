//! Fixed-position locator: configured absolute screen coordinates mapped
//! directly to synthetic input. O(1) and brittle; intended as a fallback
//! where neither the automation tree nor template matching is available.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::capability::LoginCapable;
use crate::config::{Config, FixedConfig};
use crate::errors::AutomationError;
use crate::platforms::AutomationBackend;
use crate::strategies::{Handle, LocateContext, LocatorStrategy};
use crate::types::{Credential, StrategyKind};

pub struct FixedPositionStrategy;

/// Rescale a coordinate measured inside the centered login dialog at the
/// base resolution onto the current screen.
///
/// The dialog keeps its content size and stays centered, so a point is
/// mapped through its dialog-relative offset:
/// relative = p - top_left(base), then scaled and re-anchored at the
/// dialog's top-left on the current screen.
pub(crate) fn scale_in_window(
    cfg: &FixedConfig,
    screen: (u32, u32),
    scale: f64,
    p: (i32, i32),
) -> (i32, i32) {
    if !cfg.enable_scaling {
        return p;
    }
    let (win_w, win_h) = (cfg.login_window_size.0 as f64, cfg.login_window_size.1 as f64);
    let (base_w, base_h) = (cfg.base_size.0 as f64, cfg.base_size.1 as f64);
    let (screen_w, screen_h) = (screen.0 as f64, screen.1 as f64);

    let top_left_x = (base_w - win_w) / 2.0;
    let top_left_y = (base_h - win_h) / 2.0;
    let scaled_top_left_x = (screen_w - win_w * scale) / 2.0;
    let scaled_top_left_y = (screen_h - win_h * scale) / 2.0;

    let x = (p.0 as f64 - top_left_x) * scale + scaled_top_left_x;
    let y = (p.1 as f64 - top_left_y) * scale + scaled_top_left_y;
    (x as i32, y as i32)
}

/// The enter-login button lives in the whiteboard view, anchored to the
/// bottom-left corner rather than the centered dialog.
pub(crate) fn scale_from_bottom_left(
    cfg: &FixedConfig,
    screen: (u32, u32),
    scale: f64,
    p: (i32, i32),
) -> (i32, i32) {
    if !cfg.enable_scaling {
        return p;
    }
    let x = p.0 as f64 * scale;
    let y = screen.1 as f64 - (cfg.base_size.1 as f64 - p.1 as f64) * scale;
    (x as i32, y as i32)
}

fn in_bounds(p: (i32, i32), screen: (u32, u32)) -> bool {
    p.0 >= 0 && p.1 >= 0 && (p.0 as u32) < screen.0 && (p.1 as u32) < screen.1
}

#[async_trait]
impl LocatorStrategy for FixedPositionStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fixed
    }

    async fn locate(&self, ctx: &LocateContext) -> Result<Handle, AutomationError> {
        let screen = ctx.backend.screen_size()?;
        let scale = ctx.backend.scale_factor().unwrap_or(1.0);
        let fixed = &ctx.config.fixed;

        let enter_login = scale_from_bottom_left(fixed, screen, scale, fixed.enter_login);
        let points = FixedPoints {
            enter_login,
            account_tab: scale_in_window(fixed, screen, scale, fixed.account_tab),
            account_input: scale_in_window(fixed, screen, scale, fixed.account_input),
            password_input: scale_in_window(fixed, screen, scale, fixed.password_input),
            agreement_checkbox: scale_in_window(fixed, screen, scale, fixed.agreement_checkbox),
        };

        let dialog_points = [
            points.account_tab,
            points.account_input,
            points.password_input,
            points.agreement_checkbox,
        ];
        for p in dialog_points {
            if !in_bounds(p, screen) {
                // No search happened and none would help; the configuration
                // does not fit this display.
                return Err(AutomationError::InvalidArgument(format!(
                    "configured coordinate ({}, {}) lies outside screen bounds {}x{}",
                    p.0, p.1, screen.0, screen.1
                )));
            }
        }
        if !ctx.config.direct_login && !in_bounds(points.enter_login, screen) {
            return Err(AutomationError::InvalidArgument(format!(
                "enter-login coordinate ({}, {}) lies outside screen bounds {}x{}",
                points.enter_login.0, points.enter_login.1, screen.0, screen.1
            )));
        }

        debug!(
            account_input = ?points.account_input,
            password_input = ?points.password_input,
            "fixed-position points resolved"
        );
        Ok(Box::new(FixedHandle {
            backend: ctx.backend.clone(),
            config: ctx.config.clone(),
            compat: ctx.compat_input(),
            points,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
struct FixedPoints {
    enter_login: (i32, i32),
    account_tab: (i32, i32),
    account_input: (i32, i32),
    password_input: (i32, i32),
    agreement_checkbox: (i32, i32),
}

struct FixedHandle {
    backend: Arc<dyn AutomationBackend>,
    config: Arc<Config>,
    compat: bool,
    points: FixedPoints,
}

#[async_trait]
impl LoginCapable for FixedHandle {
    async fn login(
        &self,
        credential: &Credential,
        context: Option<&str>,
    ) -> Result<(), AutomationError> {
        if context.is_some() {
            return Err(AutomationError::UnsupportedOperation(
                "non-default login context is out of scope".to_string(),
            ));
        }
        let timeouts = &self.config.timeouts;

        if !self.config.direct_login {
            info!("clicking into the login dialog");
            self.backend
                .click(self.points.enter_login.0, self.points.enter_login.1)?;
            tokio::time::sleep(timeouts.enter_login_ui()).await;
        }

        info!("switching to the account tab");
        self.backend
            .click(self.points.account_tab.0, self.points.account_tab.1)?;
        tokio::time::sleep(timeouts.switch_tab()).await;

        debug!(account = %credential.account, "filling account");
        self.backend
            .click(self.points.account_input.0, self.points.account_input.1)?;
        self.backend.replace_text(&credential.account, self.compat)?;

        debug!(secret = %credential.masked_secret(), "filling secret");
        self.backend
            .click(self.points.password_input.0, self.points.password_input.1)?;
        self.backend.replace_text(credential.secret(), self.compat)?;

        self.backend.click(
            self.points.agreement_checkbox.0,
            self.points.agreement_checkbox.1,
        )?;
        self.backend.press_enter()?;
        Ok(())
    }
}
