//! Image-template-match locator: capture the screen and find the login
//! controls by normalized cross-correlation against reference images.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{GrayImage, ImageBuffer, Luma};
use tracing::{debug, info, warn};

use crate::capability::LoginCapable;
use crate::config::{Config, TemplateConfig};
use crate::errors::AutomationError;
use crate::platforms::AutomationBackend;
use crate::strategies::{Handle, LocateContext, LocatorStrategy};
use crate::types::{Credential, ScreenshotResult, StrategyKind};

pub struct TemplateMatchStrategy;

/// One accepted match, in screen pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TemplateMatch {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub score: f64,
}

impl TemplateMatch {
    pub fn center(&self) -> (i32, i32) {
        (
            (self.x + self.width / 2) as i32,
            (self.y + self.height / 2) as i32,
        )
    }
}

pub(crate) fn grayscale(shot: &ScreenshotResult) -> Result<GrayImage, AutomationError> {
    let rgba: ImageBuffer<image::Rgba<u8>, _> =
        ImageBuffer::from_raw(shot.width, shot.height, shot.image_data.clone()).ok_or_else(
            || AutomationError::PlatformError("screenshot buffer size mismatch".to_string()),
        )?;
    let mut gray = GrayImage::new(shot.width, shot.height);
    for (x, y, p) in rgba.enumerate_pixels() {
        let l = 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64;
        gray.put_pixel(x, y, Luma([l as u8]));
    }
    Ok(gray)
}

fn ncc_at(
    hay: &GrayImage,
    needle: &[f64],
    needle_norm: f64,
    nw: u32,
    nh: u32,
    ox: u32,
    oy: u32,
) -> f64 {
    let n = (nw * nh) as f64;
    let mut sum = 0.0;
    for y in 0..nh {
        for x in 0..nw {
            sum += hay.get_pixel(ox + x, oy + y)[0] as f64;
        }
    }
    let mean = sum / n;

    let mut dot = 0.0;
    let mut norm = 0.0;
    let mut i = 0usize;
    for y in 0..nh {
        for x in 0..nw {
            let v = hay.get_pixel(ox + x, oy + y)[0] as f64 - mean;
            dot += v * needle[i];
            norm += v * v;
            i += 1;
        }
    }
    if norm <= f64::EPSILON || needle_norm <= f64::EPSILON {
        return 0.0;
    }
    dot / (norm.sqrt() * needle_norm)
}

/// Best zero-mean NCC match of `needle` inside `hay` scoring at or above
/// `threshold`; `None` otherwise. Among qualifying positions the highest
/// score wins; exact ties go to the top-left-most position (y, then x).
///
/// A coarse stride pass narrows candidates before exact scoring, so large
/// screens stay tractable. High-frequency templates can decorrelate to
/// nothing within one stride, hiding an off-grid occurrence from the
/// coarse samples, so a miss is always confirmed by an exhaustive scan
/// before `None` is returned.
pub(crate) fn best_match(
    hay: &GrayImage,
    needle_img: &GrayImage,
    threshold: f64,
) -> Option<TemplateMatch> {
    let (hw, hh) = hay.dimensions();
    let (nw, nh) = needle_img.dimensions();
    if nw == 0 || nh == 0 || nw > hw || nh > hh {
        return None;
    }

    let n = (nw * nh) as f64;
    let mean: f64 = needle_img.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    let needle: Vec<f64> = needle_img.pixels().map(|p| p[0] as f64 - mean).collect();
    let needle_norm: f64 = needle.iter().map(|v| v * v).sum::<f64>().sqrt();

    let stride = (nw.min(nh) / 8).max(1);
    let coarse_floor = (threshold - 0.15).max(0.0);

    let mut best: Option<TemplateMatch> = None;
    let consider = |best: &mut Option<TemplateMatch>, ox: u32, oy: u32| {
        let score = ncc_at(hay, &needle, needle_norm, nw, nh, ox, oy);
        if score < threshold {
            return;
        }
        let candidate = TemplateMatch {
            x: ox,
            y: oy,
            width: nw,
            height: nh,
            score,
        };
        *best = match best.take() {
            None => Some(candidate),
            Some(b) if candidate.score > b.score => Some(candidate),
            Some(b) if candidate.score == b.score && (oy, ox) < (b.y, b.x) => Some(candidate),
            keep => keep,
        };
    };

    if stride > 1 {
        let mut seeds = Vec::new();
        let mut oy = 0;
        while oy <= hh - nh {
            let mut ox = 0;
            while ox <= hw - nw {
                if ncc_at(hay, &needle, needle_norm, nw, nh, ox, oy) >= coarse_floor {
                    seeds.push((ox, oy));
                }
                ox += stride;
            }
            oy += stride;
        }

        for (sx, sy) in seeds {
            let x0 = sx.saturating_sub(stride);
            let y0 = sy.saturating_sub(stride);
            let x1 = (sx + stride).min(hw - nw);
            let y1 = (sy + stride).min(hh - nh);
            for oy in y0..=y1 {
                for ox in x0..=x1 {
                    consider(&mut best, ox, oy);
                }
            }
        }
    }

    // Only a full scan can prove a miss; the seeded pass alone cannot.
    if best.is_none() {
        for oy in 0..=(hh - nh) {
            for ox in 0..=(hw - nw) {
                consider(&mut best, ox, oy);
            }
        }
    }
    best
}

fn load_template(path: &std::path::Path) -> Result<GrayImage, AutomationError> {
    let img = image::open(path).map_err(|e| {
        AutomationError::InvalidArgument(format!(
            "cannot load template image {}: {e}",
            path.display()
        ))
    })?;
    Ok(img.to_luma8())
}

fn scaled(needle: &GrayImage, scale: f64) -> GrayImage {
    if (scale - 1.0).abs() < 1e-9 {
        return needle.clone();
    }
    let w = ((needle.width() as f64 * scale).round() as u32).max(1);
    let h = ((needle.height() as f64 * scale).round() as u32).max(1);
    image::imageops::resize(needle, w, h, FilterType::Triangle)
}

/// Try every configured scale multiplier for every candidate template and
/// keep the overall best qualifying match.
fn match_any(
    hay: &GrayImage,
    templates: &[(GrayImage, f64)],
    threshold: f64,
) -> Option<(TemplateMatch, f64)> {
    let mut best: Option<(TemplateMatch, f64)> = None;
    for (needle, scale) in templates {
        if let Some(m) = best_match(hay, needle, threshold) {
            best = match best {
                None => Some((m, *scale)),
                Some((b, _)) if m.score > b.score => Some((m, *scale)),
                keep => keep,
            };
        }
    }
    best
}

#[async_trait]
impl LocatorStrategy for TemplateMatchStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Template
    }

    async fn locate(&self, ctx: &LocateContext) -> Result<Handle, AutomationError> {
        let tpl = &ctx.config.template;
        let primary = load_template(&tpl.button_image)?;
        let selected = tpl
            .button_selected_image
            .as_deref()
            .map(load_template)
            .transpose()?;

        // Pre-scale all candidates once
        let mut candidates: Vec<(GrayImage, f64)> = Vec::new();
        for &s in &tpl.scales {
            candidates.push((scaled(&primary, s), s));
        }
        if let Some(sel) = &selected {
            for &s in &tpl.scales {
                candidates.push((scaled(sel, s), s));
            }
        }

        if !ctx.config.direct_login {
            let screen = ctx.backend.screen_size()?;
            let scale = ctx.backend.scale_factor().unwrap_or(1.0);
            let p = super::fixed::scale_from_bottom_left(
                &ctx.config.fixed,
                screen,
                scale,
                ctx.config.fixed.enter_login,
            );
            info!("clicking into the login dialog");
            ctx.backend.click(p.0, p.1)?;
            tokio::time::sleep(ctx.config.timeouts.enter_login_ui()).await;
        }

        let budget_end = Instant::now() + tpl.search_budget();
        let end = budget_end.min(ctx.deadline);

        loop {
            let shot = ctx.backend.capture_screen().await?;
            let hay = grayscale(&shot)?;
            if let Some((m, scale)) = match_any(&hay, &candidates, tpl.confidence_threshold) {
                debug!(x = m.x, y = m.y, score = m.score, scale, "template matched");
                return Ok(Box::new(TemplateHandle {
                    backend: ctx.backend.clone(),
                    config: ctx.config.clone(),
                    compat: ctx.compat_input(),
                    anchor: m.center(),
                    scale,
                }));
            }
            if Instant::now() + tpl.poll_interval() >= end {
                return Err(AutomationError::ElementNotFound(format!(
                    "no template match at or above confidence {} within the search budget",
                    tpl.confidence_threshold
                )));
            }
            tokio::time::sleep(tpl.poll_interval()).await;
        }
    }
}

struct TemplateHandle {
    backend: Arc<dyn AutomationBackend>,
    config: Arc<Config>,
    compat: bool,
    /// Center of the matched account-login tab button.
    anchor: (i32, i32),
    /// Scale multiplier the match was accepted at; field offsets scale
    /// with it.
    scale: f64,
}

impl TemplateHandle {
    fn offset_point(&self, dy: i32) -> (i32, i32) {
        (
            self.anchor.0,
            self.anchor.1 + (dy as f64 * self.scale) as i32,
        )
    }

    async fn click_checkbox(&self, tpl: &TemplateConfig) -> Result<(), AutomationError> {
        let Some(path) = &tpl.checkbox_image else {
            return Ok(());
        };
        let needle = load_template(path)?;
        let shot = self.backend.capture_screen().await?;
        let hay = grayscale(&shot)?;
        let scaled_needle = scaled(&needle, self.scale);
        match best_match(&hay, &scaled_needle, tpl.confidence_threshold) {
            Some(m) => {
                let (cx, cy) = m.center();
                self.backend.click(cx, cy)?;
                Ok(())
            }
            None => Err(AutomationError::ElementNotFound(
                "agreement checkbox template not found on screen".to_string(),
            )),
        }
    }
}

#[async_trait]
impl LoginCapable for TemplateHandle {
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
        let tpl = &self.config.template;

        info!("clicking the account-login tab");
        self.backend.click(self.anchor.0, self.anchor.1)?;
        tokio::time::sleep(timeouts.switch_tab()).await;

        debug!(account = %credential.account, "filling account");
        let p = self.offset_point(tpl.account_offset_y);
        self.backend.click(p.0, p.1)?;
        self.backend.replace_text(&credential.account, self.compat)?;

        debug!(secret = %credential.masked_secret(), "filling secret");
        let p = self.offset_point(tpl.password_offset_y);
        self.backend.click(p.0, p.1)?;
        self.backend.replace_text(credential.secret(), self.compat)?;

        if let Err(e) = self.click_checkbox(tpl).await {
            warn!("agreement checkbox: {e}");
            return Err(e);
        }

        self.backend.press_enter()?;
        Ok(())
    }
}
