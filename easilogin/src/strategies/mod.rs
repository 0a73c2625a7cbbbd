//! The four locator strategies behind one polymorphic contract.
//!
//! `locate` returns an opaque login-capable handle or fails with an error
//! the retry controller maps onto a [`StrategyOutcome`]. Handles never
//! outlive one locate-and-invoke cycle.
//!
//! [`StrategyOutcome`]: crate::types::StrategyOutcome

use std::sync::Arc;
use std::time::Instant;

use crate::capability::LoginCapable;
use crate::config::Config;
use crate::errors::AutomationError;
use crate::platforms::AutomationBackend;
use crate::types::StrategyKind;

pub mod fixed;
pub mod inject;
pub mod template;
pub mod tree;

pub use fixed::FixedPositionStrategy;
pub use inject::InjectStrategy;
pub use template::TemplateMatchStrategy;
pub use tree::TreeSearchStrategy;

/// Shared inputs for one locate attempt.
pub struct LocateContext {
    pub backend: Arc<dyn AutomationBackend>,
    pub config: Arc<Config>,
    /// Deadline of the whole run; every blocking step inside a strategy is
    /// bounded by it.
    pub deadline: Instant,
}

impl LocateContext {
    /// Clipboard-paste input is used on short screens, where IME popups can
    /// cover the credential fields.
    pub fn compat_input(&self) -> bool {
        if self.config.force_compat_input {
            return true;
        }
        match (self.backend.screen_size(), self.backend.scale_factor()) {
            (Ok((_, h)), Ok(scale)) if scale > 0.0 => (h as f64 / scale) < 720.0,
            _ => false,
        }
    }
}

/// An opaque reference to a discovered login-capable target.
pub type Handle = Box<dyn LoginCapable>;

#[async_trait::async_trait]
pub trait LocatorStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// `Locate(target) -> Handle | NotFound`.
    async fn locate(&self, ctx: &LocateContext) -> Result<Handle, AutomationError>;
}

/// Default factory mapping a strategy kind to its implementation.
pub fn build(kind: StrategyKind) -> Box<dyn LocatorStrategy> {
    match kind {
        StrategyKind::Tree => Box::new(TreeSearchStrategy),
        StrategyKind::Template => Box::new(TemplateMatchStrategy),
        StrategyKind::Fixed => Box::new(FixedPositionStrategy),
        StrategyKind::Inject => Box::new(InjectStrategy),
    }
}
