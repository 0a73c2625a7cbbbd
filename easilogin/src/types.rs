//! Common types shared by the locator strategies, the retry controller and
//! the orchestrator.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AutomationError;

/// Account identifier plus secret for one sign-in.
///
/// The secret is deliberately private and excluded from `Debug` output; the
/// only way it leaves this struct is through [`Credential::secret`], which is
/// called at the single point where the located capability is invoked.
#[derive(Clone)]
pub struct Credential {
    pub account: String,
    secret: String,
}

impl Credential {
    pub fn new(account: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Masked form safe for debug logging: first and last character kept,
    /// everything in between replaced.
    pub fn masked_secret(&self) -> String {
        let n = self.secret.chars().count();
        if n < 2 {
            return "*".repeat(n.max(1));
        }
        let first = self.secret.chars().next().unwrap_or('*');
        let last = self.secret.chars().last().unwrap_or('*');
        format!("{first}{}{last}", "*".repeat(n - 2))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account", &self.account)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// One request to run the locate-and-authenticate engine.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub credential: Credential,
    /// Overrides the configured strategy priority order when present.
    pub strategy_order: Option<Vec<StrategyKind>>,
    /// Absolute time after which the whole run must terminate.
    pub deadline: Instant,
    /// Skips the warning gate (explicit manual invocation).
    pub manual: bool,
}

impl LoginRequest {
    pub fn new(credential: Credential, budget: Duration) -> Self {
        Self {
            credential,
            strategy_order: None,
            deadline: Instant::now() + budget,
            manual: false,
        }
    }
}

/// The four locator strategies, in their canonical (default) priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Automation-tree search driven by the capability probe
    Tree,
    /// Screen capture + template matching against reference images
    Template,
    /// Configured absolute screen coordinates
    Fixed,
    /// In-process injection through the helper bridge
    Inject,
}

impl StrategyKind {
    pub const DEFAULT_ORDER: [StrategyKind; 4] = [
        StrategyKind::Tree,
        StrategyKind::Template,
        StrategyKind::Fixed,
        StrategyKind::Inject,
    ];
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyKind::Tree => "tree",
            StrategyKind::Template => "template",
            StrategyKind::Fixed => "fixed",
            StrategyKind::Inject => "inject",
        };
        write!(f, "{s}")
    }
}

/// Final outcome of one strategy after the retry controller is done with it.
///
/// Carries a diagnostic string; by construction it can never carry the
/// secret, since it is only ever built from [`AutomationError`] messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "diagnostic", rename_all = "snake_case")]
pub enum StrategyOutcome {
    Success,
    NotFound(String),
    Timeout(String),
    InjectionFailed(String),
    InvocationRejected(String),
}

impl StrategyOutcome {
    pub fn from_error(err: &AutomationError) -> Self {
        match err {
            AutomationError::Timeout(msg) => StrategyOutcome::Timeout(msg.clone()),
            AutomationError::InjectionFailed(msg) => StrategyOutcome::InjectionFailed(msg.clone()),
            AutomationError::InvocationRejected(msg) => {
                StrategyOutcome::InvocationRejected(msg.clone())
            }
            other => StrategyOutcome::NotFound(other.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StrategyOutcome::Success)
    }

    /// `InjectionFailed` and `InvocationRejected` are stronger signals to
    /// fall back to the next strategy sooner than plain misses.
    pub fn is_hard_failure(&self) -> bool {
        matches!(
            self,
            StrategyOutcome::InjectionFailed(_) | StrategyOutcome::InvocationRejected(_)
        )
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            StrategyOutcome::Success => None,
            StrategyOutcome::NotFound(d)
            | StrategyOutcome::Timeout(d)
            | StrategyOutcome::InjectionFailed(d)
            | StrategyOutcome::InvocationRejected(d) => Some(d),
        }
    }
}

/// One invocation attempt of one strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub outcome: StrategyOutcome,
    pub elapsed_ms: u64,
}

/// Everything the retry controller observed for one strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyReport {
    pub strategy: StrategyKind,
    pub attempts: Vec<AttemptRecord>,
    pub final_outcome: StrategyOutcome,
    /// Set when the run deadline elapsed while this strategy was retrying;
    /// the orchestrator must not fall through to further strategies.
    pub deadline_elapsed: bool,
}

/// Decision produced by the warning gate, consumed once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningDecision {
    Proceed,
    Deferred(Duration),
    Cancelled,
}

/// Final outcome of one `run_login` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    /// The one-shot skip flag suppressed this run; not a failure.
    Suppressed,
    /// The user cancelled at the warning gate.
    Cancelled,
    /// A run was already in flight; the request was rejected, not queued.
    Busy,
    /// The request deadline elapsed before any strategy succeeded.
    Timeout,
    /// All configured strategies were exhausted.
    Failed,
}

/// One structured record per run, for external observability collaborators.
/// Excludes the secret at every stage by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    /// The strategy that produced `Success`, when there is one.
    pub chosen_strategy: Option<StrategyKind>,
    pub strategies: Vec<StrategyReport>,
    pub last_diagnostic: Option<String>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub(crate) fn terminal(run_id: Uuid, outcome: RunOutcome, started: Instant) -> Self {
        Self {
            run_id,
            outcome,
            chosen_strategy: None,
            strategies: Vec::new(),
            last_diagnostic: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Raw RGBA screenshot of one monitor
#[derive(Debug, Clone)]
pub struct ScreenshotResult {
    pub image_data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}
