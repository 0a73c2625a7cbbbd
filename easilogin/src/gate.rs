//! Warning gate and one-shot skip flag, the two suppression mechanisms in
//! front of every scheduled run.
//!
//! The gate shows a countdown prompt before touching the target: proceed,
//! defer (bounded times), or cancel. The skip flag is a one-shot latch the
//! user arms to suppress exactly the next run; it self-clears on
//! consumption and can be backed by a file so it survives across process
//! invocations.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::WarningConfig;
use crate::errors::AutomationError;
use crate::types::WarningDecision;

/// UI shown by the gate. Implementations block until the user decides or
/// the countdown runs out (which counts as proceed); the gate calls them on
/// a blocking thread.
pub trait WarningPrompt: Send + Sync {
    fn present(
        &self,
        defer_allowed: bool,
        countdown: Duration,
    ) -> Result<WarningDecision, AutomationError>;
}

/// Prompt used when no UI is wired up: always proceed.
pub struct AutoProceedPrompt;

impl WarningPrompt for AutoProceedPrompt {
    fn present(
        &self,
        _defer_allowed: bool,
        _countdown: Duration,
    ) -> Result<WarningDecision, AutomationError> {
        Ok(WarningDecision::Proceed)
    }
}

pub struct WarningGate {
    config: WarningConfig,
    prompt: Arc<dyn WarningPrompt>,
}

impl WarningGate {
    pub fn new(config: WarningConfig, prompt: Arc<dyn WarningPrompt>) -> Self {
        Self { config, prompt }
    }

    /// Block until the gate clears or the user cancels.
    ///
    /// Defers are bounded by `max_defers`; after the limit the prompt is
    /// shown one final time without the defer option. A prompt failure is
    /// treated as proceed so a broken UI cannot wedge the scheduled run.
    /// Sleeps never pass `deadline`; once it elapses the gate clears and
    /// leaves the timeout to the caller's deadline checks.
    pub async fn await_clearance(&self, deadline: Instant) -> WarningDecision {
        if !self.config.enabled {
            return WarningDecision::Proceed;
        }

        let mut defers = 0u32;
        loop {
            if Instant::now() >= deadline {
                return WarningDecision::Proceed;
            }

            let defer_allowed = defers < self.config.max_defers;
            let prompt = self.prompt.clone();
            let countdown = self.config.prompt_timeout();
            let decision = tokio::task::spawn_blocking(move || {
                prompt.present(defer_allowed, countdown)
            })
            .await;

            match decision {
                Ok(Ok(WarningDecision::Proceed)) => return WarningDecision::Proceed,
                Ok(Ok(WarningDecision::Cancelled)) => return WarningDecision::Cancelled,
                Ok(Ok(WarningDecision::Deferred(requested))) => {
                    if !defer_allowed {
                        // The defer bound is enforced here, not left to
                        // prompt discipline.
                        warn!("prompt deferred past the limit, proceeding");
                        return WarningDecision::Proceed;
                    }
                    defers += 1;
                    let pause = if requested.is_zero() {
                        self.config.defer_delay()
                    } else {
                        requested
                    };
                    let now = Instant::now();
                    let pause = pause.min(deadline.saturating_duration_since(now));
                    info!(defers, ?pause, "run deferred at the warning gate");
                    tokio::time::sleep(pause).await;
                }
                Ok(Err(e)) => {
                    warn!("warning prompt failed, proceeding: {e}");
                    return WarningDecision::Proceed;
                }
                Err(e) => {
                    warn!("warning prompt panicked, proceeding: {e}");
                    return WarningDecision::Proceed;
                }
            }
        }
    }
}

/// One-shot latch suppressing exactly the next run.
pub struct SkipFlag {
    armed: AtomicBool,
    backing: Option<PathBuf>,
}

impl SkipFlag {
    /// A backing file that already exists on disk arms the flag, so a skip
    /// issued by a previous process invocation still applies.
    pub fn new(backing: Option<PathBuf>) -> Self {
        let armed = backing.as_deref().is_some_and(|p| p.exists());
        Self {
            armed: AtomicBool::new(armed),
            backing,
        }
    }

    pub fn set(&self) {
        self.armed.store(true, Ordering::SeqCst);
        if let Some(path) = &self.backing {
            if let Err(e) = std::fs::write(path, b"skip-once\n") {
                warn!("cannot persist skip flag to {}: {e}", path.display());
            }
        }
    }

    /// Atomically consume the flag. Exactly one caller observes `true` per
    /// arming, even under concurrent runs.
    pub fn check_and_clear(&self) -> bool {
        let was_armed = self.armed.swap(false, Ordering::SeqCst);
        if was_armed {
            if let Some(path) = &self.backing {
                if let Err(e) = std::fs::remove_file(path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("cannot remove skip flag file {}: {e}", path.display());
                    }
                }
            }
        }
        was_armed
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}
