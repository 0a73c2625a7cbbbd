//! Retry controller: drives one strategy through bounded attempts and
//! produces the [`StrategyReport`] the orchestrator decides on.
//!
//! Transient misses (not found, per-attempt timeout) retry up to the
//! configured cap with a delay between attempts. Hard failures (injection,
//! invocation rejection) get a lower cap, and invalid configuration fails
//! fast with no retry at all. The run deadline is checked before every
//! attempt; once it elapses the report says so and no further attempt runs.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{BackoffKind, RetryConfig};
use crate::strategies::{LocateContext, LocatorStrategy};
use crate::types::{AttemptRecord, Credential, StrategyOutcome, StrategyReport};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub hard_failure_cap: u32,
    pub delay: Duration,
    pub backoff: BackoffKind,
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            hard_failure_cap: cfg.hard_failure_cap.max(1),
            delay: Duration::from_millis(cfg.delay_ms),
            backoff: cfg.backoff,
        }
    }

    /// Delay to sleep after the given 1-based attempt number.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffKind::Fixed => self.delay,
            BackoffKind::Exponential => self.delay * 2u32.saturating_pow(attempt.saturating_sub(1)),
        }
    }
}

/// Run one strategy to its final outcome.
///
/// `locate_budget` bounds a single attempt (locate plus invoke); the run
/// deadline in `ctx` bounds everything.
pub async fn run_strategy(
    strategy: &dyn LocatorStrategy,
    ctx: &LocateContext,
    credential: &Credential,
    policy: &RetryPolicy,
    locate_budget: Duration,
) -> StrategyReport {
    let kind = strategy.kind();
    let mut attempts = Vec::new();
    let mut hard_failures = 0u32;
    let mut deadline_elapsed = false;
    let mut final_outcome = StrategyOutcome::Timeout("run deadline elapsed".to_string());

    for attempt in 1..=policy.max_attempts {
        let now = Instant::now();
        if now >= ctx.deadline {
            deadline_elapsed = true;
            break;
        }
        let budget = locate_budget.min(ctx.deadline - now);

        debug!(strategy = %kind, attempt, "starting attempt");
        let started = Instant::now();
        let result = tokio::time::timeout(budget, async {
            let handle = strategy.locate(ctx).await?;
            handle.login(credential, None).await
        })
        .await;
        let elapsed = started.elapsed();

        let (outcome, retryable) = match result {
            Ok(Ok(())) => (StrategyOutcome::Success, false),
            Ok(Err(err)) => {
                warn!(strategy = %kind, attempt, "attempt failed: {err}");
                (StrategyOutcome::from_error(&err), err.is_retryable())
            }
            Err(_) if Instant::now() >= ctx.deadline => {
                deadline_elapsed = true;
                (
                    StrategyOutcome::Timeout("run deadline elapsed mid-attempt".to_string()),
                    false,
                )
            }
            Err(_) => (
                StrategyOutcome::Timeout(format!("attempt exceeded its {budget:?} budget")),
                true,
            ),
        };

        attempts.push(AttemptRecord {
            attempt,
            outcome: outcome.clone(),
            elapsed_ms: elapsed.as_millis() as u64,
        });

        if outcome.is_success() {
            info!(strategy = %kind, attempt, "strategy succeeded");
            final_outcome = outcome;
            break;
        }
        if outcome.is_hard_failure() {
            hard_failures += 1;
        }

        final_outcome = outcome;
        if deadline_elapsed
            || !retryable
            || hard_failures >= policy.hard_failure_cap
            || attempt == policy.max_attempts
        {
            break;
        }

        let now = Instant::now();
        if now >= ctx.deadline {
            deadline_elapsed = true;
            break;
        }
        let pause = policy.delay_for(attempt).min(ctx.deadline - now);
        tokio::time::sleep(pause).await;
    }

    StrategyReport {
        strategy: kind,
        attempts,
        final_outcome,
        deadline_elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::LoginCapable;
    use crate::config::Config;
    use crate::element::UiElement;
    use crate::errors::AutomationError;
    use crate::platforms::AutomationBackend;
    use crate::strategies::Handle;
    use crate::types::{ScreenshotResult, StrategyKind};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    struct NullBackend;

    #[async_trait]
    impl AutomationBackend for NullBackend {
        fn screen_size(&self) -> Result<(u32, u32), AutomationError> {
            Ok((1920, 1080))
        }
        fn scale_factor(&self) -> Result<f64, AutomationError> {
            Ok(1.0)
        }
        async fn capture_screen(&self) -> Result<ScreenshotResult, AutomationError> {
            Err(AutomationError::UnsupportedOperation("capture".into()))
        }
        fn click(&self, _x: i32, _y: i32) -> Result<(), AutomationError> {
            Ok(())
        }
        fn replace_text(&self, _text: &str, _compat: bool) -> Result<(), AutomationError> {
            Ok(())
        }
        fn press_enter(&self) -> Result<(), AutomationError> {
            Ok(())
        }
        fn window_root(
            &self,
            _pid: Option<u32>,
            _title: &str,
        ) -> Result<UiElement, AutomationError> {
            Err(AutomationError::UnsupportedOperation("window_root".into()))
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

    struct NoopHandle;

    #[async_trait]
    impl LoginCapable for NoopHandle {
        async fn login(
            &self,
            _credential: &Credential,
            _context: Option<&str>,
        ) -> Result<(), AutomationError> {
            Ok(())
        }
    }

    /// Replays a scripted sequence of locate results.
    struct ScriptedStrategy {
        script: Mutex<Vec<Result<(), AutomationError>>>,
    }

    impl ScriptedStrategy {
        fn new(script: Vec<Result<(), AutomationError>>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl LocatorStrategy for ScriptedStrategy {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Tree
        }

        async fn locate(&self, _ctx: &LocateContext) -> Result<Handle, AutomationError> {
            let next = self.script.lock().unwrap().remove(0);
            next.map(|()| Box::new(NoopHandle) as Handle)
        }
    }

    fn ctx_with_deadline(deadline: Instant) -> LocateContext {
        LocateContext {
            backend: Arc::new(NullBackend),
            config: Arc::new(Config::default()),
            deadline,
        }
    }

    fn fast_policy(max_attempts: u32, hard_failure_cap: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            hard_failure_cap,
            delay: Duration::ZERO,
            backoff: BackoffKind::Fixed,
        }
    }

    fn cred() -> Credential {
        Credential::new("teacher01", "s3cret")
    }

    #[tokio::test]
    async fn retries_not_found_then_succeeds() {
        let strategy = ScriptedStrategy::new(vec![
            Err(AutomationError::ElementNotFound("miss".into())),
            Ok(()),
        ]);
        let ctx = ctx_with_deadline(Instant::now() + Duration::from_secs(10));
        let report = run_strategy(
            &strategy,
            &ctx,
            &cred(),
            &fast_policy(3, 2),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(report.attempts.len(), 2);
        assert!(report.final_outcome.is_success());
        assert!(!report.deadline_elapsed);
    }

    #[tokio::test]
    async fn invalid_argument_fails_fast_without_retry() {
        let strategy = ScriptedStrategy::new(vec![
            Err(AutomationError::InvalidArgument("coordinate off screen".into())),
            Ok(()),
        ]);
        let ctx = ctx_with_deadline(Instant::now() + Duration::from_secs(10));
        let report = run_strategy(
            &strategy,
            &ctx,
            &cred(),
            &fast_policy(3, 2),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(report.attempts.len(), 1);
        assert!(matches!(
            report.final_outcome,
            StrategyOutcome::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn hard_failures_get_the_lower_cap() {
        let strategy = ScriptedStrategy::new(vec![
            Err(AutomationError::InjectionFailed("attach denied".into())),
            Err(AutomationError::InjectionFailed("attach denied".into())),
            Ok(()),
        ]);
        let ctx = ctx_with_deadline(Instant::now() + Duration::from_secs(10));
        let report = run_strategy(
            &strategy,
            &ctx,
            &cred(),
            &fast_policy(5, 2),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(report.attempts.len(), 2);
        assert!(report.final_outcome.is_hard_failure());
    }

    #[tokio::test]
    async fn elapsed_deadline_means_no_attempt_at_all() {
        let strategy = ScriptedStrategy::new(vec![Ok(())]);
        let ctx = ctx_with_deadline(Instant::now() - Duration::from_millis(1));
        let report = run_strategy(
            &strategy,
            &ctx,
            &cred(),
            &fast_policy(3, 2),
            Duration::from_secs(5),
        )
        .await;
        assert!(report.attempts.is_empty());
        assert!(report.deadline_elapsed);
        assert!(matches!(report.final_outcome, StrategyOutcome::Timeout(_)));
    }

    #[test]
    fn exponential_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            hard_failure_cap: 2,
            delay: Duration::from_millis(100),
            backoff: BackoffKind::Exponential,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));

        let fixed = RetryPolicy {
            backoff: BackoffKind::Fixed,
            ..policy
        };
        assert_eq!(fixed.delay_for(3), Duration::from_millis(100));
    }
}
