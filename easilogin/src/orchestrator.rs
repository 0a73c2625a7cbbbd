//! Orchestrator: owns one run end to end.
//!
//! Order of gates for a run: overlap check, deadline pre-check, warning
//! gate (bypassed for manual runs), one-shot skip flag, target restart,
//! then the strategy loop. The first strategy to succeed ends the run; a
//! deadline elapsing inside a strategy ends it too, with no fall-through
//! to later strategies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AutomationError;
use crate::gate::{AutoProceedPrompt, SkipFlag, WarningGate, WarningPrompt};
use crate::platforms::AutomationBackend;
use crate::retry::{self, RetryPolicy};
use crate::selector::StrategySelector;
use crate::strategies::{self, LocateContext, LocatorStrategy};
use crate::target::TargetApp;
use crate::types::{LoginRequest, RunOutcome, RunReport, StrategyKind, WarningDecision};

type StrategyFactory = Box<dyn Fn(StrategyKind) -> Box<dyn LocatorStrategy> + Send + Sync>;

pub struct Orchestrator {
    backend: Arc<dyn AutomationBackend>,
    config: Arc<Config>,
    skip: SkipFlag,
    warning: WarningGate,
    in_flight: AtomicBool,
    factory: StrategyFactory,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn AutomationBackend>, config: Arc<Config>) -> Self {
        Self::with_prompt(backend, config, Arc::new(AutoProceedPrompt))
    }

    pub fn with_prompt(
        backend: Arc<dyn AutomationBackend>,
        config: Arc<Config>,
        prompt: Arc<dyn WarningPrompt>,
    ) -> Self {
        let skip = SkipFlag::new(config.skip_flag_path.clone());
        let warning = WarningGate::new(config.warning.clone(), prompt);
        Self {
            backend,
            config,
            skip,
            warning,
            in_flight: AtomicBool::new(false),
            factory: Box::new(strategies::build),
        }
    }

    /// Replace the default strategy factory, mainly for tests.
    pub fn with_strategy_factory(mut self, factory: StrategyFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn skip_flag(&self) -> &SkipFlag {
        &self.skip
    }

    /// Run one locate-and-authenticate cycle to a terminal outcome. Never
    /// queues: a second call while one is in flight is rejected as busy.
    pub async fn run_login(&self, request: LoginRequest) -> RunReport {
        let run_id = Uuid::new_v4();
        let started = Instant::now();

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            warn!(%run_id, "run rejected, another run is in flight");
            return RunReport::terminal(run_id, RunOutcome::Busy, started);
        };
        info!(%run_id, account = %request.credential.account, manual = request.manual, "run started");

        let report = self.run_gated(run_id, &request, started).await;
        info!(%run_id, outcome = ?report.outcome, elapsed_ms = report.elapsed_ms, "run finished");
        self.emit(&report);
        report
    }

    async fn run_gated(
        &self,
        run_id: Uuid,
        request: &LoginRequest,
        started: Instant,
    ) -> RunReport {
        let deadline = request.deadline;
        if Instant::now() >= deadline {
            return RunReport::terminal(run_id, RunOutcome::Timeout, started);
        }

        if !request.manual {
            match self.warning.await_clearance(deadline).await {
                WarningDecision::Cancelled => {
                    info!(%run_id, "cancelled at the warning gate");
                    return RunReport::terminal(run_id, RunOutcome::Cancelled, started);
                }
                WarningDecision::Proceed | WarningDecision::Deferred(_) => {}
            }
        }

        if self.skip.check_and_clear() {
            info!(%run_id, "suppressed by the one-shot skip flag");
            return RunReport::terminal(run_id, RunOutcome::Suppressed, started);
        }

        if Instant::now() >= deadline {
            return RunReport::terminal(run_id, RunOutcome::Timeout, started);
        }

        let target = TargetApp::new(
            self.backend.clone(),
            self.config.target.clone(),
            self.config.timeouts.clone(),
        );
        if let Err(e) = target.ensure_ready(deadline).await {
            error!(%run_id, "target not ready: {e}");
            let outcome = match e {
                AutomationError::Timeout(_) => RunOutcome::Timeout,
                _ => RunOutcome::Failed,
            };
            let mut report = RunReport::terminal(run_id, outcome, started);
            report.last_diagnostic = Some(e.to_string());
            return report;
        }

        let selector = StrategySelector::from_config(&self.config, request.strategy_order.as_deref());
        if selector.is_empty() {
            let mut report = RunReport::terminal(run_id, RunOutcome::Failed, started);
            report.last_diagnostic = Some("no strategies enabled".to_string());
            return report;
        }

        let policy = RetryPolicy::from_config(&self.config.retry);
        let ctx = LocateContext {
            backend: self.backend.clone(),
            config: self.config.clone(),
            deadline,
        };

        let mut strategies_run = Vec::new();
        let mut chosen = None;
        let mut last_diagnostic = None;
        let mut outcome = RunOutcome::Failed;

        for &kind in selector.order() {
            let strategy = (self.factory)(kind);
            let report = retry::run_strategy(
                strategy.as_ref(),
                &ctx,
                &request.credential,
                &policy,
                self.config.timeouts.locate(),
            )
            .await;

            let success = report.final_outcome.is_success();
            let deadline_elapsed = report.deadline_elapsed;
            if let Some(d) = report.final_outcome.diagnostic() {
                last_diagnostic = Some(d.to_string());
            }
            strategies_run.push(report);

            if success {
                chosen = Some(kind);
                outcome = RunOutcome::Success;
                break;
            }
            if deadline_elapsed {
                outcome = RunOutcome::Timeout;
                break;
            }
            info!(%run_id, strategy = %kind, "strategy exhausted, falling back");
        }

        RunReport {
            run_id,
            outcome,
            chosen_strategy: chosen,
            strategies: strategies_run,
            last_diagnostic,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// One JSON line per run for external collectors, when configured.
    fn emit(&self, report: &RunReport) {
        let Some(path) = &self.config.report_path else {
            return;
        };
        let line = match serde_json::to_string(report) {
            Ok(line) => line,
            Err(e) => {
                warn!("cannot encode run report: {e}");
                return;
            }
        };
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                writeln!(f, "{line}")
            });
        if let Err(e) = result {
            warn!("cannot append run report to {}: {e}", path.display());
        }
    }
}

/// Releases the overlap latch when the run ends, however it ends.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
