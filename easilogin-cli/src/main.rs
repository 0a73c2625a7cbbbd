//! easilogin CLI
//!
//! Runs one locate-and-authenticate cycle against the EasiNote whiteboard,
//! or arms the one-shot skip flag for the next scheduled run.
//!
//! Usage:
//!   easilogin login -a teacher01 -p ...       # scheduled semantics, gate shown
//!   easilogin login -a teacher01 -p ... -m    # manual run, no warning gate
//!   easilogin skip                            # suppress the next scheduled run

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use easilogin::gate::WarningPrompt;
use easilogin::platforms::create_backend;
use easilogin::types::LoginRequest;
use easilogin::{
    AutomationError, Config, Credential, Orchestrator, RunOutcome, SkipFlag, StrategyKind,
    WarningDecision,
};

#[derive(Parser)]
#[command(name = "easilogin")]
#[command(about = "Automated sign-in for the EasiNote whiteboard")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Locate the login surface and sign the account in
    Login(LoginArgs),
    /// Arm the one-shot skip flag; the next scheduled run is suppressed
    Skip,
}

#[derive(Parser, Debug)]
struct LoginArgs {
    /// Account identifier
    #[arg(long, short = 'a')]
    account: String,

    /// Secret; prefer the environment variable over the flag so it stays
    /// out of the shell history
    #[arg(long, short = 'p', env = "EASILOGIN_PASSWORD", hide_env_values = true)]
    password: String,

    /// Manual invocation: bypass the warning gate and run immediately
    #[arg(long, short = 'm')]
    manual: bool,

    /// Override the strategy order (repeatable): tree, template, fixed,
    /// inject
    #[arg(long = "strategy", short = 's', value_parser = parse_strategy)]
    strategies: Vec<StrategyKind>,
}

fn parse_strategy(raw: &str) -> Result<StrategyKind, String> {
    match raw.to_ascii_lowercase().as_str() {
        "tree" => Ok(StrategyKind::Tree),
        "template" => Ok(StrategyKind::Template),
        "fixed" => Ok(StrategyKind::Fixed),
        "inject" => Ok(StrategyKind::Inject),
        other => Err(format!(
            "unknown strategy '{other}' (expected tree, template, fixed or inject)"
        )),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => {
            let default = default_config_path();
            if default.exists() {
                Config::load(&default)
                    .with_context(|| format!("loading configuration from {}", default.display()))
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("easilogin")
}

fn default_config_path() -> PathBuf {
    data_dir().join("config.json")
}

fn default_skip_flag_path() -> PathBuf {
    data_dir().join("skip.flag")
}

/// Console warning gate: a countdown on stdin. Enter proceeds, `d` defers,
/// `c` cancels; letting the countdown run out proceeds.
struct ConsolePrompt;

impl WarningPrompt for ConsolePrompt {
    fn present(
        &self,
        defer_allowed: bool,
        countdown: Duration,
    ) -> Result<WarningDecision, AutomationError> {
        let options = if defer_allowed {
            "[Enter] proceed  [d] defer  [c] cancel"
        } else {
            "[Enter] proceed  [c] cancel"
        };
        println!(
            "About to sign in automatically in {}s. {options}",
            countdown.as_secs()
        );

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_ok() {
                let _ = tx.send(line.trim().to_ascii_lowercase());
            }
        });

        match rx.recv_timeout(countdown) {
            Ok(input) if input == "c" || input == "cancel" => Ok(WarningDecision::Cancelled),
            Ok(input) if defer_allowed && (input == "d" || input == "defer") => {
                Ok(WarningDecision::Deferred(Duration::ZERO))
            }
            Ok(_) => Ok(WarningDecision::Proceed),
            Err(_) => {
                println!("No answer, proceeding.");
                Ok(WarningDecision::Proceed)
            }
        }
    }
}

fn exit_code(outcome: RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Success => 0,
        RunOutcome::Suppressed => 2,
        RunOutcome::Cancelled => 3,
        RunOutcome::Busy => 4,
        RunOutcome::Timeout => 5,
        RunOutcome::Failed => 6,
    }
}

async fn run_login(config: Config, args: LoginArgs) -> Result<i32> {
    let backend = create_backend().context("creating the platform backend")?;
    let config = std::sync::Arc::new(config);
    let orchestrator =
        Orchestrator::with_prompt(backend, config.clone(), std::sync::Arc::new(ConsolePrompt));

    let mut request = LoginRequest::new(
        Credential::new(args.account, args.password),
        config.timeouts.run_budget(),
    );
    request.manual = args.manual;
    if !args.strategies.is_empty() {
        request.strategy_order = Some(args.strategies);
    }

    let report = orchestrator.run_login(request).await;
    match report.outcome {
        RunOutcome::Success => info!(
            strategy = ?report.chosen_strategy,
            elapsed_ms = report.elapsed_ms,
            "signed in"
        ),
        outcome => warn!(
            ?outcome,
            diagnostic = report.last_diagnostic.as_deref().unwrap_or("none"),
            "run did not sign in"
        ),
    }
    Ok(exit_code(report.outcome))
}

fn arm_skip(config: &Config) -> Result<()> {
    let path = config
        .skip_flag_path
        .clone()
        .unwrap_or_else(default_skip_flag_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    SkipFlag::new(Some(path.clone())).set();
    println!("Next scheduled sign-in will be skipped ({}).", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Login(args) => {
            let code = run_login(config, args).await?;
            std::process::exit(code);
        }
        Commands::Skip => arm_skip(&config),
    }
}
