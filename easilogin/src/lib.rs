//! Multi-strategy automated sign-in engine for the EasiNote whiteboard.
//!
//! Given a credential, the engine brings the target application into a
//! known state, locates its login surface through an ordered list of
//! strategies (automation-tree search, template matching, fixed
//! coordinates, in-process injection) and invokes the authentication
//! action, retrying and falling back until one strategy succeeds or the
//! run deadline elapses.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use easilogin::{Config, Credential, LoginRequest, Orchestrator};
//!
//! # async fn run() -> Result<(), easilogin::AutomationError> {
//! let backend = easilogin::platforms::create_backend()?;
//! let orchestrator = Orchestrator::new(backend, Arc::new(Config::default()));
//! let request = LoginRequest::new(
//!     Credential::new("teacher01", "secret"),
//!     Duration::from_secs(180),
//! );
//! let report = orchestrator.run_login(request).await;
//! println!("{:?}", report.outcome);
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod capability;
pub mod config;
pub mod element;
pub mod errors;
pub mod gate;
pub mod orchestrator;
pub mod platforms;
pub mod retry;
pub mod selector;
pub mod strategies;
pub mod target;
pub mod types;

pub use config::Config;
pub use errors::AutomationError;
pub use gate::{SkipFlag, WarningGate, WarningPrompt};
pub use orchestrator::Orchestrator;
pub use types::{
    Credential, LoginRequest, RunOutcome, RunReport, StrategyKind, StrategyOutcome,
    WarningDecision,
};
