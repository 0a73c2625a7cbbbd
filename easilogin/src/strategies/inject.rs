//! In-process-injection locator: load a helper module into the target and
//! drive the login view model from inside, bypassing the visual surface
//! entirely.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::bridge::InjectionSession;
use crate::capability::LoginCapable;
use crate::errors::AutomationError;
use crate::strategies::{Handle, LocateContext, LocatorStrategy};
use crate::types::{Credential, StrategyKind};

pub struct InjectStrategy;

#[async_trait]
impl LocatorStrategy for InjectStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Inject
    }

    async fn locate(&self, ctx: &LocateContext) -> Result<Handle, AutomationError> {
        let inject = &ctx.config.inject;

        let pid = ctx
            .backend
            .find_process(&inject.process_needle, &[])?
            .ok_or_else(|| {
                AutomationError::ElementNotFound(format!(
                    "no running process matching '{}'",
                    inject.process_needle
                ))
            })?;

        info!(pid, "attaching to the target process");
        let session = InjectionSession::attach(inject, pid).await?;

        if !session.trigger_window().await? {
            session.detach().await;
            return Err(AutomationError::ElementNotFound(
                "helper could not bring up the login window".to_string(),
            ));
        }
        if !session.probe().await? {
            session.detach().await;
            return Err(AutomationError::ElementNotFound(
                "helper found no login-capable object in the target".to_string(),
            ));
        }

        // The consent toggle is optional in some target versions.
        match session.set_consent(true).await {
            Ok(true) => {}
            Ok(false) => warn!("helper could not grant consent, continuing"),
            Err(e) => warn!("consent call failed, continuing: {e}"),
        }

        Ok(Box::new(InjectHandle {
            session: Mutex::new(Some(session)),
        }))
    }
}

struct InjectHandle {
    /// Consumed by the first login call; a handle never outlives one
    /// locate-and-invoke cycle.
    session: Mutex<Option<InjectionSession>>,
}

#[async_trait]
impl LoginCapable for InjectHandle {
    async fn login(
        &self,
        credential: &Credential,
        context: Option<&str>,
    ) -> Result<(), AutomationError> {
        let session = self.session.lock().await.take().ok_or_else(|| {
            AutomationError::InjectionFailed("injection session already consumed".to_string())
        })?;

        let result = session.invoke(credential, context).await;
        session.detach().await;
        result
    }
}
