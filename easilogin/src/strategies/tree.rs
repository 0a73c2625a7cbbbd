//! Automation-tree-search locator: walk the target window's accessibility
//! tree and apply the capability probe to each interactive node.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::capability::{self, ProbedLogin};
use crate::element::UiElement;
use crate::errors::AutomationError;
use crate::strategies::{Handle, LocateContext, LocatorStrategy};
use crate::types::StrategyKind;

/// Automation id of the avatar button that opens the login dialog from the
/// whiteboard view.
const PROFILE_BUTTON_ID: &str = "ProfileButton";

pub struct TreeSearchStrategy;

/// Depth-first search by automation id.
fn find_by_id(node: &UiElement, id: &str) -> Result<Option<UiElement>, AutomationError> {
    if node.automation_id().as_deref() == Some(id) {
        return Ok(Some(node.clone()));
    }
    for child in node.children()? {
        if let Some(found) = find_by_id(&child, id)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

#[async_trait]
impl LocatorStrategy for TreeSearchStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Tree
    }

    async fn locate(&self, ctx: &LocateContext) -> Result<Handle, AutomationError> {
        let title = &ctx.config.target.window_title;
        let root = ctx.backend.window_root(None, title)?;

        if !ctx.config.direct_login {
            // Open the login dialog first; the login controls are not in
            // the tree until it shows.
            match find_by_id(&root, PROFILE_BUTTON_ID)? {
                Some(button) => {
                    let (x, y, w, h) = button.bounds()?;
                    info!("clicking the profile button to open the login dialog");
                    ctx.backend
                        .click((x + w / 2.0) as i32, (y + h / 2.0) as i32)?;
                    tokio::time::sleep(ctx.config.timeouts.enter_login_ui()).await;
                }
                None => {
                    debug!("profile button not in the tree, assuming the dialog is already open");
                }
            }
        }

        // Re-fetch the root so the freshly opened dialog's subtree is
        // visible, then probe.
        let root = ctx.backend.window_root(None, title)?;
        match capability::probe(&root)? {
            Some(element) => {
                debug!(
                    role = %element.role(),
                    automation_id = ?element.automation_id(),
                    "login-capable node located"
                );
                Ok(Box::new(ProbedLogin::new(element)))
            }
            None => Err(AutomationError::ElementNotFound(format!(
                "no login-capable node in the automation tree of window '{title}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{OperationSignature, UiElementImpl};
    use crate::types::Credential;

    #[derive(Debug, Clone)]
    struct Node {
        id: Option<&'static str>,
        ops: Vec<OperationSignature>,
        children: Vec<Node>,
    }

    impl UiElementImpl for Node {
        fn role(&self) -> String {
            "custom".into()
        }
        fn automation_id(&self) -> Option<String> {
            self.id.map(str::to_string)
        }
        fn name(&self) -> Option<String> {
            None
        }
        fn bounds(&self) -> Result<(f64, f64, f64, f64), AutomationError> {
            Ok((100.0, 200.0, 40.0, 20.0))
        }
        fn children(&self) -> Result<Vec<UiElement>, AutomationError> {
            Ok(self
                .children
                .iter()
                .map(|c| UiElement::new(Box::new(c.clone())))
                .collect())
        }
        fn operations(&self) -> Vec<OperationSignature> {
            self.ops.clone()
        }
        fn invoke_login(
            &self,
            _credential: &Credential,
            _context: Option<&str>,
        ) -> Result<(), AutomationError> {
            Ok(())
        }
        fn clone_box(&self) -> Box<dyn UiElementImpl> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn finds_nested_automation_id() {
        let tree = UiElement::new(Box::new(Node {
            id: None,
            ops: vec![],
            children: vec![
                Node {
                    id: Some("Toolbar"),
                    ops: vec![],
                    children: vec![Node {
                        id: Some(PROFILE_BUTTON_ID),
                        ops: vec![],
                        children: vec![],
                    }],
                },
            ],
        }));
        let found = find_by_id(&tree, PROFILE_BUTTON_ID).unwrap();
        assert!(found.is_some());
        assert!(find_by_id(&tree, "Missing").unwrap().is_none());
    }
}
