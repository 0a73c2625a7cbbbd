//! Capability probe: a structural test deciding whether a node exposes a
//! login-like operation, independent of its concrete type name.
//!
//! The target renames and repositions its controls across versions, so the
//! probe never compares against a known class. A node matches if any of its
//! introspected operations is named for "login" and takes exactly three
//! parameters (account, secret, context).

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::element::{OperationSignature, UiElement};
use crate::errors::AutomationError;
use crate::types::Credential;

/// Parameter count of the login operation: account, secret, context.
pub const LOGIN_ARITY: usize = 3;

/// Anything that can perform the authentication action for one run.
///
/// Implemented by an adapter that performed the structural probe once and
/// cached the match as a typed handle, so the tree is not re-probed on every
/// call. A handle never outlives one locate-and-invoke cycle.
#[async_trait]
pub trait LoginCapable: Send + Sync {
    async fn login(
        &self,
        credential: &Credential,
        context: Option<&str>,
    ) -> Result<(), AutomationError>;
}

/// Structural test for one operation signature.
pub fn is_login_operation(sig: &OperationSignature) -> bool {
    sig.arity == LOGIN_ARITY && sig.name.to_ascii_lowercase().contains("login")
}

/// Roles worth probing when walking an automation tree. Containers are
/// always descended into; the probe itself only inspects operations.
pub fn is_interactive_role(role: &str) -> bool {
    matches!(
        role.to_ascii_lowercase().as_str(),
        "custom" | "button" | "radiobutton" | "checkbox" | "edit" | "combobox" | "pane" | "group"
    )
}

/// `Probe(node) -> CapabilityRef | none`.
///
/// Depth-first over the node's children; first match wins; `None` once the
/// tree is exhausted. Read-only reflection over metadata, no side effects.
pub fn probe(node: &UiElement) -> Result<Option<UiElement>, AutomationError> {
    if is_interactive_role(&node.role())
        && node.operations().iter().any(is_login_operation)
    {
        debug!(
            role = %node.role(),
            automation_id = ?node.automation_id(),
            "capability probe matched"
        );
        return Ok(Some(node.clone()));
    }

    for child in node.children()? {
        trace!(role = %child.role(), "probing child");
        if let Some(found) = probe(&child)? {
            return Ok(Some(found));
        }
    }

    Ok(None)
}

/// Adapter caching a probed match as a typed handle for the rest of the run.
pub struct ProbedLogin {
    element: UiElement,
}

impl ProbedLogin {
    pub fn new(element: UiElement) -> Self {
        Self { element }
    }

    pub fn element(&self) -> &UiElement {
        &self.element
    }
}

#[async_trait]
impl LoginCapable for ProbedLogin {
    async fn login(
        &self,
        credential: &Credential,
        context: Option<&str>,
    ) -> Result<(), AutomationError> {
        self.element.invoke_login(credential, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::UiElementImpl;

    #[derive(Debug, Clone)]
    struct FakeNode {
        role: &'static str,
        id: Option<&'static str>,
        ops: Vec<OperationSignature>,
        children: Vec<FakeNode>,
    }

    impl FakeNode {
        fn leaf(role: &'static str, ops: Vec<OperationSignature>) -> Self {
            Self {
                role,
                id: None,
                ops,
                children: vec![],
            }
        }

        fn branch(role: &'static str, children: Vec<FakeNode>) -> Self {
            Self {
                role,
                id: None,
                ops: vec![],
                children,
            }
        }
    }

    impl UiElementImpl for FakeNode {
        fn role(&self) -> String {
            self.role.to_string()
        }
        fn automation_id(&self) -> Option<String> {
            self.id.map(str::to_string)
        }
        fn name(&self) -> Option<String> {
            None
        }
        fn bounds(&self) -> Result<(f64, f64, f64, f64), AutomationError> {
            Ok((0.0, 0.0, 10.0, 10.0))
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

    fn element(node: FakeNode) -> UiElement {
        UiElement::new(Box::new(node))
    }

    #[test]
    fn matches_renamed_login_operation_with_three_params() {
        // Structural test, not an exact name match: a renamed control whose
        // operation still mentions login with three parameters must match.
        let tree = element(FakeNode::branch(
            "window",
            vec![
                FakeNode::leaf(
                    "button",
                    vec![OperationSignature::new("DoLoginAsync", 3)],
                ),
            ],
        ));
        let found = probe(&tree).unwrap().expect("should match");
        assert_eq!(found.role(), "button");
    }

    #[test]
    fn rejects_wrong_arity_and_wrong_name() {
        let tree = element(FakeNode::branch(
            "window",
            vec![
                FakeNode::leaf("button", vec![OperationSignature::new("Login", 2)]),
                FakeNode::leaf("button", vec![OperationSignature::new("Logout", 3)]),
                FakeNode::leaf("edit", vec![OperationSignature::new("SetValue", 1)]),
            ],
        ));
        assert!(probe(&tree).unwrap().is_none());
    }

    #[test]
    fn depth_first_first_match_wins() {
        let tree = element(FakeNode::branch(
            "window",
            vec![
                FakeNode::branch(
                    "pane",
                    vec![FakeNode {
                        role: "custom",
                        id: Some("first"),
                        ops: vec![OperationSignature::new("PerformLogin", 3)],
                        children: vec![],
                    }],
                ),
                FakeNode {
                    role: "custom",
                    id: Some("second"),
                    ops: vec![OperationSignature::new("PerformLogin", 3)],
                    children: vec![],
                },
            ],
        ));
        let found = probe(&tree).unwrap().expect("should match");
        assert_eq!(found.automation_id().as_deref(), Some("first"));
    }

    #[test]
    fn interactive_role_filter() {
        assert!(is_interactive_role("Custom"));
        assert!(is_interactive_role("checkbox"));
        assert!(!is_interactive_role("image"));
        assert!(!is_interactive_role("titlebar"));
    }
}
