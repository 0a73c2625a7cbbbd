//! Platform-independent view of a node in the target's automation tree.
//!
//! The target application's internal control types are not part of any
//! stable contract, so nothing here names a concrete class: a node exposes
//! its role, its children and the *signatures* of its operations, and the
//! capability probe decides structurally whether it is login-capable.

use std::fmt::Debug;

use crate::errors::AutomationError;
use crate::types::Credential;

/// Signature of one operation a node exposes, as seen by introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSignature {
    pub name: String,
    pub arity: usize,
}

impl OperationSignature {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

/// Represents a UI element in the target application
#[derive(Debug)]
pub struct UiElement {
    inner: Box<dyn UiElementImpl>,
}

/// The backing implementation a platform backend (or a test double) provides
/// for each element.
pub trait UiElementImpl: Send + Sync + Debug {
    fn role(&self) -> String;

    fn automation_id(&self) -> Option<String>;

    fn name(&self) -> Option<String>;

    /// (x, y, width, height) in screen coordinates.
    fn bounds(&self) -> Result<(f64, f64, f64, f64), AutomationError>;

    fn children(&self) -> Result<Vec<UiElement>, AutomationError>;

    /// Introspected operation signatures. Read-only; must not mutate the
    /// target in any way.
    fn operations(&self) -> Vec<OperationSignature>;

    /// Fill in the credential and confirm, on the element previously matched
    /// by the capability probe. The context argument is intentionally absent
    /// on this path; a non-default context is unspecified behavior in the
    /// target and is not the login path.
    fn invoke_login(
        &self,
        credential: &Credential,
        context: Option<&str>,
    ) -> Result<(), AutomationError>;

    fn clone_box(&self) -> Box<dyn UiElementImpl>;
}

impl UiElement {
    pub fn new(inner: Box<dyn UiElementImpl>) -> Self {
        Self { inner }
    }

    pub fn role(&self) -> String {
        self.inner.role()
    }

    pub fn automation_id(&self) -> Option<String> {
        self.inner.automation_id()
    }

    pub fn name(&self) -> Option<String> {
        self.inner.name()
    }

    pub fn bounds(&self) -> Result<(f64, f64, f64, f64), AutomationError> {
        self.inner.bounds()
    }

    pub fn children(&self) -> Result<Vec<UiElement>, AutomationError> {
        self.inner.children()
    }

    pub fn operations(&self) -> Vec<OperationSignature> {
        self.inner.operations()
    }

    pub fn invoke_login(
        &self,
        credential: &Credential,
        context: Option<&str>,
    ) -> Result<(), AutomationError> {
        self.inner.invoke_login(credential, context)
    }
}

impl Clone for UiElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}
