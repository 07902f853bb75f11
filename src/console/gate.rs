use std::collections::BTreeSet;

use super::context::Identity;
use crate::error::ConsoleError;

/// Host-side primitive deciding whether an identity is a console operator.
pub trait PermissionCheck: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the check itself cannot be evaluated.
    fn is_operator(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<bool, ConsoleError>> + Send;
}

/// Static list of operator ids, taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct OperatorAllowlist {
    operators: BTreeSet<String>,
}

impl OperatorAllowlist {
    pub fn new(operators: impl IntoIterator<Item = String>) -> Self {
        Self {
            operators: operators.into_iter().collect(),
        }
    }
}

impl PermissionCheck for OperatorAllowlist {
    async fn is_operator(&self, identity: &Identity) -> Result<bool, ConsoleError> {
        Ok(self.operators.contains(&identity.id))
    }
}

/// Runs before every command. Fails closed: an error from the underlying
/// check counts as a refusal.
#[derive(Debug, Clone)]
pub struct PermissionGate<P> {
    check: P,
}

impl<P: PermissionCheck> PermissionGate<P> {
    pub fn new(check: P) -> Self {
        Self { check }
    }

    pub async fn allow(&self, identity: &Identity) -> bool {
        match self.check.is_operator(identity).await {
            Ok(allowed) => allowed,
            Err(err) => {
                tracing::warn!(identity = %identity.id, error = %err, "permission check failed, denying");
                false
            }
        }
    }
}
