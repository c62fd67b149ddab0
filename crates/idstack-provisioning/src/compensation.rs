//! Compensations
//!
//! A compensation is a plain value naming the resource to remove, not a
//! closure. Rollback dispatches on the variant, so the log can be inspected,
//! serialized and asserted on.

use serde::{Deserialize, Serialize};

/// Pending undo of one completed creation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Compensation {
    /// Remove a user pool
    DeleteUserPool { user_pool_id: String },
    /// Remove an app client of a user pool
    DeleteUserPoolClient { user_pool_id: String, client_id: String },
    /// Remove an identity pool
    DeleteIdentityPool { identity_pool_id: String },
    /// Remove a user from a user pool
    DeleteUser { user_pool_id: String, username: String },
    /// Remove a managed policy
    DeletePolicy { policy_arn: String },
    /// Remove a role
    DeleteRole { role_name: String },
}

impl Compensation {
    /// Action name emitted in the rollback log record
    pub fn action(&self) -> &'static str {
        match self {
            Self::DeleteUserPool { .. } => "rollbackUserPool",
            Self::DeleteUserPoolClient { .. } => "rollbackUserPoolClient",
            Self::DeleteIdentityPool { .. } => "rollbackIdentityPool",
            Self::DeleteUser { .. } => "rollbackAdminCreateUser",
            Self::DeletePolicy { .. } => "rollbackCreatePolicy",
            Self::DeleteRole { .. } => "rollbackCreateRole",
        }
    }
}

/// A compensation tagged with the saga step that recorded it (1-based)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationEntry {
    pub step: usize,
    pub compensation: Compensation,
}

/// Append-only undo log of one provisioning attempt
#[derive(Debug, Default, Clone, Serialize)]
pub struct CompensationLog {
    entries: Vec<CompensationEntry>,
}

impl CompensationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the undo of step `step`
    pub fn push(&mut self, step: usize, compensation: Compensation) {
        self.entries.push(CompensationEntry { step, compensation });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in recording order
    pub fn entries(&self) -> &[CompensationEntry] {
        &self.entries
    }

    /// Drain the log newest-first. The log is empty afterwards.
    pub fn unwind(&mut self) -> std::iter::Rev<std::vec::IntoIter<CompensationEntry>> {
        std::mem::take(&mut self.entries).into_iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str) -> Compensation {
        Compensation::DeleteRole { role_name: name.into() }
    }

    #[test]
    fn test_unwind_is_lifo_and_clears() {
        let mut log = CompensationLog::new();
        log.push(1, role("a"));
        log.push(2, role("b"));
        log.push(5, role("c"));

        let order: Vec<usize> = log.unwind().map(|e| e.step).collect();
        assert_eq!(order, vec![5, 2, 1]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_action_names() {
        assert_eq!(role("x").action(), "rollbackCreateRole");
        assert_eq!(
            Compensation::DeleteUser { user_pool_id: "p".into(), username: "u".into() }.action(),
            "rollbackAdminCreateUser"
        );
    }

    #[test]
    fn test_serialized_form_is_tagged() {
        let value = serde_json::to_value(Compensation::DeletePolicy { policy_arn: "arn:p".into() }).unwrap();
        assert_eq!(value["kind"], "delete_policy");
        assert_eq!(value["policy_arn"], "arn:p");
    }
}
