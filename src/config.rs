//! Engine configuration
//!
//! [`ApprovalConfig`] names the transaction fields approval progress is kept
//! in, the status codes the engine writes, and the policy switches for the
//! behaviours that are open to interpretation. `ApprovalConfig::default()` is
//! always a valid starting point.
use super::progress::OrderStatus;

/// How an `All` level decides it is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllPolicy {
    /// Approved once as many approvals are recorded as there are required
    /// approvers. Repeat approvals by one user count more than once.
    #[default]
    CountEquality,
    /// Approved once every required approver id has acted.
    Membership,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalFields {
    pub order_status: String,
    pub applied_rule: String,
    pub applied_level: String,
    pub required_approvers: String,
    pub approvers: String,
    pub rejection_reason: String,
    pub approval_date: String,
}

impl Default for ApprovalFields {
    fn default() -> Self {
        Self {
            order_status: "orderstatus".into(),
            applied_rule: "applied_rule".into(),
            applied_level: "applied_level".into(),
            required_approvers: "required_approvers".into(),
            approvers: "approvers".into(),
            rejection_reason: "rejection_reason".into(),
            approval_date: "approval_date".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalConfig {
    pub fields: ApprovalFields,
    pub pending_status: String,
    pub approved_status: String,
    /// Status written on rejection. `None` leaves the status untouched and
    /// only closes the transaction's lines.
    pub rejected_status: Option<String>,
    pub all_policy: AllPolicy,
    /// Refuse an action from a user who already appears in the acted list.
    pub reject_repeat_actions: bool,
    /// Reload-and-reapply attempts after a concurrent write.
    pub max_conflict_retries: u32,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            fields: ApprovalFields::default(),
            pending_status: "A".into(),
            approved_status: "B".into(),
            rejected_status: None,
            all_policy: AllPolicy::default(),
            reject_repeat_actions: false,
            max_conflict_retries: 3,
        }
    }
}

impl ApprovalConfig {
    pub fn status_from_code(&self, code: &str) -> OrderStatus {
        if code == self.pending_status {
            OrderStatus::PendingApproval
        } else if code == self.approved_status {
            OrderStatus::Approved
        } else if self.rejected_status.as_deref() == Some(code) {
            OrderStatus::Rejected
        } else {
            OrderStatus::Other(code.to_string())
        }
    }

    pub fn status_code(&self, status: &OrderStatus) -> Option<String> {
        match status {
            OrderStatus::PendingApproval => Some(self.pending_status.clone()),
            OrderStatus::Approved => Some(self.approved_status.clone()),
            OrderStatus::Rejected => self.rejected_status.clone(),
            OrderStatus::Other(code) => Some(code.clone()),
        }
    }
}
