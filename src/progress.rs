//! Approval progress and the approve/reject state machine
//!
//! Progress lives on the transaction itself as plain fields (see
//! [`ApprovalFields`](crate::config::ApprovalFields)). It is created once at
//! routing time and afterwards only changed by [`ApprovalProgress::approve`]
//! and [`ApprovalProgress::reject`].
use super::config::{AllPolicy, ApprovalConfig};
use super::context::{FieldAccess, Transaction};
use super::error::{ApprovalError, PersistenceError};
use super::matcher::Routing;
use super::rule::ApprovalType;
use super::types::{Actor, FieldValue, TimeStamp};
use chrono::Utc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    PendingApproval,
    Approved,
    Rejected,
    // statuses the engine does not manage
    Other(String),
}

/// Aggregation rule evaluated after each approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalPolicy {
    pub approval_type: ApprovalType,
    pub min_approvals: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalProgress {
    pub applied_rule_id: Option<u64>,
    pub applied_level_id: Option<u64>,
    pub required_approvers: Vec<String>, // snapshot taken at routing time
    pub approvers: Vec<String>,          // every approval, in order
    pub rejection_reason: Option<String>,
    pub status: Option<OrderStatus>,
    pub approved_at: Option<TimeStamp<Utc>>,
}

impl ApprovalProgress {
    /// Fresh pending progress for a routed transaction.
    pub fn routed(routing: &Routing) -> Self {
        Self {
            applied_rule_id: Some(routing.rule_id),
            applied_level_id: Some(routing.level_id),
            required_approvers: routing
                .approvers
                .iter()
                .map(|a| a.approver_id.clone())
                .collect(),
            approvers: vec![],
            rejection_reason: None,
            status: Some(OrderStatus::PendingApproval),
            approved_at: None,
        }
    }

    pub fn read(transaction: &Transaction, config: &ApprovalConfig) -> Self {
        let fields = &config.fields;
        let value = |field_id: &str| transaction.get_field(field_id).unwrap_or_default();
        let id = |field_id: &str| value(field_id).as_text().and_then(|s| s.parse::<u64>().ok());

        Self {
            applied_rule_id: id(&fields.applied_rule),
            applied_level_id: id(&fields.applied_level),
            required_approvers: value(&fields.required_approvers).as_list(),
            approvers: value(&fields.approvers).as_list(),
            rejection_reason: value(&fields.rejection_reason).as_text(),
            status: value(&fields.order_status)
                .as_text()
                .map(|code| config.status_from_code(&code)),
            approved_at: match value(&fields.approval_date) {
                FieldValue::Date(ts) => Some(ts),
                _ => None,
            },
        }
    }

    pub fn write(&self, transaction: &mut Transaction, config: &ApprovalConfig) {
        let fields = &config.fields;
        if let Some(rule_id) = self.applied_rule_id {
            transaction.set_field(&fields.applied_rule, rule_id.to_string());
        }
        if let Some(level_id) = self.applied_level_id {
            transaction.set_field(&fields.applied_level, level_id.to_string());
        }
        transaction.set_field(
            &fields.required_approvers,
            FieldValue::List(self.required_approvers.clone()),
        );
        transaction.set_field(&fields.approvers, FieldValue::List(self.approvers.clone()));
        if let Some(reason) = &self.rejection_reason {
            transaction.set_field(&fields.rejection_reason, reason.clone());
        }
        if let Some(code) = self.status.as_ref().and_then(|s| config.status_code(s)) {
            transaction.set_field(&fields.order_status, code);
        }
        if let Some(ts) = &self.approved_at {
            transaction.set_field(&fields.approval_date, FieldValue::Date(ts.clone()));
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == Some(OrderStatus::PendingApproval)
    }

    /// A recorded rejection ends the approval flow whatever the status code.
    pub fn is_rejected(&self) -> bool {
        self.rejection_reason.is_some()
    }

    pub fn has_acted(&self, user_id: &str) -> bool {
        self.approvers.iter().any(|a| a == user_id)
    }

    pub fn distinct_approvals(&self) -> usize {
        let mut seen: Vec<&str> = Vec::with_capacity(self.approvers.len());
        for approver in &self.approvers {
            if !seen.contains(&approver.as_str()) {
                seen.push(approver);
            }
        }
        seen.len()
    }

    /// Whether `user_id` should be offered approve/reject: the transaction is
    /// pending, the user is a required approver and has not acted yet.
    pub fn can_act(&self, user_id: &str) -> bool {
        self.is_pending()
            && !self.is_rejected()
            && self.required_approvers.iter().any(|r| r == user_id)
            && !self.has_acted(user_id)
    }

    /// Next approver in sequence order who has not acted.
    pub fn next_in_sequence(&self) -> Option<&str> {
        self.required_approvers
            .iter()
            .find(|r| !self.has_acted(r))
            .map(String::as_str)
    }

    /// Records an approval by `actor_id` and re-evaluates `policy`.
    ///
    /// With no policy (rule or level no longer resolvable) the approval is
    /// still recorded and the transaction stays pending.
    pub fn approve(
        &mut self,
        actor_id: &str,
        policy: Option<ApprovalPolicy>,
        config: &ApprovalConfig,
    ) -> Result<OrderStatus, ApprovalError> {
        self.ensure_pending()?;
        if config.reject_repeat_actions && self.has_acted(actor_id) {
            return Err(ApprovalError::RepeatAction {
                actor: actor_id.to_string(),
            });
        }
        if let Some(ApprovalPolicy {
            approval_type: ApprovalType::Sequential,
            ..
        }) = policy
        {
            match self.next_in_sequence() {
                Some(expected) if expected == actor_id => {}
                expected => {
                    return Err(ApprovalError::OutOfSequence {
                        expected: expected.unwrap_or_default().to_string(),
                        actor: actor_id.to_string(),
                    });
                }
            }
        }

        self.approvers.push(actor_id.to_string());

        if policy.is_some_and(|p| self.is_satisfied(p, config.all_policy)) {
            self.status = Some(OrderStatus::Approved);
            self.approved_at = Some(TimeStamp::new());
        }

        Ok(self.status.clone().unwrap_or(OrderStatus::PendingApproval))
    }

    /// Records a rejection by `actor`. Closing the transaction's lines is the
    /// caller's part; the status only changes when a rejected code is set.
    pub fn reject(&mut self, actor: &Actor, config: &ApprovalConfig) -> Result<(), ApprovalError> {
        self.ensure_pending()?;
        if config.reject_repeat_actions && self.has_acted(&actor.id) {
            return Err(ApprovalError::RepeatAction {
                actor: actor.id.clone(),
            });
        }
        self.rejection_reason = Some(format!("Rejected by {}", actor.name));
        if config.rejected_status.is_some() {
            self.status = Some(OrderStatus::Rejected);
        }
        Ok(())
    }

    fn is_satisfied(&self, policy: ApprovalPolicy, all_policy: AllPolicy) -> bool {
        match policy.approval_type {
            ApprovalType::Any => self.distinct_approvals() >= policy.min_approvals as usize,
            ApprovalType::All => match all_policy {
                AllPolicy::CountEquality => self.approvers.len() == self.required_approvers.len(),
                AllPolicy::Membership => self.required_approvers.iter().all(|r| self.has_acted(r)),
            },
            ApprovalType::Sequential => self.next_in_sequence().is_none(),
        }
    }

    fn ensure_pending(&self) -> Result<(), ApprovalError> {
        if self.is_rejected() {
            return Err(ApprovalError::Closed);
        }
        match &self.status {
            Some(OrderStatus::PendingApproval) => Ok(()),
            None if self.applied_rule_id.is_none() => Err(ApprovalError::Unrouted),
            other => Err(ApprovalError::NotPending {
                status: format!("{other:?}"),
            }),
        }
    }
}

/// One entry of a transaction's append-only action history.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct ApprovalAction {
    #[n(0)]
    pub transaction_id: String,
    #[n(1)]
    pub actor_id: String,
    #[n(2)]
    pub timestamp: TimeStamp<Utc>,
    #[n(3)]
    pub kind: ActionKind,
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub enum ActionKind {
    #[n(0)]
    Route {
        #[n(0)]
        rule_id: u64,
        #[n(1)]
        level_id: u64,
    },
    #[n(1)]
    Approve,
    #[n(2)]
    Reject {
        #[n(0)]
        reason: String,
    },
}

impl ApprovalAction {
    pub fn new(transaction_id: &str, actor_id: &str, kind: ActionKind) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            actor_id: actor_id.to_string(),
            timestamp: TimeStamp::new(),
            kind,
        }
    }
    /// Content address of the action: sha256 of its CBOR encoding.
    pub fn build(&self) -> Result<(String, Vec<u8>), PersistenceError> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

/// A history entry stored under the sha256 digest of its action.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct HistoryEntry {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub action: ApprovalAction,
}
