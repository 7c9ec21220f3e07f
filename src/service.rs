//! Service layer API for approval routing and approval actions
use super::builder::build_rules;
use super::config::ApprovalConfig;
use super::context::Transaction;
use super::error::{ApprovalError, ConfigurationError, PersistenceError};
use super::matcher::{RoutingOutcome, resolve};
use super::progress::{ActionKind, ApprovalAction, ApprovalPolicy, ApprovalProgress};
use super::rule::ApprovalRule;
use super::store::{RecordStore, RuleSource};
use super::types::Actor;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Actor id recorded for routing, which no user performs.
pub const ROUTING_ACTOR: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Approve,
    Reject,
}

impl FromStr for Action {
    type Err = ApprovalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Action::Approve),
            "reject" => Ok(Action::Reject),
            other => Err(ApprovalError::UnknownAction(other.to_string())),
        }
    }
}

pub struct ApprovalService {
    records: Arc<dyn RecordStore>,
    rules: Arc<dyn RuleSource>,
    config: ApprovalConfig,
}

impl ApprovalService {
    pub fn new(records: Arc<dyn RecordStore>, rules: Arc<dyn RuleSource>) -> Self {
        Self {
            records,
            rules,
            config: ApprovalConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ApprovalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ApprovalConfig {
        &self.config
    }

    fn load_rules(&self, transaction_type: &str) -> Result<Vec<ApprovalRule>, PersistenceError> {
        let rows = self.rules.rule_rows(transaction_type)?;
        Ok(build_rules(&rows))
    }

    /// Select a rule, level and approvers for a newly created transaction and
    /// mark it pending approval.
    ///
    /// Resolution reads field values from `transaction`; the routing result is
    /// written to the stored copy, which must already exist. A transaction no
    /// rule or level applies to is left untouched, and one that is already
    /// routed is refused with [`ApprovalError::AlreadyRouted`].
    pub fn resolve_and_route_for_approval(
        &self,
        transaction: &Transaction,
    ) -> Result<RoutingOutcome, ApprovalError> {
        let transaction_id = transaction.transaction_id.as_str();
        let rules = self.load_rules(&transaction.transaction_type)?;
        let outcome = resolve(&rules, transaction);

        let Some(routing) = outcome.routing() else {
            info!(transaction_id, ?outcome, "transaction left unrouted");
            return Ok(outcome);
        };

        let progress = ApprovalProgress::routed(routing);
        self.update(&transaction.transaction_type, transaction_id, |record| {
            if let Some(rule_id) = ApprovalProgress::read(record, &self.config).applied_rule_id {
                return Err(ApprovalError::AlreadyRouted { rule_id });
            }
            progress.write(record, &self.config);
            record.record_action(ApprovalAction::new(
                transaction_id,
                ROUTING_ACTOR,
                ActionKind::Route {
                    rule_id: routing.rule_id,
                    level_id: routing.level_id,
                },
            ))?;
            Ok(())
        })
        .inspect_err(|err| warn!(transaction_id, %err, "routing refused"))?;

        info!(
            transaction_id,
            rule_id = routing.rule_id,
            level_id = routing.level_id,
            approvers = ?progress.required_approvers,
            "transaction pending approval"
        );
        Ok(outcome)
    }

    /// Apply an approve or reject action by `actor` and persist the result.
    ///
    /// Returns the progress as committed. Nothing is reported as done unless
    /// the commit succeeded.
    pub fn process_approval_action(
        &self,
        action: Action,
        transaction_type: &str,
        transaction_id: &str,
        actor: &Actor,
    ) -> Result<ApprovalProgress, ApprovalError> {
        let result = match action {
            Action::Approve => self.approve(transaction_type, transaction_id, actor),
            Action::Reject => self.reject(transaction_type, transaction_id, actor),
        };

        match &result {
            Ok(progress) => info!(
                transaction_id,
                actor = %actor.id,
                ?action,
                status = ?progress.status,
                "approval action applied"
            ),
            Err(err) => warn!(
                transaction_id,
                actor = %actor.id,
                ?action,
                %err,
                "approval action failed"
            ),
        }
        result
    }

    fn approve(
        &self,
        transaction_type: &str,
        transaction_id: &str,
        actor: &Actor,
    ) -> Result<ApprovalProgress, ApprovalError> {
        let rules = self.load_rules(transaction_type)?;

        self.update(transaction_type, transaction_id, |record| {
            if record.all_lines_closed() {
                return Err(ApprovalError::Closed);
            }
            let mut progress = ApprovalProgress::read(record, &self.config);
            let policy = policy_for(&rules, &progress);
            progress.approve(&actor.id, policy, &self.config)?;

            progress.write(record, &self.config);
            record.record_action(ApprovalAction::new(
                transaction_id,
                &actor.id,
                ActionKind::Approve,
            ))?;
            Ok(progress)
        })
    }

    fn reject(
        &self,
        transaction_type: &str,
        transaction_id: &str,
        actor: &Actor,
    ) -> Result<ApprovalProgress, ApprovalError> {
        self.update(transaction_type, transaction_id, |record| {
            if record.all_lines_closed() {
                return Err(ApprovalError::Closed);
            }
            let mut progress = ApprovalProgress::read(record, &self.config);
            progress.reject(actor, &self.config)?;

            let closed = record.close_all_lines();
            progress.write(record, &self.config);
            record.record_action(ApprovalAction::new(
                transaction_id,
                &actor.id,
                ActionKind::Reject {
                    reason: progress.rejection_reason.clone().unwrap_or_default(),
                },
            ))?;
            info!(transaction_id, closed, "closed transaction lines");
            Ok(progress)
        })
    }

    /// Current approval progress of a stored transaction.
    pub fn progress(
        &self,
        transaction_type: &str,
        transaction_id: &str,
    ) -> Result<ApprovalProgress, ApprovalError> {
        let record = self.records.load(transaction_type, transaction_id)?;
        Ok(ApprovalProgress::read(&record, &self.config))
    }

    /// Whether `user_id` may approve or reject the transaction right now.
    pub fn can_act(
        &self,
        transaction_type: &str,
        transaction_id: &str,
        user_id: &str,
    ) -> Result<bool, ApprovalError> {
        let record = self.records.load(transaction_type, transaction_id)?;
        Ok(!record.all_lines_closed()
            && ApprovalProgress::read(&record, &self.config).can_act(user_id))
    }

    /// Load, modify and commit a transaction. A commit that loses a race
    /// against another writer is retried from a fresh load, so concurrent
    /// approvals are never dropped.
    fn update<T>(
        &self,
        transaction_type: &str,
        transaction_id: &str,
        mut apply: impl FnMut(&mut Transaction) -> Result<T, ApprovalError>,
    ) -> Result<T, ApprovalError> {
        let mut attempt = 0;
        loop {
            let mut record = self.records.load(transaction_type, transaction_id)?;
            let outcome = apply(&mut record)?;

            match self.records.commit(&mut record) {
                Ok(()) => return Ok(outcome),
                Err(PersistenceError::Conflict { .. })
                    if attempt < self.config.max_conflict_retries =>
                {
                    attempt += 1;
                    warn!(transaction_id, attempt, "concurrent update, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Aggregation policy of the rule and level recorded at routing time. Rules
/// are looked up by id, never re-matched. A rule or level that can no longer
/// be found is a configuration problem: it is logged and the transaction
/// stays pending.
fn policy_for(rules: &[ApprovalRule], progress: &ApprovalProgress) -> Option<ApprovalPolicy> {
    let rule_id = progress.applied_rule_id?;
    let lookup = || -> Result<ApprovalPolicy, ConfigurationError> {
        let rule = rules
            .iter()
            .find(|rule| rule.id == rule_id)
            .ok_or(ConfigurationError::RuleNotFound(rule_id))?;
        let level = match progress.applied_level_id {
            Some(level_id) => rule
                .level(level_id)
                .ok_or(ConfigurationError::LevelNotFound { rule_id, level_id })?,
            None => rule
                .levels
                .first()
                .ok_or(ConfigurationError::NoLevels { rule_id })?,
        };
        let approval_type = rule
            .policy_for(level)
            .ok_or(ConfigurationError::MissingApprovalType { rule_id })?;

        Ok(ApprovalPolicy {
            approval_type,
            min_approvals: level.min_approvals,
        })
    };

    match lookup() {
        Ok(policy) => Some(policy),
        Err(err) => {
            error!(rule_id, %err, "approval policy unavailable");
            None
        }
    }
}
