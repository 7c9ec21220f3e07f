//! Approval routing for business transactions.
//!
//! A transaction is matched against prioritised, conditional approval rules
//! (falling back to a default rule), the level covering its threshold value
//! is selected and the level's approvers become the transaction's required
//! approvers. Approve and reject actions are then applied against the
//! level's aggregation policy until the transaction is approved or closed.
//!
//! The engine runs against a [`store::RecordStore`] and a
//! [`store::RuleSource`]; [`sled_store::SledStore`] provides both.

pub mod builder;
pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod matcher;
pub mod memory;
pub mod progress;
pub mod rule;
pub mod service;
pub mod sled_store;
pub mod store;
pub mod types;
pub mod utils;
