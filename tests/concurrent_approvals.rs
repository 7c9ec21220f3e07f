//! Concurrent approvals on one transaction.
//!
//! Every approver reads, appends and commits the same progress fields. With
//! versioned commits and retry none of the appends may be lost.
use approval_routing::{
    builder::RuleRow,
    config::ApprovalConfig,
    context::Transaction,
    progress::OrderStatus,
    rule::ApprovalType,
    service::{Action, ApprovalService},
    sled_store::SledStore,
    store::RecordStore,
    types::Actor,
};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;

const APPROVERS: usize = 6;

#[test]
fn parallel_approvals_are_all_recorded() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = sled::open(temp_dir.path().join("concurrent.db"))?;
    let store = Arc::new(SledStore::new(Arc::new(db)));

    let users: Vec<String> = (0..APPROVERS).map(|i| format!("user_{i}")).collect();
    let rows: Vec<RuleRow> = users
        .iter()
        .enumerate()
        .map(|(i, user)| {
            RuleRow::rule(1, "everyone")
                .set_level(1, None, None, APPROVERS as u32, ApprovalType::Any)
                .set_assignee(i as u64, user, i as i64)
        })
        .collect();
    store.store_rule_rows("salesord", &rows)?;

    // every thread may lose the race to all the others
    let service = Arc::new(
        ApprovalService::new(store.clone(), store.clone()).with_config(ApprovalConfig {
            max_conflict_retries: APPROVERS as u32 * 2,
            ..ApprovalConfig::default()
        }),
    );

    let mut txn = Transaction::new("salesord", "so-race");
    store.commit(&mut txn)?;
    service.resolve_and_route_for_approval(&txn)?;

    let barrier = Arc::new(Barrier::new(APPROVERS));
    let handles: Vec<_> = users
        .iter()
        .cloned()
        .map(|user| {
            let service = service.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                service
                    .process_approval_action(
                        Action::Approve,
                        "salesord",
                        "so-race",
                        &Actor::new(user.clone(), user),
                    )
                    .map(|_| ())
            })
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("approver thread panicked"))??;
    }

    let progress = service.progress("salesord", "so-race")?;
    assert_eq!(progress.approvers.len(), APPROVERS);
    assert_eq!(progress.distinct_approvals(), APPROVERS);
    assert_eq!(progress.status, Some(OrderStatus::Approved));

    let record = store.load("salesord", "so-race")?;
    // one routing entry plus one per approval
    assert_eq!(record.history().len(), APPROVERS + 1);
    for entry in record.history() {
        assert_eq!(entry.action.build()?.0, entry.id);
    }
    Ok(())
}
