//! Routes a sales order through a two tier rule set and approves it.
//!
//! Run with `RUST_LOG=debug` to follow the pipeline.
use approval_routing::{
    builder::RuleRow,
    context::Transaction,
    rule::ApprovalType,
    service::{Action, ApprovalService},
    sled_store::SledStore,
    store::RecordStore,
    types::Actor,
    utils,
};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let temp_dir = tempfile::tempdir()?;
    let db = sled::open(temp_dir.path().join("routing_demo.db"))?;
    let store = Arc::new(SledStore::new(Arc::new(db)));

    let clerk = Actor::new(utils::new_user_id()?, "Casey Clerk");
    let manager = Actor::new(utils::new_user_id()?, "Morgan Manager");
    let director = Actor::new(utils::new_user_id()?, "Drew Director");

    let tiers = RuleRow::rule(1, "Domestic orders")
        .set_priority(10)
        .set_threshold_field("total")
        .set_condition(1, "subsidiary", "anyof", "1,2");
    let rows = vec![
        tiers
            .clone()
            .set_level(1, Some(0.0), Some(10_000.0), 1, ApprovalType::Any)
            .set_assignee(1, &clerk.id, 1),
        tiers
            .clone()
            .set_level(2, Some(10_000.01), None, 0, ApprovalType::All)
            .set_assignee(2, &manager.id, 1),
        tiers
            .set_level(2, Some(10_000.01), None, 0, ApprovalType::All)
            .set_assignee(3, &director.id, 2),
    ];
    store.store_rule_rows("salesord", &rows)?;

    let service = ApprovalService::new(store.clone(), store.clone());

    let transaction_id = utils::new_transaction_id()?;
    let mut order = Transaction::new("salesord", &transaction_id)
        .with_field("subsidiary", 1.0)
        .with_field("total", 25_000.0)
        .with_line("server rack")
        .with_line("installation");
    store.commit(&mut order)?;

    let outcome = service.resolve_and_route_for_approval(&order)?;
    println!("routing: {outcome:?}");

    for approver in [&manager, &director] {
        let progress = service.process_approval_action(
            Action::Approve,
            "salesord",
            &transaction_id,
            approver,
        )?;
        println!("{} approved, status: {:?}", approver.name, progress.status);
    }

    Ok(())
}
