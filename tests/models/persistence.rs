//! Persistence Tests
//!
//! Flushed batches written to a resolver, and models hydrated back from it.

use crate::common::*;
use acimem::{
    FieldEncoding, InMemoryResolver, ModelSpec, RelationalModel, RuntimeConfig, StorageKind,
    CONFIG_FILE_NAME,
};
use serde_json::json;
use std::rc::Rc;
use tempfile::TempDir;

fn ledger() -> Rc<ModelSpec> {
    Rc::new(
        ModelSpec::new("accounts")
            .with_storage(StorageKind::Sql {
                db: "main".to_string(),
                table: "ledger".to_string(),
            })
            .field("owner", FieldEncoding::Text)
            .field("balance", FieldEncoding::Integer),
    )
}

#[test]
fn committed_transfer_lands_in_one_section() {
    let runtime = manual_runtime();
    let db = Rc::new(InMemoryResolver::new("ledger-db"));
    runtime.persist_to(db.clone());
    let spec = ledger();

    let from = runtime.create(&spec, Account::new("ann", 100)).unwrap();
    let to = runtime.create(&spec, Account::new("ben", 0)).unwrap();
    runtime.run_pending_turns();
    assert_eq!(db.len("ledger"), 2);

    runtime
        .memory()
        .tx(|| -> Result<()> {
            from.update(|a| a.balance -= 40)?;
            to.update(|a| a.balance += 40)
        })
        .unwrap();
    runtime.run_pending_turns();

    assert_eq!(db.get("ledger", from.key()).unwrap()["balance"], json!(60));
    assert_eq!(db.get("ledger", to.key()).unwrap()["balance"], json!(40));
    let stats = db.stats();
    assert_eq!(stats.begun, 2);
    assert_eq!(stats.committed, 2);
}

#[test]
fn failed_transaction_writes_nothing() {
    let runtime = manual_runtime();
    let db = Rc::new(InMemoryResolver::new("ledger-db"));
    runtime.persist_to(db.clone());
    let spec = ledger();
    let account = runtime.create(&spec, Account::new("ann", 100)).unwrap();
    runtime.run_pending_turns();

    let result: Result<()> = runtime.memory().tx(|| {
        account.update(|a| a.balance = 0)?;
        Err(Error::scope_misuse("declined"))
    });
    assert!(result.is_err());
    assert_eq!(runtime.run_pending_turns(), 0);
    assert_eq!(db.get("ledger", account.key()).unwrap()["balance"], json!(100));
}

#[test]
fn failing_resolver_rolls_back_and_keeps_memory() {
    let runtime = manual_runtime();
    let db = Rc::new(InMemoryResolver::new("ledger-db"));
    runtime.persist_to(db.clone());
    db.fail_commits(true);

    let account = runtime.create(&ledger(), Account::new("ann", 5)).unwrap();
    runtime.run_pending_turns();

    assert!(db.is_empty());
    assert_eq!(db.stats().rolled_back, 1);
    assert_eq!(account.get().unwrap().balance, 5);
}

#[test]
fn reload_from_resolver_into_fresh_runtime() {
    let runtime = manual_runtime();
    let db = Rc::new(InMemoryResolver::new("ledger-db"));
    runtime.persist_to(db.clone());
    let spec = ledger();
    let ann = runtime.create(&spec, Account::new("ann", 7)).unwrap();
    let ben = runtime.create(&spec, Account::new("ben", 9)).unwrap();
    ben.delete().unwrap();
    runtime.run_pending_turns();
    assert_eq!(db.len("ledger"), 1);

    let fresh = manual_runtime();
    let loaded: Vec<Rc<RelationalModel<Account>>> = fresh.load(&spec, db.as_ref()).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].key(), ann.key());
    assert_eq!(loaded[0].get().unwrap().balance, 7);
    assert_eq!(fresh.run_pending_turns(), 0);
}

#[test]
fn runtime_opens_from_config_directory() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "batching = \"manual\"\n\n[memory]\nhistory_prune_threshold = 5\n",
    )
    .unwrap();

    let runtime = Runtime::open(dir.path()).unwrap();
    assert_eq!(runtime.config().memory.history_prune_threshold, 5);
    assert_eq!(runtime.config().batching, "manual");

    let counter = runtime.model(0u64).unwrap();
    runtime.memory().tx(|| counter.update(|n| *n += 1)).unwrap();
    assert_eq!(counter.get().unwrap(), 1);

    let defaults = TempDir::new().unwrap();
    let runtime = Runtime::open(defaults.path()).unwrap();
    assert_eq!(runtime.config(), &RuntimeConfig::default());
    assert!(defaults.path().join(CONFIG_FILE_NAME).exists());
}
