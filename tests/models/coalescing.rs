//! Batch Coalescing Tests
//!
//! Changes to the same model within one scheduling turn reach listeners as
//! a single net change.

use crate::common::*;
use acimem::{ChangeBatch, FieldEncoding, ModelSpec, StorageKind};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

fn accounts() -> Rc<ModelSpec> {
    Rc::new(
        ModelSpec::new("accounts")
            .with_storage(StorageKind::Memory)
            .field("owner", FieldEncoding::Text)
            .field("balance", FieldEncoding::Integer),
    )
}

fn capture(runtime: &Runtime) -> Rc<RefCell<Vec<ChangeBatch>>> {
    let batches = Rc::new(RefCell::new(Vec::new()));
    let sink = batches.clone();
    runtime.batcher().on_batch_flush(move |batch| {
        sink.borrow_mut().push(batch.clone());
        Ok(())
    });
    batches
}

#[test]
fn create_then_delete_in_one_turn_delivers_nothing() {
    let runtime = manual_runtime();
    let batches = capture(&runtime);
    let spec = accounts();

    let gone = runtime.create(&spec, Account::new("gone", 1)).unwrap();
    gone.delete().unwrap();
    let kept = runtime.create(&spec, Account::new("kept", 2)).unwrap();

    assert_eq!(runtime.run_pending_turns(), 1);
    let batches = batches.borrow();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0].creates[0].key, *kept.key());
}

#[test]
fn create_and_two_updates_deliver_one_create_with_final_values() {
    let runtime = manual_runtime();
    let batches = capture(&runtime);
    let spec = accounts();

    let account = runtime.create(&spec, Account::new("ada", 10)).unwrap();
    account.update(|a| a.balance = 20).unwrap();
    runtime
        .memory()
        .tx(|| account.update(|a| a.owner = "ada l.".to_string()))
        .unwrap();

    runtime.run_pending_turns();
    let batches = batches.borrow();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert!(batch.updates.is_empty());
    assert!(batch.deletes.is_empty());
    assert_eq!(batch.creates.len(), 1);
    assert_eq!(batch.creates[0].row["balance"], json!(20));
    assert_eq!(batch.creates[0].row["owner"], json!("ada l."));
}

#[test]
fn separate_turns_deliver_separate_batches() {
    let runtime = manual_runtime();
    let batches = capture(&runtime);
    let spec = accounts();

    let account = runtime.create(&spec, Account::new("bo", 1)).unwrap();
    runtime.run_pending_turns();
    account.update(|a| a.balance += 1).unwrap();
    account.update(|a| a.balance += 1).unwrap();
    runtime.run_pending_turns();

    let batches = batches.borrow();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].updates.len(), 1);
    assert_eq!(batches[1].updates[0].row["balance"], json!(3));
    assert_eq!(runtime.batcher().flush_count(), 2);
}

#[test]
fn update_after_delete_is_rejected_and_logged() {
    let runtime = manual_runtime();
    let spec = accounts();
    let account = runtime.create(&spec, Account::new("cy", 1)).unwrap();
    runtime.run_pending_turns();

    account.delete().unwrap();
    // The update still commits in memory; the batcher refuses to resurrect
    // a deleted row.
    account.update(|a| a.balance = 2).unwrap();
    let batch = runtime.flush();
    assert_eq!(batch.deletes.len(), 1);
    assert!(batch.updates.is_empty());
}

#[test]
fn rows_failing_the_spec_are_skipped() {
    let runtime = manual_runtime();
    let strict = Rc::new(
        ModelSpec::new("accounts")
            .with_storage(StorageKind::Memory)
            .field("nickname", FieldEncoding::Text),
    );
    runtime.create(&strict, Account::new("dee", 1)).unwrap();
    let ok = runtime.create(&accounts(), Account::new("eve", 1)).unwrap();

    let batch = runtime.flush();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch.creates[0].key, *ok.key());
}
