//! Subscription Tests
//!
//! Observers fire once per committed transaction, after every touched cell
//! is committed, and never for writes that did not commit.

use crate::common::*;
use acimem::{Event, FieldEncoding, ModelSpec, StorageKind};
use std::cell::RefCell;
use std::rc::Rc;

fn accounts() -> Rc<ModelSpec> {
    Rc::new(
        ModelSpec::new("accounts")
            .with_storage(StorageKind::Ephemeral)
            .field("balance", FieldEncoding::Integer),
    )
}

#[test]
fn observers_see_the_whole_transaction_committed() {
    let runtime = manual_runtime();
    let spec = accounts();
    let a = runtime.create(&spec, Account::new("a", 50)).unwrap();
    let b = runtime.create(&spec, Account::new("b", 50)).unwrap();

    // While a's observer runs, b must already hold its new value.
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let other = b.clone();
    let _sub = a.subscribe(move |change| {
        let b_now = other.get().unwrap().balance;
        sink.borrow_mut()
            .push((change.previous.balance, change.current.balance, b_now));
    });

    runtime
        .memory()
        .tx(|| -> Result<()> {
            a.update(|x| x.balance -= 25)?;
            b.update(|x| x.balance += 25)
        })
        .unwrap();

    assert_eq!(*seen.borrow(), vec![(50, 25, 75)]);
}

#[test]
fn keyed_subscription_ignores_other_fields() {
    let runtime = manual_runtime();
    let account = runtime.create(&accounts(), Account::new("ann", 1)).unwrap();

    let hits = Rc::new(RefCell::new(0));
    let counter = hits.clone();
    let _sub = account.subscribe_to(["balance"], move |_| *counter.borrow_mut() += 1);

    account.update(|a| a.owner = "anne".to_string()).unwrap();
    assert_eq!(*hits.borrow(), 0);
    account.update(|a| a.balance = 2).unwrap();
    assert_eq!(*hits.borrow(), 1);
}

#[test]
fn dropped_subscription_stops_notifications() {
    let runtime = manual_runtime();
    let counter = runtime.model(0i32).unwrap();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    let sub = counter.subscribe(move |change| sink.borrow_mut().push(change.event));

    counter.set(1).unwrap();
    drop(sub);
    counter.set(2).unwrap();

    assert_eq!(*events.borrow(), vec![Event::Update]);
}

#[test]
fn panicking_observer_does_not_fail_the_commit() {
    let runtime = manual_runtime();
    let counter = runtime.model(0i32).unwrap();
    let calls = Rc::new(RefCell::new(0));
    let after = calls.clone();

    let _bad = counter.subscribe(|_| panic!("observer bug"));
    let _good = counter.subscribe(move |_| *after.borrow_mut() += 1);

    runtime.memory().tx(|| counter.set(5)).unwrap();
    assert_eq!(counter.get().unwrap(), 5);
    assert_eq!(*calls.borrow(), 1);
}
