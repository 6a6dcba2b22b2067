//! Context Fidelity Under Interleaving
//!
//! Two async transactions suspended and resumed in alternation on one
//! thread. Every time either body runs, the ambient transaction is its own.

use crate::common::*;
use acimem::{sleep, spawn_local, Transaction, TxOptions, TxnId};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;

type Trace = Rc<RefCell<Vec<(&'static str, Option<TxnId>)>>>;

async fn body(name: &'static str, trace: Trace, pause: u64) -> Result<TxnId> {
    let own = Transaction::current()
        .map(|t| t.id())
        .ok_or_else(|| Error::scope_misuse("no ambient transaction"))?;
    for _ in 0..3 {
        trace
            .borrow_mut()
            .push((name, Transaction::current().map(|t| t.id())));
        sleep(Duration::from_millis(pause)).await;
    }
    trace
        .borrow_mut()
        .push((name, Transaction::current().map(|t| t.id())));
    Ok(own)
}

#[tokio::test(flavor = "current_thread")]
async fn each_body_sees_only_its_own_transaction() {
    init_tracing();
    LocalSet::new()
        .run_until(async {
            let memory = Memory::new();
            let trace: Trace = Rc::new(RefCell::new(Vec::new()));

            let run = |name: &'static str, pause: u64| {
                let memory = memory.clone();
                let trace = trace.clone();
                spawn_local(async move {
                    memory
                        .tx_async_with(TxOptions::named(name), || body(name, trace.clone(), pause))
                        .await
                })
            };

            let a = run("a", 2);
            let b = run("b", 3);
            let a_id = a.await.unwrap().unwrap();
            let b_id = b.await.unwrap().unwrap();
            assert_ne!(a_id, b_id);

            let trace = trace.borrow();
            assert_eq!(trace.len(), 8);
            for (name, seen) in trace.iter() {
                let expected = if *name == "a" { a_id } else { b_id };
                assert_eq!(*seen, Some(expected), "{} saw a foreign transaction", name);
            }

            // The two bodies really did alternate.
            let order: Vec<&str> = trace.iter().map(|(n, _)| *n).collect();
            assert_eq!(&order[..2], &["a", "b"]);

            assert!(Transaction::current().is_none());
        })
        .await;
}
