//! End-to-End Scenario
//!
//! An async transaction writes a cell, suspends, and reads its own write
//! back. Readers outside the transaction keep seeing the old value until the
//! transaction settles.

use crate::common::*;
use acimem::{sleep, spawn_local, Context};
use serde_json::{json, Value};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;

#[tokio::test(flavor = "current_thread")]
async fn write_suspend_read_then_settle() {
    init_tracing();
    LocalSet::new()
        .run_until(async {
            let memory = Memory::new();
            let (cell, _) = memory.create_cell(json!({"x": 1})).unwrap();
            let suspended = Rc::new(Cell::new(false));
            let settled = Rc::new(Cell::new(false));

            let task = {
                let memory = memory.clone();
                let cell = cell.clone();
                let suspended = suspended.clone();
                let settled = settled.clone();
                spawn_local(async move {
                    let result = memory
                        .tx_async(|| {
                            let cell = cell.clone();
                            let suspended = suspended.clone();
                            async move {
                                cell.write(json!({"x": 2}))?;
                                suspended.set(true);
                                sleep(Duration::ZERO).await;
                                assert_eq!(cell.read()?, json!({"x": 2}));
                                let outside: Value = Context::root().run(|| cell.read())?;
                                assert_eq!(outside, json!({"x": 1}));
                                Ok::<_, Error>(())
                            }
                        })
                        .await;
                    settled.set(true);
                    result
                })
            };

            while !suspended.get() {
                tokio::task::yield_now().await;
            }
            if !settled.get() {
                assert_eq!(cell.read().unwrap(), json!({"x": 1}));
            }

            task.await.unwrap().unwrap();
            assert_eq!(cell.read().unwrap(), json!({"x": 2}));
            assert_eq!(memory.in_flight_count(), 0);
        })
        .await;
}
