//! Shared fixtures for integration tests: store-backed backends, a capturing
//! logger and a broker with injectable failures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use dualwrite::backend::{Args, FnBackend};
use dualwrite::logging::Logger;
use dualwrite::messaging::{Broker, BrokerError, BrokerResult, InMemoryBroker, Subscription};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Key/value mapping a backend writes into
#[derive(Clone, Default)]
pub struct Store {
    data: Arc<Mutex<HashMap<String, String>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.data.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    fn insert(&self, key: String, value: String) {
        self.data.lock().insert(key, value);
    }
}

fn arg_string(args: &Args, index: usize) -> String {
    match args.get(index) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// `update(k, v)` stores `"<name>: v"` under `k` and returns `"<name> updated"`;
/// `get(k)` returns the stored value
pub fn store_backend(name: &'static str, store: &Store) -> FnBackend {
    let update_store = store.clone();
    let get_store = store.clone();

    FnBackend::builder()
        .operation("update", move |args| {
            let store = update_store.clone();
            async move {
                store.insert(arg_string(&args, 0), format!("{name}: {}", arg_string(&args, 1)));
                Ok(json!(format!("{name} updated")))
            }
        })
        .operation("get", move |args| {
            let store = get_store.clone();
            async move { Ok(json!(store.get(&arg_string(&args, 0)))) }
        })
        .build()
}

/// Like [`store_backend`] but `update` sleeps for `delay` before writing
pub fn slow_store_backend(name: &'static str, store: &Store, delay: Duration) -> FnBackend {
    let store = store.clone();
    FnBackend::builder()
        .operation("update", move |args| {
            let store = store.clone();
            async move {
                tokio::time::sleep(delay).await;
                store.insert(arg_string(&args, 0), format!("{name}: {}", arg_string(&args, 1)));
                Ok(json!(format!("{name} updated")))
            }
        })
        .build()
}

/// Backend whose `update` always fails with `message`
pub fn failing_backend(message: &'static str) -> FnBackend {
    FnBackend::builder()
        .operation("update", move |_| async move { Err(anyhow!(message)) })
        .build()
}

/// Every `(operation, args)` a recording backend received, in order
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<(String, Args)>>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<(String, Args)> {
        self.calls.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }
}

/// Backend declaring `operations` that records each call and echoes its args
///
/// Calls whose first argument equals `"fail"` are recorded and then rejected.
pub fn recording_backend(operations: &[&str]) -> (FnBackend, CallLog) {
    let log = CallLog::default();
    let mut builder = FnBackend::builder();

    for operation in operations {
        let log = log.clone();
        let name = operation.to_string();
        builder = builder.operation(*operation, move |args: Args| {
            let log = log.clone();
            let name = name.clone();
            async move {
                log.calls.lock().push((name.clone(), args.clone()));
                if args.first() == Some(&json!("fail")) {
                    return Err(anyhow!("{name} rejected"));
                }
                Ok(json!(args))
            }
        });
    }

    (builder.build(), log)
}

/// Logger that keeps everything it receives
#[derive(Default)]
pub struct CapturingLogger {
    logs: Mutex<Vec<String>>,
    infos: Mutex<Vec<String>>,
    errors: Mutex<Vec<(String, String)>>,
}

impl CapturingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().clone()
    }

    pub fn errors(&self) -> Vec<(String, String)> {
        self.errors.lock().clone()
    }

    pub fn errors_containing(&self, needle: &str) -> Vec<(String, String)> {
        self.errors()
            .into_iter()
            .filter(|(message, _)| message.contains(needle))
            .collect()
    }
}

impl Logger for CapturingLogger {
    fn log(&self, message: &str) {
        self.logs.lock().push(message.to_string());
    }

    fn info(&self, message: &str) {
        self.infos.lock().push(message.to_string());
    }

    fn error(&self, message: &str, detail: &str) {
        self.errors.lock().push((message.to_string(), detail.to_string()));
    }
}

/// In-memory broker whose list operations can be made to fail or lag
#[derive(Clone, Default)]
pub struct FlakyBroker {
    inner: InMemoryBroker,
    fail_pushes: Arc<AtomicBool>,
    push_delay: Arc<Mutex<Option<Duration>>>,
    /// Pops succeed this many times, then fail while set
    pops_before_failure: Arc<Mutex<Option<usize>>>,
    pops: Arc<AtomicUsize>,
}

impl FlakyBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryBroker {
        &self.inner
    }

    pub fn fail_pushes(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::SeqCst);
    }

    pub fn delay_pushes(&self, delay: Option<Duration>) {
        *self.push_delay.lock() = delay;
    }

    pub fn fail_pops_after(&self, successful: Option<usize>) {
        self.pops.store(0, Ordering::SeqCst);
        *self.pops_before_failure.lock() = successful;
    }
}

#[async_trait]
impl Broker for FlakyBroker {
    async fn push_right(&self, queue_key: &str, payload: &str) -> BrokerResult<()> {
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(BrokerError::queue_operation(queue_key, "push_right", "broker unavailable"));
        }
        let delay = *self.push_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.push_right(queue_key, payload).await
    }

    async fn pop_left(&self, queue_key: &str) -> BrokerResult<Option<String>> {
        let limit = *self.pops_before_failure.lock();
        if let Some(limit) = limit {
            if self.pops.fetch_add(1, Ordering::SeqCst) >= limit {
                return Err(BrokerError::queue_operation(queue_key, "pop_left", "broker unavailable"));
            }
        }
        self.inner.pop_left(queue_key).await
    }

    async fn publish(&self, topic: &str, payload: &str) -> BrokerResult<()> {
        self.inner.publish(topic, payload).await
    }

    async fn subscribe(&self, topic: &str) -> BrokerResult<Subscription> {
        self.inner.subscribe(topic).await
    }

    async fn len(&self, queue_key: &str) -> BrokerResult<usize> {
        self.inner.len(queue_key).await
    }

    fn provider_name(&self) -> &'static str {
        "flaky"
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
