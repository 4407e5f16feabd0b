use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use assetrun::dag::ScheduledInstance;
use assetrun::exec::{Operator, OperatorContext, OperatorFuture, OperatorRegistry};

use crate::builders::TEST_ASSET_TYPE;

/// A fake operator that:
/// - records the human id of every instance it runs, in start order
/// - fails the instances listed in `failing`
/// - optionally sleeps before finishing
/// - tracks the highest number of concurrent invocations
#[derive(Debug, Default)]
pub struct RecordingOperator {
    executed: Mutex<Vec<String>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, human_id: &str) -> Self {
        self.failing.insert(human_id.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Operator for RecordingOperator {
    fn run<'a>(
        &'a self,
        _ctx: &'a OperatorContext,
        instance: &'a ScheduledInstance,
    ) -> OperatorFuture<'a> {
        Box::pin(async move {
            self.executed.lock().unwrap().push(instance.human_id.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&instance.human_id) {
                return Err(anyhow!("instance '{}' failed on purpose", instance.human_id));
            }
            Ok(())
        })
    }
}

/// Panics for the listed instances and succeeds for everything else.
#[derive(Debug, Default)]
pub struct PanickingOperator {
    panicking: HashSet<String>,
}

impl PanickingOperator {
    pub fn new(human_ids: &[&str]) -> Self {
        Self {
            panicking: human_ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Operator for PanickingOperator {
    fn run<'a>(
        &'a self,
        _ctx: &'a OperatorContext,
        instance: &'a ScheduledInstance,
    ) -> OperatorFuture<'a> {
        Box::pin(async move {
            if self.panicking.contains(&instance.human_id) {
                panic!("boom in {}", instance.human_id);
            }
            Ok(())
        })
    }
}

/// Waits until the run is cancelled, then fails.
#[derive(Debug, Default)]
pub struct BlockingOperator {
    started: AtomicUsize,
}

impl BlockingOperator {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl Operator for BlockingOperator {
    fn run<'a>(
        &'a self,
        ctx: &'a OperatorContext,
        instance: &'a ScheduledInstance,
    ) -> OperatorFuture<'a> {
        Box::pin(async move {
            self.started.fetch_add(1, Ordering::SeqCst);
            ctx.cancel.cancelled().await;
            Err(anyhow!("'{}' cancelled", instance.human_id))
        })
    }
}

/// Registry that resolves every instance type of the test asset type to
/// `operator`.
pub fn registry_for(operator: Arc<dyn Operator>) -> OperatorRegistry {
    let mut registry = OperatorRegistry::new();
    registry.register_all(TEST_ASSET_TYPE, operator);
    registry
}
