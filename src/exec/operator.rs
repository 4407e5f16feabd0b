// src/exec/operator.rs

//! The contract every backend implements.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::dag::ScheduledInstance;
use crate::state::RunConfig;

pub type OperatorFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Per-invocation context handed to an operator.
#[derive(Debug, Clone)]
pub struct OperatorContext {
    pub worker_id: usize,
    pub params: Arc<RunConfig>,
    /// Fires when the run is cancelled. Long-running operators should watch it.
    pub cancel: CancellationToken,
}

/// Runs one kind of instance for one asset type.
///
/// Returning `Err` fails the instance; the scheduler cascades it. Retries,
/// if any, are the operator's business.
pub trait Operator: Send + Sync + Debug {
    fn run<'a>(
        &'a self,
        ctx: &'a OperatorContext,
        instance: &'a ScheduledInstance,
    ) -> OperatorFuture<'a>;
}

/// Does nothing and always succeeds.
#[derive(Debug, Clone, Default)]
pub struct NoOpOperator;

impl Operator for NoOpOperator {
    fn run<'a>(
        &'a self,
        _ctx: &'a OperatorContext,
        _instance: &'a ScheduledInstance,
    ) -> OperatorFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}
