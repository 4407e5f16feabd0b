// src/exec/mod.rs

//! Execution layer.
//!
//! - [`operator`] defines the `Operator` trait backends implement.
//! - [`registry`] maps `(asset type, instance type)` to an operator.
//! - [`shell`] is the built-in operator that runs commands through `sh -c`.
//! - [`worker`] owns the concurrent worker pool that drains the work queue.

pub mod operator;
pub mod registry;
pub mod shell;
pub mod worker;

pub use operator::{NoOpOperator, Operator, OperatorContext, OperatorFuture};
pub use registry::{OperatorRegistry, default_registry};
pub use shell::ShellOperator;
pub use worker::ConcurrentExecutor;
