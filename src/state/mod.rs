// src/state/mod.rs

//! Run-state snapshots.
//!
//! - [`snapshot`] defines the serialized form and the status aggregation.
//! - [`store`] persists snapshots through the [`FileSystem`](crate::fs::FileSystem)
//!   abstraction.

pub mod snapshot;
pub mod store;

pub use snapshot::{
    InstanceState, Metadata, PipelineState, RunConfig, aggregate_status, compatibility_hash,
    generate_run_id,
};
pub use store::StateStore;
