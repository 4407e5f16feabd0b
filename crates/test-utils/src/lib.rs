pub mod builders;
pub mod fake_operator;

use std::sync::{Arc, Once};

use assetrun::config::Pipeline;
use assetrun::dag::Scheduler;
use assetrun::engine::{RunOutcome, RunRequest, execute_run};
use assetrun::exec::OperatorRegistry;
use assetrun::state::RunConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Run parameters with `workers` workers and defaults for the rest.
pub fn params(workers: usize) -> RunConfig {
    RunConfig {
        workers,
        ..RunConfig::default()
    }
}

/// Scheduler for `pipeline` with a fixed run id.
pub fn scheduler_for(pipeline: &Pipeline) -> Arc<Scheduler> {
    Arc::new(Scheduler::new(pipeline, "2024_01_01_00_00_00"))
}

/// Execute a full run without persisting a snapshot.
pub async fn run_to_completion(
    scheduler: Arc<Scheduler>,
    registry: OperatorRegistry,
    workers: usize,
) -> RunOutcome {
    let request = RunRequest {
        scheduler,
        registry: Arc::new(registry),
        params: Arc::new(params(workers)),
        store: None,
        reporter: None,
        cancel: CancellationToken::new(),
    };

    with_timeout(execute_run(request))
        .await
        .expect("run should not fail")
}
