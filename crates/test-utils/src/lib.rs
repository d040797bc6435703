pub mod builders;
pub mod recorder;

use std::sync::Once;
use std::time::Duration;

use taskgate::task::{Task, TaskError};
use tracing_subscriber::{EnvFilter, fmt};

pub use recorder::{Phase, RecordingObserver};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=taskgate=trace cargo test`
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
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Task whose body finishes immediately without errors.
pub fn noop_task(name: &str) -> Task {
    Task::builder(name).build()
}

/// Task whose body finishes immediately with `message` as its only error.
pub fn failing_task(name: &str, message: &str) -> Task {
    let message = message.to_string();
    Task::builder(name)
        .work_fn(move |task: &Task| {
            task.finish_with_error(Some(TaskError::failed(message.clone())))
        })
        .build()
}

/// Task handed straight to `Pending`, as an engine would.
pub fn pending_task(name: &str) -> Task {
    let task = noop_task(name);
    task.will_enqueue();
    task
}
