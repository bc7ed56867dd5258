pub mod builders;
pub mod recorder;

use std::sync::Once;
use std::time::Duration;

use taskgraph::{Future, FutureStatus};
use tracing_subscriber::{EnvFilter, fmt};

pub use recorder::Recorder;

static INIT: Once = Once::new();

/// Default bound for anything a test waits on.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=taskgraph=trace cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .with_thread_names(true)
            .init();
    });
}

/// Take the result of `future`, failing the test if it is not ready within
/// [`TEST_TIMEOUT`].
pub fn wait_ready<R>(future: Future<R>) -> taskgraph::Result<R> {
    assert_eq!(
        future.wait_for(TEST_TIMEOUT),
        FutureStatus::Ready,
        "future not ready after {TEST_TIMEOUT:?}"
    );
    future.get()
}

/// Poll `cond` until it holds, failing the test after [`TEST_TIMEOUT`].
pub fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + TEST_TIMEOUT;
    while !cond() {
        assert!(
            std::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}
