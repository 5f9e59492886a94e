//! Root module for test modules, so that the tests are built into a single binary.

mod asks;
mod module;
mod watcher;

const fn main() {}

use std::time::Duration;

/// Polls `condition` every millisecond until it holds.
///
/// Meant for paused-clock tests, where sleeping advances time instantly.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
