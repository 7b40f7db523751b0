/*! Integration tests for Yusef.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - config: Loading and validating configuration files
 * - dispatch: Full request flows through the Dispatcher (routing, actions, errors)
 * - session: Multi-request session behaviour (rotation, conflicts, expiry, sweeping)
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("yusef=info".parse().unwrap()))
        .with_test_writer()
        .try_init();
}

mod config;
mod dispatch;
mod session;
