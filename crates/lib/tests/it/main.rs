/*! Integration tests for Rosetta.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - tree: Tests for EntryTree and DeltaTrackingTree through the public API
 * - codec: Tests for packets written to and read from real sockets
 * - server: Tests for the server's handshake and lock protocol over TCP
 * - end_to_end: Whole sessions with several clients editing the same mappings
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("rosetta=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod codec;
mod end_to_end;
mod helpers;
mod server;
mod tree;
