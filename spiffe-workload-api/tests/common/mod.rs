use std::path::PathBuf;

use tempfile::TempDir;

/// Socket path inside a fresh tempdir. The guard must outlive the
/// agent, or the socket vanishes from under it.
pub fn socket_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let path = dir.path().join("agent.sock");
    (dir, path)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
