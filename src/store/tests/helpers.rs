use crate::store::Store;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Log path inside a fresh temporary directory. Keep the `TempDir` alive
/// for the duration of the test.
pub fn temp_log() -> (TempDir, PathBuf) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.db");
    (dir, path)
}

/// New store instance on `path`, already loaded.
pub fn open_loaded(path: &Path) -> Store {
    let mut store = Store::new(path);
    store.load().expect("load");
    store
}

/// Sorted copy of `list_all()` for order-independent comparisons.
pub fn sorted_values(store: &Store) -> Vec<Vec<u8>> {
    let mut values = store.list_all();
    values.sort();
    values
}
