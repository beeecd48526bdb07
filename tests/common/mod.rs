#![allow(dead_code)]

use file_provisioning::backend::{Columns, RowStore, RowStoreFactory};
use file_provisioning::config::StoreConfig;
use file_provisioning::monitor::{MemoryMonitor, Monitor};
use file_provisioning::provider::FileProvider;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const CORRELATION_ID: &str = "test-correlation";
pub const DEVICE_SCHEMA: &str = "urn:example:schemas:Device";

/// Store configuration in a fresh temporary folder, with one extension schema
pub fn test_config() -> (TempDir, StoreConfig) {
    let dir = TempDir::new().expect("Failed to create temporary directory");
    let config = StoreConfig::new(dir.path()).with_extension(DEVICE_SCHEMA, &["serialNumber", "owner"]);
    (dir, config)
}

/// Open a row store in a fresh temporary folder
pub async fn setup_test_store() -> (TempDir, StoreConfig, Arc<dyn RowStore>, Arc<MemoryMonitor>) {
    let (dir, config) = test_config();
    let monitor = Arc::new(MemoryMonitor::new());
    let store = RowStoreFactory::open(&config, monitor.clone() as Arc<dyn Monitor>)
        .await
        .expect("Failed to open row store");
    (dir, config, store, monitor)
}

/// Open a provider in a fresh temporary folder
pub async fn setup_test_provider() -> (TempDir, StoreConfig, FileProvider, Arc<MemoryMonitor>) {
    let (dir, config) = test_config();
    let monitor = Arc::new(MemoryMonitor::new());
    let provider = FileProvider::open(&config, monitor.clone() as Arc<dyn Monitor>)
        .await
        .expect("Failed to open provider");
    (dir, config, provider, monitor)
}

pub fn columns(pairs: &[(&str, &str)]) -> Columns {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Raw lines of the data file, header included
pub fn file_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("Failed to read data file")
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
