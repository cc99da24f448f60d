use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where recordings and the record store live on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Each recording gets a `<local_uuid>` directory under this root.
    pub records_root: PathBuf,
    /// JSON file backing the record store.
    pub store_path: PathBuf,
}
