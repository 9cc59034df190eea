use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

/// One stored upload as the registry reports it. `storage_key` is the
/// on-disk entry name and the external reference; `display_name` is the
/// uploader's original filename and is never used as a path.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub storage_key: String,
    pub display_name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}
