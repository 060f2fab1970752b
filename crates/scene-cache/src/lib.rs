/// Durable "last known good preview" cache
///
/// One JSON map under a single storage key, loaded once at startup and
/// rewritten in full on every put.
use std::path::PathBuf;
use thiserror::Error;

mod cache;
pub use cache::*;

mod storage;
pub use storage::*;

/// Storage key holding every series/scene entry
pub const SCENE_CACHE_KEY: &str = "shortplay.scene-content-cache";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("cache encoding: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-user data directory for the cache files
pub fn default_cache_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("shortplay")
}
