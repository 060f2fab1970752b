use crate::{CacheError, StoragePort, SCENE_CACHE_KEY};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Stripped from ids, so it only ever appears between the two halves.
const KEY_SEPARATOR: char = '\u{1f}';

fn key_part(id: &str) -> String {
    id.replace(KEY_SEPARATOR, "")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(series_id: &str, scene_id: &str) -> Self {
        Self(format!(
            "{}{KEY_SEPARATOR}{}",
            key_part(series_id),
            key_part(scene_id)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn series_id(&self) -> &str {
        self.0.split(KEY_SEPARATOR).next().unwrap_or_default()
    }

    pub fn scene_id(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map(|(_, scene)| scene)
            .unwrap_or_default()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.series_id(), self.scene_id())
    }
}

/// Opaque JSON object stored per scene
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheEntry(Map<String, Value>);

impl CacheEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry written after a successful video generation
    pub fn preview(download_url: impl Into<String>, last_frame: Option<String>) -> Self {
        let mut entry = Self::new().with("downloadUrl", download_url.into());
        if let Some(frame) = last_frame {
            entry = entry.with("lastFrame", frame);
        }
        entry
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn download_url(&self) -> Option<&str> {
        self.0.get("downloadUrl").and_then(Value::as_str)
    }

    pub fn last_frame(&self) -> Option<&str> {
        self.0.get("lastFrame").and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Top-level fields of `other` win; nulls in `other` are ignored.
    pub fn merge(&mut self, other: CacheEntry) {
        for (field, value) in other.0 {
            if !value.is_null() {
                self.0.insert(field, value);
            }
        }
    }
}

/// Write-through scene preview cache.
///
/// The in-memory map is authoritative after [`SceneContentCache::open`];
/// every put rewrites the whole blob.
#[derive(Clone)]
pub struct SceneContentCache {
    storage: Arc<dyn StoragePort>,
    entries: Arc<RwLock<BTreeMap<String, CacheEntry>>>,
}

impl SceneContentCache {
    /// Load the blob eagerly. A corrupt blob starts the cache empty; an
    /// unreadable store is an error.
    pub fn open(storage: Arc<dyn StoragePort>) -> Result<Self, CacheError> {
        let entries = match storage.load(SCENE_CACHE_KEY)? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(%err, "discarding unreadable scene cache");
                    BTreeMap::new()
                }
            },
            None => BTreeMap::new(),
        };
        tracing::debug!(entries = entries.len(), "scene cache loaded");
        Ok(Self {
            storage,
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    pub fn get(&self, series_id: &str, scene_id: &str) -> Option<CacheEntry> {
        let key = CacheKey::new(series_id, scene_id);
        self.entries.read().get(key.as_str()).cloned()
    }

    /// Shallow-merge `entry` into the stored one and flush. A failed flush is
    /// logged; the merged value is kept in memory either way.
    pub fn put(&self, series_id: &str, scene_id: &str, entry: CacheEntry) -> CacheEntry {
        let key = CacheKey::new(series_id, scene_id);
        let merged = {
            let mut entries = self.entries.write();
            let stored = entries.entry(key.as_str().to_string()).or_default();
            stored.merge(entry);
            stored.clone()
        };
        if let Err(err) = self.flush() {
            tracing::warn!(key = %key, %err, "scene cache flush failed");
        }
        merged
    }

    pub fn flush(&self) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(&*self.entries.read())?;
        self.storage.save(SCENE_CACHE_KEY, &bytes)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn entries_for_series(&self, series_id: &str) -> Vec<(String, CacheEntry)> {
        let prefix = format!("{}{KEY_SEPARATOR}", key_part(series_id));
        self.entries
            .read()
            .iter()
            .filter_map(|(key, entry)| {
                key.strip_prefix(&prefix)
                    .map(|scene| (scene.to_string(), entry.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileStorage, MemoryStorage};
    use serde_json::json;

    fn memory_cache() -> (Arc<MemoryStorage>, SceneContentCache) {
        let storage = Arc::new(MemoryStorage::new());
        let cache = SceneContentCache::open(storage.clone()).unwrap();
        (storage, cache)
    }

    #[test]
    fn test_put_merges_shallowly() {
        let (_, cache) = memory_cache();
        cache.put("s", "c", CacheEntry::new().with("downloadUrl", "A"));
        cache.put("s", "c", CacheEntry::new().with("lastFrame", "B"));
        let entry = cache.get("s", "c").unwrap();
        assert_eq!(entry.download_url(), Some("A"));
        assert_eq!(entry.last_frame(), Some("B"));
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"downloadUrl": "A", "lastFrame": "B"})
        );
    }

    #[test]
    fn test_put_is_idempotent() {
        let (storage, cache) = memory_cache();
        let entry = CacheEntry::preview("https://x/v.mp4", Some("https://x/f.png".into()));
        cache.put("s", "c", entry.clone());
        let once = cache.get("s", "c");
        let blob_once = storage.blob(SCENE_CACHE_KEY);
        cache.put("s", "c", entry);
        assert_eq!(cache.get("s", "c"), once);
        assert_eq!(storage.blob(SCENE_CACHE_KEY), blob_once);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path()));
        let cache = SceneContentCache::open(storage.clone()).unwrap();
        cache.put("series-1", "S1", CacheEntry::preview("https://x/video.mp4", None));

        let reopened = SceneContentCache::open(storage).unwrap();
        assert_eq!(
            reopened.get("series-1", "S1").unwrap().download_url(),
            Some("https://x/video.mp4")
        );
    }

    #[test]
    fn test_flush_failure_keeps_memory() {
        let (storage, cache) = memory_cache();
        storage.set_fail_saves(true);
        let merged = cache.put("s", "c", CacheEntry::preview("A", None));
        assert_eq!(merged.download_url(), Some("A"));
        assert_eq!(cache.get("s", "c").unwrap().download_url(), Some("A"));
        assert!(storage.blob(SCENE_CACHE_KEY).is_none());
    }

    #[test]
    fn test_corrupt_blob_starts_empty() {
        let storage = Arc::new(MemoryStorage::with_blob(SCENE_CACHE_KEY, "{not json"));
        let cache = SceneContentCache::open(storage).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_keys_do_not_collide() {
        let (_, cache) = memory_cache();
        cache.put("ab", "c", CacheEntry::preview("first", None));
        cache.put("a", "bc", CacheEntry::preview("second", None));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("ab", "c").unwrap().download_url(), Some("first"));

        let key = CacheKey::new("series", "scene");
        assert_eq!(key.series_id(), "series");
        assert_eq!(key.scene_id(), "scene");
        assert_eq!(cache.entries_for_series("a").len(), 1);
    }

    #[test]
    fn test_separator_in_ids_is_stripped() {
        let key = CacheKey::new("series\u{1f}x", "\u{1f}scene");
        assert_eq!(key.series_id(), "seriesx");
        assert_eq!(key.scene_id(), "scene");

        let (_, cache) = memory_cache();
        cache.put("a\u{1f}", "b\u{1f}c", CacheEntry::preview("only", None));
        assert_eq!(cache.get("a", "bc").unwrap().download_url(), Some("only"));
        let entries = cache.entries_for_series("a\u{1f}");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "bc");
    }
}
