use crate::snapshot::{FileSnapshot, SnapshotRecord};
use async_trait::async_trait;
use shrink_core::error::{Result, StoreError};
use shrink_core::store::{OwnedUrl, UrlPair, UrlStore};
use shrink_core::ShortId;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct Entry {
    original_url: String,
    owner_id: Option<String>,
    deleted: bool,
}

/// All mutable state, guarded by a single mutex.
///
/// The mapping table, the reverse URL index and the ownership index must
/// stay consistent with each other, so every operation (reads included)
/// takes the one lock covering all three.
#[derive(Debug, Default)]
struct Inner {
    urls: HashMap<String, Entry>,
    /// original_url -> short_id for non-deleted mappings, answers the
    /// conflict check on `save`.
    by_original: HashMap<String, String>,
    /// owner_id -> short_ids; a cache over `Entry::owner_id`, rebuilt
    /// from records when a snapshot is loaded.
    owners: HashMap<String, Vec<String>>,
}

/// Volatile in-memory store, optionally persisted to a JSON snapshot file.
///
/// With a snapshot attached, [`MemoryStore::backup`] serializes the whole
/// map on shutdown and [`MemoryStore::with_snapshot`] reloads it at
/// startup. Deletion is soft in this backend too: deleted entries stay as
/// tombstones so reads can answer `Gone` instead of `NotFound`.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    snapshot: Option<FileSnapshot>,
}

impl MemoryStore {
    /// Creates an empty store with no file persistence.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            snapshot: None,
        }
    }

    /// Creates a store backed by a snapshot file, loading any existing
    /// records from it. A missing file starts an empty store.
    pub async fn with_snapshot(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        let snapshot = FileSnapshot::new(path);
        let records = snapshot.load().await?;

        let mut inner = Inner::default();
        for record in records {
            if !record.deleted {
                inner
                    .by_original
                    .entry(record.original_url.clone())
                    .or_insert_with(|| record.short_id.clone());
            }
            if let Some(owner) = &record.owner_id {
                inner
                    .owners
                    .entry(owner.clone())
                    .or_default()
                    .push(record.short_id.clone());
            }
            inner.urls.insert(
                record.short_id,
                Entry {
                    original_url: record.original_url,
                    owner_id: record.owner_id,
                    deleted: record.deleted,
                },
            );
        }

        Ok(Self {
            inner: Mutex::new(inner),
            snapshot: Some(snapshot),
        })
    }

    /// Persists the whole map to the snapshot file, if one is attached.
    ///
    /// Intended to be called once during process teardown. The lock is
    /// held across the write so the file never sees a half-updated map.
    pub async fn backup(&self) -> Result<()> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(());
        };

        let inner = self.inner.lock().await;
        let records: Vec<SnapshotRecord> = inner
            .urls
            .iter()
            .map(|(short_id, entry)| SnapshotRecord {
                short_id: short_id.clone(),
                original_url: entry.original_url.clone(),
                owner_id: entry.owner_id.clone(),
                deleted: entry.deleted,
            })
            .collect();

        snapshot.write(&records).await
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn attach_owner(owners: &mut HashMap<String, Vec<String>>, owner_id: &str, short_id: &str) {
    let ids = owners.entry(owner_id.to_string()).or_default();
    if !ids.iter().any(|id| id == short_id) {
        ids.push(short_id.to_string());
    }
}

#[async_trait]
impl UrlStore for MemoryStore {
    async fn save(&self, short_id: &ShortId, url: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner.by_original.get(url) {
            return Err(StoreError::Conflict {
                existing_id: ShortId::new_unchecked(existing.clone()),
            });
        }

        if inner.urls.contains_key(short_id.as_str()) {
            return Err(StoreError::IdTaken);
        }

        inner.urls.insert(
            short_id.as_str().to_owned(),
            Entry {
                original_url: url.to_owned(),
                owner_id: None,
                deleted: false,
            },
        );
        inner
            .by_original
            .insert(url.to_owned(), short_id.as_str().to_owned());

        Ok(())
    }

    async fn get(&self, short_id: &ShortId) -> Result<String> {
        let inner = self.inner.lock().await;

        match inner.urls.get(short_id.as_str()) {
            None => Err(StoreError::NotFound),
            Some(entry) if entry.deleted => Err(StoreError::Gone),
            Some(entry) => Ok(entry.original_url.clone()),
        }
    }

    async fn save_batch(&self, pairs: &[UrlPair]) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        for pair in pairs {
            match inner.urls.get_mut(pair.short_id.as_str()) {
                None => {
                    // A pair whose URL is already live under a different
                    // short ID is skipped, so the existing mapping keeps
                    // answering the conflict check.
                    if inner.by_original.contains_key(&pair.original_url) {
                        continue;
                    }
                    inner.urls.insert(
                        pair.short_id.as_str().to_owned(),
                        Entry {
                            original_url: pair.original_url.clone(),
                            owner_id: pair.owner_id.clone(),
                            deleted: false,
                        },
                    );
                    inner
                        .by_original
                        .insert(pair.original_url.clone(), pair.short_id.as_str().to_owned());
                    if let Some(owner) = &pair.owner_id {
                        attach_owner(&mut inner.owners, owner, pair.short_id.as_str());
                    }
                }
                Some(entry) => {
                    // First writer wins: ownership is only attached to
                    // mappings that have no owner yet.
                    if entry.owner_id.is_none() {
                        if let Some(owner) = &pair.owner_id {
                            entry.owner_id = Some(owner.clone());
                            attach_owner(&mut inner.owners, owner, pair.short_id.as_str());
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn user_urls(&self, owner_id: &str) -> Result<Vec<OwnedUrl>> {
        let inner = self.inner.lock().await;

        let Some(short_ids) = inner.owners.get(owner_id) else {
            return Ok(Vec::new());
        };

        let urls = short_ids
            .iter()
            .filter_map(|short_id| {
                let entry = inner.urls.get(short_id)?;
                if entry.deleted {
                    return None;
                }
                Some(OwnedUrl {
                    short_id: ShortId::new_unchecked(short_id.clone()),
                    original_url: entry.original_url.clone(),
                })
            })
            .collect();

        Ok(urls)
    }

    async fn batch_delete_user_urls(&self, owner_id: &str, short_ids: &[ShortId]) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        for short_id in short_ids {
            let Some(entry) = inner.urls.get_mut(short_id.as_str()) else {
                continue;
            };
            // Only the owner may delete; foreign IDs are a silent no-op.
            if entry.owner_id.as_deref() != Some(owner_id) || entry.deleted {
                continue;
            }

            entry.deleted = true;
            if inner.by_original.get(&entry.original_url) == Some(&short_id.as_str().to_owned()) {
                inner.by_original.remove(&entry.original_url);
            }
            if let Some(ids) = inner.owners.get_mut(owner_id) {
                ids.retain(|id| id != short_id.as_str());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ShortId {
        ShortId::new_unchecked(s)
    }

    fn pair(short_id: &str, url: &str, owner: Option<&str>) -> UrlPair {
        UrlPair {
            short_id: id(short_id),
            original_url: url.to_string(),
            owner_id: owner.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn save_and_get() {
        let store = MemoryStore::new();

        store.save(&id("abcd1234"), "https://example.com").await.unwrap();

        let url = store.get(&id("abcd1234")).await.unwrap();
        assert_eq!(url, "https://example.com");
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let store = MemoryStore::new();

        let err = store.get(&id("nope0000")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn duplicate_url_conflicts_with_existing_id() {
        let store = MemoryStore::new();

        store.save(&id("abcd1234"), "https://example.com").await.unwrap();

        let err = store
            .save(&id("wxyz9876"), "https://example.com")
            .await
            .unwrap_err();

        match err {
            StoreError::Conflict { existing_id } => {
                assert_eq!(existing_id.as_str(), "abcd1234");
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn occupied_id_is_reported_as_taken() {
        let store = MemoryStore::new();

        store.save(&id("abcd1234"), "https://one.example").await.unwrap();

        let err = store
            .save(&id("abcd1234"), "https://two.example")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IdTaken));

        // The original mapping is untouched.
        let url = store.get(&id("abcd1234")).await.unwrap();
        assert_eq!(url, "https://one.example");
    }

    #[tokio::test]
    async fn save_batch_attaches_owner_first_writer_wins() {
        let store = MemoryStore::new();

        store.save(&id("abcd1234"), "https://example.com").await.unwrap();

        store
            .save_batch(&[pair("abcd1234", "https://example.com", Some("alice"))])
            .await
            .unwrap();
        store
            .save_batch(&[pair("abcd1234", "https://example.com", Some("bob"))])
            .await
            .unwrap();

        let alice = store.user_urls("alice").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].short_id.as_str(), "abcd1234");

        assert!(store.user_urls("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_batch_inserts_new_pairs() {
        let store = MemoryStore::new();

        store
            .save_batch(&[
                pair("aaaa1111", "https://one.example", Some("alice")),
                pair("bbbb2222", "https://two.example", Some("alice")),
                pair("cccc3333", "https://three.example", None),
            ])
            .await
            .unwrap();

        assert_eq!(store.get(&id("cccc3333")).await.unwrap(), "https://three.example");
        assert_eq!(store.user_urls("alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn save_batch_skips_pairs_for_already_shortened_urls() {
        let store = MemoryStore::new();

        store.save(&id("abcd1234"), "https://example.com").await.unwrap();

        // The duplicate pair is dropped; the rest of the batch applies.
        store
            .save_batch(&[
                pair("wxyz9876", "https://example.com", Some("alice")),
                pair("bbbb2222", "https://other.example", Some("alice")),
            ])
            .await
            .unwrap();

        let err = store.get(&id("wxyz9876")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        assert_eq!(store.get(&id("bbbb2222")).await.unwrap(), "https://other.example");

        // The original mapping still answers the conflict check.
        let err = store
            .save(&id("cccc3333"), "https://example.com")
            .await
            .unwrap_err();
        match err {
            StoreError::Conflict { existing_id } => {
                assert_eq!(existing_id.as_str(), "abcd1234");
            }
            other => panic!("expected Conflict, got {other:?}"),
        }

        // Alice never owned the skipped pair.
        let urls = store.user_urls("alice").await.unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].short_id.as_str(), "bbbb2222");
    }

    #[tokio::test]
    async fn delete_marks_gone_and_frees_url() {
        let store = MemoryStore::new();

        store.save(&id("abcd1234"), "https://example.com").await.unwrap();
        store
            .save_batch(&[pair("abcd1234", "https://example.com", Some("alice"))])
            .await
            .unwrap();

        store
            .batch_delete_user_urls("alice", &[id("abcd1234")])
            .await
            .unwrap();

        let err = store.get(&id("abcd1234")).await.unwrap_err();
        assert!(matches!(err, StoreError::Gone));
        assert!(store.user_urls("alice").await.unwrap().is_empty());

        // The URL is shortenable again once its mapping is deleted.
        store.save(&id("wxyz9876"), "https://example.com").await.unwrap();
    }

    #[tokio::test]
    async fn delete_ignores_foreign_ids() {
        let store = MemoryStore::new();

        store.save(&id("abcd1234"), "https://example.com").await.unwrap();
        store
            .save_batch(&[pair("abcd1234", "https://example.com", Some("bob"))])
            .await
            .unwrap();

        store
            .batch_delete_user_urls("alice", &[id("abcd1234")])
            .await
            .unwrap();

        // Bob's mapping survives a deletion request from Alice.
        assert_eq!(store.get(&id("abcd1234")).await.unwrap(), "https://example.com");
        assert_eq!(store.user_urls("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_ignores_unknown_ids() {
        let store = MemoryStore::new();

        store
            .batch_delete_user_urls("alice", &[id("nope0000")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn user_urls_excludes_deleted() {
        let store = MemoryStore::new();

        store
            .save_batch(&[
                pair("aaaa1111", "https://one.example", Some("alice")),
                pair("bbbb2222", "https://two.example", Some("alice")),
            ])
            .await
            .unwrap();

        store
            .batch_delete_user_urls("alice", &[id("aaaa1111")])
            .await
            .unwrap();

        let urls = store.user_urls("alice").await.unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].short_id.as_str(), "bbbb2222");
    }

    #[tokio::test]
    async fn snapshot_round_trip_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.json");

        {
            let store = MemoryStore::with_snapshot(&path).await.unwrap();
            store.save(&id("abcd1234"), "https://example.com").await.unwrap();
            store
                .save_batch(&[pair("abcd1234", "https://example.com", Some("alice"))])
                .await
                .unwrap();
            store
                .save_batch(&[pair("gone0000", "https://dead.example", Some("alice"))])
                .await
                .unwrap();
            store
                .batch_delete_user_urls("alice", &[id("gone0000")])
                .await
                .unwrap();
            store.backup().await.unwrap();
        }

        let restored = MemoryStore::with_snapshot(&path).await.unwrap();

        assert_eq!(
            restored.get(&id("abcd1234")).await.unwrap(),
            "https://example.com"
        );
        // Tombstones survive the restart.
        let err = restored.get(&id("gone0000")).await.unwrap_err();
        assert!(matches!(err, StoreError::Gone));
        // The ownership index is rebuilt from records.
        let urls = restored.user_urls("alice").await.unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].short_id.as_str(), "abcd1234");
        // The conflict check still sees the loaded URL.
        let err = restored
            .save(&id("zzzz9999"), "https://example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn backup_without_snapshot_is_a_no_op() {
        let store = MemoryStore::new();
        store.save(&id("abcd1234"), "https://example.com").await.unwrap();
        store.backup().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_saves_keep_the_map_consistent() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let mut handles = vec![];

        for i in 0..10u64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let short_id = ShortId::new_unchecked(format!("id{i:06}"));
                store
                    .save(&short_id, &format!("https://example{i}.com"))
                    .await
                    .unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..10u64 {
            let short_id = ShortId::new_unchecked(format!("id{i:06}"));
            let url = store.get(&short_id).await.unwrap();
            assert_eq!(url, format!("https://example{i}.com"));
        }
    }
}
