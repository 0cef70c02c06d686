use crate::error::Result;
use crate::short_id::ShortId;
use async_trait::async_trait;

/// A mapping submitted through the batch save path.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlPair {
    pub short_id: ShortId,
    pub original_url: String,
    /// Owner to associate with the mapping. `None` leaves ownership
    /// unchanged.
    pub owner_id: Option<String>,
}

/// A non-deleted mapping belonging to an owner.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedUrl {
    pub short_id: ShortId,
    pub original_url: String,
}

/// Capability contract shared by all storage backends.
///
/// Backends differ in durability (volatile map, map with file snapshot,
/// relational) but expose identical semantics. Deletion is always soft:
/// a deleted mapping stays addressable so reads can distinguish
/// [`StoreError::Gone`] from [`StoreError::NotFound`].
#[async_trait]
pub trait UrlStore: Send + Sync + 'static {
    /// Inserts a new mapping through the conflict-checked path.
    ///
    /// Returns `Err(Conflict { existing_id })` if an un-deleted mapping
    /// already holds the same original URL, and `Err(IdTaken)` if the
    /// short ID is occupied by a different URL.
    async fn save(&self, short_id: &ShortId, url: &str) -> Result<()>;

    /// Returns the original URL for a short ID.
    ///
    /// `Err(NotFound)` if no mapping exists, `Err(Gone)` if the mapping
    /// exists but was deleted.
    async fn get(&self, short_id: &ShortId) -> Result<String>;

    /// Inserts all pairs in one operation.
    ///
    /// A pair whose short ID already exists only gets its owner attached,
    /// and only if the mapping currently has no owner (first writer wins,
    /// ownership is never overwritten). A pair whose URL is already live
    /// under a different short ID is silently skipped; unlike [`save`],
    /// this path never reports a conflict. The relational backend applies
    /// the whole batch in a single transaction; the volatile backends hold
    /// one lock for the whole operation.
    ///
    /// [`save`]: UrlStore::save
    async fn save_batch(&self, pairs: &[UrlPair]) -> Result<()>;

    /// Returns every non-deleted mapping owned by `owner_id`.
    /// Ordering is unspecified.
    async fn user_urls(&self, owner_id: &str) -> Result<Vec<OwnedUrl>>;

    /// Soft-deletes the given short IDs, but only those whose stored
    /// owner matches `owner_id`. IDs owned by someone else or unknown
    /// are silently skipped.
    async fn batch_delete_user_urls(&self, owner_id: &str, short_ids: &[ShortId]) -> Result<()>;
}

/// Backend reachability probe.
///
/// Backends without an external dependency simply do not implement this;
/// callers treat the absence of a pinger as "assume healthy".
#[async_trait]
pub trait Pinger: Send + Sync + 'static {
    async fn ping(&self) -> Result<()>;
}
