use crate::error::ServiceError;
use crate::pipeline::{DeletePipeline, DeleteRequest, PipelineSettings};
use shrink_core::{Pinger, ShortId, StoreError, UrlPair, UrlStore};
use shrink_generator::IdGenerator;
use std::sync::Arc;
use tracing::warn;

/// One entry of a bulk shorten request. The correlation ID is an opaque
/// client token echoed back unchanged in the matching response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchShortenRequest {
    pub correlation_id: String,
    pub original_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchShortenResponse {
    pub correlation_id: String,
    pub short_url: String,
}

/// A mapping belonging to a user, with the short URL fully prefixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUrl {
    pub short_url: String,
    pub original_url: String,
}

/// Bounded number of fresh IDs tried when the store reports the
/// generated ID as occupied.
const MAX_ID_ATTEMPTS: usize = 3;

/// The registry service: orchestrates ID generation and store writes,
/// exposes expand/lookup, and owns the deletion pipeline.
///
/// All collaborators are constructor-injected; the service holds no
/// process-wide state. `close` must be called once during teardown to
/// drain the deletion pipeline.
pub struct UrlService<S: UrlStore, G: IdGenerator> {
    store: Arc<S>,
    generator: G,
    base_url: String,
    pinger: Option<Arc<dyn Pinger>>,
    pipeline: DeletePipeline,
}

impl<S: UrlStore, G: IdGenerator> UrlService<S, G> {
    /// Creates a service with the default pipeline settings. Must be
    /// called from within a tokio runtime (the pipeline spawns workers).
    pub fn new(
        store: S,
        generator: G,
        base_url: impl Into<String>,
        pinger: Option<Arc<dyn Pinger>>,
    ) -> Self {
        Self::with_pipeline_settings(store, generator, base_url, pinger, PipelineSettings::default())
    }

    /// Creates a service with custom deletion pipeline settings.
    pub fn with_pipeline_settings(
        store: S,
        generator: G,
        base_url: impl Into<String>,
        pinger: Option<Arc<dyn Pinger>>,
        settings: PipelineSettings,
    ) -> Self {
        let store = Arc::new(store);
        let pipeline = DeletePipeline::with_settings(Arc::clone(&store), settings);

        Self {
            store,
            generator,
            base_url: base_url.into(),
            pinger,
            pipeline,
        }
    }

    /// Returns a handle to the underlying store, e.g. for a shutdown
    /// snapshot backup by the embedding binary.
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// Shortens a URL and returns the full short URL.
    ///
    /// If the URL is already shortened, returns
    /// [`ServiceError::Conflict`] carrying the existing short URL; the
    /// caller is expected to surface that URL with an "already exists"
    /// signal rather than an error.
    pub async fn shorten(&self, url: &str) -> Result<String, ServiceError> {
        validate_url(url)?;
        let short_id = self.allocate(url).await?;
        Ok(short_id.to_url(&self.base_url))
    }

    /// Shortens a URL and associates the mapping with an owner.
    ///
    /// Ownership is attached through the batch save path after the
    /// mapping is stored (first writer wins); an attachment failure is
    /// logged but does not fail the request, since the mapping itself
    /// already exists.
    pub async fn shorten_with_owner(
        &self,
        url: &str,
        owner_id: &str,
    ) -> Result<String, ServiceError> {
        validate_url(url)?;
        let short_id = self.allocate(url).await?;

        if !owner_id.is_empty() {
            let pair = UrlPair {
                short_id: short_id.clone(),
                original_url: url.to_owned(),
                owner_id: Some(owner_id.to_owned()),
            };
            if let Err(err) = self.store.save_batch(std::slice::from_ref(&pair)).await {
                warn!(%owner_id, %err, "failed to attach owner to mapping");
            }
        }

        Ok(short_id.to_url(&self.base_url))
    }

    /// Shortens many URLs in one store operation.
    pub async fn shorten_batch(
        &self,
        requests: &[BatchShortenRequest],
    ) -> Result<Vec<BatchShortenResponse>, ServiceError> {
        self.shorten_batch_inner(requests, None).await
    }

    /// Shortens many URLs in one store operation, all owned by `owner_id`.
    pub async fn shorten_batch_with_owner(
        &self,
        requests: &[BatchShortenRequest],
        owner_id: &str,
    ) -> Result<Vec<BatchShortenResponse>, ServiceError> {
        self.shorten_batch_inner(requests, Some(owner_id)).await
    }

    /// Resolves a short ID back to its original URL.
    pub async fn expand(&self, short_id: &str) -> Result<String, ServiceError> {
        let short_id = ShortId::new(short_id)?;
        self.store
            .get(&short_id)
            .await
            .map_err(|err| self.map_store_error(err))
    }

    /// Lists every non-deleted mapping owned by `owner_id`, with short
    /// URLs prefixed by the configured base URL.
    pub async fn user_urls(&self, owner_id: &str) -> Result<Vec<UserUrl>, ServiceError> {
        let urls = self
            .store
            .user_urls(owner_id)
            .await
            .map_err(|err| self.map_store_error(err))?;

        Ok(urls
            .into_iter()
            .map(|owned| UserUrl {
                short_url: owned.short_id.to_url(&self.base_url),
                original_url: owned.original_url,
            })
            .collect())
    }

    /// Submits an asynchronous deletion of the owner's mappings.
    ///
    /// Fire-and-forget: returns as soon as the request is queued. A
    /// saturated queue is reported as [`ServiceError::QueueFull`] and the
    /// client should retry later.
    pub fn delete_user_urls(
        &self,
        owner_id: &str,
        short_ids: Vec<ShortId>,
    ) -> Result<(), ServiceError> {
        if short_ids.is_empty() {
            return Ok(());
        }

        self.pipeline.enqueue(DeleteRequest {
            owner_id: owner_id.to_owned(),
            short_ids,
        })?;
        Ok(())
    }

    /// Probes the storage backend. Backends without a pinger are assumed
    /// healthy.
    pub async fn ping_db(&self) -> Result<(), ServiceError> {
        match &self.pinger {
            None => Ok(()),
            Some(pinger) => pinger
                .ping()
                .await
                .map_err(|err| ServiceError::Storage(err.to_string())),
        }
    }

    /// Shuts down the deletion pipeline, draining all accepted requests.
    /// To be called once during process teardown.
    pub async fn close(&mut self) {
        self.pipeline.close().await;
    }

    /// Generates an ID and saves the mapping, retrying with fresh IDs
    /// when the store reports the generated one as occupied.
    async fn allocate(&self, url: &str) -> Result<ShortId, ServiceError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let short_id = self.generator.generate()?;
            match self.store.save(&short_id, url).await {
                Ok(()) => return Ok(short_id),
                Err(StoreError::IdTaken) => continue,
                Err(err) => return Err(self.map_store_error(err)),
            }
        }

        Err(ServiceError::IdSpaceExhausted)
    }

    fn map_store_error(&self, err: StoreError) -> ServiceError {
        match err {
            StoreError::Conflict { existing_id } => ServiceError::Conflict {
                existing_url: existing_id.to_url(&self.base_url),
            },
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::Gone => ServiceError::Gone,
            other => ServiceError::Storage(other.to_string()),
        }
    }

    async fn shorten_batch_inner(
        &self,
        requests: &[BatchShortenRequest],
        owner_id: Option<&str>,
    ) -> Result<Vec<BatchShortenResponse>, ServiceError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let mut pairs = Vec::with_capacity(requests.len());
        let mut responses = Vec::with_capacity(requests.len());

        for request in requests {
            let short_id = self.generator.generate()?;
            responses.push(BatchShortenResponse {
                correlation_id: request.correlation_id.clone(),
                short_url: short_id.to_url(&self.base_url),
            });
            pairs.push(UrlPair {
                short_id,
                original_url: request.original_url.clone(),
                owner_id: owner_id.map(str::to_owned),
            });
        }

        self.store
            .save_batch(&pairs)
            .await
            .map_err(|err| self.map_store_error(err))?;

        Ok(responses)
    }
}

/// Basic URL validation: a non-empty http(s) URL with a host.
fn validate_url(url: &str) -> Result<(), ServiceError> {
    if url.is_empty() {
        return Err(ServiceError::InvalidUrl("URL cannot be empty".to_string()));
    }

    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(ServiceError::InvalidUrl(format!(
            "URL must have a scheme and host: {url}"
        )));
    };

    if rest.is_empty() {
        return Err(ServiceError::InvalidUrl(format!(
            "URL must have a host: {url}"
        )));
    }

    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(ServiceError::InvalidUrl(format!(
            "URL scheme must be http or https: {scheme}"
        )));
    }

    Ok(())
}
