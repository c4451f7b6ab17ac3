use async_trait::async_trait;
use snip_core::repository::normalize_owner;
use snip_core::{
    Deadline, Repository, ShortCode, ShortenRequest, Shortener, ShortenerError, StorageError,
    UrlMapping, UrlRecord,
};
use snip_generator::Generator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Tunables for [`ShortenerService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypedBuilder)]
pub struct ServiceSettings {
    /// Deadline applied to each call. A batch shares one deadline.
    #[builder(default = DEFAULT_TIMEOUT)]
    pub timeout: Duration,
    /// How many codes are tried before giving up on collisions.
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A concrete implementation of the `Shortener` trait.
///
/// The service wraps a `Repository` and a `Generator`:
/// - an existing mapping for the same long URL and owner is returned as is
/// - otherwise a code is generated and saved, retrying with a perturbed code
///   when the repository reports a collision
///
/// Concurrent callers shortening the same new URL derive the same first
/// code, so the loser of the save sees `Conflict`, finds the winner's
/// mapping and returns that instead.
#[derive(Debug)]
pub struct ShortenerService<R: ?Sized, G> {
    repository: Arc<R>,
    generator: Arc<G>,
    settings: ServiceSettings,
}

impl<R: ?Sized, G> Clone for ShortenerService<R, G> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            generator: Arc::clone(&self.generator),
            settings: self.settings,
        }
    }
}

impl<R: Repository + ?Sized, G: Generator> ShortenerService<R, G> {
    /// Creates a service with the default timeout and attempt budget.
    pub fn new(repository: Arc<R>, generator: G) -> Self {
        Self::with_settings(repository, generator, ServiceSettings::default())
    }

    pub fn with_settings(repository: Arc<R>, generator: G, settings: ServiceSettings) -> Self {
        Self {
            repository,
            generator: Arc::new(generator),
            settings,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.settings.timeout)
    }

    /// Get-or-create for one URL under the caller's deadline.
    async fn shorten_within(
        &self,
        deadline: &Deadline,
        long_url: &str,
        owner: Option<&str>,
    ) -> Result<ShortCode, ShortenerError> {
        if long_url.trim().is_empty() {
            return Err(ShortenerError::InvalidInput(
                "long url cannot be empty".to_string(),
            ));
        }

        let owner = normalize_owner(owner);

        if let Some(code) = self
            .repository
            .find_by_long_url(deadline, long_url, owner)
            .await?
        {
            debug!(code = %code, "long url already shortened");
            return Ok(code);
        }

        for attempt in 0..self.settings.max_attempts {
            let code = self.generator.generate(long_url, attempt)?;
            let record = UrlRecord::new(long_url, owner);

            match self.repository.save(deadline, &code, record).await {
                Ok(()) => {
                    info!(code = %code, attempt, "created short url");
                    return Ok(code);
                }
                Err(StorageError::Conflict(reason)) => {
                    if let Some(existing) = self
                        .repository
                        .find_by_long_url(deadline, long_url, owner)
                        .await?
                    {
                        debug!(code = %existing, "concurrent shorten won, reusing its code");
                        return Ok(existing);
                    }
                    debug!(code = %code, attempt, %reason, "short code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            attempts = self.settings.max_attempts,
            "gave up allocating a short code"
        );
        Err(ShortenerError::GenerationExhausted {
            attempts: self.settings.max_attempts,
        })
    }
}

#[async_trait]
impl<R: Repository + ?Sized, G: Generator> Shortener for ShortenerService<R, G> {
    async fn shorten(
        &self,
        long_url: &str,
        owner: Option<&str>,
    ) -> Result<ShortCode, ShortenerError> {
        self.shorten_within(&self.deadline(), long_url, owner).await
    }

    async fn shorten_batch(
        &self,
        requests: &[ShortenRequest],
    ) -> Result<Vec<ShortCode>, ShortenerError> {
        let deadline = self.deadline();
        let mut codes = Vec::with_capacity(requests.len());

        for request in requests {
            let code = self
                .shorten_within(&deadline, &request.long_url, request.owner.as_deref())
                .await?;
            codes.push(code);
        }

        debug!(count = codes.len(), "shortened batch");
        Ok(codes)
    }

    async fn resolve(&self, code: &str) -> Result<String, ShortenerError> {
        if code.is_empty() {
            return Err(ShortenerError::InvalidInput(
                "short code cannot be empty".to_string(),
            ));
        }
        let code = ShortCode::new(code)?;

        match self.repository.get(&self.deadline(), &code).await? {
            Some(record) => {
                debug!(code = %code, "resolved short url");
                Ok(record.long_url)
            }
            None => {
                debug!(code = %code, "short url not found");
                Err(ShortenerError::NotFound(code.to_string()))
            }
        }
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<UrlMapping>, ShortenerError> {
        let mappings = self
            .repository
            .list_by_owner(&self.deadline(), owner)
            .await?;
        debug!(count = mappings.len(), "listed owner urls");
        Ok(mappings)
    }

    async fn ping(&self) -> Result<(), ShortenerError> {
        self.repository.ping(&self.deadline()).await?;
        Ok(())
    }
}
