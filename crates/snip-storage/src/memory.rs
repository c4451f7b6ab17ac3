use crate::table::UrlTable;
use async_trait::async_trait;
use snip_core::error::Result;
use snip_core::repository::{validate_owner, validate_save, Repository};
use snip_core::{Deadline, ShortCode, StorageError, UrlMapping, UrlRecord};
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// In-memory implementation of the Repository trait.
///
/// The forward map and the reverse index sit behind one `RwLock`, so a
/// `save` checks and inserts into both in a single critical section.
/// `None` inside the lock marks a closed repository. Data does not survive
/// a restart.
#[derive(Debug)]
pub struct InMemoryRepository {
    table: RwLock<Option<UrlTable>>,
}

impl InMemoryRepository {
    /// Creates a new, empty in-memory repository.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Some(UrlTable::new())),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn save(&self, deadline: &Deadline, code: &ShortCode, record: UrlRecord) -> Result<()> {
        validate_save(code, &record)?;

        let mut guard = deadline.run(self.table.write()).await?;
        let table = guard.as_mut().ok_or(StorageError::Closed)?;

        table.insert(code, record)?;
        debug!(code = %code, "saved mapping");
        Ok(())
    }

    async fn get(&self, deadline: &Deadline, code: &ShortCode) -> Result<Option<UrlRecord>> {
        let guard = deadline.run(self.table.read()).await?;
        let table = guard.as_ref().ok_or(StorageError::Closed)?;

        let record = table.get(code).cloned();
        trace!(code = %code, found = record.is_some(), "looked up short code");
        Ok(record)
    }

    async fn find_by_long_url(
        &self,
        deadline: &Deadline,
        long_url: &str,
        owner: Option<&str>,
    ) -> Result<Option<ShortCode>> {
        let guard = deadline.run(self.table.read()).await?;
        let table = guard.as_ref().ok_or(StorageError::Closed)?;

        Ok(table.find(long_url, owner).cloned())
    }

    async fn list_by_owner(&self, deadline: &Deadline, owner: &str) -> Result<Vec<UrlMapping>> {
        let owner = validate_owner(owner)?;
        let guard = deadline.run(self.table.read()).await?;
        let table = guard.as_ref().ok_or(StorageError::Closed)?;

        Ok(table.list_by_owner(owner))
    }

    async fn ping(&self, deadline: &Deadline) -> Result<()> {
        let guard = deadline.run(self.table.read()).await?;
        guard.as_ref().map(|_| ()).ok_or(StorageError::Closed)
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.table.write().await;
        if let Some(table) = guard.take() {
            debug!(mappings = table.len(), "closed in-memory repository");
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn save_and_get() {
        let repo = InMemoryRepository::new();

        repo.save(&deadline(), &code("abc123"), UrlRecord::new("https://example.com", None))
            .await
            .unwrap();

        let result = repo.get(&deadline(), &code("abc123")).await.unwrap().unwrap();
        assert_eq!(result.long_url, "https://example.com");
        assert_eq!(result.owner, None);
    }

    #[tokio::test]
    async fn list_by_owner_is_oldest_first() {
        let repo = InMemoryRepository::new();

        repo.save(&deadline(), &code("first"), UrlRecord::new("https://a.example", Some("alice")))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        repo.save(&deadline(), &code("second"), UrlRecord::new("https://b.example", Some("alice")))
            .await
            .unwrap();
        repo.save(&deadline(), &code("other"), UrlRecord::new("https://c.example", Some("bob")))
            .await
            .unwrap();

        let listed = repo.list_by_owner(&deadline(), "alice").await.unwrap();
        let codes: Vec<&str> = listed.iter().map(|m| m.code.as_str()).collect();
        assert_eq!(codes, ["first", "second"]);
        assert_eq!(listed[1].record.long_url, "https://b.example");

        let err = repo.list_by_owner(&deadline(), "").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn ping_fails_once_closed() {
        let repo = InMemoryRepository::new();

        repo.ping(&deadline()).await.unwrap();
        repo.close().await.unwrap();
        assert_eq!(repo.ping(&deadline()).await.unwrap_err(), StorageError::Closed);
    }

    #[tokio::test]
    async fn get_nonexistent() {
        let repo = InMemoryRepository::new();

        let result = repo.get(&deadline(), &code("nope")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn save_conflict() {
        let repo = InMemoryRepository::new();

        repo.save(&deadline(), &code("abc123"), UrlRecord::new("https://example.com", None))
            .await
            .unwrap();

        let err = repo
            .save(&deadline(), &code("abc123"), UrlRecord::new("https://other.com", None))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Conflict(_)));
        let kept = repo.get(&deadline(), &code("abc123")).await.unwrap().unwrap();
        assert_eq!(kept.long_url, "https://example.com");
    }

    #[tokio::test]
    async fn save_rejects_empty_input() {
        let repo = InMemoryRepository::new();

        let err = repo
            .save(&deadline(), &code(""), UrlRecord::new("https://example.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));

        let err = repo
            .save(&deadline(), &code("abc"), UrlRecord::new("", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn find_by_long_url_is_keyed_by_owner() {
        let repo = InMemoryRepository::new();

        repo.save(&deadline(), &code("alice1"), UrlRecord::new("https://example.com", Some("alice")))
            .await
            .unwrap();

        let found = repo
            .find_by_long_url(&deadline(), "https://example.com", Some("alice"))
            .await
            .unwrap();
        assert_eq!(found, Some(code("alice1")));

        let missing = repo
            .find_by_long_url(&deadline(), "https://example.com", Some("bob"))
            .await
            .unwrap();
        assert_eq!(missing, None);

        let anonymous = repo
            .find_by_long_url(&deadline(), "https://example.com", None)
            .await
            .unwrap();
        assert_eq!(anonymous, None);
    }

    #[tokio::test]
    async fn expired_deadline_cancels_without_writing() {
        let repo = InMemoryRepository::new();
        let expired = Deadline::after(Duration::ZERO);

        let err = repo
            .save(&expired, &code("abc123"), UrlRecord::new("https://example.com", None))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::Canceled);

        assert!(repo.get(&deadline(), &code("abc123")).await.unwrap().is_none());
        assert_eq!(
            repo.get(&expired, &code("abc123")).await.unwrap_err(),
            StorageError::Canceled
        );
    }

    #[tokio::test]
    async fn operations_fail_after_close() {
        let repo = InMemoryRepository::new();
        repo.save(&deadline(), &code("abc123"), UrlRecord::new("https://example.com", None))
            .await
            .unwrap();

        repo.close().await.unwrap();
        repo.close().await.unwrap();

        assert_eq!(
            repo.get(&deadline(), &code("abc123")).await.unwrap_err(),
            StorageError::Closed
        );
        assert_eq!(
            repo.find_by_long_url(&deadline(), "https://example.com", None)
                .await
                .unwrap_err(),
            StorageError::Closed
        );
        assert_eq!(
            repo.save(&deadline(), &code("xyz"), UrlRecord::new("https://x.com", None))
                .await
                .unwrap_err(),
            StorageError::Closed
        );
    }

    #[tokio::test]
    async fn concurrent_saves_of_one_code_have_a_single_winner() {
        let repo = Arc::new(InMemoryRepository::new());
        let mut handles = vec![];

        for i in 0..50u64 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.save(
                    &deadline(),
                    &code("shared"),
                    UrlRecord::new(format!("https://example{i}.com"), None),
                )
                .await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => winners += 1,
                Err(err) => assert!(matches!(err, StorageError::Conflict(_))),
            }
        }
        assert_eq!(winners, 1);

        let stored = repo.get(&deadline(), &code("shared")).await.unwrap().unwrap();
        let back = repo
            .find_by_long_url(&deadline(), &stored.long_url, None)
            .await
            .unwrap();
        assert_eq!(back, Some(code("shared")));
    }

    #[tokio::test]
    async fn concurrent_access() {
        let repo = Arc::new(InMemoryRepository::new());
        let mut handles = vec![];

        for i in 0..10u64 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let c = code(&format!("code-{:03}", i));
                let r = UrlRecord::new(format!("https://example{}.com", i), None);
                repo.save(&deadline(), &c, r).await.unwrap();
            }));
        }

        for i in 0..10u64 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let c = code(&format!("code-{:03}", i));
                let _ = repo.get(&deadline(), &c).await;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..10u64 {
            let c = code(&format!("code-{:03}", i));
            let result = repo.get(&deadline(), &c).await.unwrap().unwrap();
            assert_eq!(result.long_url, format!("https://example{}.com", i));
        }
    }
}
