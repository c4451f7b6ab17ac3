use crate::deadline::Deadline;
use crate::error::Result;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A stored URL mapping, keyed by its short code in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// The original URL that was shortened.
    pub long_url: String,
    /// The owner that created the mapping. `None` is the anonymous owner.
    pub owner: Option<String>,
    /// When the mapping was created. Never mutated after creation.
    pub created_at: Timestamp,
}

impl UrlRecord {
    /// Creates a record stamped with the current time.
    ///
    /// An empty owner string is normalized to the anonymous owner.
    pub fn new(long_url: impl Into<String>, owner: Option<&str>) -> Self {
        Self {
            long_url: long_url.into(),
            owner: normalize_owner(owner).map(str::to_owned),
            created_at: Timestamp::now(),
        }
    }

    pub fn owner(&self) -> Option<&str> {
        normalize_owner(self.owner.as_deref())
    }

    /// Whether this record belongs to `owner` and points at `long_url`.
    pub fn matches(&self, long_url: &str, owner: Option<&str>) -> bool {
        self.long_url == long_url && self.owner() == normalize_owner(owner)
    }
}

/// A short code together with the mapping stored under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMapping {
    pub code: ShortCode,
    #[serde(flatten)]
    pub record: UrlRecord,
}

/// Orders listings oldest first, then by code.
pub fn sort_mappings(mappings: &mut [UrlMapping]) {
    mappings.sort_by(|a, b| {
        a.record
            .created_at
            .cmp(&b.record.created_at)
            .then_with(|| a.code.cmp(&b.code))
    });
}

/// Treats an empty owner id as anonymous.
pub fn normalize_owner(owner: Option<&str>) -> Option<&str> {
    owner.filter(|owner| !owner.is_empty())
}

/// The storage contract shared by every backend.
///
/// Backends enforce short code uniqueness and own the reverse lookup used
/// by get-or-create. Every call takes the caller's [`Deadline`]; once it
/// fires, operations return `StorageError::Canceled` without applying a
/// partial mapping. After [`Repository::close`] every operation returns
/// `StorageError::Closed`.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    /// Stores a new mapping.
    ///
    /// Returns `Err(Conflict)` if the short code is already taken by a
    /// different mapping and `Err(InvalidInput)` if the code or the long
    /// URL is empty.
    async fn save(&self, deadline: &Deadline, code: &ShortCode, record: UrlRecord) -> Result<()>;

    /// Retrieves the mapping for a short code.
    /// Returns `None` if the code does not exist.
    async fn get(&self, deadline: &Deadline, code: &ShortCode) -> Result<Option<UrlRecord>>;

    /// Looks up the short code an owner already holds for a long URL.
    /// Returns `None` if there is no such mapping.
    async fn find_by_long_url(
        &self,
        deadline: &Deadline,
        long_url: &str,
        owner: Option<&str>,
    ) -> Result<Option<ShortCode>>;

    /// Every mapping created by `owner`, oldest first.
    ///
    /// Returns `Err(InvalidInput)` for an empty owner; anonymous mappings
    /// cannot be listed.
    async fn list_by_owner(&self, deadline: &Deadline, owner: &str) -> Result<Vec<UrlMapping>>;

    /// Checks that the backend can still serve requests.
    async fn ping(&self, deadline: &Deadline) -> Result<()>;

    /// Releases file handles or connections. Best effort and idempotent.
    async fn close(&self) -> Result<()>;

    /// A short name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Rejects the anonymous owner for listings.
pub fn validate_owner(owner: &str) -> Result<&str> {
    normalize_owner(Some(owner)).ok_or_else(|| {
        crate::StorageError::InvalidInput("owner cannot be empty".to_string())
    })
}

/// Checks the invariants every backend enforces before a write.
pub fn validate_save(code: &ShortCode, record: &UrlRecord) -> Result<()> {
    if code.is_empty() {
        return Err(crate::StorageError::InvalidInput(
            "short code cannot be empty".to_string(),
        ));
    }
    if record.long_url.is_empty() {
        return Err(crate::StorageError::InvalidInput(
            "long url cannot be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;

    #[test]
    fn empty_owner_is_anonymous() {
        let record = UrlRecord::new("http://example.com/a", Some(""));
        assert_eq!(record.owner, None);
        assert!(record.matches("http://example.com/a", None));
        assert!(record.matches("http://example.com/a", Some("")));
        assert!(!record.matches("http://example.com/a", Some("alice")));
    }

    #[test]
    fn owner_is_part_of_the_match() {
        let record = UrlRecord::new("http://example.com/a", Some("alice"));
        assert!(record.matches("http://example.com/a", Some("alice")));
        assert!(!record.matches("http://example.com/b", Some("alice")));
        assert!(!record.matches("http://example.com/a", None));
    }

    #[test]
    fn validate_save_rejects_empty_fields() {
        let record = UrlRecord::new("http://example.com", None);
        assert!(matches!(
            validate_save(&ShortCode::new_unchecked(""), &record),
            Err(StorageError::InvalidInput(_))
        ));

        let empty = UrlRecord::new("", None);
        assert!(matches!(
            validate_save(&ShortCode::new_unchecked("abc"), &empty),
            Err(StorageError::InvalidInput(_))
        ));

        assert!(validate_save(&ShortCode::new_unchecked("abc"), &record).is_ok());
    }

    #[test]
    fn listing_requires_an_owner() {
        assert_eq!(validate_owner("alice"), Ok("alice"));
        assert!(matches!(validate_owner(""), Err(StorageError::InvalidInput(_))));
    }

    #[test]
    fn mappings_sort_oldest_first() {
        let mapping = |code: &str, second: i64| UrlMapping {
            code: ShortCode::new_unchecked(code),
            record: UrlRecord {
                long_url: format!("http://example.com/{code}"),
                owner: Some("alice".to_string()),
                created_at: Timestamp::from_second(second).unwrap(),
            },
        };

        let mut mappings = vec![mapping("c", 20), mapping("b", 10), mapping("a", 20)];
        sort_mappings(&mut mappings);

        let codes: Vec<&str> = mappings.iter().map(|m| m.code.as_str()).collect();
        assert_eq!(codes, ["b", "a", "c"]);
    }
}
