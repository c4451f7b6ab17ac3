use snip_core::repository::{normalize_owner, sort_mappings};
use snip_core::{ShortCode, StorageError, UrlMapping, UrlRecord};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ReverseKey {
    owner: Option<String>,
    long_url: String,
}

impl ReverseKey {
    fn new(long_url: &str, owner: Option<&str>) -> Self {
        Self {
            owner: normalize_owner(owner).map(str::to_owned),
            long_url: long_url.to_owned(),
        }
    }
}

/// Forward map plus its reverse index.
///
/// Both maps are only ever mutated together, so every reverse entry points
/// at a live forward entry and every mapping inserted through
/// [`UrlTable::insert`] has a reverse entry. Callers provide the locking.
///
/// A table rebuilt by [`UrlTable::from_forward`] may hold several codes for
/// one `(owner, long_url)` if a snapshot file already did. Only the oldest
/// of them is indexed; the rest resolve but are never returned by
/// [`UrlTable::find`].
#[derive(Debug, Default)]
pub(crate) struct UrlTable {
    forward: HashMap<ShortCode, UrlRecord>,
    reverse: HashMap<ReverseKey, ShortCode>,
}

impl UrlTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the reverse index from a replayed forward map.
    ///
    /// If several codes share an `(owner, long_url)` the oldest one (then the
    /// lowest code) is indexed; the others stay resolvable.
    pub(crate) fn from_forward(forward: HashMap<ShortCode, UrlRecord>) -> Self {
        let mut entries: Vec<(&ShortCode, &UrlRecord)> = forward.iter().collect();
        entries.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then(a.0.cmp(b.0)));

        let mut reverse = HashMap::with_capacity(entries.len());
        for (code, record) in entries {
            reverse
                .entry(ReverseKey::new(&record.long_url, record.owner()))
                .or_insert_with(|| code.clone());
        }

        Self { forward, reverse }
    }

    /// Check-and-insert into both maps.
    pub(crate) fn insert(&mut self, code: &ShortCode, record: UrlRecord) -> Result<(), StorageError> {
        if self.forward.contains_key(code) {
            return Err(StorageError::Conflict(format!(
                "short code '{code}' is already taken"
            )));
        }

        let key = ReverseKey::new(&record.long_url, record.owner());
        if let Some(existing) = self.reverse.get(&key) {
            return Err(StorageError::Conflict(format!(
                "long url is already shortened as '{existing}'"
            )));
        }

        self.reverse.insert(key, code.clone());
        self.forward.insert(code.clone(), record);
        Ok(())
    }

    /// Undoes an [`UrlTable::insert`].
    pub(crate) fn remove(&mut self, code: &ShortCode) -> Option<UrlRecord> {
        let record = self.forward.remove(code)?;
        let key = ReverseKey::new(&record.long_url, record.owner());
        if self.reverse.get(&key) == Some(code) {
            self.reverse.remove(&key);
        }
        Some(record)
    }

    pub(crate) fn get(&self, code: &ShortCode) -> Option<&UrlRecord> {
        self.forward.get(code)
    }

    pub(crate) fn find(&self, long_url: &str, owner: Option<&str>) -> Option<&ShortCode> {
        self.reverse.get(&ReverseKey::new(long_url, owner))
    }

    pub(crate) fn list_by_owner(&self, owner: &str) -> Vec<UrlMapping> {
        let mut mappings: Vec<UrlMapping> = self
            .forward
            .iter()
            .filter(|(_, record)| record.owner() == Some(owner))
            .map(|(code, record)| UrlMapping {
                code: code.clone(),
                record: record.clone(),
            })
            .collect();
        sort_mappings(&mut mappings);
        mappings
    }

    pub(crate) fn forward(&self) -> &HashMap<ShortCode, UrlRecord> {
        &self.forward
    }

    pub(crate) fn len(&self) -> usize {
        self.forward.len()
    }

    #[cfg(test)]
    pub(crate) fn reverse_len(&self) -> usize {
        self.reverse.len()
    }
}
