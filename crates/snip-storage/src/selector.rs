use crate::{FileRepository, InMemoryRepository, SqlRepository};
use snip_core::error::Result;
use snip_core::Repository;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use typed_builder::TypedBuilder;

/// The backend a [`StorageConfig`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Sql,
    File,
    Memory,
}

impl Display for StorageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageKind::Sql => write!(f, "sql"),
            StorageKind::File => write!(f, "file"),
            StorageKind::Memory => write!(f, "memory"),
        }
    }
}

/// Storage settings supplied by configuration.
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct StorageConfig {
    /// Database connection string, e.g. `postgres://…` or `sqlite::memory:`.
    #[builder(default, setter(strip_option, into))]
    pub database_dsn: Option<String>,
    /// Path of the snapshot file for the file backend.
    #[builder(default, setter(strip_option, into))]
    pub file_path: Option<PathBuf>,
}

enum Target<'a> {
    Sql(&'a str),
    File(&'a Path),
    Memory,
}

impl StorageConfig {
    fn target(&self) -> Target<'_> {
        if let Some(dsn) = self.database_dsn.as_deref().filter(|dsn| !dsn.is_empty()) {
            return Target::Sql(dsn);
        }
        if let Some(path) = self
            .file_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
        {
            return Target::File(path);
        }
        Target::Memory
    }

    /// Prefers a database, then a file, then memory.
    pub fn kind(&self) -> StorageKind {
        match self.target() {
            Target::Sql(_) => StorageKind::Sql,
            Target::File(_) => StorageKind::File,
            Target::Memory => StorageKind::Memory,
        }
    }
}

/// Constructs the backend selected by `config`.
///
/// Evaluated once at startup; fails fast with `Unavailable` if the chosen
/// medium cannot be reached.
pub async fn open_repository(config: &StorageConfig) -> Result<Arc<dyn Repository>> {
    info!(storage_backend = %config.kind(), "opening storage backend");

    let repository: Arc<dyn Repository> = match config.target() {
        Target::Sql(dsn) => Arc::new(SqlRepository::connect(dsn).await?),
        Target::File(path) => Arc::new(FileRepository::open(path).await?),
        Target::Memory => Arc::new(InMemoryRepository::new()),
    };

    Ok(repository)
}
