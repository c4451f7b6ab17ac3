//! Storage backends for the snip URL shortener.
//!
//! Every backend implements [`snip_core::Repository`]. Use
//! [`open_repository`] to pick one from configuration.

pub mod file;
pub mod memory;
pub mod selector;
pub mod sql;
mod table;

pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use selector::{open_repository, StorageConfig, StorageKind};
pub use snip_core::{Repository, StorageError};
pub use sql::SqlRepository;
