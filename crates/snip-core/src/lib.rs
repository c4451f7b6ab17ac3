//! Core types and traits for the snip URL shortener.
//!
//! This crate provides the storage contract shared by every backend,
//! the shortener contract used by callers, and the error taxonomy.

pub mod deadline;
pub mod error;
pub mod repository;
pub mod shortcode;
pub mod shortener;

pub use deadline::Deadline;
pub use error::{GenerationError, ShortenerError, StorageError};
pub use repository::{Repository, UrlMapping, UrlRecord};
pub use shortcode::ShortCode;
pub use shortener::{ShortenRequest, Shortener};
