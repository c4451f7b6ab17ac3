//! URL shortener service implementation.
//!
//! This crate composes a [`snip_generator::Generator`] and a
//! [`snip_core::Repository`] into the get-or-create [`ShortenerService`].
//! Core types are re-exported from `snip_core`.

pub mod service;

pub use service::{ServiceSettings, ShortenerService, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT};
pub use snip_core::{ShortCode, Shortener, ShortenerError};
