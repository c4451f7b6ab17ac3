pub mod hash;

pub use hash::{HashGenerator, DEFAULT_CODE_LENGTH};

use snip_core::{GenerationError, ShortCode};

/// Trait for generating short codes.
///
/// Implementations are pure generators that don't interact with storage.
/// Uniqueness is enforced by the repository; on a collision the caller asks
/// again with the next `attempt`, which must perturb the output.
pub trait Generator: Send + Sync + 'static {
    /// Derives a short code for `long_url`.
    ///
    /// The same `(long_url, attempt)` pair always yields the same code.
    fn generate(&self, long_url: &str, attempt: u32) -> Result<ShortCode, GenerationError>;
}
