use crate::Generator;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use snip_core::{GenerationError, ShortCode};
use tracing::trace;
use typed_builder::TypedBuilder;

pub const DEFAULT_CODE_LENGTH: usize = 8;

/// A deterministic generator that derives short codes from content hashes.
///
/// The long URL is hashed with SHA-256, encoded with the URL-safe base64
/// alphabet and truncated to `length` characters. Retries append the
/// big-endian attempt counter to the hashed bytes as a salt.
#[derive(Debug, Clone, TypedBuilder)]
pub struct HashGenerator {
    #[builder(default = DEFAULT_CODE_LENGTH)]
    length: usize,
}

impl Default for HashGenerator {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl HashGenerator {
    fn digest(long_url: &str, attempt: u32) -> String {
        let mut hasher = Sha256::new();
        hasher.update(long_url.as_bytes());
        if attempt > 0 {
            hasher.update(attempt.to_be_bytes());
        }
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl Generator for HashGenerator {
    fn generate(&self, long_url: &str, attempt: u32) -> Result<ShortCode, GenerationError> {
        if long_url.trim().is_empty() {
            return Err(GenerationError::InvalidInput(
                "url cannot be empty or whitespace".to_string(),
            ));
        }

        let encoded = Self::digest(long_url, attempt);
        if encoded.len() < self.length {
            return Err(GenerationError::TooShort {
                required: self.length,
                available: encoded.len(),
            });
        }

        let code = &encoded[..self.length];
        trace!(code, attempt, "generated short code");
        Ok(ShortCode::new_unchecked(code))
    }
}
