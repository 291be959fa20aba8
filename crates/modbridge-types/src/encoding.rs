//! Encoding utilities for base64.
//!
//! Shared by the ID codec so every crate decodes IDs with the same alphabet and
//! the same context-aware error messages.

use anyhow::{anyhow, Result};
use base64::Engine;

/// Encode bytes to a URL-safe, unpadded base64 string.
///
/// IDs end up in query arguments, so the URL-safe alphabet avoids escaping.
pub fn base64_encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a URL-safe base64 string with a context-aware error message.
///
/// # Arguments
/// * `b64` - Base64 encoded string
/// * `context` - Description for error messages (e.g., "module object ID")
pub fn base64_decode(b64: &str, context: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(b64.trim_end_matches('='))
        .map_err(|e| anyhow!("Failed to decode {} from base64: {}", context, e))
}
