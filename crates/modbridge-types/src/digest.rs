//! Content digests.
//!
//! A [`Digest`] is the only identity the engine trusts: module identity, module
//! set identity, function identity and call cache keys are all SHA-256 digests
//! over UTF-8 strings, rendered as `sha256:<hex>`.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

const ALGORITHM_PREFIX: &str = "sha256:";

/// A SHA-256 content digest in `sha256:<hex>` form.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Digest of the UTF-8 bytes of `content`.
    pub fn from_string(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Digest of raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Digest(format!("{}{}", ALGORITHM_PREFIX, hex::encode(hasher.finalize())))
    }

    /// Digest of `parts` joined by a single space.
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = parts
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        Self::from_string(&joined)
    }

    /// The full `sha256:<hex>` form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Just the hex portion.
    pub fn hex(&self) -> &str {
        &self.0[ALGORITHM_PREFIX.len()..]
    }

    /// Short form for log lines.
    pub fn short(&self) -> &str {
        &self.hex()[..12]
    }
}

impl FromStr for Digest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let hex_part = s
            .strip_prefix(ALGORITHM_PREFIX)
            .ok_or_else(|| anyhow!("Invalid digest '{}': missing {} prefix", s, ALGORITHM_PREFIX))?;
        if hex_part.len() != 64 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(anyhow!("Invalid digest '{}': expected 64 hex characters", s));
        }
        Ok(Digest(format!("{}{}", ALGORITHM_PREFIX, hex_part.to_lowercase())))
    }
}

impl TryFrom<String> for Digest {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(value: Digest) -> Self {
        value.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.0)
    }
}

/// Accumulator for multi-part digests.
///
/// Inputs are kept in insertion order and joined by a single space when the
/// digest is finalized, so `DigestInputs` is equivalent to [`Digest::from_parts`].
#[derive(Debug, Clone, Default)]
pub struct DigestInputs {
    parts: Vec<String>,
}

impl DigestInputs {
    /// Start an accumulator seeded with `seed`.
    pub fn seeded(seed: &Digest) -> Self {
        Self {
            parts: vec![seed.to_string()],
        }
    }

    pub fn push(&mut self, part: impl Into<String>) -> &mut Self {
        self.parts.push(part.into());
        self
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn finish(&self) -> Digest {
        Digest::from_parts(&self.parts)
    }
}
