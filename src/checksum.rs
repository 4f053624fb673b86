//! Package checksums
//!
//! A SHA-256 over the compact JSON encoding of a compiled package. Field and
//! value order is part of the package, so the encoding is already canonical.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::Result;
use crate::package::SchemaPackage;

/// Hex-encoded SHA-256 digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Checksum of a package's canonical encoding
    pub fn of_package(package: &SchemaPackage) -> Result<Self> {
        let canonical = serde_json::to_vec(package)?;
        Ok(Self::from_bytes(&canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `package` still matches this checksum
    pub fn verify(&self, package: &SchemaPackage) -> bool {
        Self::of_package(package).is_ok_and(|computed| computed == *self)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}
