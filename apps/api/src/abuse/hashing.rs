use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::abuse::fingerprint::ClientFingerprint;

/// Which kind of identifier a block or rolling-window counter is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockScope {
    Ip,
    Device,
}

impl BlockScope {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockScope::Ip => "ip",
            BlockScope::Device => "device",
        }
    }
}

impl fmt::Display for BlockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip" => Ok(BlockScope::Ip),
            "device" => Ok(BlockScope::Device),
            other => Err(format!("unknown block scope '{other}'")),
        }
    }
}

/// Salted SHA-256 of a client identifier. Only these hashes reach storage or logs.
#[derive(Clone)]
pub struct IdentifierHasher {
    salt: String,
}

impl IdentifierHasher {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    pub fn hash(&self, scope: BlockScope, raw: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(b":");
        hasher.update(scope.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(raw.trim().to_ascii_lowercase().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn hash_fingerprint(&self, fingerprint: &ClientFingerprint) -> HashedFingerprint {
        HashedFingerprint {
            ip: self.hash(BlockScope::Ip, &fingerprint.ip),
            device: fingerprint
                .device_id
                .as_deref()
                .map(|d| self.hash(BlockScope::Device, d)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedFingerprint {
    pub ip: String,
    pub device: Option<String>,
}

impl HashedFingerprint {
    /// (scope, hash) pairs present on this request, ip first.
    pub fn scopes(&self) -> Vec<(BlockScope, &str)> {
        let mut scopes = vec![(BlockScope::Ip, self.ip.as_str())];
        if let Some(device) = &self.device {
            scopes.push((BlockScope::Device, device.as_str()));
        }
        scopes
    }
}

/// First characters of a hash, for log lines.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
