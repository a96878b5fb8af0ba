//! Keypair file loading for live mode.

use std::path::Path;
use thiserror::Error;

pub const KEYPAIR_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("failed to read keypair file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid keypair json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("keypair must be 64 bytes, got {0}")]
    Length(usize),
}

/// A loaded signing keypair. Only the public half is ever exposed.
pub struct Wallet {
    bytes: [u8; KEYPAIR_LEN],
}

impl Wallet {
    /// Load a keypair stored as a JSON array of 64 bytes (secret then public).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| WalletError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, WalletError> {
        let raw: Vec<u8> = serde_json::from_str(contents)?;
        let bytes: [u8; KEYPAIR_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| WalletError::Length(raw.len()))?;
        Ok(Self { bytes })
    }

    /// Base58 public key.
    pub fn address(&self) -> String {
        bs58::encode(&self.bytes[32..]).into_string()
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet").field("address", &self.address()).finish()
    }
}
