//! # Account Identifiers
//!
//! Deterministic identifiers derived from public keys, addresses and
//! networks.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        IDENTIFIER DERIVATION                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  public key (hex) ──► SHA-256 ──► first 5 bytes  ──► b58check ─► sender │
//! │  public key (hex) ──► SHA-256 ──► first 20 bytes ──► b58check ─► addr   │
//! │  address + network ─► SHA-256 ──► first 10 bytes ──► b58check ─► acct   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ed25519_dalek::VerifyingKey;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::message::Network;

/// Length of an ed25519 public key
pub const PUBLIC_KEY_LEN: usize = 32;

/// Decode and validate a hex-encoded ed25519 public key
pub fn parse_public_key(public_key: &str) -> Result<[u8; PUBLIC_KEY_LEN]> {
    let bytes = hex::decode(public_key.trim())
        .map_err(|e| Error::InvalidKey(format!("public key is not hex: {}", e)))?;

    let bytes: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
        Error::InvalidKey(format!(
            "public key must be {} bytes, got {}",
            PUBLIC_KEY_LEN,
            v.len()
        ))
    })?;

    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| Error::InvalidKey(format!("not an ed25519 point: {}", e)))?;

    Ok(bytes)
}

/// Sender id for a peer public key
pub fn sender_id_from_public_key(public_key: &str) -> Result<String> {
    let bytes = parse_public_key(public_key)?;
    Ok(digest_prefix(&bytes, 5))
}

/// Content-derived address for a key that is not registered as a wallet
pub fn address_from_public_key(public_key: &str) -> Result<String> {
    let bytes = parse_public_key(public_key)?;
    Ok(digest_prefix(&bytes, 20))
}

/// Identifier for an (address, network) pair
pub fn account_identifier(address: &str, network: &Network) -> String {
    let mut hasher = Sha256::new();
    hasher.update(address.as_bytes());
    hasher.update(b"-");
    hasher.update(network.network_type.as_str().as_bytes());
    if let Some(name) = &network.name {
        hasher.update(b"-name:");
        hasher.update(name.as_bytes());
    }
    if let Some(rpc_url) = &network.rpc_url {
        hasher.update(b"-rpc:");
        hasher.update(rpc_url.as_bytes());
    }
    encode_prefix(&hasher.finalize(), 10)
}

fn digest_prefix(bytes: &[u8], len: usize) -> String {
    encode_prefix(&Sha256::digest(bytes), len)
}

fn encode_prefix(digest: &[u8], len: usize) -> String {
    bs58::encode(&digest[..len]).with_check().into_string()
}
