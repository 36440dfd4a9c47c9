//! # Message Codec
//!
//! Turns a [`DomainMessage`] into the single transport-safe string that
//! travels between peers, and back.
//!
//! The default codec serializes the message as JSON and wraps the bytes in
//! base58check, so a truncated or mangled string fails the checksum instead
//! of decoding into garbage.

use crate::error::{Error, Result};
use crate::message::DomainMessage;

/// Maximum encoded message size (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Bidirectional message codec
pub trait Codec: Send + Sync {
    /// Encode a message into one transport string
    fn encode(&self, message: &DomainMessage) -> Result<String>;

    /// Decode one transport string into a message
    fn decode(&self, encoded: &str) -> Result<DomainMessage>;
}

/// JSON body wrapped in base58check
#[derive(Debug, Clone, Copy, Default)]
pub struct Base58CheckCodec;

impl Codec for Base58CheckCodec {
    fn encode(&self, message: &DomainMessage) -> Result<String> {
        let body = serde_json::to_vec(message).map_err(|e| Error::EncodeFailed(e.to_string()))?;
        let encoded = bs58::encode(body).with_check().into_string();

        if encoded.len() > MAX_MESSAGE_SIZE {
            return Err(Error::MessageTooLarge {
                size: encoded.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        Ok(encoded)
    }

    fn decode(&self, encoded: &str) -> Result<DomainMessage> {
        if encoded.len() > MAX_MESSAGE_SIZE {
            return Err(Error::MessageTooLarge {
                size: encoded.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let body = bs58::decode(encoded.trim())
            .with_check(None)
            .into_vec()
            .map_err(|e| Error::DecodeFailed(e.to_string()))?;

        serde_json::from_slice(&body).map_err(|e| Error::DecodeFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageType, Scope};

    #[test]
    fn test_encode_decode() {
        let codec = Base58CheckCodec;
        let mut message = DomainMessage::new("r1", MessageType::PermissionRequest, "dapp1");
        message.scopes = Some(vec![Scope::Sign]);

        let encoded = codec.encode(&message).unwrap();
        assert!(encoded.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(codec.decode(&encoded).unwrap(), message);
    }

    #[test]
    fn test_corrupted_input_fails_checksum() {
        let codec = Base58CheckCodec;
        let message = DomainMessage::new("r1", MessageType::Disconnect, "dapp1");
        let mut encoded = codec.encode(&message).unwrap();

        // Flip the last character to another base58 digit
        let last = encoded.pop().unwrap();
        encoded.push(if last == '2' { '3' } else { '2' });

        assert!(matches!(codec.decode(&encoded), Err(Error::DecodeFailed(_))));
        assert!(matches!(codec.decode("not base58 0OIl"), Err(Error::DecodeFailed(_))));
    }

    #[test]
    fn test_valid_checksum_but_not_a_message() {
        let codec = Base58CheckCodec;
        let encoded = bs58::encode(b"{\"hello\":1}").with_check().into_string();
        assert!(matches!(codec.decode(&encoded), Err(Error::DecodeFailed(_))));
    }

    #[test]
    fn test_oversized_input_rejected() {
        let codec = Base58CheckCodec;
        let huge = "1".repeat(MAX_MESSAGE_SIZE + 1);
        assert!(matches!(
            codec.decode(&huge),
            Err(Error::MessageTooLarge { .. })
        ));
    }
}
