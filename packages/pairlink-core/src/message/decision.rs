//! User decisions and the responses built from them.

use serde::{Deserialize, Serialize};

use super::{DomainMessage, ErrorType, MessageType, Network, Scope};
use crate::error::{Error, Result};

/// Structured result of presenting a request to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum UserDecision {
    /// Account access granted
    GrantPermission {
        /// Account key being shared
        public_key: String,
        /// Network the grant applies to
        network: Network,
        /// Scopes the user kept selected
        scopes: Vec<Scope>,
    },
    /// Operation submitted
    OperationSent {
        /// Injected operation hash
        transaction_hash: String,
    },
    /// Payload signed
    PayloadSigned {
        /// Signature over the payload
        signature: String,
    },
    /// Signed transaction broadcast
    Broadcasted {
        /// Injected operation hash
        transaction_hash: String,
    },
    /// The user declined or cancelled
    Reject {
        /// Reason reported to the requester
        error_type: ErrorType,
    },
}

/// Build the response that answers `request` with `decision`
///
/// A rejection answers any request kind with an `Error` message; every
/// other decision must match the request kind.
pub fn build_response(
    request: &DomainMessage,
    decision: UserDecision,
    sender_id: &str,
) -> Result<DomainMessage> {
    let response_type = request.message_type.response_type().ok_or_else(|| {
        Error::DecisionMismatch(format!("{:?} is not a request", request.message_type))
    })?;

    let mut response = DomainMessage::new(request.id.clone(), response_type, sender_id);
    response.version = request.version.clone();

    match (request.message_type, decision) {
        (_, UserDecision::Reject { error_type }) => {
            return Ok(error_response(request, error_type, sender_id));
        }
        (
            MessageType::PermissionRequest,
            UserDecision::GrantPermission {
                public_key,
                network,
                scopes,
            },
        ) => {
            response.public_key = Some(public_key);
            response.network = Some(network);
            response.scopes = Some(scopes);
        }
        (MessageType::OperationRequest, UserDecision::OperationSent { transaction_hash })
        | (MessageType::BroadcastRequest, UserDecision::Broadcasted { transaction_hash }) => {
            response.transaction_hash = Some(transaction_hash);
        }
        (MessageType::SignPayloadRequest, UserDecision::PayloadSigned { signature }) => {
            response.signature = Some(signature);
        }
        (kind, decision) => {
            return Err(Error::DecisionMismatch(format!(
                "{:?} cannot answer {:?}",
                decision, kind
            )));
        }
    }

    Ok(response)
}

/// `Error` message answering `request`
pub fn error_response(request: &DomainMessage, error_type: ErrorType, sender_id: &str) -> DomainMessage {
    let mut response = DomainMessage::new(request.id.clone(), MessageType::Error, sender_id);
    response.version = request.version.clone();
    response.error_type = Some(error_type);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn permission_request() -> DomainMessage {
        DomainMessage::new("r1", MessageType::PermissionRequest, "dapp1")
    }

    #[test]
    fn test_grant_builds_permission_response() {
        let decision = UserDecision::GrantPermission {
            public_key: "ab".repeat(32),
            network: Network::mainnet(),
            scopes: vec![Scope::ReadAddress, Scope::Sign],
        };

        let response = build_response(&permission_request(), decision, "wallet").unwrap();
        assert_eq!(response.id, "r1");
        assert_eq!(response.message_type, MessageType::PermissionResponse);
        assert_eq!(response.sender_id, "wallet");
        assert_eq!(response.scopes, Some(vec![Scope::ReadAddress, Scope::Sign]));
    }

    #[test]
    fn test_reject_builds_error_for_any_request() {
        let request = DomainMessage::new("r2", MessageType::SignPayloadRequest, "dapp1");
        let response = build_response(
            &request,
            UserDecision::Reject {
                error_type: ErrorType::Aborted,
            },
            "wallet",
        )
        .unwrap();

        assert_eq!(response.message_type, MessageType::Error);
        assert_eq!(response.error_type, Some(ErrorType::Aborted));
        assert_eq!(response.id, "r2");
    }

    #[test]
    fn test_mismatched_decision_is_rejected() {
        let result = build_response(
            &permission_request(),
            UserDecision::PayloadSigned {
                signature: "sig".into(),
            },
            "wallet",
        );
        assert!(matches!(result, Err(Error::DecisionMismatch(_))));

        let not_a_request = DomainMessage::new("r3", MessageType::PermissionResponse, "dapp1");
        let result = build_response(
            &not_a_request,
            UserDecision::Reject {
                error_type: ErrorType::Unknown,
            },
            "wallet",
        );
        assert!(matches!(result, Err(Error::DecisionMismatch(_))));
    }

    #[test]
    fn test_decision_wire_shape() {
        let decision: UserDecision = serde_json::from_value(json!({
            "kind": "grant_permission",
            "publicKey": "00",
            "network": "mainnet",
            "scopes": ["read_address"]
        }))
        .unwrap();

        assert!(matches!(decision, UserDecision::GrantPermission { .. }));
    }
}
