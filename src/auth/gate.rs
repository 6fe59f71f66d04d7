//! The authentication gate: a small state machine run once per request.
//!
//! ```text
//! Start -> HeadersChecked -> TimestampChecked -> KeyResolved -> SignatureChecked -> Accepted
//!   \            \                  \                 \
//!    `------------`------------------`-----------------`--> Rejected(reason)
//! ```
//!
//! A failure to reach the durable store while resolving the key is logged as
//! a store failure and then rejected as [`RejectReason::UnknownOrInactiveKey`],
//! so an outage locks callers out rather than letting them through.

use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;

use super::canonical::canonical_request;
use super::signature::verify_signature;
use super::timestamp::TimestampValidator;
use crate::models::PublicKeyRecord;
use crate::storage::PublicKeyCache;

/// Why a request was refused. Logged, never sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingHeaders,
    ExpiredOrInvalidTimestamp,
    UnknownOrInactiveKey,
    InvalidSignature,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingHeaders => "missing_headers",
            RejectReason::ExpiredOrInvalidTimestamp => "expired_or_invalid_timestamp",
            RejectReason::UnknownOrInactiveKey => "unknown_or_inactive_key",
            RejectReason::InvalidSignature => "invalid_signature",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the gate looks at. Header values are `None` when absent.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub method: &'a str,
    /// URI path without the query string.
    pub path: &'a str,
    pub api_key_id: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub body: &'a [u8],
}

/// The three mandatory headers, once all are known to be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthHeader<'a> {
    pub api_key_id: &'a str,
    pub timestamp: &'a str,
    pub signature: &'a str,
}

impl<'a> AuthRequest<'a> {
    /// All three headers, or `None` if any is missing or empty.
    pub fn headers(&self) -> Option<AuthHeader<'a>> {
        let present = |v: Option<&'a str>| v.filter(|s| !s.is_empty());
        Some(AuthHeader {
            api_key_id: present(self.api_key_id)?,
            timestamp: present(self.timestamp)?,
            signature: present(self.signature)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateState<'a> {
    Start,
    HeadersChecked(AuthHeader<'a>),
    TimestampChecked(AuthHeader<'a>),
    KeyResolved(AuthHeader<'a>, PublicKeyRecord),
    SignatureChecked(PublicKeyRecord),
    Accepted(PublicKeyRecord),
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Accepted(PublicKeyRecord),
    Rejected(RejectReason),
}

impl AuthOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AuthOutcome::Accepted(_))
    }
}

pub struct AuthenticationGate {
    timestamps: TimestampValidator,
    keys: Arc<PublicKeyCache>,
}

impl AuthenticationGate {
    pub fn new(timestamps: TimestampValidator, keys: Arc<PublicKeyCache>) -> Self {
        Self { timestamps, keys }
    }

    /// Run the state machine to a terminal state.
    pub async fn evaluate(&self, request: &AuthRequest<'_>) -> AuthOutcome {
        let mut state = GateState::Start;
        loop {
            state = match self.step(request, state).await {
                GateState::Accepted(record) => return AuthOutcome::Accepted(record),
                GateState::Rejected(reason) => return AuthOutcome::Rejected(reason),
                next => next,
            };
        }
    }

    /// Advance one transition. Terminal states are returned unchanged.
    pub async fn step<'a>(&self, request: &AuthRequest<'a>, state: GateState<'a>) -> GateState<'a> {
        match state {
            GateState::Start => match request.headers() {
                Some(headers) => GateState::HeadersChecked(headers),
                None => GateState::Rejected(RejectReason::MissingHeaders),
            },
            GateState::HeadersChecked(headers) => {
                if self.timestamps.validate(headers.timestamp) {
                    GateState::TimestampChecked(headers)
                } else {
                    GateState::Rejected(RejectReason::ExpiredOrInvalidTimestamp)
                }
            }
            GateState::TimestampChecked(headers) => match self.keys.get(headers.api_key_id).await {
                Ok(Some(record)) => GateState::KeyResolved(headers, record),
                Ok(None) => GateState::Rejected(RejectReason::UnknownOrInactiveKey),
                Err(e) => {
                    tracing::error!(
                        action = "key_lookup_failed",
                        key_id = %headers.api_key_id,
                        error = %e,
                        "Durable key store unavailable, rejecting request"
                    );
                    GateState::Rejected(RejectReason::UnknownOrInactiveKey)
                }
            },
            GateState::KeyResolved(headers, record) => {
                let Ok(signature) = general_purpose::STANDARD.decode(headers.signature) else {
                    tracing::debug!(key_id = %record.key_id, "Signature header is not base64");
                    return GateState::Rejected(RejectReason::InvalidSignature);
                };
                let message = canonical_request(
                    request.method,
                    request.path,
                    headers.timestamp,
                    request.body,
                );
                if verify_signature(&record.public_key, &signature, &message) {
                    GateState::SignatureChecked(record)
                } else {
                    GateState::Rejected(RejectReason::InvalidSignature)
                }
            }
            GateState::SignatureChecked(record) => GateState::Accepted(record),
            terminal @ (GateState::Accepted(_) | GateState::Rejected(_)) => terminal,
        }
    }
}
