//! Request authentication: canonical request bytes, timestamp window,
//! RSA-PSS signatures and the gate that ties them together.

pub mod canonical;
pub mod gate;
pub mod middleware;
pub mod signature;
pub mod timestamp;

pub use canonical::canonical_request;
pub use gate::{AuthHeader, AuthOutcome, AuthRequest, AuthenticationGate, GateState, RejectReason};
pub use middleware::{require_signature, AppState, AuthenticatedKey};
pub use signature::{sign_canonical, verify_signature, SigningError};
pub use timestamp::{
    Clock, FixedClock, SystemClock, TimestampValidator, DEFAULT_TIMESTAMP_WINDOW_SECS,
};
