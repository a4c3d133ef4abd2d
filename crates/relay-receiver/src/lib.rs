//! Relay receiver: an outbound WebSocket client that accepts remote action
//! requests.
//!
//! This crate provides:
//! - A reconnect-forever WebSocket connection to the relay, on its own thread
//! - Authentication on every connection open
//! - Disambiguation of the legacy callback and direct signed message formats
//! - HMAC-SHA256 request verification with a freshness window
//! - Dispatch of verified actions to an injected [`ActionRunner`]

mod canonical;
mod config;
mod dispatch;
mod error;
mod global_config;
mod messages;
mod receiver;
mod validator;

pub use canonical::{canonical_body, SIGNATURE_VERSION};
pub use config::{ReceiverConfig, DEFAULT_RELAY_ADDRESS};
pub use dispatch::{ActionInvocation, ActionRunner, ExecutionContext};
pub use error::{ReceiverError, ReceiverResult};
pub use global_config::{FileGlobalConfig, GlobalConfig, GlobalConfigProvider, StaticGlobalConfig};
pub use messages::{
    ActionRequestBody, AuthFrame, CallbackEntry, InboundFrame, IncomingRequestEnvelope,
    ResolvedActionRequest, SignedActionRequest,
};
pub use receiver::{ConnectionState, InboundOutcome, ReceiverHandle, RelayReceiver};
pub use validator::{constant_time_eq, sign, validate, verify, ValidationError};
