//! Relay protocol messages.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{GlobalConfig, ReceiverError, ReceiverResult};

/// Placeholder credential sent in the auth frame. The relay identifies the
/// node by `target_id`; request authenticity is established per message.
pub const AUTH_PLACEHOLDER_KEY: &str = "dummy key";

/// Frame sent once on every connection open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthFrame {
    pub action: String,
    pub key: String,
    pub target_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
}

impl AuthFrame {
    /// Build the auth frame from the current global configuration.
    ///
    /// Account and cluster are sent only as a pair; without them the relay
    /// treats the node as unclaimed.
    pub fn from_global(config: &GlobalConfig) -> Self {
        let identity = config.claimed_identity();
        Self {
            action: "auth".to_string(),
            key: AUTH_PLACEHOLDER_KEY.to_string(),
            target_id: config.target_id.clone(),
            account_id: identity.map(|(account_id, _)| account_id.to_string()),
            cluster_name: identity.map(|(_, cluster_name)| cluster_name.to_string()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Body of a directly signed action request.
///
/// Field order is the canonical signing order; absent optional fields are
/// left out of the signed bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequestBody {
    pub account_id: String,
    pub cluster_name: String,
    pub action_name: String,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_params: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sinks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// An action request that has not been verified yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedActionRequest {
    pub signature: String,
    pub body: ActionRequestBody,
}

/// An action cleared for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedActionRequest {
    /// Empty for requests the relay routed directly to this node.
    #[serde(default)]
    pub target_id: String,
    pub action_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub action_params: Map<String, Value>,
    #[serde(default)]
    pub sinks: Option<Vec<String>>,
    #[serde(default)]
    pub origin: Option<String>,
}

impl ResolvedActionRequest {
    /// Resolve a verified direct request. The relay already routed it here,
    /// so the target is left empty.
    pub fn from_verified(body: ActionRequestBody) -> Self {
        Self {
            target_id: String::new(),
            action_name: body.action_name,
            action_params: body.action_params.unwrap_or_default(),
            sinks: body.sinks,
            origin: body.origin,
        }
    }

    pub(crate) fn ensure_dispatchable(&self) -> ReceiverResult<()> {
        if self.action_name.trim().is_empty() {
            return Err(ReceiverError::InvalidRequest(
                "action_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Envelope carried, JSON-encoded, in a callback entry's `value`.
///
/// Produced by a system that has already authenticated the request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IncomingRequestEnvelope {
    pub incoming_request: ResolvedActionRequest,
}

/// One element of a legacy `actions` list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallbackEntry {
    pub value: String,
}

impl CallbackEntry {
    pub fn from_value(entry: Value) -> ReceiverResult<Self> {
        Ok(serde_json::from_value(entry)?)
    }

    /// Decode the embedded envelope and return the request it carries.
    pub fn resolve(&self) -> ReceiverResult<ResolvedActionRequest> {
        let envelope: IncomingRequestEnvelope = serde_json::from_str(&self.value)?;
        Ok(envelope.incoming_request)
    }
}

/// An inbound frame, classified by format.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Legacy callback format: independent entries, each decoded on its own.
    Callback(Vec<Value>),
    /// Direct format: a single signed request.
    Direct(SignedActionRequest),
}

impl InboundFrame {
    /// Decode a raw text frame.
    ///
    /// The `actions` field is probed first. A non-empty list selects the
    /// callback format; an absent, null or empty field selects the direct
    /// format, which is then decoded as a whole.
    pub fn decode(raw: &str) -> ReceiverResult<Self> {
        let mut object = match serde_json::from_str::<Value>(raw)? {
            Value::Object(object) => object,
            other => {
                return Err(ReceiverError::MalformedFrame(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        match object.remove("actions") {
            Some(Value::Array(entries)) if !entries.is_empty() => Ok(Self::Callback(entries)),
            None | Some(Value::Null) | Some(Value::Array(_)) => {
                let request = serde_json::from_value(Value::Object(object))?;
                Ok(Self::Direct(request))
            }
            Some(other) => Err(ReceiverError::MalformedFrame(format!(
                "`actions` must be a list, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
