//! Receiver configuration.

use std::time::Duration;

use crate::{ReceiverError, ReceiverResult};

/// Default relay address. Deployments are expected to override it.
pub const DEFAULT_RELAY_ADDRESS: &str = "wss://relay.example.com";

/// Default pause between a closed connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 3;

/// Default maximum age of a signed request.
pub const DEFAULT_REQUEST_TIME_WINDOW_SECS: u64 = 3600;

/// Relay receiver configuration.
///
/// Read once at process start; the signing secret and node identity are not
/// part of it (see [`crate::GlobalConfigProvider`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Relay WebSocket URL. Empty means send-only mode.
    pub relay_address: String,
    /// Whether inbound requests are processed at all.
    pub incoming_enabled: bool,
    /// Log every raw frame under the `relay_receiver::transport` target.
    pub transport_tracing: bool,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Maximum age, in seconds, of a signed request's timestamp.
    pub request_time_window_secs: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            relay_address: DEFAULT_RELAY_ADDRESS.to_string(),
            incoming_enabled: true,
            transport_tracing: false,
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            request_time_window_secs: DEFAULT_REQUEST_TIME_WINDOW_SECS,
        }
    }
}

impl ReceiverConfig {
    /// Defaults overridden from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden from an arbitrary variable source.
    ///
    /// Recognized variables:
    /// - `WEBSOCKET_RELAY_ADDRESS`
    /// - `INCOMING_RECEIVER_ENABLED`
    /// - `RECEIVER_ENABLE_WEBSOCKET_TRACING`
    /// - `INCOMING_WEBSOCKET_RECONNECT_DELAY_SEC`
    /// - `INCOMING_REQUEST_TIME_WINDOW_SECONDS`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(address) = lookup("WEBSOCKET_RELAY_ADDRESS") {
            config.relay_address = address.trim().to_string();
        }

        // Anything other than an explicit "true" keeps the receiver off.
        if let Some(raw) = lookup("INCOMING_RECEIVER_ENABLED") {
            config.incoming_enabled = parse_flag(&raw).unwrap_or(false);
        }

        if let Some(raw) = lookup("RECEIVER_ENABLE_WEBSOCKET_TRACING") {
            config.transport_tracing = parse_flag(&raw).unwrap_or(false);
        }

        if let Some(secs) = lookup("INCOMING_WEBSOCKET_RECONNECT_DELAY_SEC")
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            config.reconnect_delay = Duration::from_secs(secs);
        }

        if let Some(secs) = lookup("INCOMING_REQUEST_TIME_WINDOW_SECONDS")
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            config.request_time_window_secs = secs;
        }

        config
    }

    /// True when the receiver should not open any connection.
    pub fn is_send_only(&self) -> bool {
        !self.incoming_enabled || self.relay_address.trim().is_empty()
    }

    /// Check the relay address is a WebSocket URL.
    pub fn validate(&self) -> ReceiverResult<()> {
        let address = self.relay_address.trim();
        if !address.is_empty() && !(address.starts_with("ws://") || address.starts_with("wss://")) {
            return Err(ReceiverError::Config(format!(
                "relay address must use ws:// or wss://, got {address}"
            )));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
