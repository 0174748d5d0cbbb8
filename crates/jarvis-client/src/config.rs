//! Client configuration types.
//!
//! This module defines the settings shared by the transport client, the
//! conversation state machine and the workspace facade.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the Jarvis client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the backend (e.g., "http://localhost:8000").
    #[serde(default = "ClientConfig::default_base_url")]
    pub base_url: String,

    /// Model used for new conversations until the user picks another.
    #[serde(default = "ClientConfig::default_model")]
    pub default_model: String,

    /// Maximum number of messages sent as context with each request.
    #[serde(default = "ClientConfig::default_context_window")]
    pub context_window: usize,

    /// Timeout for non-streaming requests in seconds.
    #[serde(default = "ClientConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// TCP connect timeout in seconds.
    #[serde(default = "ClientConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Title given to chats created without one.
    #[serde(default = "ClientConfig::default_chat_title")]
    pub default_chat_title: String,
}

impl ClientConfig {
    fn default_base_url() -> String {
        "http://localhost:8000".to_string()
    }

    fn default_model() -> String {
        "qwen2.5-coder:7b".to_string()
    }

    const fn default_context_window() -> usize {
        20
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_connect_timeout() -> u64 {
        5
    }

    fn default_chat_title() -> String {
        "New Chat".to_string()
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the connect timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            default_model: Self::default_model(),
            context_window: Self::default_context_window(),
            request_timeout_seconds: Self::default_request_timeout(),
            connect_timeout_seconds: Self::default_connect_timeout(),
            default_chat_title: Self::default_chat_title(),
        }
    }
}
