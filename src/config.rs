// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load completion-gateway settings for promptfs.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default chat-completions endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.deepseek.com/v1/chat/completions";
/// Default model identifier.
pub const DEFAULT_MODEL: &str = "deepseek-chat";
/// Default system instruction sent with every prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant";
/// Default environment variable consulted for the API credential.
pub const DEFAULT_KEY_ENV: &str = "DEEPSEEK_API_KEY";

/// Completion-service settings for a mounted filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Chat-completions endpoint URL.
    pub endpoint: String,
    /// Model identifier submitted with every request.
    pub model: String,
    /// System instruction prepended to every prompt.
    pub system_prompt: String,
    /// Environment variable holding the API credential.
    pub key_env: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            key_env: DEFAULT_KEY_ENV.to_owned(),
        }
    }
}

/// Load gateway settings from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
}
