// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Exchange prompts with the completion service over HTTP.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use serde_json::Value;
use thiserror::Error;
use ureq::Agent;

use crate::config::GatewayConfig;

/// Reasons a completion exchange can fail.
///
/// The dispatcher renders these into the session's `error` file; they never
/// surface as filesystem errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No API credential was found in the environment.
    #[error("API key not found; set {0} before mounting")]
    MissingCredential(String),
    /// The HTTP exchange never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The service answered with a non-success status.
    #[error("completion service returned status {status}: {detail}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as far as it could be read.
        detail: String,
    },
    /// The response body did not carry a completion.
    #[error("malformed completion response: {0}")]
    Malformed(String),
}

/// One synchronous completion exchange per accepted request write.
///
/// No retry, no backoff, no caching; a caller retries by writing again.
pub trait CompletionGateway {
    /// Submit the prompt bytes and return the completion bytes.
    fn complete(&self, prompt: &[u8]) -> Result<Vec<u8>, GatewayError>;
}

/// Blocking chat-completions client.
pub struct HttpGateway {
    agent: Agent,
    endpoint: String,
    model: String,
    system_prompt: String,
    api_key: Option<String>,
    key_env: String,
}

impl HttpGateway {
    /// Build a gateway from config, reading the credential from the environment.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        let api_key = std::env::var(&config.key_env)
            .ok()
            .filter(|key| !key.is_empty());
        Self {
            agent: Agent::new(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            api_key,
            key_env: config.key_env.clone(),
        }
    }

    /// True when a credential is available.
    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

impl CompletionGateway for HttpGateway {
    fn complete(&self, prompt: &[u8]) -> Result<Vec<u8>, GatewayError> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(GatewayError::MissingCredential(self.key_env.clone()));
        };
        let prompt_text = String::from_utf8_lossy(prompt);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": prompt_text },
            ],
            "stream": false,
        });
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {key}"))
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())
            .map_err(|err| match err {
                ureq::Error::Status(status, response) => GatewayError::Status {
                    status,
                    detail: response.into_string().unwrap_or_default(),
                },
                ureq::Error::Transport(transport) => {
                    GatewayError::Transport(transport.to_string())
                }
            })?;
        let text = response
            .into_string()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        let parsed: Value = serde_json::from_str(&text)
            .map_err(|err| GatewayError::Malformed(err.to_string()))?;
        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                GatewayError::Malformed("missing choices[0].message.content".to_owned())
            })?;
        Ok(content.as_bytes().to_vec())
    }
}
