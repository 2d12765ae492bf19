use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, WorkspaceError};

/// Body sent to the execution engine. `code` travels base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    pub language: String,
}

impl ExecuteRequest {
    pub fn encode(code: &str, language: &str) -> Self {
        Self {
            code: STANDARD.encode(code.as_bytes()),
            language: language.to_string(),
        }
    }

    pub fn decoded_code(&self) -> Result<String> {
        let bytes = STANDARD
            .decode(&self.code)
            .map_err(|e| WorkspaceError::MalformedResponse {
                message: format!("code is not valid base64: {}", e),
                partial: None,
            })?;
        String::from_utf8(bytes).map_err(|e| WorkspaceError::MalformedResponse {
            message: format!("code is not valid UTF-8: {}", e),
            partial: None,
        })
    }
}

/// Response body of the execution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
    pub success: bool,
    pub output: String,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time: Option<f64>,
}

/// Remote service that runs submitted code.
///
/// `Ok` means the engine answered with a well-formed body, whether or not the
/// run itself succeeded. Anything else is a transport failure.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execute(&self, request: &ExecuteRequest) -> Result<EngineResponse>;
}

/// Where the engine lives and how long the transport may wait for it
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: String,
    pub timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn execute_url(&self) -> String {
        format!("{}/execute", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(feature = "http")]
pub use transport::HttpExecutionEngine;

#[cfg(feature = "http")]
mod transport {
    use super::*;
    use reqwest::Client;
    use serde_json::Value;
    use tracing::{debug, warn};

    /// `POST {base_url}/execute` over HTTP(S)
    #[derive(Clone)]
    pub struct HttpExecutionEngine {
        client: Client,
        url: String,
    }

    impl HttpExecutionEngine {
        pub fn new(config: &EngineConfig) -> Result<Self> {
            let mut builder = Client::builder();
            if let Some(timeout) = config.timeout {
                builder = builder.timeout(timeout);
            }
            let client = builder
                .build()
                .map_err(|e| WorkspaceError::Config(format!("Failed to build HTTP client: {}", e)))?;

            Ok(Self {
                client,
                url: config.execute_url(),
            })
        }
    }

    #[async_trait]
    impl ExecutionEngine for HttpExecutionEngine {
        async fn execute(&self, request: &ExecuteRequest) -> Result<EngineResponse> {
            debug!(url = %self.url, language = %request.language, "sending code to execution engine");

            let response = self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .json(request)
                .send()
                .await
                .map_err(|e| WorkspaceError::Transport(e.to_string()))?;

            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|e| WorkspaceError::Transport(e.to_string()))?;
            let payload = serde_json::from_slice::<Value>(&body).ok();

            if !status.is_success() {
                warn!("Execution engine answered with status {}", status);
                return Err(WorkspaceError::EngineStatus {
                    status: status.as_u16(),
                    body: payload,
                });
            }

            let payload = payload.ok_or_else(|| WorkspaceError::MalformedResponse {
                message: "response body is not JSON".to_string(),
                partial: None,
            })?;

            serde_json::from_value::<EngineResponse>(payload.clone()).map_err(|e| {
                WorkspaceError::MalformedResponse {
                    message: e.to_string(),
                    partial: Some(payload),
                }
            })
        }
    }
}
