use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::caption::CaptionStyle;
use crate::error::{RelayError, Result, Service};
use crate::telegram::redact_file_url;

/// Merge variables consumed by the TRMNL plugin template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeVariables {
    pub img_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_style: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payload {
    pub merge_variables: MergeVariables,
}

impl Payload {
    /// Empty class or style strings are left out of the payload entirely.
    pub fn new(img_url: impl Into<String>, style: &CaptionStyle) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            merge_variables: MergeVariables {
                img_url: img_url.into(),
                img_class: non_empty(&style.img_class),
                img_style: non_empty(&style.img_style),
            },
        }
    }

    /// Copy safe to log: the image URL carries the bot token.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.merge_variables.img_url = redact_file_url(&copy.merge_variables.img_url);
        copy
    }
}

/// Posts payloads to a single TRMNL custom plugin endpoint.
pub struct TrmnlClient {
    client: reqwest::Client,
    endpoint: String,
}

impl TrmnlClient {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send `payload` and return TRMNL's response body.
    pub async fn send(&self, payload: &Payload) -> Result<Value> {
        info!("Payload sent to TRMNL: {:?}", payload.redacted());

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| RelayError::request(Service::Trmnl, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::request(Service::Trmnl, e))?;
        let body = response_body(&body);

        info!("TRMNL response ({}): {}", status, body);

        if !status.is_success() {
            let message = error_message(&body)
                .unwrap_or_else(|| format!("TRMNL API error ({})", status));
            return Err(RelayError::upstream(Service::Trmnl, status.as_u16(), message));
        }

        Ok(body)
    }
}

fn response_body(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Pull a human-readable error out of an error response body.
fn error_message(body: &Value) -> Option<String> {
    match body {
        Value::Object(map) => ["message", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}
