use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::caption::CaptionStyle;
use crate::config::{Config, FailureMode};
use crate::error::RelayError;
use crate::message::{self, Message};
use crate::telegram::TelegramClient;
use crate::trmnl::{Payload, TrmnlClient};

/// What was sent to TRMNL and what came back.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub payload: Payload,
    pub response: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorReport {
    pub message: String,
    pub timestamp: String,
}

/// Result handed back to the invoking workflow.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum RunOutcome {
    Delivered {
        success: bool,
        sent_payload: Payload,
        response_from_trmnl: Value,
    },
    /// A soft failure. `success` stays true so the workflow continues;
    /// `shouldNotify` asks it to alert someone.
    Failed {
        success: bool,
        error: ErrorReport,
        #[serde(rename = "shouldNotify")]
        should_notify: bool,
    },
}

impl RunOutcome {
    fn delivered(delivery: Delivery) -> Self {
        RunOutcome::Delivered {
            success: true,
            sent_payload: delivery.payload,
            response_from_trmnl: delivery.response,
        }
    }

    fn failed(err: &RelayError) -> Self {
        RunOutcome::Failed {
            success: true,
            error: ErrorReport {
                message: err.to_string(),
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
            should_notify: true,
        }
    }

    /// One-line summary for the workflow log.
    pub fn summary(&self) -> String {
        match self {
            RunOutcome::Delivered { .. } => "Image sent to TRMNL successfully.".to_string(),
            RunOutcome::Failed { error, .. } => format!("Error: {}", error.message),
        }
    }
}

/// Forwards the photo of one Telegram message to a TRMNL plugin.
pub struct Relay {
    telegram: TelegramClient,
    trmnl: TrmnlClient,
    filter_user_id: Option<i64>,
    failure_mode: FailureMode,
}

impl Relay {
    pub fn new(
        telegram: TelegramClient,
        trmnl: TrmnlClient,
        filter_user_id: Option<i64>,
        failure_mode: FailureMode,
    ) -> Self {
        Self {
            telegram,
            trmnl,
            filter_user_id,
            failure_mode,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trmnl-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let telegram = TelegramClient::new(
            client.clone(),
            config.telegram.effective_api_base(),
            config.telegram.bot_token.trim(),
        );
        let trmnl = TrmnlClient::new(client, config.trmnl.endpoint());

        Ok(Self::new(
            telegram,
            trmnl,
            config.telegram.filter_user_id,
            config.delivery.failure_mode,
        ))
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    /// Run every step, stopping at the first failure.
    pub async fn deliver(&self, message: &Message) -> Result<Delivery, RelayError> {
        message::check_permission(message, self.filter_user_id)?;
        let photo = message::best_photo(message)?;

        let image_url = self.telegram.resolve_file_url(&photo.file_id).await?;
        let style = CaptionStyle::from_message(message);
        let payload = Payload::new(image_url, &style);

        let response = self.trmnl.send(&payload).await?;

        Ok(Delivery { payload, response })
    }

    /// Deliver and shape the result according to the failure mode. Only
    /// strict mode returns `Err`.
    pub async fn run(&self, message: &Message) -> Result<RunOutcome, RelayError> {
        let result = self.deliver(message).await;
        self.settle(result)
    }

    /// Like [`Relay::run`], starting from raw message JSON so that a
    /// malformed message is settled by the failure mode too.
    pub async fn run_json(&self, raw: &str) -> Result<RunOutcome, RelayError> {
        match Message::from_json(raw) {
            Ok(message) => self.run(&message).await,
            Err(e) => self.settle(Err(e)),
        }
    }

    fn settle(&self, result: Result<Delivery, RelayError>) -> Result<RunOutcome, RelayError> {
        match result {
            Ok(delivery) => {
                info!("Image sent to TRMNL ({})", self.trmnl.endpoint());
                Ok(RunOutcome::delivered(delivery))
            }
            Err(e) => match self.failure_mode {
                FailureMode::Soft => {
                    warn!("Relay failed ({} error): {}", e.kind(), e);
                    Ok(RunOutcome::failed(&e))
                }
                FailureMode::Strict => {
                    error!("Relay failed ({} error): {}", e.kind(), e);
                    Err(e)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "T";

    fn relay(
        telegram: &MockServer,
        trmnl: &MockServer,
        filter: Option<i64>,
        mode: FailureMode,
    ) -> Relay {
        let client = reqwest::Client::new();
        Relay::new(
            TelegramClient::new(client.clone(), telegram.uri(), TOKEN),
            TrmnlClient::new(client, format!("{}/custom_plugins/plugin-1", trmnl.uri())),
            filter,
            mode,
        )
    }

    fn message(json: Value) -> Message {
        serde_json::from_value(json).unwrap()
    }

    async fn mount_get_file(server: &MockServer, file_id: &str, file_path: &str) {
        Mock::given(method("GET"))
            .and(path("/botT/getFile"))
            .and(query_param("file_id", file_id))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true, "result": {"file_path": file_path}})),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    async fn expect_no_post(server: &MockServer) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_end_to_end_delivery() {
        let telegram = MockServer::start().await;
        let trmnl = MockServer::start().await;
        mount_get_file(&telegram, "xyz", "photos/file_1.jpg").await;

        let img_url = format!("{}/file/botT/photos/file_1.jpg", telegram.uri());
        Mock::given(method("POST"))
            .and(path("/custom_plugins/plugin-1"))
            .and(wiremock::matchers::body_json(
                json!({"merge_variables": {"img_url": img_url, "img_class": "big"}}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": null})))
            .expect(1)
            .mount(&trmnl)
            .await;

        let relay = relay(&telegram, &trmnl, None, FailureMode::Soft);
        let msg = message(json!({"from": {"id": 1}, "photo": [{"file_id": "xyz"}], "caption": ".big"}));

        let outcome = relay.run(&msg).await.unwrap();
        assert_eq!(outcome.summary(), "Image sent to TRMNL successfully.");
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "success": true,
                "sent_payload": {"merge_variables": {"img_url": img_url, "img_class": "big"}},
                "response_from_trmnl": {"message": null}
            })
        );
    }

    #[tokio::test]
    async fn test_resolver_uses_last_photo_variant() {
        let telegram = MockServer::start().await;
        let trmnl = MockServer::start().await;
        mount_get_file(&telegram, "c", "photos/c.jpg").await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&trmnl)
            .await;

        let relay = relay(&telegram, &trmnl, None, FailureMode::Strict);
        let msg = message(json!({
            "from": {"id": 1},
            "photo": [{"file_id": "a"}, {"file_id": "b"}, {"file_id": "c"}]
        }));

        let delivery = relay.deliver(&msg).await.unwrap();
        assert!(delivery.payload.merge_variables.img_url.ends_with("/photos/c.jpg"));
        assert_eq!(delivery.payload.merge_variables.img_class, None);
        assert_eq!(delivery.response, Value::Null);
    }

    #[tokio::test]
    async fn test_permission_denied_before_any_request() {
        let telegram = MockServer::start().await;
        let trmnl = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&telegram)
            .await;
        expect_no_post(&trmnl).await;

        let relay = relay(&telegram, &trmnl, Some(42), FailureMode::Strict);
        let msg = message(json!({"from": {"id": 7}, "photo": [{"file_id": "a"}]}));

        let err = relay.run(&msg).await.unwrap_err();
        assert!(matches!(err, RelayError::Permission));
    }

    #[tokio::test]
    async fn test_missing_file_path_skips_delivery() {
        let telegram = MockServer::start().await;
        let trmnl = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botT/getFile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {}})))
            .mount(&telegram)
            .await;
        expect_no_post(&trmnl).await;

        let relay = relay(&telegram, &trmnl, None, FailureMode::Strict);
        let msg = message(json!({"from": {"id": 1}, "photo": [{"file_id": "a"}]}));

        let err = relay.deliver(&msg).await.unwrap_err();
        assert!(matches!(err, RelayError::Resolution));
    }

    #[tokio::test]
    async fn test_soft_mode_reports_error_in_outcome() {
        let telegram = MockServer::start().await;
        let trmnl = MockServer::start().await;
        mount_get_file(&telegram, "a", "photos/a.jpg").await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"message": "Invalid merge variables"})),
            )
            .mount(&trmnl)
            .await;

        let relay = relay(&telegram, &trmnl, None, FailureMode::Soft);
        let msg = message(json!({"from": {"id": 1}, "photo": [{"file_id": "a"}]}));

        let outcome = relay.run(&msg).await.unwrap();
        assert_eq!(outcome.summary(), "Error: Invalid merge variables");

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["shouldNotify"], true);
        assert_eq!(value["error"]["message"], "Invalid merge variables");
        let timestamp = value["error"]["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert!(value.get("sent_payload").is_none());
    }

    #[tokio::test]
    async fn test_soft_mode_covers_validation_errors() {
        let telegram = MockServer::start().await;
        let trmnl = MockServer::start().await;

        let relay = relay(&telegram, &trmnl, None, FailureMode::Soft);
        let msg = message(json!({"from": {"id": 1}, "caption": "hello"}));

        let outcome = relay.run(&msg).await.unwrap();
        assert_eq!(outcome.summary(), "Error: No photo found in the message");
    }

    #[tokio::test]
    async fn test_strict_mode_propagates_delivery_error() {
        let telegram = MockServer::start().await;
        let trmnl = MockServer::start().await;
        mount_get_file(&telegram, "a", "photos/a.jpg").await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not found"})))
            .mount(&trmnl)
            .await;

        let relay = relay(&telegram, &trmnl, None, FailureMode::Soft)
            .with_failure_mode(FailureMode::Strict);
        assert_eq!(relay.failure_mode(), FailureMode::Strict);

        let msg = message(json!({"from": {"id": 1}, "photo": [{"file_id": "a"}]}));
        let err = relay.run(&msg).await.unwrap_err();
        assert_eq!(err.kind(), "transport");
        assert_eq!(err.to_string(), "Not found");
    }

    #[tokio::test]
    async fn test_soft_mode_reports_malformed_message() {
        let telegram = MockServer::start().await;
        let trmnl = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&telegram)
            .await;
        expect_no_post(&trmnl).await;

        let relay = relay(&telegram, &trmnl, None, FailureMode::Soft);
        for raw in [
            r#"{"from": {"id": 1}, "photo": [{"width": 90}]}"#,
            r#"{"from": {"id": 1}, "photo": "x"}"#,
        ] {
            let outcome = relay.run_json(raw).await.unwrap();
            assert!(outcome.summary().starts_with("Error: Invalid Telegram message"));

            let value = serde_json::to_value(&outcome).unwrap();
            assert_eq!(value["success"], true);
            assert_eq!(value["shouldNotify"], true);
        }
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_malformed_message() {
        let telegram = MockServer::start().await;
        let trmnl = MockServer::start().await;

        let relay = relay(&telegram, &trmnl, None, FailureMode::Strict);
        let err = relay
            .run_json(r#"{"from": {"id": 1}, "photo": [{"width": 90}]}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
    }
}
