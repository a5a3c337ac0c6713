use serde::Deserialize;
use tracing::debug;

use crate::error::{RelayError, Result, Service};

#[derive(Debug, Deserialize)]
struct GetFileResponse {
    #[serde(default)]
    result: Option<FileInfo>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    #[serde(default)]
    file_path: Option<String>,
}

/// Resolves Telegram file ids into download URLs via the Bot API.
pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        }
    }

    /// Look up `file_id` with `getFile` and build its download URL.
    pub async fn resolve_file_url(&self, file_id: &str) -> Result<String> {
        let url = format!("{}/bot{}/getFile", self.api_base, self.bot_token);

        debug!("Resolving Telegram file {}", file_id);

        let response = self
            .client
            .get(&url)
            .query(&[("file_id", file_id)])
            .send()
            .await
            .map_err(|e| RelayError::request(Service::Telegram, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::request(Service::Telegram, e))?;
        let parsed: Option<GetFileResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let detail = parsed
                .and_then(|r| r.description)
                .unwrap_or_else(|| format!("Telegram API error ({})", status));
            return Err(RelayError::upstream(
                Service::Telegram,
                status.as_u16(),
                detail,
            ));
        }

        let file_path = parsed
            .and_then(|r| r.result)
            .and_then(|f| f.file_path)
            .filter(|p| !p.trim().is_empty())
            .ok_or(RelayError::Resolution)?;

        debug!("Telegram file {} resolved to {}", file_id, file_path);

        Ok(self.download_url(&file_path))
    }

    fn download_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.bot_token, file_path)
            .trim()
            .to_string()
    }
}

/// Mask the bot token in a download URL built by [`TelegramClient`] so the
/// URL can be logged.
pub fn redact_file_url(url: &str) -> String {
    const MARKER: &str = "/file/bot";
    let Some(start) = url.find(MARKER) else {
        return url.to_string();
    };
    let token_start = start + MARKER.len();
    let token_end = url[token_start..]
        .find('/')
        .map_or(url.len(), |i| token_start + i);
    format!("{}***{}", &url[..token_start], &url[token_end..])
}
