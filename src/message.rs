use serde::Deserialize;

use crate::error::{RelayError, Result};

/// The subset of a Telegram message this relay reads. Other fields of the
/// Bot API object are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub caption: Option<String>,
}

impl Message {
    /// Decode a message from raw JSON. Malformed input is a validation
    /// error so it can be reported like any other rejected message.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| RelayError::Validation(format!("Invalid Telegram message: {}", e)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

/// One size variant of a photo.
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl PhotoSize {
    fn area(&self) -> Option<u64> {
        Some(u64::from(self.width?) * u64::from(self.height?))
    }
}

/// Reject the message when a user filter is configured and the sender does
/// not match it. A message without a sender never matches a filter.
pub fn check_permission(message: &Message, filter_user_id: Option<i64>) -> Result<()> {
    let Some(allowed) = filter_user_id else {
        return Ok(());
    };
    match &message.from {
        Some(user) if user.id == allowed => Ok(()),
        _ => Err(RelayError::Permission),
    }
}

/// Pick the highest-resolution variant of the message's photo.
///
/// Telegram lists sizes in ascending order, so the last variant is the
/// largest. When every variant reports its dimensions the largest area wins
/// instead (later variants win ties), which agrees with the ordering
/// convention whenever Telegram honours it.
pub fn best_photo(message: &Message) -> Result<&PhotoSize> {
    let photos = match message.photo.as_deref() {
        Some(photos) if !photos.is_empty() => photos,
        _ => return Err(RelayError::missing_photo()),
    };

    if photos.iter().all(|p| p.area().is_some()) {
        if let Some(best) = photos.iter().max_by_key(|p| p.area()) {
            return Ok(best);
        }
    }

    photos.last().ok_or_else(RelayError::missing_photo)
}
