//! Forwards the photo of a Telegram message to a TRMNL custom plugin.
//!
//! One message per run: check the sender, pick the largest photo, resolve
//! it to a download URL through the Bot API, turn the caption into
//! `img_class` / `img_style`, and POST the merge variables to TRMNL.

pub mod caption;
pub mod config;
pub mod error;
pub mod message;
pub mod relay;
pub mod telegram;
pub mod trmnl;

pub use config::{Config, FailureMode};
pub use error::RelayError;
pub use message::Message;
pub use relay::{Relay, RunOutcome};
