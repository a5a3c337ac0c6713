use crate::message::Message;

/// Display hints derived from a photo caption.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptionStyle {
    /// `.`-prefixed tokens with the dot stripped.
    pub img_class: String,
    /// Every other token, verbatim.
    pub img_style: String,
}

impl CaptionStyle {
    pub fn from_message(message: &Message) -> Self {
        parse_caption(message.caption.as_deref().unwrap_or_default())
    }
}

/// Split a caption into class tokens and style tokens, keeping caption order
/// within each group.
pub fn parse_caption(caption: &str) -> CaptionStyle {
    let mut classes = Vec::new();
    let mut styles = Vec::new();

    for word in caption.split_whitespace() {
        match word.strip_prefix('.') {
            Some(class) => classes.push(class),
            None => styles.push(word),
        }
    }

    CaptionStyle {
        img_class: classes.join(" "),
        img_style: styles.join(" "),
    }
}
