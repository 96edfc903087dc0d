/// Maximum number of characters of a text message shown in a preview.
const PREVIEW_LENGTH: usize = 100;

/// What a session encrypts: the content of a single chat message.
#[derive(Clone, Debug, PartialEq)]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image {
        data: Vec<u8>,
        mime_type: String,
        caption: Option<String>,
    },
    File {
        data: Vec<u8>,
        filename: String,
        mime_type: String,
    },
    Voice {
        data: Vec<u8>,
        duration_secs: u32,
    },
    Location {
        latitude: f64,
        longitude: f64,
        accuracy: Option<f32>,
    },
    Contact {
        name: String,
        public_key: Vec<u8>,
    },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The text of a text message, `None` for every other kind.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// A short, single-line summary for notifications and chat lists.
    pub fn preview_text(&self) -> String {
        match self {
            Self::Text { text } => {
                if text.chars().count() > PREVIEW_LENGTH {
                    let truncated: String = text.chars().take(PREVIEW_LENGTH).collect();
                    format!("{truncated}...")
                } else {
                    text.clone()
                }
            }
            Self::Image { caption, .. } => match caption {
                Some(caption) => format!("📷 {caption}"),
                None => "📷 Image".to_string(),
            },
            Self::File { filename, .. } => format!("📎 {filename}"),
            Self::Voice { duration_secs, .. } => format!("🎤 Voice message ({duration_secs}s)"),
            Self::Location { .. } => "📍 Location".to_string(),
            Self::Contact { name, .. } => format!("👤 Contact: {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_text_preview_is_truncated() {
        let content = MessageContent::text("é".repeat(150));
        let preview = content.preview_text();

        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_LENGTH + 3);
    }

    #[test]
    fn test_media_previews() {
        let file = MessageContent::File {
            data: vec![1, 2, 3],
            filename: "report.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
        };
        assert_eq!(file.preview_text(), "📎 report.pdf");
        assert_eq!(file.as_text(), None);

        let image = MessageContent::Image {
            data: vec![],
            mime_type: "image/png".to_string(),
            caption: None,
        };
        assert_eq!(image.preview_text(), "📷 Image");

        let contact = MessageContent::Contact {
            name: "Bob".to_string(),
            public_key: vec![0; 32],
        };
        assert_eq!(contact.preview_text(), "👤 Contact: Bob");
    }
}
