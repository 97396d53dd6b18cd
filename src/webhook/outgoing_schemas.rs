//! # Outgoing Message Schemas
//!
//! Data structures for messages sent to a chat through its webhook URL.
//! The JSON shape is `{"msgtype": "<type>", "<type>": {...}}` plus optional
//! routing fields (`chatid`, `post_id`, `visible_to_user`).

use super::reply::ReplyOption;
use serde::{Deserialize, Serialize};

/// Message to send through a webhook URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Target chat id (or user id for a direct message), the webhook's chat when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chatid: Option<String>,
    /// Thread to answer in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    /// `|` separated user ids allowed to see the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible_to_user: Option<String>,
    #[serde(flatten)]
    pub body: OutgoingBody,
}

impl OutgoingMessage {
    pub fn new(body: OutgoingBody) -> Self {
        Self {
            chatid: None,
            post_id: None,
            visible_to_user: None,
            body,
        }
    }

    /// Creates a new text message
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(OutgoingBody::Text {
            text: TextContent::new(content),
        })
    }

    /// Creates a new markdown message
    pub fn markdown(content: impl Into<String>) -> Self {
        Self::new(OutgoingBody::Markdown {
            markdown: MarkdownContent {
                content: content.into(),
            },
        })
    }

    /// Creates a new file message from an uploaded media id
    pub fn file(media_id: impl Into<String>) -> Self {
        Self::new(OutgoingBody::File {
            file: FileContent {
                media_id: media_id.into(),
            },
        })
    }

    pub fn news(articles: Vec<Article>) -> Self {
        Self::new(OutgoingBody::News {
            news: NewsContent { articles },
        })
    }

    pub fn template_card(card: serde_json::Value) -> Self {
        Self::new(OutgoingBody::TemplateCard {
            template_card: card,
        })
    }

    /// Message type as written in `msgtype`
    pub fn msg_type(&self) -> &'static str {
        match self.body {
            OutgoingBody::Text { .. } => "text",
            OutgoingBody::Markdown { .. } => "markdown",
            OutgoingBody::File { .. } => "file",
            OutgoingBody::Image { .. } => "image",
            OutgoingBody::News { .. } => "news",
            OutgoingBody::Attachment { .. } => "attachment",
            OutgoingBody::Miniprogram { .. } => "miniprogram",
            OutgoingBody::TemplateCard { .. } => "template_card",
        }
    }

    pub fn apply(&mut self, option: ReplyOption) {
        option.apply_to(self);
    }

    /// Applies options in order, a later option wins over an earlier one on the same field
    pub fn apply_all(&mut self, options: impl IntoIterator<Item = ReplyOption>) {
        for option in options {
            self.apply(option);
        }
    }

    pub fn with(mut self, option: ReplyOption) -> Self {
        self.apply(option);
        self
    }
}

/// Type-specific part of an [`OutgoingMessage`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msgtype", rename_all = "snake_case")]
pub enum OutgoingBody {
    Text { text: TextContent },
    Markdown { markdown: MarkdownContent },
    File { file: FileContent },
    Image { image: ImageContent },
    News { news: NewsContent },
    Attachment { attachment: serde_json::Value },
    Miniprogram { miniprogram: serde_json::Value },
    TemplateCard { template_card: serde_json::Value },
}

/// Text content for outgoing messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub content: String,
    /// User ids to mention, `@all` mentions everybody
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentioned_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentioned_mobile_list: Vec<String>,
}

impl TextContent {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkdownContent {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileContent {
    /// Id returned by the media upload
    pub media_id: String,
}

/// Inline image, base64 encoded with the md5 of the raw bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    pub base64: String,
    pub md5: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsContent {
    pub articles: Vec<Article>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picurl: Option<String>,
}
