//! # Callback Message Schemas
//!
//! Data structures for the decrypted callback documents the chat platform posts
//! to the callback URL.
//!
//! Two shapes live here:
//! - [`RawCallbackMessage`]: the document as written on the wire, every payload optional
//! - [`CallbackMessage`]: the validated message, exactly one [`Payload`] selected by its type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message kind carried in `MsgType`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MsgType {
    Text,
    Image,
    Event,
    Attachment,
    Mixed,
    Interaction,
    ModalSubmit,
    /// Kinds without a dedicated payload (e.g. `template_card_event`)
    Other(String),
}

impl MsgType {
    pub fn as_str(&self) -> &str {
        match self {
            MsgType::Text => "text",
            MsgType::Image => "image",
            MsgType::Event => "event",
            MsgType::Attachment => "attachment",
            MsgType::Mixed => "mixed",
            MsgType::Interaction => "interaction",
            MsgType::ModalSubmit => "modal_submit",
            MsgType::Other(name) => name,
        }
    }
}

impl From<&str> for MsgType {
    fn from(value: &str) -> Self {
        match value {
            "text" => MsgType::Text,
            "image" => MsgType::Image,
            "event" => MsgType::Event,
            "attachment" => MsgType::Attachment,
            "mixed" => MsgType::Mixed,
            "interaction" => MsgType::Interaction,
            "modal_submit" => MsgType::ModalSubmit,
            other => MsgType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root callback document, as decrypted
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawCallbackMessage {
    /// Webhook URL to reply to the chat the message came from
    pub webhook_url: String,
    /// Correlation id, present for attachment callbacks
    pub callback_id: Option<String>,
    pub chat_id: String,
    pub post_id: String,
    /// `single` or `group`
    pub chat_type: String,
    pub get_chat_info_url: String,
    /// Unique per delivery
    pub msg_id: String,
    pub msg_type: String,
    pub from: FromUser,
    pub app_version: String,
    pub text: Option<Text>,
    pub image: Option<Image>,
    pub event: Option<Event>,
    pub attachment: Option<Attachment>,
    pub interaction: Option<Interaction>,
    pub modal_submit: Option<ModalSubmit>,
    pub mixed_message: Option<MixedMessage>,
}

/// Sender of the message
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FromUser {
    pub user_id: String,
    pub name: String,
    pub alias: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Text {
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Image {
    pub image_url: String,
}

/// Chat event, e.g. `add_to_chat`, `delete_from_chat`, `enter_chat`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Event {
    pub event_type: String,
}

/// Button click on a message sent with an attachment
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Attachment {
    pub callback_id: String,
    pub actions: Actions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Actions {
    pub name: String,
    pub value: String,
    #[serde(rename = "Type")]
    pub action_type: String,
}

/// Interaction on a template card
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Interaction {
    pub report_data: Option<String>,
    pub input_text: Option<String>,
    pub input_json: Option<String>,
}

/// Submission of a modal dialog
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ModalSubmit {
    pub input_json: String,
}

/// Composite message (text mixed with images, or a forwarded bundle)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MixedMessage {
    #[serde(rename = "MsgItem")]
    pub items: Vec<MixedItem>,
}

/// One part of a [`MixedMessage`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MixedItem {
    pub msg_type: String,
    pub text: Option<Text>,
    pub image: Option<Image>,
}

/// Type-specific payload of a validated message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(Text),
    Image(Image),
    Event(Event),
    Attachment(Attachment),
    Interaction(Interaction),
    ModalSubmit(ModalSubmit),
    Mixed(MixedMessage),
    Other(String),
}

impl Payload {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Payload::Text(_) => MsgType::Text,
            Payload::Image(_) => MsgType::Image,
            Payload::Event(_) => MsgType::Event,
            Payload::Attachment(_) => MsgType::Attachment,
            Payload::Interaction(_) => MsgType::Interaction,
            Payload::ModalSubmit(_) => MsgType::ModalSubmit,
            Payload::Mixed(_) => MsgType::Mixed,
            Payload::Other(name) => MsgType::Other(name.clone()),
        }
    }
}

/// Validated callback message: common routing metadata plus exactly one payload.
///
/// Built by the dispatcher from a [`RawCallbackMessage`]; the message type is
/// derived from the payload, so the two cannot disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackMessage {
    pub webhook_url: String,
    pub callback_id: Option<String>,
    pub chat_id: String,
    pub post_id: String,
    pub chat_type: String,
    pub get_chat_info_url: String,
    pub msg_id: String,
    pub from: FromUser,
    pub app_version: String,
    pub payload: Payload,
}

impl CallbackMessage {
    pub fn msg_type(&self) -> MsgType {
        self.payload.msg_type()
    }

    pub fn text(&self) -> Option<&Text> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn image(&self) -> Option<&Image> {
        match &self.payload {
            Payload::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn event(&self) -> Option<&Event> {
        match &self.payload {
            Payload::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        match &self.payload {
            Payload::Attachment(attachment) => Some(attachment),
            _ => None,
        }
    }

    pub fn interaction(&self) -> Option<&Interaction> {
        match &self.payload {
            Payload::Interaction(interaction) => Some(interaction),
            _ => None,
        }
    }

    pub fn modal_submit(&self) -> Option<&ModalSubmit> {
        match &self.payload {
            Payload::ModalSubmit(modal_submit) => Some(modal_submit),
            _ => None,
        }
    }

    pub fn mixed(&self) -> Option<&MixedMessage> {
        match &self.payload {
            Payload::Mixed(mixed) => Some(mixed),
            _ => None,
        }
    }

    /// Text content with every `@robot_name` mention removed and whitespace trimmed.
    ///
    /// Group messages addressed to the robot start with its mention; handlers
    /// usually want the remaining command. Returns `None` for non-text messages.
    pub fn content_without_mention(&self, robot_name: &str) -> Option<String> {
        let content = &self.text()?.content;
        if robot_name.is_empty() {
            return Some(content.trim().to_string());
        }

        Some(
            content
                .replace(&format!("@{robot_name}"), "")
                .trim()
                .to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(content: &str) -> CallbackMessage {
        CallbackMessage {
            webhook_url: "http://in.qyapi.weixin.qq.com/cgi-bin/webhook/send?key=abc".into(),
            callback_id: None,
            chat_id: "c1".into(),
            post_id: "p1".into(),
            chat_type: "group".into(),
            get_chat_info_url: String::new(),
            msg_id: "m1".into(),
            from: FromUser::default(),
            app_version: String::new(),
            payload: Payload::Text(Text {
                content: content.into(),
            }),
        }
    }

    #[test]
    fn test_msg_type_from_str() {
        assert_eq!(MsgType::from("text"), MsgType::Text);
        assert_eq!(MsgType::from("modal_submit"), MsgType::ModalSubmit);
        assert_eq!(
            MsgType::from("template_card_event"),
            MsgType::Other("template_card_event".into())
        );
        assert_eq!(MsgType::from("template_card_event").as_str(), "template_card_event");
        assert_eq!(MsgType::Interaction.to_string(), "interaction");
    }

    #[test]
    fn test_payload_accessors() {
        let msg = text_message("hi");
        assert_eq!(msg.msg_type(), MsgType::Text);
        assert_eq!(msg.text().map(|t| t.content.as_str()), Some("hi"));
        assert!(msg.image().is_none());
        assert!(msg.attachment().is_none());
    }

    #[test]
    fn test_content_without_mention() {
        let msg = text_message("@webot  ping ");
        assert_eq!(msg.content_without_mention("webot").as_deref(), Some("ping"));
        assert_eq!(msg.content_without_mention("").as_deref(), Some("@webot  ping"));

        let mut image = text_message("");
        image.payload = Payload::Image(Image::default());
        assert_eq!(image.content_without_mention("webot"), None);
    }
}
