//! Reply targeting for outgoing messages.
//!
//! Options only touch routing fields of an [`OutgoingMessage`]; sending is the
//! webhook client's job.

use super::{
    outgoing_schemas::{OutgoingBody, OutgoingMessage},
    schemas::CallbackMessage,
};
use tracing::debug;

/// One routing change applied to an [`OutgoingMessage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOption {
    /// Answer in the chat and thread of a received message
    ReplyToChat { chat_id: String, post_id: String },
    /// Send straight to one user
    ReplyToUser(String),
    /// Mention these users (text messages only)
    MentionUsers(Vec<String>),
    /// Restrict who can see the message in a group
    VisibleToUser(Vec<String>),
}

impl ReplyOption {
    /// Copies chat id and post id from a received message
    pub fn reply_to_chat(message: &CallbackMessage) -> Self {
        ReplyOption::ReplyToChat {
            chat_id: message.chat_id.clone(),
            post_id: message.post_id.clone(),
        }
    }

    /// Targets the sender of a received message directly
    pub fn reply_to_sender(message: &CallbackMessage) -> Self {
        ReplyOption::ReplyToUser(message.from.user_id.clone())
    }

    pub fn mention_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ReplyOption::MentionUsers(users.into_iter().map(Into::into).collect())
    }

    pub fn visible_to_user<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ReplyOption::VisibleToUser(users.into_iter().map(Into::into).collect())
    }

    pub(crate) fn apply_to(self, message: &mut OutgoingMessage) {
        match self {
            ReplyOption::ReplyToChat { chat_id, post_id } => {
                message.chatid = non_empty(chat_id);
                message.post_id = non_empty(post_id);
            }
            ReplyOption::ReplyToUser(user_id) => {
                message.chatid = non_empty(user_id);
                message.post_id = None;
            }
            ReplyOption::MentionUsers(users) => {
                let msg_type = message.msg_type();
                match &mut message.body {
                    OutgoingBody::Text { text } => text.mentioned_list = users,
                    _ => debug!("mentions are ignored for {msg_type} messages"),
                }
            }
            ReplyOption::VisibleToUser(users) => {
                message.visible_to_user = if users.is_empty() {
                    None
                } else {
                    Some(users.join("|"))
                };
            }
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
