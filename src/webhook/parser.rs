//! Structural parse of decrypted callback documents.
//!
//! The parser only maps bytes to a [`RawCallbackMessage`]; checking that the
//! message type and payload agree is left to the dispatcher.

use super::{PayloadFormat, schemas::RawCallbackMessage};
use crate::errors::CallbackError;

/// Parses an authenticated plaintext document.
///
/// # Errors
///
/// [`CallbackError::Parse`] if the bytes are not a well-formed document of `format`.
pub fn parse(format: PayloadFormat, plaintext: &[u8]) -> Result<RawCallbackMessage, CallbackError> {
    match format {
        PayloadFormat::Xml => {
            let document = std::str::from_utf8(plaintext)
                .map_err(|e| CallbackError::Parse(e.to_string()))?;
            quick_xml::de::from_str(document).map_err(|e| CallbackError::Parse(e.to_string()))
        }
        PayloadFormat::Json => {
            serde_json::from_slice(plaintext).map_err(|e| CallbackError::Parse(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT_XML: &str = r#"<xml>
    <WebhookUrl><![CDATA[http://in.qyapi.weixin.qq.com/cgi-bin/webhook/send?key=xxxxxxx]]></WebhookUrl>
    <ChatId><![CDATA[c1]]></ChatId>
    <PostId><![CDATA[p1]]></PostId>
    <ChatType>group</ChatType>
    <GetChatInfoUrl><![CDATA[http://in.qyapi.weixin.qq.com/cgi-bin/webhook/get_chat_info?code=m49c5aRCdEP8_QQdZmTNR52yJ5TLGcIMzaLJk3x5KqY]]></GetChatInfoUrl>
    <From>
        <UserId>zhangsan</UserId>
        <Name><![CDATA[张三]]></Name>
        <Alias><![CDATA[jackzhang]]></Alias>
    </From>
    <MsgId>abcdabcdabcd</MsgId>
    <MsgType>text</MsgType>
    <Text>
        <Content><![CDATA[@webot hello]]></Content>
    </Text>
    <AppVersion><![CDATA[2.8.12.1551]]></AppVersion>
</xml>"#;

    #[test]
    fn test_parse_text_xml() {
        let raw = parse(PayloadFormat::Xml, TEXT_XML.as_bytes()).unwrap();

        assert_eq!(raw.msg_type, "text");
        assert_eq!(raw.chat_id, "c1");
        assert_eq!(raw.post_id, "p1");
        assert_eq!(raw.chat_type, "group");
        assert_eq!(raw.msg_id, "abcdabcdabcd");
        assert_eq!(raw.from.user_id, "zhangsan");
        assert_eq!(raw.from.name, "张三");
        assert_eq!(raw.from.alias, "jackzhang");
        assert_eq!(raw.app_version, "2.8.12.1551");
        assert!(raw.webhook_url.ends_with("key=xxxxxxx"));
        assert_eq!(raw.text.unwrap().content, "@webot hello");
        assert!(raw.image.is_none());
        assert!(raw.callback_id.is_none());
    }

    #[test]
    fn test_parse_attachment_xml() {
        let document = r#"<xml>
    <WebhookUrl>http://example.com/cgi-bin/webhook/send?key=k</WebhookUrl>
    <ChatId>c2</ChatId>
    <MsgId>m2</MsgId>
    <MsgType>attachment</MsgType>
    <CallbackId>cb-1</CallbackId>
    <Attachment>
        <CallbackId>cb-1</CallbackId>
        <Actions>
            <Name>approve</Name>
            <Value>yes</Value>
            <Type>button</Type>
        </Actions>
    </Attachment>
</xml>"#;

        let raw = parse(PayloadFormat::Xml, document.as_bytes()).unwrap();
        assert_eq!(raw.callback_id.as_deref(), Some("cb-1"));
        let attachment = raw.attachment.unwrap();
        assert_eq!(attachment.callback_id, "cb-1");
        assert_eq!(attachment.actions.name, "approve");
        assert_eq!(attachment.actions.value, "yes");
        assert_eq!(attachment.actions.action_type, "button");
    }

    #[test]
    fn test_parse_mixed_xml() {
        let document = r#"<xml>
    <ChatId>c3</ChatId>
    <MsgId>m3</MsgId>
    <MsgType>mixed</MsgType>
    <MixedMessage>
        <MsgItem>
            <MsgType>text</MsgType>
            <Text><Content>look</Content></Text>
        </MsgItem>
        <MsgItem>
            <MsgType>image</MsgType>
            <Image><ImageUrl>https://example.com/a.png</ImageUrl></Image>
        </MsgItem>
    </MixedMessage>
</xml>"#;

        let raw = parse(PayloadFormat::Xml, document.as_bytes()).unwrap();
        let items = raw.mixed_message.unwrap().items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].text.as_ref().unwrap().content, "look");
        assert_eq!(items[1].image.as_ref().unwrap().image_url, "https://example.com/a.png");
    }

    #[test]
    fn test_parse_interaction_json() {
        let document = r#"{
            "WebhookUrl": "http://example.com/cgi-bin/webhook/send?key=k",
            "ChatId": "c4",
            "MsgId": "m4",
            "MsgType": "interaction",
            "From": {"UserId": "lisi", "Name": "Li Si", "Alias": "lisi"},
            "Interaction": {"InputText": "42"}
        }"#;

        let raw = parse(PayloadFormat::Json, document.as_bytes()).unwrap();
        assert_eq!(raw.msg_type, "interaction");
        assert_eq!(raw.from.user_id, "lisi");
        let interaction = raw.interaction.unwrap();
        assert_eq!(interaction.input_text.as_deref(), Some("42"));
        assert!(interaction.report_data.is_none());
    }

    #[test]
    fn test_parse_does_not_check_payload_agreement() {
        let raw = parse(
            PayloadFormat::Json,
            br#"{"MsgId": "m5", "MsgType": "attachment"}"#,
        )
        .unwrap();
        assert_eq!(raw.msg_type, "attachment");
        assert!(raw.attachment.is_none());
    }

    #[test]
    fn test_parse_malformed_document() {
        let err = parse(PayloadFormat::Json, b"{\"MsgType\": ").unwrap_err();
        assert!(matches!(err, CallbackError::Parse(_)));

        let err = parse(PayloadFormat::Xml, &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, CallbackError::Parse(_)));
    }
}
