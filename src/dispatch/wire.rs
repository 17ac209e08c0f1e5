//! JSON shapes of the chat endpoint and their normalization.
//!
//! The backend sends `response` either as a string or as an object with its
//! own `response` field.  That ambiguity ends here.

use serde::{Deserialize, Serialize};

use super::{ChatReply, DispatchError, ReplyImage};

const DEFAULT_IMAGE_MIME: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    /// Serialized as `null` before the first successful dispatch.
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ReplyField {
    Text(String),
    Nested { response: String },
}

/// Body of a chat response, success or failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponseBody {
    #[serde(default)]
    response: Option<ReplyField>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    image_base64: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ChatResponseBody {
    /// Canonical reply.  Fails when a success body carries no reply text.
    pub fn into_reply(self) -> Result<ChatReply, DispatchError> {
        let text = match self.response {
            Some(ReplyField::Text(text)) | Some(ReplyField::Nested { response: text }) => text,
            None => return Err(DispatchError::Malformed("missing `response`".into())),
        };

        let image = match (self.image_base64, self.image_url) {
            (Some(data), _) if !data.is_empty() => Some(ReplyImage::Inline {
                mime_type: self
                    .mime_type
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string()),
                data_base64: data,
            }),
            (_, Some(url)) if !url.is_empty() => Some(ReplyImage::Url(url)),
            _ => None,
        };

        Ok(ChatReply {
            text,
            session_id: self.session_id.filter(|id| !id.is_empty()),
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<ChatReply, DispatchError> {
        serde_json::from_str::<ChatResponseBody>(json)
            .expect("valid json")
            .into_reply()
    }

    #[test]
    fn request_serializes_null_session() {
        let req = ChatRequest {
            message: "hello".into(),
            session_id: None,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({"message": "hello", "session_id": null})
        );
    }

    #[test]
    fn string_response() {
        let reply = parse(r#"{"response":"Hi there","session_id":"abc"}"#).unwrap();
        assert_eq!(reply.text, "Hi there");
        assert_eq!(reply.session_id.as_deref(), Some("abc"));
        assert_eq!(reply.image, None);
    }

    #[test]
    fn nested_response() {
        let reply = parse(r#"{"response":{"response":"Nested"}}"#).unwrap();
        assert_eq!(reply.text, "Nested");
        assert_eq!(reply.session_id, None);
    }

    #[test]
    fn inline_image_defaults_to_png() {
        let reply = parse(r#"{"response":"look","image_base64":"iVBOR"}"#).unwrap();
        assert_eq!(
            reply.image,
            Some(ReplyImage::Inline {
                mime_type: "image/png".into(),
                data_base64: "iVBOR".into()
            })
        );
    }

    #[test]
    fn image_url() {
        let reply = parse(r#"{"response":"look","image_url":"https://img/x.jpg"}"#).unwrap();
        assert_eq!(reply.image, Some(ReplyImage::Url("https://img/x.jpg".into())));
    }

    #[test]
    fn missing_response_is_malformed() {
        assert!(matches!(
            parse(r#"{"session_id":"abc"}"#),
            Err(DispatchError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let reply = parse(r#"{"response":"ok","cached":true}"#).unwrap();
        assert_eq!(reply.text, "ok");
    }
}
