//! Handler results and the transport-neutral payloads they turn into.

/// What a handler wants said back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Say nothing.
    None,
    Text(String),
    /// Comment plus a body that is sent as a file (logs, object dumps).
    Attachment { comment: String, content: String },
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::Text(text)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::Text(text.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPayload {
    pub text: String,
    pub attachment: Option<String>,
}

pub fn format(reply: Reply) -> Option<OutgoingPayload> {
    match reply {
        Reply::None => None,
        Reply::Text(text) => Some(OutgoingPayload {
            text,
            attachment: None,
        }),
        Reply::Attachment { comment, content } => Some(OutgoingPayload {
            text: comment,
            attachment: Some(content),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert_eq!(format(Reply::None), None);
        assert_eq!(
            format("hello".into()),
            Some(OutgoingPayload {
                text: "hello".to_string(),
                attachment: None
            })
        );
        assert_eq!(
            format(Reply::Attachment {
                comment: "logs".to_string(),
                content: "line 1\nline 2".to_string()
            }),
            Some(OutgoingPayload {
                text: "logs".to_string(),
                attachment: Some("line 1\nline 2".to_string())
            })
        );
    }
}
