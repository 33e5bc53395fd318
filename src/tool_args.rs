use serde::{Deserialize, Deserializer};

use crate::{DateArg, SortOrder};

/// Ids arrive as JSON numbers from most clients and as strings from some.
fn flexible_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdValue {
        Number(i64),
        Text(String),
    }

    match IdValue::deserialize(deserializer)? {
        IdValue::Number(n) => Ok(n),
        IdValue::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("expected an integer id, got '{s}'"))),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ToolLimitArgs {
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolSearchMessagesArgs {
    pub(crate) search_term: String,
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolContactMessagesArgs {
    pub(crate) contact: String,
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolMessageIdArgs {
    #[serde(deserialize_with = "flexible_i64")]
    pub(crate) message_id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolChatIdArgs {
    #[serde(deserialize_with = "flexible_i64")]
    pub(crate) chat_id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolChatMessagesArgs {
    #[serde(deserialize_with = "flexible_i64")]
    pub(crate) chat_id: i64,
    #[serde(default)]
    pub(crate) limit: Option<usize>,
    #[serde(default)]
    pub(crate) offset: Option<usize>,
    #[serde(default)]
    pub(crate) order: Option<SortOrder>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolChatCursorArgs {
    #[serde(deserialize_with = "flexible_i64")]
    pub(crate) chat_id: i64,
    #[serde(deserialize_with = "flexible_i64")]
    pub(crate) message_id: i64,
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolChatDateArgs {
    #[serde(deserialize_with = "flexible_i64")]
    pub(crate) chat_id: i64,
    pub(crate) date: DateArg,
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolSinceArgs {
    pub(crate) date: DateArg,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolChatNamesArgs {
    #[serde(default)]
    pub(crate) limit: Option<usize>,
    #[serde(default)]
    pub(crate) offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolChatIdentifierArgs {
    pub(crate) chat_identifier: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolHandleIdArgs {
    #[serde(deserialize_with = "flexible_i64")]
    pub(crate) handle_id: i64,
}

// ── Contacts ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct ToolContactsPageArgs {
    #[serde(default)]
    pub(crate) limit: Option<usize>,
    #[serde(default)]
    pub(crate) offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolFindContactArgs {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolPhoneArgs {
    #[serde(default, alias = "phone_number")]
    pub(crate) phone: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolSendMessageArgs {
    #[serde(default, alias = "phone", alias = "to")]
    pub(crate) recipient: String,
    #[serde(default, alias = "text")]
    pub(crate) message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_accept_numbers_and_numeric_strings() {
        let a: ToolChatIdArgs = serde_json::from_value(json!({ "chat_id": 7 })).unwrap();
        let b: ToolChatIdArgs = serde_json::from_value(json!({ "chat_id": " 7 " })).unwrap();
        assert_eq!(a.chat_id, 7);
        assert_eq!(b.chat_id, 7);
        let err = serde_json::from_value::<ToolChatIdArgs>(json!({ "chat_id": "seven" }))
            .unwrap_err();
        assert!(err.to_string().contains("seven"));
    }

    #[test]
    fn chat_messages_defaults() {
        let args: ToolChatMessagesArgs =
            serde_json::from_value(json!({ "chat_id": 3, "order": "asc" })).unwrap();
        assert_eq!(args.limit, None);
        assert_eq!(args.offset, None);
        assert_eq!(args.order, Some(SortOrder::Asc));
        assert!(
            serde_json::from_value::<ToolChatMessagesArgs>(json!({ "chat_id": 3, "order": "up" }))
                .is_err()
        );
    }

    #[test]
    fn send_message_aliases_and_defaults() {
        let args: ToolSendMessageArgs =
            serde_json::from_value(json!({ "phone": "+14698264814", "message": "hi" })).unwrap();
        assert_eq!(args.recipient, "+14698264814");
        let empty: ToolSendMessageArgs = serde_json::from_value(json!({})).unwrap();
        assert!(empty.recipient.is_empty());
        assert!(empty.message.is_empty());
    }

    #[test]
    fn date_args_keep_raw_integers() {
        let args: ToolChatDateArgs =
            serde_json::from_value(json!({ "chat_id": 1, "date": 725000000000000000i64 }))
                .unwrap();
        assert_eq!(args.date, DateArg::Raw(725_000_000_000_000_000));
    }
}
