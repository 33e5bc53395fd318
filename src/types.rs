use serde::{Deserialize, Serialize};

/// Row shape for the recent/search/by-contact reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct MessageRecord {
    pub(crate) guid: String,
    pub(crate) text: Option<String>,
    pub(crate) is_from_me: bool,
    pub(crate) date: Option<String>,
    pub(crate) contact: Option<String>,
}

/// Row shape for the per-conversation reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ChatMessage {
    pub(crate) id: i64,
    pub(crate) text: Option<String>,
    /// Base64 of the `attributedBody` archive, when present.
    pub(crate) attributed_body: Option<String>,
    pub(crate) date: Option<String>,
    pub(crate) is_from_me: bool,
    pub(crate) sender_id: Option<String>,
    pub(crate) sender_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ConversationSummary {
    pub(crate) chat_id: String,
    pub(crate) display_name: String,
    pub(crate) last_message_date: Option<String>,
    pub(crate) message_count: i64,
    pub(crate) last_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct MessageStats {
    pub(crate) total_messages: i64,
    pub(crate) sent_messages: i64,
    pub(crate) received_messages: i64,
    pub(crate) total_contacts: i64,
    pub(crate) total_conversations: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct SenderCount {
    pub(crate) sender_id: Option<String>,
    pub(crate) messages: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct HandleRecord {
    pub(crate) id: i64,
    pub(crate) phone_or_email: String,
    pub(crate) service: Option<String>,
    pub(crate) uncanonicalized_id: Option<String>,
}

/// A recent message annotated with the Contacts name of its sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct NamedMessage {
    #[serde(flatten)]
    pub(crate) message: MessageRecord,
    pub(crate) contact_name: Option<String>,
}

// ── Contacts ─────────────────────────────────────────────────────────────

/// One phone number or email address, optionally labelled ("Mobile", "work").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ContactEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) label: Option<String>,
    pub(crate) value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub(crate) struct ContactRecord {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) phones: Vec<ContactEntry>,
    #[serde(default)]
    pub(crate) emails: Vec<ContactEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct Pagination {
    pub(crate) offset: usize,
    pub(crate) limit: usize,
    pub(crate) total: usize,
    pub(crate) returned: usize,
    pub(crate) has_more: bool,
}

impl Pagination {
    pub(crate) fn new(offset: usize, limit: usize, total: usize) -> Self {
        let returned = total.saturating_sub(offset).min(limit);
        Self {
            offset,
            limit,
            total,
            returned,
            has_more: offset.saturating_add(limit) < total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ContactPage {
    pub(crate) contacts: Vec<ContactRecord>,
    pub(crate) pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct PhoneLookup {
    pub(crate) phone: String,
    pub(crate) normalized: String,
    pub(crate) found: bool,
    pub(crate) name: Option<String>,
}

// ── Tool plumbing ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct ToolExecution {
    pub(crate) output: String,
    pub(crate) details: serde_json::Value,
    pub(crate) is_error: bool,
}

impl ToolExecution {
    pub(crate) fn ok(details: serde_json::Value) -> Self {
        Self {
            output: serde_json::to_string_pretty(&details).unwrap_or_default(),
            details,
            is_error: false,
        }
    }

    pub(crate) fn error_payload(details: serde_json::Value) -> Self {
        Self {
            output: serde_json::to_string_pretty(&details).unwrap_or_default(),
            details,
            is_error: true,
        }
    }
}
