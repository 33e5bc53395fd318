use serde_json::json;

fn chat_date_schema(description: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "chat_id": { "type": "integer", "description": "chat ROWID" },
            "date": {
                "type": ["string", "integer"],
                "description": description
            },
            "limit": { "type": "integer", "default": 50 }
        },
        "required": ["chat_id", "date"]
    })
}

fn since_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "date": {
                "type": ["string", "integer"],
                "description": "ISO-8601 timestamp or raw Apple-epoch nanoseconds"
            }
        },
        "required": ["date"]
    })
}

fn empty_schema() -> serde_json::Value {
    json!({ "type": "object", "properties": {} })
}

fn chat_id_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": { "chat_id": { "type": "integer" } },
        "required": ["chat_id"]
    })
}

fn message_id_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": { "message_id": { "type": "integer" } },
        "required": ["message_id"]
    })
}

pub(crate) fn store_tool_definitions() -> Vec<serde_json::Value> {
    vec![
        json!({
            "name": "get_recent_messages",
            "description": "Most recent messages that have text, newest first.",
            "inputSchema": {
                "type": "object",
                "properties": { "limit": { "type": "integer", "default": 20 } }
            }
        }),
        json!({
            "name": "search_messages",
            "description": "Messages whose text contains the search term.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "search_term": { "type": "string" },
                    "limit": { "type": "integer", "default": 50 }
                },
                "required": ["search_term"]
            }
        }),
        json!({
            "name": "get_messages_from_contact",
            "description": "Messages exchanged with handles matching a phone number or email fragment.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "contact": { "type": "string" },
                    "limit": { "type": "integer", "default": 50 }
                },
                "required": ["contact"]
            }
        }),
        json!({
            "name": "get_conversation_list",
            "description": "Conversations ordered by their latest message, with message counts.",
            "inputSchema": {
                "type": "object",
                "properties": { "limit": { "type": "integer", "default": 20 } }
            }
        }),
        json!({
            "name": "get_message_stats",
            "description": "Totals for messages sent, received, contacts and conversations.",
            "inputSchema": empty_schema()
        }),
        json!({
            "name": "get_message",
            "description": "A single message by ROWID.",
            "inputSchema": message_id_schema()
        }),
        json!({
            "name": "get_message_count",
            "description": "Number of messages in a chat.",
            "inputSchema": chat_id_schema()
        }),
        json!({
            "name": "get_messages",
            "description": "Page through a chat's messages.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "chat_id": { "type": "integer" },
                    "limit": { "type": "integer", "default": 50 },
                    "offset": { "type": "integer", "default": 0 },
                    "order": { "type": "string", "enum": ["ASC", "DESC"], "default": "DESC" }
                },
                "required": ["chat_id"]
            }
        }),
        json!({
            "name": "get_messages_before",
            "description": "Messages in a chat with ROWID below message_id, oldest first.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "chat_id": { "type": "integer" },
                    "message_id": { "type": "integer" },
                    "limit": { "type": "integer", "default": 50 }
                },
                "required": ["chat_id", "message_id"]
            }
        }),
        json!({
            "name": "get_messages_after_id",
            "description": "Messages in a chat with ROWID above message_id, oldest first.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "chat_id": { "type": "integer" },
                    "message_id": { "type": "integer" },
                    "limit": { "type": "integer", "default": 50 }
                },
                "required": ["chat_id", "message_id"]
            }
        }),
        json!({
            "name": "get_messages_before_date",
            "description": "Messages in a chat sent before a date, newest first.",
            "inputSchema": chat_date_schema("upper bound (exclusive)")
        }),
        json!({
            "name": "get_messages_after_date",
            "description": "Messages in a chat sent after a date, oldest first.",
            "inputSchema": chat_date_schema("lower bound (exclusive)")
        }),
        json!({
            "name": "get_messages_same_date",
            "description": "Messages in a chat stamped with exactly this timestamp.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "chat_id": { "type": "integer" },
                    "date": { "type": ["string", "integer"] }
                },
                "required": ["chat_id", "date"]
            }
        }),
        json!({
            "name": "get_unique_senders_since",
            "description": "Count of distinct handles that sent messages since a date.",
            "inputSchema": since_schema()
        }),
        json!({
            "name": "get_distinct_senders_since",
            "description": "Handles that sent messages since a date, with per-handle counts.",
            "inputSchema": since_schema()
        }),
        json!({
            "name": "get_chat_id_from_message",
            "description": "The chat a message belongs to.",
            "inputSchema": message_id_schema()
        }),
        json!({
            "name": "get_last_message_id_from_chat",
            "description": "ROWID of the newest message in a chat.",
            "inputSchema": chat_id_schema()
        }),
        json!({
            "name": "get_last_message_date_from_chat",
            "description": "Timestamp of the newest message in a chat.",
            "inputSchema": chat_id_schema()
        }),
        json!({
            "name": "get_chat_names",
            "description": "Raw chat rows, newest chat first.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "default": 50 },
                    "offset": { "type": "integer", "default": 0 }
                }
            }
        }),
        json!({
            "name": "get_total_chat_count",
            "description": "Number of chats.",
            "inputSchema": empty_schema()
        }),
        json!({
            "name": "get_chat_participant_handles",
            "description": "Phone numbers and emails participating in a chat.",
            "inputSchema": chat_id_schema()
        }),
        json!({
            "name": "get_chat_by_id",
            "description": "A chat row by ROWID.",
            "inputSchema": chat_id_schema()
        }),
        json!({
            "name": "get_chat_by_identifier",
            "description": "A chat row by chat_identifier (phone, email or group id).",
            "inputSchema": {
                "type": "object",
                "properties": { "chat_identifier": { "type": "string" } },
                "required": ["chat_identifier"]
            }
        }),
        json!({
            "name": "get_handles",
            "description": "Known handles (phone numbers and emails).",
            "inputSchema": {
                "type": "object",
                "properties": { "limit": { "type": "integer", "default": 100 } }
            }
        }),
        json!({
            "name": "get_handle_details",
            "description": "A handle by ROWID.",
            "inputSchema": {
                "type": "object",
                "properties": { "handle_id": { "type": "integer" } },
                "required": ["handle_id"]
            }
        }),
    ]
}

pub(crate) fn contact_tool_definitions() -> Vec<serde_json::Value> {
    vec![
        json!({
            "name": "get_contacts_count",
            "description": "Number of people in the macOS Contacts app.",
            "inputSchema": empty_schema()
        }),
        json!({
            "name": "check_contacts_permission",
            "description": "Check whether this process may automate the Contacts app.",
            "inputSchema": empty_schema()
        }),
        json!({
            "name": "get_all_contacts",
            "description": "Page through Contacts with phone numbers and emails.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "default": 50 },
                    "offset": { "type": "integer", "default": 0 }
                }
            }
        }),
        json!({
            "name": "find_contact_by_name",
            "description": "Contacts whose name contains the query.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "limit": { "type": "integer", "default": 10 }
                },
                "required": ["name"]
            }
        }),
        json!({
            "name": "find_contact_by_phone",
            "description": "Resolve a phone number to a contact name.",
            "inputSchema": {
                "type": "object",
                "properties": { "phone": { "type": "string" } },
                "required": ["phone"]
            }
        }),
        json!({
            "name": "match_phone_to_contact",
            "description": "Contact name for a phone number, or null.",
            "inputSchema": {
                "type": "object",
                "properties": { "phone": { "type": "string" } },
                "required": ["phone"]
            }
        }),
        json!({
            "name": "get_messages_with_contact_names",
            "description": "Recent messages annotated with the sender's contact name.",
            "inputSchema": {
                "type": "object",
                "properties": { "limit": { "type": "integer", "default": 20 } }
            }
        }),
        json!({
            "name": "send_message",
            "description": "Send an iMessage through Messages.app.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "recipient": { "type": "string", "description": "phone number or email" },
                    "message": { "type": "string" }
                },
                "required": ["recipient", "message"]
            }
        }),
    ]
}

pub(crate) fn tool_definitions_json(contacts_enabled: bool) -> Vec<serde_json::Value> {
    let mut tools = store_tool_definitions();
    if contacts_enabled {
        tools.extend(contact_tool_definitions());
    }
    tools
}
