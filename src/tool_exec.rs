use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::{
    ContactBridge, MessageStore, NamedMessage, OsaScript, ScriptError, ServerConfig, SortOrder,
    StoreError, ToolChatCursorArgs, ToolChatDateArgs, ToolChatIdArgs, ToolChatIdentifierArgs,
    ToolChatMessagesArgs, ToolChatNamesArgs, ToolContactMessagesArgs, ToolContactsPageArgs,
    ToolExecution, ToolFindContactArgs, ToolHandleIdArgs, ToolLimitArgs, ToolMessageIdArgs,
    ToolPhoneArgs, ToolSearchMessagesArgs, ToolSendMessageArgs, ToolSinceArgs, validate_outgoing,
};

/// What a tool call may touch: the message store and, when enabled, Contacts.
pub(crate) struct ToolContext {
    pub(crate) store: MessageStore,
    pub(crate) contacts: Option<ContactBridge>,
}

impl ToolContext {
    pub(crate) fn new(store: MessageStore, contacts: Option<ContactBridge>) -> Self {
        Self { store, contacts }
    }

    pub(crate) fn from_config(config: &ServerConfig) -> Self {
        let contacts = config.contacts_enabled.then(|| {
            ContactBridge::new(Box::new(OsaScript::from_env()), config.contacts.clone())
        });
        Self::new(MessageStore::new(&config.db_path), contacts)
    }

    pub(crate) fn contacts_enabled(&self) -> bool {
        self.contacts.is_some()
    }

    fn contacts(&self) -> Result<&ContactBridge, String> {
        self.contacts.as_ref().ok_or_else(contacts_disabled)
    }

    fn contacts_mut(&mut self) -> Result<&mut ContactBridge, String> {
        self.contacts.as_mut().ok_or_else(contacts_disabled)
    }
}

fn contacts_disabled() -> String {
    "contacts tools are disabled (enable with --contacts or IMESSAGE_MCP_CONTACTS=1)".to_string()
}

fn parse_args<T: DeserializeOwned>(args: serde_json::Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("args: {e}"))
}

fn store_result<T: Serialize>(result: Result<T, StoreError>) -> Result<ToolExecution, String> {
    let value = result.map_err(|e| e.to_string())?;
    let details = serde_json::to_value(value).map_err(|e| format!("encode: {e}"))?;
    Ok(ToolExecution::ok(details))
}

/// Contacts failures are reported in-band so the caller sees the reason and
/// any remediation steps.
fn script_failure(err: ScriptError) -> ToolExecution {
    let mut details = json!({ "error": err.to_string() });
    match &err {
        ScriptError::PermissionDenied { remediation, .. } => {
            details["remediation"] = json!(remediation);
        }
        ScriptError::Failed { code: Some(code), .. } => {
            details["exit_code"] = json!(code);
        }
        _ => {}
    }
    ToolExecution::error_payload(details)
}

fn contacts_result<T: Serialize>(
    result: Result<T, ScriptError>,
) -> Result<ToolExecution, String> {
    match result {
        Ok(value) => {
            let details = serde_json::to_value(value).map_err(|e| format!("encode: {e}"))?;
            Ok(ToolExecution::ok(details))
        }
        Err(err) => Ok(script_failure(err)),
    }
}

pub(crate) fn execute_tool(
    name: &str,
    args: serde_json::Value,
    ctx: &mut ToolContext,
) -> Result<ToolExecution, String> {
    let args = if args.is_null() { json!({}) } else { args };
    debug!(tool = name, "tool call");
    let store = &ctx.store;

    match name {
        "get_recent_messages" => {
            let parsed: ToolLimitArgs = parse_args(args)?;
            store_result(store.recent_messages(parsed.limit.unwrap_or(20)))
        }
        "search_messages" => {
            let parsed: ToolSearchMessagesArgs = parse_args(args)?;
            store_result(store.search_messages(&parsed.search_term, parsed.limit.unwrap_or(50)))
        }
        "get_messages_from_contact" => {
            let parsed: ToolContactMessagesArgs = parse_args(args)?;
            store_result(store.messages_from_contact(&parsed.contact, parsed.limit.unwrap_or(50)))
        }
        "get_conversation_list" => {
            let parsed: ToolLimitArgs = parse_args(args)?;
            store_result(store.conversation_list(parsed.limit.unwrap_or(20)))
        }
        "get_message_stats" => store_result(store.message_stats()),
        "get_message" => {
            let parsed: ToolMessageIdArgs = parse_args(args)?;
            store_result(store.message(parsed.message_id))
        }
        "get_message_count" => {
            let parsed: ToolChatIdArgs = parse_args(args)?;
            store_result(store.message_count(parsed.chat_id))
        }
        "get_messages" => {
            let parsed: ToolChatMessagesArgs = parse_args(args)?;
            store_result(store.messages(
                parsed.chat_id,
                parsed.limit.unwrap_or(50),
                parsed.offset.unwrap_or(0),
                parsed.order.unwrap_or(SortOrder::Desc),
            ))
        }
        "get_messages_before" => {
            let parsed: ToolChatCursorArgs = parse_args(args)?;
            store_result(store.messages_before_id(
                parsed.chat_id,
                parsed.message_id,
                parsed.limit.unwrap_or(50),
            ))
        }
        "get_messages_after_id" => {
            let parsed: ToolChatCursorArgs = parse_args(args)?;
            store_result(store.messages_after_id(
                parsed.chat_id,
                parsed.message_id,
                parsed.limit.unwrap_or(50),
            ))
        }
        "get_messages_before_date" => {
            let parsed: ToolChatDateArgs = parse_args(args)?;
            store_result(store.messages_before_date(
                parsed.chat_id,
                &parsed.date,
                parsed.limit.unwrap_or(50),
            ))
        }
        "get_messages_after_date" => {
            let parsed: ToolChatDateArgs = parse_args(args)?;
            store_result(store.messages_after_date(
                parsed.chat_id,
                &parsed.date,
                parsed.limit.unwrap_or(50),
            ))
        }
        "get_messages_same_date" => {
            let parsed: ToolChatDateArgs = parse_args(args)?;
            store_result(store.messages_same_date(parsed.chat_id, &parsed.date))
        }
        "get_unique_senders_since" => {
            let parsed: ToolSinceArgs = parse_args(args)?;
            store_result(store.unique_senders_since(&parsed.date))
        }
        "get_distinct_senders_since" => {
            let parsed: ToolSinceArgs = parse_args(args)?;
            store_result(store.distinct_senders_since(&parsed.date))
        }
        "get_chat_id_from_message" => {
            let parsed: ToolMessageIdArgs = parse_args(args)?;
            store_result(store.chat_id_from_message(parsed.message_id))
        }
        "get_last_message_id_from_chat" => {
            let parsed: ToolChatIdArgs = parse_args(args)?;
            store_result(store.last_message_id_from_chat(parsed.chat_id))
        }
        "get_last_message_date_from_chat" => {
            let parsed: ToolChatIdArgs = parse_args(args)?;
            store_result(store.last_message_date_from_chat(parsed.chat_id))
        }
        "get_chat_names" => {
            let parsed: ToolChatNamesArgs = parse_args(args)?;
            store_result(store.chat_names(parsed.limit.unwrap_or(50), parsed.offset.unwrap_or(0)))
        }
        "get_total_chat_count" => store_result(store.total_chat_count()),
        "get_chat_participant_handles" => {
            let parsed: ToolChatIdArgs = parse_args(args)?;
            store_result(store.chat_participant_handles(parsed.chat_id))
        }
        "get_chat_by_id" => {
            let parsed: ToolChatIdArgs = parse_args(args)?;
            store_result(store.chat_by_id(parsed.chat_id))
        }
        "get_chat_by_identifier" => {
            let parsed: ToolChatIdentifierArgs = parse_args(args)?;
            store_result(store.chat_by_identifier(&parsed.chat_identifier))
        }
        "get_handles" => {
            let parsed: ToolLimitArgs = parse_args(args)?;
            store_result(store.handles(parsed.limit.unwrap_or(100)))
        }
        "get_handle_details" => {
            let parsed: ToolHandleIdArgs = parse_args(args)?;
            store_result(store.handle_details(parsed.handle_id))
        }

        // ── Contacts ─────────────────────────────────────────────────────
        "get_contacts_count" => {
            let bridge = ctx.contacts()?;
            contacts_result(
                bridge
                    .count()
                    .map(|total| json!({ "total_contacts": total })),
            )
        }
        "check_contacts_permission" => {
            let bridge = ctx.contacts()?;
            let status = bridge.check_permission();
            let details = serde_json::to_value(status).map_err(|e| format!("encode: {e}"))?;
            Ok(ToolExecution::ok(details))
        }
        "get_all_contacts" => {
            let parsed: ToolContactsPageArgs = parse_args(args)?;
            let bridge = ctx.contacts()?;
            contacts_result(bridge.page(parsed.offset.unwrap_or(0), parsed.limit.unwrap_or(50)))
        }
        "find_contact_by_name" => {
            let parsed: ToolFindContactArgs = parse_args(args)?;
            let bridge = ctx.contacts()?;
            let query = parsed.name.trim().to_string();
            if query.is_empty() {
                return Ok(ToolExecution::error_payload(
                    json!({ "error": "Contact name is required" }),
                ));
            }
            match bridge.search_by_name(&query, parsed.limit.unwrap_or(10)) {
                Ok(matches) if matches.is_empty() => Ok(ToolExecution::ok(json!({
                    "query": query,
                    "matches": [],
                    "message": format!("No contacts found matching '{query}'"),
                }))),
                Ok(matches) => Ok(ToolExecution::ok(json!({
                    "query": query,
                    "count": matches.len(),
                    "matches": matches,
                }))),
                Err(err) => Ok(script_failure(err)),
            }
        }
        "find_contact_by_phone" => {
            let parsed: ToolPhoneArgs = parse_args(args)?;
            let bridge = ctx.contacts_mut()?;
            let lookup = bridge.find_by_phone(&parsed.phone);
            let details = serde_json::to_value(lookup).map_err(|e| format!("encode: {e}"))?;
            Ok(ToolExecution::ok(details))
        }
        "match_phone_to_contact" => {
            let parsed: ToolPhoneArgs = parse_args(args)?;
            let bridge = ctx.contacts_mut()?;
            Ok(ToolExecution::ok(json!(bridge.match_phone(&parsed.phone))))
        }
        "get_messages_with_contact_names" => {
            let parsed: ToolLimitArgs = parse_args(args)?;
            let bridge = ctx.contacts.as_mut().ok_or_else(contacts_disabled)?;
            let messages = store
                .recent_messages(parsed.limit.unwrap_or(20))
                .map_err(|e| e.to_string())?;
            let named: Vec<NamedMessage> = messages
                .into_iter()
                .map(|message| NamedMessage {
                    contact_name: message
                        .contact
                        .as_deref()
                        .and_then(|handle| bridge.match_phone(handle)),
                    message,
                })
                .collect();
            let details = serde_json::to_value(named).map_err(|e| format!("encode: {e}"))?;
            Ok(ToolExecution::ok(details))
        }
        "send_message" => {
            let parsed: ToolSendMessageArgs = parse_args(args)?;
            let bridge = ctx.contacts()?;
            if let Err(reason) = validate_outgoing(&parsed.recipient, &parsed.message) {
                return Ok(ToolExecution::error_payload(
                    json!({ "success": false, "error": reason }),
                ));
            }
            match bridge.send_message(&parsed.recipient, &parsed.message) {
                Ok(()) => Ok(ToolExecution::ok(json!({
                    "success": true,
                    "message": format!("Message sent to {}", parsed.recipient.trim()),
                }))),
                Err(err) => Ok(ToolExecution::error_payload(
                    json!({ "success": false, "error": err.to_string() }),
                )),
            }
        }
        _ => Err(format!("unknown tool: {name}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::testing::MockRunner;
    use crate::message_db::fixtures::{FixtureDb, sample_db};
    use crate::{CONTACTS_REMEDIATION, ContactsConfig};

    fn store_only(db: &FixtureDb) -> ToolContext {
        ToolContext::new(db.store(), None)
    }

    fn with_contacts(db: &FixtureDb, runner: MockRunner) -> ToolContext {
        let bridge = ContactBridge::new(Box::new(runner), ContactsConfig::default());
        ToolContext::new(db.store(), Some(bridge))
    }

    #[test]
    fn get_messages_pages_newest_first() {
        let db = sample_db();
        let mut ctx = store_only(&db);
        let first = execute_tool(
            "get_messages",
            json!({ "chat_id": 1, "limit": 2, "offset": 0, "order": "DESC" }),
            &mut ctx,
        )
        .unwrap();
        let ids: Vec<i64> = first
            .details
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 2]);
        assert!(!first.is_error);

        let rest = execute_tool(
            "get_messages",
            json!({ "chat_id": "1", "limit": 2, "offset": 2 }),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(rest.details[0]["id"], 1);
        assert_eq!(rest.details.as_array().unwrap().len(), 1);
    }

    #[test]
    fn null_arguments_use_defaults() {
        let db = sample_db();
        let mut ctx = store_only(&db);
        let out = execute_tool("get_recent_messages", serde_json::Value::Null, &mut ctx).unwrap();
        assert_eq!(out.details.as_array().unwrap().len(), 5);
        let stats = execute_tool("get_message_stats", json!({}), &mut ctx).unwrap();
        assert_eq!(stats.details["total_conversations"], 2);
    }

    #[test]
    fn optional_results_serialize_as_null() {
        let db = sample_db();
        let mut ctx = store_only(&db);
        let out = execute_tool("get_message", json!({ "message_id": 404 }), &mut ctx).unwrap();
        assert!(out.details.is_null());
        let out = execute_tool(
            "get_chat_by_identifier",
            json!({ "chat_identifier": "chat123456" }),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(out.details["display_name"], "Family");
    }

    #[test]
    fn argument_and_store_errors_are_errors() {
        let db = sample_db();
        let mut ctx = store_only(&db);
        let err = execute_tool("search_messages", json!({}), &mut ctx).unwrap_err();
        assert!(err.starts_with("args:"));
        let err = execute_tool(
            "get_messages_after_date",
            json!({ "chat_id": 1, "date": "yesterday-ish" }),
            &mut ctx,
        )
        .unwrap_err();
        assert!(err.contains("invalid date"));
        assert_eq!(
            execute_tool("no_such_tool", json!({}), &mut ctx).unwrap_err(),
            "unknown tool: no_such_tool"
        );

        let mut missing =
            ToolContext::new(MessageStore::new(db.path.with_file_name("nope.db")), None);
        let err = execute_tool("get_total_chat_count", json!({}), &mut missing).unwrap_err();
        assert!(err.contains("iMessages database not found"));
    }

    #[test]
    fn contact_tools_need_the_capability() {
        let db = sample_db();
        let mut ctx = store_only(&db);
        assert!(!ctx.contacts_enabled());
        let err = execute_tool("get_contacts_count", json!({}), &mut ctx).unwrap_err();
        assert!(err.contains("disabled"));
    }

    #[test]
    fn named_messages_check_the_capability_before_the_store() {
        let db = sample_db();
        let mut missing =
            ToolContext::new(MessageStore::new(db.path.with_file_name("nope.db")), None);
        let err = execute_tool("get_messages_with_contact_names", json!({}), &mut missing)
            .unwrap_err();
        assert!(err.contains("disabled"), "{err}");
    }

    #[test]
    fn contacts_count_and_permission_denied_payload() {
        let db = sample_db();
        let mut ctx = with_contacts(
            &db,
            MockRunner::new().reply("12").fail(ScriptError::PermissionDenied {
                code: -1743,
                remediation: &CONTACTS_REMEDIATION,
            }),
        );
        let out = execute_tool("get_contacts_count", json!({}), &mut ctx).unwrap();
        assert_eq!(out.details, json!({ "total_contacts": 12 }));

        let out = execute_tool("get_contacts_count", json!({}), &mut ctx).unwrap();
        assert!(out.is_error);
        assert!(out.details["error"].as_str().unwrap().contains("-1743"));
        assert_eq!(out.details["remediation"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn all_contacts_pagination_payload() {
        let db = sample_db();
        let mut ctx = with_contacts(
            &db,
            MockRunner::new().reply("DATA|1|3\nAnn|_$!<Mobile>!$_: 555-0100|\n"),
        );
        let out =
            execute_tool("get_all_contacts", json!({ "limit": 1, "offset": 2 }), &mut ctx).unwrap();
        assert_eq!(out.details["contacts"][0]["phones"][0]["label"], "Mobile");
        assert_eq!(
            out.details["pagination"],
            json!({ "offset": 2, "limit": 1, "total": 3, "returned": 1, "has_more": false })
        );
    }

    #[test]
    fn name_search_without_match_is_not_an_error() {
        let db = sample_db();
        let mut ctx = with_contacts(&db, MockRunner::new().reply("EMPTY|0|0").reply("EMPTY|0|0"));
        let out =
            execute_tool("find_contact_by_name", json!({ "name": "Zed" }), &mut ctx).unwrap();
        assert!(!out.is_error);
        assert_eq!(out.details["matches"], json!([]));
        assert!(out.details["message"].as_str().unwrap().contains("Zed"));

        let out = execute_tool("find_contact_by_name", json!({ "name": " " }), &mut ctx).unwrap();
        assert!(out.is_error);
    }

    #[test]
    fn phone_tools_share_the_cache() {
        let db = sample_db();
        let runner = MockRunner::new().reply("DATA|1|1\nDamelo|m: (469) 826-4814|\n");
        let calls = runner.calls();
        let mut ctx = with_contacts(&db, runner);
        let out = execute_tool(
            "find_contact_by_phone",
            json!({ "phone": "4698264814" }),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(
            out.details,
            json!({
                "phone": "4698264814",
                "normalized": "14698264814",
                "found": true,
                "name": "Damelo"
            })
        );
        let out = execute_tool(
            "match_phone_to_contact",
            json!({ "phone": "+1 469 826 4814" }),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(out.details, json!("Damelo"));
        let out =
            execute_tool("match_phone_to_contact", json!({ "phone": "555" }), &mut ctx).unwrap();
        assert!(out.details.is_null());

        let named =
            execute_tool("get_messages_with_contact_names", json!({ "limit": 5 }), &mut ctx)
                .unwrap();
        let rows = named.details.as_array().unwrap();
        let third = rows.iter().find(|r| r["text"] == "third").unwrap();
        assert_eq!(third["contact_name"], "Damelo");
        let family = rows.iter().find(|r| r["text"] == "family hello").unwrap();
        assert!(family["contact_name"].is_null());
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn send_message_validation_and_delivery() {
        let db = sample_db();
        let runner = MockRunner::new().reply("").fail(ScriptError::Timeout { secs: 30 });
        let calls = runner.calls();
        let mut ctx = with_contacts(&db, runner);

        let out = execute_tool(
            "send_message",
            json!({ "recipient": "", "message": "hi" }),
            &mut ctx,
        )
        .unwrap();
        assert!(out.is_error);
        assert_eq!(out.details["success"], false);
        let out = execute_tool(
            "send_message",
            json!({ "phone": "+14698264814", "message": "" }),
            &mut ctx,
        )
        .unwrap();
        assert!(out.details["error"].as_str().unwrap().contains("Message"));
        assert!(calls.borrow().is_empty());

        let out = execute_tool(
            "send_message",
            json!({ "recipient": "+14698264814", "message": "hello" }),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(out.details["success"], true);
        assert_eq!(out.details["message"], "Message sent to +14698264814");

        let out = execute_tool(
            "send_message",
            json!({ "recipient": "+14698264814", "message": "again" }),
            &mut ctx,
        )
        .unwrap();
        assert!(out.is_error);
        assert!(out.details["error"].as_str().unwrap().contains("timed out"));
    }
}
