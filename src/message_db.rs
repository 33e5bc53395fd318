//! Read-only access to the local iMessage database (`chat.db`).
//!
//! Every call opens its own `SQLITE_OPEN_READ_ONLY` handle and drops it
//! before returning. Caller-supplied values are always bound as parameters;
//! the sort direction is the only interpolated token and comes from the
//! closed [`SortOrder`] enum.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use serde::Deserialize;
use tracing::debug;

use crate::{
    ChatMessage, ConversationSummary, HandleRecord, MessageRecord, MessageStats, SenderCount,
    StoreError,
};

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z.
pub(crate) const APPLE_EPOCH_OFFSET: i64 = 978_307_200;
const NANOS_PER_SEC: i64 = 1_000_000_000;
/// Databases written before macOS 10.13 store seconds instead of nanoseconds.
const LEGACY_SECONDS_THRESHOLD: i64 = 1_000_000_000_000;

// ── Timestamps ───────────────────────────────────────────────────────────

fn split_apple_timestamp(raw: i64) -> Option<DateTime<Utc>> {
    let (secs, nanos) = if raw.unsigned_abs() < LEGACY_SECONDS_THRESHOLD as u64 {
        (raw, 0)
    } else {
        (raw.div_euclid(NANOS_PER_SEC), raw.rem_euclid(NANOS_PER_SEC))
    };
    let unix = secs.checked_add(APPLE_EPOCH_OFFSET)?;
    DateTime::from_timestamp(unix, nanos as u32)
}

/// `YYYY-MM-DD HH:MM:SS` in local time.
pub(crate) fn apple_to_local_string(raw: i64) -> Option<String> {
    split_apple_timestamp(raw).map(|utc| {
        utc.with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    })
}

/// `YYYY-MM-DDTHH:MM:SS` in local time.
pub(crate) fn apple_to_local_iso(raw: i64) -> Option<String> {
    split_apple_timestamp(raw).map(|utc| {
        utc.with_timezone(&Local)
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    })
}

/// `None` when the instant falls outside the nanosecond range of an `i64`
/// (roughly years 1709 to 2293).
pub(crate) fn unix_to_apple_ns(unix_secs: i64, subsec_nanos: u32) -> Option<i64> {
    unix_secs
        .checked_sub(APPLE_EPOCH_OFFSET)?
        .checked_mul(NANOS_PER_SEC)?
        .checked_add(i64::from(subsec_nanos))
}

/// Parse an ISO-8601 timestamp. Offsets (including `Z`) are honoured; naive
/// values are read as local time.
pub(crate) fn parse_iso_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    let naive = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
    .or_else(|| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A timestamp filter: an ISO-8601 string or a raw Apple-epoch value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum DateArg {
    Raw(i64),
    Text(String),
}

impl DateArg {
    pub(crate) fn to_apple_ns(&self) -> Result<i64, StoreError> {
        match self {
            Self::Raw(value) => Ok(*value),
            Self::Text(text) if !text.contains('-') => text
                .trim()
                .parse::<i64>()
                .map_err(|_| StoreError::InvalidDate(text.clone())),
            Self::Text(text) => parse_iso_timestamp(text)
                .and_then(|dt| unix_to_apple_ns(dt.timestamp(), dt.timestamp_subsec_nanos()))
                .ok_or_else(|| StoreError::InvalidDate(text.clone())),
        }
    }
}

// ── Sort order ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub(crate) enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            _ => Err(StoreError::InvalidOrder(s.to_string())),
        }
    }
}

impl TryFrom<String> for SortOrder {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────

const MESSAGE_RECORD_SELECT: &str = "
SELECT m.guid, m.text, m.is_from_me, m.date, h.id
FROM message m
LEFT JOIN handle h ON m.handle_id = h.ROWID";

const CHAT_MESSAGE_SELECT: &str = "
SELECT message.ROWID, message.text, message.attributedBody, message.date,
       message.is_from_me, handle.id
FROM message
JOIN chat_message_join ON chat_message_join.message_id = message.ROWID
JOIN chat ON chat.ROWID = chat_message_join.chat_id
LEFT JOIN handle ON message.handle_id = handle.ROWID";

const HANDLE_SELECT: &str = "
SELECT handle.ROWID, handle.id, handle.service, handle.uncanonicalized_id
FROM handle";

fn sql_limit(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn flag(row: &Row, idx: usize) -> rusqlite::Result<bool> {
    Ok(row.get::<_, Option<i64>>(idx)?.unwrap_or(0) != 0)
}

fn blob_as_base64(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Blob(bytes) | ValueRef::Text(bytes) => Some(BASE64.encode(bytes)),
        _ => None,
    }
}

fn row_to_message_record(row: &Row) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        guid: row.get(0)?,
        text: row.get(1)?,
        is_from_me: flag(row, 2)?,
        date: row.get::<_, Option<i64>>(3)?.and_then(apple_to_local_string),
        contact: row.get(4)?,
    })
}

fn row_to_chat_message(row: &Row) -> rusqlite::Result<ChatMessage> {
    let sender: Option<String> = row.get(5)?;
    Ok(ChatMessage {
        id: row.get(0)?,
        text: row.get(1)?,
        attributed_body: blob_as_base64(row.get_ref(2)?),
        date: row.get::<_, Option<i64>>(3)?.and_then(apple_to_local_string),
        is_from_me: flag(row, 4)?,
        sender_id: sender.clone(),
        sender_name: sender,
    })
}

fn row_to_handle(row: &Row) -> rusqlite::Result<HandleRecord> {
    Ok(HandleRecord {
        id: row.get(0)?,
        phone_or_email: row.get(1)?,
        service: row.get(2)?,
        uncanonicalized_id: row.get(3)?,
    })
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(BASE64.encode(b)),
    }
}

/// Every column of the row as a JSON object keyed by column name.
fn row_to_json_object(
    row: &Row,
    columns: &[String],
) -> rusqlite::Result<serde_json::Map<String, serde_json::Value>> {
    let mut object = serde_json::Map::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        object.insert(name.clone(), value_to_json(row.get_ref(idx)?));
    }
    Ok(object)
}

fn query_json_objects<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<serde_json::Map<String, serde_json::Value>>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt.query_map(params, |row| row_to_json_object(row, &columns))?;
    rows.collect()
}

// ═════════════════════════════════════════════════════════════════════════
// MessageStore
// ═════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub(crate) struct MessageStore {
    path: PathBuf,
}

impl MessageStore {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::NotFound(self.path.clone()));
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }

    /// Run `f` against a fresh read-only handle; the handle is closed on return.
    fn with_connection<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        debug!(op, path = %self.path.display(), "message store query");
        let conn = self.open()?;
        Ok(f(&conn)?)
    }

    fn message_records<P: rusqlite::Params>(
        &self,
        op: &'static str,
        sql: &str,
        params: P,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        self.with_connection(op, |conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, row_to_message_record)?;
            rows.collect()
        })
    }

    fn chat_messages<P: rusqlite::Params>(
        &self,
        op: &'static str,
        sql: &str,
        params: P,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        self.with_connection(op, |conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, row_to_chat_message)?;
            rows.collect()
        })
    }

    // ── Message records ──────────────────────────────────────────────────

    pub(crate) fn recent_messages(&self, limit: usize) -> Result<Vec<MessageRecord>, StoreError> {
        let sql = format!(
            "{MESSAGE_RECORD_SELECT}
             WHERE m.text IS NOT NULL
             ORDER BY m.date DESC
             LIMIT ?1"
        );
        self.message_records("recent_messages", &sql, params![sql_limit(limit)])
    }

    pub(crate) fn search_messages(
        &self,
        search_term: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let sql = format!(
            "{MESSAGE_RECORD_SELECT}
             WHERE m.text LIKE ?1
             ORDER BY m.date DESC
             LIMIT ?2"
        );
        self.message_records(
            "search_messages",
            &sql,
            params![format!("%{search_term}%"), sql_limit(limit)],
        )
    }

    pub(crate) fn messages_from_contact(
        &self,
        contact: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let sql = format!(
            "{MESSAGE_RECORD_SELECT}
             WHERE h.id LIKE ?1 AND m.text IS NOT NULL
             ORDER BY m.date DESC
             LIMIT ?2"
        );
        self.message_records(
            "messages_from_contact",
            &sql,
            params![format!("%{contact}%"), sql_limit(limit)],
        )
    }

    // ── Aggregates ───────────────────────────────────────────────────────

    pub(crate) fn conversation_list(
        &self,
        limit: usize,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        const SQL: &str = "
SELECT c.chat_identifier,
       c.display_name,
       MAX(m.date) AS last_message_date,
       COUNT(DISTINCT m.ROWID) AS message_count,
       (SELECT m2.text
          FROM chat_message_join j2
          JOIN message m2 ON m2.ROWID = j2.message_id
         WHERE j2.chat_id = c.ROWID
         ORDER BY m2.date DESC, m2.ROWID DESC
         LIMIT 1) AS last_message
FROM chat c
JOIN chat_message_join cmj ON c.ROWID = cmj.chat_id
JOIN message m ON cmj.message_id = m.ROWID
GROUP BY c.ROWID
ORDER BY last_message_date DESC
LIMIT ?1";
        self.with_connection("conversation_list", |conn| {
            let mut stmt = conn.prepare(SQL)?;
            let rows = stmt.query_map(params![sql_limit(limit)], |row| {
                let chat_id: String = row.get::<_, Option<String>>(0)?.unwrap_or_default();
                let display_name = row
                    .get::<_, Option<String>>(1)?
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| chat_id.clone());
                Ok(ConversationSummary {
                    display_name,
                    last_message_date: row
                        .get::<_, Option<i64>>(2)?
                        .and_then(apple_to_local_iso),
                    message_count: row.get(3)?,
                    last_message: row.get(4)?,
                    chat_id,
                })
            })?;
            rows.collect()
        })
    }

    pub(crate) fn message_stats(&self) -> Result<MessageStats, StoreError> {
        self.with_connection("message_stats", |conn| {
            let count = |sql: &str| conn.query_row(sql, [], |row| row.get::<_, i64>(0));
            let total_messages = count("SELECT COUNT(*) FROM message WHERE text IS NOT NULL")?;
            let sent_messages =
                count("SELECT COUNT(*) FROM message WHERE is_from_me = 1 AND text IS NOT NULL")?;
            let total_contacts =
                count("SELECT COUNT(DISTINCT handle_id) FROM message WHERE handle_id > 0")?;
            let total_conversations = count("SELECT COUNT(*) FROM chat")?;
            Ok(MessageStats {
                total_messages,
                sent_messages,
                received_messages: total_messages - sent_messages,
                total_contacts,
                total_conversations,
            })
        })
    }

    pub(crate) fn message_count(&self, chat_id: i64) -> Result<i64, StoreError> {
        self.with_connection("message_count", |conn| {
            conn.query_row(
                "SELECT COUNT(*)
                 FROM message
                 JOIN chat_message_join ON chat_message_join.message_id = message.ROWID
                 WHERE chat_message_join.chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )
        })
    }

    // ── Per-conversation reads ───────────────────────────────────────────

    pub(crate) fn message(&self, message_id: i64) -> Result<Option<ChatMessage>, StoreError> {
        let sql = format!("{CHAT_MESSAGE_SELECT} WHERE message.ROWID = ?1");
        self.with_connection("message", |conn| {
            conn.query_row(&sql, params![message_id], row_to_chat_message)
                .optional()
        })
    }

    pub(crate) fn messages(
        &self,
        chat_id: i64,
        limit: usize,
        offset: usize,
        order: SortOrder,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let sql = format!(
            "{CHAT_MESSAGE_SELECT}
             WHERE chat_message_join.chat_id = ?1
             ORDER BY message.date {order}
             LIMIT ?2 OFFSET ?3",
            order = order.as_sql()
        );
        self.chat_messages(
            "messages",
            &sql,
            params![chat_id, sql_limit(limit), sql_limit(offset)],
        )
    }

    pub(crate) fn messages_before_id(
        &self,
        chat_id: i64,
        message_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let sql = format!(
            "{CHAT_MESSAGE_SELECT}
             WHERE chat_message_join.chat_id = ?1 AND message.ROWID < ?2
             ORDER BY message.date ASC
             LIMIT ?3"
        );
        self.chat_messages(
            "messages_before_id",
            &sql,
            params![chat_id, message_id, sql_limit(limit)],
        )
    }

    pub(crate) fn messages_after_id(
        &self,
        chat_id: i64,
        message_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let sql = format!(
            "{CHAT_MESSAGE_SELECT}
             WHERE chat_message_join.chat_id = ?1 AND message.ROWID > ?2
             ORDER BY message.date ASC
             LIMIT ?3"
        );
        self.chat_messages(
            "messages_after_id",
            &sql,
            params![chat_id, message_id, sql_limit(limit)],
        )
    }

    pub(crate) fn messages_before_date(
        &self,
        chat_id: i64,
        date: &DateArg,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let apple = date.to_apple_ns()?;
        let sql = format!(
            "{CHAT_MESSAGE_SELECT}
             WHERE chat_message_join.chat_id = ?1 AND message.date < ?2
             ORDER BY message.date DESC
             LIMIT ?3"
        );
        self.chat_messages(
            "messages_before_date",
            &sql,
            params![chat_id, apple, sql_limit(limit)],
        )
    }

    pub(crate) fn messages_after_date(
        &self,
        chat_id: i64,
        date: &DateArg,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let apple = date.to_apple_ns()?;
        let sql = format!(
            "{CHAT_MESSAGE_SELECT}
             WHERE chat_message_join.chat_id = ?1 AND message.date > ?2
             ORDER BY message.date ASC
             LIMIT ?3"
        );
        self.chat_messages(
            "messages_after_date",
            &sql,
            params![chat_id, apple, sql_limit(limit)],
        )
    }

    pub(crate) fn messages_same_date(
        &self,
        chat_id: i64,
        date: &DateArg,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let apple = date.to_apple_ns()?;
        let sql = format!(
            "{CHAT_MESSAGE_SELECT}
             WHERE chat_message_join.chat_id = ?1 AND message.date = ?2
             ORDER BY message.ROWID ASC"
        );
        self.chat_messages("messages_same_date", &sql, params![chat_id, apple])
    }

    // ── Senders ──────────────────────────────────────────────────────────

    pub(crate) fn unique_senders_since(&self, date: &DateArg) -> Result<i64, StoreError> {
        let apple = date.to_apple_ns()?;
        self.with_connection("unique_senders_since", |conn| {
            conn.query_row(
                "SELECT COUNT(DISTINCT handle.id)
                 FROM message
                 LEFT JOIN handle ON message.handle_id = handle.ROWID
                 WHERE message.is_from_me = 0 AND message.date >= ?1",
                params![apple],
                |row| row.get(0),
            )
        })
    }

    pub(crate) fn distinct_senders_since(
        &self,
        date: &DateArg,
    ) -> Result<Vec<SenderCount>, StoreError> {
        let apple = date.to_apple_ns()?;
        self.with_connection("distinct_senders_since", |conn| {
            let mut stmt = conn.prepare(
                "SELECT handle.id AS sender_id, COUNT(*) AS messages
                 FROM message
                 LEFT JOIN handle ON message.handle_id = handle.ROWID
                 WHERE message.is_from_me = 0 AND message.date >= ?1
                 GROUP BY handle.id
                 ORDER BY messages DESC, sender_id ASC",
            )?;
            let rows = stmt.query_map(params![apple], |row| {
                Ok(SenderCount {
                    sender_id: row.get(0)?,
                    messages: row.get(1)?,
                })
            })?;
            rows.collect()
        })
    }

    // ── Chat lookups ─────────────────────────────────────────────────────

    pub(crate) fn chat_id_from_message(&self, message_id: i64) -> Result<Option<i64>, StoreError> {
        self.with_connection("chat_id_from_message", |conn| {
            conn.query_row(
                "SELECT chat_message_join.chat_id
                 FROM message
                 JOIN chat_message_join ON chat_message_join.message_id = message.ROWID
                 WHERE message.ROWID = ?1",
                params![message_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub(crate) fn last_message_id_from_chat(
        &self,
        chat_id: i64,
    ) -> Result<Option<i64>, StoreError> {
        self.with_connection("last_message_id_from_chat", |conn| {
            conn.query_row(
                "SELECT message.ROWID
                 FROM message
                 JOIN chat_message_join ON chat_message_join.message_id = message.ROWID
                 WHERE chat_message_join.chat_id = ?1
                 ORDER BY message.date DESC, message.ROWID DESC
                 LIMIT 1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub(crate) fn last_message_date_from_chat(
        &self,
        chat_id: i64,
    ) -> Result<Option<String>, StoreError> {
        let raw: Option<Option<i64>> = self.with_connection("last_message_date_from_chat", |conn| {
            conn.query_row(
                "SELECT message.date
                 FROM message
                 JOIN chat_message_join ON chat_message_join.message_id = message.ROWID
                 WHERE chat_message_join.chat_id = ?1
                 ORDER BY message.date DESC, message.ROWID DESC
                 LIMIT 1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(raw.flatten().and_then(apple_to_local_string))
    }

    pub(crate) fn chat_names(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<serde_json::Map<String, serde_json::Value>>, StoreError> {
        self.with_connection("chat_names", |conn| {
            query_json_objects(
                conn,
                "SELECT * FROM chat ORDER BY ROWID DESC LIMIT ?1 OFFSET ?2",
                params![sql_limit(limit), sql_limit(offset)],
            )
        })
    }

    pub(crate) fn total_chat_count(&self) -> Result<i64, StoreError> {
        self.with_connection("total_chat_count", |conn| {
            conn.query_row("SELECT COUNT(*) FROM chat", [], |row| row.get(0))
        })
    }

    pub(crate) fn chat_participant_handles(&self, chat_id: i64) -> Result<Vec<String>, StoreError> {
        self.with_connection("chat_participant_handles", |conn| {
            let mut stmt = conn.prepare(
                "SELECT h.id
                 FROM chat_handle_join chj
                 JOIN handle h ON h.ROWID = chj.handle_id
                 WHERE chj.chat_id = ?1
                 ORDER BY h.ROWID",
            )?;
            let rows = stmt.query_map(params![chat_id], |row| row.get(0))?;
            rows.collect()
        })
    }

    pub(crate) fn chat_by_id(
        &self,
        chat_id: i64,
    ) -> Result<Option<serde_json::Map<String, serde_json::Value>>, StoreError> {
        self.with_connection("chat_by_id", |conn| {
            query_json_objects(conn, "SELECT * FROM chat WHERE ROWID = ?1", params![chat_id])
                .map(|rows| rows.into_iter().next())
        })
    }

    pub(crate) fn chat_by_identifier(
        &self,
        chat_identifier: &str,
    ) -> Result<Option<serde_json::Map<String, serde_json::Value>>, StoreError> {
        self.with_connection("chat_by_identifier", |conn| {
            query_json_objects(
                conn,
                "SELECT * FROM chat WHERE chat_identifier = ?1",
                params![chat_identifier],
            )
            .map(|rows| rows.into_iter().next())
        })
    }

    // ── Handles ──────────────────────────────────────────────────────────

    pub(crate) fn handles(&self, limit: usize) -> Result<Vec<HandleRecord>, StoreError> {
        let sql = format!("{HANDLE_SELECT} LIMIT ?1");
        self.with_connection("handles", |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![sql_limit(limit)], row_to_handle)?;
            rows.collect()
        })
    }

    pub(crate) fn handle_details(
        &self,
        handle_id: i64,
    ) -> Result<Option<HandleRecord>, StoreError> {
        let sql = format!("{HANDLE_SELECT} WHERE handle.ROWID = ?1");
        self.with_connection("handle_details", |conn| {
            conn.query_row(&sql, params![handle_id], row_to_handle)
                .optional()
        })
    }
}

// ── Test fixtures ────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn ids(messages: &[ChatMessage]) -> Vec<i64> {
        messages.iter().map(|m| m.id).collect()
    }

    #[test]
    fn missing_database_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path().join("absent.db"));
        match store.recent_messages(5) {
            Err(StoreError::NotFound(path)) => assert!(path.ends_with("absent.db")),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(!dir.path().join("absent.db").exists());
    }

    #[test]
    fn paginated_messages_newest_first() {
        let db = sample_db();
        let store = db.store();
        let page = store.messages(1, 2, 0, SortOrder::Desc).unwrap();
        assert_eq!(ids(&page), vec![3, 2]);
        let rest = store.messages(1, 2, 2, SortOrder::Desc).unwrap();
        assert_eq!(ids(&rest), vec![1]);
        let asc = store.messages(1, 2, 0, SortOrder::Asc).unwrap();
        assert_eq!(ids(&asc), vec![1, 2]);
    }

    #[test]
    fn chat_message_fields() {
        let db = sample_db();
        let store = db.store();
        let msg = store.message(3).unwrap().unwrap();
        assert_eq!(msg.text.as_deref(), Some("third"));
        assert_eq!(msg.sender_id.as_deref(), Some("+14698264814"));
        assert_eq!(msg.sender_name, msg.sender_id);
        assert_eq!(
            msg.attributed_body.as_deref(),
            Some(BASE64.encode(b"\x04\x0bstreamtyped").as_str())
        );
        assert_eq!(msg.date, apple_to_local_string(t3()));

        let own = store.message(2).unwrap().unwrap();
        assert!(own.is_from_me);
        assert!(own.sender_id.is_none());
        assert!(own.attributed_body.is_none());

        assert!(store.message(99).unwrap().is_none());
    }

    #[test]
    fn recent_messages_skip_null_text() {
        let db = sample_db();
        let recent = db.store().recent_messages(3).unwrap();
        let texts: Vec<_> = recent.iter().map(|m| m.text.as_deref().unwrap()).collect();
        assert_eq!(texts, vec!["see you soon", "family hello", "third"]);
        assert_eq!(recent[0].guid, "G6");
        assert_eq!(recent[0].contact.as_deref(), Some("+15550001111"));
    }

    #[test]
    fn search_is_substring_match() {
        let db = sample_db();
        let hits = db.store().search_messages("SEE", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text.as_deref(), Some("see you soon"));
        assert!(db.store().search_messages("nothing like this", 10).unwrap().is_empty());
    }

    #[test]
    fn messages_from_contact_matches_partial_handle() {
        let db = sample_db();
        let hits = db.store().messages_from_contact("4698", 10).unwrap();
        let guids: Vec<_> = hits.iter().map(|m| m.guid.as_str()).collect();
        assert_eq!(guids, vec!["G3", "G1"]);
    }

    #[test]
    fn conversation_list_aggregates_per_chat() {
        let db = sample_db();
        let chats = db.store().conversation_list(10).unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].chat_id, "chat123456");
        assert_eq!(chats[0].display_name, "Family");
        assert_eq!(chats[0].message_count, 3);
        assert_eq!(chats[0].last_message.as_deref(), Some("see you soon"));
        assert_eq!(chats[1].display_name, "+14698264814");
        assert_eq!(chats[1].message_count, 3);
        assert_eq!(chats[1].last_message.as_deref(), Some("third"));
        assert_eq!(chats[1].last_message_date, apple_to_local_iso(t3()));
    }

    #[test]
    fn stats_count_text_messages_and_senders() {
        let db = sample_db();
        let stats = db.store().message_stats().unwrap();
        assert_eq!(
            stats,
            MessageStats {
                total_messages: 5,
                sent_messages: 1,
                received_messages: 4,
                total_contacts: 3,
                total_conversations: 2,
            }
        );
        assert_eq!(db.store().message_count(2).unwrap(), 3);
        assert_eq!(db.store().message_count(42).unwrap(), 0);
    }

    #[test]
    fn id_cursors() {
        let db = sample_db();
        let store = db.store();
        assert_eq!(ids(&store.messages_before_id(1, 3, 10).unwrap()), vec![1, 2]);
        assert_eq!(ids(&store.messages_after_id(1, 1, 10).unwrap()), vec![2, 3]);
        assert_eq!(ids(&store.messages_after_id(1, 1, 1).unwrap()), vec![2]);
    }

    #[test]
    fn date_filters_accept_raw_and_iso() {
        let db = sample_db();
        let store = db.store();
        let before = store
            .messages_before_date(1, &DateArg::Raw(t3()), 10)
            .unwrap();
        assert_eq!(ids(&before), vec![2, 1]);

        let after = store
            .messages_after_date(1, &DateArg::Text("2024-01-01T10:00:00Z".into()), 10)
            .unwrap();
        assert_eq!(ids(&after), vec![2, 3]);

        let same = store
            .messages_same_date(1, &DateArg::Text(t2().to_string()))
            .unwrap();
        assert_eq!(ids(&same), vec![2]);

        let err = store
            .messages_after_date(1, &DateArg::Text("not-a-date".into()), 10)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidDate(_)));
    }

    #[test]
    fn sender_aggregates() {
        let db = sample_db();
        let store = db.store();
        let since_feb = DateArg::Text("2024-02-01T00:00:00+00:00".into());
        assert_eq!(store.unique_senders_since(&since_feb).unwrap(), 2);

        let senders = store.distinct_senders_since(&DateArg::Raw(t1())).unwrap();
        let pairs: Vec<_> = senders
            .iter()
            .map(|s| (s.sender_id.as_deref().unwrap(), s.messages))
            .collect();
        assert_eq!(
            pairs,
            vec![("+14698264814", 2), ("+15550001111", 2), ("alice@example.com", 1)]
        );
    }

    #[test]
    fn chat_lookups() {
        let db = sample_db();
        let store = db.store();
        assert_eq!(store.chat_id_from_message(5).unwrap(), Some(2));
        assert_eq!(store.chat_id_from_message(99).unwrap(), None);
        assert_eq!(store.last_message_id_from_chat(1).unwrap(), Some(3));
        assert_eq!(store.last_message_id_from_chat(99).unwrap(), None);
        assert_eq!(
            store.last_message_date_from_chat(1).unwrap(),
            apple_to_local_string(t3())
        );
        assert_eq!(store.total_chat_count().unwrap(), 2);
        assert_eq!(
            store.chat_participant_handles(2).unwrap(),
            vec!["alice@example.com", "+15550001111"]
        );

        let names = store.chat_names(1, 0).unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0]["chat_identifier"], "chat123456");
        let second = store.chat_names(1, 1).unwrap();
        assert_eq!(second[0]["ROWID"], 1);

        let family = store.chat_by_identifier("chat123456").unwrap().unwrap();
        assert_eq!(family["display_name"], "Family");
        assert!(store.chat_by_id(99).unwrap().is_none());
        assert_eq!(store.chat_by_id(1).unwrap().unwrap()["chat_identifier"], "+14698264814");
    }

    #[test]
    fn handle_reads() {
        let db = sample_db();
        let store = db.store();
        assert_eq!(store.handles(2).unwrap().len(), 2);
        let sms = store.handle_details(3).unwrap().unwrap();
        assert_eq!(sms.service.as_deref(), Some("SMS"));
        assert_eq!(sms.uncanonicalized_id.as_deref(), Some("5550001111"));
        assert!(store.handle_details(99).unwrap().is_none());
    }

    #[test]
    fn repeated_queries_are_identical() {
        let db = sample_db();
        let store = db.store();
        assert_eq!(store.recent_messages(10).unwrap(), store.recent_messages(10).unwrap());
        assert_eq!(
            store.messages(2, 10, 0, SortOrder::Desc).unwrap(),
            store.messages(2, 10, 0, SortOrder::Desc).unwrap()
        );
    }

    #[test]
    fn iso_conversion_is_linear() {
        let arg = DateArg::Text("2001-01-01T00:00:01Z".into());
        assert_eq!(arg.to_apple_ns().unwrap(), NANOS_PER_SEC);
        let arg = DateArg::Text("2024-01-01T10:00:00.5+00:00".into());
        assert_eq!(arg.to_apple_ns().unwrap(), t1() + NANOS_PER_SEC / 2);
        assert_eq!(DateArg::Raw(42).to_apple_ns().unwrap(), 42);
        assert_eq!(DateArg::Text(" 1234 ".into()).to_apple_ns().unwrap(), 1234);
    }

    #[test]
    fn iso_outside_nanosecond_range_is_rejected() {
        for text in ["2300-01-01T00:00:00Z", "1600-01-01T00:00:00Z"] {
            let err = DateArg::Text(text.into()).to_apple_ns().unwrap_err();
            assert!(matches!(err, StoreError::InvalidDate(ref t) if t == text), "{text}");
        }
        assert_eq!(unix_to_apple_ns(i64::MAX, 0), None);
        assert_eq!(unix_to_apple_ns(APPLE_EPOCH_OFFSET, 7), Some(7));
    }

    #[test]
    fn far_future_filter_is_an_error_not_every_row() {
        let db = sample_db();
        let err = db
            .store()
            .messages_after_date(1, &DateArg::Text("2300-01-01T00:00:00Z".into()), 10)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidDate(_)));
    }

    #[test]
    fn extreme_stored_dates_do_not_panic() {
        assert!(apple_to_local_string(i64::MIN).is_some());
        assert!(apple_to_local_iso(i64::MAX).is_some());
        assert!(apple_to_local_string(-5).is_some());
    }

    #[test]
    fn naive_iso_is_local_time() {
        let expected = Local
            .with_ymd_and_hms(2024, 3, 5, 8, 30, 0)
            .earliest()
            .unwrap();
        let arg = DateArg::Text("2024-03-05T08:30:00".into());
        assert_eq!(
            arg.to_apple_ns().unwrap(),
            unix_to_apple_ns(expected.timestamp(), 0).unwrap()
        );
        assert!(parse_iso_timestamp("2024-03-05").is_some());
        assert!(parse_iso_timestamp("2024-03-05 08:30").is_some());
    }

    #[test]
    fn legacy_second_timestamps_render_like_nanoseconds() {
        let secs = 725_000_000;
        assert_eq!(
            apple_to_local_string(secs),
            apple_to_local_string(secs * NANOS_PER_SEC)
        );
    }

    #[test]
    fn sort_order_parsing() {
        assert_eq!("desc".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert_eq!(" ASC ".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!(matches!(
            "DESC; DROP TABLE message".parse::<SortOrder>(),
            Err(StoreError::InvalidOrder(_))
        ));
        let parsed: SortOrder = serde_json::from_value(serde_json::json!("asc")).unwrap();
        assert_eq!(parsed, SortOrder::Asc);
        assert!(serde_json::from_value::<SortOrder>(serde_json::json!("sideways")).is_err());
    }

    #[test]
    fn date_arg_deserializes_number_or_string() {
        let raw: DateArg = serde_json::from_value(serde_json::json!(123)).unwrap();
        assert_eq!(raw, DateArg::Raw(123));
        let text: DateArg = serde_json::from_value(serde_json::json!("2024-01-01")).unwrap();
        assert_eq!(text, DateArg::Text("2024-01-01".into()));
    }
}
