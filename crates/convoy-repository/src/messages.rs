use chrono::Utc;
use rusqlite::{params, Connection};
use std::str::FromStr;

use crate::error::Result;
use crate::types::{Message, MessageRole};
use convoy_core::ids::{ChatId, MessageId};

const MESSAGE_COLUMNS: &str = "id, chat_id, role, content, token_count, attributes, created_at";

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role = MessageRole::from_str(&row.get::<_, String>(2)?).unwrap_or(MessageRole::User);
    let attributes: String = row.get(5)?;
    Ok(Message {
        id: row.get::<_, String>(0)?.into(),
        chat_id: row.get::<_, String>(1)?.into(),
        role,
        content: row.get(3)?,
        token_count: row.get(4)?,
        attributes: serde_json::from_str(&attributes).unwrap_or(serde_json::json!({})),
        created_at: row.get(6)?,
    })
}

pub fn append(
    conn: &Connection,
    chat_id: &ChatId,
    role: MessageRole,
    content: &str,
    token_count: Option<u32>,
) -> Result<Message> {
    let id = MessageId::new();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO messages (id, chat_id, role, content, token_count, attributes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, '{}', ?6)",
        params![id.as_str(), chat_id.as_str(), role.to_string(), content, token_count, now],
    )?;
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    Ok(stmt.query_row(params![id.as_str()], row_to_message)?)
}

/// All messages for a chat, oldest first. Callers that need a bounded
/// window (§4.F) slice the tail themselves; this always returns the full
/// history so the memory engine can decide what to keep.
pub fn list_for_chat(conn: &Connection, chat_id: &ChatId) -> Result<Vec<Message>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = ?1 ORDER BY created_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![chat_id.as_str()], row_to_message)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Messages created at or after `since_message_id`'s position, used to
/// re-summarize only the tail once a prior summary already exists.
pub fn list_after(
    conn: &Connection,
    chat_id: &ChatId,
    since_message_id: &MessageId,
) -> Result<Vec<Message>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE chat_id = ?1 AND created_at > (
             SELECT created_at FROM messages WHERE id = ?2
         )
         ORDER BY created_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![chat_id.as_str(), since_message_id.as_str()], row_to_message)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn count_for_chat(conn: &Connection, chat_id: &ChatId) -> Result<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
        params![chat_id.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}
