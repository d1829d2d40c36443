use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::types::Summary;
use convoy_core::ids::{ChatId, MessageId, SummaryId};

const SUMMARY_COLUMNS: &str = "id, chat_id, summary_text, start_message_id, end_message_id, \
    covered_message_count, original_tokens, summary_tokens, compression_ratio, created_at";

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<Summary> {
    Ok(Summary {
        id: row.get::<_, String>(0)?.into(),
        chat_id: row.get::<_, String>(1)?.into(),
        summary_text: row.get(2)?,
        start_message_id: row.get::<_, String>(3)?.into(),
        end_message_id: row.get::<_, String>(4)?.into(),
        covered_message_count: row.get(5)?,
        original_tokens: row.get(6)?,
        summary_tokens: row.get(7)?,
        compression_ratio: row.get(8)?,
        created_at: row.get(9)?,
    })
}

#[allow(clippy::too_many_arguments)]
pub fn create(
    conn: &Connection,
    chat_id: &ChatId,
    summary_text: &str,
    start_message_id: &MessageId,
    end_message_id: &MessageId,
    covered_message_count: u32,
    original_tokens: u32,
    summary_tokens: u32,
) -> Result<Summary> {
    let id = SummaryId::new();
    let now = Utc::now().to_rfc3339();
    let compression_ratio = original_tokens as f64 / (summary_tokens.max(1) as f64);
    conn.execute(
        "INSERT INTO summaries
            (id, chat_id, summary_text, start_message_id, end_message_id,
             covered_message_count, original_tokens, summary_tokens, compression_ratio, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            id.as_str(),
            chat_id.as_str(),
            summary_text,
            start_message_id.as_str(),
            end_message_id.as_str(),
            covered_message_count,
            original_tokens,
            summary_tokens,
            compression_ratio,
            now,
        ],
    )?;
    let sql = format!("SELECT {SUMMARY_COLUMNS} FROM summaries WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id.as_str()], row_to_summary)?)
}

/// Most recent summary for a chat, if any — the starting point for
/// deciding whether a re-summarization pass is due (§4.F).
pub fn latest_for_chat(conn: &Connection, chat_id: &ChatId) -> Result<Option<Summary>> {
    let sql = format!(
        "SELECT {SUMMARY_COLUMNS} FROM summaries WHERE chat_id = ?1 ORDER BY created_at DESC LIMIT 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![chat_id.as_str()], row_to_summary)?;
    match rows.next() {
        Some(r) => Ok(Some(r?)),
        None => Ok(None),
    }
}
