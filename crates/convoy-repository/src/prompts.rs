use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::{RepositoryError, Result};
use crate::types::Prompt;
use convoy_core::ids::PromptId;

const PROMPT_COLUMNS: &str = "id, name, version, content, active, created_by, metadata, \
    invocation_count, mean_tokens, mean_latency_ms, created_at";

fn row_to_prompt(row: &rusqlite::Row<'_>) -> rusqlite::Result<Prompt> {
    let metadata: String = row.get(6)?;
    Ok(Prompt {
        id: row.get::<_, String>(0)?.into(),
        name: row.get(1)?,
        version: row.get(2)?,
        content: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
        created_by: row.get(5)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::json!({})),
        invocation_count: row.get::<_, i64>(7)? as u64,
        mean_tokens: row.get(8)?,
        mean_latency_ms: row.get(9)?,
        created_at: row.get(10)?,
    })
}

/// Creates a new version of a named prompt. The first version of a name is
/// activated immediately; later versions stay inactive until explicitly
/// promoted via `activate_version`.
pub fn create_version(
    conn: &mut Connection,
    name: &str,
    content: &str,
    created_by: &str,
) -> Result<Prompt> {
    let tx = conn.transaction()?;
    let next_version: i64 = tx.query_row(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM prompts WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    let is_first = next_version == 1;
    let id = PromptId::new();
    let now = Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO prompts
            (id, name, version, content, active, created_by, metadata,
             invocation_count, mean_tokens, mean_latency_ms, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, '{}', 0, 0, 0, ?7)",
        params![id.as_str(), name, next_version, content, is_first as i64, created_by, now],
    )?;
    let sql = format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE id = ?1");
    let prompt = tx.query_row(&sql, params![id.as_str()], row_to_prompt)?;
    tx.commit()?;
    Ok(prompt)
}

pub fn get_active(conn: &Connection, name: &str) -> Result<Option<Prompt>> {
    let sql = format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE name = ?1 AND active = 1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![name], row_to_prompt)?;
    match rows.next() {
        Some(r) => Ok(Some(r?)),
        None => Ok(None),
    }
}

pub fn get_version(conn: &Connection, name: &str, version: u32) -> Result<Option<Prompt>> {
    let sql = format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE name = ?1 AND version = ?2");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![name, version], row_to_prompt)?;
    match rows.next() {
        Some(r) => Ok(Some(r?)),
        None => Ok(None),
    }
}

pub fn list_versions(conn: &Connection, name: &str) -> Result<Vec<Prompt>> {
    let sql = format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE name = ?1 ORDER BY version DESC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![name], row_to_prompt)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Atomically makes `version` the sole active version of `name`. Clears the
/// currently active row first, inside the same transaction, so a reader
/// never observes two active versions (or zero) for the same name.
pub fn activate_version(conn: &mut Connection, name: &str, version: u32) -> Result<()> {
    let tx = conn.transaction()?;
    let exists: bool = tx
        .query_row(
            "SELECT 1 FROM prompts WHERE name = ?1 AND version = ?2",
            params![name, version],
            |_| Ok(()),
        )
        .is_ok();
    if !exists {
        return Err(RepositoryError::InvalidTransition(format!(
            "prompt {name} has no version {version}"
        )));
    }
    tx.execute(
        "UPDATE prompts SET active = 0 WHERE name = ?1 AND active = 1",
        params![name],
    )?;
    tx.execute(
        "UPDATE prompts SET active = 1 WHERE name = ?1 AND version = ?2",
        params![name, version],
    )?;
    tx.commit()?;
    Ok(())
}

/// Rolls the running invocation-count / mean-tokens / mean-latency stats
/// forward incrementally (no full history scan) after a prompt is used.
pub fn record_invocation(
    conn: &Connection,
    id: &PromptId,
    tokens: u32,
    latency_ms: u64,
) -> Result<()> {
    conn.execute(
        "UPDATE prompts SET
            mean_tokens = (mean_tokens * invocation_count + ?2) / (invocation_count + 1),
            mean_latency_ms = (mean_latency_ms * invocation_count + ?3) / (invocation_count + 1),
            invocation_count = invocation_count + 1
         WHERE id = ?1",
        params![id.as_str(), tokens as f64, latency_ms as f64],
    )?;
    Ok(())
}
