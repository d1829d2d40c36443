use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::{RepositoryError, Result};
use crate::types::Chat;
use convoy_core::ids::{ChatId, OrgId, UserId};

const CHAT_COLUMNS: &str = "id, org_id, user_id, title, deleted_at, created_at, updated_at";

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get::<_, String>(0)?.into(),
        org_id: row.get::<_, String>(1)?.into(),
        user_id: row.get::<_, String>(2)?.into(),
        title: row.get(3)?,
        deleted_at: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub fn create(conn: &Connection, org_id: &OrgId, user_id: &UserId, title: &str) -> Result<Chat> {
    let id = ChatId::new();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO chats (id, org_id, user_id, title, deleted_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)",
        params![id.as_str(), org_id.as_str(), user_id.as_str(), title, now],
    )?;
    get(conn, org_id, &id)?.ok_or(RepositoryError::NotFound)
}

/// Tenant-scoped: a chat belonging to another org reads back as None, not
/// an error, so callers answer with 404 rather than leaking existence.
pub fn get(conn: &Connection, org_id: &OrgId, id: &ChatId) -> Result<Option<Chat>> {
    let sql = format!(
        "SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1 AND org_id = ?2 AND deleted_at IS NULL"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![id.as_str(), org_id.as_str()], row_to_chat)?;
    match rows.next() {
        Some(r) => Ok(Some(r?)),
        None => Ok(None),
    }
}

pub fn list_for_user(conn: &Connection, org_id: &OrgId, user_id: &UserId) -> Result<Vec<Chat>> {
    let sql = format!(
        "SELECT {CHAT_COLUMNS} FROM chats
         WHERE org_id = ?1 AND user_id = ?2 AND deleted_at IS NULL
         ORDER BY updated_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![org_id.as_str(), user_id.as_str()], row_to_chat)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn rename(conn: &Connection, org_id: &OrgId, id: &ChatId, title: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE chats SET title = ?3, updated_at = ?4
         WHERE id = ?1 AND org_id = ?2 AND deleted_at IS NULL",
        params![id.as_str(), org_id.as_str(), title, now],
    )?;
    if rows == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

pub fn touch(conn: &Connection, id: &ChatId) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE chats SET updated_at = ?2 WHERE id = ?1",
        params![id.as_str(), now],
    )?;
    Ok(())
}

/// Soft-deletes the chat and cascades to its messages and summaries in one
/// transaction, so a crash mid-delete never leaves orphaned live rows.
pub fn soft_delete(conn: &mut Connection, org_id: &OrgId, id: &ChatId) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    let rows = tx.execute(
        "UPDATE chats SET deleted_at = ?3, updated_at = ?3
         WHERE id = ?1 AND org_id = ?2 AND deleted_at IS NULL",
        params![id.as_str(), org_id.as_str(), now],
    )?;
    if rows == 0 {
        return Err(RepositoryError::NotFound);
    }
    tx.execute(
        "DELETE FROM messages WHERE chat_id = ?1",
        params![id.as_str()],
    )?;
    tx.execute(
        "DELETE FROM summaries WHERE chat_id = ?1",
        params![id.as_str()],
    )?;
    tx.commit()?;
    Ok(())
}
