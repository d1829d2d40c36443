use chrono::Utc;
use rusqlite::{params, Connection};
use std::str::FromStr;

use crate::error::{RepositoryError, Result};
use crate::types::{Document, DocumentState};
use convoy_core::ids::{DocumentId, OrgId, UserId};

const DOCUMENT_COLUMNS: &str = "id, org_id, user_id, filename, mime_type, size_bytes, state, \
    blob_path, page_count, parsed_at, failure_reason, deleted_at, created_at, updated_at";

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let state = DocumentState::from_str(&row.get::<_, String>(6)?).unwrap_or(DocumentState::Uploaded);
    Ok(Document {
        id: row.get::<_, String>(0)?.into(),
        org_id: row.get::<_, String>(1)?.into(),
        user_id: row.get::<_, String>(2)?.into(),
        filename: row.get(3)?,
        mime_type: row.get(4)?,
        size_bytes: row.get::<_, i64>(5)? as u64,
        state,
        blob_path: row.get(7)?,
        page_count: row.get(8)?,
        parsed_at: row.get(9)?,
        failure_reason: row.get(10)?,
        deleted_at: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

#[allow(clippy::too_many_arguments)]
pub fn create(
    conn: &Connection,
    org_id: &OrgId,
    user_id: &UserId,
    filename: &str,
    mime_type: &str,
    size_bytes: u64,
    blob_path: &str,
) -> Result<Document> {
    let id = DocumentId::new();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO documents
            (id, org_id, user_id, filename, mime_type, size_bytes, state, blob_path,
             page_count, parsed_at, failure_reason, deleted_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'uploaded', ?7, NULL, NULL, NULL, NULL, ?8, ?8)",
        params![
            id.as_str(),
            org_id.as_str(),
            user_id.as_str(),
            filename,
            mime_type,
            size_bytes as i64,
            blob_path,
            now,
        ],
    )?;
    get(conn, org_id, &id)?.ok_or(RepositoryError::NotFound)
}

pub fn get(conn: &Connection, org_id: &OrgId, id: &DocumentId) -> Result<Option<Document>> {
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1 AND org_id = ?2 AND deleted_at IS NULL"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![id.as_str(), org_id.as_str()], row_to_document)?;
    match rows.next() {
        Some(r) => Ok(Some(r?)),
        None => Ok(None),
    }
}

pub fn list_for_org(conn: &Connection, org_id: &OrgId) -> Result<Vec<Document>> {
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents
         WHERE org_id = ?1 AND deleted_at IS NULL ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![org_id.as_str()], row_to_document)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn mark_processing(conn: &Connection, id: &DocumentId) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE documents SET state = 'processing', updated_at = ?2
         WHERE id = ?1 AND deleted_at IS NULL",
        params![id.as_str(), now],
    )?;
    if rows == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

pub fn mark_parsed(conn: &Connection, id: &DocumentId, page_count: Option<u32>) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE documents SET state = 'parsed', page_count = ?2, parsed_at = ?3, updated_at = ?3
         WHERE id = ?1 AND deleted_at IS NULL",
        params![id.as_str(), page_count, now],
    )?;
    if rows == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

pub fn mark_failed(conn: &Connection, id: &DocumentId, reason: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE documents SET state = 'failed', failure_reason = ?2, updated_at = ?3
         WHERE id = ?1 AND deleted_at IS NULL",
        params![id.as_str(), reason, now],
    )?;
    if rows == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Soft-deletes the document and cascades to its chunks in one transaction.
pub fn soft_delete(conn: &mut Connection, org_id: &OrgId, id: &DocumentId) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    let rows = tx.execute(
        "UPDATE documents SET deleted_at = ?3, updated_at = ?3
         WHERE id = ?1 AND org_id = ?2 AND deleted_at IS NULL",
        params![id.as_str(), org_id.as_str(), now],
    )?;
    if rows == 0 {
        return Err(RepositoryError::NotFound);
    }
    tx.execute(
        "DELETE FROM document_chunks WHERE document_id = ?1",
        params![id.as_str()],
    )?;
    tx.commit()?;
    Ok(())
}
