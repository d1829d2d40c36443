use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::types::DocumentChunk;
use convoy_core::ids::DocumentId;

const CHUNK_COLUMNS: &str = "id, document_id, chunk_index, content, char_count, token_count, created_at";

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentChunk> {
    Ok(DocumentChunk {
        id: row.get(0)?,
        document_id: row.get::<_, String>(1)?.into(),
        chunk_index: row.get(2)?,
        content: row.get(3)?,
        char_count: row.get(4)?,
        token_count: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// A chunk body awaiting an id and timestamp, produced by the chunker.
pub struct NewChunk {
    pub chunk_index: u32,
    pub content: String,
    pub char_count: u32,
    pub token_count: Option<u32>,
}

/// Inserts every chunk for a document in one transaction. A parse that
/// fails partway through never leaves a document with a half-written
/// chunk set. `(document_id, chunk_index)` is unique, so re-running the
/// parse job for the same document replaces rather than duplicates
/// (§8 "Chunk idempotence").
pub fn insert_all(
    conn: &mut Connection,
    document_id: &DocumentId,
    chunks: Vec<NewChunk>,
) -> Result<Vec<DocumentChunk>> {
    let now = Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    let mut out = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        // Deterministic on (document_id, chunk_index) rather than random, so
        // retries of the same parse job produce the same chunk id and the
        // same downstream vector point id (§8 "Chunk idempotence").
        let id = format!("{}:{}", document_id.as_str(), chunk.chunk_index);
        tx.execute(
            "INSERT INTO document_chunks
                (id, document_id, chunk_index, content, char_count, token_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(document_id, chunk_index) DO UPDATE SET
                content = excluded.content,
                char_count = excluded.char_count,
                token_count = excluded.token_count",
            params![
                id,
                document_id.as_str(),
                chunk.chunk_index,
                chunk.content,
                chunk.char_count,
                chunk.token_count,
                now,
            ],
        )?;
        out.push(DocumentChunk {
            id,
            document_id: document_id.clone(),
            chunk_index: chunk.chunk_index,
            content: chunk.content,
            char_count: chunk.char_count,
            token_count: chunk.token_count,
            created_at: now.clone(),
        });
    }
    tx.commit()?;
    Ok(out)
}

pub fn list_for_document(conn: &Connection, document_id: &DocumentId) -> Result<Vec<DocumentChunk>> {
    let sql = format!(
        "SELECT {CHUNK_COLUMNS} FROM document_chunks WHERE document_id = ?1 ORDER BY chunk_index ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![document_id.as_str()], row_to_chunk)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<DocumentChunk>> {
    let sql = format!("SELECT {CHUNK_COLUMNS} FROM document_chunks WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![id], row_to_chunk)?;
    match rows.next() {
        Some(r) => Ok(Some(r?)),
        None => Ok(None),
    }
}
