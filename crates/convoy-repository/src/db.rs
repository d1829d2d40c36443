use rusqlite::Connection;

use crate::error::Result;

/// Initialise every table owned by this crate. Safe to call on every
/// startup since each statement is `CREATE TABLE IF NOT EXISTS`.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_organizations_table(conn)?;
    create_users_table(conn)?;
    create_chats_table(conn)?;
    create_messages_table(conn)?;
    create_prompts_table(conn)?;
    create_summaries_table(conn)?;
    create_documents_table(conn)?;
    create_chunks_table(conn)?;
    Ok(())
}

fn create_organizations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS organizations (
            id          TEXT PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            slug        TEXT NOT NULL UNIQUE,
            attributes  TEXT NOT NULL DEFAULT '{}',
            deleted_at  TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn create_users_table(conn: &Connection) -> Result<()> {
    // UNIQUE(org_id, email) scopes email uniqueness per tenant, not globally.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY NOT NULL,
            org_id        TEXT NOT NULL REFERENCES organizations(id),
            email         TEXT NOT NULL,
            display_name  TEXT NOT NULL,
            role          TEXT NOT NULL DEFAULT 'member',
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL,
            UNIQUE(org_id, email)
        );
        CREATE INDEX IF NOT EXISTS idx_users_org ON users (org_id);",
    )?;
    Ok(())
}

fn create_chats_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chats (
            id          TEXT PRIMARY KEY NOT NULL,
            org_id      TEXT NOT NULL REFERENCES organizations(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            title       TEXT NOT NULL DEFAULT 'Untitled',
            deleted_at  TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chats_org_user ON chats (org_id, user_id);",
    )?;
    Ok(())
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id           TEXT PRIMARY KEY NOT NULL,
            chat_id      TEXT NOT NULL REFERENCES chats(id),
            role         TEXT NOT NULL,
            content      TEXT NOT NULL,
            token_count  INTEGER,
            attributes   TEXT NOT NULL DEFAULT '{}',
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages (chat_id, created_at);",
    )?;
    Ok(())
}

fn create_prompts_table(conn: &Connection) -> Result<()> {
    // UNIQUE(name, version) lets every edit append a new version rather than
    // mutate history; `active` is flipped atomically by activate_version.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS prompts (
            id                TEXT PRIMARY KEY NOT NULL,
            name              TEXT NOT NULL,
            version           INTEGER NOT NULL,
            content           TEXT NOT NULL,
            active            INTEGER NOT NULL DEFAULT 0,
            created_by        TEXT NOT NULL,
            metadata          TEXT NOT NULL DEFAULT '{}',
            invocation_count  INTEGER NOT NULL DEFAULT 0,
            mean_tokens       REAL NOT NULL DEFAULT 0,
            mean_latency_ms   REAL NOT NULL DEFAULT 0,
            created_at        TEXT NOT NULL,
            UNIQUE(name, version)
        );
        CREATE INDEX IF NOT EXISTS idx_prompts_name_active ON prompts (name, active);",
    )?;
    Ok(())
}

fn create_summaries_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS summaries (
            id                     TEXT PRIMARY KEY NOT NULL,
            chat_id                TEXT NOT NULL REFERENCES chats(id),
            summary_text           TEXT NOT NULL,
            start_message_id       TEXT NOT NULL,
            end_message_id         TEXT NOT NULL,
            covered_message_count  INTEGER NOT NULL,
            original_tokens        INTEGER NOT NULL,
            summary_tokens         INTEGER NOT NULL,
            compression_ratio      REAL NOT NULL,
            created_at             TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_summaries_chat ON summaries (chat_id, created_at);",
    )?;
    Ok(())
}

fn create_documents_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS documents (
            id              TEXT PRIMARY KEY NOT NULL,
            org_id          TEXT NOT NULL REFERENCES organizations(id),
            user_id         TEXT NOT NULL REFERENCES users(id),
            filename        TEXT NOT NULL,
            mime_type       TEXT NOT NULL,
            size_bytes      INTEGER NOT NULL,
            state           TEXT NOT NULL DEFAULT 'uploaded',
            blob_path       TEXT NOT NULL,
            page_count      INTEGER,
            parsed_at       TEXT,
            failure_reason  TEXT,
            deleted_at      TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_documents_org ON documents (org_id);",
    )?;
    Ok(())
}

fn create_chunks_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS document_chunks (
            id           TEXT PRIMARY KEY NOT NULL,
            document_id  TEXT NOT NULL REFERENCES documents(id),
            chunk_index  INTEGER NOT NULL,
            content      TEXT NOT NULL,
            char_count   INTEGER NOT NULL,
            token_count  INTEGER,
            created_at   TEXT NOT NULL,
            UNIQUE(document_id, chunk_index)
        );
        CREATE INDEX IF NOT EXISTS idx_chunks_document ON document_chunks (document_id, chunk_index);",
    )?;
    Ok(())
}
