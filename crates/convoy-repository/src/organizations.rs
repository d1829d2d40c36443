use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::{RepositoryError, Result};
use crate::types::Organization;
use convoy_core::ids::OrgId;

fn row_to_org(row: &rusqlite::Row<'_>) -> rusqlite::Result<Organization> {
    let attributes: String = row.get(3)?;
    Ok(Organization {
        id: row.get::<_, String>(0)?.into(),
        name: row.get(1)?,
        slug: row.get(2)?,
        attributes: serde_json::from_str(&attributes).unwrap_or(serde_json::json!({})),
        deleted_at: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const ORG_COLUMNS: &str =
    "id, name, slug, attributes, deleted_at, created_at, updated_at";

pub fn create(conn: &Connection, name: &str, slug: &str) -> Result<Organization> {
    let id = OrgId::new();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO organizations (id, name, slug, attributes, deleted_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, '{}', NULL, ?4, ?4)",
        params![id.as_str(), name, slug, now],
    )?;
    get(conn, &id)?.ok_or(RepositoryError::NotFound)
}

pub fn get(conn: &Connection, id: &OrgId) -> Result<Option<Organization>> {
    let sql = format!(
        "SELECT {ORG_COLUMNS} FROM organizations WHERE id = ?1 AND deleted_at IS NULL"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![id.as_str()], row_to_org)?;
    match rows.next() {
        Some(r) => Ok(Some(r?)),
        None => Ok(None),
    }
}

pub fn get_by_slug(conn: &Connection, slug: &str) -> Result<Option<Organization>> {
    let sql = format!(
        "SELECT {ORG_COLUMNS} FROM organizations WHERE slug = ?1 AND deleted_at IS NULL"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![slug], row_to_org)?;
    match rows.next() {
        Some(r) => Ok(Some(r?)),
        None => Ok(None),
    }
}

pub fn soft_delete(conn: &Connection, id: &OrgId) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE organizations SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
        params![id.as_str(), now],
    )?;
    if rows == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}
