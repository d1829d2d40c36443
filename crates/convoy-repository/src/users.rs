use chrono::Utc;
use rusqlite::{params, Connection};
use std::str::FromStr;

use crate::error::{RepositoryError, Result};
use crate::types::User;
use convoy_core::ids::{OrgId, UserId};
use convoy_core::role::Role;

const USER_COLUMNS: &str = "id, org_id, email, display_name, role, created_at, updated_at";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let role = Role::from_str(&row.get::<_, String>(4)?).unwrap_or_default();
    Ok(User {
        id: row.get::<_, String>(0)?.into(),
        org_id: row.get::<_, String>(1)?.into(),
        email: row.get(2)?,
        display_name: row.get(3)?,
        role,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub fn create(
    conn: &Connection,
    org_id: &OrgId,
    email: &str,
    display_name: &str,
    role: Role,
) -> Result<User> {
    let id = UserId::new();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO users (id, org_id, email, display_name, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![id.as_str(), org_id.as_str(), email, display_name, role.to_string(), now],
    )?;
    get(conn, org_id, &id)?.ok_or(RepositoryError::NotFound)
}

/// Tenant-scoped lookup: a user from a different org is indistinguishable
/// from a nonexistent one (§7 cross-tenant access contract).
pub fn get(conn: &Connection, org_id: &OrgId, id: &UserId) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1 AND org_id = ?2");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![id.as_str(), org_id.as_str()], row_to_user)?;
    match rows.next() {
        Some(r) => Ok(Some(r?)),
        None => Ok(None),
    }
}

/// Looks a user up by id alone, without an org filter. Used only by the
/// request envelope (§4.E step 5), which must distinguish "no such user"
/// (unauthenticated) from "user exists but belongs to a different org"
/// (forbidden) — every other caller in this workspace goes through the
/// org-scoped `get` above so cross-tenant reads fail closed as NotFound.
pub fn get_by_id_unscoped(conn: &Connection, id: &UserId) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![id.as_str()], row_to_user)?;
    match rows.next() {
        Some(r) => Ok(Some(r?)),
        None => Ok(None),
    }
}

pub fn get_by_email(conn: &Connection, org_id: &OrgId, email: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE org_id = ?1 AND email = ?2");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![org_id.as_str(), email], row_to_user)?;
    match rows.next() {
        Some(r) => Ok(Some(r?)),
        None => Ok(None),
    }
}

pub fn list_by_org(conn: &Connection, org_id: &OrgId) -> Result<Vec<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE org_id = ?1 ORDER BY created_at");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![org_id.as_str()], row_to_user)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn update_role(conn: &Connection, org_id: &OrgId, id: &UserId, role: Role) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE users SET role = ?3, updated_at = ?4 WHERE id = ?1 AND org_id = ?2",
        params![id.as_str(), org_id.as_str(), role.to_string(), now],
    )?;
    if rows == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}
