pub mod chats;
pub mod chunks;
pub mod db;
pub mod documents;
pub mod error;
pub mod messages;
pub mod organizations;
pub mod prompts;
pub mod summaries;
pub mod types;
pub mod users;

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::Result;

/// Thin handle around the shared SQLite connection. rusqlite::Connection is
/// `Send` but not `Sync`, so every caller that needs concurrent access goes
/// through this mutex rather than holding the connection directly.
#[derive(Clone)]
pub struct Repository {
    conn: Arc<Mutex<Connection>>,
}

impl Repository {
    pub fn new(conn: Connection) -> Result<Self> {
        db::init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_shared(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Run a closure with a locked read/write connection. Kept deliberately
    /// simple — one connection, one lock — matching the single-writer
    /// SQLite model every crate in this workspace already assumes.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    /// Same as `with_conn` but exposes `&mut Connection` for callers that
    /// need `conn.transaction()` (prompt activation, cascading deletes).
    pub fn with_conn_mut<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().unwrap();
        f(&mut conn)
    }

    pub fn shared_connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageRole;

    fn test_repo() -> Repository {
        Repository::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn organization_roundtrip() {
        let repo = test_repo();
        let org = repo
            .with_conn(|c| organizations::create(c, "Acme", "acme"))
            .unwrap();
        let fetched = repo.with_conn(|c| organizations::get(c, &org.id)).unwrap();
        assert_eq!(fetched.unwrap().slug, "acme");
    }

    #[test]
    fn cross_tenant_chat_lookup_returns_none() {
        let repo = test_repo();
        let org_a = repo
            .with_conn(|c| organizations::create(c, "A", "a"))
            .unwrap();
        let org_b = repo
            .with_conn(|c| organizations::create(c, "B", "b"))
            .unwrap();
        let user_a = repo
            .with_conn(|c| users::create(c, &org_a.id, "a@a.com", "A", convoy_core::role::Role::Owner))
            .unwrap();
        let chat = repo
            .with_conn(|c| chats::create(c, &org_a.id, &user_a.id, "hello"))
            .unwrap();

        let from_other_org = repo.with_conn(|c| chats::get(c, &org_b.id, &chat.id)).unwrap();
        assert!(from_other_org.is_none());

        let from_owning_org = repo.with_conn(|c| chats::get(c, &org_a.id, &chat.id)).unwrap();
        assert!(from_owning_org.is_some());
    }

    #[test]
    fn prompt_activation_is_exclusive() {
        let repo = test_repo();
        let v1 = repo
            .with_conn_mut(|c| prompts::create_version(c, "system", "v1", "tester"))
            .unwrap();
        assert!(v1.active);
        let v2 = repo
            .with_conn_mut(|c| prompts::create_version(c, "system", "v2", "tester"))
            .unwrap();
        assert!(!v2.active);

        repo.with_conn_mut(|c| prompts::activate_version(c, "system", 2))
            .unwrap();
        let active = repo.with_conn(|c| prompts::get_active(c, "system")).unwrap();
        assert_eq!(active.unwrap().version, 2);

        let err = repo.with_conn_mut(|c| prompts::activate_version(c, "system", 99));
        assert!(err.is_err());
    }

    #[test]
    fn chat_soft_delete_cascades_messages() {
        let repo = test_repo();
        let org = repo.with_conn(|c| organizations::create(c, "A", "a")).unwrap();
        let user = repo
            .with_conn(|c| users::create(c, &org.id, "a@a.com", "A", convoy_core::role::Role::Owner))
            .unwrap();
        let chat = repo
            .with_conn(|c| chats::create(c, &org.id, &user.id, "hi"))
            .unwrap();
        repo.with_conn(|c| messages::append(c, &chat.id, MessageRole::User, "hi", Some(2)))
            .unwrap();

        repo.with_conn_mut(|c| chats::soft_delete(c, &org.id, &chat.id))
            .unwrap();

        let remaining = repo.with_conn(|c| messages::list_for_chat(c, &chat.id)).unwrap();
        assert!(remaining.is_empty());
        let fetched = repo.with_conn(|c| chats::get(c, &org.id, &chat.id)).unwrap();
        assert!(fetched.is_none());
    }
}
