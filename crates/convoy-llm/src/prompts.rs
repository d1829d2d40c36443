use std::time::Instant;

use rusqlite::Connection;
use tracing::warn;

use convoy_core::error::ApiError;
use convoy_core::ids::PromptId;
use convoy_core::role::Role;
use convoy_envelope::permission::{self, Permission};
use convoy_repository::types::Prompt;

/// Thin wrapper over `convoy_repository`'s prompt operations that applies
/// the role-gated `Permission::{CreatePrompt, ActivatePrompt}` check before
/// the repository call, and falls back to the built-in system prompt when
/// no active row exists for a name (§4.G, Module L).
pub struct PromptRegistry;

impl PromptRegistry {
    /// Resolves the prompt content to use for `name`: the active row if one
    /// exists, else the built-in fallback (logged, never an error — a
    /// missing prompt must never take down a chat turn).
    pub fn resolve_active(conn: &Connection, name: &str) -> Result<String, ApiError> {
        match convoy_repository::prompts::get_active(conn, name)? {
            Some(prompt) => Ok(prompt.content),
            None => {
                warn!(prompt_name = name, "no active prompt found, using fallback system prompt");
                Ok(crate::FALLBACK_SYSTEM_PROMPT.to_string())
            }
        }
    }

    pub fn create_version(
        conn: &mut Connection,
        role: Role,
        name: &str,
        content: &str,
        created_by: &str,
    ) -> Result<Prompt, ApiError> {
        match permission::check(role, Permission::CreatePrompt) {
            permission::PermissionCheck::Denied { reason } => {
                return Err(ApiError::Forbidden(reason));
            }
            permission::PermissionCheck::Allowed => {}
        }
        Ok(convoy_repository::prompts::create_version(conn, name, content, created_by)?)
    }

    pub fn activate_version(
        conn: &mut Connection,
        role: Role,
        name: &str,
        version: u32,
    ) -> Result<(), ApiError> {
        match permission::check(role, Permission::ActivatePrompt) {
            permission::PermissionCheck::Denied { reason } => {
                return Err(ApiError::Forbidden(reason));
            }
            permission::PermissionCheck::Allowed => {}
        }
        convoy_repository::prompts::activate_version(conn, name, version)?;
        Ok(())
    }

    pub fn list_versions(conn: &Connection, name: &str) -> Result<Vec<Prompt>, ApiError> {
        Ok(convoy_repository::prompts::list_versions(conn, name)?)
    }

    pub fn record_invocation(
        conn: &Connection,
        id: &PromptId,
        tokens: u32,
        started_at: Instant,
    ) -> Result<(), ApiError> {
        let latency_ms = started_at.elapsed().as_millis() as u64;
        Ok(convoy_repository::prompts::record_invocation(conn, id, tokens, latency_ms)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_repository::db;

    fn setup() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        db::init_db(&conn).unwrap();
        conn
    }

    #[test]
    fn member_cannot_create_prompt() {
        let mut conn = setup();
        let err = PromptRegistry::create_version(&mut conn, Role::Member, "greeting", "hi", "u1")
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn admin_can_create_and_activate() {
        let mut conn = setup();
        let prompt =
            PromptRegistry::create_version(&mut conn, Role::Admin, "greeting", "hi", "u1").unwrap();
        assert_eq!(prompt.version, 1);
        assert!(prompt.active);
        PromptRegistry::activate_version(&mut conn, Role::Admin, "greeting", 1).unwrap();
    }

    #[test]
    fn resolve_active_falls_back_when_missing() {
        let conn = setup();
        let content = PromptRegistry::resolve_active(&conn, "does-not-exist").unwrap();
        assert_eq!(content, crate::FALLBACK_SYSTEM_PROMPT);
    }
}
