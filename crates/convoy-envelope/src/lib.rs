pub mod permission;

use convoy_core::error::ApiError;
use convoy_core::ids::{CorrelationId, OrgId, UserId};
use convoy_core::role::Role;
use convoy_repository::Repository;
use serde::Serialize;
use tracing::warn;

pub use permission::{check as check_permission, Permission, PermissionCheck};

/// Minimal header lookup this crate needs — kept as a trait rather than
/// depending on axum's `HeaderMap` directly, so `envelope` stays
/// framework-agnostic the way `skynet-agent::pipeline::context::
/// MessageContext` stays channel-agnostic. The gateway crate's
/// `envelope_ext.rs` is the only place that bridges `axum::http::HeaderMap`
/// into this trait.
pub trait HeaderLookup {
    fn get(&self, name: &str) -> Option<&str>;
}

pub const ORG_HEADER: &str = "x-org-id";
pub const USER_HEADER: &str = "x-user-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Identity attached to a request once the envelope resolves it (§4.E step 6).
#[derive(Debug, Clone, Serialize)]
pub struct RequestIdentity {
    pub user_id: UserId,
    pub org_id: OrgId,
    pub role: Role,
    pub email: String,
}

/// Reads `x-request-id` if present, else mints a fresh one (§4.E step 1).
pub fn correlation_id<H: HeaderLookup>(headers: &H) -> CorrelationId {
    CorrelationId::from_header_value(headers.get(REQUEST_ID_HEADER))
}

/// Implements §4.E steps 2-6.
///
/// - `public = true`: headers optional. Present-and-valid -> `Some(identity)`;
///   absent or invalid -> `Ok(None)`, request proceeds anonymously.
/// - `public = false`: both headers required; missing -> `Unauthenticated`.
///   User lookup miss -> `Unauthenticated`. Org header mismatching the
///   user's actual org -> `Forbidden` (this is the one place a mismatch is
///   Forbidden rather than NotFound — no *entity* existence is disclosed
///   here, only whether the caller's own identity headers agree with each
///   other).
pub fn resolve_identity<H: HeaderLookup>(
    repo: &Repository,
    headers: &H,
    public: bool,
) -> Result<Option<RequestIdentity>, ApiError> {
    let org_header = headers.get(ORG_HEADER);
    let user_header = headers.get(USER_HEADER);

    let (org_raw, user_raw) = match (org_header, user_header) {
        (Some(o), Some(u)) if !o.trim().is_empty() && !u.trim().is_empty() => (o, u),
        _ if public => return Ok(None),
        _ => return Err(ApiError::Unauthenticated),
    };

    let org_id = OrgId::from(org_raw);
    let user_id = UserId::from(user_raw);

    let user = repo
        .with_conn(|c| convoy_repository::users::get_by_id_unscoped(c, &user_id))
        .map_err(ApiError::from)?;

    let user = match user {
        Some(u) => u,
        None => {
            if public {
                return Ok(None);
            }
            return Err(ApiError::Unauthenticated);
        }
    };

    if user.org_id.as_str() != org_id.as_str() {
        warn!(%user_id, claimed_org = %org_id, actual_org = %user.org_id, "org header mismatch");
        if public {
            return Ok(None);
        }
        return Err(ApiError::Forbidden(
            "organization header does not match user's organization".to_string(),
        ));
    }

    Ok(Some(RequestIdentity {
        user_id,
        org_id,
        role: user.role,
        email: user.email,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::role::Role;
    use rusqlite::Connection;
    use std::collections::HashMap;

    struct FakeHeaders(HashMap<&'static str, &'static str>);

    impl HeaderLookup for FakeHeaders {
        fn get(&self, name: &str) -> Option<&str> {
            self.0.get(name).copied()
        }
    }

    fn setup() -> (Repository, OrgId, UserId) {
        let repo = Repository::new(Connection::open_in_memory().unwrap()).unwrap();
        let org = repo
            .with_conn(|c| convoy_repository::organizations::create(c, "Acme", "acme"))
            .unwrap();
        let user = repo
            .with_conn(|c| {
                convoy_repository::users::create(c, &org.id, "a@acme.com", "A", Role::Owner)
            })
            .unwrap();
        (repo, org.id, user.id)
    }

    #[test]
    fn protected_missing_headers_is_unauthenticated() {
        let (repo, _org, _user) = setup();
        let headers = FakeHeaders(HashMap::new());
        let err = resolve_identity(&repo, &headers, false).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));
    }

    #[test]
    fn public_missing_headers_is_anonymous() {
        let (repo, _org, _user) = setup();
        let headers = FakeHeaders(HashMap::new());
        let identity = resolve_identity(&repo, &headers, true).unwrap();
        assert!(identity.is_none());
    }

    #[test]
    fn valid_headers_resolve_identity() {
        let (repo, org, user) = setup();
        let mut map = HashMap::new();
        let org_s: &'static str = Box::leak(org.as_str().to_string().into_boxed_str());
        let user_s: &'static str = Box::leak(user.as_str().to_string().into_boxed_str());
        map.insert(ORG_HEADER, org_s);
        map.insert(USER_HEADER, user_s);
        let headers = FakeHeaders(map);
        let identity = resolve_identity(&repo, &headers, false).unwrap().unwrap();
        assert_eq!(identity.org_id.as_str(), org.as_str());
        assert_eq!(identity.role, Role::Owner);
    }

    #[test]
    fn org_mismatch_is_forbidden() {
        let (repo, _org, user) = setup();
        let other_org = repo
            .with_conn(|c| convoy_repository::organizations::create(c, "Other", "other"))
            .unwrap();
        let mut map = HashMap::new();
        let org_s: &'static str = Box::leak(other_org.id.as_str().to_string().into_boxed_str());
        let user_s: &'static str = Box::leak(user.as_str().to_string().into_boxed_str());
        map.insert(ORG_HEADER, org_s);
        map.insert(USER_HEADER, user_s);
        let headers = FakeHeaders(map);
        let err = resolve_identity(&repo, &headers, false).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }
}
