use convoy_core::role::Role;

/// Capabilities gated by role, modeled on
/// `skynet_users::permissions::Permission` but trimmed to what this
/// workspace's role model (§3 "owner ≥ admin ≥ member") actually needs:
/// prompt administration (§4.L "only roles owner/admin may create or
/// activate").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    CreatePrompt,
    ActivatePrompt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionCheck {
    Allowed,
    Denied { reason: String },
}

/// Evaluate whether `role` may perform `permission`. A pure function (no
/// I/O), same shape as `PermissionChecker::check`, so the gateway/envelope
/// layer can gate prompt create/activate before the repository call is
/// made (§4.L "Enforcement lives in the request envelope's role check").
pub fn check(role: Role, permission: Permission) -> PermissionCheck {
    match permission {
        Permission::CreatePrompt | Permission::ActivatePrompt => {
            if role.is_admin_or_above() {
                PermissionCheck::Allowed
            } else {
                PermissionCheck::Denied {
                    reason: "owner or admin role required".to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_cannot_administer_prompts() {
        assert_eq!(
            check(Role::Member, Permission::CreatePrompt),
            PermissionCheck::Denied {
                reason: "owner or admin role required".to_string()
            }
        );
    }

    #[test]
    fn admin_and_owner_can() {
        assert_eq!(check(Role::Admin, Permission::CreatePrompt), PermissionCheck::Allowed);
        assert_eq!(check(Role::Owner, Permission::ActivatePrompt), PermissionCheck::Allowed);
    }
}
