/// Role checks and the rules for changing another member's role or status
///
/// Every check is a pure function of the caller's [`Identity`] and, for
/// member management, the target [`User`]. Each error maps to a short
/// machine-readable reason used by the access-denied page.
///
/// # Role change rules
///
/// 1. Only administrators may change roles.
/// 2. Nobody changes their own role, except a super admin.
/// 3. Only a super admin grants `super_admin`.
/// 4. Nobody grants a role wider than their own.
/// 5. The target must be inside the caller's scope.
/// 6. A target ranked above the caller cannot be changed.
///
/// # Example
///
/// ```no_run
/// use ecclesia_shared::auth::authorization::{check_role_change, require_admin};
/// use ecclesia_shared::auth::scope::Identity;
/// use ecclesia_shared::models::user::{RoleLevel, User};
///
/// fn promote(actor: &Identity, target: &User) -> Result<(), String> {
///     require_admin(actor).map_err(|e| e.to_string())?;
///     check_role_change(actor, target, RoleLevel::ParishAdmin).map_err(|e| e.to_string())
/// }
/// ```

use super::scope::Identity;
use crate::models::user::{RoleLevel, User};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    #[error("Administrator access required")]
    AdminRequired,

    #[error("Super administrator access required")]
    SuperAdminRequired,

    #[error("Requires {} access or higher", required.label())]
    InsufficientRole {
        required: RoleLevel,
        actual: RoleLevel,
    },

    #[error("You cannot change your own role")]
    SelfRoleChange,

    #[error("Only a super administrator can grant super administrator access")]
    SuperAdminGrant,

    #[error("You cannot grant a role above your own")]
    RoleAboveOwn,

    #[error("This member is outside your jurisdiction")]
    OutOfScope,

    #[error("You cannot change your own account status")]
    SelfStatusChange,

    #[error("You cannot manage an administrator ranked above you")]
    TargetOutranks,
}

impl AuthzError {
    /// Reason code passed to the access-denied page
    pub fn reason(&self) -> &'static str {
        match self {
            AuthzError::AdminRequired => "admin_required",
            AuthzError::SuperAdminRequired => "super_admin_required",
            AuthzError::InsufficientRole { .. } => "insufficient_role",
            AuthzError::SelfRoleChange => "self_role_change",
            AuthzError::SuperAdminGrant => "super_admin_grant",
            AuthzError::RoleAboveOwn => "role_above_own",
            AuthzError::OutOfScope => "out_of_scope",
            AuthzError::SelfStatusChange => "self_status_change",
            AuthzError::TargetOutranks => "target_outranks",
        }
    }
}

/// Any administrative role
pub fn require_admin(identity: &Identity) -> Result<(), AuthzError> {
    if identity.role.is_admin() {
        Ok(())
    } else {
        Err(AuthzError::AdminRequired)
    }
}

pub fn require_super_admin(identity: &Identity) -> Result<(), AuthzError> {
    if identity.role.is_super_admin() {
        Ok(())
    } else {
        Err(AuthzError::SuperAdminRequired)
    }
}

/// The caller's role is `required` or wider
pub fn require_role_at_least(identity: &Identity, required: RoleLevel) -> Result<(), AuthzError> {
    if identity.role.has_permission(&required) {
        Ok(())
    } else {
        Err(AuthzError::InsufficientRole {
            required,
            actual: identity.role,
        })
    }
}

/// Validates changing `target`'s role to `new_role`
pub fn check_role_change(
    actor: &Identity,
    target: &User,
    new_role: RoleLevel,
) -> Result<(), AuthzError> {
    require_admin(actor)?;

    let super_admin = actor.role.is_super_admin();

    if actor.user_id == target.id && !super_admin {
        return Err(AuthzError::SelfRoleChange);
    }
    if new_role.is_super_admin() && !super_admin {
        return Err(AuthzError::SuperAdminGrant);
    }
    if new_role.rank() > actor.role.rank() {
        return Err(AuthzError::RoleAboveOwn);
    }
    if !actor.scope().contains(target) {
        return Err(AuthzError::OutOfScope);
    }
    if !super_admin && target.role_level.rank() > actor.role.rank() {
        return Err(AuthzError::TargetOutranks);
    }

    Ok(())
}

/// Validates changing `target`'s account status
pub fn check_status_change(actor: &Identity, target: &User) -> Result<(), AuthzError> {
    require_admin(actor)?;

    if actor.user_id == target.id {
        return Err(AuthzError::SelfStatusChange);
    }
    if !actor.scope().contains(target) {
        return Err(AuthzError::OutOfScope);
    }
    if !actor.role.is_super_admin() && target.role_level.rank() > actor.role.rank() {
        return Err(AuthzError::TargetOutranks);
    }

    Ok(())
}
