/// Scope resolver: maps a signed-in identity to the rows it may see
///
/// Resolution is a pure function of the session identity. Each role is
/// bound to one hierarchy column:
///
/// | role               | filter                                       |
/// |--------------------|----------------------------------------------|
/// | super_admin        | everything                                   |
/// | national_admin     | own organization and `province_id`           |
/// | diocese_admin      | own organization and `diocese_id`            |
/// | archdeaconry_admin | own organization and `archdeaconry_id`       |
/// | deanery_admin      | own organization and `deanery_id`            |
/// | parish_admin       | own organization and `parish_id`             |
/// | member             | own row only                                 |
///
/// An administrator whose own hierarchy id is missing gets `FALSE`: an empty
/// result, never an error.
///
/// # Example
///
/// ```
/// use ecclesia_shared::auth::scope::{resolve_scope, Identity};
/// use ecclesia_shared::models::hierarchy::HierarchyIds;
/// use ecclesia_shared::models::user::RoleLevel;
/// use uuid::Uuid;
///
/// let identity = Identity {
///     user_id: Uuid::new_v4(),
///     organization_id: Uuid::new_v4(),
///     role: RoleLevel::ParishAdmin,
///     hierarchy: HierarchyIds { parish_id: Some(Uuid::new_v4()), ..Default::default() },
/// };
///
/// let filter = resolve_scope(&identity).to_sql("u", 1);
/// assert_eq!(filter.clause, "(u.organization_id = $1 AND u.parish_id = $2)");
/// assert_eq!(filter.binds.len(), 2);
/// assert_eq!(filter.next_placeholder(), 3);
/// ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::hierarchy::{HierarchyIds, HierarchyLevel};
use crate::models::user::{RoleLevel, User};

/// Who is asking: the identity carried by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: RoleLevel,
    pub hierarchy: HierarchyIds,
}

impl Identity {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            organization_id: user.organization_id,
            role: user.role_level,
            hierarchy: user.hierarchy(),
        }
    }

    pub fn scope(&self) -> Scope {
        resolve_scope(self)
    }
}

/// Resolved visibility of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// No restriction (super_admin)
    Everything,

    /// Members of one organization under one hierarchy node
    ///
    /// `node_id` is None when the administrator's own id at `level` is
    /// missing; nothing is visible then.
    Jurisdiction {
        organization_id: Uuid,
        level: HierarchyLevel,
        node_id: Option<Uuid>,
    },

    /// Only the caller's own row
    SelfOnly { organization_id: Uuid, user_id: Uuid },
}

/// SQL fragment plus its positional parameters
///
/// `clause` references placeholders `$first..$first + binds.len() - 1`
/// which must be bound in order before any later parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFilter {
    pub clause: String,
    pub binds: Vec<Uuid>,
    first_placeholder: usize,
}

impl ScopeFilter {
    /// Number of the first placeholder after the scope's own
    pub fn next_placeholder(&self) -> usize {
        self.first_placeholder + self.binds.len()
    }

    /// Whether the filter can never match
    pub fn is_empty(&self) -> bool {
        self.clause == "FALSE"
    }
}

/// Hierarchy column an administrator role is bound to
pub fn role_level_column(role: RoleLevel) -> Option<HierarchyLevel> {
    match role {
        RoleLevel::NationalAdmin => Some(HierarchyLevel::Province),
        RoleLevel::DioceseAdmin => Some(HierarchyLevel::Diocese),
        RoleLevel::ArchdeaconryAdmin => Some(HierarchyLevel::Archdeaconry),
        RoleLevel::DeaneryAdmin => Some(HierarchyLevel::Deanery),
        RoleLevel::ParishAdmin => Some(HierarchyLevel::Parish),
        RoleLevel::SuperAdmin | RoleLevel::Member => None,
    }
}

/// Resolves the scope of an identity
pub fn resolve_scope(identity: &Identity) -> Scope {
    if identity.role.is_super_admin() {
        return Scope::Everything;
    }

    match role_level_column(identity.role) {
        Some(level) => Scope::Jurisdiction {
            organization_id: identity.organization_id,
            level,
            node_id: identity.hierarchy.at(level),
        },
        None => Scope::SelfOnly {
            organization_id: identity.organization_id,
            user_id: identity.user_id,
        },
    }
}

impl Scope {
    /// Builds the WHERE fragment for rows of `users` aliased as `alias`
    pub fn to_sql(&self, alias: &str, first_placeholder: usize) -> ScopeFilter {
        let n = first_placeholder;
        let (clause, binds) = match *self {
            Scope::Everything => ("TRUE".to_string(), Vec::new()),
            Scope::Jurisdiction {
                organization_id,
                level,
                node_id: Some(node_id),
            } => (
                format!(
                    "({a}.organization_id = ${n} AND {a}.{col} = ${m})",
                    a = alias,
                    col = level.foreign_key(),
                    n = n,
                    m = n + 1
                ),
                vec![organization_id, node_id],
            ),
            Scope::Jurisdiction { node_id: None, .. } => ("FALSE".to_string(), Vec::new()),
            Scope::SelfOnly {
                organization_id,
                user_id,
            } => (
                format!(
                    "({a}.organization_id = ${n} AND {a}.id = ${m})",
                    a = alias,
                    n = n,
                    m = n + 1
                ),
                vec![organization_id, user_id],
            ),
        };

        ScopeFilter {
            clause,
            binds,
            first_placeholder,
        }
    }

    /// Tenant restriction for tenant-level resources (events, campaigns)
    ///
    /// None means unrestricted.
    pub fn organization_id(&self) -> Option<Uuid> {
        match *self {
            Scope::Everything => None,
            Scope::Jurisdiction {
                organization_id, ..
            }
            | Scope::SelfOnly {
                organization_id, ..
            } => Some(organization_id),
        }
    }

    /// In-memory mirror of [`Scope::to_sql`]
    pub fn contains_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        hierarchy: &HierarchyIds,
    ) -> bool {
        match *self {
            Scope::Everything => true,
            Scope::Jurisdiction {
                organization_id: org,
                level,
                node_id: Some(node_id),
            } => org == organization_id && hierarchy.at(level) == Some(node_id),
            Scope::Jurisdiction { node_id: None, .. } => false,
            Scope::SelfOnly {
                organization_id: org,
                user_id: own,
            } => org == organization_id && own == user_id,
        }
    }

    pub fn contains(&self, user: &User) -> bool {
        self.contains_member(user.organization_id, user.id, &user.hierarchy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: RoleLevel, hierarchy: HierarchyIds) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            role,
            hierarchy,
        }
    }

    fn full_chain() -> HierarchyIds {
        HierarchyIds {
            province_id: Some(Uuid::new_v4()),
            diocese_id: Some(Uuid::new_v4()),
            archdeaconry_id: Some(Uuid::new_v4()),
            deanery_id: Some(Uuid::new_v4()),
            parish_id: Some(Uuid::new_v4()),
        }
    }

    #[test]
    fn test_super_admin_sees_everything() {
        let id = identity(RoleLevel::SuperAdmin, HierarchyIds::default());
        let scope = resolve_scope(&id);
        assert_eq!(scope, Scope::Everything);

        let filter = scope.to_sql("u", 4);
        assert_eq!(filter.clause, "TRUE");
        assert!(filter.binds.is_empty());
        assert_eq!(filter.next_placeholder(), 4);
        assert_eq!(scope.organization_id(), None);
    }

    #[test]
    fn test_each_admin_role_uses_its_column() {
        let cases = [
            (RoleLevel::NationalAdmin, "province_id"),
            (RoleLevel::DioceseAdmin, "diocese_id"),
            (RoleLevel::ArchdeaconryAdmin, "archdeaconry_id"),
            (RoleLevel::DeaneryAdmin, "deanery_id"),
            (RoleLevel::ParishAdmin, "parish_id"),
        ];

        for (role, column) in cases {
            let chain = full_chain();
            let id = identity(role, chain);
            let filter = resolve_scope(&id).to_sql("m", 2);

            assert_eq!(
                filter.clause,
                format!("(m.organization_id = $2 AND m.{} = $3)", column)
            );
            assert_eq!(filter.binds[0], id.organization_id);
            assert_eq!(Some(filter.binds[1]), chain.at(role_level_column(role).unwrap()));
        }
    }

    #[test]
    fn test_missing_hierarchy_id_means_no_access() {
        let mut chain = full_chain();
        chain.deanery_id = None;
        let id = identity(RoleLevel::DeaneryAdmin, chain);
        let scope = resolve_scope(&id);

        let filter = scope.to_sql("u", 1);
        assert_eq!(filter.clause, "FALSE");
        assert!(filter.is_empty());
        assert_eq!(filter.next_placeholder(), 1);
        assert!(!scope.contains_member(id.organization_id, id.user_id, &chain));
    }

    #[test]
    fn test_member_sees_only_self() {
        let id = identity(RoleLevel::Member, full_chain());
        let scope = resolve_scope(&id);

        let filter = scope.to_sql("u", 1);
        assert_eq!(filter.clause, "(u.organization_id = $1 AND u.id = $2)");
        assert_eq!(filter.binds, vec![id.organization_id, id.user_id]);

        assert!(scope.contains_member(id.organization_id, id.user_id, &id.hierarchy));
        assert!(!scope.contains_member(id.organization_id, Uuid::new_v4(), &id.hierarchy));
    }

    #[test]
    fn test_jurisdiction_is_tenant_bound() {
        let chain = full_chain();
        let id = identity(RoleLevel::DioceseAdmin, chain);
        let scope = resolve_scope(&id);

        let same_diocese = HierarchyIds {
            diocese_id: chain.diocese_id,
            ..Default::default()
        };
        assert!(scope.contains_member(id.organization_id, Uuid::new_v4(), &same_diocese));
        assert!(!scope.contains_member(Uuid::new_v4(), Uuid::new_v4(), &same_diocese));

        let other_diocese = HierarchyIds {
            diocese_id: Some(Uuid::new_v4()),
            ..chain
        };
        assert!(!scope.contains_member(id.organization_id, Uuid::new_v4(), &other_diocese));
        assert_eq!(scope.organization_id(), Some(id.organization_id));
    }
}
