// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # RBAC Policy
//!
//! Role-based authorization for control-plane operations. Evaluation is
//! pure and deterministic: explicit deny > role grant > default deny.
//! Mutation methods return a new `Policy`; the engine never mutates in
//! place, so an evaluation racing a rebind sees a consistent snapshot.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Granular permission over a control-plane operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Deploy,
    Rollback,
    HealRestart,
    HealRebuild,
    View,
}

impl Permission {
    pub const ALL: [Permission; 5] = [
        Permission::Deploy,
        Permission::Rollback,
        Permission::HealRestart,
        Permission::HealRebuild,
        Permission::View,
    ];
}

/// Result of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

/// Immutable RBAC policy: named roles, subject bindings, explicit denies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    roles: BTreeMap<String, BTreeSet<Permission>>,
    bindings: BTreeMap<String, BTreeSet<String>>,
    denies: BTreeSet<(String, Permission)>,
}

impl Policy {
    pub fn empty() -> Self {
        Self {
            roles: BTreeMap::new(),
            bindings: BTreeMap::new(),
            denies: BTreeSet::new(),
        }
    }

    /// Policy seeded with the built-in roles:
    /// `viewer` (view), `operator` (view, deploy, restart-healing),
    /// `admin` (everything).
    pub fn with_builtin_roles() -> Self {
        Self::empty()
            .define_role("viewer", [Permission::View])
            .define_role(
                "operator",
                [Permission::View, Permission::Deploy, Permission::HealRestart],
            )
            .define_role("admin", Permission::ALL)
    }

    pub fn define_role(
        mut self,
        name: impl Into<String>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        self.roles
            .insert(name.into(), permissions.into_iter().collect());
        self
    }

    pub fn bind(mut self, subject_id: impl Into<String>, role: impl Into<String>) -> Self {
        self.bindings
            .entry(subject_id.into())
            .or_default()
            .insert(role.into());
        self
    }

    pub fn deny(mut self, subject_id: impl Into<String>, permission: Permission) -> Self {
        self.denies.insert((subject_id.into(), permission));
        self
    }

    pub fn roles_of(&self, subject_id: &str) -> impl Iterator<Item = &str> {
        self.bindings
            .get(subject_id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Evaluate `subject_id` against `permission`.
    ///
    /// 1. An explicit `(subject, permission)` deny always wins.
    /// 2. Otherwise the union of the subject's role grants decides.
    /// 3. Unknown subjects and unmatched permissions default to DENY.
    pub fn authorize(&self, subject_id: &str, permission: Permission) -> Decision {
        if self
            .denies
            .contains(&(subject_id.to_string(), permission))
        {
            return Decision::Deny;
        }

        let granted = self
            .bindings
            .get(subject_id)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(|role| self.roles.get(role))
                    .any(|perms| perms.contains(&permission))
            })
            .unwrap_or(false);

        if granted {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_roles() {
        let policy = Policy::with_builtin_roles()
            .bind("viola", "viewer")
            .bind("oscar", "operator")
            .bind("ada", "admin");

        assert_eq!(policy.authorize("viola", Permission::View), Decision::Allow);
        assert_eq!(policy.authorize("viola", Permission::Deploy), Decision::Deny);

        assert_eq!(policy.authorize("oscar", Permission::Deploy), Decision::Allow);
        assert_eq!(
            policy.authorize("oscar", Permission::HealRestart),
            Decision::Allow
        );
        assert_eq!(
            policy.authorize("oscar", Permission::HealRebuild),
            Decision::Deny
        );

        for permission in Permission::ALL {
            assert_eq!(policy.authorize("ada", permission), Decision::Allow);
        }
    }

    #[test]
    fn test_explicit_deny_dominates_grant() {
        let policy = Policy::with_builtin_roles()
            .bind("ada", "admin")
            .deny("ada", Permission::Rollback);

        assert_eq!(policy.authorize("ada", Permission::Rollback), Decision::Deny);
        // Unrelated permissions are unaffected.
        assert_eq!(policy.authorize("ada", Permission::Deploy), Decision::Allow);
    }

    #[test]
    fn test_unknown_subject_defaults_to_deny() {
        let policy = Policy::with_builtin_roles();
        assert_eq!(policy.authorize("ghost", Permission::View), Decision::Deny);
    }

    #[test]
    fn test_union_across_multiple_roles() {
        let policy = Policy::with_builtin_roles()
            .define_role("releaser", [Permission::Rollback])
            .bind("kim", "viewer")
            .bind("kim", "releaser");

        assert_eq!(policy.authorize("kim", Permission::View), Decision::Allow);
        assert_eq!(policy.authorize("kim", Permission::Rollback), Decision::Allow);
        assert_eq!(policy.authorize("kim", Permission::Deploy), Decision::Deny);
    }

    #[test]
    fn test_mutations_return_new_policy() {
        let base = Policy::with_builtin_roles();
        let bound = base.clone().bind("viola", "viewer");
        assert_eq!(base.authorize("viola", Permission::View), Decision::Deny);
        assert_eq!(bound.authorize("viola", Permission::View), Decision::Allow);
    }
}
