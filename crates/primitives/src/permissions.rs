//! Role, group and privilege assignments.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::image::Image;
use crate::update::Domain;

/// Pseudo-object whose removals apply to every object (dropping a role).
pub const ALL_AUTHZ_OBJ: &str = "__ALL_AUTHZ_OBJ__";
/// Role wildcard: removing it from an object strips every role (dropping a privilege).
pub const ALL_ROLES: &str = "__ALL_ROLES__";
/// Group wildcard: removing it from a role strips every group.
pub const ALL_GROUPS: &str = "__ALL_GROUPS__";
/// Pseudo-object carrying an object rename: `new → new` added, `old → old` removed.
pub const RENAME_PRIVS: &str = "__RENAME_PRIV__";

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PermissionsUpdate {
    #[serde(default)]
    pub privileges: Vec<PrivilegeChange>,
    #[serde(default)]
    pub roles: Vec<RoleChange>,
}

/// Role → actions granted or revoked on one object.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PrivilegeChange {
    pub object: String,
    #[serde(default)]
    pub added: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub removed: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RoleChange {
    pub role: String,
    #[serde(default)]
    pub added_groups: BTreeSet<String>,
    #[serde(default)]
    pub removed_groups: BTreeSet<String>,
}

impl PermissionsUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the privilege change for `object`, creating it on first use.
    pub fn privilege(&mut self, object: impl Into<String>) -> &mut PrivilegeChange {
        let object = object.into();

        let idx = match self.privileges.iter().position(|c| c.object == object) {
            Some(idx) => idx,
            None => {
                self.privileges.push(PrivilegeChange::new(object));
                self.privileges.len() - 1
            }
        };

        &mut self.privileges[idx]
    }

    /// Returns the group change for `role`, creating it on first use.
    pub fn role(&mut self, role: impl Into<String>) -> &mut RoleChange {
        let role = role.into();

        let idx = match self.roles.iter().position(|c| c.role == role) {
            Some(idx) => idx,
            None => {
                self.roles.push(RoleChange::new(role));
                self.roles.len() - 1
            }
        };

        &mut self.roles[idx]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.privileges
            .iter()
            .all(|c| c.added.is_empty() && c.removed.is_empty())
            && self
                .roles
                .iter()
                .all(|c| c.added_groups.is_empty() && c.removed_groups.is_empty())
    }
}

impl PrivilegeChange {
    #[must_use]
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            added: BTreeMap::new(),
            removed: BTreeMap::new(),
        }
    }

    pub fn grant(&mut self, role: impl Into<String>, action: impl Into<String>) -> &mut Self {
        let _ = self
            .added
            .entry(role.into())
            .or_default()
            .insert(action.into());
        self
    }

    pub fn revoke(&mut self, role: impl Into<String>, action: impl Into<String>) -> &mut Self {
        let _ = self
            .removed
            .entry(role.into())
            .or_default()
            .insert(action.into());
        self
    }
}

impl RoleChange {
    #[must_use]
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            added_groups: BTreeSet::new(),
            removed_groups: BTreeSet::new(),
        }
    }

    pub fn add_group(&mut self, group: impl Into<String>) -> &mut Self {
        let _ = self.added_groups.insert(group.into());
        self
    }

    pub fn remove_group(&mut self, group: impl Into<String>) -> &mut Self {
        let _ = self.removed_groups.insert(group.into());
        self
    }
}

/// Current privilege and role membership state.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PermissionsImage {
    privileges: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
    roles: BTreeMap<String, BTreeSet<String>>,
}

impl PermissionsImage {
    /// Actions `role` holds on `object`.
    #[must_use]
    pub fn actions(&self, object: &str, role: &str) -> Option<&BTreeSet<String>> {
        self.privileges.get(object)?.get(role)
    }

    /// Roles holding any action on `object`.
    pub fn roles_on(&self, object: &str) -> impl Iterator<Item = &str> {
        self.privileges
            .get(object)
            .into_iter()
            .flat_map(|roles| roles.keys().map(String::as_str))
    }

    #[must_use]
    pub fn groups(&self, role: &str) -> Option<&BTreeSet<String>> {
        self.roles.get(role)
    }

    pub fn objects(&self) -> impl Iterator<Item = &str> {
        self.privileges.keys().map(String::as_str)
    }

    fn apply_privilege(&mut self, change: &PrivilegeChange) {
        match change.object.as_str() {
            RENAME_PRIVS => {
                let old = change.removed.keys().next();
                let new = change.added.keys().next();

                if let (Some(old), Some(new)) = (old, new) {
                    if let Some(roles) = self.privileges.remove(old) {
                        let _ = self.privileges.insert(new.clone(), roles);
                    }
                }
            }
            ALL_AUTHZ_OBJ => {
                for role in change.removed.keys() {
                    for roles in self.privileges.values_mut() {
                        let _ = roles.remove(role);
                    }
                }
                self.privileges.retain(|_, roles| !roles.is_empty());
            }
            object => {
                if change.removed.contains_key(ALL_ROLES) {
                    let _ = self.privileges.remove(object);
                } else if let Some(roles) = self.privileges.get_mut(object) {
                    for (role, actions) in &change.removed {
                        if let Some(held) = roles.get_mut(role) {
                            held.retain(|a| !actions.contains(a));
                        }
                    }
                    roles.retain(|_, held| !held.is_empty());
                }

                for (role, actions) in &change.added {
                    self.privileges
                        .entry(object.to_owned())
                        .or_default()
                        .entry(role.clone())
                        .or_default()
                        .extend(actions.iter().cloned());
                }

                if self
                    .privileges
                    .get(object)
                    .is_some_and(BTreeMap::is_empty)
                {
                    let _ = self.privileges.remove(object);
                }
            }
        }
    }

    fn apply_role(&mut self, change: &RoleChange) {
        if change.removed_groups.contains(ALL_GROUPS) {
            let _ = self.roles.remove(&change.role);
        } else if let Some(groups) = self.roles.get_mut(&change.role) {
            groups.retain(|g| !change.removed_groups.contains(g));
        }

        if !change.added_groups.is_empty() {
            self.roles
                .entry(change.role.clone())
                .or_default()
                .extend(change.added_groups.iter().cloned());
        }

        if self.roles.get(&change.role).is_some_and(BTreeSet::is_empty) {
            let _ = self.roles.remove(&change.role);
        }
    }
}

impl Image for PermissionsImage {
    type Payload = PermissionsUpdate;

    const DOMAIN: Domain = Domain::Permissions;

    fn apply(&mut self, payload: &PermissionsUpdate) {
        for change in &payload.privileges {
            self.apply_privilege(change);
        }

        for change in &payload.roles {
            self.apply_role(change);
        }
    }

    fn snapshot(&self) -> PermissionsUpdate {
        let privileges = self
            .privileges
            .iter()
            .map(|(object, roles)| PrivilegeChange {
                object: object.clone(),
                added: roles.clone(),
                removed: BTreeMap::new(),
            })
            .collect();

        let roles = self
            .roles
            .iter()
            .map(|(role, groups)| RoleChange {
                role: role.clone(),
                added_groups: groups.clone(),
                removed_groups: BTreeSet::new(),
            })
            .collect();

        PermissionsUpdate { privileges, roles }
    }
}
