//! Permission-change hooks, called after the policy store commits a change.
//!
//! Each hook records one [`PermissionsUpdate`] in the permissions domain so
//! downstream consumers can replay it.

use custos_primitives::permissions::{
    PermissionsUpdate, ALL_AUTHZ_OBJ, ALL_GROUPS, ALL_ROLES, RENAME_PRIVS,
};
use custos_primitives::Sequence;
use custos_store::{MetadataStore, StoreResult};
use strum::{AsRefStr, Display, EnumString};
use tracing::debug;

use crate::AuthzSyncService;

#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumString, Eq, PartialEq)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum PrivilegeScope {
    Server,
    Database,
    Table,
    Column,
    Uri,
}

/// A database object, optionally narrowed to one table.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Authorizable {
    pub db: Option<String>,
    pub table: Option<String>,
}

impl Authorizable {
    #[must_use]
    pub fn database(db: impl Into<String>) -> Self {
        Self {
            db: Some(db.into()),
            table: None,
        }
    }

    #[must_use]
    pub fn table(db: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            db: Some(db.into()),
            table: Some(table.into()),
        }
    }

    /// `db` or `db.table`, lower-cased. `None` when no database is named.
    #[must_use]
    pub fn authz_object(&self) -> Option<String> {
        let db = non_blank(self.db.as_deref())?;

        let object = match non_blank(self.table.as_deref()) {
            Some(table) => format!("{db}.{table}"),
            None => db.to_owned(),
        };

        Some(object.to_lowercase())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Privilege {
    pub scope: PrivilegeScope,
    pub authorizable: Authorizable,
    pub action: String,
}

impl Privilege {
    #[must_use]
    pub fn new(scope: PrivilegeScope, authorizable: Authorizable, action: impl Into<String>) -> Self {
        Self {
            scope,
            authorizable,
            action: action.into(),
        }
    }

    /// Object the privilege applies to, or `None` when it is not tracked.
    fn tracked_object(&self) -> Option<String> {
        if self.scope == PrivilegeScope::Column {
            return None;
        }

        self.authorizable.authz_object()
    }
}

impl AuthzSyncService {
    pub async fn on_role_add_groups(&self, role: &str, groups: &[String]) -> StoreResult<Sequence> {
        let mut update = PermissionsUpdate::new();
        let change = update.role(role);
        for group in groups {
            let _ = change.add_group(group.as_str());
        }

        self.record_permission_change(update).await
    }

    pub async fn on_role_delete_groups(
        &self,
        role: &str,
        groups: &[String],
    ) -> StoreResult<Sequence> {
        let mut update = PermissionsUpdate::new();
        let change = update.role(role);
        for group in groups {
            let _ = change.remove_group(group.as_str());
        }

        self.record_permission_change(update).await
    }

    /// Records one update per tracked privilege. Column-scoped privileges
    /// and privileges without a database produce nothing.
    pub async fn on_grant_privileges(
        &self,
        role: &str,
        privileges: &[Privilege],
    ) -> StoreResult<Vec<Sequence>> {
        let mut sequences = Vec::with_capacity(privileges.len());

        for privilege in privileges {
            let Some(object) = privilege.tracked_object() else {
                debug!(role, scope = %privilege.scope, "privilege not tracked, skipping grant");
                continue;
            };

            let mut update = PermissionsUpdate::new();
            let _ = update
                .privilege(object)
                .grant(role, privilege.action.to_uppercase());

            sequences.push(self.record_permission_change(update).await?);
        }

        Ok(sequences)
    }

    pub async fn on_revoke_privileges(
        &self,
        role: &str,
        privileges: &[Privilege],
    ) -> StoreResult<Vec<Sequence>> {
        let mut sequences = Vec::with_capacity(privileges.len());

        for privilege in privileges {
            let Some(object) = privilege.tracked_object() else {
                debug!(role, scope = %privilege.scope, "privilege not tracked, skipping revoke");
                continue;
            };

            let mut update = PermissionsUpdate::new();
            let _ = update
                .privilege(object)
                .revoke(role, privilege.action.to_uppercase());

            sequences.push(self.record_permission_change(update).await?);
        }

        Ok(sequences)
    }

    /// Moves every grant on `old` to `new`. Returns `None` when either side
    /// names no database.
    pub async fn on_rename_privilege(
        &self,
        old: &Authorizable,
        new: &Authorizable,
    ) -> StoreResult<Option<Sequence>> {
        let (Some(old), Some(new)) = (old.authz_object(), new.authz_object()) else {
            return Ok(None);
        };

        let mut update = PermissionsUpdate::new();
        let _ = update
            .privilege(RENAME_PRIVS)
            .grant(new.clone(), new)
            .revoke(old.clone(), old);

        self.record_permission_change(update).await.map(Some)
    }

    pub async fn on_drop_role(&self, role: &str) -> StoreResult<Sequence> {
        let mut update = PermissionsUpdate::new();
        let _ = update.privilege(ALL_AUTHZ_OBJ).revoke(role, ALL_AUTHZ_OBJ);
        let _ = update.role(role).remove_group(ALL_GROUPS);

        self.record_permission_change(update).await
    }

    pub async fn on_drop_privilege(
        &self,
        authorizable: &Authorizable,
    ) -> StoreResult<Option<Sequence>> {
        let Some(object) = authorizable.authz_object() else {
            return Ok(None);
        };

        let mut update = PermissionsUpdate::new();
        let _ = update.privilege(object).revoke(ALL_ROLES, ALL_ROLES);

        self.record_permission_change(update).await.map(Some)
    }

    async fn record_permission_change(&self, update: PermissionsUpdate) -> StoreResult<Sequence> {
        let sequence = self.store.permissions().persist(update).await?;

        debug!(%sequence, "recorded permission change");

        Ok(sequence)
    }
}
