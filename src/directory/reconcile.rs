use tracing::{debug, info, warn};

use crate::error::RiskSyncError;

use super::Directory;

/// What reconciling one user changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The user was already in the target tier group.
    Unchanged,
    Moved {
        removed: Vec<String>,
        added: String,
        sessions_revoked: bool,
    },
}

/// Moves users into their target tier group.
///
/// Only memberships in configured tier groups are ever removed; any other
/// group the user belongs to is left alone.
#[derive(Debug)]
pub struct Reconciler<'a> {
    directory: &'a Directory,
    tier_groups: &'a [String],
    revoke_sessions: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(directory: &'a Directory, tier_groups: &'a [String], revoke_sessions: bool) -> Self {
        Self {
            directory,
            tier_groups,
            revoke_sessions,
        }
    }

    /// Bring one user's tier-group membership in line with `target`.
    ///
    /// Each removal and the add are separate directory operations. The first
    /// failure stops this user's reconciliation and is returned; changes made
    /// before it are not rolled back.
    pub async fn reconcile(&self, user: &str, target: &str) -> Result<Reconciliation, RiskSyncError> {
        let found = self.directory.lookup_user(user).await?;

        if found.groups.iter().any(|g| g == target) {
            debug!(user, group = target, "user already in target risk-level group");
            return Ok(Reconciliation::Unchanged);
        }

        let stale: Vec<&String> = found
            .groups
            .iter()
            .filter(|g| self.tier_groups.contains(g))
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for group in stale {
            let group_id = self.directory.group_id(group).await?;
            self.directory.remove_member(&group_id, &found.object_id).await?;
            info!(user, group = %group, "removed user from previous risk-level group");
            removed.push(group.clone());
        }

        let group_id = self.directory.group_id(target).await?;
        self.directory.add_member(&group_id, &found.object_id).await?;
        info!(user, group = target, "added user to new risk-level group");

        if self.revoke_sessions {
            self.directory.revoke_sessions(&found.object_id).await?;
            warn!(user, "terminated all active sessions");
        }

        Ok(Reconciliation::Moved {
            removed,
            added: target.to_owned(),
            sessions_revoked: self.revoke_sessions,
        })
    }
}
