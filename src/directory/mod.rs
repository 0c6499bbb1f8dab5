//! Azure AD operations issued through the `az` CLI.
//!
//! Every call goes through a [`CommandRunner`]; nothing here caches
//! directory state, so each lookup reflects live membership.

pub mod login;
pub mod reconcile;

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::command::{CommandLine, CommandRunner};
use crate::error::RiskSyncError;

pub use login::{AdminCredentials, Prompter, TerminalPrompter, ensure_logged_in, validate_email};
pub use reconcile::{Reconciler, Reconciliation};

const AZ: &str = "az";
const NOT_LOGGED_IN_MARKER: &str = "az login";
const BAD_CREDENTIALS_MARKER: &str = "invalid username or password";

/// A directory user resolved for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    pub object_id: String,
    /// Display names of the groups the user currently belongs to.
    pub groups: Vec<String>,
}

pub struct Directory {
    runner: Arc<dyn CommandRunner>,
    match_by_nickname: bool,
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("match_by_nickname", &self.match_by_nickname)
            .finish_non_exhaustive()
    }
}

impl Directory {
    pub fn new(runner: Arc<dyn CommandRunner>, match_by_nickname: bool) -> Self {
        Self {
            runner,
            match_by_nickname,
        }
    }

    pub fn match_by_nickname(&self) -> bool {
        self.match_by_nickname
    }

    /// The key a report alias is matched on: the alias itself, or its part
    /// before the first `@` in nickname mode.
    pub fn match_key<'a>(&self, alias: &'a str) -> &'a str {
        if self.match_by_nickname {
            nickname(alias)
        } else {
            alias
        }
    }

    /// All user principal names, or all mail nicknames in nickname mode.
    pub async fn list_users(&self) -> Result<BTreeSet<String>, RiskSyncError> {
        let attribute = if self.match_by_nickname {
            "mailNickname"
        } else {
            "userPrincipalName"
        };
        let cmd = CommandLine::new(AZ)
            .args(["ad", "user", "list", "--query"])
            .arg(format!("[].{attribute}"))
            .args(["-o", "tsv"]);
        let output = self.runner.run(&cmd).await?;
        Ok(lines(&output).map(str::to_owned).collect())
    }

    /// Resolve a report login name to its object id and current groups.
    pub async fn lookup_user(&self, login: &str) -> Result<DirectoryUser, RiskSyncError> {
        let object_id = if self.match_by_nickname {
            self.object_id_by_nickname(nickname(login)).await?
        } else {
            self.object_id_by_login(login).await?
        };

        let cmd = CommandLine::new(AZ)
            .args(["ad", "user", "get-member-groups", "--id"])
            .arg(object_id.as_str())
            .args(["--query", "[].displayName", "-o", "tsv"]);
        let output = self.runner.run(&cmd).await?;
        let groups = lines(&output).map(str::to_owned).collect();

        debug!(user = login, object_id = %object_id, ?groups, "resolved directory user");
        Ok(DirectoryUser { object_id, groups })
    }

    async fn object_id_by_login(&self, login: &str) -> Result<String, RiskSyncError> {
        let cmd = CommandLine::new(AZ)
            .args(["ad", "user", "show", "--id"])
            .arg(login)
            .args(["--query", "id", "-o", "tsv"]);
        let id = self.runner.run(&cmd).await?;
        if id.is_empty() {
            return Err(RiskSyncError::UserNotFound(login.to_owned()));
        }
        Ok(id)
    }

    async fn object_id_by_nickname(&self, nick: &str) -> Result<String, RiskSyncError> {
        let cmd = CommandLine::new(AZ)
            .args(["ad", "user", "list", "--query"])
            .arg(format!("[?mailNickname=='{}'].id", nick.replace('\'', "\\'")))
            .args(["-o", "tsv"]);
        let output = self.runner.run(&cmd).await?;
        let ids: Vec<&str> = lines(&output).collect();
        match ids.as_slice() {
            [] => Err(RiskSyncError::UserNotFound(nick.to_owned())),
            [id] => Ok((*id).to_owned()),
            _ => Err(RiskSyncError::AmbiguousUser(format!(
                "{} users have mail nickname '{nick}'",
                ids.len()
            ))),
        }
    }

    pub async fn group_id(&self, group: &str) -> Result<String, RiskSyncError> {
        let cmd = CommandLine::new(AZ)
            .args(["ad", "group", "show", "-g"])
            .arg(group)
            .args(["--query", "id", "-o", "tsv"]);
        let id = self.runner.run(&cmd).await?;
        if id.is_empty() {
            return Err(RiskSyncError::Command(format!("group '{group}' not found")));
        }
        Ok(id)
    }

    pub async fn add_member(&self, group_id: &str, user_id: &str) -> Result<(), RiskSyncError> {
        let cmd = CommandLine::new(AZ)
            .args(["ad", "group", "member", "add", "-g"])
            .arg(group_id)
            .arg("--member-id")
            .arg(user_id);
        self.runner.run(&cmd).await.map(drop)
    }

    pub async fn remove_member(&self, group_id: &str, user_id: &str) -> Result<(), RiskSyncError> {
        let cmd = CommandLine::new(AZ)
            .args(["ad", "group", "member", "remove", "-g"])
            .arg(group_id)
            .arg("--member-id")
            .arg(user_id);
        self.runner.run(&cmd).await.map(drop)
    }

    /// Invalidate all refresh tokens and session cookies of the user.
    pub async fn revoke_sessions(&self, user_id: &str) -> Result<(), RiskSyncError> {
        let cmd = CommandLine::new(AZ)
            .args(["rest", "--method", "POST", "--uri"])
            .arg(format!(
                "https://graph.microsoft.com/v1.0/users/{user_id}/revokeSignInSessions"
            ));
        self.runner.run(&cmd).await.map(drop)
    }

    /// The signed-in account of an existing CLI session, if any.
    pub async fn active_account(&self) -> Result<Option<String>, RiskSyncError> {
        let cmd = CommandLine::new(AZ).args(["account", "show", "--query", "user.name", "-o", "tsv"]);
        match self.runner.run(&cmd).await {
            Ok(account) if account.is_empty() => Ok(None),
            Ok(account) => Ok(Some(account)),
            Err(RiskSyncError::Command(msg)) if msg.contains(NOT_LOGGED_IN_MARKER) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn login(
        &self,
        login: &str,
        password: &secrecy::SecretString,
    ) -> Result<(), RiskSyncError> {
        use secrecy::ExposeSecret;

        let cmd = CommandLine::new(AZ)
            .args(["login", "-u", login, "-p"])
            .secret_arg(password.expose_secret());
        match self.runner.run(&cmd).await {
            Ok(_) => Ok(()),
            Err(RiskSyncError::Command(msg)) if msg.contains(BAD_CREDENTIALS_MARKER) => Err(
                RiskSyncError::Login("credentials rejected: invalid username or password".to_owned()),
            ),
            Err(RiskSyncError::Command(msg)) => Err(RiskSyncError::Login(msg)),
            Err(e) => Err(e),
        }
    }
}

/// Part of a login name before the first `@`.
pub fn nickname(login: &str) -> &str {
    login.split_once('@').map_or(login, |(nick, _)| nick)
}

fn lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim).filter(|l| !l.is_empty())
}
