use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::command::CommandRunner;
use crate::config::{Settings, SyncSettings};
use crate::directory::{Directory, Reconciler, Reconciliation};
use crate::error::RiskSyncError;
use crate::report::{ReportFetcher, parse_report};
use crate::tiering::assign_tiers;
use crate::watch::ConfigWatcher;

/// Counts from one polling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Accounts in the risk report.
    pub accounts: usize,
    /// Directory users matched by at least one report alias and assigned a tier.
    pub assigned: usize,
    pub moved: usize,
    pub unchanged: usize,
    pub failed: usize,
}

struct Reload {
    path: PathBuf,
    watcher: ConfigWatcher,
}

/// Runs fetch → parse → map → reconcile on a fixed interval.
pub struct Driver {
    fetcher: Box<dyn ReportFetcher>,
    runner: Arc<dyn CommandRunner>,
    sync: SyncSettings,
    force_nickname: bool,
    reload: Option<Reload>,
}

impl Driver {
    pub fn new(
        fetcher: Box<dyn ReportFetcher>,
        runner: Arc<dyn CommandRunner>,
        sync: SyncSettings,
    ) -> Self {
        Self {
            fetcher,
            runner,
            sync,
            force_nickname: false,
            reload: None,
        }
    }

    /// Match users by mail nickname regardless of the config toggle.
    pub fn force_nickname(mut self, force: bool) -> Self {
        self.force_nickname = force;
        self
    }

    /// Re-read the sync settings from `path` whenever `watcher` reports a change.
    pub fn with_reload(mut self, path: PathBuf, watcher: ConfigWatcher) -> Self {
        self.reload = Some(Reload { path, watcher });
        self
    }

    pub fn sync_settings(&self) -> &SyncSettings {
        &self.sync
    }

    fn nickname_mode(&self) -> bool {
        self.force_nickname || self.sync.mail_nickname
    }

    /// One full pass. A failure before reconciliation starts ends the cycle;
    /// a failure reconciling one user is logged and counted, and the cycle
    /// moves on to the next user.
    pub async fn run_cycle(&self) -> Result<CycleSummary, RiskSyncError> {
        let body = self.fetcher.fetch().await?;
        let report = parse_report(&body)?;

        let directory = Directory::new(self.runner.clone(), self.nickname_mode());
        let known_users = directory.list_users().await?;

        // Keyed by directory identity: in nickname mode every alias sharing a
        // nickname collapses to one user, and the last one seen wins.
        let mut scores = BTreeMap::new();
        for (account, aliases) in &report.aliases {
            let Some(&score) = report.scores.get(account) else {
                continue;
            };
            for alias in aliases {
                let key = directory.match_key(alias);
                if known_users.contains(key) {
                    scores.insert(key.to_owned(), score);
                }
            }
        }

        let assignment = assign_tiers(&scores, &self.sync.tiers);
        let mut summary = CycleSummary {
            accounts: report.scores.len(),
            assigned: assignment.len(),
            ..CycleSummary::default()
        };

        let reconciler = Reconciler::new(&directory, &self.sync.tier_groups, self.sync.revoke_sessions);
        for (user, group) in &assignment {
            match reconciler.reconcile(user, group).await {
                Ok(Reconciliation::Unchanged) => summary.unchanged += 1,
                Ok(Reconciliation::Moved { .. }) => summary.moved += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!(user = %user, group = %group, error = %e, "failed to reconcile user");
                }
            }
        }

        Ok(summary)
    }

    fn apply_pending_reload(&mut self) {
        let Some(reload) = &self.reload else {
            return;
        };
        if !reload.watcher.take_changed() {
            return;
        }
        match Settings::load(&reload.path) {
            Ok(settings) if settings.sync != self.sync => {
                info!(config = %reload.path.display(), "reloaded sync settings");
                self.sync = settings.sync;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "config change rejected, keeping previous settings"),
        }
    }

    /// Poll forever. Cycle errors are logged; the next cycle always runs on
    /// schedule.
    pub async fn run(mut self) {
        loop {
            self.apply_pending_reload();

            let span = info_span!("cycle", cycle_id = %Uuid::now_v7());
            async {
                match self.run_cycle().await {
                    Ok(summary) => info!(
                        accounts = summary.accounts,
                        assigned = summary.assigned,
                        moved = summary.moved,
                        unchanged = summary.unchanged,
                        failed = summary.failed,
                        "risk sync cycle finished"
                    ),
                    Err(e) => error!(error = %e, "risk sync cycle failed"),
                }
            }
            .instrument(span)
            .await;

            tokio::time::sleep(self.sync.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use async_trait::async_trait;

    use super::*;
    use crate::command::testing::ScriptedRunner;
    use crate::logging::LogFormat;
    use crate::tiering::TierMap;

    struct CannedReport(Result<String, String>);

    #[async_trait]
    impl ReportFetcher for CannedReport {
        async fn fetch(&self) -> Result<String, RiskSyncError> {
            self.0.clone().map_err(RiskSyncError::ReportUnavailable)
        }
    }

    const HEADER: &str = "account,login,score,a,b,c,d,e,f,g";

    fn report(rows: &[(&str, &str, &str)]) -> String {
        let mut text = HEADER.to_owned();
        for (account, login, score) in rows {
            text.push_str(&format!("\n{account},{login},{score},x,x,x,x,x,x,x"));
        }
        text
    }

    fn sync(nickname: bool) -> SyncSettings {
        SyncSettings {
            tier_groups: vec!["low".into(), "medium".into(), "high".into()],
            tiers: TierMap::compile([("0-39", "low"), ("40-69", "medium"), ("70+", "high")]).unwrap(),
            interval: Duration::from_secs(60),
            mail_nickname: nickname,
            revoke_sessions: false,
        }
    }

    fn driver(body: Result<String, String>, runner: Arc<ScriptedRunner>, nickname: bool) -> Driver {
        Driver::new(Box::new(CannedReport(body)), runner, sync(nickname))
    }

    #[tokio::test]
    async fn only_directory_users_are_reconciled() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .respond("az ad user list", "alice@corp.io")
                .respond("az ad user show --id alice@corp.io", "uid-a")
                .respond("az ad user get-member-groups --id uid-a", "high"),
        );
        let body = report(&[("alice", "alice@corp.io", "88"), ("bob", "bob@corp.io", "90")]);

        let summary = driver(Ok(body), runner.clone(), false).run_cycle().await.unwrap();

        assert_eq!(summary.accounts, 2);
        assert_eq!(summary.assigned, 1);
        assert_eq!(summary.unchanged, 1);
        assert!(runner.calls_starting_with("az ad user show --id bob").is_empty());
    }

    #[tokio::test]
    async fn one_failing_user_does_not_stop_the_cycle() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .respond("az ad user list", "alice@corp.io\nbob@corp.io")
                .fail("az ad user show --id alice@corp.io", "Insufficient privileges")
                .respond("az ad user show --id bob@corp.io", "uid-b")
                .respond("az ad user get-member-groups --id uid-b", "low")
                .respond("az ad group show -g low", "gid-low")
                .respond("az ad group show -g high", "gid-high")
                .respond("az ad group member", ""),
        );
        let body = report(&[("alice", "alice@corp.io", "10"), ("bob", "bob@corp.io", "75")]);

        let summary = driver(Ok(body), runner.clone(), false).run_cycle().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.moved, 1);
        assert_eq!(
            runner.calls_starting_with("az ad group member add"),
            ["az ad group member add -g gid-high --member-id uid-b"]
        );
    }

    #[tokio::test]
    async fn all_aliases_of_an_account_share_its_score() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .respond("az ad user list --query [?mailNickname=='jdoe'].id", "uid-1")
                .respond("az ad user list --query [?mailNickname=='john.doe'].id", "uid-2")
                .respond("az ad user list", "jdoe\njohn.doe")
                .respond("az ad user get-member-groups", "medium"),
        );
        let body = report(&[
            ("jdoe", "jdoe@corp.io", "41"),
            ("jdoe", "john.doe@corp.io", "60.7"),
        ]);

        let summary = driver(Ok(body), runner.clone(), true).run_cycle().await.unwrap();

        assert_eq!(summary.assigned, 2);
        assert_eq!(summary.unchanged, 2);
    }

    #[tokio::test]
    async fn aliases_sharing_a_nickname_resolve_to_one_user() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .respond("az ad user list --query [?mailNickname=='jdoe'].id", "uid-1")
                .respond("az ad user list", "jdoe")
                .respond("az ad user get-member-groups --id uid-1", "low")
                .respond("az ad group show -g low", "gid-low")
                .respond("az ad group show -g high", "gid-high")
                .respond("az ad group member", ""),
        );
        let body = report(&[
            ("acctA", "jdoe@corp.io", "10"),
            ("acctB", "jdoe@corp.onmicrosoft.com", "80"),
        ]);

        let summary = driver(Ok(body), runner.clone(), true).run_cycle().await.unwrap();

        assert_eq!(summary.accounts, 2);
        assert_eq!(summary.assigned, 1);
        assert_eq!(summary.moved, 1);
        assert_eq!(
            runner.calls_starting_with("az ad user list --query [?mailNickname"),
            ["az ad user list --query [?mailNickname=='jdoe'].id -o tsv"]
        );
        assert_eq!(
            runner.calls_starting_with("az ad group member add"),
            ["az ad group member add -g gid-high --member-id uid-1"]
        );
    }

    #[tokio::test]
    async fn unavailable_report_fails_cycle_before_directory_calls() {
        let runner = Arc::new(ScriptedRunner::new());
        let err = driver(Err("connection refused".into()), runner.clone(), false)
            .run_cycle()
            .await
            .unwrap_err();
        assert!(matches!(err, RiskSyncError::ReportUnavailable(_)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn html_report_fails_cycle() {
        let runner = Arc::new(ScriptedRunner::new());
        let err = driver(Ok("<html><body>login</body></html>".into()), runner.clone(), false)
            .run_cycle()
            .await
            .unwrap_err();
        assert!(matches!(err, RiskSyncError::ReportUnavailable(_)));
        assert!(runner.calls().is_empty());
    }

    fn config(interval_minutes: u64, top_range: &str, json: bool) -> String {
        format!(
            r#"
[casb]
username = "reader"
password = "pw"
report_url = "http://casb.invalid/riskscore.csv"

[directory]
groups = "low,medium,high"

[sync]
interval_minutes = {interval_minutes}

[logging]
json = {json}

[[tiers]]
range = "0-39"
group = "low"

[[tiers]]
range = "40-69"
group = "medium"

[[tiers]]
range = "{top_range}"
group = "high"
"#
        )
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    }

    fn reloading_driver(path: &std::path::Path, format: LogFormat) -> Driver {
        let watcher = ConfigWatcher::spawn(path, format).unwrap();
        let sync = Settings::load(path).unwrap().sync;
        Driver::new(
            Box::new(CannedReport(Ok(report(&[])))),
            Arc::new(ScriptedRunner::new()),
            sync,
        )
        .with_reload(path.to_path_buf(), watcher)
    }

    #[test]
    fn config_change_applies_before_next_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("azure_casb.toml");
        std::fs::write(&path, config(5, "70+", false)).unwrap();
        let mut driver = reloading_driver(&path, LogFormat::new(false));
        assert_eq!(driver.sync_settings().interval, Duration::from_secs(5 * 60));

        std::fs::write(&path, config(7, "60+", false)).unwrap();

        let reloaded = wait_for(|| {
            driver.apply_pending_reload();
            driver.sync_settings().interval == Duration::from_secs(7 * 60)
        });
        assert!(reloaded, "sync settings never reloaded");
        let expected = TierMap::compile([("0-39", "low"), ("40-69", "medium"), ("60+", "high")]).unwrap();
        assert_eq!(driver.sync_settings().tiers, expected);
    }

    #[test]
    fn invalid_config_change_keeps_previous_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("azure_casb.toml");
        std::fs::write(&path, config(5, "70+", false)).unwrap();
        let format = LogFormat::new(false);
        let mut driver = reloading_driver(&path, format.clone());
        let before = driver.sync_settings().clone();

        // The watcher flips the log format once it has seen the edit, so the
        // change flag is raised by then.
        std::fs::write(&path, config(9, "abc", true)).unwrap();
        assert!(wait_for(|| format.is_json()), "config change never observed");

        driver.apply_pending_reload();
        assert_eq!(driver.sync_settings(), &before);
    }

    #[tokio::test]
    async fn forced_nickname_overrides_config() {
        let runner = Arc::new(ScriptedRunner::new().respond("az ad user list", ""));
        let d = driver(Ok(report(&[])), runner.clone(), false).force_nickname(true);
        d.run_cycle().await.unwrap();
        assert_eq!(runner.calls(), ["az ad user list --query [].mailNickname -o tsv"]);
    }
}
