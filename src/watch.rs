use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use crate::config;
use crate::error::RiskSyncError;
use crate::logging::LogFormat;

/// Watches the config file. A change applies the log format immediately and
/// raises a flag the polling loop checks before its next cycle.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    changed: Arc<AtomicBool>,
}

impl ConfigWatcher {
    pub fn spawn(path: &Path, log_format: LogFormat) -> Result<Self, RiskSyncError> {
        let path = path.canonicalize().map_err(|e| {
            RiskSyncError::ConfigLoad(format!("cannot watch {}: {e}", path.display()))
        })?;
        // Editors often replace the file by rename, so watch the directory.
        let dir: PathBuf = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let changed = Arc::new(AtomicBool::new(false));
        let flag = changed.clone();
        let watched = path.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else {
                return;
            };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            if !event.paths.iter().any(|p| p.file_name() == watched.file_name()) {
                return;
            }

            flag.store(true, Ordering::Release);
            match config::read_log_json(&watched) {
                Ok(json) if json != log_format.is_json() => {
                    log_format.set_json(json);
                    info!(json, "log format changed");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "ignoring unreadable config change"),
            }
        })
        .map_err(|e| RiskSyncError::ConfigLoad(format!("cannot create config watcher: {e}")))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| RiskSyncError::ConfigLoad(format!("cannot watch {}: {e}", dir.display())))?;

        Ok(Self {
            _watcher: watcher,
            changed,
        })
    }

    /// True once after each observed change.
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }
}
