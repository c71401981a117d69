//! Hot reload of the gateway configuration file.
//!
//! The parent directory is watched rather than the file itself: editors and
//! deploy tools usually replace the file by rename, which drops a watch held
//! on the old inode. Events for sibling files are ignored, and a file whose
//! text has not changed since the last delivered update is not re-sent, so
//! the burst of events one save produces yields a single reload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::admission::AdmissionPolicy;
use crate::config::loader::parse_config;
use crate::config::schema::GateConfig;
use crate::security::MemoryStore;

/// Watches one configuration file and sends every accepted revision.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GateConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiver of accepted configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GateConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = watched_dir(&self.path);
        let Some(file_name) = self.path.file_name().map(|n| n.to_os_string()) else {
            return Err(notify::Error::generic("config path has no file name"));
        };

        let reloader = Arc::new(Reloader::new(self.path.clone()));
        // The running config is the baseline; an identical rewrite is not a change.
        reloader.prime();

        let tx = self.update_tx;
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, &file_name) => {
                    if let Some(config) = reloader.reload() {
                        let _ = tx.send(config);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}

fn watched_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Whether `event` may have changed the file named `file_name`.
fn touches(event: &Event, file_name: &OsString) -> bool {
    let relevant_kind = event.kind.is_create() || event.kind.is_modify();
    relevant_kind
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

/// Reads, validates and de-duplicates revisions of the config file.
struct Reloader {
    path: PathBuf,
    last_text: Mutex<Option<String>>,
}

impl Reloader {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_text: Mutex::new(None),
        }
    }

    fn prime(&self) {
        if let (Ok(text), Ok(mut last)) = (std::fs::read_to_string(&self.path), self.last_text.lock()) {
            *last = Some(text);
        }
    }

    /// The new configuration, if the file changed and compiles into a policy.
    fn reload(&self) -> Option<GateConfig> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                // Mid-rename; the create event for the new file follows.
                tracing::debug!(path = %self.path.display(), error = %e, "Config file not readable yet");
                return None;
            }
        };

        let mut last = self.last_text.lock().ok()?;
        if last.as_deref() == Some(text.as_str()) {
            return None;
        }

        tracing::info!(path = %self.path.display(), "Config file changed, reloading");
        let config = match parse_config(&text) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "Rejected config file, keeping current configuration");
                return None;
            }
        };
        if let Err(e) = AdmissionPolicy::build(&config, Arc::new(MemoryStore::default())) {
            tracing::error!(error = %e, "Config does not compile into a policy, keeping current configuration");
            return None;
        }

        *last = Some(text);
        Some(config)
    }
}
