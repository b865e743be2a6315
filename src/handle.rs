//! Shared, swappable reference to the current validator.
//!
//! A reload builds a complete new [`Validator`] and swaps the `Arc` under a
//! short write lock. Callers clone the `Arc` out first, so an in-flight
//! decision always sees one whole table. A reload that fails keeps the
//! previous table in place.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::hook::{Decide, Decision, GuardError};
use crate::rules::load_rules;
use crate::validator::{MessageContext, ValidationResult, Validator};

/// Holds the active validator and, optionally, the file watcher feeding it.
pub struct RulesHandle {
    current: RwLock<Arc<Validator>>,
    /// Rules file the handle reloads from.
    path: Option<PathBuf>,
    /// File watcher handle (kept alive to maintain notifications).
    _watcher: Option<RecommendedWatcher>,
}

impl std::fmt::Debug for RulesHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let version = match self.current.read() {
            Ok(v) => v.rules().version.clone(),
            Err(_) => "<poisoned>".to_owned(),
        };
        f.debug_struct("RulesHandle")
            .field("path", &self.path)
            .field("version", &version)
            .field("watching", &self._watcher.is_some())
            .finish()
    }
}

impl RulesHandle {
    /// Handle over an already-built validator, with no backing file.
    pub fn new(validator: Validator) -> Self {
        Self {
            current: RwLock::new(Arc::new(validator)),
            path: None,
            _watcher: None,
        }
    }

    /// Load the rules file once. [`RulesHandle::reload`] re-reads it.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Rules`] if the file cannot be loaded or checked.
    pub fn from_path(path: &Path) -> Result<Self, GuardError> {
        let validator = Validator::new(load_rules(path)?)?;
        Ok(Self {
            current: RwLock::new(Arc::new(validator)),
            path: Some(path.to_path_buf()),
            _watcher: None,
        })
    }

    /// Load the rules file and reload it whenever it changes on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial load fails or the watcher cannot be
    /// started.
    pub fn watch(path: &Path) -> anyhow::Result<Arc<Self>> {
        let validator = Validator::new(load_rules(path)?)?;
        let (tx, rx) = std::sync::mpsc::channel();

        let mut watcher =
            notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
                if let Ok(evt) = event {
                    if evt.kind.is_access() {
                        return;
                    }
                    for changed in evt.paths {
                        if let Err(e) = tx.send(changed) {
                            warn!(error = %e, "failed to send watcher event");
                        }
                    }
                }
            })?;

        // Watch the parent so editors that replace the file are still seen.
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;

        let handle = Arc::new(Self {
            current: RwLock::new(Arc::new(validator)),
            path: Some(path.to_path_buf()),
            _watcher: Some(watcher),
        });

        let file_name = path.file_name().map(|n| n.to_os_string());
        let handle_for_thread = Arc::downgrade(&handle);
        std::thread::spawn(move || {
            while let Ok(changed) = rx.recv() {
                if changed.file_name().map(|n| n.to_os_string()) != file_name {
                    continue;
                }
                let Some(handle) = handle_for_thread.upgrade() else {
                    break;
                };
                if !changed.exists() {
                    debug!(path = %changed.display(), "rules file removed, keeping current table");
                    continue;
                }
                if let Err(e) = handle.reload() {
                    warn!(path = %changed.display(), error = %e, "rules reload failed, keeping current table");
                }
            }
        });

        info!(path = %path.display(), "watching rules file");
        Ok(handle)
    }

    /// Snapshot of the active validator.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::LockPoisoned`] if a writer panicked.
    pub fn current(&self) -> Result<Arc<Validator>, GuardError> {
        self.current
            .read()
            .map(|v| Arc::clone(&*v))
            .map_err(|e| GuardError::LockPoisoned(e.to_string()))
    }

    /// Swap in a new validator.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::LockPoisoned`] if a writer panicked.
    pub fn replace(&self, validator: Validator) -> Result<(), GuardError> {
        let next = Arc::new(validator);
        let mut slot = self
            .current
            .write()
            .map_err(|e| GuardError::LockPoisoned(e.to_string()))?;
        *slot = next;
        Ok(())
    }

    /// Re-read the backing file and swap it in. A handle without a file is
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Rules`] if the new table is invalid; the
    /// previous table stays active.
    pub fn reload(&self) -> Result<(), GuardError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let validator = Validator::new(load_rules(path)?)?;
        let version = validator.rules().version.clone();
        self.replace(validator)?;
        info!(path = %path.display(), version = %version, "rules reloaded");
        Ok(())
    }

    /// Rules file backing this handle, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Decide for RulesHandle {
    fn decide(&self, ctx: &MessageContext) -> Result<ValidationResult, GuardError> {
        Ok(self.current()?.validate(ctx))
    }

    fn decide_with_prompt(&self, ctx: &MessageContext) -> Result<Decision, GuardError> {
        // One snapshot, so a reload cannot split the result from its prompt.
        self.current()?.decide_with_prompt(ctx)
    }
}
