//! Lifecycle registry: instance index → process handle
//!
//! Entries are write-once. Iteration is always in ascending index order so
//! drains and their logs are reproducible.

use crate::error::RegistryError;
use crate::launcher::ManagedProcess;
use crate::CoreError;
use std::collections::BTreeMap;
use std::fmt;
#[cfg(unix)]
use std::path::Path;
use tracing::debug;

/// Authoritative record of which process belongs to which instance
#[derive(Default)]
pub struct LifecycleRegistry {
    entries: BTreeMap<usize, Box<dyn ManagedProcess>>,
}

/// Instance whose PID record could not be used during recovery
#[derive(Debug)]
pub struct SkippedInstance {
    /// Instance index
    pub index: usize,
    /// Why the record was unusable
    pub error: CoreError,
}

impl LifecycleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the process for `index`; an existing entry is never overwritten
    pub fn record(
        &mut self,
        index: usize,
        process: Box<dyn ManagedProcess>,
    ) -> Result<(), RegistryError> {
        if let Some(existing) = self.entries.get(&index) {
            return Err(RegistryError::AlreadyRecorded {
                index,
                pid: existing.pid(),
            });
        }
        debug!("Recorded instance {} as PID {}", index, process.pid());
        self.entries.insert(index, process);
        Ok(())
    }

    /// Look up the process recorded for `index`
    pub fn lookup(&self, index: usize) -> Result<&dyn ManagedProcess, RegistryError> {
        self.entries
            .get(&index)
            .map(|p| p.as_ref())
            .ok_or(RegistryError::NotFound(index))
    }

    /// All `(index, pid)` pairs in ascending index order
    pub fn all(&self) -> Vec<(usize, u32)> {
        self.entries.iter().map(|(i, p)| (*i, p.pid())).collect()
    }

    /// Mutable access to every handle in ascending index order
    pub fn entries_mut(&mut self) -> impl Iterator<Item = (usize, &mut Box<dyn ManagedProcess>)> {
        self.entries.iter_mut().map(|(i, p)| (*i, p))
    }

    /// Number of recorded instances
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rebuild a registry from the `node.pid` records under `base`.
    ///
    /// Missing or unreadable records are skipped with a warning and returned
    /// alongside the registry; they do not stop the remaining instances from
    /// being recovered.
    #[cfg(unix)]
    pub fn recover(base: &Path, count: usize) -> (Self, Vec<SkippedInstance>) {
        use crate::instance::InstanceDirs;
        use crate::launcher::PidProcess;
        use crate::persistence::read_pid_file;
        use tracing::warn;

        let mut registry = Self::new();
        let mut skipped = Vec::new();
        for index in 0..count {
            let dirs = InstanceDirs::resolve(base, index);
            match read_pid_file(&dirs.pid_file) {
                Ok(pid) => {
                    // indices are unique in this loop, so record cannot collide
                    let _ = registry.record(index, Box::new(PidProcess::new(pid)));
                }
                Err(error) => {
                    warn!("[instance {}] skipping: {}", index, error);
                    skipped.push(SkippedInstance { index, error });
                }
            }
        }
        (registry, skipped)
    }
}

impl fmt::Debug for LifecycleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(i, p)| (i, p.pid())))
            .finish()
    }
}
