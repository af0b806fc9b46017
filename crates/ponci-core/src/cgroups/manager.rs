//! Name-based cgroup control
//!
//! [`CgroupManager`] keeps no cgroup state: every call resolves the name to a
//! directory under the current prefix and goes to the filesystem.

use std::fs::{self, DirBuilder};
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::controller::{CpusetController, FreezerController, TasksController};
use super::error::{CgroupError, Result};
use super::poll::poll_until;
use super::types::{
    CgroupConfig, CgroupStatus, ControlFile, Flag, FreezerState, PollPolicy, PrefixSource,
    SchedDomainLevel, Tid,
};
use crate::executor::ProcessExecutor;

/// Owner and group rwx
const CGROUP_DIR_MODE: u32 = 0o770;

/// Cgroup manager
#[derive(Debug, Clone)]
pub struct CgroupManager {
    /// Mount prefix (env lookup or fixed)
    prefix: PrefixSource,

    /// Procfs mount, for listing our own threads
    proc_root: PathBuf,

    /// Freezer wait and kill drain policy
    poll: PollPolicy,

    /// Aborts waits early when cancelled
    cancel: Option<CancellationToken>,
}

impl CgroupManager {
    /// Create new cgroup manager
    pub fn new(config: CgroupConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            prefix: config.prefix_source(),
            proc_root: config.proc_root.clone(),
            poll: config.poll_policy(),
            cancel: None,
        })
    }

    /// Manager with the default configuration: `PONCI_PATH` or `/sys/fs/cgroup/`
    pub fn from_env() -> Self {
        Self {
            prefix: PrefixSource::default(),
            proc_root: PathBuf::from("/proc"),
            poll: PollPolicy::default(),
            cancel: None,
        }
    }

    /// Manager rooted at a fixed prefix
    pub fn with_prefix(prefix: impl Into<PathBuf>) -> Self {
        let mut manager = Self::from_env();
        manager.set_prefix(prefix);
        manager
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    /// Fix the prefix, replacing any environment lookup
    pub fn set_prefix(&mut self, prefix: impl Into<PathBuf>) {
        self.prefix = PrefixSource::Fixed(prefix.into());
    }

    pub fn prefix_source(&self) -> &PrefixSource {
        &self.prefix
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }

    /// Directory of cgroup `name`; the empty name is the prefix itself
    pub fn cgroup_path(&self, name: &str) -> PathBuf {
        let prefix = self.prefix.resolve();
        if name.is_empty() {
            prefix
        } else {
            prefix.join(name)
        }
    }

    /// Check if cgroup directory exists
    pub fn exists(&self, name: &str) -> bool {
        self.cgroup_path(name).is_dir()
    }

    /// Create the cgroup directory; an existing one is fine
    pub fn create(&self, name: &str) -> Result<()> {
        let path = self.cgroup_path(name);

        match DirBuilder::new().mode(CGROUP_DIR_MODE).create(&path) {
            Ok(()) => {
                info!("Created cgroup: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "cgroup already exists");
                Ok(())
            }
            Err(e) => Err(CgroupError::io(path, e)),
        }
    }

    /// Remove the cgroup directory; it must have no members
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.cgroup_path(name);
        fs::remove_dir(&path).map_err(|e| CgroupError::io(&path, e))?;

        info!("Removed cgroup: {}", path.display());
        Ok(())
    }

    /// Move task `tid` into the cgroup, verified by readback
    pub fn add_task(&self, name: &str, tid: Tid) -> Result<()> {
        TasksController::add(&self.cgroup_path(name), tid)
    }

    /// Move the calling thread into the cgroup
    pub fn add_self(&self, name: &str) -> Result<()> {
        self.add_task(name, ProcessExecutor::current_tid())
    }

    /// Current members of the cgroup
    pub fn tasks(&self, name: &str) -> Result<Vec<Tid>> {
        TasksController::list(&self.cgroup_path(name))
    }

    pub fn set_cpus(&self, name: &str, cpus: &[u32]) -> Result<()> {
        CpusetController::set_cpus(&self.cgroup_path(name), cpus)
    }

    pub fn set_mems(&self, name: &str, mems: &[u32]) -> Result<()> {
        CpusetController::set_mems(&self.cgroup_path(name), mems)
    }

    /// `flag` must be 0 or 1; checked before anything is written
    pub fn set_memory_migrate(&self, name: &str, flag: i64) -> Result<()> {
        let flag = Flag::try_from(flag)?;
        CpusetController::set_memory_migrate(&self.cgroup_path(name), flag)
    }

    /// `flag` must be 0 or 1; checked before anything is written
    pub fn set_cpu_exclusive(&self, name: &str, flag: i64) -> Result<()> {
        let flag = Flag::try_from(flag)?;
        CpusetController::set_cpu_exclusive(&self.cgroup_path(name), flag)
    }

    /// `flag` must be 0 or 1; checked before anything is written
    pub fn set_mem_hardwall(&self, name: &str, flag: i64) -> Result<()> {
        let flag = Flag::try_from(flag)?;
        CpusetController::set_mem_hardwall(&self.cgroup_path(name), flag)
    }

    /// `level` must be within [-1, 5]; checked before anything is written
    pub fn set_scheduling_domain(&self, name: &str, level: i32) -> Result<()> {
        let level = SchedDomainLevel::try_from(level)?;
        CpusetController::set_scheduling_domain(&self.cgroup_path(name), level)
    }

    pub fn freeze(&self, name: &str) -> Result<()> {
        FreezerController::freeze(&self.freezer_path(name)?)
    }

    pub fn thaw(&self, name: &str) -> Result<()> {
        FreezerController::thaw(&self.freezer_path(name)?)
    }

    pub fn freezer_state(&self, name: &str) -> Result<FreezerState> {
        FreezerController::get_state(&self.freezer_path(name)?)
    }

    /// Block until `freezer.state` reads `target` (bounded by the poll policy)
    pub fn wait_until(&self, name: &str, target: FreezerState) -> Result<()> {
        FreezerController::wait_until(
            &self.freezer_path(name)?,
            target,
            &self.poll,
            self.cancel.as_ref(),
        )
    }

    pub fn freeze_and_wait(&self, name: &str) -> Result<()> {
        self.freeze(name)?;
        self.wait_until(name, FreezerState::Frozen)
    }

    pub fn thaw_and_wait(&self, name: &str) -> Result<()> {
        self.thaw(name)?;
        self.wait_until(name, FreezerState::Thawed)
    }

    /// SIGTERM every member that is not one of our own threads, wait for the
    /// `tasks` file to drain, then remove the cgroup
    pub fn kill_and_remove(&self, name: &str) -> Result<()> {
        self.signal_and_drain(name)?;
        self.delete(name)
    }

    /// The first half of [`Self::kill_and_remove`]: signal, then wait until
    /// `tasks` is empty
    ///
    /// The first signal failure aborts. If our own threads are members the
    /// drain only completes once they are moved out by someone else.
    pub fn signal_and_drain(&self, name: &str) -> Result<()> {
        let path = self.cgroup_path(name);
        let own = ProcessExecutor::own_thread_ids(&self.proc_root)?;
        let members = TasksController::list(&path)?;

        let mut signalled = 0usize;
        for tid in &members {
            if own.contains(tid) {
                warn!(tid, cgroup = %path.display(), "own thread is a member, not signalling");
                continue;
            }
            ProcessExecutor::terminate(*tid)?;
            signalled += 1;
        }

        info!(
            "Signalled {} of {} tasks in {}, waiting for drain",
            signalled,
            members.len(),
            path.display()
        );

        let what = format!("{} to drain", ControlFile::Tasks.path_in(&path).display());
        poll_until(&self.poll, self.cancel.as_ref(), &what, || {
            Ok(TasksController::list(&path)?.is_empty())
        })
    }

    /// Snapshot of membership, cpuset and freezer files
    ///
    /// Missing files show up as `None`; other read errors are returned.
    pub fn status(&self, name: &str) -> Result<CgroupStatus> {
        let path = self.cgroup_path(name);
        let exists = path.is_dir();

        Ok(CgroupStatus {
            name: name.to_string(),
            exists,
            tasks: optional(TasksController::list(&path))?,
            cpus: optional(CpusetController::get_cpus(&path))?,
            mems: optional(CpusetController::get_mems(&path))?,
            freezer: if name.is_empty() {
                None
            } else {
                optional(FreezerController::get_state(&path))?
            },
            path,
        })
    }

    /// The root cgroup has no freezer in this model
    fn freezer_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() {
            return Err(CgroupError::InvalidArgument(
                "freezer operations need a cgroup name, not the root".to_string(),
            ));
        }
        Ok(self.cgroup_path(name))
    }
}

impl Default for CgroupManager {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Map a NotFound read to `None`
fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.io_kind() == Some(ErrorKind::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}
