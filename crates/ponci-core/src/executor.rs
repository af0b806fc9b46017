use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use nix::sys::signal::{kill, Signal};
use nix::unistd::{gettid, Pid};
use tracing::debug;

use crate::cgroups::{CgroupError, Result, Tid};

/// Signal delivery and thread introspection for the calling process
pub struct ProcessExecutor;

impl ProcessExecutor {
    /// Kernel thread id of the calling thread
    pub fn current_tid() -> Tid {
        gettid().as_raw()
    }

    /// Process id of the caller
    pub fn current_pid() -> Tid {
        nix::unistd::getpid().as_raw()
    }

    /// Send SIGTERM to `tid`
    ///
    /// Fails with [`CgroupError::Signal`] when the signal cannot be delivered,
    /// ESRCH included: a listed member that is already gone is still reported.
    /// Ids below 1 address process groups in `kill(2)` and are refused.
    pub fn terminate(tid: Tid) -> Result<()> {
        if tid <= 0 {
            return Err(CgroupError::InvalidArgument(format!(
                "task id must be positive, got {}",
                tid
            )));
        }

        kill(Pid::from_raw(tid), Signal::SIGTERM)
            .map_err(|source| CgroupError::Signal { tid, source })?;

        debug!(tid, "SIGTERM sent");
        Ok(())
    }

    /// Thread ids of process `pid`, from `<proc_root>/<pid>/task/`
    ///
    /// Only numeric directory entries count.
    pub fn thread_ids(proc_root: &Path, pid: Tid) -> Result<BTreeSet<Tid>> {
        let task_dir = proc_root.join(pid.to_string()).join("task");
        let entries = fs::read_dir(&task_dir).map_err(|e| CgroupError::io(&task_dir, e))?;

        let mut tids = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| CgroupError::io(&task_dir, e))?;

            // Threads may exit between readdir and stat
            let is_dir = match entry.file_type() {
                Ok(file_type) => file_type.is_dir(),
                Err(_) => continue,
            };
            if !is_dir {
                continue;
            }

            if let Some(tid) = entry.file_name().to_str().and_then(|n| n.parse::<Tid>().ok()) {
                tids.insert(tid);
            }
        }

        Ok(tids)
    }

    /// Thread ids of the calling process
    pub fn own_thread_ids(proc_root: &Path) -> Result<BTreeSet<Tid>> {
        Self::thread_ids(proc_root, Self::current_pid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::sync::mpsc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_current_thread_listed_in_proc() {
        let tids = ProcessExecutor::own_thread_ids(Path::new("/proc")).unwrap();
        assert!(tids.contains(&ProcessExecutor::current_tid()));
        assert!(tids.contains(&ProcessExecutor::current_pid()));
    }

    #[test]
    fn test_spawned_thread_listed() {
        let (tid_tx, tid_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let worker = thread::spawn(move || {
            tid_tx.send(ProcessExecutor::current_tid()).unwrap();
            done_rx.recv().unwrap();
        });

        let worker_tid = tid_rx.recv().unwrap();
        let tids = ProcessExecutor::own_thread_ids(Path::new("/proc")).unwrap();
        assert!(tids.contains(&worker_tid));
        assert_ne!(worker_tid, ProcessExecutor::current_tid());

        done_tx.send(()).unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn test_thread_ids_ignore_non_numeric() {
        let proc_root = tempdir().unwrap();
        let task_dir = proc_root.path().join("77").join("task");
        fs::create_dir_all(task_dir.join("77")).unwrap();
        fs::create_dir_all(task_dir.join("78")).unwrap();
        fs::create_dir_all(task_dir.join("self")).unwrap();
        fs::write(task_dir.join("99"), "not a dir").unwrap();

        let tids = ProcessExecutor::thread_ids(proc_root.path(), 77).unwrap();
        assert_eq!(tids.into_iter().collect::<Vec<_>>(), vec![77, 78]);
    }

    #[test]
    fn test_thread_ids_missing_process() {
        let proc_root = tempdir().unwrap();
        let err = ProcessExecutor::thread_ids(proc_root.path(), 12345).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_terminate_exited_task() {
        let mut child = Command::new("true").spawn().expect("Failed to spawn test process");
        let pid = child.id() as Tid;
        child.wait().unwrap();

        let err = ProcessExecutor::terminate(pid).unwrap_err();
        assert!(matches!(
            err,
            CgroupError::Signal {
                source: nix::errno::Errno::ESRCH,
                ..
            }
        ));
    }

    #[test]
    fn test_terminate_refuses_group_ids() {
        for tid in [0, -1, -ProcessExecutor::current_pid()] {
            let err = ProcessExecutor::terminate(tid).unwrap_err();
            assert!(matches!(err, CgroupError::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_terminate_child() {
        let mut child = Command::new("sleep")
            .arg("60")
            .spawn()
            .expect("Failed to spawn test process");

        ProcessExecutor::terminate(child.id() as Tid).unwrap();

        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}
