//! Controller-specific operations for cpuset, freezer and task membership
//!
//! Everything here works on an already resolved cgroup directory. Name
//! resolution lives in [`super::manager::CgroupManager`].

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::{CgroupError, Result};
use super::poll::poll_until;
use super::types::{ControlFile, Flag, FreezerState, PollPolicy, SchedDomainLevel, Scalar, Tid};
use super::utils::{append_scalar, read_int_lines, read_line, write_scalar, write_sequence};
use super::verify::verify_scalar_present;

/// Write `value` to `file` and confirm the kernel kept it
fn write_verified(cgroup_path: &Path, file: ControlFile, value: Scalar<'_>) -> Result<()> {
    let path = file.path_in(cgroup_path);
    write_scalar(&path, value)?;
    verify_scalar_present(&path, value)
}

/// Membership operations on the `tasks` file
pub struct TasksController;

impl TasksController {
    /// Move `tid` into the cgroup and confirm it is listed
    pub fn add(cgroup_path: &Path, tid: Tid) -> Result<()> {
        if tid <= 0 {
            return Err(CgroupError::InvalidArgument(format!(
                "task id must be positive, got {}",
                tid
            )));
        }

        let tasks = ControlFile::Tasks.path_in(cgroup_path);
        let value = Scalar::Int(i64::from(tid));

        append_scalar(&tasks, value)?;
        verify_scalar_present(&tasks, value)?;

        debug!(cgroup = %cgroup_path.display(), tid, "task added");
        Ok(())
    }

    /// Current members, in kernel order
    ///
    /// Only positive ids are members; anything else in the file is skipped.
    pub fn list(cgroup_path: &Path) -> Result<Vec<Tid>> {
        let tasks = ControlFile::Tasks.path_in(cgroup_path);
        Ok(read_int_lines(&tasks)?
            .into_iter()
            .filter_map(|id| Tid::try_from(id).ok())
            .filter(|tid| *tid > 0)
            .collect())
    }
}

/// cpuset controller operations
pub struct CpusetController;

impl CpusetController {
    /// Set `cpuset.cpus`
    ///
    /// Not verified: the kernel reads back ranges (`0-2`), not the written list.
    pub fn set_cpus(cgroup_path: &Path, cpus: &[u32]) -> Result<()> {
        write_sequence(&ControlFile::CpusetCpus.path_in(cgroup_path), cpus)
    }

    /// Set `cpuset.mems`, unverified like [`Self::set_cpus`]
    pub fn set_mems(cgroup_path: &Path, mems: &[u32]) -> Result<()> {
        write_sequence(&ControlFile::CpusetMems.path_in(cgroup_path), mems)
    }

    pub fn set_memory_migrate(cgroup_path: &Path, flag: Flag) -> Result<()> {
        write_verified(cgroup_path, ControlFile::CpusetMemoryMigrate, flag.as_scalar())
    }

    pub fn set_cpu_exclusive(cgroup_path: &Path, flag: Flag) -> Result<()> {
        write_verified(cgroup_path, ControlFile::CpusetCpuExclusive, flag.as_scalar())
    }

    pub fn set_mem_hardwall(cgroup_path: &Path, flag: Flag) -> Result<()> {
        write_verified(cgroup_path, ControlFile::CpusetMemHardwall, flag.as_scalar())
    }

    /// Set `cpuset.sched_relax_domain_level`
    ///
    /// -1 is the system default, 0 disables idle balancing, 1..=5 widen the
    /// search range up to the whole system.
    pub fn set_scheduling_domain(cgroup_path: &Path, level: SchedDomainLevel) -> Result<()> {
        write_verified(
            cgroup_path,
            ControlFile::CpusetSchedRelaxDomainLevel,
            level.as_scalar(),
        )
    }

    /// First line of `cpuset.cpus`, newline stripped
    pub fn get_cpus(cgroup_path: &Path) -> Result<String> {
        let line = read_line(&ControlFile::CpusetCpus.path_in(cgroup_path))?;
        Ok(line.trim_end().to_string())
    }

    /// First line of `cpuset.mems`, newline stripped
    pub fn get_mems(cgroup_path: &Path) -> Result<String> {
        let line = read_line(&ControlFile::CpusetMems.path_in(cgroup_path))?;
        Ok(line.trim_end().to_string())
    }
}

/// freezer controller operations
pub struct FreezerController;

impl FreezerController {
    /// Request `FROZEN`; the kernel freezes tasks one by one afterwards
    pub fn freeze(cgroup_path: &Path) -> Result<()> {
        write_scalar(
            &ControlFile::FreezerState.path_in(cgroup_path),
            FreezerState::Frozen.as_scalar(),
        )?;
        info!(cgroup = %cgroup_path.display(), "freeze requested");
        Ok(())
    }

    /// Request `THAWED`
    pub fn thaw(cgroup_path: &Path) -> Result<()> {
        write_scalar(
            &ControlFile::FreezerState.path_in(cgroup_path),
            FreezerState::Thawed.as_scalar(),
        )?;
        info!(cgroup = %cgroup_path.display(), "thaw requested");
        Ok(())
    }

    /// Current state as reported by the kernel
    pub fn get_state(cgroup_path: &Path) -> Result<FreezerState> {
        read_line(&ControlFile::FreezerState.path_in(cgroup_path))?.parse()
    }

    /// Poll `freezer.state` until it reads `target`
    ///
    /// Only `FROZEN` and `THAWED` can be waited for. Unknown or empty reads
    /// (the kernel mid-update) count as "not yet".
    pub fn wait_until(
        cgroup_path: &Path,
        target: FreezerState,
        policy: &PollPolicy,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        if target == FreezerState::Freezing {
            return Err(CgroupError::InvalidArgument(
                "FREEZING is transient and cannot be waited for".to_string(),
            ));
        }

        let path = ControlFile::FreezerState.path_in(cgroup_path);
        let what = format!("{} to become {}", path.display(), target);

        poll_until(policy, cancel, &what, || {
            let line = read_line(&path)?;
            Ok(line.parse::<FreezerState>().ok() == Some(target))
        })?;

        info!(cgroup = %cgroup_path.display(), state = %target, "freezer state reached");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn quick() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), Some(Duration::from_secs(5)))
    }

    #[test]
    fn test_tasks_add_and_list() {
        let dir = tempdir().unwrap();
        TasksController::add(dir.path(), 4242).unwrap();
        TasksController::add(dir.path(), 7).unwrap();

        assert_eq!(TasksController::list(dir.path()).unwrap(), vec![4242, 7]);
    }

    #[test]
    fn test_tasks_list_skips_non_positive() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("tasks"), "0\n-1\n12\n-42\n").unwrap();

        assert_eq!(TasksController::list(dir.path()).unwrap(), vec![12]);
    }

    #[test]
    fn test_tasks_add_rejects_non_positive() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            TasksController::add(dir.path(), 0),
            Err(CgroupError::InvalidArgument(_))
        ));
        assert!(!dir.path().join("tasks").exists());
    }

    #[test]
    fn test_flag_written_and_verified() {
        let dir = tempdir().unwrap();

        CpusetController::set_cpu_exclusive(dir.path(), Flag::On).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("cpuset.cpu_exclusive")).unwrap(),
            "1"
        );

        CpusetController::set_memory_migrate(dir.path(), Flag::Off).unwrap();
        CpusetController::set_mem_hardwall(dir.path(), Flag::On).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("cpuset.mem_hardwall")).unwrap(),
            "1"
        );
    }

    #[test]
    fn test_scheduling_domain_written() {
        let dir = tempdir().unwrap();
        let level = SchedDomainLevel::try_from(-1i32).unwrap();

        CpusetController::set_scheduling_domain(dir.path(), level).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("cpuset.sched_relax_domain_level")).unwrap(),
            "-1"
        );
    }

    #[test]
    fn test_cpus_and_mems_round_trip_text() {
        let dir = tempdir().unwrap();

        CpusetController::set_cpus(dir.path(), &[0, 1, 2]).unwrap();
        CpusetController::set_mems(dir.path(), &[0]).unwrap();

        assert_eq!(CpusetController::get_cpus(dir.path()).unwrap(), "0,1,2,");
        assert_eq!(CpusetController::get_mems(dir.path()).unwrap(), "0,");
    }

    #[test]
    fn test_freeze_then_state() {
        let dir = tempdir().unwrap();

        FreezerController::freeze(dir.path()).unwrap();
        assert_eq!(
            FreezerController::get_state(dir.path()).unwrap(),
            FreezerState::Frozen
        );

        FreezerController::thaw(dir.path()).unwrap();
        assert_eq!(
            FreezerController::get_state(dir.path()).unwrap(),
            FreezerState::Thawed
        );
    }

    #[test]
    fn test_wait_follows_kernel_transition() {
        let dir = tempdir().unwrap();
        let state = dir.path().join("freezer.state");
        fs::write(&state, "FREEZING\n").unwrap();

        let kernel = {
            let state = state.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                fs::write(&state, "FROZEN\n").unwrap();
            })
        };

        FreezerController::wait_until(dir.path(), FreezerState::Frozen, &quick(), None).unwrap();
        kernel.join().unwrap();
    }

    #[test]
    fn test_wait_times_out_while_freezing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("freezer.state"), "FREEZING\n").unwrap();

        let policy = PollPolicy::new(Duration::from_millis(1), Some(Duration::from_millis(25)));
        let err = FreezerController::wait_until(dir.path(), FreezerState::Frozen, &policy, None)
            .unwrap_err();
        assert!(matches!(err, CgroupError::Timeout { .. }));
    }

    #[test]
    fn test_wait_for_freezing_rejected() {
        let dir = tempdir().unwrap();
        let err = FreezerController::wait_until(dir.path(), FreezerState::Freezing, &quick(), None)
            .unwrap_err();
        assert!(matches!(err, CgroupError::InvalidArgument(_)));
    }

    #[test]
    fn test_wait_without_freezer_file_fails() {
        let dir = tempdir().unwrap();
        let err = FreezerController::wait_until(dir.path(), FreezerState::Thawed, &quick(), None)
            .unwrap_err();
        assert!(err.is_io());
    }
}
