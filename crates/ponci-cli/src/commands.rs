//! Runs one parsed subcommand against a [`CgroupManager`]

use anyhow::{Context, Result};
use ponci_core::{CgroupManager, CgroupStatus, FreezerState};

use crate::cli::Commands;

/// Execute `command` and return the line to print on success
///
/// `GenerateConfig` does not touch cgroups and is handled by the caller.
pub fn execute(manager: &CgroupManager, command: &Commands) -> Result<String> {
    let message = match command {
        Commands::Create { name } => {
            manager
                .create(name)
                .with_context(|| format!("Failed to create cgroup {}", name))?;
            format!("Created {}", manager.cgroup_path(name).display())
        }
        Commands::Delete { name } => {
            manager
                .delete(name)
                .with_context(|| format!("Failed to delete cgroup {}", name))?;
            format!("Deleted {}", name)
        }
        Commands::AddTask { name, tids } => {
            for tid in tids {
                manager
                    .add_task(name, *tid)
                    .with_context(|| format!("Failed to add task {} to {}", tid, name))?;
            }
            format!("Added {} task(s) to {}", tids.len(), name)
        }
        Commands::SetCpus { name, cpus } => {
            manager
                .set_cpus(name, cpus)
                .with_context(|| format!("Failed to set cpus of {}", name))?;
            format!("{}: cpuset.cpus = {}", name, join(cpus))
        }
        Commands::SetMems { name, mems } => {
            manager
                .set_mems(name, mems)
                .with_context(|| format!("Failed to set mems of {}", name))?;
            format!("{}: cpuset.mems = {}", name, join(mems))
        }
        Commands::MemoryMigrate { name, flag } => {
            manager
                .set_memory_migrate(name, *flag)
                .with_context(|| format!("Failed to set memory_migrate of {}", name))?;
            format!("{}: cpuset.memory_migrate = {}", name, flag)
        }
        Commands::CpuExclusive { name, flag } => {
            manager
                .set_cpu_exclusive(name, *flag)
                .with_context(|| format!("Failed to set cpu_exclusive of {}", name))?;
            format!("{}: cpuset.cpu_exclusive = {}", name, flag)
        }
        Commands::MemHardwall { name, flag } => {
            manager
                .set_mem_hardwall(name, *flag)
                .with_context(|| format!("Failed to set mem_hardwall of {}", name))?;
            format!("{}: cpuset.mem_hardwall = {}", name, flag)
        }
        Commands::SchedDomain { name, level } => {
            manager
                .set_scheduling_domain(name, *level)
                .with_context(|| format!("Failed to set sched_relax_domain_level of {}", name))?;
            format!("{}: cpuset.sched_relax_domain_level = {}", name, level)
        }
        Commands::Freeze { name, wait } => {
            manager
                .freeze(name)
                .with_context(|| format!("Failed to freeze {}", name))?;
            if *wait {
                wait_for(manager, name, FreezerState::Frozen)?;
                format!("{} is FROZEN", name)
            } else {
                format!("Freeze of {} requested", name)
            }
        }
        Commands::Thaw { name, wait } => {
            manager
                .thaw(name)
                .with_context(|| format!("Failed to thaw {}", name))?;
            if *wait {
                wait_for(manager, name, FreezerState::Thawed)?;
                format!("{} is THAWED", name)
            } else {
                format!("Thaw of {} requested", name)
            }
        }
        Commands::Wait { name, state } => {
            let target = FreezerState::from(*state);
            wait_for(manager, name, target)?;
            format!("{} is {}", name, target)
        }
        Commands::Kill { name } => {
            manager
                .kill_and_remove(name)
                .with_context(|| format!("Failed to kill and remove {}", name))?;
            format!("Killed and removed {}", name)
        }
        Commands::Status { name, json } => {
            let status = manager
                .status(name)
                .with_context(|| format!("Failed to read status of {}", name))?;
            if *json {
                serde_json::to_string_pretty(&status).context("Failed to encode status")?
            } else {
                render_status(&status)
            }
        }
        Commands::GenerateConfig { .. } => {
            anyhow::bail!("generate-config is not a cgroup command")
        }
    };

    Ok(message)
}

fn wait_for(manager: &CgroupManager, name: &str, target: FreezerState) -> Result<()> {
    manager
        .wait_until(name, target)
        .with_context(|| format!("Failed waiting for {} to become {}", name, target))
}

fn join(values: &[u32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn render_status(status: &CgroupStatus) -> String {
    fn or_dash(value: Option<String>) -> String {
        value.unwrap_or_else(|| "-".to_string())
    }

    if !status.exists {
        return format!("{} does not exist ({})", status.name, status.path.display());
    }

    let tasks = status.tasks.as_ref().map(|tasks| {
        if tasks.is_empty() {
            "none".to_string()
        } else {
            tasks
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        }
    });

    [
        format!("Cgroup:  {}", status.path.display()),
        format!("Tasks:   {}", or_dash(tasks)),
        format!("Cpus:    {}", or_dash(status.cpus.clone())),
        format!("Mems:    {}", or_dash(status.mems.clone())),
        format!("Freezer: {}", or_dash(status.freezer.map(|s| s.to_string()))),
    ]
    .join("\n")
}
