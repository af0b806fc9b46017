use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use ponci_core::{FreezerState, Tid, VERSION};

/// ponci - poor man's cgroup interface
///
/// Creates cgroup v1 groups, moves tasks into them, configures cpuset and
/// freezer, and tears groups down.
#[derive(Parser, Debug)]
#[command(name = "ponci")]
#[command(version = VERSION)]
#[command(about = "Poor man's cgroup v1 interface", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/ponci/config.toml")]
    pub config: PathBuf,

    /// Fixed cgroup mount prefix (overrides config and PONCI_PATH)
    #[arg(long)]
    pub prefix: Option<PathBuf>,

    /// Give up waiting after this long, e.g. "500ms" or "30s"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Create a cgroup (succeeds if it exists)
    Create { name: String },

    /// Remove an empty cgroup
    Delete { name: String },

    /// Move tasks into a cgroup, verifying each
    AddTask {
        name: String,
        #[arg(required = true)]
        tids: Vec<Tid>,
    },

    /// Set cpuset.cpus from a comma separated list
    SetCpus {
        name: String,
        #[arg(value_delimiter = ',', required = true)]
        cpus: Vec<u32>,
    },

    /// Set cpuset.mems from a comma separated list
    SetMems {
        name: String,
        #[arg(value_delimiter = ',', required = true)]
        mems: Vec<u32>,
    },

    /// Set cpuset.memory_migrate (0 or 1)
    MemoryMigrate { name: String, flag: i64 },

    /// Set cpuset.cpu_exclusive (0 or 1)
    CpuExclusive { name: String, flag: i64 },

    /// Set cpuset.mem_hardwall (0 or 1)
    MemHardwall { name: String, flag: i64 },

    /// Set cpuset.sched_relax_domain_level (-1 to 5)
    SchedDomain {
        name: String,
        #[arg(allow_negative_numbers = true)]
        level: i32,
    },

    /// Request FROZEN
    Freeze {
        name: String,
        /// Block until the freezer reports FROZEN
        #[arg(short, long)]
        wait: bool,
    },

    /// Request THAWED
    Thaw {
        name: String,
        /// Block until the freezer reports THAWED
        #[arg(short, long)]
        wait: bool,
    },

    /// Block until the freezer reaches a state
    Wait { name: String, state: WaitState },

    /// SIGTERM all members, wait for them to leave, remove the cgroup
    Kill { name: String },

    /// Show members, cpuset and freezer state
    Status {
        name: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Output path for config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

/// Freezer states that can be waited for
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Frozen,
    Thawed,
}

impl From<WaitState> for FreezerState {
    fn from(state: WaitState) -> Self {
        match state {
            WaitState::Frozen => FreezerState::Frozen,
            WaitState::Thawed => FreezerState::Thawed,
        }
    }
}
