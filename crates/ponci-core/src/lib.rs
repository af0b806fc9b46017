//! ponci core library
//!
//! Poor man's cgroup interface: create and remove cgroup v1 directories,
//! place tasks in them, configure cpuset and freezer, and tear groups down
//! by signalling members and waiting for them to leave.

pub mod cgroups;
pub mod executor;

pub use cgroups::{
    CgroupConfig, CgroupError, CgroupManager, CgroupStatus, FreezerState, PollPolicy, Result, Tid,
};
pub use executor::ProcessExecutor;
pub use tokio_util::sync::CancellationToken;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
