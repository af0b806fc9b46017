//! Cgroup v1 control plane
//!
//! Turns cgroupfs writes into synchronous, checked operations on one named
//! cgroup at a time: cpuset configuration (verified by readback), task
//! membership, freezer transitions with bounded waits, and signal-and-drain
//! teardown.

pub mod controller;
pub mod error;
pub mod manager;
pub mod poll;
pub mod types;
pub mod utils;
pub mod verify;

pub use controller::{CpusetController, FreezerController, TasksController};
pub use error::{CgroupError, Result};
pub use manager::CgroupManager;
pub use poll::poll_until;
pub use types::{
    CgroupConfig, CgroupStatus, ControlFile, Flag, FreezerState, PollPolicy, PrefixSource,
    SchedDomainLevel, Scalar, Tid, DEFAULT_PREFIX, PREFIX_ENV_VAR,
};
pub use verify::verify_scalar_present;
