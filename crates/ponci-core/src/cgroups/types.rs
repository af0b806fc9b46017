//! Data types for cgroup management

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{CgroupError, Result};

/// Kernel thread or process id, as accepted by the `tasks` file.
pub type Tid = libc::pid_t;

/// Default cgroup v1 mount prefix
pub const DEFAULT_PREFIX: &str = "/sys/fs/cgroup/";

/// Environment variable that overrides the mount prefix
pub const PREFIX_ENV_VAR: &str = "PONCI_PATH";

/// Control files inside a cgroup directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlFile {
    Tasks,
    CpusetCpus,
    CpusetMems,
    CpusetMemoryMigrate,
    CpusetCpuExclusive,
    CpusetMemHardwall,
    CpusetSchedRelaxDomainLevel,
    FreezerState,
}

impl ControlFile {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::CpusetCpus => "cpuset.cpus",
            Self::CpusetMems => "cpuset.mems",
            Self::CpusetMemoryMigrate => "cpuset.memory_migrate",
            Self::CpusetCpuExclusive => "cpuset.cpu_exclusive",
            Self::CpusetMemHardwall => "cpuset.mem_hardwall",
            Self::CpusetSchedRelaxDomainLevel => "cpuset.sched_relax_domain_level",
            Self::FreezerState => "freezer.state",
        }
    }

    /// Path of this file inside `cgroup_path`
    pub fn path_in(self, cgroup_path: &Path) -> PathBuf {
        cgroup_path.join(self.file_name())
    }
}

impl fmt::Display for ControlFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// A single value as written to or read back from a control file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar<'a> {
    Int(i64),
    Keyword(&'a str),
}

impl fmt::Display for Scalar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Keyword(k) => f.write_str(k),
        }
    }
}

/// Boolean cpuset attribute, encoded as `0` or `1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    Off,
    On,
}

impl Flag {
    pub fn as_scalar(self) -> Scalar<'static> {
        match self {
            Flag::Off => Scalar::Int(0),
            Flag::On => Scalar::Int(1),
        }
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        if value {
            Flag::On
        } else {
            Flag::Off
        }
    }
}

impl TryFrom<i64> for Flag {
    type Error = CgroupError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Flag::Off),
            1 => Ok(Flag::On),
            other => Err(CgroupError::InvalidArgument(format!(
                "flag must be 0 or 1, got {}",
                other
            ))),
        }
    }
}

/// Value for `cpuset.sched_relax_domain_level`, always within [-1, 5]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchedDomainLevel(i32);

impl SchedDomainLevel {
    pub const MIN: i32 = -1;
    pub const MAX: i32 = 5;

    pub fn get(self) -> i32 {
        self.0
    }

    pub fn as_scalar(self) -> Scalar<'static> {
        Scalar::Int(i64::from(self.0))
    }
}

impl TryFrom<i32> for SchedDomainLevel {
    type Error = CgroupError;

    fn try_from(level: i32) -> Result<Self> {
        if !(Self::MIN..=Self::MAX).contains(&level) {
            return Err(CgroupError::InvalidArgument(format!(
                "scheduling domain level must be {}..={}, got {}",
                Self::MIN,
                Self::MAX,
                level
            )));
        }
        Ok(Self(level))
    }
}

/// Freezer controller state as shown in `freezer.state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FreezerState {
    Thawed,
    /// Transient, only ever reported by the kernel
    Freezing,
    Frozen,
}

impl FreezerState {
    pub fn as_str(self) -> &'static str {
        match self {
            FreezerState::Thawed => "THAWED",
            FreezerState::Freezing => "FREEZING",
            FreezerState::Frozen => "FROZEN",
        }
    }

    pub fn as_scalar(self) -> Scalar<'static> {
        Scalar::Keyword(self.as_str())
    }
}

impl fmt::Display for FreezerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FreezerState {
    type Err = CgroupError;

    /// Accepts the kernel text with or without its trailing newline
    fn from_str(s: &str) -> Result<Self> {
        match s.trim_end() {
            "THAWED" => Ok(FreezerState::Thawed),
            "FREEZING" => Ok(FreezerState::Freezing),
            "FROZEN" => Ok(FreezerState::Frozen),
            other => Err(CgroupError::Parse(format!(
                "Unknown freezer state: {:?}",
                other
            ))),
        }
    }
}

/// Where the cgroup mount prefix comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefixSource {
    /// Looked up in `var` on every path resolution, `default` when unset
    Env { var: String, default: PathBuf },
    Fixed(PathBuf),
}

impl PrefixSource {
    pub fn resolve(&self) -> PathBuf {
        match self {
            PrefixSource::Env { var, default } => std::env::var_os(var)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| default.clone()),
            PrefixSource::Fixed(prefix) => prefix.clone(),
        }
    }
}

impl Default for PrefixSource {
    fn default() -> Self {
        PrefixSource::Env {
            var: PREFIX_ENV_VAR.to_string(),
            default: PathBuf::from(DEFAULT_PREFIX),
        }
    }
}

/// How the freezer wait and the kill drain poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between two probes
    pub interval: Duration,

    /// Give up after this long; `None` waits forever
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(default_poll_interval_ms()),
            timeout: None,
        }
    }
}

/// Cgroup manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CgroupConfig {
    /// Fixed mount prefix; when absent the env var is consulted on each call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<PathBuf>,

    /// Env var overriding the prefix
    #[serde(default = "default_prefix_env_var")]
    pub prefix_env_var: String,

    /// Procfs mount used to list the caller's threads
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,

    /// Poll interval for freezer waits and kill drain (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Overall wait timeout (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,
}

fn default_prefix_env_var() -> String {
    PREFIX_ENV_VAR.to_string()
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_poll_interval_ms() -> u64 {
    10
}

impl CgroupConfig {
    pub fn with_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    /// Sub-millisecond remainders round up, so only a zero timeout maps to 0
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        let millis = (timeout.as_nanos() + 999_999) / 1_000_000;
        self.wait_timeout_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_none() && self.prefix_env_var.is_empty() {
            return Err(CgroupError::InvalidArgument(
                "prefix_env_var cannot be empty when no prefix is fixed".to_string(),
            ));
        }

        if self.wait_timeout_ms == Some(0) {
            return Err(CgroupError::InvalidArgument(
                "wait_timeout_ms must be > 0 (omit it to wait forever)".to_string(),
            ));
        }

        Ok(())
    }

    pub fn prefix_source(&self) -> PrefixSource {
        match &self.prefix {
            Some(prefix) => PrefixSource::Fixed(prefix.clone()),
            None => PrefixSource::Env {
                var: self.prefix_env_var.clone(),
                default: PathBuf::from(DEFAULT_PREFIX),
            },
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout: self.wait_timeout_ms.map(Duration::from_millis),
        }
    }
}

impl Default for CgroupConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            prefix_env_var: default_prefix_env_var(),
            proc_root: default_proc_root(),
            poll_interval_ms: default_poll_interval_ms(),
            wait_timeout_ms: None,
        }
    }
}

/// Point-in-time view of one cgroup, each part absent when its file is
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CgroupStatus {
    pub name: String,
    pub path: PathBuf,
    pub exists: bool,
    pub tasks: Option<Vec<Tid>>,
    pub cpus: Option<String>,
    pub mems: Option<String>,
    pub freezer: Option<FreezerState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_rejects_out_of_range() {
        assert_eq!(Flag::try_from(0i64).unwrap(), Flag::Off);
        assert_eq!(Flag::try_from(1i64).unwrap(), Flag::On);

        for bad in [2i64, -1, 255] {
            let err = Flag::try_from(bad).unwrap_err();
            assert!(matches!(err, CgroupError::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_flag_encoding() {
        assert_eq!(Flag::from(true).as_scalar(), Scalar::Int(1));
        assert_eq!(Flag::from(false).as_scalar().to_string(), "0");
    }

    #[test]
    fn test_sched_domain_level_bounds() {
        assert_eq!(SchedDomainLevel::try_from(-1i32).unwrap().get(), -1);
        assert_eq!(SchedDomainLevel::try_from(5i32).unwrap().get(), 5);
        assert!(SchedDomainLevel::try_from(-2i32).is_err());
        assert!(SchedDomainLevel::try_from(6i32).is_err());
        assert_eq!(
            SchedDomainLevel::try_from(-1i32).unwrap().as_scalar().to_string(),
            "-1"
        );
    }

    #[test]
    fn test_freezer_state_parse() {
        assert_eq!("FROZEN\n".parse::<FreezerState>().unwrap(), FreezerState::Frozen);
        assert_eq!("THAWED".parse::<FreezerState>().unwrap(), FreezerState::Thawed);
        assert_eq!(
            "FREEZING\n".parse::<FreezerState>().unwrap(),
            FreezerState::Freezing
        );
        assert!("".parse::<FreezerState>().is_err());
        assert!("frozen".parse::<FreezerState>().is_err());
    }

    #[test]
    fn test_freezer_state_serde() {
        let json = serde_json::to_string(&FreezerState::Frozen).unwrap();
        assert_eq!(json, r#""FROZEN""#);
    }

    #[test]
    fn test_control_file_names() {
        let dir = Path::new("/sys/fs/cgroup/g1");
        assert_eq!(
            ControlFile::CpusetSchedRelaxDomainLevel.path_in(dir),
            PathBuf::from("/sys/fs/cgroup/g1/cpuset.sched_relax_domain_level")
        );
        assert_eq!(ControlFile::Tasks.to_string(), "tasks");
    }

    #[test]
    fn test_prefix_source_fixed() {
        let source = PrefixSource::Fixed(PathBuf::from("/tmp/cg"));
        assert_eq!(source.resolve(), PathBuf::from("/tmp/cg"));
    }

    #[test]
    fn test_prefix_source_env_read_every_call() {
        let var = "PONCI_TEST_PREFIX_SOURCE_ENV";
        let source = PrefixSource::Env {
            var: var.to_string(),
            default: PathBuf::from(DEFAULT_PREFIX),
        };

        std::env::remove_var(var);
        assert_eq!(source.resolve(), PathBuf::from(DEFAULT_PREFIX));

        std::env::set_var(var, "/tmp/first/");
        assert_eq!(source.resolve(), PathBuf::from("/tmp/first/"));

        std::env::set_var(var, "/tmp/second/");
        assert_eq!(source.resolve(), PathBuf::from("/tmp/second/"));

        std::env::remove_var(var);
    }

    #[test]
    fn test_default_config() {
        let config = CgroupConfig::default();
        assert_eq!(config.prefix, None);
        assert_eq!(config.prefix_env_var, "PONCI_PATH");
        assert_eq!(config.proc_root, PathBuf::from("/proc"));
        assert_eq!(config.poll_policy(), PollPolicy::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.prefix_source(), PrefixSource::default());
    }

    #[test]
    fn test_config_validation() {
        let config = CgroupConfig {
            wait_timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CgroupConfig {
            prefix_env_var: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CgroupConfig {
            prefix_env_var: String::new(),
            ..Default::default()
        }
        .with_prefix("/tmp/cg");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_wait_timeout_rounds_up() {
        let config = CgroupConfig::default().with_wait_timeout(Duration::from_micros(500));
        assert_eq!(config.wait_timeout_ms, Some(1));
        assert!(config.validate().is_ok());

        let config = CgroupConfig::default().with_wait_timeout(Duration::from_micros(1500));
        assert_eq!(config.wait_timeout_ms, Some(2));

        let config = CgroupConfig::default().with_wait_timeout(Duration::from_secs(3));
        assert_eq!(config.wait_timeout_ms, Some(3000));

        let config = CgroupConfig::default().with_wait_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_toml_partial() {
        let config: CgroupConfig = toml::from_str(
            r#"
            prefix = "/mnt/cgroup/"
            wait_timeout_ms = 2500
            "#,
        )
        .unwrap();

        assert_eq!(config.prefix_source(), PrefixSource::Fixed("/mnt/cgroup/".into()));
        assert_eq!(config.poll_interval_ms, 10);
        assert_eq!(
            config.poll_policy().timeout,
            Some(Duration::from_millis(2500))
        );
    }
}
