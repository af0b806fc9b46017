//! Write-then-verify readback
//!
//! A `write(2)` to cgroupfs can succeed while the controller ignores the value
//! (a cpu outside the parent's set, a task that already exited). The only way
//! to tell is to read the file back.

use std::path::Path;

use tracing::warn;

use super::error::{CgroupError, Result};
use super::types::Scalar;
use super::utils::{parse_leading_int, read_cgroup_file};

/// Succeed if some line of `path` decodes to `value`
///
/// Lines are decoded as the same kind as `value`: the leading integer for
/// [`Scalar::Int`], the whitespace-trimmed text for [`Scalar::Keyword`].
pub fn verify_scalar_present(path: &Path, value: Scalar<'_>) -> Result<()> {
    let content = read_cgroup_file(path)?;

    let found = content.lines().any(|line| match value {
        Scalar::Int(expected) => parse_leading_int(line) == Some(expected),
        Scalar::Keyword(expected) => line.trim() == expected,
    });

    if found {
        return Ok(());
    }

    warn!(path = %path.display(), expected = %value, "value not present on readback");
    Err(CgroupError::Verification {
        path: path.to_path_buf(),
        expected: value.to_string(),
    })
}
