//! Raw control-file primitives
//!
//! One open/operate/close cycle per call. Nothing here retries, and a short
//! write is an error.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use tracing::debug;

use super::error::{CgroupError, Result};
use super::types::Scalar;

/// Upper bound for a single line returned by [`read_line`], newline included
pub const MAX_LINE_LEN: usize = 255;

/// Truncate (or create) `path` and write `value`
pub fn write_scalar(path: &Path, value: Scalar<'_>) -> Result<()> {
    let content = value.to_string();
    debug!(path = %path.display(), value = %content, "write");

    let mut file = File::create(path).map_err(|e| CgroupError::io(path, e))?;
    write_once(&mut file, path, content.as_bytes())
}

/// Append `value` and a newline to `path` without touching what is there
pub fn append_scalar(path: &Path, value: Scalar<'_>) -> Result<()> {
    let content = format!("{}\n", value);
    debug!(path = %path.display(), value = %value, "append");

    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| CgroupError::io(path, e))?;
    write_once(&mut file, path, content.as_bytes())
}

/// Write `values` as a comma list with trailing comma, e.g. `0,1,2,`
pub fn write_sequence(path: &Path, values: &[u32]) -> Result<()> {
    let encoded = encode_sequence(values)?;
    write_scalar(path, Scalar::Keyword(&encoded))
}

/// Encode a cpu/mem list the way the cpuset parser takes it
pub fn encode_sequence(values: &[u32]) -> Result<String> {
    if values.is_empty() {
        return Err(CgroupError::InvalidArgument(
            "cpu/mem list cannot be empty".to_string(),
        ));
    }

    Ok(values.iter().map(|v| format!("{},", v)).collect())
}

/// Read the first line of `path`
///
/// Returns the line with its trailing newline, the unterminated tail if the
/// file ends first, or `""` for an empty file. A line longer than
/// [`MAX_LINE_LEN`] is [`CgroupError::LineTooLong`], not a truncated read.
pub fn read_line(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| CgroupError::io(path, e))?;
    let mut reader = BufReader::new(file).take(MAX_LINE_LEN as u64);

    let mut buf = Vec::with_capacity(64);
    reader
        .read_until(b'\n', &mut buf)
        .map_err(|e| CgroupError::io(path, e))?;

    if buf.len() == MAX_LINE_LEN && buf.last() != Some(&b'\n') {
        return Err(CgroupError::LineTooLong {
            path: path.to_path_buf(),
            limit: MAX_LINE_LEN,
        });
    }

    String::from_utf8(buf).map_err(|e| {
        CgroupError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })
}

/// Read every line of `path` that starts with an integer
///
/// Lines without a leading integer (blank, partial) are skipped.
pub fn read_int_lines(path: &Path) -> Result<Vec<i64>> {
    let content = read_cgroup_file(path)?;
    Ok(content.lines().filter_map(parse_leading_int).collect())
}

/// Parse the integer at the start of `line`
///
/// Leading whitespace and one sign are accepted, trailing text is ignored:
/// `" 42 extra"` is 42, `"x42"` is `None`.
pub fn parse_leading_int(line: &str) -> Option<i64> {
    let trimmed = line.trim_start();
    let bytes = trimmed.as_bytes();

    let sign_len = usize::from(matches!(bytes.first(), Some(b'+') | Some(b'-')));
    let digits = bytes[sign_len..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();

    if digits == 0 {
        return None;
    }

    trimmed[..sign_len + digits].parse().ok()
}

/// Read the whole file to a string
pub fn read_cgroup_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| CgroupError::io(path, e))
}

fn write_once(file: &mut File, path: &Path, bytes: &[u8]) -> Result<()> {
    let written = file.write(bytes).map_err(|e| CgroupError::io(path, e))?;
    if written != bytes.len() {
        return Err(CgroupError::io(
            path,
            std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, bytes.len()),
            ),
        ));
    }

    file.flush().map_err(|e| CgroupError::io(path, e))
}
