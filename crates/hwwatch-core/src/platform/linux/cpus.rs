//! Online CPU discovery.

use std::fs;

use crate::error::{BackendError, HwWatchResult};

/// Kernel list of online CPUs.
pub const ONLINE_CPUS_PATH: &str = "/sys/devices/system/cpu/online";

/// Parse a kernel CPU list such as `0-3,5,8-9`.
///
/// ## Errors
///
/// Returns `EINVAL` for anything that is not a comma-separated list of
/// numbers and ascending ranges.
pub fn parse_cpu_list(list: &str) -> Result<Vec<u32>, BackendError>
{
    let invalid = || BackendError::new(libc::EINVAL, format!("malformed cpu list {list:?}"));
    let mut cpus = Vec::new();
    for part in list.trim().split(',').filter(|part| !part.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: u32 = start.trim().parse().map_err(|_| invalid())?;
                let end: u32 = end.trim().parse().map_err(|_| invalid())?;
                if end < start {
                    return Err(invalid());
                }
                cpus.extend(start..=end);
            }
            None => cpus.push(part.trim().parse().map_err(|_| invalid())?),
        }
    }
    if cpus.is_empty() {
        return Err(invalid());
    }
    cpus.sort_unstable();
    cpus.dedup();
    Ok(cpus)
}

/// CPUs currently online.
///
/// Falls back to `0..sysconf(_SC_NPROCESSORS_ONLN)` when sysfs is unavailable.
///
/// ## Errors
///
/// Returns an error if sysfs holds a malformed list.
pub fn online_cpus() -> HwWatchResult<Vec<u32>>
{
    match fs::read_to_string(ONLINE_CPUS_PATH) {
        Ok(list) => Ok(parse_cpu_list(&list)?),
        Err(_) => {
            let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
            let count = u32::try_from(count).unwrap_or(1).max(1);
            Ok((0..count).collect())
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_ranges_and_singles()
    {
        assert_eq!(parse_cpu_list("0-3,5,8-9\n").unwrap(), vec![0, 1, 2, 3, 5, 8, 9]);
        assert_eq!(parse_cpu_list("0").unwrap(), vec![0]);
    }

    #[test]
    fn test_parse_dedups_overlaps()
    {
        assert_eq!(parse_cpu_list("0-2,1-3").unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_parse_rejects_garbage()
    {
        assert!(parse_cpu_list("").is_err());
        assert!(parse_cpu_list("a-b").is_err());
        assert!(parse_cpu_list("3-1").is_err());
    }
}
