//! CPU budget discovery for a target process's cgroup.
//!
//! Stress sizing needs to know how much of one CPU the target's cgroup may
//! use: the requested in-cgroup load is scaled by `quota / period` before it
//! is handed to stress-ng, see [`crate::commands::stress_parameters`].

use crate::error::{InjectError, Result};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

fn cpu_cgroup_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(\d*):cpu,cpuacct:/(.*)$").expect("static regex"))
}

fn cfs_period_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^cpu\.cfs_period_us: (\d*)$").expect("static regex"))
}

fn cfs_quota_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^cpu\.cfs_quota_us: (\d*)$").expect("static regex"))
}

/// Extract the cpu,cpuacct cgroup name from a `/proc/{pid}/cgroup` listing.
pub(crate) fn cgroup_name(listing: &str) -> Option<String> {
    cpu_cgroup_line()
        .captures(listing)
        .and_then(|captures| captures.get(2))
        .map(|name| name.as_str().to_string())
}

/// Parse `cpu.cfs_quota_us` and `cpu.cfs_period_us` out of `cgget -g cpu`
/// output.
pub(crate) fn cpu_limits(details: &str) -> Option<(u64, u64)> {
    let quota = cfs_quota_line()
        .captures(details)?
        .get(1)?
        .as_str()
        .parse()
        .ok()?;
    let period = cfs_period_line()
        .captures(details)?
        .get(1)?
        .as_str()
        .parse()
        .ok()?;
    Some((quota, period))
}

/// The share of one CPU the process's cgroup is allowed:
/// `cpu.cfs_quota_us / cpu.cfs_period_us`.
///
/// Any failure here aborts the fault before activation; stressing an
/// unknown budget would produce an unbounded load.
pub async fn cpu_fraction(pid: u32) -> Result<f64> {
    let path = format!("/proc/{pid}/cgroup");
    let listing = tokio::fs::read_to_string(&path)
        .await
        .map_err(|err| InjectError::CgroupDiscovery(format!("cannot read {path}: {err}")))?;
    debug!("cgroups for pid {}: {}", pid, listing.trim_end());

    let name = cgroup_name(&listing).ok_or_else(|| {
        InjectError::CgroupDiscovery(format!("no cpu,cpuacct entry in {path}"))
    })?;

    let output = tokio::process::Command::new("cgget")
        .args(["-g", "cpu", &name])
        .output()
        .await
        .map_err(|err| InjectError::CgroupDiscovery(format!("cannot run cgget: {err}")))?;
    if !output.status.success() {
        return Err(InjectError::CgroupDiscovery(format!(
            "cgget failed for '{}': {}",
            name,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let details = String::from_utf8_lossy(&output.stdout);
    let (quota, period) = cpu_limits(&details).ok_or_else(|| {
        InjectError::CgroupDiscovery(format!("no cfs quota/period in cgget output for '{name}'"))
    })?;
    if period == 0 {
        return Err(InjectError::CgroupDiscovery(format!(
            "cgroup '{name}' reports a zero cfs period"
        )));
    }
    Ok(quota as f64 / period as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cgroup_name_extraction() {
        let listing = "\
12:pids:/user.slice
4:cpu,cpuacct:/docker/abcdef123456
1:name=systemd:/user.slice/user-1000.slice
";
        assert_eq!(cgroup_name(listing).unwrap(), "docker/abcdef123456");
    }

    #[test]
    fn test_cgroup_name_missing_controller() {
        let listing = "0::/user.slice/user-1000.slice\n";
        assert!(cgroup_name(listing).is_none());
    }

    #[test]
    fn test_cpu_limits_parsing() {
        let details = "\
cpu.cfs_period_us: 100000
cpu.cfs_quota_us: 50000
cpu.shares: 1024
";
        assert_eq!(cpu_limits(details), Some((50000, 100000)));
    }

    #[test]
    fn test_cpu_limits_rejects_partial_output() {
        assert!(cpu_limits("cpu.cfs_period_us: 100000\n").is_none());
        assert!(cpu_limits("").is_none());
    }

    #[tokio::test]
    async fn test_cpu_fraction_for_unknown_pid_is_discovery_error() {
        let err = cpu_fraction(u32::MAX).await.unwrap_err();
        assert!(matches!(err, InjectError::CgroupDiscovery(_)));
    }
}
