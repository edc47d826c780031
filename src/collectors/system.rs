use super::counters::{parse_os_release, read_cpu_stat};
use super::source::CounterSource;
use crate::payload::{OsInfo, SystemInfo};
use std::time::{Duration, UNIX_EPOCH};
use sysinfo::{System, SystemExt};
use tracing::debug;

/// Host identity. Each field is read on its own; whatever is unavailable is
/// left empty instead of failing the section.
pub fn collect_system(source: &dyn CounterSource) -> SystemInfo {
    let system = System::new();
    let host_name = system.host_name();
    let kernel_version = system.kernel_version();

    let os = match source.os_release() {
        Ok(text) => {
            let release = parse_os_release(&text);
            OsInfo {
                name: release.id,
                version: release.version_id,
                pretty_name: release.pretty_name,
            }
        }
        Err(err) => {
            debug!(error = %err, "os-release unavailable");
            OsInfo::default()
        }
    };

    let boot_time = match read_cpu_stat(source) {
        Ok(stat) => stat.btime.and_then(format_unix),
        Err(err) => {
            debug!(error = %err, "boot time unavailable");
            None
        }
    };

    SystemInfo {
        fqdn: host_name.clone(),
        hostname: host_name,
        os,
        kernel: kernel_version,
        arch: std::env::consts::ARCH.to_string(),
        boot_time,
    }
}

pub fn logical_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(0)
}

/// RFC 3339 UTC rendering of a unix timestamp.
pub fn format_unix(secs: i64) -> Option<String> {
    let secs = u64::try_from(secs).ok()?;
    let at = UNIX_EPOCH.checked_add(Duration::from_secs(secs))?;
    Some(humantime::format_rfc3339_seconds(at).to_string())
}
