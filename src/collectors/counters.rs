//! Parsers for point-in-time counter snapshots read from procfs.
//!
//! Every function here is pure over the text handed in; reading the text is
//! the job of a [`CounterSource`](super::source::CounterSource).

use super::source::CounterSource;
use super::ReadError;
use std::collections::{BTreeMap, HashMap};

pub const SECTOR_SIZE: u64 = 512;

const DISK_PREFIXES: [&str; 4] = ["sd", "vd", "nvme", "mmcblk"];

const PSEUDO_FS_TYPES: [&str; 12] = [
    "proc",
    "sysfs",
    "devtmpfs",
    "tmpfs",
    "cgroup",
    "cgroup2",
    "devpts",
    "overlay",
    "squashfs",
    "rpc_pipefs",
    "fusectl",
    "autofs",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
    pub iowait: u64,
    pub steal: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuStat {
    /// Keyed by label: `cpu` for the aggregate line, `cpuN` per core.
    pub cpus: HashMap<String, CpuTimes>,
    pub ctxt: u64,
    pub intr: u64,
    pub btime: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemInfo {
    values: HashMap<String, u64>,
}

impl MemInfo {
    /// Value of `key` in kibibytes, 0 when the key is absent.
    pub fn kib(&self, key: &str) -> u64 {
        self.values.get(key).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCounters {
    pub reads: u64,
    pub read_bytes: u64,
    pub read_time_ms: u64,
    pub writes: u64,
    pub write_bytes: u64,
    pub write_time_ms: u64,
    pub io_ticks_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskTotals {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetTotals {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadAvg {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub mount: String,
    pub fs_type: String,
    pub options: String,
}

impl MountEntry {
    pub fn is_readonly(&self) -> bool {
        self.options.split(',').any(|opt| opt == "ro")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
    pub id: Option<String>,
    pub version_id: Option<String>,
    pub pretty_name: Option<String>,
}

pub fn is_disk_device(name: &str) -> bool {
    DISK_PREFIXES.iter().any(|p| name.starts_with(p))
}

pub fn is_pseudo_fs(fs_type: &str) -> bool {
    PSEUDO_FS_TYPES.contains(&fs_type)
}

fn parse_u64(source_name: &str, value: &str) -> Result<u64, ReadError> {
    value
        .parse()
        .map_err(|_| ReadError::malformed(source_name, format!("invalid counter '{value}'")))
}

fn parse_f64(source_name: &str, value: &str) -> Result<f64, ReadError> {
    value
        .parse()
        .map_err(|_| ReadError::malformed(source_name, format!("invalid number '{value}'")))
}

fn parse_cpu_fields(fields: &[&str]) -> Result<CpuTimes, ReadError> {
    let values = fields[1..]
        .iter()
        .map(|v| parse_u64("stat", v))
        .collect::<Result<Vec<_>, _>>()?;
    let field = |i: usize| values.get(i).copied().unwrap_or(0);
    let total = values
        .iter()
        .try_fold(0u64, |acc, v| acc.checked_add(*v))
        .ok_or_else(|| ReadError::malformed("stat", "tick sum overflow"))?;

    Ok(CpuTimes {
        idle: field(3),
        total,
        iowait: field(4),
        steal: field(7),
    })
}

/// System-wide tick counters from the first line of `/proc/stat`.
pub fn parse_cpu_totals(text: &str) -> Result<CpuTimes, ReadError> {
    let first = text
        .lines()
        .next()
        .ok_or_else(|| ReadError::malformed("stat", "empty"))?;
    let fields: Vec<&str> = first.split_whitespace().collect();
    if fields.len() < 5 {
        return Err(ReadError::malformed(
            "stat",
            format!("expected at least 5 fields, got {}", fields.len()),
        ));
    }
    parse_cpu_fields(&fields)
}

pub fn parse_cpu_stat(text: &str) -> Result<CpuStat, ReadError> {
    let mut stat = CpuStat::default();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(&label) = fields.first() else {
            continue;
        };

        if label.starts_with("cpu") {
            if fields.len() < 5 {
                continue;
            }
            stat.cpus.insert(label.to_string(), parse_cpu_fields(&fields)?);
            continue;
        }

        let value = fields.get(1).copied();
        match label {
            "ctxt" => stat.ctxt = value.and_then(|v| v.parse().ok()).unwrap_or(0),
            "intr" => stat.intr = value.and_then(|v| v.parse().ok()).unwrap_or(0),
            "btime" => stat.btime = value.and_then(|v| v.parse().ok()),
            _ => {}
        }
    }
    Ok(stat)
}

pub fn parse_meminfo(text: &str) -> Result<MemInfo, ReadError> {
    let mut values = HashMap::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }
        let key = fields[0].trim_end_matches(':');
        values.insert(key.to_string(), parse_u64("meminfo", fields[1])?);
    }
    Ok(MemInfo { values })
}

/// Per-device counters for physical and virtual disks, sectors already in bytes.
pub fn parse_diskstats(text: &str) -> Result<BTreeMap<String, DeviceCounters>, ReadError> {
    let mut devices = BTreeMap::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 14 {
            continue;
        }
        let name = fields[2];
        if !is_disk_device(name) {
            continue;
        }
        let counter = |i: usize| parse_u64("diskstats", fields[i]);
        devices.insert(
            name.to_string(),
            DeviceCounters {
                reads: counter(3)?,
                read_bytes: counter(5)?.saturating_mul(SECTOR_SIZE),
                read_time_ms: counter(6)?,
                writes: counter(7)?,
                write_bytes: counter(9)?.saturating_mul(SECTOR_SIZE),
                write_time_ms: counter(10)?,
                io_ticks_ms: counter(12)?,
            },
        );
    }
    Ok(devices)
}

pub fn disk_totals(devices: &BTreeMap<String, DeviceCounters>) -> DiskTotals {
    devices.values().fold(DiskTotals::default(), |acc, d| DiskTotals {
        read_bytes: acc.read_bytes.wrapping_add(d.read_bytes),
        write_bytes: acc.write_bytes.wrapping_add(d.write_bytes),
    })
}

pub fn parse_net_dev(text: &str) -> Result<BTreeMap<String, NetCounters>, ReadError> {
    let mut interfaces = BTreeMap::new();
    for line in text.lines().skip(2) {
        let Some((iface, rest)) = line.trim().split_once(':') else {
            continue;
        };
        let fields: Vec<&str> = rest.split_whitespace().collect();
        if fields.len() < 16 {
            continue;
        }
        let counter = |i: usize| parse_u64("net/dev", fields[i]);
        interfaces.insert(
            iface.trim().to_string(),
            NetCounters {
                rx_bytes: counter(0)?,
                rx_packets: counter(1)?,
                rx_errors: counter(2)?,
                tx_bytes: counter(8)?,
                tx_packets: counter(9)?,
                tx_errors: counter(10)?,
                dropped: counter(3)?.saturating_add(counter(11)?),
            },
        );
    }
    Ok(interfaces)
}

/// Byte totals across all interfaces except loopback.
pub fn net_totals(interfaces: &BTreeMap<String, NetCounters>) -> NetTotals {
    interfaces
        .iter()
        .filter(|(name, _)| name.as_str() != "lo")
        .fold(NetTotals::default(), |acc, (_, n)| NetTotals {
            rx_bytes: acc.rx_bytes.wrapping_add(n.rx_bytes),
            tx_bytes: acc.tx_bytes.wrapping_add(n.tx_bytes),
        })
}

pub fn parse_loadavg(text: &str) -> Result<LoadAvg, ReadError> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(ReadError::malformed(
            "loadavg",
            format!("expected 3 fields, got {}", fields.len()),
        ));
    }
    Ok(LoadAvg {
        one: parse_f64("loadavg", fields[0])?,
        five: parse_f64("loadavg", fields[1])?,
        fifteen: parse_f64("loadavg", fields[2])?,
    })
}

pub fn parse_uptime(text: &str) -> Result<i64, ReadError> {
    let first = text
        .split_whitespace()
        .next()
        .ok_or_else(|| ReadError::malformed("uptime", "empty"))?;
    Ok(parse_f64("uptime", first)? as i64)
}

pub fn parse_mounts(text: &str) -> Vec<MountEntry> {
    text.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                return None;
            }
            Some(MountEntry {
                mount: fields[1].to_string(),
                fs_type: fields[2].to_string(),
                options: fields.get(3).copied().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// State character of a `/proc/<pid>/stat` line. The command name is
/// parenthesised and may itself contain spaces or parentheses.
pub fn parse_process_state(text: &str) -> Result<char, ReadError> {
    let (_, rest) = text
        .rsplit_once(')')
        .ok_or_else(|| ReadError::malformed("pid/stat", "missing command name"))?;
    rest.split_whitespace()
        .next()
        .and_then(|s| s.chars().next())
        .ok_or_else(|| ReadError::malformed("pid/stat", "missing state"))
}

pub fn parse_vmstat_oom_kills(text: &str) -> u64 {
    text.lines()
        .filter_map(|line| line.strip_prefix("oom_kill "))
        .find_map(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

pub fn parse_os_release(text: &str) -> OsRelease {
    let mut values: HashMap<&str, String> = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            values.insert(key, value.trim_matches('"').to_string());
        }
    }
    OsRelease {
        id: values.remove("ID"),
        version_id: values.remove("VERSION_ID"),
        pretty_name: values.remove("PRETTY_NAME"),
    }
}

pub fn read_cpu_totals(source: &dyn CounterSource) -> Result<CpuTimes, ReadError> {
    parse_cpu_totals(&source.read("stat")?)
}

pub fn read_cpu_stat(source: &dyn CounterSource) -> Result<CpuStat, ReadError> {
    parse_cpu_stat(&source.read("stat")?)
}

pub fn read_meminfo(source: &dyn CounterSource) -> Result<MemInfo, ReadError> {
    parse_meminfo(&source.read("meminfo")?)
}

pub fn read_diskstats(
    source: &dyn CounterSource,
) -> Result<BTreeMap<String, DeviceCounters>, ReadError> {
    parse_diskstats(&source.read("diskstats")?)
}

pub fn read_net_dev(source: &dyn CounterSource) -> Result<BTreeMap<String, NetCounters>, ReadError> {
    parse_net_dev(&source.read("net/dev")?)
}

pub fn read_loadavg(source: &dyn CounterSource) -> Result<LoadAvg, ReadError> {
    parse_loadavg(&source.read("loadavg")?)
}

pub fn read_uptime(source: &dyn CounterSource) -> Result<i64, ReadError> {
    parse_uptime(&source.read("uptime")?)
}

/// Mounts with a real backing filesystem, in enumeration order.
pub fn read_capacity_mounts(source: &dyn CounterSource) -> Result<Vec<MountEntry>, ReadError> {
    Ok(parse_mounts(&source.read("mounts")?)
        .into_iter()
        .filter(|m| !is_pseudo_fs(&m.fs_type))
        .collect())
}

pub fn read_oom_kills(source: &dyn CounterSource) -> u64 {
    source
        .read("vmstat")
        .map(|text| parse_vmstat_oom_kills(&text))
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessCounts {
    pub total: u64,
    pub zombies: u64,
}

pub fn read_process_counts(source: &dyn CounterSource) -> Result<ProcessCounts, ReadError> {
    let mut counts = ProcessCounts::default();
    for pid in source.process_ids()? {
        counts.total += 1;
        let state = source
            .read(&format!("{pid}/stat"))
            .and_then(|text| parse_process_state(&text));
        if matches!(state, Ok('Z')) {
            counts.zombies += 1;
        }
    }
    Ok(counts)
}
