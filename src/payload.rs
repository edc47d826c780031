use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Payload {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub load_avg: f64,
    pub agent_version: String,
    pub uptime_seconds: i64,
    pub swap_usage: f64,
    pub disk_read_bps: u64,
    pub disk_write_bps: u64,
    pub net_rx_bps: u64,
    pub net_tx_bps: u64,
    pub fs_usage: Vec<FsUsage>,
    pub collected_at: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FsUsage {
    pub mount: String,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExtendedPayload {
    #[serde(flatten)]
    pub base: Payload,
    pub meta: MetaInfo,
    pub system: SystemInfo,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub disk: DiskInfo,
    pub network: NetworkInfo,
    pub processes: ProcessesInfo,
    pub health: HealthStatus,
    pub time: TimeInfo,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MetaInfo {
    pub schema_version: u32,
    pub agent_build: BuildStamp,
    pub capabilities: Vec<&'static str>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BuildStamp {
    pub git_sha: String,
    pub build_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SystemInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    pub os: OsInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct OsInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretty_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct CpuInfo {
    pub usage_total_percent: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub usage_per_core_percent: Vec<f64>,
    pub iowait_percent: f64,
    pub steal_percent: f64,
    pub cores_logical: usize,
    pub loadavg: LoadAvgInfo,
    pub ctx_switches_per_sec: f64,
    pub interrupts_per_sec: f64,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct LoadAvgInfo {
    #[serde(rename = "1m")]
    pub one: f64,
    #[serde(rename = "5m")]
    pub five: f64,
    #[serde(rename = "15m")]
    pub fifteen: f64,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct MemoryInfo {
    pub total_mb: f64,
    pub used_mb: f64,
    pub available_mb: f64,
    pub cached_mb: f64,
    pub buffers_mb: f64,
    pub swap: SwapInfo,
    pub oom_kills_total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SwapInfo {
    pub total_mb: f64,
    pub used_mb: f64,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct DiskInfo {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DiskDeviceInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fs: Vec<DiskFsInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct DiskDeviceInfo {
    pub name: String,
    pub read_bps: u64,
    pub write_bps: u64,
    pub read_iops: f64,
    pub write_iops: f64,
    pub read_latency_ms: f64,
    pub write_latency_ms: f64,
    pub util_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct DiskFsInfo {
    pub mount: String,
    pub fstype: String,
    pub used_percent: f64,
    pub total_gb: f64,
    pub free_gb: f64,
    pub inode_used_percent: f64,
    pub readonly: bool,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct NetworkInfo {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<NetworkInterfaceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct NetworkInterfaceInfo {
    pub name: String,
    pub rx_bps: u64,
    pub tx_bps: u64,
    pub rx_pps: f64,
    pub tx_pps: f64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProcessesInfo {
    pub total: u64,
    pub zombies: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    #[default]
    Ok,
    Warning,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct HealthStatus {
    pub status: HealthLevel,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<&'static str>,
    pub scores: BTreeMap<&'static str, i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TimeInfo {
    pub collected_at_unix: i64,
    pub agent_uptime_seconds: i64,
}
