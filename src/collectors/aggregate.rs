use super::counters::{
    disk_totals, net_totals, read_capacity_mounts, read_cpu_stat, read_cpu_totals,
    read_diskstats, read_loadavg, read_meminfo, read_net_dev, read_oom_kills,
    read_process_counts, read_uptime, DeviceCounters, MemInfo,
};
use super::health::evaluate;
use super::sampler::{
    cpu_breakdown, cpu_usage, percent, rate, sample, Delta, CPU_WINDOW, DISK_WINDOW, NET_WINDOW,
};
use super::source::{CounterSource, FsStat};
use super::system::{collect_system, logical_cores};
use super::{CollectError, ReadError};
use crate::config::BuildInfo;
use crate::payload::{
    BuildStamp, CpuInfo, DiskDeviceInfo, DiskFsInfo, DiskInfo, ExtendedPayload, FsUsage,
    LoadAvgInfo, MemoryInfo, MetaInfo, NetworkInfo, NetworkInterfaceInfo, Payload,
    ProcessesInfo, SwapInfo, TimeInfo,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub const SCHEMA_VERSION: u32 = 2;
pub const CAPABILITIES: [&str; 7] = [
    "system",
    "cpu",
    "memory",
    "disk",
    "network",
    "processes",
    "health",
];

const TOP_MOUNTS: usize = 3;
const KIB_PER_MB: f64 = 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// The extended document plus the sections that fell back to zero values.
#[derive(Debug, Clone)]
pub struct ExtendedReport {
    pub payload: ExtendedPayload,
    pub degraded: Vec<&'static str>,
}

#[derive(Clone)]
pub struct Aggregator {
    source: Arc<dyn CounterSource>,
    build: BuildInfo,
}

impl Aggregator {
    pub fn new(source: Arc<dyn CounterSource>, build: BuildInfo) -> Self {
        Self { source, build }
    }

    /// Headline numbers. Any failed read fails the whole payload.
    pub async fn build_basic(&self) -> Result<Payload, CollectError> {
        let source = self.source.as_ref();

        let (cpu_usage, (disk_read_bps, disk_write_bps), (net_rx_bps, net_tx_bps)) =
            tokio::try_join!(self.sample_cpu(), self.sample_disk_io(), self.sample_net_io())?;

        let memory = read_meminfo(source)?;
        let memory_usage = memory_usage(&memory)?;
        let root = self.blocking(|source| source.fs_stat("/")).await??;
        let disk_usage = capacity_percent(&root)
            .ok_or_else(|| ReadError::malformed("statvfs /", "zero blocks"))?;
        let load = read_loadavg(source)?;
        let uptime_seconds = read_uptime(source)?;
        let fs_usage = self.blocking(top_fs_usage).await??;

        Ok(Payload {
            cpu_usage,
            memory_usage,
            disk_usage,
            load_avg: load.one,
            agent_version: self.build.version.clone(),
            uptime_seconds,
            swap_usage: swap_usage(&memory),
            disk_read_bps,
            disk_write_bps,
            net_rx_bps,
            net_tx_bps,
            fs_usage,
            collected_at: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
        })
    }

    /// Basic payload plus per-subsystem detail. Only a basic payload failure
    /// is an error; detail sections degrade to their zero values.
    pub async fn build_extended(&self) -> Result<ExtendedReport, CollectError> {
        let source = self.source.as_ref();

        let (base, cpu, disk, network) = tokio::join!(
            self.build_basic(),
            self.cpu_detail(),
            self.disk_detail(),
            self.network_detail()
        );
        let base = base?;

        let mut degraded = Vec::new();
        let cpu = settle("cpu", cpu, &mut degraded);
        let disk = settle("disk", disk, &mut degraded);
        let network = settle("network", network, &mut degraded);
        let memory = settle("memory", memory_detail(source), &mut degraded);
        let processes = settle(
            "processes",
            read_process_counts(source)
                .map(|c| ProcessesInfo {
                    total: c.total,
                    zombies: c.zombies,
                })
                .map_err(CollectError::from),
            &mut degraded,
        );
        let system = collect_system(source);
        let health = evaluate(&base, &memory);
        let host_uptime_seconds = base.uptime_seconds;

        let collected_at_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Ok(ExtendedReport {
            payload: ExtendedPayload {
                base,
                meta: MetaInfo {
                    schema_version: SCHEMA_VERSION,
                    agent_build: BuildStamp {
                        git_sha: self.build.git_sha.clone(),
                        build_time: self.build.build_time.clone(),
                    },
                    capabilities: CAPABILITIES.to_vec(),
                },
                system,
                cpu,
                memory,
                disk,
                network,
                processes,
                health,
                time: TimeInfo {
                    collected_at_unix,
                    agent_uptime_seconds: host_uptime_seconds,
                },
            },
            degraded,
        })
    }

    /// Runs `f` on the blocking pool; statvfs can hang on an unresponsive
    /// network mount.
    async fn blocking<T, F>(&self, f: F) -> Result<T, CollectError>
    where
        F: FnOnce(&dyn CounterSource) -> T + Send + 'static,
        T: Send + 'static,
    {
        let source = Arc::clone(&self.source);
        Ok(tokio::task::spawn_blocking(move || f(source.as_ref())).await?)
    }

    async fn sample_cpu(&self) -> Result<f64, CollectError> {
        let delta = sample(CPU_WINDOW, || read_cpu_totals(self.source.as_ref())).await?;
        Ok(cpu_usage(&delta.before, &delta.after)?)
    }

    async fn sample_disk_io(&self) -> Result<(u64, u64), CollectError> {
        let delta = sample(DISK_WINDOW, || {
            read_diskstats(self.source.as_ref()).map(|d| disk_totals(&d))
        })
        .await?;
        Ok((
            delta.rate(|t| t.read_bytes) as u64,
            delta.rate(|t| t.write_bytes) as u64,
        ))
    }

    async fn sample_net_io(&self) -> Result<(u64, u64), CollectError> {
        let delta = sample(NET_WINDOW, || {
            read_net_dev(self.source.as_ref()).map(|n| net_totals(&n))
        })
        .await?;
        Ok((
            delta.rate(|t| t.rx_bytes) as u64,
            delta.rate(|t| t.tx_bytes) as u64,
        ))
    }

    async fn cpu_detail(&self) -> Result<CpuInfo, CollectError> {
        let source = self.source.as_ref();
        let delta = sample(CPU_WINDOW, || read_cpu_stat(source)).await?;
        let breakdown = cpu_breakdown(&delta);
        let loadavg = match read_loadavg(source) {
            Ok(load) => LoadAvgInfo {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            },
            Err(err) => {
                debug!(error = %err, "loadavg unavailable for cpu detail");
                LoadAvgInfo::default()
            }
        };

        Ok(CpuInfo {
            usage_total_percent: breakdown.usage,
            usage_per_core_percent: breakdown.per_core,
            iowait_percent: breakdown.iowait,
            steal_percent: breakdown.steal,
            cores_logical: logical_cores(),
            loadavg,
            ctx_switches_per_sec: delta.rate(|s| s.ctxt),
            interrupts_per_sec: delta.rate(|s| s.intr),
        })
    }

    async fn disk_detail(&self) -> Result<DiskInfo, CollectError> {
        let fs = self.blocking(fs_details).await??;
        let delta = sample(DISK_WINDOW, || read_diskstats(self.source.as_ref())).await?;
        Ok(DiskInfo {
            devices: device_details(&delta),
            fs,
        })
    }

    async fn network_detail(&self) -> Result<NetworkInfo, CollectError> {
        let delta = sample(NET_WINDOW, || read_net_dev(self.source.as_ref())).await?;
        let interfaces = delta
            .matched()
            .map(|(name, before, after)| NetworkInterfaceInfo {
                name: name.to_string(),
                rx_bps: rate(before.rx_bytes, after.rx_bytes, delta.window) as u64,
                tx_bps: rate(before.tx_bytes, after.tx_bytes, delta.window) as u64,
                rx_pps: rate(before.rx_packets, after.rx_packets, delta.window),
                tx_pps: rate(before.tx_packets, after.tx_packets, delta.window),
                rx_errors: after.rx_errors,
                tx_errors: after.tx_errors,
                dropped: after.dropped,
            })
            .collect();
        Ok(NetworkInfo { interfaces })
    }
}

fn settle<T: Default>(
    section: &'static str,
    result: Result<T, CollectError>,
    degraded: &mut Vec<&'static str>,
) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            warn!(section, error = %err, "extended section degraded");
            degraded.push(section);
            T::default()
        }
    }
}

fn memory_usage(memory: &MemInfo) -> Result<f64, ReadError> {
    let total = memory.kib("MemTotal");
    if total == 0 {
        return Err(ReadError::malformed("meminfo", "MemTotal is zero"));
    }
    let used = total.saturating_sub(memory.kib("MemAvailable"));
    Ok(percent(used as f64, total as f64))
}

fn swap_usage(memory: &MemInfo) -> f64 {
    let total = memory.kib("SwapTotal");
    let used = total.saturating_sub(memory.kib("SwapFree"));
    percent(used as f64, total as f64)
}

/// Used share of a filesystem; `None` when it reports no blocks at all.
pub fn capacity_percent(stat: &FsStat) -> Option<f64> {
    if stat.blocks == 0 {
        return None;
    }
    let used = stat.blocks.saturating_sub(stat.blocks_available);
    Some(percent(used as f64, stat.blocks as f64))
}

fn top_fs_usage(source: &dyn CounterSource) -> Result<Vec<FsUsage>, ReadError> {
    let mut usage: Vec<FsUsage> = read_capacity_mounts(source)?
        .into_iter()
        .filter_map(|m| {
            let stat = match source.fs_stat(&m.mount) {
                Ok(stat) => stat,
                Err(err) => {
                    debug!(mount = %m.mount, error = %err, "skipping mount");
                    return None;
                }
            };
            capacity_percent(&stat).map(|used_percent| FsUsage {
                mount: m.mount,
                used_percent,
            })
        })
        .collect();

    usage.sort_by(|a, b| b.used_percent.total_cmp(&a.used_percent));
    usage.truncate(TOP_MOUNTS);
    Ok(usage)
}

fn memory_detail(source: &dyn CounterSource) -> Result<MemoryInfo, CollectError> {
    let memory = read_meminfo(source)?;
    let mb = |kib: u64| kib as f64 / KIB_PER_MB;

    let total = memory.kib("MemTotal");
    let available = memory.kib("MemAvailable");
    let swap_total = memory.kib("SwapTotal");
    let swap_used = swap_total.saturating_sub(memory.kib("SwapFree"));

    Ok(MemoryInfo {
        total_mb: mb(total),
        used_mb: mb(total.saturating_sub(available)),
        available_mb: mb(available),
        cached_mb: mb(memory.kib("Cached")),
        buffers_mb: mb(memory.kib("Buffers")),
        swap: SwapInfo {
            total_mb: mb(swap_total),
            used_mb: mb(swap_used),
            used_percent: percent(swap_used as f64, swap_total as f64),
        },
        oom_kills_total: read_oom_kills(source),
    })
}

fn fs_details(source: &dyn CounterSource) -> Result<Vec<DiskFsInfo>, ReadError> {
    let mut result: Vec<DiskFsInfo> = read_capacity_mounts(source)?
        .into_iter()
        .filter_map(|m| {
            let stat = source.fs_stat(&m.mount).ok()?;
            let block_size = stat.block_size as f64;
            let total_bytes = stat.blocks as f64 * block_size;
            let free_bytes = stat.blocks_available as f64 * block_size;
            let inodes_used = stat.files.saturating_sub(stat.files_free);

            Some(DiskFsInfo {
                readonly: m.is_readonly(),
                used_percent: percent(total_bytes - free_bytes, total_bytes),
                total_gb: total_bytes / BYTES_PER_GB,
                free_gb: free_bytes / BYTES_PER_GB,
                inode_used_percent: inodes_used as f64 / stat.files.max(1) as f64 * 100.0,
                mount: m.mount,
                fstype: m.fs_type,
            })
        })
        .collect();

    result.sort_by(|a, b| b.used_percent.total_cmp(&a.used_percent));
    Ok(result)
}

fn device_details(delta: &Delta<BTreeMap<String, DeviceCounters>>) -> Vec<DiskDeviceInfo> {
    let window_ms = delta.window.as_secs_f64() * 1000.0;
    let latency = |time_before: u64, time_after: u64, ops_before: u64, ops_after: u64| {
        let ops = ops_after.saturating_sub(ops_before);
        if ops == 0 {
            return 0.0;
        }
        time_after.saturating_sub(time_before) as f64 / ops as f64
    };

    delta
        .matched()
        .map(|(name, before, after)| DiskDeviceInfo {
            name: name.to_string(),
            read_bps: rate(before.read_bytes, after.read_bytes, delta.window) as u64,
            write_bps: rate(before.write_bytes, after.write_bytes, delta.window) as u64,
            read_iops: rate(before.reads, after.reads, delta.window),
            write_iops: rate(before.writes, after.writes, delta.window),
            read_latency_ms: latency(
                before.read_time_ms,
                after.read_time_ms,
                before.reads,
                after.reads,
            ),
            write_latency_ms: latency(
                before.write_time_ms,
                after.write_time_ms,
                before.writes,
                after.writes,
            ),
            util_percent: percent(
                after.io_ticks_ms.saturating_sub(before.io_ticks_ms) as f64,
                window_ms,
            ),
        })
        .collect()
}
