use super::counters::{CpuStat, CpuTimes};
use super::{ReadError, SamplingError};
use std::collections::BTreeMap;
use std::time::Duration;

pub const CPU_WINDOW: Duration = Duration::from_millis(150);
pub const DISK_WINDOW: Duration = Duration::from_secs(1);
pub const NET_WINDOW: Duration = Duration::from_secs(1);

/// Two readings of one counter family taken `window` apart.
#[derive(Debug, Clone)]
pub struct Delta<T> {
    pub before: T,
    pub after: T,
    pub window: Duration,
}

impl<T> Delta<T> {
    /// Per-second rate of a monotonic counter extracted by `field`.
    pub fn rate(&self, field: impl Fn(&T) -> u64) -> f64 {
        rate(field(&self.before), field(&self.after), self.window)
    }
}

impl<V> Delta<BTreeMap<String, V>> {
    /// Entries present in both readings, in key order.
    pub fn matched(&self) -> impl Iterator<Item = (&str, &V, &V)> {
        self.after.iter().filter_map(|(key, after)| {
            self.before
                .get(key)
                .map(|before| (key.as_str(), before, after))
        })
    }
}

/// Reads the family, waits `window`, reads it again.
pub async fn sample<T, F>(window: Duration, mut read: F) -> Result<Delta<T>, ReadError>
where
    F: FnMut() -> Result<T, ReadError>,
{
    let before = read()?;
    if !window.is_zero() {
        tokio::time::sleep(window).await;
    }
    let after = read()?;
    Ok(Delta {
        before,
        after,
        window,
    })
}

/// Per-second rate; counters that went backwards report 0.
pub fn rate(before: u64, after: u64, window: Duration) -> f64 {
    let secs = window.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (after as f64 - before as f64).max(0.0) / secs
}

/// `part / total` as a percentage in `[0, 100]`; 0 when `total <= 0`.
pub fn percent(part: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    (part / total * 100.0).clamp(0.0, 100.0)
}

fn tick_delta(before: u64, after: u64) -> f64 {
    after as f64 - before as f64
}

/// Busy share of the ticks elapsed between two readings.
///
/// A non-positive total delta means the counters did not advance (or were
/// reset) and no meaningful percentage exists.
pub fn cpu_usage(before: &CpuTimes, after: &CpuTimes) -> Result<f64, SamplingError> {
    let total = tick_delta(before.total, after.total);
    let idle = tick_delta(before.idle, after.idle);
    if total <= 0.0 {
        return Err(SamplingError::NonPositiveDelta { family: "cpu" });
    }
    Ok(((total - idle) / total * 100.0).clamp(0.0, 100.0))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuBreakdown {
    pub usage: f64,
    pub per_core: Vec<f64>,
    pub iowait: f64,
    pub steal: f64,
}

pub fn cpu_breakdown(delta: &Delta<CpuStat>) -> CpuBreakdown {
    let (Some(before), Some(after)) = (delta.before.cpus.get("cpu"), delta.after.cpus.get("cpu"))
    else {
        return CpuBreakdown::default();
    };

    let total = tick_delta(before.total, after.total);
    let idle = tick_delta(before.idle, after.idle);

    let mut per_core: Vec<f64> = delta
        .after
        .cpus
        .iter()
        .filter(|(label, _)| label.as_str() != "cpu")
        .filter_map(|(label, after)| {
            let before = delta.before.cpus.get(label)?;
            let total = tick_delta(before.total, after.total);
            let idle = tick_delta(before.idle, after.idle);
            Some(percent(total - idle, total))
        })
        .collect();
    per_core.sort_by(f64::total_cmp);

    CpuBreakdown {
        usage: percent(total - idle, total),
        per_core,
        iowait: percent(tick_delta(before.iowait, after.iowait), total),
        steal: percent(tick_delta(before.steal, after.steal), total),
    }
}
