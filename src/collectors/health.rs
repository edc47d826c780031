use crate::payload::{HealthLevel, HealthStatus, MemoryInfo, Payload};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthMetric {
    Disk,
    Memory,
}

#[derive(Debug, Clone, Copy)]
pub struct ThresholdRule {
    pub metric: HealthMetric,
    pub threshold: f64,
    pub message: &'static str,
}

/// Ordered by metric, then by descending threshold. The first rule that
/// fires for a metric suppresses the remaining rules of that metric.
pub const RULES: [ThresholdRule; 4] = [
    ThresholdRule {
        metric: HealthMetric::Disk,
        threshold: 90.0,
        message: "disk usage >= 90%",
    },
    ThresholdRule {
        metric: HealthMetric::Disk,
        threshold: 80.0,
        message: "disk usage >= 80%",
    },
    ThresholdRule {
        metric: HealthMetric::Memory,
        threshold: 90.0,
        message: "memory usage >= 90%",
    },
    ThresholdRule {
        metric: HealthMetric::Memory,
        threshold: 80.0,
        message: "memory usage >= 80%",
    },
];

/// Rules and scores use the headline `memory_usage` and `disk_usage` of the
/// payload. The memory detail is not consulted.
pub fn evaluate(payload: &Payload, _memory: &MemoryInfo) -> HealthStatus {
    evaluate_rules(&RULES, payload)
}

pub fn evaluate_rules(rules: &[ThresholdRule], payload: &Payload) -> HealthStatus {
    let value = |metric: HealthMetric| match metric {
        HealthMetric::Disk => payload.disk_usage,
        HealthMetric::Memory => payload.memory_usage,
    };

    let mut status = HealthStatus {
        status: HealthLevel::Ok,
        reasons: Vec::new(),
        scores: BTreeMap::new(),
    };
    let mut fired: Vec<HealthMetric> = Vec::new();
    for rule in rules {
        if fired.contains(&rule.metric) {
            continue;
        }
        if value(rule.metric) >= rule.threshold {
            fired.push(rule.metric);
            status.status = HealthLevel::Warning;
            status.reasons.push(rule.message);
        }
    }

    status.scores.insert("cpu", payload.cpu_usage as i64);
    status.scores.insert("memory", payload.memory_usage as i64);
    status.scores.insert("disk", payload.disk_usage as i64);
    // No network scoring formula exists yet.
    status.scores.insert("network", 0);
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(disk: f64, memory: f64) -> Payload {
        Payload {
            cpu_usage: 12.7,
            memory_usage: memory,
            disk_usage: disk,
            ..Payload::default()
        }
    }

    fn memory_kib(total_kib: f64, available_kib: f64) -> MemoryInfo {
        MemoryInfo {
            total_mb: total_kib / 1024.0,
            used_mb: (total_kib - available_kib) / 1024.0,
            available_mb: available_kib / 1024.0,
            ..MemoryInfo::default()
        }
    }

    #[test]
    fn healthy_host_is_ok() {
        let h = evaluate(&payload(50.0, 40.0), &MemoryInfo::default());
        assert_eq!(h.status, HealthLevel::Ok);
        assert!(h.reasons.is_empty());
        assert_eq!(h.scores["cpu"], 12);
        assert_eq!(h.scores["memory"], 40);
        assert_eq!(h.scores["disk"], 50);
        assert_eq!(h.scores["network"], 0);
    }

    #[test]
    fn healthy_status_omits_empty_reasons() {
        let h = evaluate(&payload(50.0, 40.0), &MemoryInfo::default());
        let json = serde_json::to_value(&h).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json.get("reasons").is_none());

        assert_eq!(json["scores"]["network"], 0);

        let warned = evaluate(&payload(85.0, 0.0), &MemoryInfo::default());
        let warned = serde_json::to_value(&warned).unwrap();
        assert_eq!(warned["reasons"][0], "disk usage >= 80%");
    }

    #[test]
    fn memory_at_ninety_percent_warns() {
        // 8,000,000 kB total with 800,000 kB available.
        let h = evaluate(&payload(10.0, 90.0), &memory_kib(8_000_000.0, 4_000_000.0));
        assert_eq!(h.status, HealthLevel::Warning);
        assert_eq!(h.reasons, vec!["memory usage >= 90%"]);
        assert_eq!(h.scores["memory"], 90);
    }

    #[test]
    fn memory_detail_does_not_override_payload_usage() {
        let h = evaluate(&payload(10.0, 79.0), &memory_kib(100.0 * 1024.0, 15.0 * 1024.0));
        assert_eq!(h.status, HealthLevel::Ok);
        assert!(h.reasons.is_empty());
        assert_eq!(h.scores["memory"], 79);
    }

    #[test]
    fn higher_tier_suppresses_lower_for_same_metric() {
        let h = evaluate(&payload(95.0, 85.0), &MemoryInfo::default());
        assert_eq!(h.status, HealthLevel::Warning);
        assert_eq!(h.reasons, vec!["disk usage >= 90%", "memory usage >= 80%"]);
    }

    #[test]
    fn warning_iff_either_metric_reaches_eighty() {
        for disk in [0.0, 79.9, 80.0, 89.9, 90.0, 100.0] {
            for memory in [0.0, 79.9, 80.0, 90.0] {
                let h = evaluate(&payload(disk, memory), &MemoryInfo::default());
                let expected = disk >= 80.0 || memory >= 80.0;
                assert_eq!(h.status == HealthLevel::Warning, expected);
                for metric in ["disk", "memory"] {
                    let has = |tier: &str| {
                        h.reasons
                            .iter()
                            .any(|r| *r == format!("{metric} usage >= {tier}%"))
                    };
                    assert!(!(has("80") && has("90")));
                }
            }
        }
    }
}
