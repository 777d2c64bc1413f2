//! Prometheus指标模块
//!
//! 检测次数按操作结果计数：只有持久化或发布失败才算失败，站点宕机不算。

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// 检测指标收集器
#[derive(Clone)]
pub struct CheckMetrics {
    /// 注册表
    registry: Registry,
    /// 检测操作总数
    checks_total: IntCounterVec,
    /// 状态变化总数
    transitions_total: IntCounterVec,
    /// 探测耗时
    probe_duration: HistogramVec,
    /// 巡检总数
    sweeps_total: IntCounter,
}

impl CheckMetrics {
    /// 创建新的指标收集器
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let checks_total = IntCounterVec::new(
            Opts::new(
                "site_vitals_checks_total",
                "Total number of check operations, labeled by operation outcome",
            ),
            &["success"],
        )?;

        let transitions_total = IntCounterVec::new(
            Opts::new(
                "site_vitals_transitions_total",
                "Total number of published up/down transitions",
            ),
            &["up"],
        )?;

        let probe_duration = HistogramVec::new(
            HistogramOpts::new(
                "site_vitals_probe_duration_seconds",
                "Duration of site probes in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["up"],
        )?;

        let sweeps_total = IntCounter::new(
            "site_vitals_sweeps_total",
            "Total number of completed sweeps over all sites",
        )?;

        registry.register(Box::new(checks_total.clone()))?;
        registry.register(Box::new(transitions_total.clone()))?;
        registry.register(Box::new(probe_duration.clone()))?;
        registry.register(Box::new(sweeps_total.clone()))?;

        Ok(Self {
            registry,
            checks_total,
            transitions_total,
            probe_duration,
            sweeps_total,
        })
    }

    /// 记录一次检测操作
    pub fn record_check(&self, success: bool) {
        self.checks_total
            .with_label_values(&[bool_label(success)])
            .inc();
    }

    /// 记录一次状态变化
    pub fn record_transition(&self, up: bool) {
        self.transitions_total
            .with_label_values(&[bool_label(up)])
            .inc();
    }

    /// 记录探测耗时
    pub fn observe_probe(&self, up: bool, seconds: f64) {
        self.probe_duration
            .with_label_values(&[bool_label(up)])
            .observe(seconds);
    }

    /// 记录一次巡检
    pub fn record_sweep(&self) {
        self.sweeps_total.inc();
    }

    /// 指定结果的检测次数
    pub fn checks(&self, success: bool) -> u64 {
        self.checks_total
            .with_label_values(&[bool_label(success)])
            .get()
    }

    /// 指定方向的状态变化次数
    pub fn transitions(&self, up: bool) -> u64 {
        self.transitions_total
            .with_label_values(&[bool_label(up)])
            .get()
    }

    /// 巡检次数
    pub fn sweeps(&self) -> u64 {
        self.sweeps_total.get()
    }

    /// 获取Prometheus文本格式的指标
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

fn bool_label(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_check_by_outcome() {
        let metrics = CheckMetrics::new().unwrap();
        metrics.record_check(true);
        metrics.record_check(true);
        metrics.record_check(false);

        assert_eq!(metrics.checks(true), 2);
        assert_eq!(metrics.checks(false), 1);
    }

    #[test]
    fn test_gather_exposes_counters() {
        let metrics = CheckMetrics::new().unwrap();
        metrics.record_check(true);
        metrics.record_transition(false);
        metrics.observe_probe(true, 0.2);
        metrics.record_sweep();

        let text = metrics.gather().unwrap();
        assert!(text.contains("site_vitals_checks_total{success=\"true\"} 1"));
        assert!(text.contains("site_vitals_transitions_total{up=\"false\"} 1"));
        assert!(text.contains("site_vitals_probe_duration_seconds"));
        assert!(text.contains("site_vitals_sweeps_total 1"));
    }
}
