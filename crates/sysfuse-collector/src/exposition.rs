//! Extraction of scalar values from text exposition format.
//!
//! Lines look like `name{label="value",...} 123.4 [timestamp]`. Comment lines
//! (`# HELP`, `# TYPE`) and blank lines are skipped. A line belongs to metric
//! `m` only if it starts with `m` immediately followed by a space or `{`, so
//! `node_load1` never matches `node_load15`.

use serde::{Deserialize, Serialize};
use sysfuse_common::types::ResourceMetricSet;

/// Aggregated metric whose sum is restricted to samples labelled `mode="idle"`.
pub const IDLE_FILTERED_METRIC: &str = "node_cpu_seconds_total";

const IDLE_MODE: &str = "idle";

const DEFAULT_DIRECT: &[&str] = &[
    "node_vmstat_pgmajfault",
    "node_memory_MemAvailable_bytes",
    "node_memory_MemTotal_bytes",
    "node_forks_total",
    "node_intr_total",
    "node_load1",
    "node_load5",
    "node_load15",
    "node_sockstat_TCP_alloc",
    "node_sockstat_TCP_inuse",
    "node_sockstat_TCP_mem",
    "node_sockstat_TCP_mem_bytes",
    "node_sockstat_UDP_inuse",
    "node_sockstat_UDP_mem",
    "node_sockstat_sockets_used",
    "node_netstat_Tcp_CurrEstab",
    "node_filefd_allocated",
];

const DEFAULT_AGGREGATED: &[&str] = &[
    "node_cpu_seconds_total",
    "node_filesystem_avail_bytes",
    "node_filesystem_size_bytes",
    "node_disk_read_bytes_total",
    "node_disk_written_bytes_total",
    "node_network_receive_bytes_total",
    "node_network_receive_drop_total",
    "node_network_receive_errs_total",
    "node_network_transmit_packets_total",
];

/// The resource metrics to extract from each pull.
///
/// `direct` metrics take the value of the first matching sample and are
/// omitted when nothing matches. `aggregated` metrics sum every matching
/// sample (per device, per core, ...) and are reported as `0` when nothing
/// matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSelection {
    #[serde(default = "default_direct")]
    pub direct: Vec<String>,
    #[serde(default = "default_aggregated")]
    pub aggregated: Vec<String>,
}

fn default_direct() -> Vec<String> {
    DEFAULT_DIRECT.iter().map(|s| s.to_string()).collect()
}

fn default_aggregated() -> Vec<String> {
    DEFAULT_AGGREGATED.iter().map(|s| s.to_string()).collect()
}

impl Default for MetricSelection {
    fn default() -> Self {
        Self {
            direct: default_direct(),
            aggregated: default_aggregated(),
        }
    }
}

impl MetricSelection {
    /// Extracts the selected metrics from one exposition blob.
    pub fn extract(&self, text: &str) -> ResourceMetricSet {
        parse(text, &self.direct, &self.aggregated)
    }
}

/// Parses `text` and returns the values of the requested metrics.
///
/// Never fails: samples with an unparseable value are skipped, and a direct
/// metric with no usable sample is simply missing from the result.
///
/// # Examples
///
/// ```
/// use sysfuse_collector::exposition::parse;
///
/// let text = "\
/// node_load1 0.5
/// node_cpu_seconds_total{cpu=\"0\",mode=\"idle\"} 100
/// node_cpu_seconds_total{cpu=\"0\",mode=\"user\"} 20
/// ";
/// let direct = vec!["node_load1".to_string(), "node_load5".to_string()];
/// let aggregated = vec!["node_cpu_seconds_total".to_string()];
/// let set = parse(text, &direct, &aggregated);
///
/// assert_eq!(set.get("node_load1"), Some(&0.5));
/// assert_eq!(set.get("node_cpu_seconds_total"), Some(&100.0));
/// assert!(!set.contains_key("node_load5"));
/// ```
pub fn parse(text: &str, direct: &[String], aggregated: &[String]) -> ResourceMetricSet {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_start)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();

    let mut result = ResourceMetricSet::new();

    for metric in direct {
        let value = lines
            .iter()
            .filter_map(|line| Sample::matching(line, metric))
            .find_map(|sample| sample.value());
        if let Some(value) = value {
            result.insert(metric.clone(), value);
        }
    }

    for metric in aggregated {
        let idle_only = metric == IDLE_FILTERED_METRIC;
        let total: f64 = lines
            .iter()
            .filter_map(|line| Sample::matching(line, metric))
            .filter(|sample| !idle_only || sample.label("mode").as_deref() == Some(IDLE_MODE))
            .filter_map(|sample| sample.value())
            .sum();
        result.insert(metric.clone(), total);
    }

    result
}

/// One data line split into its label block and value token.
#[derive(Debug, PartialEq)]
struct Sample<'a> {
    labels: &'a str,
    value: &'a str,
}

impl<'a> Sample<'a> {
    /// Splits `line` if it is a sample of exactly `metric`.
    fn matching(line: &'a str, metric: &str) -> Option<Self> {
        let rest = line.strip_prefix(metric)?;
        let (labels, tail) = if let Some(inner) = rest.strip_prefix('{') {
            let end = label_block_end(inner)?;
            (&inner[..end], &inner[end + 1..])
        } else if rest.starts_with(' ') {
            ("", rest)
        } else {
            return None;
        };
        let value = tail.split_whitespace().next()?;
        Some(Self { labels, value })
    }

    fn value(&self) -> Option<f64> {
        self.value.parse().ok()
    }

    fn label(&self, key: &str) -> Option<String> {
        label_value(self.labels, key)
    }
}

/// Byte offset of the `}` closing a label block, ignoring braces inside
/// quoted label values.
fn label_block_end(inner: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in inner.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '}' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

/// Value of label `key` in a `k1="v1",k2="v2"` block, with escapes resolved.
fn label_value(labels: &str, key: &str) -> Option<String> {
    let mut rest = labels;
    loop {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        if rest.is_empty() {
            return None;
        }
        let eq = rest.find('=')?;
        let name = rest[..eq].trim();
        let quoted = rest[eq + 1..].trim_start().strip_prefix('"')?;

        let mut value = String::new();
        let mut escaped = false;
        let mut close = None;
        for (i, c) in quoted.char_indices() {
            if escaped {
                value.push(if c == 'n' { '\n' } else { c });
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                close = Some(i);
                break;
            } else {
                value.push(c);
            }
        }
        let close = close?;
        if name == key {
            return Some(value);
        }
        rest = &quoted[close + 1..];
    }
}
