//! File-size anomaly heuristic.
//!
//! Within a job, a partition that is much smaller than its chronological
//! neighbors usually means a truncated download. Each file is compared with
//! the mean of both neighbors (or the single neighbor at either end).
//!
//! Two adjacent truncated files drag each other's comparison size down and
//! can hide one another; the heuristic accepts that.

use crate::catalog::{CatalogSnapshot, DiscoveredPartition};
use crate::domain::JobKey;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SIZE_THRESHOLD_PERCENT: f64 = 20.0;

/// One row of the anomaly review report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub ticker: String,
    pub fidelity: String,
    pub file_name: String,
    pub file_size_kb: f64,
    pub neighbor_avg_size_kb: f64,
    pub percent_smaller: f64,
    pub reason: String,
    pub full_path: String,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Size the file at `i` is compared against, if any.
fn comparison_size(sizes: &[u64], i: usize) -> Option<f64> {
    let prev = i.checked_sub(1).map(|j| sizes[j] as f64);
    let next = sizes.get(i + 1).map(|&s| s as f64);
    match (prev, next) {
        (Some(p), Some(n)) => Some((p + n) / 2.0),
        (Some(p), None) => Some(p),
        (None, Some(n)) => Some(n),
        (None, None) => None,
    }
}

/// Flag partitions of one job whose size falls more than `threshold_percent`
/// below their neighbors. `partitions` must be in chronological order.
pub fn detect_job_anomalies(
    job: &JobKey,
    partitions: &[DiscoveredPartition],
    threshold_percent: f64,
) -> Vec<AnomalyRecord> {
    if partitions.len() < 2 {
        return Vec::new();
    }

    let sizes: Vec<u64> = partitions.iter().map(|p| p.size_bytes).collect();
    let mut found = Vec::new();

    for (i, part) in partitions.iter().enumerate() {
        let Some(cmp) = comparison_size(&sizes, i) else {
            continue;
        };
        if cmp == 0.0 {
            continue;
        }

        let size = sizes[i] as f64;
        let pct = (cmp - size) / cmp * 100.0;
        if pct > threshold_percent {
            let pct = round2(pct);
            found.push(AnomalyRecord {
                ticker: job.ticker.clone(),
                fidelity: job.fidelity.label().to_string(),
                file_name: part.file_name.clone(),
                file_size_kb: round2(size / 1024.0),
                neighbor_avg_size_kb: round2(cmp / 1024.0),
                percent_smaller: pct,
                reason: format!("File is {}% smaller than its neighbors.", percent_text(pct)),
                full_path: part.path.display().to_string(),
            });
        }
    }

    found
}

/// Whole percentages keep one decimal ("21.0"), others print as-is ("87.5").
fn percent_text(pct: f64) -> String {
    if pct.fract() == 0.0 {
        format!("{pct:.1}")
    } else {
        format!("{pct}")
    }
}

/// Run the heuristic over every job in a snapshot.
pub fn detect_anomalies(snapshot: &CatalogSnapshot, threshold_percent: f64) -> Vec<AnomalyRecord> {
    snapshot
        .jobs()
        .flat_map(|(job, parts)| detect_job_anomalies(job, parts, threshold_percent))
        .collect()
}
