//! Gap detection and repair planning.
//!
//! For each job the expected partitions are the clipped calendar months from
//! the job's earliest start to today. A job is complete iff every expected
//! file name is present in the catalog.
//!
//! - **Major** repair: any gap means the whole job is rebuilt. Every
//!   discovered file (and the DEBUG sample) is deleted and the full range
//!   `[min_start, today]` is fetched again.
//! - **Minor** repair: only the missing months are fetched; nothing is deleted.

use crate::calendar::expected_partitions;
use crate::catalog::{CatalogSnapshot, DiscoveredPartition};
use crate::coverage::job_min_start;
use crate::domain::{debug_sample_file_name, DateRange, JobKey, PartitionError, PartitionKey};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairMode {
    Major,
    Minor,
}

/// Result of checking one job against its expected partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobValidation {
    pub job: JobKey,
    pub min_start: NaiveDate,
    pub expected: usize,
    /// Expected partitions with no file on disk, in date order.
    pub missing: Vec<PartitionKey>,
}

impl JobValidation {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// A range to fetch and write for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub job: JobKey,
    pub range: DateRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairAction {
    /// Delete everything the job has and fetch `[min_start, today]` again.
    Rebuild {
        job: JobKey,
        delete: Vec<PathBuf>,
        refetch: DownloadRequest,
    },
    /// Fetch each missing month individually.
    FillGaps {
        job: JobKey,
        refetch: Vec<DownloadRequest>,
    },
}

impl RepairAction {
    pub fn job(&self) -> &JobKey {
        match self {
            RepairAction::Rebuild { job, .. } | RepairAction::FillGaps { job, .. } => job,
        }
    }

    pub fn requests(&self) -> Vec<&DownloadRequest> {
        match self {
            RepairAction::Rebuild { refetch, .. } => vec![refetch],
            RepairAction::FillGaps { refetch, .. } => refetch.iter().collect(),
        }
    }
}

/// Outcome of planning over a whole catalog.
#[derive(Debug, Default)]
pub struct RepairPlan {
    pub actions: Vec<RepairAction>,
    pub complete: Vec<JobKey>,
    /// Jobs whose partitions could not be interpreted.
    pub invalid: Vec<(JobKey, PartitionError)>,
}

impl RepairPlan {
    pub fn request_count(&self) -> usize {
        self.actions.iter().map(|a| a.requests().len()).sum()
    }
}

/// Check one job. Returns `None` for a job with no partitions.
pub fn validate_job(
    job: &JobKey,
    partitions: &[DiscoveredPartition],
    today: NaiveDate,
) -> Result<Option<JobValidation>, PartitionError> {
    let Some(min_start) = job_min_start(partitions)? else {
        return Ok(None);
    };

    let present: BTreeSet<&str> = partitions.iter().map(|p| p.file_name.as_str()).collect();
    let mut expected = 0;
    let mut missing = Vec::new();

    for range in expected_partitions(min_start, today) {
        expected += 1;
        let key = PartitionKey::new(&job.ticker, job.fidelity.clone(), range.start, range.end)?;
        if !present.contains(key.file_name().as_str()) {
            missing.push(key);
        }
    }

    Ok(Some(JobValidation {
        job: job.clone(),
        min_start,
        expected,
        missing,
    }))
}

/// Turn a failed validation into the action `mode` calls for.
pub fn plan_job(
    snapshot: &CatalogSnapshot,
    partitions: &[DiscoveredPartition],
    validation: &JobValidation,
    mode: RepairMode,
    today: NaiveDate,
) -> Option<RepairAction> {
    if validation.is_complete() {
        return None;
    }
    let job = validation.job.clone();

    Some(match mode {
        RepairMode::Major => {
            let mut delete: Vec<PathBuf> = partitions.iter().map(|p| p.path.clone()).collect();
            delete.push(
                snapshot
                    .job_dir(&job)
                    .join(debug_sample_file_name(&job.ticker, &job.fidelity)),
            );
            RepairAction::Rebuild {
                refetch: DownloadRequest {
                    job: job.clone(),
                    range: DateRange {
                        start: validation.min_start,
                        end: today.max(validation.min_start),
                    },
                },
                job,
                delete,
            }
        }
        RepairMode::Minor => RepairAction::FillGaps {
            refetch: validation
                .missing
                .iter()
                .map(|key| DownloadRequest {
                    job: job.clone(),
                    range: key.range(),
                })
                .collect(),
            job,
        },
    })
}

/// Validate every job in the snapshot and plan repairs for the incomplete ones.
pub fn plan_repairs(snapshot: &CatalogSnapshot, mode: RepairMode, today: NaiveDate) -> RepairPlan {
    let mut plan = RepairPlan::default();

    for (job, partitions) in snapshot.jobs() {
        match validate_job(job, partitions, today) {
            Ok(Some(validation)) => {
                match plan_job(snapshot, partitions, &validation, mode, today) {
                    Some(action) => plan.actions.push(action),
                    None => plan.complete.push(job.clone()),
                }
            }
            Ok(None) => {}
            Err(e) => plan.invalid.push((job.clone(), e)),
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Fidelity;
    use std::fs;
    use std::path::Path;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, b"data").unwrap();
    }

    fn abc_minute() -> JobKey {
        JobKey::new("ABC", Fidelity::parse("1 minute").unwrap())
    }

    #[test]
    fn complete_job_has_no_action() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "ABC/1-minute/ABC_1-minute_2024-01-01_to_2024-01-31.parquet");
        touch(dir.path(), "ABC/1-minute/ABC_1-minute_2024-02-01_to_2024-02-29.parquet");
        touch(dir.path(), "ABC/1-minute/ABC_1-minute_2024-03-01_to_2024-03-10.parquet");

        let snap = CatalogSnapshot::scan(dir.path()).unwrap();
        let plan = plan_repairs(&snap, RepairMode::Major, d(2024, 3, 10));
        assert!(plan.actions.is_empty());
        assert_eq!(plan.complete, vec![abc_minute()]);
    }

    #[test]
    fn current_partial_month_is_expected() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "ABC/1-minute/ABC_1-minute_2024-01-01_to_2024-01-31.parquet");

        let snap = CatalogSnapshot::scan(dir.path()).unwrap();
        let v = validate_job(&abc_minute(), snap.partitions(&abc_minute()).unwrap(), d(2024, 2, 3))
            .unwrap()
            .unwrap();
        assert_eq!(v.expected, 2);
        assert_eq!(v.missing.len(), 1);
        assert_eq!(v.missing[0].range(), DateRange { start: d(2024, 2, 1), end: d(2024, 2, 3) });
    }

    #[test]
    fn major_mode_rebuilds_whole_job() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "ABC/1-minute/ABC_1-minute_2024-01-01_to_2024-01-31.parquet");
        touch(dir.path(), "ABC/1-minute/ABC_1-minute_2024-03-01_to_2024-03-31.parquet");
        let today = d(2024, 4, 2);

        let snap = CatalogSnapshot::scan(dir.path()).unwrap();
        let plan = plan_repairs(&snap, RepairMode::Major, today);
        assert_eq!(plan.actions.len(), 1);

        match &plan.actions[0] {
            RepairAction::Rebuild { job, delete, refetch } => {
                assert_eq!(job, &abc_minute());
                assert_eq!(refetch.range, DateRange { start: d(2024, 1, 1), end: today });
                assert_eq!(delete.len(), 3);
                assert!(delete[2].ends_with("ABC_1-minute_DEBUG.csv"));
            }
            other => panic!("expected rebuild, got {other:?}"),
        }
    }

    #[test]
    fn minor_mode_fills_each_gap() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "ABC/1-minute/ABC_1-minute_2024-01-15_to_2024-01-31.parquet");
        touch(dir.path(), "ABC/1-minute/ABC_1-minute_2024-03-01_to_2024-03-31.parquet");

        let snap = CatalogSnapshot::scan(dir.path()).unwrap();
        let plan = plan_repairs(&snap, RepairMode::Minor, d(2024, 5, 9));

        let ranges: Vec<DateRange> = plan.actions[0].requests().iter().map(|r| r.range).collect();
        assert_eq!(
            ranges,
            vec![
                DateRange { start: d(2024, 2, 1), end: d(2024, 2, 29) },
                DateRange { start: d(2024, 4, 1), end: d(2024, 4, 30) },
                DateRange { start: d(2024, 5, 1), end: d(2024, 5, 9) },
            ]
        );
        assert_eq!(plan.request_count(), 3);
    }

    #[test]
    fn invalid_dates_are_reported_per_job() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "ABC/1-minute/ABC_1-minute_2024-13-45_to_2024-01-31.parquet");
        touch(dir.path(), "XYZ/day/XYZ_day_2024-01-01_to_2024-01-31.csv");

        let snap = CatalogSnapshot::scan(dir.path()).unwrap();
        let plan = plan_repairs(&snap, RepairMode::Minor, d(2024, 1, 31));
        assert_eq!(plan.invalid.len(), 1);
        assert_eq!(plan.invalid[0].0, abc_minute());
        assert_eq!(plan.complete.len(), 1);
    }

    #[test]
    fn daily_jobs_expect_csv() {
        let dir = tempfile::tempdir().unwrap();
        // A parquet file for a daily job does not satisfy the expected csv name.
        touch(dir.path(), "XYZ/day/XYZ_day_2024-01-01_to_2024-01-31.parquet");

        let snap = CatalogSnapshot::scan(dir.path()).unwrap();
        let plan = plan_repairs(&snap, RepairMode::Minor, d(2024, 1, 31));
        assert_eq!(plan.request_count(), 1);
    }
}
