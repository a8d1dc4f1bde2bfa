//! Dataset scanner.
//!
//! Walks `root/<TICKER>/<fidelity-folder>/` and collects every file whose
//! name has the partition shape. The result is an immutable snapshot; the
//! file system stays the single source of truth and later stages never
//! mutate the snapshot in place.

use crate::domain::{is_partition_file_name, parse_partition_name, Fidelity, JobKey};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CatalogError + '_ {
    move |source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A partition file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPartition {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
}

/// One scan of the trading-history tree.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    root: PathBuf,
    jobs: BTreeMap<JobKey, Vec<DiscoveredPartition>>,
}

impl CatalogSnapshot {
    /// Scan `root`. A missing root yields an empty snapshot.
    pub fn scan(root: &Path) -> Result<Self, CatalogError> {
        let mut jobs: BTreeMap<JobKey, Vec<DiscoveredPartition>> = BTreeMap::new();

        if !root.is_dir() {
            debug!(root = %root.display(), "trading history root not found; empty catalog");
            return Ok(Self {
                root: root.to_path_buf(),
                jobs,
            });
        }

        for ticker_entry in fs::read_dir(root).map_err(io_err(root))? {
            let ticker_entry = ticker_entry.map_err(io_err(root))?;
            let ticker_path = ticker_entry.path();
            if !ticker_path.is_dir() {
                continue;
            }
            let ticker = ticker_entry.file_name().to_string_lossy().into_owned();

            for fidelity_entry in fs::read_dir(&ticker_path).map_err(io_err(&ticker_path))? {
                let fidelity_entry = fidelity_entry.map_err(io_err(&ticker_path))?;
                let fidelity_path = fidelity_entry.path();
                if !fidelity_path.is_dir() {
                    continue;
                }
                let folder = fidelity_entry.file_name().to_string_lossy().into_owned();
                let fidelity = match Fidelity::from_folder_name(&folder) {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(ticker = %ticker, folder = %folder, error = %e, "skipping unrecognised fidelity folder");
                        continue;
                    }
                };

                let partitions = scan_fidelity_dir(&fidelity_path)?;
                if partitions.is_empty() {
                    continue;
                }
                jobs.insert(JobKey::new(ticker.clone(), fidelity), partitions);
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            jobs,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs in `(ticker, fidelity)` order, each with its partitions in
    /// `range_start` order.
    pub fn jobs(&self) -> impl Iterator<Item = (&JobKey, &[DiscoveredPartition])> {
        self.jobs.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn partitions(&self, job: &JobKey) -> Option<&[DiscoveredPartition]> {
        self.jobs.get(job).map(|v| v.as_slice())
    }

    /// Names of the partitions present for `job`.
    pub fn file_names(&self, job: &JobKey) -> BTreeSet<&str> {
        self.partitions(job)
            .unwrap_or_default()
            .iter()
            .map(|p| p.file_name.as_str())
            .collect()
    }

    /// Directory a job's partitions live in.
    pub fn job_dir(&self, job: &JobKey) -> PathBuf {
        self.root
            .join(&job.ticker)
            .join(job.fidelity.folder_name())
    }
}

fn scan_fidelity_dir(dir: &Path) -> Result<Vec<DiscoveredPartition>, CatalogError> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !is_partition_file_name(&file_name) {
            continue;
        }
        let meta = entry.metadata().map_err(io_err(&entry.path()))?;
        if !meta.is_file() {
            continue;
        }
        found.push(DiscoveredPartition {
            path: entry.path(),
            file_name,
            size_bytes: meta.len(),
        });
    }
    found.sort_by_cached_key(|p| {
        let start = parse_partition_name(&p.file_name).ok().map(|n| n.range_start);
        (start, p.file_name.clone())
    });
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path, bytes: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![b'x'; bytes]).unwrap();
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snap = CatalogSnapshot::scan(&dir.path().join("nope")).unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn groups_by_ticker_and_fidelity() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("ABC/1-minute/ABC_1-minute_2024-02-01_to_2024-02-29.parquet"), 20);
        touch(&root.join("ABC/1-minute/ABC_1-minute_2024-01-01_to_2024-01-31.parquet"), 10);
        touch(&root.join("ABC/1-minute/ABC_1-minute_DEBUG.csv"), 5);
        touch(&root.join("ABC/1-minute/notes.txt"), 5);
        touch(&root.join("ABC/day/ABC_day_2024-01-01_to_2024-01-31.csv"), 7);
        touch(&root.join("XYZ/tick/XYZ_tick_2024-01-01_to_2024-01-31.parquet"), 3);
        touch(&root.join("stray.txt"), 1);
        touch(&root.join("ABC/stray.txt"), 1);

        let snap = CatalogSnapshot::scan(root).unwrap();
        assert_eq!(snap.len(), 3);

        let key = JobKey::new("ABC", Fidelity::parse("1 minute").unwrap());
        let parts = snap.partitions(&key).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].file_name, "ABC_1-minute_2024-01-01_to_2024-01-31.parquet");
        assert_eq!(parts[0].size_bytes, 10);
        assert_eq!(parts[1].size_bytes, 20);
        assert_eq!(snap.job_dir(&key), root.join("ABC").join("1-minute"));
    }

    #[test]
    fn partitions_follow_range_start_not_name() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        // A renamed ticker prefix would sort first by name.
        touch(&root.join("BRK.B/day/BRK.B_day_2024-02-01_to_2024-02-29.csv"), 2);
        touch(&root.join("BRK.B/day/BRK-B_day_2024-01-01_to_2024-01-31.csv"), 1);
        touch(&root.join("BRK.B/day/BRK.B_day_2023-12-01_to_2023-12-31.csv"), 0);

        let snap = CatalogSnapshot::scan(root).unwrap();
        let key = JobKey::new("BRK.B", Fidelity::parse("day").unwrap());
        let sizes: Vec<u64> = snap.partitions(&key).unwrap().iter().map(|p| p.size_bytes).collect();
        assert_eq!(sizes, vec![0, 1, 2]);
    }

    #[test]
    fn unparseable_fidelity_folder_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("ABC/weird/ABC_weird_2024-01-01_to_2024-01-31.csv"), 1);
        let snap = CatalogSnapshot::scan(root).unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn folder_without_partitions_is_not_a_job() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("ABC/1-minute")).unwrap();
        touch(&root.join("ABC/1-minute/ABC_1-minute_DEBUG.csv"), 1);
        assert!(CatalogSnapshot::scan(root).unwrap().is_empty());
    }
}
