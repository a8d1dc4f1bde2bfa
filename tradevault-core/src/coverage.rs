//! Coverage inference: a job's intended start is the earliest partition start
//! found on disk.

use crate::catalog::DiscoveredPartition;
use crate::domain::{parse_partition_name, PartitionError};
use chrono::NaiveDate;

/// Earliest `range_start` among `file_names`, or `None` when there are none.
///
/// Every name must be a well-formed partition name; an impossible date is
/// raised, not skipped.
pub fn min_start_date<'a, I>(file_names: I) -> Result<Option<NaiveDate>, PartitionError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut min: Option<NaiveDate> = None;
    for name in file_names {
        let start = parse_partition_name(name)?.range_start;
        min = Some(min.map_or(start, |m| m.min(start)));
    }
    Ok(min)
}

/// [`min_start_date`] over discovered partitions.
pub fn job_min_start(partitions: &[DiscoveredPartition]) -> Result<Option<NaiveDate>, PartitionError> {
    min_start_date(partitions.iter().map(|p| p.file_name.as_str()))
}
