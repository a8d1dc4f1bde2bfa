//! CSV report output.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tradevault_core::layout::unique_filepath;

/// Write `rows` to `target`, or to the first free `name(NNN).csv` sibling if
/// `target` already exists. Returns the path written.
pub fn write_csv_report<S: Serialize>(target: &Path, rows: &[S]) -> Result<PathBuf> {
    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let path = unique_filepath(target);

    let mut writer =
        csv::Writer::from_path(&path).with_context(|| format!("creating report {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(path)
}
