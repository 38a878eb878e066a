//! Reduce package trees to the newest version of every package.
//!
//! Every directory below the given roots is scanned into one working index
//! keyed by archive name. Each record must carry the name its own control
//! data implies; records are then grouped by `(Architecture, Package)` and
//! only the greatest version of each group survives.

use anyhow::Result;
use log::{info, warn};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::config::ScanConfig;
use crate::package::{PackageIndex, PackageRecord, compare_versions};
use crate::runtime::Runtime;
use crate::scan::{ControlCache, PACKAGE_EXTENSION, PackageScanner, package_dirs};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CondenseError {
    #[error("package {name} has mismatching control-information {expected:?}")]
    NameMismatch { name: String, expected: String },

    #[error("no packages found")]
    NoPackages,
}

#[derive(Debug)]
pub struct CondenseReport {
    /// Records found across all roots.
    pub inputs: usize,
    /// Records left after condensing.
    pub outputs: usize,
    /// The condensed, sealed index.
    pub index: Arc<PackageIndex>,
}

/// The archive name a record's control data implies:
/// `<Package>_<Version without epoch>_<Architecture>.ipk`.
pub fn expected_name(record: &PackageRecord) -> String {
    let version = record.version();
    let epochless = match version.find(':') {
        Some(idx) if idx > 0 => &version[idx + 1..],
        _ => version,
    };
    format!(
        "{}_{}_{}.{}",
        record.package(),
        epochless,
        record.architecture(),
        PACKAGE_EXTENSION
    )
}

pub fn validate(record: &PackageRecord) -> Result<(), CondenseError> {
    let expected = expected_name(record);
    if expected != record.name {
        return Err(CondenseError::NameMismatch {
            name: record.name.clone(),
            expected,
        });
    }
    Ok(())
}

/// Keep one record per `(Architecture, Package)`: the one with the greatest
/// version. Records are visited in name order; on equal versions the record
/// seen first stays.
pub fn reduce(records: &[Arc<PackageRecord>]) -> PackageIndex {
    let mut newest: HashMap<(String, String), Arc<PackageRecord>> = HashMap::new();

    for record in records {
        let key = (
            record.architecture().to_string(),
            record.package().to_string(),
        );
        let replace = match newest.get(&key) {
            None => true,
            Some(kept) => {
                let newer = compare_versions(record.version(), kept.version()) == Ordering::Greater;
                if newer {
                    info!(
                        "{}: {} replaced: {}",
                        record.package(),
                        record.version(),
                        kept.version()
                    );
                }
                newer
            }
        };
        if replace {
            newest.insert(key, Arc::clone(record));
        }
    }

    let condensed = PackageIndex::new();
    for ((arch, package), record) in newest {
        // A fresh index is never sealed
        let _ = condensed.add(format!("{}/{}", arch, package), record);
    }
    condensed
}

/// Scan every directory below `roots` and condense the result.
///
/// Digests are never computed here. Missing roots are skipped with a
/// warning; if nothing at all could be scanned the run fails with
/// [`CondenseError::NoPackages`]. A record whose name disagrees with its
/// control data fails the whole run.
#[tracing::instrument(skip(runtime, config))]
pub async fn condense_packages<R: Runtime + 'static>(
    runtime: Arc<R>,
    roots: &[PathBuf],
    config: &ScanConfig,
) -> Result<CondenseReport> {
    let started = Instant::now();
    let config = config.without_digests();
    let working = Arc::new(PackageIndex::new());
    let mut scanned_dirs = 0;

    for root in roots {
        let skip = config.cache_root.as_deref();
        for dir in package_dirs(runtime.as_ref(), root, skip) {
            info!("condensing packages from {:?}", dir);
            let mut scanner =
                PackageScanner::new(Arc::clone(&runtime), &config).with_index(Arc::clone(&working));
            if let Some(cache_root) = &config.cache_root {
                scanner = scanner.with_cache(ControlCache::for_directory(cache_root, root, &dir));
            }
            scanner.scan(&dir, config.workers).await?;
            scanned_dirs += 1;
        }
    }

    if scanned_dirs == 0 {
        warn!("no packages found");
        return Err(CondenseError::NoPackages.into());
    }
    working.seal();

    let records = working.records();
    for record in &records {
        validate(record)?;
    }

    info!("condensing a set of {} packages", records.len());
    let condensed = reduce(&records);
    condensed.seal();

    let report = CondenseReport {
        inputs: records.len(),
        outputs: condensed.len(),
        index: Arc::new(condensed),
    };
    info!(
        "condensed {} into {} packages. done after {:?}",
        report.inputs,
        report.outputs,
        started.elapsed()
    );
    Ok(report)
}
