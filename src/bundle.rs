//! Bundle the archives referenced by an index into one output file.

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use log::info;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::cleanup::PartialFile;
use crate::package::{PackageIndex, PackageRecord};
use crate::runtime::Runtime;

/// Target value that prints the names instead of writing an archive.
pub const LISTING_TARGET: &str = "-";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BundleError {
    #[error("unsupported bundle target {0:?}, expected '-', *.zip, *.tar, *.tar.gz or *.tgz")]
    UnsupportedTarget(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleTarget {
    Listing,
    Zip(PathBuf),
    Tar(PathBuf),
    TarGz(PathBuf),
}

impl FromStr for BundleTarget {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == LISTING_TARGET {
            return Ok(Self::Listing);
        }
        let path = PathBuf::from(s);
        if s.ends_with(".zip") {
            Ok(Self::Zip(path))
        } else if s.ends_with(".tar.gz") || s.ends_with(".tgz") {
            Ok(Self::TarGz(path))
        } else if s.ends_with(".tar") {
            Ok(Self::Tar(path))
        } else {
            Err(BundleError::UnsupportedTarget(s.to_string()))
        }
    }
}

impl BundleTarget {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Listing => None,
            Self::Zip(p) | Self::Tar(p) | Self::TarGz(p) => Some(p),
        }
    }
}

/// Name of `record` inside the bundle, optionally below a directory named
/// after its architecture.
pub fn member_name(record: &PackageRecord, arch_subdirs: bool) -> String {
    if arch_subdirs {
        format!("{}/{}", record.architecture(), record.name)
    } else {
        record.name.clone()
    }
}

/// Write every record of `index` to `target`, in name order. Returns the
/// number of records written.
///
/// Archives are assembled under `<target>.partial` and only renamed onto
/// `target` once every member was copied. For [`BundleTarget::Listing`] the
/// sorted names go to `listing` instead.
#[tracing::instrument(skip(runtime, index, listing))]
pub fn write_bundle<R: Runtime + ?Sized, W: Write + ?Sized>(
    runtime: &R,
    index: &PackageIndex,
    target: &BundleTarget,
    arch_subdirs: bool,
    listing: &mut W,
) -> Result<usize> {
    let started = Instant::now();
    let records = index.records();

    let path = match target {
        BundleTarget::Listing => {
            let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
            writeln!(listing, "sorted names:\n{}", names.join("\n"))?;
            return Ok(records.len());
        }
        BundleTarget::Zip(p) | BundleTarget::Tar(p) | BundleTarget::TarGz(p) => p,
    };

    let partial = PartialFile::new(runtime, path);
    match target {
        BundleTarget::Zip(_) => {
            let file = runtime.create_file(partial.path())?;
            write_zip(runtime, &records, arch_subdirs, file)?;
        }
        BundleTarget::Tar(_) => {
            let file = runtime.create_file(partial.path())?;
            let mut out = write_tar(runtime, &records, arch_subdirs, file)?;
            out.flush()?;
        }
        BundleTarget::TarGz(_) => {
            let file = runtime.create_file(partial.path())?;
            let encoder = GzEncoder::new(file, Compression::default());
            write_tar(runtime, &records, arch_subdirs, encoder)?.finish()?;
        }
        BundleTarget::Listing => {}
    }
    partial.commit()?;

    info!(
        "wrote {} into archive: {:?}. done after {:?}",
        records.len(),
        path,
        started.elapsed()
    );
    Ok(records.len())
}

fn open_source<R: Runtime + ?Sized>(runtime: &R, record: &PackageRecord) -> Result<Box<dyn Read + Send>> {
    runtime
        .open(&record.location)
        .with_context(|| format!("opening {:?} for bundling", record.location))
}

fn write_zip<R: Runtime + ?Sized, W: Write>(
    runtime: &R,
    records: &[std::sync::Arc<PackageRecord>],
    arch_subdirs: bool,
    output: W,
) -> Result<()> {
    // Streaming mode: sizes go into data descriptors, so no seeking back
    let mut zip = ZipWriter::new_stream(output);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for record in records {
        zip.start_file(member_name(record, arch_subdirs), options)?;
        let mut source = open_source(runtime, record)?;
        io::copy(&mut source, &mut zip)
            .with_context(|| format!("copying {:?} into bundle", record.location))?;
    }

    zip.finish()?.flush()?;
    Ok(())
}

fn write_tar<R: Runtime + ?Sized, W: Write>(
    runtime: &R,
    records: &[std::sync::Arc<PackageRecord>],
    arch_subdirs: bool,
    output: W,
) -> Result<W> {
    let mut builder = tar::Builder::new(output);

    for record in records {
        let stat = runtime.metadata(&record.location)?;
        let mut header = tar::Header::new_gnu();
        header.set_path(member_name(record, arch_subdirs))?;
        header.set_size(stat.size);
        header.set_mode(0o644);
        header.set_mtime(record.mtime_unix().max(0) as u64);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();

        let source = open_source(runtime, record)?;
        builder
            .append(&header, source.take(stat.size))
            .with_context(|| format!("copying {:?} into bundle", record.location))?;
    }

    Ok(builder.into_inner()?)
}
