//! Control data extraction from `.ipk` package archives.
//!
//! An `.ipk` is an `ar` container. One of its members, `control.tar.gz`,
//! is a gzip-compressed tar stream whose `./control` entry holds the
//! package metadata. Everything here works on a plain [`Read`] so it can sit
//! behind a [`ChecksumReader`] and never needs the whole file in memory.

mod checksum;

use flate2::read::GzDecoder;
use std::io::{self, Read};
use thiserror::Error;

pub use checksum::{ChecksumReader, Digests};

/// Name of the outer member carrying the control tarball.
const CONTROL_MEMBER: &[u8] = b"control.tar.gz";

/// Name of the control file inside the control tarball.
const CONTROL_ENTRY: &[u8] = b"./control";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("missing control.tar.gz entry")]
    MissingControlArchive,

    #[error("missing or empty 'control' file inside 'control.tar.gz'")]
    MissingControlData,

    #[error("analyzing control.tar.gz: {0}")]
    InvalidControlArchive(#[source] io::Error),

    #[error("extracting contents: {0}")]
    Read(#[from] io::Error),
}

/// Some archive writers append a slash to member names.
fn is_control_member(identifier: &[u8]) -> bool {
    identifier.strip_suffix(b"/").unwrap_or(identifier) == CONTROL_MEMBER
}

/// Read the raw control text out of an `.ipk` stream.
///
/// Reading stops right after the control data; the caller owns whatever
/// is left of the stream.
pub fn extract_control<R: Read>(reader: R) -> Result<String, ExtractError> {
    let mut archive = ar::Archive::new(reader);
    while let Some(member) = archive.next_entry() {
        let member = member?;
        if is_control_member(member.header().identifier()) {
            return read_control_tarball(member);
        }
    }
    Err(ExtractError::MissingControlArchive)
}

fn read_control_tarball<R: Read>(member: R) -> Result<String, ExtractError> {
    let mut tarball = tar::Archive::new(GzDecoder::new(member));
    let entries = tarball
        .entries()
        .map_err(ExtractError::InvalidControlArchive)?;

    for entry in entries {
        let mut entry = entry.map_err(ExtractError::InvalidControlArchive)?;
        if entry.path_bytes().as_ref() != CONTROL_ENTRY {
            continue;
        }

        let mut control = Vec::new();
        entry
            .read_to_end(&mut control)
            .map_err(ExtractError::InvalidControlArchive)?;
        if control.is_empty() {
            break;
        }
        return Ok(String::from_utf8_lossy(&control).into_owned());
    }

    Err(ExtractError::MissingControlData)
}
