//! Package records and the package index
//!
//! This module holds the in-memory model of a scanned repository: the
//! parsed control data of each `.ipk`, the index that collects them, and
//! the version ordering used when condensing.

mod control;
mod index;
mod record;
mod version;

pub use control::{ControlError, ControlFields, parse_control};
pub use index::{IndexError, PackageIndex};
pub use record::{DirEntry, PackageRecord};
pub use version::{compare_versions, to_ordinals};
