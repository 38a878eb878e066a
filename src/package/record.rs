use anyhow::{Context, Result};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::archive::{ChecksumReader, extract_control};
use crate::runtime::{FileStat, Runtime};

use super::control::{ControlFields, parse_control};

/// Longest description shown in a directory listing before it is cut.
const SUMMARY_LEN: usize = 64;

/// One scanned `.ipk`: its control data, file stats and optional digests.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageRecord {
    /// Archive file name, e.g. `foo_1.0_all.ipk`.
    pub name: String,
    /// The verbatim control text.
    pub control: String,
    pub fields: ControlFields,
    pub size: u64,
    pub modified: SystemTime,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    /// Where the archive was scanned from.
    pub location: PathBuf,
}

/// Listing view of a record, as consumed by a directory index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub modified: SystemTime,
    pub size: u64,
    pub description: String,
    pub summary: String,
}

impl PackageRecord {
    /// Extract and parse the archive at `root/name`, computing the
    /// requested digests in the same pass over the file.
    #[tracing::instrument(skip(runtime, root))]
    pub fn from_file<R: Runtime + ?Sized>(
        runtime: &R,
        name: &str,
        root: &Path,
        want_md5: bool,
        want_sha1: bool,
    ) -> Result<Self> {
        let location = root.join(name);
        let file = runtime
            .open(&location)
            .with_context(|| format!("opening {:?}", location))?;

        let mut tee = ChecksumReader::new(file, want_md5, want_sha1);
        let control = extract_control(&mut tee)
            .with_context(|| format!("extract pkg-info from {:?}", location))?;
        let fields = parse_control(&control)
            .with_context(|| format!("header parse error in {:?}", location))?;
        let digests = tee
            .finish()
            .with_context(|| format!("computing checksums of {:?}", location))?;

        let stat = runtime
            .metadata(&location)
            .with_context(|| format!("reading size and mtime of {:?}", location))?;

        Ok(Self {
            name: name.to_string(),
            control,
            fields,
            size: stat.size,
            modified: stat.modified,
            md5: digests.md5,
            sha1: digests.sha1,
            location,
        })
    }

    /// Rebuild a record from a cached control file. No digests are
    /// computed on this path; `stat` is the archive's own stat.
    #[tracing::instrument(skip(runtime, control_path, location, stat))]
    pub fn from_cache<R: Runtime + ?Sized>(
        runtime: &R,
        name: &str,
        control_path: &Path,
        location: PathBuf,
        stat: FileStat,
    ) -> Result<Self> {
        let control = runtime
            .read_to_string(control_path)
            .with_context(|| format!("reading cache {:?}", control_path))?;
        let fields = parse_control(&control)
            .with_context(|| format!("header parse error in cache {:?}", control_path))?;

        Ok(Self {
            name: name.to_string(),
            control,
            fields,
            size: stat.size,
            modified: stat.modified,
            md5: None,
            sha1: None,
            location,
        })
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn package(&self) -> &str {
        self.field("Package").unwrap_or_default()
    }

    pub fn version(&self) -> &str {
        self.field("Version").unwrap_or_default()
    }

    pub fn architecture(&self) -> &str {
        self.field("Architecture").unwrap_or_default()
    }

    /// Modification time in whole seconds relative to the unix epoch.
    pub fn mtime_unix(&self) -> i64 {
        match self.modified.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        }
    }

    /// Write the parsed fields, `Package` first.
    pub fn header_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        if let Some(package) = self.fields.get("Package") {
            writeln!(w, "Package: {}", package)?;
        }
        for (key, value) in self.fields.iter().filter(|(k, _)| *k != "Package") {
            writeln!(w, "{}: {}", key, value)?;
        }
        Ok(())
    }

    /// Write the control text followed by the file name, size and digests.
    /// This is one stanza of a `Packages` file, without the separator.
    pub fn control_and_checksum_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(self.control.as_bytes())?;
        if !self.control.is_empty() && !self.control.ends_with('\n') {
            writeln!(w)?;
        }
        writeln!(w, "Filename: {}", self.name)?;
        writeln!(w, "Size: {}", self.size)?;
        if let Some(md5) = &self.md5 {
            writeln!(w, "MD5Sum: {}", md5)?;
        }
        if let Some(sha1) = &self.sha1 {
            writeln!(w, "SHA1: {}", sha1)?;
        }
        Ok(())
    }

    /// The control fields plus `Size` and whichever digests are present.
    pub fn enhanced_fields(&self) -> ControlFields {
        let mut fields = self.fields.clone();
        fields.insert("Size".to_string(), self.size.to_string());
        if let Some(md5) = &self.md5 {
            fields.insert("MD5Sum".to_string(), md5.clone());
        }
        if let Some(sha1) = &self.sha1 {
            fields.insert("SHA1".to_string(), sha1.clone());
        }
        fields
    }

    pub fn dir_entry(&self) -> DirEntry {
        let description = self.field("Description").unwrap_or_default().to_string();
        let summary = if description.chars().count() > SUMMARY_LEN {
            let cut: String = description.chars().take(SUMMARY_LEN).collect();
            format!("{}...", cut)
        } else {
            description.clone()
        };

        DirEntry {
            name: self.name.clone(),
            modified: self.modified,
            size: self.size,
            description,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ExtractError;
    use crate::runtime::{MockRuntime, RealRuntime};
    use crate::test_utils::{control_for, write_file, write_ipk};
    use mockall::predicate::eq;
    use std::time::Duration;
    use tempfile::tempdir;

    fn record_with(control: &str) -> PackageRecord {
        PackageRecord {
            name: "foo_1.0_all.ipk".into(),
            control: control.into(),
            fields: parse_control(control).unwrap(),
            size: 1234,
            modified: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            md5: None,
            sha1: None,
            location: PathBuf::from("/repo/foo_1.0_all.ipk"),
        }
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let control = control_for("foo", "1.0", "all");
        let path = write_ipk(dir.path(), "foo_1.0_all.ipk", &control);

        let record =
            PackageRecord::from_file(&RealRuntime, "foo_1.0_all.ipk", dir.path(), true, true)
                .unwrap();

        assert_eq!(record.name, "foo_1.0_all.ipk");
        assert_eq!(record.control, control);
        assert_eq!(record.package(), "foo");
        assert_eq!(record.version(), "1.0");
        assert_eq!(record.architecture(), "all");
        assert_eq!(record.size, std::fs::metadata(&path).unwrap().len());
        assert_eq!(record.location, path);
        assert_eq!(record.md5.as_ref().map(String::len), Some(32));
        assert_eq!(record.sha1.as_ref().map(String::len), Some(40));
    }

    #[test]
    fn test_from_file_digests_cover_whole_file() {
        use md5::{Digest, Md5};

        let dir = tempdir().unwrap();
        let path = write_ipk(dir.path(), "foo_1.0_all.ipk", &control_for("foo", "1.0", "all"));
        let expected = format!("{:x}", Md5::digest(std::fs::read(&path).unwrap()));

        let record =
            PackageRecord::from_file(&RealRuntime, "foo_1.0_all.ipk", dir.path(), true, false)
                .unwrap();
        assert_eq!(record.md5, Some(expected));
        assert_eq!(record.sha1, None);
    }

    #[test]
    fn test_from_file_is_idempotent() {
        let dir = tempdir().unwrap();
        write_ipk(dir.path(), "foo_1.0_all.ipk", &control_for("foo", "1.0", "all"));

        let first =
            PackageRecord::from_file(&RealRuntime, "foo_1.0_all.ipk", dir.path(), true, true)
                .unwrap();
        let second =
            PackageRecord::from_file(&RealRuntime, "foo_1.0_all.ipk", dir.path(), true, true)
                .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_from_file_missing_file() {
        let dir = tempdir().unwrap();
        let result = PackageRecord::from_file(&RealRuntime, "nope.ipk", dir.path(), false, false);
        assert!(result.unwrap_err().to_string().contains("opening"));
    }

    #[test]
    fn test_from_file_not_a_package() {
        let dir = tempdir().unwrap();
        write_file(&dir.path().join("broken.ipk"), b"garbage");

        let err = PackageRecord::from_file(&RealRuntime, "broken.ipk", dir.path(), false, false)
            .unwrap_err();
        assert!(err.downcast_ref::<ExtractError>().is_some());
    }

    #[test]
    fn test_from_file_bad_control_line() {
        let dir = tempdir().unwrap();
        write_ipk(dir.path(), "bad.ipk", "Package: bad\nthis line is broken\n");

        let err =
            PackageRecord::from_file(&RealRuntime, "bad.ipk", dir.path(), false, false).unwrap_err();
        assert!(err.to_string().contains("header parse error"));
    }

    #[test]
    fn test_from_file_stat_failure() {
        let mut runtime = MockRuntime::new();
        let control = control_for("foo", "1.0", "all");
        runtime
            .expect_open()
            .with(eq(PathBuf::from("/repo/foo_1.0_all.ipk")))
            .returning(move |_| {
                let bytes = crate::test_utils::ipk_bytes(&control);
                Ok(Box::new(std::io::Cursor::new(bytes)) as Box<dyn std::io::Read + Send>)
            });
        runtime
            .expect_metadata()
            .returning(|_| Err(anyhow::anyhow!("vanished")));

        let err = PackageRecord::from_file(&runtime, "foo_1.0_all.ipk", Path::new("/repo"), true, false)
            .unwrap_err();
        assert!(err.to_string().contains("reading size and mtime"));
    }

    #[test]
    fn test_from_cache() {
        let mut runtime = MockRuntime::new();
        let control_path = PathBuf::from("/cache/foo_1.0_all.ipk.control");
        let stat = FileStat {
            size: 4096,
            modified: UNIX_EPOCH + Duration::from_secs(42),
            is_dir: false,
        };

        runtime
            .expect_read_to_string()
            .with(eq(control_path.clone()))
            .returning(|_| Ok("Package: foo\nVersion: 1.0\n".into()));

        let record = PackageRecord::from_cache(
            &runtime,
            "foo_1.0_all.ipk",
            &control_path,
            PathBuf::from("/repo/foo_1.0_all.ipk"),
            stat,
        )
        .unwrap();

        assert_eq!(record.package(), "foo");
        assert_eq!(record.size, 4096);
        assert_eq!(record.mtime_unix(), 42);
        assert_eq!(record.md5, None);
        assert_eq!(record.sha1, None);
    }

    #[test]
    fn test_from_cache_unreadable() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Err(anyhow::anyhow!("permission denied")));

        let stat = FileStat {
            size: 0,
            modified: UNIX_EPOCH,
            is_dir: false,
        };
        let result = PackageRecord::from_cache(
            &runtime,
            "foo.ipk",
            Path::new("/cache/foo.ipk.control"),
            PathBuf::from("/repo/foo.ipk"),
            stat,
        );
        assert!(result.unwrap_err().to_string().contains("reading cache"));
    }

    #[test]
    fn test_header_to_writes_package_first() {
        let record = record_with("Version: 1.0\nArchitecture: all\nPackage: foo\n");
        let mut out = Vec::new();
        record.header_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Package: foo\nVersion: 1.0\nArchitecture: all\n"
        );
    }

    #[test]
    fn test_control_and_checksum_to() {
        let mut record = record_with("Package: foo\nVersion: 1.0\n");
        record.md5 = Some("abc".into());
        record.sha1 = Some("def".into());

        let mut out = Vec::new();
        record.control_and_checksum_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Package: foo\nVersion: 1.0\nFilename: foo_1.0_all.ipk\nSize: 1234\nMD5Sum: abc\nSHA1: def\n"
        );
    }

    #[test]
    fn test_control_and_checksum_to_without_digests() {
        let record = record_with("Package: foo");
        let mut out = Vec::new();
        record.control_and_checksum_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Package: foo\nFilename: foo_1.0_all.ipk\nSize: 1234\n"
        );
    }

    #[test]
    fn test_enhanced_fields() {
        let mut record = record_with("Package: foo\nVersion: 1.0\n");
        record.sha1 = Some("def".into());

        let fields = record.enhanced_fields();
        assert_eq!(fields["Size"], "1234");
        assert_eq!(fields["SHA1"], "def");
        assert!(!fields.contains_key("MD5Sum"));
        assert_eq!(fields.get_index(0).unwrap().0, "Package");
    }

    #[test]
    fn test_dir_entry_truncates_long_description() {
        let long = "x".repeat(80);
        let record = record_with(&format!("Package: foo\nDescription: {}\n", long));

        let entry = record.dir_entry();
        assert_eq!(entry.description, long);
        assert_eq!(entry.summary, format!("{}...", "x".repeat(64)));
        assert_eq!(entry.size, 1234);
    }

    #[test]
    fn test_dir_entry_short_description() {
        let record = record_with("Package: foo\nDescription: tiny tool\n");
        let entry = record.dir_entry();
        assert_eq!(entry.summary, "tiny tool");
        assert_eq!(entry.name, "foo_1.0_all.ipk");
    }

    #[test]
    fn test_dir_entry_serializes() {
        let record = record_with("Package: foo\nDescription: tiny tool\n");
        let json = serde_json::to_value(record.dir_entry()).unwrap();
        assert_eq!(json["name"], "foo_1.0_all.ipk");
        assert_eq!(json["size"], 1234);
        assert_eq!(json["summary"], "tiny tool");
        assert_eq!(json["modified"]["secs_since_epoch"], 1_700_000_000);
    }
}
