//! Non-recursive, pattern-filtered directory scanning.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use super::{
    error::{RetentionError, RetentionResult},
    pattern::FilePattern,
};

/// Metadata for one matched file, valid for a single pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Last modification time in unix seconds.
    pub modified_at: i64,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64, modified_at: i64) -> Self {
        Self {
            path: path.into(),
            size_bytes,
            modified_at,
        }
    }
}

/// List the regular files directly inside `directory` that match `patterns`.
///
/// Records are grouped by pattern, in pattern order. A file matched by two
/// patterns appears twice. A missing directory yields no records; entries
/// that cannot be stat'ed are skipped. Names that are not valid UTF-8 are
/// matched lossily, so they are still subject to `*` and `?` wildcards.
pub fn scan(directory: &Path, patterns: &[FilePattern]) -> RetentionResult<Vec<FileRecord>> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(directory = %directory.display(), "Directory does not exist, nothing to scan");
            return Ok(Vec::new());
        }
        Err(e) => return Err(RetentionError::io(directory, e)),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(directory = %directory.display(), error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        // Undecodable bytes become U+FFFD, which `*` and `?` still match
        let name = entry.file_name().to_string_lossy().into_owned();

        if let Some(record) = stat_file(&entry.path()) {
            candidates.push((name, record));
        }
    }

    let mut records = Vec::new();
    for pattern in patterns {
        for (name, record) in &candidates {
            if pattern.matches(name) {
                records.push(record.clone());
            }
        }
    }

    Ok(records)
}

/// Stat a path, following symlinks, and keep it only if it is a regular file.
fn stat_file(path: &Path) -> Option<FileRecord> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Skipping file that could not be stat'ed");
            return None;
        }
    };

    if !metadata.is_file() {
        return None;
    }

    let modified_at = match metadata.modified() {
        Ok(modified) => match modified.duration_since(UNIX_EPOCH) {
            Ok(since) => since.as_secs() as i64,
            Err(before) => -(before.duration().as_secs() as i64),
        },
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Skipping file without a modification time");
            return None;
        }
    };

    Some(FileRecord::new(path, metadata.len(), modified_at))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use tempfile::TempDir;

    use super::*;

    fn patterns(globs: &[&str]) -> Vec<FilePattern> {
        globs.iter().map(|g| FilePattern::new(g).unwrap()).collect()
    }

    fn write_file(dir: &Path, name: &str, len: usize, age: Duration) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, vec![0u8; len]).unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
        path
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let records = scan(&temp.path().join("absent"), &patterns(&["*"])).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_scan_filters_by_pattern() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "a.wav", 10, Duration::from_secs(60));
        write_file(temp.path(), "b.mp3", 20, Duration::from_secs(60));
        write_file(temp.path(), "notes.txt", 30, Duration::from_secs(60));

        let mut records = scan(temp.path(), &patterns(&["*.wav", "*.mp3"])).unwrap();
        records.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, temp.path().join("a.wav"));
        assert_eq!(records[0].size_bytes, 10);
        assert_eq!(records[1].path, temp.path().join("b.mp3"));
        assert_eq!(records[1].size_bytes, 20);
    }

    #[test]
    fn test_scan_is_not_recursive_and_skips_directories() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "top.log", 5, Duration::from_secs(1));
        fs::create_dir(temp.path().join("nested.log")).unwrap();
        write_file(&temp.path().join("nested.log"), "inner.log", 5, Duration::from_secs(1));

        let records = scan(temp.path(), &patterns(&["*.log"])).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, temp.path().join("top.log"));
    }

    #[test]
    fn test_overlapping_patterns_duplicate_records() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "speech.wav", 100, Duration::from_secs(1));

        let records = scan(temp.path(), &patterns(&["*.wav", "speech.*"])).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], records[1]);
    }

    #[test]
    fn test_modified_time_recorded() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "old.tmp", 1, Duration::from_secs(3 * 3600));

        let records = scan(temp.path(), &patterns(&["*.tmp"])).unwrap();
        let now = chrono::Utc::now().timestamp();
        let age = now - records[0].modified_at;
        assert!((3 * 3600 - 5..=3 * 3600 + 5).contains(&age), "age was {age}");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks() {
        let temp = TempDir::new().unwrap();
        let target = write_file(temp.path(), "real.cache", 7, Duration::from_secs(1));
        fs::create_dir(temp.path().join("dir")).unwrap();
        std::os::unix::fs::symlink(&target, temp.path().join("link.cache")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("dir"), temp.path().join("dirlink.cache"))
            .unwrap();
        std::os::unix::fs::symlink(temp.path().join("gone"), temp.path().join("dangling.cache"))
            .unwrap();

        let mut names: Vec<_> = scan(temp.path(), &patterns(&["*.cache"]))
            .unwrap()
            .into_iter()
            .map(|r| r.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();

        assert_eq!(names, vec!["link.cache", "real.cache"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_are_matched() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let temp = TempDir::new().unwrap();
        let raw = OsStr::from_bytes(b"clip\xff.log");
        let path = temp.path().join(raw);
        // Some filesystems refuse invalid UTF-8 names
        if fs::write(&path, b"x").is_err() {
            return;
        }
        write_file(temp.path(), "plain.log", 1, Duration::from_secs(1));

        let records = scan(temp.path(), &patterns(&["*.log"])).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.path == path));

        let single = scan(temp.path(), &patterns(&["clip?.log"])).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].path, path);
    }

    #[test]
    fn test_scan_file_instead_of_directory_errors() {
        let temp = TempDir::new().unwrap();
        let file = write_file(temp.path(), "plain.txt", 1, Duration::from_secs(1));
        assert!(matches!(
            scan(&file, &patterns(&["*"])),
            Err(RetentionError::Io { .. })
        ));
    }
}
