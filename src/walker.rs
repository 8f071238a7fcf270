use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use tracing::warn;

use crate::error::Result;

/// A file found in the document directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Fully resolved absolute path. This is the file's identity in the
    /// metadata map and the embedding cache.
    pub path: PathBuf,
    /// Last modification time as nanoseconds since the Unix epoch.
    pub mtime: u64,
}

impl DiscoveredFile {
    /// The string key used for this file in persisted artifacts.
    pub fn key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// List the regular files directly inside `root`.
///
/// The listing is not recursive. Hidden entries (names starting with `.`)
/// are skipped, symlinks are followed when they point at a regular file,
/// and broken symlinks are ignored. Results are sorted by path.
///
/// Only a failure to read `root` itself is an error. An entry that cannot
/// be inspected, e.g. because it vanished after the directory was listed,
/// is logged and skipped.
///
/// No filtering by extension happens here: whether a file can be read is
/// the extractor registry's call.
pub fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;
    let mut paths = Vec::new();

    for entry in std::fs::read_dir(&canonical_root)? {
        match entry {
            Ok(entry) => paths.push(entry.path()),
            Err(e) => warn!(
                dir = %canonical_root.display(),
                error = %e,
                "skipping unreadable directory entry"
            ),
        }
    }

    Ok(collect_files(paths))
}

fn collect_files(paths: Vec<PathBuf>) -> Vec<DiscoveredFile> {
    let mut results = Vec::new();

    for path in paths {
        let hidden = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with('.'));
        if hidden {
            continue;
        }

        let file_type = match std::fs::symlink_metadata(&path) {
            Ok(meta) => meta.file_type(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file");
                continue;
            }
        };

        if file_type.is_symlink() {
            // Skip broken symlinks
            let Ok(resolved) = path.canonicalize() else {
                continue;
            };
            if !resolved.is_file() {
                continue;
            }
        } else if !file_type.is_file() {
            continue;
        }

        match modification_time(&path) {
            Ok(mtime) => results.push(DiscoveredFile { path, mtime }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file");
            }
        }
    }

    results.sort_by(|a, b| a.path.cmp(&b.path));
    results
}

/// Modification time of `path` (following symlinks) in nanoseconds since
/// the Unix epoch.
pub fn modification_time(path: &Path) -> Result<u64> {
    let nanos = std::fs::metadata(path)?
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    Ok(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(files: &[DiscoveredFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn lists_all_regular_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("note.md"), "# Hello").unwrap();
        std::fs::write(tmp.path().join("main.py"), "print(1)").unwrap();
        std::fs::write(tmp.path().join("image.png"), "binary").unwrap();

        let files = discover_files(tmp.path()).unwrap();
        assert_eq!(names(&files), vec!["image.png", "main.py", "note.md"]);
    }

    #[test]
    fn paths_are_absolute() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();

        let files = discover_files(tmp.path()).unwrap();
        assert!(files[0].path.is_absolute());
        assert_eq!(files[0].key(), files[0].path.to_string_lossy());
    }

    #[test]
    fn skips_hidden_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".hidden.md"), "secret").unwrap();
        std::fs::write(tmp.path().join("visible.md"), "hello").unwrap();

        let files = discover_files(tmp.path()).unwrap();
        assert_eq!(names(&files), vec!["visible.md"]);
    }

    #[test]
    fn does_not_recurse() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("subdir");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("deep.md"), "deep").unwrap();
        std::fs::write(tmp.path().join("top.md"), "top").unwrap();

        let files = discover_files(tmp.path()).unwrap();
        assert_eq!(names(&files), vec!["top.md"]);
    }

    #[test]
    fn mtime_is_nonzero() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("file.md"), "content").unwrap();

        let files = discover_files(tmp.path()).unwrap();
        assert!(files[0].mtime > 0);
    }

    #[test]
    fn results_are_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("z.md"), "z").unwrap();
        std::fs::write(tmp.path().join("a.md"), "a").unwrap();
        std::fs::write(tmp.path().join("m.md"), "m").unwrap();

        let files = discover_files(tmp.path()).unwrap();
        assert_eq!(names(&files), vec!["a.md", "m.md", "z.md"]);
    }

    #[test]
    fn empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover_files(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover_files(&tmp.path().join("nope")).is_err());
    }

    #[test]
    fn vanished_entry_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let kept = tmp.path().join("kept.md");
        std::fs::write(&kept, "still here").unwrap();

        let files = collect_files(vec![tmp.path().join("gone.md"), kept.clone()]);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, kept);
    }

    #[cfg(unix)]
    #[test]
    fn broken_symlink_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(
            tmp.path().join("missing-target.md"),
            tmp.path().join("dangling.md"),
        )
        .unwrap();
        std::fs::write(tmp.path().join("real.md"), "real").unwrap();

        let files = discover_files(tmp.path()).unwrap();
        assert_eq!(names(&files), vec!["real.md"]);
    }
}
