use crate::ignore::IgnorePatterns;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One file found during enumeration.
#[derive(Debug, Clone)]
pub struct WalkedFile {
    pub path: PathBuf,
    /// Filename matched the ignore set; counted and skipped, never handed
    /// to the pipeline.
    pub ignored: bool,
}

/// Enumerate all regular files under `root` in a stable order.
///
/// Ignored files are returned (tagged) rather than dropped so operation
/// totals account for every file seen. Unreadable subdirectories are logged
/// and skipped; the caller validates the root itself before starting.
pub fn collect_files(root: &Path, ignore: &IgnorePatterns) -> Vec<WalkedFile> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("cannot access {:?}: {e}", e.path());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let ignored = entry
            .file_name()
            .to_str()
            .is_some_and(|name| ignore.is_ignored(name));
        files.push(WalkedFile {
            path: entry.into_path(),
            ignored,
        });
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn patterns(list: &[&str]) -> IgnorePatterns {
        let owned: Vec<String> = list.iter().map(ToString::to_string).collect();
        IgnorePatterns::compile(&owned).unwrap()
    }

    #[test]
    fn walks_recursively_and_tags_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("b.tmp"), "b").unwrap();
        std::fs::write(dir.path().join("sub/c.txt"), "c").unwrap();

        let files = collect_files(dir.path(), &patterns(&["*.tmp"]));
        assert_eq!(files.len(), 3);

        let ignored: Vec<_> = files
            .iter()
            .filter(|f| f.ignored)
            .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(ignored, vec!["b.tmp"]);
    }

    #[test]
    fn empty_directory_yields_no_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_files(dir.path(), &patterns(&[])).is_empty());
    }

    #[test]
    fn order_is_stable_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta.txt", "alpha.txt", "mid.txt"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }
        let ignore = patterns(&[]);
        let first: Vec<_> = collect_files(dir.path(), &ignore)
            .into_iter()
            .map(|f| f.path)
            .collect();
        let second: Vec<_> = collect_files(dir.path(), &ignore)
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(first, second);
    }
}
