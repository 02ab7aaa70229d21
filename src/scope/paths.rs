//! Path normalization and comparison helpers shared by scope resolution and
//! the guardrail.
//!
//! Everything here is lexical. Existence checks go through [`PathProbe`] so
//! resolution logic can run against an in-memory snapshot in tests.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Joins `raw` onto `root` when relative and resolves `.`/`..` lexically.
///
/// Backslashes are treated as separators because agents frequently emit
/// Windows-style paths. Case is preserved. `root` is expected to be absolute;
/// with an absolute root the result is absolute and
/// `normalize(root, normalize(root, p)) == normalize(root, p)`.
pub fn normalize(root: &Path, raw: &str) -> PathBuf {
    let cleaned = raw.trim().replace('\\', "/");
    let candidate = Path::new(&cleaned);
    if candidate.is_absolute() {
        lexical_normalize(candidate)
    } else {
        lexical_normalize(&root.join(candidate))
    }
}

/// Resolves `.` and `..` without touching the filesystem. `..` never climbs
/// above the filesystem root.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if last_is_normal {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// True iff both paths have the same parent directory.
pub fn is_sibling(a: &Path, b: &Path) -> bool {
    PathComparison::CaseSensitive.is_sibling(a, b)
}

/// True iff `path` lies strictly below `dir`.
pub fn is_within(path: &Path, dir: &Path) -> bool {
    PathComparison::CaseSensitive.is_within(path, dir)
}

/// How two normalized paths are compared. Case-insensitive comparison is an
/// opt-in for case-insensitive file systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathComparison {
    #[default]
    CaseSensitive,
    CaseInsensitive,
}

impl PathComparison {
    pub fn fold(self, path: &Path) -> PathBuf {
        match self {
            Self::CaseSensitive => path.to_path_buf(),
            Self::CaseInsensitive => path
                .components()
                .map(|component| match component {
                    Component::Normal(part) => {
                        PathBuf::from(part.to_string_lossy().to_lowercase())
                    }
                    other => PathBuf::from(other.as_os_str()),
                })
                .collect(),
        }
    }

    pub fn same(self, a: &Path, b: &Path) -> bool {
        self.fold(a) == self.fold(b)
    }

    pub fn is_within(self, path: &Path, dir: &Path) -> bool {
        let path = self.fold(path);
        let dir = self.fold(dir);
        path != dir && path.starts_with(&dir)
    }

    pub fn is_sibling(self, a: &Path, b: &Path) -> bool {
        match (a.parent(), b.parent()) {
            (Some(pa), Some(pb)) => self.same(pa, pb),
            _ => false,
        }
    }
}

/// Read-only view of the filesystem used during scope resolution.
pub trait PathProbe {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    /// Regular files directly inside `dir`, sorted.
    fn list_files(&self, dir: &Path) -> Vec<PathBuf>;
}

/// [`PathProbe`] backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl PathProbe for FsProbe {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_files(&self, dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        files
    }
}

/// In-memory [`PathProbe`]: a fixed set of files whose ancestors count as
/// directories.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    files: BTreeSet<PathBuf>,
    dirs: BTreeSet<PathBuf>,
}

impl StaticProbe {
    pub fn with_files<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut probe = Self::default();
        for file in files {
            probe.add_file(file);
        }
        probe
    }

    pub fn add_file(&mut self, file: impl Into<PathBuf>) {
        let file = lexical_normalize(&file.into());
        let mut parent = file.parent();
        while let Some(dir) = parent {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(dir.to_path_buf());
            parent = dir.parent();
        }
        self.files.insert(file);
    }

    pub fn add_dir(&mut self, dir: impl Into<PathBuf>) {
        self.dirs.insert(lexical_normalize(&dir.into()));
    }
}

impl PathProbe for StaticProbe {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains(path) || self.dirs.contains(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    fn list_files(&self, dir: &Path) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|file| file.parent() == Some(dir))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_joins_relative_and_collapses_dots() {
        let root = Path::new("/proj");
        assert_eq!(
            normalize(root, "src/./a/../UserController.java"),
            PathBuf::from("/proj/src/UserController.java")
        );
        assert_eq!(
            normalize(root, "  ./src\\model\\User.java "),
            PathBuf::from("/proj/src/model/User.java")
        );
    }

    #[test]
    fn normalize_keeps_absolute_paths_and_clamps_at_root() {
        let root = Path::new("/proj");
        assert_eq!(normalize(root, "/opt/lib/x.py"), PathBuf::from("/opt/lib/x.py"));
        assert_eq!(normalize(root, "/../../etc"), PathBuf::from("/etc"));
        assert_eq!(normalize(root, "../../.."), PathBuf::from("/"));
    }

    #[test]
    fn normalize_preserves_case() {
        let root = Path::new("/Proj");
        assert_eq!(normalize(root, "Src/Main.RS"), PathBuf::from("/Proj/Src/Main.RS"));
    }

    #[test]
    fn within_requires_strict_component_prefix() {
        assert!(is_within(Path::new("/proj/src/a.rs"), Path::new("/proj/src")));
        assert!(!is_within(Path::new("/proj/src"), Path::new("/proj/src")));
        assert!(!is_within(Path::new("/proj/srcx/a.rs"), Path::new("/proj/src")));
    }

    #[test]
    fn sibling_compares_parent_directories() {
        assert!(is_sibling(Path::new("/p/src/a.rs"), Path::new("/p/src/b.rs")));
        assert!(!is_sibling(Path::new("/p/src/a.rs"), Path::new("/p/src/x/b.rs")));
    }

    #[test]
    fn case_insensitive_comparison_is_opt_in() {
        let a = Path::new("/P/Src/A.rs");
        let b = Path::new("/p/src/a.rs");
        assert!(!PathComparison::CaseSensitive.same(a, b));
        assert!(PathComparison::CaseInsensitive.same(a, b));
        assert!(PathComparison::CaseInsensitive.is_within(a, Path::new("/p/SRC")));
    }

    #[test]
    fn static_probe_derives_directories_from_files() {
        let probe = StaticProbe::with_files(["/p/src/a.rs", "/p/src/b.rs", "/p/src/x/c.rs"]);
        assert!(probe.is_dir(Path::new("/p/src")));
        assert!(probe.exists(Path::new("/p/src/a.rs")));
        assert!(!probe.is_dir(Path::new("/p/src/a.rs")));
        assert_eq!(
            probe.list_files(Path::new("/p/src")),
            vec![PathBuf::from("/p/src/a.rs"), PathBuf::from("/p/src/b.rs")]
        );
    }
}
