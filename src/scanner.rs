use anyhow::Result;
use log::warn;
use std::path::PathBuf;
use walkdir::WalkDir;

/// Recursive source discovery for the analyzed project.
///
/// Walks the project root collecting every `.rs` file, skipping `target`
/// and hidden directories. Entries are visited in sorted path order so the
/// declaration-encounter order of the whole pipeline is reproducible across
/// filesystems.
pub struct FileScanner {
    root: PathBuf,
}

/// Result of a directory scan.
pub struct ScanResult {
    /// All discovered `.rs` files, in sorted path order
    pub rust_files: Vec<PathBuf>,
    /// Non-fatal problems encountered while walking (unreadable entries)
    pub warnings: Vec<String>,
}

impl FileScanner {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Walks the tree under the root and collects Rust source files.
    ///
    /// Inaccessible entries are recorded as warnings and skipped; only a
    /// completely unreadable root is an error.
    pub fn scan(&self) -> Result<ScanResult> {
        let mut rust_files = Vec::new();
        let mut warnings = Vec::new();

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.path() == self.root {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                !name.starts_with('.') && name != "target"
            });

        for entry in walker {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("rs") {
                        rust_files.push(path.to_path_buf());
                    }
                }
                Err(e) => {
                    let warning = format!("failed to access path: {}", e);
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        Ok(ScanResult {
            rust_files,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn collects_rust_files_recursively() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/api")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("src/api/users.rs"), "pub fn f() {}").unwrap();
        fs::write(dir.path().join("README.md"), "# readme").unwrap();

        let result = FileScanner::new(dir.path().to_path_buf()).scan().unwrap();

        assert_eq!(result.rust_files.len(), 2);
        assert!(result
            .rust_files
            .iter()
            .all(|p| p.extension().unwrap() == "rs"));
    }

    #[test]
    fn skips_target_and_hidden_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("target/debug/build.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join(".git/hook.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("lib.rs"), "pub fn f() {}").unwrap();

        let result = FileScanner::new(dir.path().to_path_buf()).scan().unwrap();

        assert_eq!(result.rust_files.len(), 1);
        assert!(result.rust_files[0].ends_with("lib.rs"));
    }

    #[test]
    fn yields_files_in_sorted_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("zebra.rs"), "").unwrap();
        fs::write(dir.path().join("alpha.rs"), "").unwrap();
        fs::write(dir.path().join("mango.rs"), "").unwrap();

        let result = FileScanner::new(dir.path().to_path_buf()).scan().unwrap();

        let names: Vec<_> = result
            .rust_files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["alpha.rs", "mango.rs", "zebra.rs"]);
    }

    #[test]
    fn empty_directory_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let result = FileScanner::new(dir.path().to_path_buf()).scan().unwrap();
        assert!(result.rust_files.is_empty());
        assert!(result.warnings.is_empty());
    }
}
