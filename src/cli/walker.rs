//! Directory discovery (§4.N): finds FTDC files under a directory so the CLI
//! can be pointed at a `diagnostic.data` directory as well as a single file.

use std::path::{Path, PathBuf};

/// Returns every regular file under `root` whose name matches MongoDB's FTDC
/// naming convention (`metrics.<timestamp>` or, for the interim file, plain
/// `metrics.interim`), sorted so chunks are visited in chronological order.
///
/// `root` itself is returned as a single-element list if it is already a
/// file, so callers never need to branch on file-vs-directory.
pub fn discover_ftdc_files(root: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
    let root = root.as_ref();
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with("metrics.") {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_and_sorts_metrics_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("metrics.2021-01-01T00-00-00Z-00000"), b"a").unwrap();
        fs::write(dir.path().join("metrics.2020-01-01T00-00-00Z-00000"), b"b").unwrap();
        fs::write(dir.path().join("metrics.interim"), b"c").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let found = discover_ftdc_files(dir.path()).unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|p| p
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("metrics.")));
    }

    #[test]
    fn a_single_file_path_is_returned_as_is() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let found = discover_ftdc_files(file.path()).unwrap();
        assert_eq!(found, vec![file.path().to_path_buf()]);
    }
}
