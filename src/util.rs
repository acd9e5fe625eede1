use anyhow::{Context, Result};
use memmap2::Mmap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Forward-slash path relative to the walked root.
    pub relative_path: String,
    pub full_path: PathBuf,
    /// Free from the OS directory scan.
    pub size: u64,
}

/// Walk a directory tree and collect every regular file with its relative path.
pub fn walk_files(root: &Path) -> Result<Vec<FileEntry>> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Failed to canonicalize path: {}", root.display()))?;

    let mut entries = Vec::new();

    for entry in WalkDir::new(&root).min_depth(1) {
        let entry = entry.with_context(|| format!("Failed to read directory entry in {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let full_path = entry.path().to_path_buf();
        let relative = full_path
            .strip_prefix(&root)
            .with_context(|| "Failed to compute relative path")?;

        let relative_path = relative
            .to_str()
            .with_context(|| format!("Non-UTF8 path: {}", relative.display()))?
            .replace('\\', "/");

        let size = entry
            .metadata()
            .with_context(|| format!("Failed to read metadata: {}", full_path.display()))?
            .len();

        entries.push(FileEntry {
            relative_path,
            full_path,
            size,
        });
    }

    Ok(entries)
}

/// Read a whole file into memory. Empty files cannot be mapped, so they
/// short-circuit.
pub fn read_file(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(Vec::new());
    }
    // SAFETY: read-only mapping, copied out before it is dropped.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap.to_vec())
}

/// Compute the BLAKE3 hash of a byte slice.
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Collect just the relative paths as a set for fast lookup.
pub fn path_set(entries: &[FileEntry]) -> BTreeSet<String> {
    entries.iter().map(|e| e.relative_path.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_files_skips_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        std::fs::create_dir_all(tmp.path().join("empty")).unwrap();
        std::fs::write(tmp.path().join("a/b/c.txt"), "abc").unwrap();
        std::fs::write(tmp.path().join("top"), "").unwrap();

        let entries = walk_files(tmp.path()).unwrap();
        let paths = path_set(&entries);
        assert_eq!(
            paths.into_iter().collect::<Vec<_>>(),
            vec!["a/b/c.txt".to_string(), "top".to_string()]
        );
        let sized = entries.iter().find(|e| e.relative_path == "a/b/c.txt").unwrap();
        assert_eq!(sized.size, 3);
    }

    #[test]
    fn test_read_file_handles_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty");
        std::fs::write(&path, "").unwrap();
        assert!(read_file(&path).unwrap().is_empty());
        std::fs::write(&path, "data").unwrap();
        assert_eq!(read_file(&path).unwrap(), b"data");
    }

    #[test]
    fn test_hash_bytes_distinguishes() {
        assert_eq!(hash_bytes(b"x"), hash_bytes(b"x"));
        assert_ne!(hash_bytes(b"x"), hash_bytes(b"y"));
    }
}
