//! Where store-backed application reads and writes files.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::error::StoreError;
use crate::file::{normalize_path, File, PATH_PREFIX};
use crate::util;

/// A collection of files addressed by normalized `./` paths.
pub trait FileStore {
    fn locate_file(&self, path: &str) -> Result<Option<File>, StoreError>;
    fn save(&mut self, file: &File) -> Result<(), StoreError>;
    /// Removing a missing file is not an error.
    fn destroy(&mut self, path: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: File) {
        self.files.insert(file.path, file.contents);
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileStore for MemoryStore {
    fn locate_file(&self, path: &str) -> Result<Option<File>, StoreError> {
        let path = normalize_path(path);
        Ok(self
            .files
            .get(&path)
            .map(|contents| File::new(&path, contents.clone())))
    }

    fn save(&mut self, file: &File) -> Result<(), StoreError> {
        self.files.insert(normalize_path(&file.path), file.contents.clone());
        Ok(())
    }

    fn destroy(&mut self, path: &str) -> Result<(), StoreError> {
        self.files.remove(&normalize_path(path));
        Ok(())
    }
}

/// Files under a directory on disk.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let root = root.canonicalize().map_err(|source| StoreError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every regular file under the root, as store paths in sorted order.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = util::walk_files(&self.root).map_err(|e| StoreError::Io {
            path: self.root.clone(),
            source: std::io::Error::other(e.to_string()),
        })?;
        let mut paths: Vec<String> = entries
            .into_iter()
            .map(|e| normalize_path(&e.relative_path))
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Map a store path to a location under the root, refusing anything
    /// that would leave it.
    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = path.strip_prefix(PATH_PREFIX).unwrap_or(path);
        let mut full = self.root.clone();
        let mut depth = 0;
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => {
                    full.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                _ => return Err(StoreError::InvalidPath(path.to_string())),
            }
        }
        if depth == 0 {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(full)
    }

    /// Remove now-empty directories between `dir` and the root.
    fn prune_empty_parents(&self, mut dir: Option<&Path>) {
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            if std::fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl FileStore for DirStore {
    fn locate_file(&self, path: &str) -> Result<Option<File>, StoreError> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            return Ok(None);
        }
        let contents = util::read_file(&full).map_err(io_error(&full))?;
        Ok(Some(File::new(path, contents)))
    }

    fn save(&mut self, file: &File) -> Result<(), StoreError> {
        let full = self.resolve(&file.path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        std::fs::write(&full, &file.contents).map_err(io_error(&full))?;
        tracing::trace!(path = %full.display(), bytes = file.contents.len(), "saved file");
        Ok(())
    }

    fn destroy(&mut self, path: &str) -> Result<(), StoreError> {
        let full = self.resolve(path)?;
        match std::fs::remove_file(&full) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error(&full)(e)),
        }
        self.prune_empty_parents(full.parent());
        tracing::trace!(path = %full.display(), "destroyed file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert_eq!(store.locate_file("a").unwrap(), None);
        store.save(&File::new("a", "x")).unwrap();
        assert_eq!(store.locate_file("./a").unwrap(), Some(File::new("a", "x")));
        store.destroy("a").unwrap();
        store.destroy("a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_dir_store_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();

        store.save(&File::new("sub/dir/f.txt", "hello")).unwrap();
        assert!(tmp.path().join("sub/dir/f.txt").is_file());
        assert_eq!(
            store.locate_file("./sub/dir/f.txt").unwrap(),
            Some(File::new("sub/dir/f.txt", "hello"))
        );
        assert_eq!(store.list().unwrap(), vec!["./sub/dir/f.txt".to_string()]);

        store.destroy("sub/dir/f.txt").unwrap();
        assert!(!tmp.path().join("sub").exists());
        assert!(tmp.path().exists());
        assert_eq!(store.locate_file("sub/dir/f.txt").unwrap(), None);
    }

    #[test]
    fn test_dir_store_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = DirStore::open(tmp.path()).unwrap();
        store.save(&File::new("empty", "")).unwrap();
        let found = store.locate_file("empty").unwrap().unwrap();
        assert!(found.contents.is_empty());
    }

    #[test]
    fn test_dir_store_rejects_escape() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::open(tmp.path()).unwrap();
        assert!(matches!(
            store.locate_file("../outside"),
            Err(StoreError::InvalidPath(_))
        ));
        assert!(matches!(store.locate_file("./"), Err(StoreError::InvalidPath(_))));
    }
}
