use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::file::File;
use crate::patch::{generate_primitives, Patch, PatchInfo};
use crate::primitive::PrimitivePatch;
use crate::util::{self, FileEntry};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub files_added: usize,
    pub files_modified: usize,
    pub files_removed: usize,
    pub files_moved: usize,
    pub primitives: usize,
}

/// One file's before/after pair. `None` on a side means the file is absent there.
struct FileChange {
    old: Option<PathBuf>,
    new: Option<PathBuf>,
    old_path: Option<String>,
    new_path: Option<String>,
}

impl FileChange {
    fn sort_key(&self) -> &str {
        self.old_path
            .as_deref()
            .or(self.new_path.as_deref())
            .unwrap_or_default()
    }
}

/// Record the difference between two directory trees as one named patch.
/// Walks both trees concurrently, then generates per-file primitives in
/// parallel. Returns `None` for the patch when the trees are identical.
pub async fn record_tree(
    old_dir: &Path,
    new_dir: &Path,
    info: PatchInfo,
) -> Result<(Option<Patch>, RecordSummary)> {
    info.validate().context("Invalid patch metadata")?;

    // Stage 1: walk both trees concurrently
    let old_dir_owned = old_dir.to_path_buf();
    let new_dir_owned = new_dir.to_path_buf();

    let (old_entries, new_entries) = tokio::try_join!(
        tokio::task::spawn_blocking(move || util::walk_files(&old_dir_owned)),
        tokio::task::spawn_blocking(move || util::walk_files(&new_dir_owned)),
    )?;

    let old_entries = old_entries?;
    let new_entries = new_entries?;

    // Stage 2: classify by path
    let old_map: HashMap<&str, &FileEntry> = old_entries
        .iter()
        .map(|e| (e.relative_path.as_str(), e))
        .collect();
    let new_map: HashMap<&str, &FileEntry> = new_entries
        .iter()
        .map(|e| (e.relative_path.as_str(), e))
        .collect();

    let old_paths = util::path_set(&old_entries);
    let new_paths = util::path_set(&new_entries);

    let added: Vec<&FileEntry> = new_paths
        .difference(&old_paths)
        .map(|p| new_map[p.as_str()])
        .collect();
    let removed: Vec<&FileEntry> = old_paths
        .difference(&new_paths)
        .map(|p| old_map[p.as_str()])
        .collect();
    let common: Vec<(&FileEntry, &FileEntry)> = old_paths
        .intersection(&new_paths)
        .map(|p| (old_map[p.as_str()], new_map[p.as_str()]))
        .collect();

    // Stage 3: hash to drop unchanged files and pair removed/added files
    // with identical contents as moves. Different sizes are known changed.
    let (changed_common, moves) = tokio::task::spawn_blocking({
        let common: Vec<(FileEntry, FileEntry)> = common
            .iter()
            .map(|&(o, n)| (o.clone(), n.clone()))
            .collect();
        let added: Vec<FileEntry> = added.iter().map(|&e| e.clone()).collect();
        let removed: Vec<FileEntry> = removed.iter().map(|&e| e.clone()).collect();
        move || -> Result<(Vec<(FileEntry, FileEntry)>, Vec<(String, String)>)> {
            let changed_common = common
                .into_par_iter()
                .map(|(old, new)| -> Result<Option<(FileEntry, FileEntry)>> {
                    if old.size != new.size {
                        return Ok(Some((old, new)));
                    }
                    let same = hash_file(&old.full_path)? == hash_file(&new.full_path)?;
                    Ok((!same).then_some((old, new)))
                })
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .flatten()
                .collect();
            Ok((changed_common, detect_moves(&removed, &added)?))
        }
    })
    .await??;

    let moved_from: HashMap<&str, &str> = moves
        .iter()
        .map(|(from, to)| (from.as_str(), to.as_str()))
        .collect();
    let moved_to: HashMap<&str, &str> = moves
        .iter()
        .map(|(from, to)| (to.as_str(), from.as_str()))
        .collect();

    let mut changes: Vec<FileChange> = Vec::new();
    for (old, new) in &changed_common {
        changes.push(FileChange {
            old: Some(old.full_path.clone()),
            new: Some(new.full_path.clone()),
            old_path: Some(old.relative_path.clone()),
            new_path: Some(new.relative_path.clone()),
        });
    }
    for entry in &removed {
        let target = moved_from.get(entry.relative_path.as_str());
        changes.push(FileChange {
            old: Some(entry.full_path.clone()),
            new: target.map(|to| new_map[to].full_path.clone()),
            old_path: Some(entry.relative_path.clone()),
            new_path: target.map(|to| to.to_string()),
        });
    }
    for entry in &added {
        if moved_to.contains_key(entry.relative_path.as_str()) {
            continue;
        }
        changes.push(FileChange {
            old: None,
            new: Some(entry.full_path.clone()),
            old_path: None,
            new_path: Some(entry.relative_path.clone()),
        });
    }
    changes.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));

    let summary_base = RecordSummary {
        files_added: added.len() - moves.len(),
        files_modified: changed_common.len(),
        files_removed: removed.len() - moves.len(),
        files_moved: moves.len(),
        primitives: 0,
    };

    // Stage 4: per-file generation in parallel, concatenated in path order
    let per_file: Vec<Vec<PrimitivePatch>> = tokio::task::spawn_blocking(move || {
        changes
            .par_iter()
            .map(generate_for)
            .collect::<Result<Vec<_>>>()
    })
    .await??;

    let primitives: Vec<PrimitivePatch> = per_file.into_iter().flatten().collect();
    let summary = RecordSummary {
        primitives: primitives.len(),
        ..summary_base
    };
    tracing::info!(
        added = summary.files_added,
        modified = summary.files_modified,
        removed = summary.files_removed,
        moved = summary.files_moved,
        primitives = summary.primitives,
        "recorded tree"
    );

    if primitives.is_empty() {
        return Ok((None, summary));
    }
    Ok((Some(Patch::new(info, primitives)?), summary))
}

fn generate_for(change: &FileChange) -> Result<Vec<PrimitivePatch>> {
    let load = |full: &Option<PathBuf>, rel: &Option<String>| -> Result<Option<File>> {
        match (full, rel) {
            (Some(full), Some(rel)) => {
                let contents = util::read_file(full)
                    .with_context(|| format!("Failed to read file: {}", full.display()))?;
                Ok(Some(File::new(rel, contents)))
            }
            _ => Ok(None),
        }
    };
    let old = load(&change.old, &change.old_path)?;
    let new = load(&change.new, &change.new_path)?;
    generate_primitives(old.as_ref(), new.as_ref())
        .with_context(|| format!("Failed to generate patch for {}", change.sort_key()))
}

/// Pair each removed file with an added file of identical contents.
/// Pairing is one-to-one and in path order.
fn detect_moves(removed: &[FileEntry], added: &[FileEntry]) -> Result<Vec<(String, String)>> {
    let mut by_hash: BTreeMap<(u64, [u8; 32]), Vec<&str>> = BTreeMap::new();
    let added_hashes: Vec<((u64, [u8; 32]), &str)> = added
        .par_iter()
        .map(|e| -> Result<_> { Ok(((e.size, hash_file(&e.full_path)?), e.relative_path.as_str())) })
        .collect::<Result<_>>()?;
    for (key, path) in added_hashes {
        by_hash.entry(key).or_default().push(path);
    }
    for candidates in by_hash.values_mut() {
        candidates.sort_unstable_by(|a, b| b.cmp(a));
    }

    let mut moves = Vec::new();
    for entry in removed {
        let key = (entry.size, hash_file(&entry.full_path)?);
        if let Some(target) = by_hash.get_mut(&key).and_then(Vec::pop) {
            moves.push((entry.relative_path.clone(), target.to_string()));
        }
    }
    Ok(moves)
}

/// Hash a file's contents with BLAKE3.
fn hash_file(path: &Path) -> Result<[u8; 32]> {
    let data = util::read_file(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    Ok(util::hash_bytes(&data))
}

/// Write a patch gzip-compressed to `output`.
pub fn write_patch(patch: &Patch, output: &Path) -> Result<()> {
    let compressed = patch.to_gzip().context("Failed to compress patch")?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let mut file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create output file: {}", output.display()))?;
    file.write_all(&compressed)?;
    file.flush()?;
    Ok(())
}

/// Read a patch file, gzip-compressed or plain text.
pub fn read_patch(path: &Path) -> Result<Patch> {
    let bytes = util::read_file(path)
        .with_context(|| format!("Failed to read patch file: {}", path.display()))?;
    Patch::parse_bytes(&bytes).with_context(|| format!("Invalid patch file: {}", path.display()))
}
