use anyhow::{Context, Result};
use std::path::Path;

use crate::create::read_patch;
use crate::primitive::PrimitivePatch;
use crate::store::DirStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub files_added: usize,
    pub files_removed: usize,
    pub files_moved: usize,
    pub hunks: usize,
    pub binary_edits: usize,
}

impl ApplySummary {
    fn count(&mut self, patch: &PrimitivePatch) {
        match patch {
            PrimitivePatch::AddFile(_) => self.files_added += 1,
            PrimitivePatch::RmFile(_) => self.files_removed += 1,
            PrimitivePatch::Move(_) => self.files_moved += 1,
            PrimitivePatch::Hunk(_) => self.hunks += 1,
            PrimitivePatch::Binary(_) => self.binary_edits += 1,
        }
    }
}

/// Apply a patch file to the target directory.
///
/// Primitives apply in order and are not rolled back: when one fails, the
/// ones before it have already been written.
pub async fn apply_patch(target_dir: &Path, patch_path: &Path) -> Result<ApplySummary> {
    let patch = read_patch(patch_path)?;
    let target = target_dir.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<ApplySummary> {
        let mut store = DirStore::open(&target)
            .with_context(|| format!("Failed to open target: {}", target.display()))?;

        let mut summary = ApplySummary::default();
        for (index, primitive) in patch.patches().iter().enumerate() {
            primitive.apply_to_store(&mut store).with_context(|| {
                format!(
                    "Primitive {} of {} ({} {}) failed",
                    index + 1,
                    patch.len(),
                    primitive.token(),
                    primitive.path()
                )
            })?;
            summary.count(primitive);
        }
        tracing::info!(name = %patch.name(), primitives = patch.len(), "applied patch");
        Ok(summary)
    })
    .await?
}
