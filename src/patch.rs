//! Named patches: an ordered sequence of primitives plus the metadata that
//! identifies the change.

use chrono::{NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::commute::{commute_sequences, invert_sequence, merge_sequences};
use crate::error::{ApplyError, CommuteConflict, GenerationError, ParseError, ValidationError};
use crate::file::File;
use crate::patch_format::{self, DATE_FORMAT};
use crate::primitive::{generators, PrimitivePatch};
use crate::store::FileStore;

/// Characters of the author digest that go into a patch file name.
const AUTHOR_HASH_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchInfo {
    pub author: String,
    pub name: String,
    /// Second precision; finer parts are not stored in patch text.
    pub date: NaiveDateTime,
    pub comment: Option<String>,
    pub inverted: bool,
}

impl PatchInfo {
    /// Metadata stamped with the current UTC time.
    pub fn new(author: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            author: author.into(),
            name: name.into(),
            date: now.with_nanosecond(0).unwrap_or(now),
            comment: None,
            inverted: false,
        }
    }

    pub fn with_date(mut self, date: NaiveDateTime) -> Self {
        self.date = date;
        self
    }

    /// Blank comments are dropped.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        self.comment = (!comment.trim().is_empty()).then_some(comment);
        self
    }

    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    /// SHA-1 over the identifying fields, as lowercase hex.
    pub fn digest(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.name.as_bytes());
        hasher.update(self.author.as_bytes());
        hasher.update(self.date_string().as_bytes());
        if let Some(comment) = &self.comment {
            for line in comment.split('\n') {
                hasher.update(line.trim_end().as_bytes());
            }
        }
        hasher.update(if self.inverted { b"t" } else { b"f" });
        hex::encode(hasher.finalize())
    }

    pub fn author_hash(&self) -> String {
        let digest = hex::encode(Sha1::digest(self.author.as_bytes()));
        digest[..AUTHOR_HASH_LEN].to_string()
    }

    /// `<date>-<author hash>-<digest>.gz`
    pub fn file_name(&self) -> String {
        format!("{}-{}-{}.gz", self.date_string(), self.author_hash(), self.digest())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.author.trim().is_empty() {
            return Err(ValidationError::EmptyAuthor);
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.author.contains(['\n', '*']) {
            return Err(ValidationError::InvalidHeader {
                field: "author",
                value: self.author.clone(),
            });
        }
        if self.name.contains('\n') {
            return Err(ValidationError::InvalidHeader {
                field: "name",
                value: self.name.clone(),
            });
        }
        if self.date_string().len() != patch_format::DATE_WIDTH {
            return Err(ValidationError::InvalidHeader {
                field: "date",
                value: self.date_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    info: PatchInfo,
    patches: Vec<PrimitivePatch>,
}

impl Patch {
    /// Build a patch after validating its metadata and every primitive.
    pub fn new(info: PatchInfo, patches: Vec<PrimitivePatch>) -> Result<Self, ValidationError> {
        info.validate()?;
        for patch in &patches {
            patch.validate()?;
        }
        Ok(Self::from_parts(info, patches))
    }

    pub(crate) fn from_parts(mut info: PatchInfo, patches: Vec<PrimitivePatch>) -> Self {
        info.comment = info.comment.filter(|c| !c.trim().is_empty());
        Self { info, patches }
    }

    pub fn info(&self) -> &PatchInfo {
        &self.info
    }

    pub fn author(&self) -> &str {
        &self.info.author
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn date(&self) -> NaiveDateTime {
        self.info.date
    }

    pub fn comment(&self) -> Option<&str> {
        self.info.comment.as_deref()
    }

    pub fn is_inverted(&self) -> bool {
        self.info.inverted
    }

    pub fn patches(&self) -> &[PrimitivePatch] {
        &self.patches
    }

    pub fn into_patches(self) -> Vec<PrimitivePatch> {
        self.patches
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn digest(&self) -> String {
        self.info.digest()
    }

    pub fn file_name(&self) -> String {
        self.info.file_name()
    }

    /// Undo this patch: primitives inverted in reverse order, the inverted
    /// flag toggled.
    pub fn inverse(&self) -> Patch {
        let mut info = self.info.clone();
        info.inverted = !info.inverted;
        Self::from_parts(info, invert_sequence(&self.patches))
    }

    /// Commute `self` followed by `other`. The result is `(other', self')`,
    /// each keeping its original metadata.
    pub fn commute(&self, other: &Patch) -> Result<(Patch, Patch), CommuteConflict> {
        let (first, second) = commute_sequences(&self.patches, &other.patches)?;
        Ok((
            Self::from_parts(other.info.clone(), first),
            Self::from_parts(self.info.clone(), second),
        ))
    }

    /// Rebase `other`, made in parallel with `self` from the same starting
    /// state, so it applies after `self`.
    pub fn merge(&self, other: &Patch) -> Result<Patch, CommuteConflict> {
        let merged = merge_sequences(&self.patches, &other.patches)?;
        Ok(Self::from_parts(other.info.clone(), merged))
    }

    pub fn apply_to(&self, file: Option<File>) -> Result<Option<File>, ApplyError> {
        self.patches
            .iter()
            .try_fold(file, |file, patch| patch.apply_to(file))
    }

    /// Apply every primitive against `store` in order. Stops at the first
    /// failure, leaving earlier primitives applied.
    pub fn apply_to_store<S: FileStore + ?Sized>(
        &self,
        store: &mut S,
    ) -> Result<Vec<Option<File>>, crate::Error> {
        let mut results = Vec::with_capacity(self.patches.len());
        for patch in &self.patches {
            results.push(patch.apply_to_store(store)?);
        }
        tracing::debug!(name = %self.info.name, primitives = results.len(), "applied patch to store");
        Ok(results)
    }

    /// A patch turning `orig` into `changed`, or `None` when they are equal.
    /// Metadata that could not be written back as patch text is rejected.
    pub fn generate(
        orig: Option<&File>,
        changed: Option<&File>,
        info: PatchInfo,
    ) -> Result<Option<Patch>, crate::Error> {
        info.validate()?;
        let patches = generate_primitives(orig, changed)?;
        if patches.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::new(info, patches)?))
    }

    pub fn to_text(&self) -> String {
        patch_format::render(self)
    }

    pub fn parse(text: &str) -> Result<Patch, ParseError> {
        patch_format::parse(text)
    }

    /// Parse patch file contents, gzip-compressed or plain text.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Patch, ParseError> {
        patch_format::parse_bytes(bytes)
    }

    pub fn to_gzip(&self) -> std::io::Result<Vec<u8>> {
        patch_format::deflate(&self.to_text())
    }
}

impl std::fmt::Display for Patch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Run every kind's generator in priority order against a scratch copy of
/// `orig`, then check the scratch copy ended up equal to `changed`.
pub fn generate_primitives(
    orig: Option<&File>,
    changed: Option<&File>,
) -> Result<Vec<PrimitivePatch>, GenerationError> {
    let mut scratch = orig.cloned();
    let mut patches = Vec::new();
    for (token, generate) in generators() {
        let generated = generate(scratch.as_ref(), changed);
        for patch in &generated {
            scratch = patch.apply_to(scratch).map_err(|e| GenerationError {
                message: format!("generated {token} does not apply: {e}"),
            })?;
        }
        if !generated.is_empty() {
            tracing::trace!(kind = token, count = generated.len(), "generated primitives");
        }
        patches.extend(generated);
    }

    if scratch.as_ref() != changed {
        let path = changed.or(orig).map(|f| f.path.as_str()).unwrap_or_default();
        return Err(GenerationError {
            message: format!("generated primitives do not reproduce {path}"),
        });
    }
    tracing::debug!(primitives = patches.len(), "generated file patch");
    Ok(patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch_format::parse_date;
    use crate::primitive::{AddFile, Hunk, Move, RmFile};
    use crate::store::MemoryStore;

    fn info() -> PatchInfo {
        PatchInfo::new("jane@example.org", "tidy up")
            .with_date(parse_date("20240102030405").unwrap())
    }

    fn hunk(path: &str, line: usize, removed: &[&str], added: &[&str]) -> PrimitivePatch {
        Hunk::new(
            path,
            line,
            removed.iter().map(|s| s.to_string()).collect(),
            added.iter().map(|s| s.to_string()).collect(),
        )
        .into()
    }

    #[test]
    fn test_generate_modification() {
        let orig = File::new("f.txt", "a\nb\nc\n");
        let changed = File::new("f.txt", "a\nX\nc\n");
        let patch = Patch::generate(Some(&orig), Some(&changed), info())
            .unwrap()
            .unwrap();
        assert_eq!(patch.patches(), &[hunk("f.txt", 2, &["b"], &["X"])]);
        assert_eq!(patch.apply_to(Some(orig.clone())).unwrap(), Some(changed.clone()));
        assert_eq!(patch.inverse().apply_to(Some(changed)).unwrap(), Some(orig));
    }

    #[test]
    fn test_generate_identical_is_none() {
        let file = File::new("f", "same");
        assert!(Patch::generate(Some(&file), Some(&file), info()).unwrap().is_none());
        assert!(Patch::generate(None, None, info()).unwrap().is_none());
    }

    #[test]
    fn test_generate_creation_and_removal() {
        let created = File::new("new.txt", "hello\nworld");
        let add = Patch::generate(None, Some(&created), info()).unwrap().unwrap();
        assert_eq!(add.patches()[0], AddFile::new("new.txt").into());
        assert_eq!(add.patches().len(), 2);
        assert_eq!(add.apply_to(None).unwrap(), Some(created.clone()));

        let remove = Patch::generate(Some(&created), None, info()).unwrap().unwrap();
        assert_eq!(remove.patches().last(), Some(&RmFile::new("new.txt").into()));
        assert_eq!(remove.apply_to(Some(created)).unwrap(), None);
    }

    #[test]
    fn test_generate_empty_file_round_trip() {
        let empty = File::new("e", "");
        let add = Patch::generate(None, Some(&empty), info()).unwrap().unwrap();
        assert_eq!(add.patches(), &[AddFile::new("e").into()]);
        let remove = Patch::generate(Some(&empty), None, info()).unwrap().unwrap();
        assert_eq!(remove.patches(), &[RmFile::new("e").into()]);
    }

    #[test]
    fn test_generate_move_with_edit() {
        let orig = File::new("old.txt", "one\ntwo");
        let changed = File::new("new.txt", "one\n2");
        let patch = Patch::generate(Some(&orig), Some(&changed), info())
            .unwrap()
            .unwrap();
        assert_eq!(
            patch.patches(),
            &[
                hunk("old.txt", 2, &["two"], &["2"]),
                Move::new("old.txt", "new.txt").into(),
            ]
        );
        assert_eq!(patch.apply_to(Some(orig)).unwrap(), Some(changed));
    }

    #[test]
    fn test_generate_binary() {
        let orig = File::new("img", vec![0u8, 1, 2, 3]);
        let changed = File::new("img", vec![0u8, 1, 9, 3, 4]);
        let patch = Patch::generate(Some(&orig), Some(&changed), info())
            .unwrap()
            .unwrap();
        assert!(patch.patches().iter().all(|p| p.token() == "binary"));
        assert_eq!(patch.apply_to(Some(orig)).unwrap(), Some(changed));
    }

    #[test]
    fn test_inverse_toggles_flag_and_changes_digest() {
        let patch = Patch::new(info(), vec![hunk("f", 1, &["a"], &["b"])]).unwrap();
        let inverse = patch.inverse();
        assert!(inverse.is_inverted());
        assert_eq!(inverse.patches(), &[hunk("f", 1, &["b"], &["a"])]);
        assert_ne!(inverse.digest(), patch.digest());
        assert_eq!(inverse.inverse(), patch);
    }

    #[test]
    fn test_commute_keeps_metadata() {
        let a = Patch::new(info(), vec![hunk("f", 2, &["x"], &["y"])]).unwrap();
        let mut other_info = info();
        other_info.name = "second".to_string();
        let b = Patch::new(other_info, vec![hunk("f", 10, &["p", "q"], &["r"])]).unwrap();

        let (b2, a2) = a.commute(&b).unwrap();
        assert_eq!(b2.name(), "second");
        assert_eq!(a2.name(), "tidy up");
        assert_eq!(b2.patches(), &[hunk("f", 10, &["p", "q"], &["r"])]);
        assert_eq!(a2.patches(), &[hunk("f", 2, &["x"], &["y"])]);
    }

    #[test]
    fn test_merge_rebases_other() {
        let base = File::new("f", "1\n2\n3\n4\n5");
        let mine = Patch::new(info(), vec![hunk("f", 1, &["1"], &["one", "uno"])]).unwrap();
        let theirs = Patch::new(info(), vec![hunk("f", 4, &["4"], &["four"])]).unwrap();
        let merged = mine.merge(&theirs).unwrap();
        assert_eq!(merged.patches(), &[hunk("f", 5, &["4"], &["four"])]);

        let result = mine
            .apply_to(Some(base))
            .and_then(|f| merged.apply_to(f))
            .unwrap()
            .unwrap();
        assert_eq!(result.contents, b"one\nuno\n2\n3\nfour\n5");
    }

    #[test]
    fn test_digest_and_file_name() {
        let patch_info = info();
        let digest = patch_info.digest();
        assert_eq!(digest.len(), 40);
        assert!(digest.bytes().all(|b| b.is_ascii_hexdigit()));

        let mut expected = Sha1::new();
        expected.update(b"tidy upjane@example.org20240102030405f");
        assert_eq!(digest, hex::encode(expected.finalize()));

        let name = patch_info.file_name();
        assert!(name.starts_with("20240102030405-"));
        assert!(name.ends_with(&format!("-{digest}.gz")));
        assert_eq!(patch_info.author_hash().len(), 5);
    }

    #[test]
    fn test_digest_covers_comment_without_trailing_space() {
        let a = info().with_comment("line one  \nline two");
        let b = info().with_comment("line one\nline two");
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), info().digest());
        assert!(info().with_comment("   ").comment.is_none());
    }

    #[test]
    fn test_validate_info() {
        assert!(matches!(
            PatchInfo::new("", "n").validate(),
            Err(ValidationError::EmptyAuthor)
        ));
        assert!(matches!(
            PatchInfo::new("a", " ").validate(),
            Err(ValidationError::EmptyName)
        ));
        assert!(PatchInfo::new("a*b", "n").validate().is_err());
        assert!(PatchInfo::new("a", "two\nlines").validate().is_err());
        assert!(Patch::new(info(), vec![hunk("f", 0, &["a"], &[])]).is_err());
    }

    #[test]
    fn test_generate_rejects_unwritable_author() {
        let orig = File::new("f", "x\n");
        let changed = File::new("f", "y\n");
        for author in ["a*b", "two\nlines", ""] {
            let err = Patch::generate(Some(&orig), Some(&changed), PatchInfo::new(author, "n"))
                .unwrap_err();
            assert!(matches!(err, crate::Error::Validation(_)), "{err}");
        }
    }

    #[test]
    fn test_text_and_gzip_round_trip() {
        let patch = Patch::new(
            info().with_comment("because"),
            vec![AddFile::new("a").into(), hunk("a", 1, &[""], &["x "])],
        )
        .unwrap();
        assert_eq!(Patch::parse(&patch.to_text()).unwrap(), patch);
        assert_eq!(Patch::parse_bytes(&patch.to_gzip().unwrap()).unwrap(), patch);
    }

    #[test]
    fn test_whitespace_in_path_survives_text_form() {
        let orig = File::new("a\tb.txt", "x\n");
        let changed = File::new("dir\u{3000}2/a\tb.txt", "y\n");
        let patch = Patch::generate(Some(&orig), Some(&changed), info())
            .unwrap()
            .unwrap();
        let parsed = Patch::parse(&patch.to_text()).unwrap();
        assert_eq!(parsed, patch);
        assert_eq!(parsed.apply_to(Some(orig)).unwrap(), Some(changed));
    }

    #[test]
    fn test_apply_to_store() {
        let mut store = MemoryStore::default();
        let orig = File::new("doc.txt", "a\nb");
        let changed = File::new("doc.txt", "a\nc");
        let create = Patch::generate(None, Some(&orig), info()).unwrap().unwrap();
        let edit = Patch::generate(Some(&orig), Some(&changed), info()).unwrap().unwrap();

        create.apply_to_store(&mut store).unwrap();
        edit.apply_to_store(&mut store).unwrap();
        assert_eq!(store.locate_file("doc.txt").unwrap(), Some(changed));

        // A second creation finds the file already there.
        assert!(create.apply_to_store(&mut store).is_err());
    }
}
