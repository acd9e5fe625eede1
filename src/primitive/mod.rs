//! The five primitive patch kinds and the closed enum that dispatches over them.

mod addfile;
mod binary;
mod hunk;
mod mv;
mod rmfile;

use serde::{Deserialize, Serialize};

use crate::error::{ApplyError, ParseError, ValidationError};
use crate::file::{unescape_path, File};
use crate::store::FileStore;

pub use addfile::AddFile;
pub use binary::Binary;
pub use hunk::{Hunk, HunkEdit, Sign};
pub use mv::Move;
pub use rmfile::RmFile;

/// Capabilities every primitive patch kind provides.
pub trait Primitive: Sized + Into<PrimitivePatch> {
    /// Leading word of the kind's text block.
    const TOKEN: &'static str;
    /// Generation order; lower runs first.
    const PRIORITY: u32;

    /// Apply to a file snapshot. `None` is an absent file.
    fn apply_to(&self, file: Option<File>) -> Result<Option<File>, ApplyError>;
    fn inverse(&self) -> PrimitivePatch;
    fn to_text(&self) -> String;
    fn parse(text: &str) -> Result<Self, ParseError>;
    /// Describe the part of the difference between two snapshots that this
    /// kind is responsible for.
    fn generate(orig: Option<&File>, changed: Option<&File>) -> Vec<Self>;
    fn validate(&self) -> Result<(), ValidationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PrimitivePatch {
    AddFile(AddFile),
    RmFile(RmFile),
    Move(Move),
    Hunk(Hunk),
    Binary(Binary),
}

macro_rules! dispatch {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            PrimitivePatch::AddFile($p) => $body,
            PrimitivePatch::RmFile($p) => $body,
            PrimitivePatch::Move($p) => $body,
            PrimitivePatch::Hunk($p) => $body,
            PrimitivePatch::Binary($p) => $body,
        }
    };
}

type Generator = fn(Option<&File>, Option<&File>) -> Vec<PrimitivePatch>;

fn generator<P: Primitive>(orig: Option<&File>, changed: Option<&File>) -> Vec<PrimitivePatch> {
    P::generate(orig, changed).into_iter().map(Into::into).collect()
}

/// Generators for every kind, sorted by priority. Kinds with equal priority
/// keep their declaration order.
pub(crate) fn generators() -> [(&'static str, Generator); 5] {
    let mut all = [
        (AddFile::TOKEN, AddFile::PRIORITY, generator::<AddFile> as Generator),
        (Binary::TOKEN, Binary::PRIORITY, generator::<Binary> as Generator),
        (Hunk::TOKEN, Hunk::PRIORITY, generator::<Hunk> as Generator),
        (Move::TOKEN, Move::PRIORITY, generator::<Move> as Generator),
        (RmFile::TOKEN, RmFile::PRIORITY, generator::<RmFile> as Generator),
    ];
    all.sort_by_key(|&(_, priority, _)| priority);
    all.map(|(token, _, generate)| (token, generate))
}

/// Tokens that open a primitive block in patch text.
pub const TOKENS: [&str; 5] = [
    AddFile::TOKEN,
    RmFile::TOKEN,
    Move::TOKEN,
    Hunk::TOKEN,
    Binary::TOKEN,
];

impl PrimitivePatch {
    pub fn token(&self) -> &'static str {
        match self {
            PrimitivePatch::AddFile(_) => AddFile::TOKEN,
            PrimitivePatch::RmFile(_) => RmFile::TOKEN,
            PrimitivePatch::Move(_) => Move::TOKEN,
            PrimitivePatch::Hunk(_) => Hunk::TOKEN,
            PrimitivePatch::Binary(_) => Binary::TOKEN,
        }
    }

    pub fn priority(&self) -> u32 {
        match self {
            PrimitivePatch::AddFile(_) => AddFile::PRIORITY,
            PrimitivePatch::RmFile(_) => RmFile::PRIORITY,
            PrimitivePatch::Move(_) => Move::PRIORITY,
            PrimitivePatch::Hunk(_) => Hunk::PRIORITY,
            PrimitivePatch::Binary(_) => Binary::PRIORITY,
        }
    }

    /// The path the patch leaves its result at. For a move, the new path.
    pub fn path(&self) -> &str {
        match self {
            PrimitivePatch::AddFile(p) => p.path(),
            PrimitivePatch::RmFile(p) => p.path(),
            PrimitivePatch::Move(p) => p.new_path(),
            PrimitivePatch::Hunk(p) => p.path(),
            PrimitivePatch::Binary(p) => p.path(),
        }
    }

    /// The path the patch reads from. For a move, the original path.
    pub fn source_path(&self) -> &str {
        match self {
            PrimitivePatch::Move(p) => p.original_path(),
            other => other.path(),
        }
    }

    pub fn apply_to(&self, file: Option<File>) -> Result<Option<File>, ApplyError> {
        dispatch!(self, p => p.apply_to(file))
    }

    pub fn inverse(&self) -> PrimitivePatch {
        dispatch!(self, p => p.inverse())
    }

    pub fn to_text(&self) -> String {
        dispatch!(self, p => p.to_text())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        dispatch!(self, p => p.validate())
    }

    /// Parse one primitive block, choosing the kind by its leading token.
    pub fn parse(text: &str) -> Result<PrimitivePatch, ParseError> {
        let token = text.split_whitespace().next().unwrap_or_default();
        let patch: PrimitivePatch = match token {
            AddFile::TOKEN => AddFile::parse(text)?.into(),
            RmFile::TOKEN => RmFile::parse(text)?.into(),
            Move::TOKEN => Move::parse(text)?.into(),
            Hunk::TOKEN => Hunk::parse(text)?.into(),
            Binary::TOKEN => Binary::parse(text)?.into(),
            _ => return Err(ParseError::new("unknown primitive patch kind", text)),
        };
        patch
            .validate()
            .map_err(|e| ParseError::new(e.to_string(), text))?;
        Ok(patch)
    }

    /// Apply to the file this patch names in `store`, then write the result
    /// back (or destroy the file if the patch removed it).
    pub fn apply_to_store<S: FileStore + ?Sized>(
        &self,
        store: &mut S,
    ) -> Result<Option<File>, crate::Error> {
        let before = store.locate_file(self.source_path())?;
        match (self, &before) {
            (PrimitivePatch::AddFile(p), Some(_)) => {
                return Err(ApplyError::new(p.path(), "file already exists").into());
            }
            (PrimitivePatch::AddFile(_), None) => {}
            (_, None) => {
                return Err(ApplyError::new(self.source_path(), "no such file").into());
            }
            (PrimitivePatch::Move(p), Some(_)) => {
                if store.locate_file(p.new_path())?.is_some() {
                    return Err(ApplyError::new(p.new_path(), "move target already exists").into());
                }
            }
            _ => {}
        }

        let after = self.apply_to(before.clone())?;
        match (&before, &after) {
            (Some(old), Some(new)) if old == new => {}
            (Some(old), Some(new)) => {
                if old.path != new.path {
                    store.destroy(&old.path)?;
                }
                store.save(new)?;
            }
            (None, Some(new)) => store.save(new)?,
            (Some(old), None) => store.destroy(&old.path)?,
            (None, None) => {}
        }
        tracing::trace!(kind = self.token(), path = self.path(), "applied primitive to store");
        Ok(after)
    }
}

impl From<AddFile> for PrimitivePatch {
    fn from(p: AddFile) -> Self {
        PrimitivePatch::AddFile(p)
    }
}

impl From<RmFile> for PrimitivePatch {
    fn from(p: RmFile) -> Self {
        PrimitivePatch::RmFile(p)
    }
}

impl From<Move> for PrimitivePatch {
    fn from(p: Move) -> Self {
        PrimitivePatch::Move(p)
    }
}

impl From<Hunk> for PrimitivePatch {
    fn from(p: Hunk) -> Self {
        PrimitivePatch::Hunk(p)
    }
}

impl From<Binary> for PrimitivePatch {
    fn from(p: Binary) -> Self {
        PrimitivePatch::Binary(p)
    }
}

impl std::fmt::Display for PrimitivePatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Split a block into its header fields (token stripped) and the lines
/// that follow the header.
pub(crate) fn block_header<'a>(
    text: &'a str,
    token: &str,
    fields: usize,
) -> Result<(Vec<&'a str>, Vec<&'a str>), ParseError> {
    let mut lines = text.split('\n');
    let head = lines.next().unwrap_or_default();
    let mut words = head.split_whitespace();
    if words.next() != Some(token) {
        return Err(ParseError::new(format!("expected a {token} patch"), text));
    }
    let found: Vec<&str> = words.collect();
    if found.len() != fields {
        return Err(ParseError::new(
            format!("{token} header takes {fields} field(s), found {}", found.len()),
            head,
        ));
    }
    Ok((found, lines.collect()))
}

/// Parse a block that is a single header line carrying only paths.
pub(crate) fn parse_path_block(
    text: &str,
    token: &str,
    paths: usize,
) -> Result<Vec<String>, ParseError> {
    let (fields, rest) = block_header(text, token, paths)?;
    if rest.iter().any(|l| !l.trim().is_empty()) {
        return Err(ParseError::new(format!("unexpected lines after {token}"), text));
    }
    Ok(fields.into_iter().map(unescape_path).collect())
}

/// Hunk and Binary describe an edit at an anchor within one file, which is
/// all pairwise commutation needs to know about them.
pub(crate) trait Positional: Clone {
    fn anchor(&self) -> usize;
    fn old_len(&self) -> usize;
    fn new_len(&self) -> usize;
    fn with_anchor(&self, anchor: usize) -> Self;
}
