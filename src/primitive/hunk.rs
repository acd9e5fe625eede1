use serde::{Deserialize, Serialize};

use super::{block_header, Positional, Primitive, PrimitivePatch};
use crate::error::{ApplyError, ParseError, ValidationError};
use crate::file::{escape_path, join_lines, normalize_path, split_lines, unescape_path, File};
use crate::lcs;

/// Marks the end of a line that would otherwise lose trailing whitespace.
const EOL_SENTINEL: char = '$';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    Added,
    Removed,
}

impl Sign {
    fn as_char(self) -> char {
        match self {
            Sign::Added => '+',
            Sign::Removed => '-',
        }
    }
}

/// One line of a hunk with the position it occupies: removed lines count
/// from `line` in the file before the hunk, added lines in the file after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkEdit {
    pub sign: Sign,
    pub line: usize,
    pub text: String,
}

/// Replaces a run of lines in a text file.
///
/// `line` is 1-based and refers to the file as it is just before this hunk
/// applies. The removed lines are checked against the file on apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    path: String,
    line: usize,
    removed: Vec<String>,
    added: Vec<String>,
}

impl Hunk {
    pub fn new(path: &str, line: usize, removed: Vec<String>, added: Vec<String>) -> Self {
        Self {
            path: normalize_path(path),
            line,
            removed,
            added,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn removed(&self) -> &[String] {
        &self.removed
    }

    pub fn added(&self) -> &[String] {
        &self.added
    }

    pub fn edits(&self) -> Vec<HunkEdit> {
        let removed = self.removed.iter().enumerate().map(|(i, text)| HunkEdit {
            sign: Sign::Removed,
            line: self.line.saturating_add(i),
            text: text.clone(),
        });
        let added = self.added.iter().enumerate().map(|(i, text)| HunkEdit {
            sign: Sign::Added,
            line: self.line.saturating_add(i),
            text: text.clone(),
        });
        removed.chain(added).collect()
    }

    pub(crate) fn with_path(&self, path: &str) -> Self {
        Self {
            path: normalize_path(path),
            ..self.clone()
        }
    }
}

impl Positional for Hunk {
    fn anchor(&self) -> usize {
        self.line
    }

    fn old_len(&self) -> usize {
        self.removed.len()
    }

    fn new_len(&self) -> usize {
        self.added.len()
    }

    fn with_anchor(&self, anchor: usize) -> Self {
        Self {
            line: anchor,
            ..self.clone()
        }
    }
}

impl Primitive for Hunk {
    const TOKEN: &'static str = "hunk";
    const PRIORITY: u32 = 50;

    fn apply_to(&self, file: Option<File>) -> Result<Option<File>, ApplyError> {
        let file = match file {
            Some(file) if file.path == self.path => file,
            other => return Ok(other),
        };
        let text = std::str::from_utf8(&file.contents)
            .map_err(|_| ApplyError::new(&self.path, "file is not UTF-8 text"))?;
        let mut lines = split_lines(text);

        let start = self
            .line
            .checked_sub(1)
            .ok_or_else(|| ApplyError::new(&self.path, "hunk lines start at 1"))?;
        let end = start
            .checked_add(self.removed.len())
            .filter(|&end| end <= lines.len())
            .ok_or_else(|| {
                ApplyError::new(
                    &self.path,
                    format!(
                        "hunk at line {} spans past the end of the file ({} lines)",
                        self.line,
                        lines.len()
                    ),
                )
            })?;
        if let Some(i) = (0..self.removed.len()).find(|&i| lines[start + i] != self.removed[i]) {
            return Err(ApplyError::new(
                &self.path,
                format!(
                    "line {} is {:?}, hunk expects {:?}",
                    self.line + i,
                    lines[start + i],
                    self.removed[i]
                ),
            ));
        }

        lines.splice(start..end, self.added.iter().cloned());
        Ok(Some(file.with_contents(join_lines(&lines).into_bytes())))
    }

    fn inverse(&self) -> PrimitivePatch {
        Hunk::new(&self.path, self.line, self.added.clone(), self.removed.clone()).into()
    }

    fn to_text(&self) -> String {
        let mut out = format!("{} {} {}", Self::TOKEN, escape_path(&self.path), self.line);
        for edit in self.edits() {
            out.push('\n');
            out.push(edit.sign.as_char());
            out.push_str(&edit.text);
            if needs_sentinel(&edit.text) {
                out.push(EOL_SENTINEL);
            }
        }
        out
    }

    fn parse(text: &str) -> Result<Self, ParseError> {
        let (fields, body) = block_header(text, Self::TOKEN, 2)?;
        let path = unescape_path(fields[0]);
        let line = fields[1]
            .parse::<usize>()
            .map_err(|_| ParseError::new("hunk line is not a number", fields[1]))?;

        let mut removed = Vec::new();
        let mut added = Vec::new();
        for raw in body {
            let mut chars = raw.chars();
            match chars.next() {
                Some('+') => added.push(decode_line(chars.as_str())),
                Some('-') => removed.push(decode_line(chars.as_str())),
                _ => return Err(ParseError::new("failed to parse a line in hunk", raw)),
            }
        }
        Ok(Self::new(&path, line, removed, added))
    }

    fn generate(orig: Option<&File>, changed: Option<&File>) -> Vec<Self> {
        let Some(path) = orig.or(changed).map(|f| f.path.clone()) else {
            return Vec::new();
        };
        let (Some(old), Some(new)) = (text_of(orig), text_of(changed)) else {
            return Vec::new();
        };
        let old_lines = split_lines(old);
        let new_lines = split_lines(new);

        // Each hunk applies to the output of the previous ones, so a
        // region's old index shifts by the net growth of every region before it.
        let mut offset: isize = 0;
        let mut hunks = Vec::new();
        for region in lcs::diff(&old_lines, &new_lines) {
            let anchor = (region.old_start as isize + offset) as usize;
            debug_assert_eq!(anchor, region.new_start);
            offset += region.added.len() as isize - region.removed.len() as isize;
            hunks.push(Hunk::new(&path, anchor + 1, region.removed, region.added));
        }
        hunks
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.path.is_empty() {
            return Err(ValidationError::EmptyPath);
        }
        if self.line == 0 {
            return Err(ValidationError::ZeroHunkLine(self.path.clone()));
        }
        if self.removed.is_empty() && self.added.is_empty() {
            return Err(ValidationError::EmptyEdit {
                kind: Self::TOKEN,
                path: self.path.clone(),
            });
        }
        Ok(())
    }
}

/// Text of a snapshot for line diffing. Absent files read as empty;
/// binary contents are left to the binary patch kind.
fn text_of(file: Option<&File>) -> Option<&str> {
    match file {
        None => Some(""),
        Some(file) if file.is_binary() => None,
        Some(file) => std::str::from_utf8(&file.contents).ok(),
    }
}

fn needs_sentinel(text: &str) -> bool {
    text.ends_with(|c: char| c.is_whitespace() || c == EOL_SENTINEL)
}

/// A trailing `$` is a sentinel only when the text before it would have
/// needed one; otherwise it belongs to the line.
fn decode_line(raw: &str) -> String {
    match raw.strip_suffix(EOL_SENTINEL) {
        Some(text) if needs_sentinel(text) => text.to_string(),
        Some(_) => raw.to_string(),
        None => raw.trim_end().to_string(),
    }
}
