use serde::{Deserialize, Serialize};

use super::{block_header, Positional, Primitive, PrimitivePatch};
use crate::error::{ApplyError, ParseError, ValidationError};
use crate::file::{escape_path, normalize_path, unescape_path, File};
use crate::lcs;

/// Raw bytes per hex line: 76 hex digits plus the sign stays within 78 columns.
pub const HEX_LINE_BYTES: usize = 38;

/// Replaces a byte range of a file. `position` is a 0-based offset into the
/// file as it is just before this patch applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binary {
    path: String,
    position: usize,
    removed: Vec<u8>,
    added: Vec<u8>,
}

impl Binary {
    pub fn new(path: &str, position: usize, removed: Vec<u8>, added: Vec<u8>) -> Self {
        Self {
            path: normalize_path(path),
            position,
            removed,
            added,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn removed(&self) -> &[u8] {
        &self.removed
    }

    pub fn added(&self) -> &[u8] {
        &self.added
    }

    pub(crate) fn with_path(&self, path: &str) -> Self {
        Self {
            path: normalize_path(path),
            ..self.clone()
        }
    }
}

impl Positional for Binary {
    fn anchor(&self) -> usize {
        self.position
    }

    fn old_len(&self) -> usize {
        self.removed.len()
    }

    fn new_len(&self) -> usize {
        self.added.len()
    }

    fn with_anchor(&self, anchor: usize) -> Self {
        Self {
            position: anchor,
            ..self.clone()
        }
    }
}

impl Primitive for Binary {
    const TOKEN: &'static str = "binary";
    // Ahead of hunks so binary contents never reach the line differ.
    const PRIORITY: u32 = 20;

    fn apply_to(&self, file: Option<File>) -> Result<Option<File>, ApplyError> {
        let file = match file {
            Some(file) if file.path == self.path => file,
            other => return Ok(other),
        };
        let end = self
            .position
            .checked_add(self.removed.len())
            .filter(|&end| end <= file.contents.len())
            .ok_or_else(|| {
                ApplyError::new(
                    &self.path,
                    format!(
                        "position {} is past the end of the file ({} bytes)",
                        self.position,
                        file.contents.len()
                    ),
                )
            })?;
        if file.contents[self.position..end] != self.removed[..] {
            return Err(ApplyError::new(
                &self.path,
                format!("bytes at offset {} do not match the patch", self.position),
            ));
        }

        let mut contents = Vec::with_capacity(file.contents.len() - self.removed.len() + self.added.len());
        contents.extend_from_slice(&file.contents[..self.position]);
        contents.extend_from_slice(&self.added);
        contents.extend_from_slice(&file.contents[end..]);
        Ok(Some(file.with_contents(contents)))
    }

    fn inverse(&self) -> PrimitivePatch {
        Binary::new(&self.path, self.position, self.added.clone(), self.removed.clone()).into()
    }

    fn to_text(&self) -> String {
        let mut out = format!("{} {} {}", Self::TOKEN, escape_path(&self.path), self.position);
        for (sign, bytes) in [('-', &self.removed), ('+', &self.added)] {
            for chunk in bytes.chunks(HEX_LINE_BYTES) {
                out.push('\n');
                out.push(sign);
                out.push_str(&hex::encode(chunk));
            }
        }
        out
    }

    fn parse(text: &str) -> Result<Self, ParseError> {
        let (fields, body) = block_header(text, Self::TOKEN, 2)?;
        let path = unescape_path(fields[0]);
        let position = fields[1]
            .parse::<usize>()
            .map_err(|_| ParseError::new("binary position is not a number", fields[1]))?;

        let mut removed_hex = String::new();
        let mut added_hex = String::new();
        for raw in body {
            let raw = raw.trim_end();
            if let Some(hex) = raw.strip_prefix('-') {
                if !added_hex.is_empty() {
                    return Err(ParseError::new("removed bytes after added bytes", raw));
                }
                removed_hex.push_str(hex);
            } else if let Some(hex) = raw.strip_prefix('+') {
                added_hex.push_str(hex);
            } else {
                return Err(ParseError::new("failed to parse a line in binary patch", raw));
            }
        }
        let decode = |hex: &str| {
            hex::decode(hex).map_err(|e| ParseError::new(format!("bad hex data: {e}"), hex))
        };
        Ok(Self::new(&path, position, decode(&removed_hex)?, decode(&added_hex)?))
    }

    fn generate(orig: Option<&File>, changed: Option<&File>) -> Vec<Self> {
        let Some(path) = orig.or(changed).map(|f| f.path.clone()) else {
            return Vec::new();
        };
        let binary = orig.is_some_and(File::is_binary) || changed.is_some_and(File::is_binary);
        if !binary {
            return Vec::new();
        }
        let empty = Vec::new();
        let old = orig.map_or(&empty, |f| &f.contents);
        let new = changed.map_or(&empty, |f| &f.contents);

        let mut offset: isize = 0;
        let mut patches = Vec::new();
        for region in lcs::diff(old, new) {
            let anchor = (region.old_start as isize + offset) as usize;
            offset += region.added.len() as isize - region.removed.len() as isize;
            patches.push(Binary::new(&path, anchor, region.removed, region.added));
        }
        patches
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.path.is_empty() {
            return Err(ValidationError::EmptyPath);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_all(file: Option<File>, patches: &[Binary]) -> Option<File> {
        patches
            .iter()
            .try_fold(file, |file, p| p.apply_to(file))
            .unwrap()
    }

    #[test]
    fn test_apply_splice() {
        let patch = Binary::new("blob", 2, vec![0xAA, 0xBB], vec![0x01]);
        let file = File::new("blob", vec![0u8, 1, 0xAA, 0xBB, 9]);
        let out = patch.apply_to(Some(file)).unwrap().unwrap();
        assert_eq!(out.contents, vec![0u8, 1, 0x01, 9]);
    }

    #[test]
    fn test_apply_rejects_stale_bytes() {
        let patch = Binary::new("blob", 0, vec![0xAA], Vec::new());
        let file = File::new("blob", vec![0u8, 0xAA]);
        assert!(patch.apply_to(Some(file)).is_err());
        let short = File::new("blob", Vec::<u8>::new());
        assert!(patch.apply_to(Some(short)).is_err());
    }

    #[test]
    fn test_apply_rejects_position_past_end() {
        let file = File::new("b", vec![0u8, 1]);
        let huge = Binary::new("b", usize::MAX, vec![0], Vec::new());
        let err = huge.apply_to(Some(file.clone())).unwrap_err();
        assert!(err.message.contains("past the end"), "{}", err.message);

        let insert_beyond = Binary::new("b", 3, Vec::new(), vec![7]);
        assert!(insert_beyond.apply_to(Some(file.clone())).is_err());
        let append = Binary::new("b", 2, Vec::new(), vec![7]);
        assert_eq!(append.apply_to(Some(file)).unwrap().unwrap().contents, vec![0u8, 1, 7]);
    }

    #[test]
    fn test_generate_reproduces_target() {
        let old: Vec<u8> = (0u8..=255).cycle().take(2000).collect();
        let mut new = old.clone();
        new[10] = 0;
        new.splice(500..520, vec![7u8; 3]);
        new.extend_from_slice(&[0xFF; 40]);

        let orig = File::new("b.bin", old);
        let changed = File::new("b.bin", new);
        let patches = Binary::generate(Some(&orig), Some(&changed));
        assert!(patches.len() >= 3);
        assert_eq!(apply_all(Some(orig), &patches), Some(changed));
    }

    #[test]
    fn test_generate_ignores_text() {
        let a = File::new("t", "abc");
        let b = File::new("t", "abd");
        assert!(Binary::generate(Some(&a), Some(&b)).is_empty());
    }

    #[test]
    fn test_text_wraps_hex_lines() {
        let patch = Binary::new("b", 7, vec![0x11; 40], vec![0xAB, 0xCD]);
        let text = patch.to_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "binary ./b 7");
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l.len() <= 78));
        assert_eq!(lines[3], "+abcd");
        assert_eq!(Binary::parse(&text).unwrap(), patch);
    }

    #[test]
    fn test_parse_rejects_bad_hex_and_order() {
        assert!(Binary::parse("binary ./b 0\n-zz").is_err());
        assert!(Binary::parse("binary ./b 0\n+00\n-00").is_err());
    }

    #[test]
    fn test_inverse_restores_bytes() {
        let file = File::new("b", vec![1u8, 2, 3]);
        let patch = Binary::new("b", 1, vec![2], vec![9, 9]);
        let patched = patch.apply_to(Some(file.clone())).unwrap();
        assert_eq!(patch.inverse().apply_to(patched).unwrap(), Some(file));
    }
}
