use serde::{Deserialize, Serialize};

use super::{parse_path_block, Primitive, PrimitivePatch, RmFile};
use crate::error::{ApplyError, ParseError, ValidationError};
use crate::file::{escape_path, normalize_path, File};

/// Creates an empty file. Contents arrive through a following hunk or
/// binary patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddFile {
    path: String,
}

impl AddFile {
    pub fn new(path: &str) -> Self {
        Self {
            path: normalize_path(path),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Primitive for AddFile {
    const TOKEN: &'static str = "addfile";
    // Runs before anything that writes into the new file.
    const PRIORITY: u32 = 10;

    fn apply_to(&self, file: Option<File>) -> Result<Option<File>, ApplyError> {
        match file {
            Some(existing) => Ok(Some(existing)),
            None => Ok(Some(File::new(&self.path, Vec::new()))),
        }
    }

    fn inverse(&self) -> PrimitivePatch {
        RmFile::new(&self.path).into()
    }

    fn to_text(&self) -> String {
        format!("{} {}", Self::TOKEN, escape_path(&self.path))
    }

    fn parse(text: &str) -> Result<Self, ParseError> {
        let paths = parse_path_block(text, Self::TOKEN, 1)?;
        Ok(Self::new(&paths[0]))
    }

    fn generate(orig: Option<&File>, changed: Option<&File>) -> Vec<Self> {
        match (orig, changed) {
            (None, Some(changed)) => vec![Self::new(&changed.path)],
            _ => Vec::new(),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.path.is_empty() {
            return Err(ValidationError::EmptyPath);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_creates_empty_file() {
        let patch = AddFile::new("notes.txt");
        let file = patch.apply_to(None).unwrap().unwrap();
        assert_eq!(file.path, "./notes.txt");
        assert!(file.contents.is_empty());
    }

    #[test]
    fn test_apply_to_existing_is_identity() {
        let existing = File::new("other.txt", "keep");
        let out = AddFile::new("notes.txt").apply_to(Some(existing.clone())).unwrap();
        assert_eq!(out, Some(existing));
    }

    #[test]
    fn test_inverse_is_rmfile() {
        let inverse = AddFile::new("a").inverse();
        assert_eq!(inverse, PrimitivePatch::RmFile(RmFile::new("./a")));
    }

    #[test]
    fn test_text_form() {
        let patch = AddFile::new("my file");
        assert_eq!(patch.to_text(), "addfile ./my\\32\\file");
        assert_eq!(AddFile::parse(&patch.to_text()).unwrap(), patch);
        assert!(AddFile::parse("addfile").is_err());
        assert!(AddFile::parse("rmfile ./a").is_err());
    }

    #[test]
    fn test_generate_only_on_creation() {
        let file = File::new("a", "x");
        assert_eq!(AddFile::generate(None, Some(&file)), vec![AddFile::new("a")]);
        assert!(AddFile::generate(Some(&file), Some(&file)).is_empty());
        assert!(AddFile::generate(Some(&file), None).is_empty());
    }
}
