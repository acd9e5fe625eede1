use serde::{Deserialize, Serialize};

use super::{parse_path_block, AddFile, Primitive, PrimitivePatch};
use crate::error::{ApplyError, ParseError, ValidationError};
use crate::file::{escape_path, normalize_path, File};

/// Deletes a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RmFile {
    path: String,
}

impl RmFile {
    pub fn new(path: &str) -> Self {
        Self {
            path: normalize_path(path),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Primitive for RmFile {
    const TOKEN: &'static str = "rmfile";
    // Last, so hunks have already recorded what the file held.
    const PRIORITY: u32 = 90;

    fn apply_to(&self, file: Option<File>) -> Result<Option<File>, ApplyError> {
        match file {
            Some(file) if file.path == self.path => Ok(None),
            other => Ok(other),
        }
    }

    fn inverse(&self) -> PrimitivePatch {
        AddFile::new(&self.path).into()
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
            (Some(orig), None) => vec![Self::new(&orig.path)],
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
