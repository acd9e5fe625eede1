use serde::{Deserialize, Serialize};

use super::{parse_path_block, Primitive, PrimitivePatch};
use crate::error::{ApplyError, ParseError, ValidationError};
use crate::file::{escape_path, normalize_path, File};

/// Renames a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    original_path: String,
    new_path: String,
}

impl Move {
    pub fn new(original_path: &str, new_path: &str) -> Self {
        Self {
            original_path: normalize_path(original_path),
            new_path: normalize_path(new_path),
        }
    }

    pub fn original_path(&self) -> &str {
        &self.original_path
    }

    pub fn new_path(&self) -> &str {
        &self.new_path
    }
}

impl Primitive for Move {
    const TOKEN: &'static str = "move";
    const PRIORITY: u32 = 50;

    fn apply_to(&self, file: Option<File>) -> Result<Option<File>, ApplyError> {
        Ok(file.map(|mut file| {
            if file.path == self.original_path {
                file.path = self.new_path.clone();
            }
            file
        }))
    }

    fn inverse(&self) -> PrimitivePatch {
        Move::new(&self.new_path, &self.original_path).into()
    }

    fn to_text(&self) -> String {
        format!(
            "{} {} {}",
            Self::TOKEN,
            escape_path(&self.original_path),
            escape_path(&self.new_path)
        )
    }

    fn parse(text: &str) -> Result<Self, ParseError> {
        let paths = parse_path_block(text, Self::TOKEN, 2)?;
        Ok(Self::new(&paths[0], &paths[1]))
    }

    fn generate(orig: Option<&File>, changed: Option<&File>) -> Vec<Self> {
        match (orig, changed) {
            (Some(orig), Some(changed)) if orig.path != changed.path => {
                vec![Self::new(&orig.path, &changed.path)]
            }
            _ => Vec::new(),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.original_path.is_empty() || self.new_path.is_empty() {
            return Err(ValidationError::EmptyPath);
        }
        if self.original_path == self.new_path {
            return Err(ValidationError::MoveOntoSelf(self.new_path.clone()));
        }
        Ok(())
    }
}
