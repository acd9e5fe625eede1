//! Patch theory in the style of darcs.
//!
//! Changes between file versions are algebraic values: generated from a
//! diff, grouped into named [`Patch`]es, inverted, commuted and merged.
//! The engine works on in-memory [`File`] snapshots; [`store`] connects it
//! to something that holds files, and [`create`] / [`apply`] drive it over
//! directory trees.

pub mod apply;
pub mod commute;
pub mod create;
pub mod error;
pub mod file;
pub mod lcs;
pub mod patch;
pub mod patch_format;
pub mod primitive;
pub mod store;
pub mod util;

pub use commute::{commute_sequences, invert_sequence, merge_sequences};
pub use error::{
    ApplyError, CommuteConflict, Error, GenerationError, ParseError, StoreError, ValidationError,
};
pub use file::File;
pub use patch::{generate_primitives, Patch, PatchInfo};
pub use primitive::{AddFile, Binary, Hunk, Move, Primitive, PrimitivePatch, RmFile};
pub use store::{DirStore, FileStore, MemoryStore};
