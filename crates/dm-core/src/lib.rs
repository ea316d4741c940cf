//! dm-core: Core library for merging `.dm` mod scripts
//!
//! This library provides functionality to:
//! - Scan directories for `.dm` mod scripts
//! - Parse each mod's script into an entity definition model
//! - Detect cross-mod id collisions and compute deterministic remappings
//! - Rewrite each mod's content with remapped ids and merge annotations
//! - Assemble one combined mod with a synthesized header

pub mod allocator;
pub mod classify;
pub mod entity;
pub mod error;
pub mod merge;
pub mod model;
pub mod parser;
pub mod rewriter;
pub mod scanner;

pub use allocator::{allocate, Allocation, AllocationSession, ConflictKind, ConflictRecord, IdMapping};
pub use entity::{DirectiveRole, EntityType, IdRange};
pub use error::{Error, Result};
pub use merge::{
    merge, merge_at, AssignedRecord, MappingRecord, MergeOptions, MergeOutput, MergeReport,
    ModSource,
};
pub use model::{EntityDefinition, IdRun, ModDefinition, NameTarget};
pub use parser::parse_mod;
pub use scanner::{load_sources, scan_mods, ModFile, ScanResult};
