//! Merge orchestration: parse every mod, allocate once, rewrite everything
//!
//! The pipeline is strictly phase-ordered. All parsing completes before
//! allocation (collision detection needs every mod's full definition set),
//! allocation completes before rewriting (the rewriter needs the final
//! mapping), and the merged text is assembled entirely in memory so output
//! is all-or-nothing.

use crate::allocator::{self, ConflictKind, ConflictRecord, IdMapping};
use crate::entity::EntityType;
use crate::error::{Error, Result};
use crate::model::ModDefinition;
use crate::parser;
use crate::rewriter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One mod's script text plus its stable name
///
/// Loading and discovery are the caller's concern; the merge core only sees
/// already-decoded text.
#[derive(Debug, Clone)]
pub struct ModSource {
    pub name: String,
    pub text: String,
}

impl ModSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Knobs for the synthesized header
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Merged mod name; derived from the source titles when absent
    pub name: Option<String>,
    /// Header description override
    pub description: Option<String>,
    pub icon: Option<String>,
    pub version: Option<String>,
}

/// One explicit-id remap, for the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRecord {
    pub mod_name: String,
    pub entity: EntityType,
    pub from: u32,
    pub to: u32,
}

/// One implicit-definition assignment, for the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedRecord {
    pub mod_name: String,
    pub entity: EntityType,
    pub index: u32,
    pub id: u32,
}

/// Everything a front end needs to show about a completed merge
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub merged_name: String,
    pub generated: DateTime<Utc>,
    pub mods: Vec<String>,
    pub remaps: Vec<MappingRecord>,
    pub assigned: Vec<AssignedRecord>,
    pub conflicts: Vec<ConflictRecord>,
    /// Vanilla-overlap summaries plus any collaborator-supplied warnings
    pub warnings: Vec<String>,
}

/// A successful merge: the full script plus its report
#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub text: String,
    pub report: MergeReport,
}

/// Merge a set of mod sources into one script
pub fn merge(sources: Vec<ModSource>, options: &MergeOptions) -> Result<MergeOutput> {
    merge_at(sources, options, Utc::now())
}

/// Merge with an explicit timestamp (useful for testing)
pub fn merge_at(
    mut sources: Vec<ModSource>,
    options: &MergeOptions,
    generated: DateTime<Utc>,
) -> Result<MergeOutput> {
    if sources.is_empty() {
        return Err(Error::NoSources);
    }

    sources.sort_by(|a, b| a.name.cmp(&b.name));

    let mut defs: Vec<ModDefinition> = Vec::with_capacity(sources.len());
    for source in &sources {
        defs.push(parser::parse_mod(&source.name, &source.text)?);
    }

    // sources are already name-sorted, so allocation keeps this order
    let allocation = allocator::allocate(&mut defs)?;

    let titles: Vec<&str> = defs.iter().map(|d| d.title()).collect();
    let merged_name = options
        .name
        .clone()
        .unwrap_or_else(|| format!("Merged: {}", titles.join(" + ")));

    let mut lines: Vec<String> = Vec::new();
    rewriter::write_header(&mut lines, &merged_name, options, &titles, generated);

    let empty = IdMapping::default();
    for (def, source) in defs.iter().zip(&sources) {
        let mapping = allocation.mappings.get(source.name.as_str()).unwrap_or(&empty);
        lines.push(format!("-- begin content from mod \"{}\"", source.name));
        rewriter::rewrite_mod(def, &source.text, mapping, &mut lines)?;
        lines.push(format!("-- end content from mod \"{}\"", source.name));
        lines.push(String::new());
    }

    let text = lines.join("\n");
    let report = build_report(merged_name, generated, &defs, &allocation);

    Ok(MergeOutput { text, report })
}

fn build_report(
    merged_name: String,
    generated: DateTime<Utc>,
    defs: &[ModDefinition],
    allocation: &allocator::Allocation,
) -> MergeReport {
    let mut remaps = Vec::new();
    let mut assigned = Vec::new();
    for def in defs {
        if let Some(mapping) = allocation.mappings.get(def.name()) {
            for (entity, from, to) in mapping.iter_remaps() {
                remaps.push(MappingRecord {
                    mod_name: def.name().to_string(),
                    entity,
                    from,
                    to,
                });
            }
            for (entity, index, id) in mapping.iter_implicit() {
                assigned.push(AssignedRecord {
                    mod_name: def.name().to_string(),
                    entity,
                    index,
                    id,
                });
            }
        }
    }

    let warnings = allocation
        .conflicts
        .iter()
        .filter(|c| c.kind == ConflictKind::VanillaOverlap)
        .map(|c| {
            format!(
                "mods {} all edit vanilla {} {}",
                c.mods.join(", "),
                c.entity,
                c.id
            )
        })
        .collect();

    MergeReport {
        merged_name,
        generated,
        mods: defs.iter().map(|d| d.name().to_string()).collect(),
        remaps,
        assigned,
        conflicts: allocation.conflicts.clone(),
        warnings,
    }
}
