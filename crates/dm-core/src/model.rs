//! Per-mod entity definition model
//!
//! One [`ModDefinition`] per source mod, holding one [`EntityDefinition`] per
//! entity category. The parser fills these incrementally; the allocator
//! freezes them before computing mappings.

use crate::entity::{EntityType, TYPE_COUNT};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};

/// What a bound name points at: an authored id or an implicit slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameTarget {
    /// Explicitly numbered definition (vanilla or modding range)
    Explicit(u32),
    /// Unnumbered definition, identified by its sequential index
    Implicit(u32),
}

/// A maximal run of consecutive explicitly defined ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRun {
    pub start: u32,
    pub len: u32,
}

impl IdRun {
    pub fn end(self) -> u32 {
        self.start + self.len - 1
    }

    pub fn ids(self) -> impl Iterator<Item = u32> {
        self.start..self.start + self.len
    }
}

/// Everything one mod declares about one entity category
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    entity: EntityType,
    defined: BTreeSet<u32>,
    vanilla_edits: BTreeSet<u32>,
    implicit_count: u32,
    names: BTreeMap<String, NameTarget>,
    runs: Vec<IdRun>,
    frozen: bool,
}

impl EntityDefinition {
    pub fn new(entity: EntityType) -> Self {
        Self {
            entity,
            defined: BTreeSet::new(),
            vanilla_edits: BTreeSet::new(),
            implicit_count: 0,
            names: BTreeMap::new(),
            runs: Vec::new(),
            frozen: false,
        }
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    fn check_mutable(&self) -> Result<()> {
        if self.frozen {
            Err(Error::FrozenDefinition(self.entity))
        } else {
            Ok(())
        }
    }

    /// Record an explicitly numbered new definition (modding range)
    pub fn add_defined(&mut self, id: u32) -> Result<()> {
        self.check_mutable()?;
        debug_assert!(self.entity.range().is_modding(id));
        self.defined.insert(id);
        Ok(())
    }

    /// Record an edit of built-in content (vanilla range)
    pub fn add_vanilla_edit(&mut self, id: u32) -> Result<()> {
        self.check_mutable()?;
        debug_assert!(self.entity.range().is_vanilla(id));
        self.vanilla_edits.insert(id);
        Ok(())
    }

    /// Register an unnumbered definition, returning its sequential index
    pub fn add_implicit(&mut self) -> Result<u32> {
        self.check_mutable()?;
        let index = self.implicit_count;
        self.implicit_count += 1;
        Ok(index)
    }

    /// Bind a display name to a definition; a later binding wins
    pub fn bind_name(&mut self, name: impl Into<String>, target: NameTarget) -> Result<()> {
        self.check_mutable()?;
        self.names.insert(name.into(), target);
        Ok(())
    }

    pub fn defined(&self) -> &BTreeSet<u32> {
        &self.defined
    }

    pub fn vanilla_edits(&self) -> &BTreeSet<u32> {
        &self.vanilla_edits
    }

    pub fn implicit_count(&self) -> u32 {
        self.implicit_count
    }

    pub fn name_target(&self, name: &str) -> Option<NameTarget> {
        self.names.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.defined.is_empty() && self.vanilla_edits.is_empty() && self.implicit_count == 0
    }

    /// Freeze the definition and cache the contiguous-run view
    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        self.runs = compute_runs(&self.defined);
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Maximal contiguous runs of defined ids, ascending; empty until frozen
    pub fn runs(&self) -> &[IdRun] {
        &self.runs
    }
}

fn compute_runs(defined: &BTreeSet<u32>) -> Vec<IdRun> {
    let mut runs = Vec::new();
    let mut iter = defined.iter().copied();
    if let Some(first) = iter.next() {
        let mut start = first;
        let mut len = 1u32;
        for id in iter {
            if id == start + len {
                len += 1;
            } else {
                runs.push(IdRun { start, len });
                start = id;
                len = 1;
            }
        }
        runs.push(IdRun { start, len });
    }
    runs
}

/// All entity definitions for one source mod
#[derive(Debug, Clone)]
pub struct ModDefinition {
    name: String,
    display_name: Option<String>,
    defs: Vec<EntityDefinition>,
}

impl ModDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            defs: EntityType::ALL.iter().map(|&t| EntityDefinition::new(t)).collect(),
        }
    }

    /// Stable source name, used for deterministic ordering
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name from `#modname`, if the mod declared one
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = Some(name.into());
    }

    /// Display name if present, stable name otherwise
    pub fn title(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn def(&self, entity: EntityType) -> &EntityDefinition {
        &self.defs[entity.index()]
    }

    pub fn def_mut(&mut self, entity: EntityType) -> &mut EntityDefinition {
        &mut self.defs[entity.index()]
    }

    /// Freeze every per-type definition
    pub fn freeze(&mut self) {
        debug_assert_eq!(self.defs.len(), TYPE_COUNT);
        for def in &mut self.defs {
            def.freeze();
        }
    }
}
