//! Conflict detection and deterministic id allocation
//!
//! Given every mod's definition model, computes per-mod remapping tables
//! under first-come-first-served rules. All state lives in an
//! [`AllocationSession`] constructed fresh per merge call, so repeated runs
//! on the same input are byte-identical.
//!
//! Processing order is fixed: mods by stable name ascending, entity types in
//! declaration order, explicit ids ascending. Contiguous runs of authored
//! ids move as a unit: if any member collides, the whole run is remapped to
//! a fresh contiguous block so relative offsets survive.

use crate::entity::{EntityType, TYPE_COUNT};
use crate::error::{Error, Result};
use crate::model::ModDefinition;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-mod id remapping table
///
/// Absence of an entry means "keep the original value"; the rewriter depends
/// on that convention.
#[derive(Debug, Clone, Default)]
pub struct IdMapping {
    remapped: BTreeMap<(EntityType, u32), u32>,
    implicit: BTreeMap<(EntityType, u32), u32>,
}

impl IdMapping {
    /// Replacement for an explicitly authored id, if one was assigned
    pub fn lookup(&self, entity: EntityType, id: u32) -> Option<u32> {
        self.remapped.get(&(entity, id)).copied()
    }

    /// Id reserved for the nth unnumbered definition of this type
    pub fn implicit_id(&self, entity: EntityType, index: u32) -> Option<u32> {
        self.implicit.get(&(entity, index)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.remapped.is_empty() && self.implicit.is_empty()
    }

    pub fn remap_count(&self) -> usize {
        self.remapped.len()
    }

    /// All (entity, original, replacement) remap entries, ascending
    pub fn iter_remaps(&self) -> impl Iterator<Item = (EntityType, u32, u32)> + '_ {
        self.remapped.iter().map(|(&(t, from), &to)| (t, from, to))
    }

    /// All (entity, index, id) implicit assignments, ascending
    pub fn iter_implicit(&self) -> impl Iterator<Item = (EntityType, u32, u32)> + '_ {
        self.implicit.iter().map(|(&(t, ix), &id)| (t, ix, id))
    }

    fn insert_remap(&mut self, entity: EntityType, from: u32, to: u32) {
        self.remapped.insert((entity, from), to);
    }

    fn insert_implicit(&mut self, entity: EntityType, index: u32, id: u32) {
        self.implicit.insert((entity, index), id);
    }
}

/// Severity of a detected collision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two mods authored the same modding-range id; the later one was moved
    Remapped,
    /// Two mods edit the same vanilla id; never remapped, warning only
    VanillaOverlap,
}

/// One detected collision between mods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub entity: EntityType,
    pub id: u32,
    pub mods: Vec<String>,
    pub kind: ConflictKind,
}

/// Result of running allocation over every mod
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Mapping tables keyed by stable mod name
    pub mappings: BTreeMap<String, IdMapping>,
    /// Every detected collision, remapped and vanilla alike
    pub conflicts: Vec<ConflictRecord>,
}

/// Mutable allocator state for one merge invocation
pub struct AllocationSession {
    /// Ids actually claimed so far (kept, remap targets, implicit blocks)
    used: Vec<BTreeSet<u32>>,
    /// Every id any mod explicitly authored; never handed out as a
    /// replacement, since its first claimant keeps it
    authored: Vec<BTreeSet<u32>>,
    cursors: Vec<u32>,
}

impl AllocationSession {
    pub fn new() -> Self {
        Self {
            used: (0..TYPE_COUNT).map(|_| BTreeSet::new()).collect(),
            authored: (0..TYPE_COUNT).map(|_| BTreeSet::new()).collect(),
            cursors: EntityType::ALL
                .iter()
                .map(|t| t.range().preferred_start)
                .collect(),
        }
    }

    fn mark_authored(&mut self, entity: EntityType, id: u32) {
        self.authored[entity.index()].insert(id);
    }

    fn is_used(&self, entity: EntityType, id: u32) -> bool {
        self.used[entity.index()].contains(&id)
    }

    fn claim(&mut self, entity: EntityType, id: u32) {
        self.used[entity.index()].insert(id);
    }

    /// Allocate `len` consecutive free ids in the type's modding range
    ///
    /// Scans forward from the cursor (initially the preferred start),
    /// wrapping to the range's lower bound, skipping ids that are used or
    /// authored by any mod. Fails once a full wrap finds no fitting window.
    pub fn alloc_block(&mut self, entity: EntityType, len: u32) -> Result<u32> {
        let range = entity.range();
        let lo = range.modding_start();
        let hi = range.modding_end;
        let ti = entity.index();
        let total = range.modding_len();

        if len == 0 || len > total {
            return Err(self.exhausted(entity));
        }

        let mut cursor = self.cursors[ti];
        if cursor < lo || cursor > hi {
            cursor = lo;
        }

        'scan: for step in 0..total {
            let start = lo + (cursor - lo + step) % total;
            if start + len - 1 > hi {
                // block would run past the range end; wrap instead
                continue;
            }
            for id in start..start + len {
                if self.used[ti].contains(&id) || self.authored[ti].contains(&id) {
                    continue 'scan;
                }
            }
            self.used[ti].extend(start..start + len);
            self.cursors[ti] = if start + len > hi { lo } else { start + len };
            return Ok(start);
        }

        Err(self.exhausted(entity))
    }

    fn exhausted(&self, entity: EntityType) -> Error {
        let range = entity.range();
        Error::RangeExhausted {
            entity,
            start: range.modding_start(),
            end: range.modding_end,
            in_use: self.used[entity.index()].len(),
        }
    }
}

impl Default for AllocationSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Detect conflicts and compute remapping tables for every mod
///
/// Sorts and freezes the definitions, then runs the three allocation phases:
/// vanilla-claim collection, implicit reservation, explicit processing.
pub fn allocate(mods: &mut [ModDefinition]) -> Result<Allocation> {
    mods.sort_by(|a, b| a.name().cmp(b.name()));
    for m in mods.iter_mut() {
        m.freeze();
    }

    let mut session = AllocationSession::new();
    let mut conflicts = Vec::new();
    let mut mappings: Vec<IdMapping> = mods.iter().map(|_| IdMapping::default()).collect();

    // every explicitly authored id is off-limits as a replacement target
    for m in mods.iter() {
        for t in EntityType::ALL {
            for &id in m.def(t).defined() {
                session.mark_authored(t, id);
            }
        }
    }

    // vanilla edits are never remapped; overlapping edits become warnings
    let mut vanilla_claims: BTreeMap<(EntityType, u32), Vec<String>> = BTreeMap::new();
    for m in mods.iter() {
        for t in EntityType::ALL {
            for &id in m.def(t).vanilla_edits() {
                vanilla_claims
                    .entry((t, id))
                    .or_default()
                    .push(m.name().to_string());
            }
        }
    }
    for ((entity, id), claimants) in &vanilla_claims {
        if claimants.len() > 1 {
            conflicts.push(ConflictRecord {
                entity: *entity,
                id: *id,
                mods: claimants.clone(),
                kind: ConflictKind::VanillaOverlap,
            });
        }
    }

    // first claimant of each id, for conflict reporting
    let mut claimed_by: BTreeMap<(EntityType, u32), usize> = BTreeMap::new();

    // implicit definitions get fresh contiguous blocks before any explicit
    // processing, so they can never collide with authored content
    for (mi, m) in mods.iter().enumerate() {
        for t in EntityType::ALL {
            let count = m.def(t).implicit_count();
            if count == 0 {
                continue;
            }
            let start = session.alloc_block(t, count)?;
            for k in 0..count {
                mappings[mi].insert_implicit(t, k, start + k);
                claimed_by.insert((t, start + k), mi);
            }
        }
    }

    // explicit ids, run at a time: a collision anywhere in a run moves the
    // whole run to a fresh contiguous block
    for (mi, m) in mods.iter().enumerate() {
        for t in EntityType::ALL {
            for run in m.def(t).runs() {
                let collisions: Vec<u32> =
                    run.ids().filter(|&id| session.is_used(t, id)).collect();

                if collisions.is_empty() {
                    for id in run.ids() {
                        session.claim(t, id);
                        claimed_by.insert((t, id), mi);
                    }
                    continue;
                }

                let start = session.alloc_block(t, run.len)?;
                for (offset, id) in run.ids().enumerate() {
                    mappings[mi].insert_remap(t, id, start + offset as u32);
                }
                for &id in &collisions {
                    let mut involved = Vec::new();
                    if let Some(&owner) = claimed_by.get(&(t, id)) {
                        involved.push(mods[owner].name().to_string());
                    }
                    involved.push(m.name().to_string());
                    conflicts.push(ConflictRecord {
                        entity: t,
                        id,
                        mods: involved,
                        kind: ConflictKind::Remapped,
                    });
                }
                for id in start..start + run.len {
                    claimed_by.insert((t, id), mi);
                }
            }
        }
    }

    let mappings = mods
        .iter()
        .zip(mappings)
        .map(|(m, mapping)| (m.name().to_string(), mapping))
        .collect();

    Ok(Allocation {
        mappings,
        conflicts,
    })
}
