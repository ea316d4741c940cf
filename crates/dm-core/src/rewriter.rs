//! Content rewriter producing the merged script
//!
//! Re-walks each mod's original text with the same context machine the
//! parser uses, substituting ids per the computed mapping. Metadata lines
//! are stripped (the merge gets one synthesized header), remapped ids get a
//! human-readable comment, and spell `#damage` lines are retracted and
//! rewritten when their meaning only becomes clear once `#effect` shows up
//! later in the block.

use crate::allocator::IdMapping;
use crate::classify::{self, Arg, ClassifyCtx, LineKind};
use crate::entity::{self, EntityType, TYPE_COUNT};
use crate::error::{Error, Result};
use crate::merge::MergeOptions;
use crate::model::{ModDefinition, NameTarget};
use chrono::{DateTime, Utc};

/// Line-level failures carry a bare message until [`rewrite_mod`] wraps them
/// with mod/line context
type LineResult<T = ()> = std::result::Result<T, String>;

const COMMENT_TAG: &str = "-- dm-merge:";

/// Corrections for strings the base game itself ships broken; applied to
/// every emitted source line
const VANILLA_FIXUPS: &[(&str, &str)] = &[
    ("Smokeing Mirror", "Smoking Mirror"),
    ("Wight Centorion", "Wight Centurion"),
    ("Adventureres", "Adventurers"),
];

/// Synthesized header replacing the stripped per-mod metadata
pub fn write_header(
    out: &mut Vec<String>,
    merged_name: &str,
    options: &MergeOptions,
    titles: &[&str],
    generated: DateTime<Utc>,
) {
    let list = titles.join(", ");
    let stamp = generated.format("%Y-%m-%d %H:%M UTC");
    out.push("-- =====================================================".to_string());
    out.push(format!("-- {merged_name}"));
    out.push(format!("-- Merged from: {list}"));
    out.push(format!("-- Generated: {stamp} by dm-merge"));
    out.push("-- =====================================================".to_string());
    out.push(format!("#modname \"{merged_name}\""));
    let description = options.description.clone().unwrap_or_else(|| {
        format!("Combined mod containing: {list}. Generated by dm-merge on {stamp}.")
    });
    out.push(format!("#description \"{description}\""));
    if let Some(icon) = &options.icon {
        out.push(format!("#icon \"{icon}\""));
    }
    if let Some(version) = &options.version {
        out.push(format!("#version {version}"));
    }
    out.push(String::new());
}

/// Rewrite one mod's script into `out`, substituting ids per `mapping`
pub fn rewrite_mod(
    def: &ModDefinition,
    text: &str,
    mapping: &IdMapping,
    out: &mut Vec<String>,
) -> Result<()> {
    let mut st = RewriteState::new();
    for (idx, raw) in text.lines().enumerate() {
        step(def, mapping, &mut st, raw, out).map_err(|message| Error::Parse {
            mod_name: def.name().to_string(),
            line: idx + 1,
            text: raw.trim().to_string(),
            message,
        })?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum BlockState {
    #[default]
    Idle,
    Plain,
    Spell,
}

#[derive(Debug, Clone)]
struct PendingDamage {
    value: i64,
    index: usize,
    raw: String,
}

#[derive(Debug, Default)]
struct SpellState {
    effect: Option<i64>,
    damage: Option<PendingDamage>,
}

struct RewriteState {
    block: BlockState,
    in_description: bool,
    skip_description: bool,
    spell: SpellState,
    implicit_next: Vec<u32>,
}

impl RewriteState {
    fn new() -> Self {
        Self {
            block: BlockState::Idle,
            in_description: false,
            skip_description: false,
            spell: SpellState::default(),
            implicit_next: vec![0; TYPE_COUNT],
        }
    }

    fn classify_ctx(&self) -> ClassifyCtx {
        ClassifyCtx {
            in_spell_block: self.block == BlockState::Spell,
        }
    }

    fn close_spell(&mut self) {
        self.spell = SpellState::default();
    }
}

fn step(
    def: &ModDefinition,
    mapping: &IdMapping,
    st: &mut RewriteState,
    raw: &str,
    out: &mut Vec<String>,
) -> LineResult {
    // multiline metadata description: dropped along with its opener
    if st.skip_description {
        if raw.contains('"') {
            st.skip_description = false;
        }
        return Ok(());
    }
    // multiline block description: emitted verbatim, never substituted
    if st.in_description {
        out.push(fixup(raw));
        if raw.contains('"') {
            st.in_description = false;
        }
        return Ok(());
    }

    let line = classify::strip_comment(raw).trim();
    if line.is_empty() {
        out.push(fixup(raw));
        return Ok(());
    }

    let kind = classify::classify(line, &st.classify_ctx())?;
    let unterminated = classify::has_unterminated_quote(line);

    match kind {
        LineKind::Metadata(_, _) => {
            st.skip_description = unterminated;
            return Ok(());
        }

        LineKind::BlockStart(op, arg) => {
            st.close_spell();
            match op.target {
                None => out.push(fixup(raw)),
                Some((entity, _role)) => match arg {
                    Arg::Id(n) => match checked_id(n).and_then(|id| {
                        mapping.lookup(entity, id).map(|new| (id, new))
                    }) {
                        Some((id, new)) => {
                            out.push(remap_comment(entity, id, new));
                            out.push(format!("{} {}", op.keyword, new));
                        }
                        None => out.push(fixup(raw)),
                    },
                    Arg::Name(name) => match resolve_name(def, mapping, entity, &name) {
                        Some(id) => {
                            out.push(resolve_comment(&name, id));
                            out.push(format!("{} {}", op.keyword, id));
                        }
                        None => out.push(fixup(raw)),
                    },
                    Arg::None => {
                        let ti = entity.index();
                        let index = st.implicit_next[ti];
                        st.implicit_next[ti] += 1;
                        match mapping.implicit_id(entity, index) {
                            Some(id) => {
                                out.push(assigned_comment(entity, id));
                                out.push(format!("{} {}", op.keyword, id));
                            }
                            None => out.push(fixup(raw)),
                        }
                    }
                },
            }
            st.block = if op.spell {
                BlockState::Spell
            } else {
                BlockState::Plain
            };
        }

        LineKind::BlockEnd => {
            // metadata stripping can leave terminators with nothing to close
            if st.block == BlockState::Idle {
                return Ok(());
            }
            st.close_spell();
            st.block = BlockState::Idle;
            out.push(fixup(raw));
        }

        LineKind::NameBinding(_) => out.push(fixup(raw)),

        LineKind::SpellEffect(v) => {
            st.spell.effect = Some(v);
            out.push(fixup(raw));
            // a damage line emitted earlier in this block may need retracting
            if let Some(pending) = st.spell.damage.clone() {
                apply_damage(out, mapping, v, &pending);
            }
        }

        LineKind::SpellDamage(v) => {
            out.push(fixup(raw));
            let pending = PendingDamage {
                value: v,
                index: out.len() - 1,
                raw: raw.to_string(),
            };
            if let Some(effect) = st.spell.effect {
                apply_damage(out, mapping, effect, &pending);
            }
            st.spell.damage = Some(pending);
        }

        LineKind::SpellCopy(arg) => {
            rewrite_reference(def, mapping, EntityType::Spell, "#copyspell", arg, raw, out);
        }

        LineKind::Reference(d, arg) => {
            rewrite_reference(def, mapping, d.entity, d.keyword, arg, raw, out);
        }

        LineKind::Passthrough => out.push(fixup(raw)),
    }

    if unterminated {
        st.in_description = true;
    }
    Ok(())
}

/// Rewrite the damage line at `pending.index` once the effect is known
///
/// Regenerates from the original line, so a repeated `#effect` simply
/// recomputes instead of stacking substitutions.
fn apply_damage(out: &mut Vec<String>, mapping: &IdMapping, effect: i64, pending: &PendingDamage) {
    let target = entity::spell_damage_target(effect, pending.value);
    let replacement = match target {
        Some((entity, id)) => mapping.lookup(entity, id).map(|new| (entity, id, new)),
        None => None,
    };
    match replacement {
        Some((entity, id, new)) => {
            let sign = if pending.value < 0 { "-" } else { "" };
            out[pending.index] = format!(
                "{}\n#damage {}{}",
                remap_comment(entity, id, new),
                sign,
                new
            );
        }
        None => out[pending.index] = fixup(&pending.raw),
    }
}

fn rewrite_reference(
    def: &ModDefinition,
    mapping: &IdMapping,
    entity: EntityType,
    keyword: &str,
    arg: Arg,
    raw: &str,
    out: &mut Vec<String>,
) {
    match arg {
        Arg::Id(n) => match checked_id(n).and_then(|id| {
            mapping.lookup(entity, id).map(|new| (id, new))
        }) {
            Some((id, new)) => {
                let sign = if n < 0 { "-" } else { "" };
                out.push(remap_comment(entity, id, new));
                out.push(format!("{keyword} {sign}{new}"));
            }
            None => out.push(fixup(raw)),
        },
        Arg::Name(name) => match resolve_name(def, mapping, entity, &name) {
            Some(id) => {
                out.push(resolve_comment(&name, id));
                out.push(format!("{keyword} {id}"));
            }
            None => out.push(fixup(raw)),
        },
        Arg::None => out.push(fixup(raw)),
    }
}

/// Concrete id for a name reference, only when substitution is required:
/// names bound to implicit definitions or to remapped explicit ids. Anything
/// else (vanilla names, unmoved mod content) keeps working as written.
fn resolve_name(
    def: &ModDefinition,
    mapping: &IdMapping,
    entity: EntityType,
    name: &str,
) -> Option<u32> {
    match def.def(entity).name_target(name)? {
        NameTarget::Implicit(index) => mapping.implicit_id(entity, index),
        NameTarget::Explicit(id) => mapping.lookup(entity, id),
    }
}

fn checked_id(n: i64) -> Option<u32> {
    u32::try_from(n.unsigned_abs()).ok()
}

fn remap_comment(entity: EntityType, from: u32, to: u32) -> String {
    format!("{COMMENT_TAG} remapped {entity} {from} -> {to}")
}

fn assigned_comment(entity: EntityType, id: u32) -> String {
    format!("{COMMENT_TAG} assigned {entity} id {id}")
}

fn resolve_comment(name: &str, id: u32) -> String {
    format!("{COMMENT_TAG} resolved \"{name}\" to id {id}")
}

fn fixup(line: &str) -> String {
    let mut fixed = line.to_string();
    for (broken, corrected) in VANILLA_FIXUPS {
        if fixed.contains(broken) {
            fixed = fixed.replace(broken, corrected);
        }
    }
    fixed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::allocate;
    use crate::parser::parse_mod;

    /// Parse and allocate two mods, rewrite the named one, return its lines
    fn rewrite_second(mods: &[(&str, &str)], which: &str) -> Vec<String> {
        let mut defs: Vec<_> = mods
            .iter()
            .map(|(name, text)| parse_mod(name, text).unwrap())
            .collect();
        let allocation = allocate(&mut defs).unwrap();
        let def = defs.iter().find(|d| d.name() == which).unwrap();
        let text = mods.iter().find(|(n, _)| *n == which).unwrap().1;
        let mut out = Vec::new();
        rewrite_mod(def, text, &allocation.mappings[which], &mut out).unwrap();
        out
    }

    #[test]
    fn test_remapped_block_start_gets_comment() {
        let out = rewrite_second(
            &[
                ("alpha", "#newmonster 13500\n#end\n"),
                ("bravo", "#newmonster 13500\n#name \"Rival\"\n#end\n"),
            ],
            "bravo",
        );
        assert_eq!(out[0], "-- dm-merge: remapped Monster 13500 -> 13501");
        assert_eq!(out[1], "#newmonster 13501");
        assert_eq!(out[2], "#name \"Rival\"");
        assert_eq!(out[3], "#end");
    }

    #[test]
    fn test_unmapped_lines_pass_through() {
        let out = rewrite_second(
            &[
                ("alpha", "#newmonster 13500\n#end\n"),
                ("bravo", "#newmonster 15000\n#hp 30\n#end\n"),
            ],
            "bravo",
        );
        assert_eq!(out, vec!["#newmonster 15000", "#hp 30", "#end"]);
    }

    #[test]
    fn test_spell_damage_after_effect() {
        let out = rewrite_second(
            &[
                ("alpha", "#newmonster 300\n#end\n"),
                (
                    "bravo",
                    "#selectspell 150\n#effect 10010\n#damage 300\n#end\n",
                ),
            ],
            "bravo",
        );
        let text = out.join("\n");
        assert!(text.contains("-- dm-merge: remapped Monster 300 -> 13500"));
        assert!(text.contains("#damage 13500"));
        assert!(!text.contains("#damage 300"));
    }

    #[test]
    fn test_spell_damage_before_effect_is_retracted() {
        let out = rewrite_second(
            &[
                ("alpha", "#newmonster 300\n#end\n"),
                (
                    "bravo",
                    "#selectspell 150\n#damage 300\n#effect 10010\n#end\n",
                ),
            ],
            "bravo",
        );
        let text = out.join("\n");
        assert!(text.contains("-- dm-merge: remapped Monster 300 -> 13500"));
        assert!(text.contains("#damage 13500"));
        assert!(!text.contains("#damage 300"));
        // the damage line stays in its original position, before #effect
        let damage_at = text.find("#damage").unwrap();
        let effect_at = text.find("#effect").unwrap();
        assert!(damage_at < effect_at);
    }

    #[test]
    fn test_montag_damage_keeps_sign() {
        let out = rewrite_second(
            &[
                ("alpha", "#newmonster 13500\n#montag 1000\n#end\n"),
                (
                    "bravo",
                    "#newmonster 13600\n#montag 1000\n#end\n#newspell\n#effect 10\n#damage -1000\n#end\n",
                ),
            ],
            "bravo",
        );
        let text = out.join("\n");
        assert!(text.contains("-- dm-merge: remapped Montag 1000 -> 10000"));
        assert!(text.contains("#montag 10000"));
        assert!(text.contains("#damage -10000"));
    }

    #[test]
    fn test_metadata_stripped_and_stray_end_dropped() {
        let out = rewrite_second(
            &[
                ("alpha", "#newmonster 13500\n#end\n"),
                (
                    "bravo",
                    "#modname \"Bravo Mod\"\n#description \"A mod whose text\nspans two lines.\"\n#end\n#newmonster 15000\n#end\n",
                ),
            ],
            "bravo",
        );
        let text = out.join("\n");
        assert!(!text.contains("#modname"));
        assert!(!text.contains("spans two lines"));
        // the stray #end after the stripped metadata is collapsed
        assert_eq!(text.matches("#end").count(), 1);
    }

    #[test]
    fn test_implicit_definition_and_name_resolution() {
        let out = rewrite_second(
            &[
                ("alpha", "#newmonster 13500\n#end\n"),
                (
                    "bravo",
                    "#newmonster\n#name \"Custom Troll\"\n#end\n#selectmonster \"Custom Troll\"\n#gcost 5\n#end\n",
                ),
            ],
            "bravo",
        );
        let text = out.join("\n");
        // the implicit block start now carries its allocated id
        assert!(text.contains("-- dm-merge: assigned Monster id 13501"));
        assert!(text.contains("#newmonster 13501"));
        // the later name select resolves to the same id
        assert!(text.contains("-- dm-merge: resolved \"Custom Troll\" to id 13501"));
        assert!(text.contains("#selectmonster 13501"));
    }

    #[test]
    fn test_usage_reference_remapped() {
        let out = rewrite_second(
            &[
                ("alpha", "#newmonster 13500\n#end\n"),
                (
                    "bravo",
                    "#newmonster 13500\n#end\n#newmonster 15000\n#firstshape 13500\n#end\n",
                ),
            ],
            "bravo",
        );
        let text = out.join("\n");
        assert!(text.contains("#newmonster 13501"));
        assert!(text.contains("#firstshape 13501"));
        assert!(!text.contains("#firstshape 13500"));
    }

    #[test]
    fn test_event_code_substitution_keeps_sign() {
        let out = rewrite_second(
            &[
                ("alpha", "#newevent\n#code -5000\n#end\n"),
                ("bravo", "#newevent\n#code -5000\n#req_code -5000\n#end\n"),
            ],
            "bravo",
        );
        let text = out.join("\n");
        assert!(text.contains("-- dm-merge: remapped EventCode 5000 -> 5001"));
        assert!(text.contains("#code -5001"));
        assert!(text.contains("#req_code -5001"));
        assert!(!text.contains("-5000"));
    }

    #[test]
    fn test_foreign_references_are_not_touched() {
        // bravo references an id it never defined; the mapping is scoped per
        // mod, so the reference stays as written
        let out = rewrite_second(
            &[
                ("alpha", "#newmonster 13500\n#end\n"),
                ("bravo", "#newmonster 15000\n#firstshape 13500\n#end\n"),
            ],
            "bravo",
        );
        let text = out.join("\n");
        assert!(text.contains("#firstshape 13500"));
    }

    #[test]
    fn test_vanilla_fixups_applied() {
        let out = rewrite_second(
            &[
                ("alpha", "#newmonster 13500\n#end\n"),
                ("bravo", "#selectmonster \"Smokeing Mirror\"\n#gcost 5\n#end\n"),
            ],
            "bravo",
        );
        assert_eq!(out[0], "#selectmonster \"Smoking Mirror\"");
    }

    #[test]
    fn test_block_description_emitted_verbatim() {
        let out = rewrite_second(
            &[
                ("alpha", "#newmonster 13500\n#end\n"),
                (
                    "bravo",
                    "#newmonster 15000\n#descr \"A beast that mentions\n#newmonster 13500 in passing.\"\n#end\n",
                ),
            ],
            "bravo",
        );
        let text = out.join("\n");
        assert!(text.contains("#newmonster 13500 in passing."));
    }
}
