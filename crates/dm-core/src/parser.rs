//! Stateful parser turning one mod's script into a [`ModDefinition`]
//!
//! The parser walks the script line by line, feeding each line through the
//! classifier with the current context. Context is a small state machine:
//! idle, inside a plain block, or inside a spell block, with a multiline
//! description flag that suspends classification entirely until the closing
//! quote shows up.

use crate::classify::{self, Arg, ClassifyCtx, LineKind};
use crate::entity::{self, DirectiveRole, EntityType};
use crate::error::{Error, Result};
use crate::model::{ModDefinition, NameTarget};

/// Line-level failures carry a bare message until [`parse_mod`] wraps them
/// with mod/line context
type LineResult<T = ()> = std::result::Result<T, String>;

/// Parse a mod script into its definition model
///
/// Fails on the first malformed line with mod/line/text context; no partial
/// model is returned.
pub fn parse_mod(name: &str, text: &str) -> Result<ModDefinition> {
    let mut def = ModDefinition::new(name);
    let mut ctx = ParseContext::default();
    let mut last_line = 0;

    for (idx, raw) in text.lines().enumerate() {
        last_line = idx + 1;
        step(&mut def, &mut ctx, raw).map_err(|message| parse_error(name, idx + 1, raw, message))?;
    }

    // a mod ending inside a block still flushes its pending spell state
    close_block(&mut ctx, &mut def).map_err(|message| parse_error(name, last_line, "", message))?;

    Ok(def)
}

fn parse_error(mod_name: &str, line: usize, text: &str, message: String) -> Error {
    Error::Parse {
        mod_name: mod_name.to_string(),
        line,
        text: text.trim().to_string(),
        message,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum BlockState {
    #[default]
    Idle,
    Plain,
    Spell,
}

#[derive(Debug, Clone, Copy)]
struct ActiveEntity {
    entity: EntityType,
    target: NameTarget,
}

#[derive(Debug, Clone, Copy, Default)]
struct SpellAccum {
    effect: Option<i64>,
    damage: Option<i64>,
}

#[derive(Debug, Default)]
struct ParseContext {
    block: BlockState,
    in_description: bool,
    active: Option<ActiveEntity>,
    spell: SpellAccum,
}

impl ParseContext {
    fn classify_ctx(&self) -> ClassifyCtx {
        ClassifyCtx {
            in_spell_block: self.block == BlockState::Spell,
        }
    }
}

fn step(def: &mut ModDefinition, ctx: &mut ParseContext, raw: &str) -> LineResult {
    if ctx.in_description {
        if raw.contains('"') {
            ctx.in_description = false;
        }
        return Ok(());
    }

    let line = classify::strip_comment(raw).trim();
    if line.is_empty() {
        return Ok(());
    }

    let kind = classify::classify(line, &ctx.classify_ctx())?;

    match kind {
        LineKind::Metadata(entity::MetaKind::ModName, raw_arg) => {
            if let Some(name) = extract_quoted(&raw_arg) {
                def.set_display_name(name);
            }
        }
        LineKind::Metadata(_, _) => {}

        LineKind::BlockStart(op, arg) => {
            // a new block start while one is open closes the old block
            close_block(ctx, def)?;
            if let Some((entity, _role)) = op.target {
                match arg {
                    Arg::Id(n) => {
                        let id = id_from(entity, n)?;
                        register_id(def, entity, id)?;
                        ctx.active = Some(ActiveEntity {
                            entity,
                            target: NameTarget::Explicit(id),
                        });
                    }
                    // a quoted name with no id is resolved at rewrite time
                    Arg::Name(_) => {}
                    Arg::None => {
                        let index = def.def_mut(entity).add_implicit().map_err(stringify)?;
                        ctx.active = Some(ActiveEntity {
                            entity,
                            target: NameTarget::Implicit(index),
                        });
                    }
                }
            }
            ctx.block = if op.spell {
                BlockState::Spell
            } else {
                BlockState::Plain
            };
        }

        LineKind::BlockEnd => close_block(ctx, def)?,

        LineKind::NameBinding(name) => {
            if let Some(active) = ctx.active {
                def.def_mut(active.entity)
                    .bind_name(name, active.target)
                    .map_err(stringify)?;
            }
        }

        LineKind::SpellEffect(v) => {
            ctx.spell.effect = Some(v);
            resolve_spell(ctx, def)?;
        }
        LineKind::SpellDamage(v) => {
            ctx.spell.damage = Some(v);
            resolve_spell(ctx, def)?;
        }
        // the copied spell id is a usage reference; the rewriter remaps it
        LineKind::SpellCopy(_) => {}

        LineKind::Reference(d, arg) => match d.role {
            DirectiveRole::New | DirectiveRole::Select => match arg {
                Arg::Id(n) => {
                    let id = id_from(d.entity, n)?;
                    register_id(def, d.entity, id)?;
                }
                Arg::None => return Err(format!("{} requires an id", d.keyword)),
                Arg::Name(_) => return Err(format!("{} requires a numeric id", d.keyword)),
            },
            DirectiveRole::Usage => {}
        },

        LineKind::Passthrough => {}
    }

    if classify::has_unterminated_quote(line) {
        ctx.in_description = true;
    }

    Ok(())
}

/// Register a derived spell definition once both effect and damage are known
///
/// Fires on whichever of the two arrives second, and again if a later line in
/// the same block changes either value.
fn resolve_spell(ctx: &mut ParseContext, def: &mut ModDefinition) -> LineResult {
    if let (Some(effect), Some(damage)) = (ctx.spell.effect, ctx.spell.damage) {
        if let Some((entity, id)) = entity::spell_damage_target(effect, damage) {
            register_id(def, entity, id)?;
        }
    }
    Ok(())
}

fn close_block(ctx: &mut ParseContext, def: &mut ModDefinition) -> LineResult {
    if ctx.block == BlockState::Spell {
        resolve_spell(ctx, def)?;
    }
    ctx.block = BlockState::Idle;
    ctx.active = None;
    ctx.spell = SpellAccum::default();
    Ok(())
}

fn register_id(def: &mut ModDefinition, entity: EntityType, id: u32) -> LineResult {
    let range = entity.range();
    if range.is_vanilla(id) {
        def.def_mut(entity).add_vanilla_edit(id).map_err(stringify)
    } else if range.is_modding(id) {
        def.def_mut(entity).add_defined(id).map_err(stringify)
    } else {
        Err(format!(
            "{entity} id {id} is outside the valid range 0..={}",
            range.modding_end
        ))
    }
}

fn id_from(entity: EntityType, n: i64) -> LineResult<u32> {
    if n < 0 && entity != EntityType::EventCode {
        return Err(format!("negative id {n} is only valid for event codes"));
    }
    u32::try_from(n.unsigned_abs()).map_err(|_| format!("id {n} is out of range"))
}

fn stringify(e: Error) -> String {
    e.to_string()
}

fn extract_quoted(raw: &str) -> Option<&str> {
    let start = raw.find('"')? + 1;
    let rest = &raw[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_mod() {
        let text = "\
#modname \"Fiends of the Deep\"
#description \"Test mod.\"

#newmonster 13500
#name \"Deep Fiend\"
#hp 25
#end

#selectmonster 50
#gcost 12
#end
";
        let m = parse_mod("fiends", text).unwrap();
        assert_eq!(m.display_name(), Some("Fiends of the Deep"));

        let monsters = m.def(EntityType::Monster);
        assert!(monsters.defined().contains(&13500));
        assert!(monsters.vanilla_edits().contains(&50));
        assert_eq!(
            monsters.name_target("Deep Fiend"),
            Some(NameTarget::Explicit(13500))
        );
    }

    #[test]
    fn test_implicit_definition_with_name() {
        let text = "\
#newmonster
#name \"Custom Troll\"
#hp 40
#end
";
        let m = parse_mod("trolls", text).unwrap();
        let monsters = m.def(EntityType::Monster);
        assert_eq!(monsters.implicit_count(), 1);
        assert!(monsters.defined().is_empty());
        assert_eq!(
            monsters.name_target("Custom Troll"),
            Some(NameTarget::Implicit(0))
        );
    }

    #[test]
    fn test_spell_effect_then_damage() {
        let text = "\
#selectspell 150
#effect 10010
#damage 300
#end
";
        let m = parse_mod("summons", text).unwrap();
        assert!(m.def(EntityType::Monster).defined().contains(&300));
        assert!(m.def(EntityType::Spell).vanilla_edits().contains(&150));
    }

    #[test]
    fn test_spell_damage_then_effect() {
        let text = "\
#newspell
#damage 300
#effect 10010
#end
";
        let m = parse_mod("summons", text).unwrap();
        assert!(m.def(EntityType::Monster).defined().contains(&300));
    }

    #[test]
    fn test_spell_montag_and_enchantment() {
        let text = "\
#newspell
#effect 10
#damage -1000
#end

#newspell
#effect 81
#damage 250
#end
";
        let m = parse_mod("rituals", text).unwrap();
        assert!(m.def(EntityType::Montag).defined().contains(&1000));
        assert!(m.def(EntityType::Enchantment).defined().contains(&250));
        assert!(m.def(EntityType::Monster).defined().is_empty());
    }

    #[test]
    fn test_damage_outside_spell_block_is_a_stat() {
        let text = "\
#newmonster 13500
#damage 300
#end
";
        let m = parse_mod("stats", text).unwrap();
        assert!(!m.def(EntityType::Monster).defined().contains(&300));
    }

    #[test]
    fn test_multiline_description_suspends_parsing() {
        let text = "\
#newmonster 13500
#descr \"A monster whose tale spans lines.
#newmonster 999 is part of the story
and ends here.\"
#end
";
        let m = parse_mod("tales", text).unwrap();
        let defined = m.def(EntityType::Monster).defined();
        assert!(defined.contains(&13500));
        assert_eq!(defined.len(), 1);
    }

    #[test]
    fn test_out_of_range_id_fails_with_context() {
        let text = "#newmonster 25000\n#end\n";
        match parse_mod("broken", text) {
            Err(Error::Parse {
                mod_name, line, ..
            }) => {
                assert_eq!(mod_name, "broken");
                assert_eq!(line, 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_event_codes_recorded_by_magnitude() {
        let text = "\
#newevent
#rarity 5
#code -5000
#req_code -301
#end
";
        let m = parse_mod("events", text).unwrap();
        let codes = m.def(EntityType::EventCode);
        assert!(codes.defined().contains(&5000));
        // #req_code is a usage reference, not a definition
        assert!(!codes.defined().contains(&301));
    }

    #[test]
    fn test_montag_defined_by_use() {
        let text = "\
#newmonster 13500
#montag 1000
#end
";
        let m = parse_mod("montags", text).unwrap();
        assert!(m.def(EntityType::Montag).defined().contains(&1000));
    }

    #[test]
    fn test_unterminated_block_start_closes_previous() {
        let text = "\
#newmonster 13500
#newmonster 13501
#end
";
        let m = parse_mod("sloppy", text).unwrap();
        let defined = m.def(EntityType::Monster).defined();
        assert!(defined.contains(&13500));
        assert!(defined.contains(&13501));
    }
}
