//! Line classifier for `.dm` mod scripts
//!
//! Classifies one trimmed, comment-stripped, non-blank line against the
//! current parse context. Classification order matters: metadata is matched
//! before generic entity directives, block start/end before block content,
//! and being inside a spell block overrides the generic tables (`#damage` is
//! a spell damage code there, a plain stat line anywhere else).

use crate::entity::{self, BlockOpener, Directive, DirectiveRole, MetaKind};

/// Argument carried by a directive line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    None,
    Id(i64),
    Name(String),
}

/// What a single script line means
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    /// Mod-level metadata, raw argument text preserved
    Metadata(MetaKind, String),
    /// Opens a `#end`-terminated block
    BlockStart(&'static BlockOpener, Arg),
    /// Literal `#end`
    BlockEnd,
    /// `#name "..."` inside a block
    NameBinding(String),
    /// `#effect N` inside a spell block
    SpellEffect(i64),
    /// `#damage N` inside a spell block
    SpellDamage(i64),
    /// `#copyspell` inside a spell block
    SpellCopy(Arg),
    /// Generic single-line entity directive
    Reference(&'static Directive, Arg),
    /// Anything the merger does not need to understand
    Passthrough,
}

/// Parse context visible to the classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyCtx {
    pub in_spell_block: bool,
}

/// Classify one line; errors are plain messages, wrapped with file/line
/// context by the caller
pub fn classify(line: &str, ctx: &ClassifyCtx) -> Result<LineKind, String> {
    let (keyword, rest) = split_keyword(line);

    if keyword == "#end" {
        return Ok(LineKind::BlockEnd);
    }

    if let Some(kind) = entity::metadata(keyword) {
        return Ok(LineKind::Metadata(kind, rest.trim().to_string()));
    }

    if let Some(op) = entity::block_opener(keyword) {
        return Ok(LineKind::BlockStart(op, parse_arg(rest)?));
    }

    if ctx.in_spell_block {
        match keyword {
            "#effect" => return Ok(LineKind::SpellEffect(parse_numeric(keyword, rest)?)),
            "#damage" => return Ok(LineKind::SpellDamage(parse_numeric(keyword, rest)?)),
            "#copyspell" => return Ok(LineKind::SpellCopy(parse_arg(rest)?)),
            _ => {}
        }
    }

    if keyword == "#name" {
        if let Arg::Name(name) = parse_arg(rest)? {
            return Ok(LineKind::NameBinding(name));
        }
        return Ok(LineKind::Passthrough);
    }

    if let Some(d) = entity::directive(keyword) {
        return match parse_arg(rest) {
            Ok(arg) => Ok(LineKind::Reference(d, arg)),
            // usage lines the merger cannot read are left alone; definition
            // lines must carry a well-formed id
            Err(_) if d.role == DirectiveRole::Usage => Ok(LineKind::Passthrough),
            Err(e) => Err(e),
        };
    }

    Ok(LineKind::Passthrough)
}

fn split_keyword(line: &str) -> (&str, &str) {
    match line.find(char::is_whitespace) {
        Some(i) => (&line[..i], &line[i..]),
        None => (line, ""),
    }
}

fn parse_arg(rest: &str) -> Result<Arg, String> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(Arg::None);
    }
    if let Some(stripped) = rest.strip_prefix('"') {
        // unterminated quotes spill into following lines; take what we have
        let name = match stripped.find('"') {
            Some(i) => &stripped[..i],
            None => stripped,
        };
        return Ok(Arg::Name(name.to_string()));
    }
    let token = rest.split_whitespace().next().unwrap_or(rest);
    token
        .parse::<i64>()
        .map(Arg::Id)
        .map_err(|_| format!("expected a numeric id or quoted name, found '{token}'"))
}

fn parse_numeric(keyword: &str, rest: &str) -> Result<i64, String> {
    match parse_arg(rest)? {
        Arg::Id(n) => Ok(n),
        _ => Err(format!("{keyword} requires a numeric argument")),
    }
}

/// Strip a trailing `--` comment, respecting quoted strings
pub fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_quotes = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_quotes = !in_quotes,
            b'-' if !in_quotes && i + 1 < bytes.len() && bytes[i + 1] == b'-' => {
                return &line[..i];
            }
            _ => {}
        }
        i += 1;
    }
    line
}

/// Does this line open a quoted string it never closes?
pub fn has_unterminated_quote(line: &str) -> bool {
    line.bytes().filter(|&b| b == b'"').count() % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;

    fn idle() -> ClassifyCtx {
        ClassifyCtx::default()
    }

    fn in_spell() -> ClassifyCtx {
        ClassifyCtx {
            in_spell_block: true,
        }
    }

    #[test]
    fn test_metadata_before_generic() {
        let kind = classify("#modname \"My Mod\"", &idle()).unwrap();
        assert_eq!(
            kind,
            LineKind::Metadata(MetaKind::ModName, "\"My Mod\"".to_string())
        );
    }

    #[test]
    fn test_block_start_forms() {
        match classify("#newmonster 13500", &idle()).unwrap() {
            LineKind::BlockStart(op, Arg::Id(13500)) => {
                assert_eq!(op.keyword, "#newmonster");
            }
            other => panic!("unexpected: {other:?}"),
        }
        match classify("#selectmonster \"Black Hawk\"", &idle()).unwrap() {
            LineKind::BlockStart(_, Arg::Name(name)) => assert_eq!(name, "Black Hawk"),
            other => panic!("unexpected: {other:?}"),
        }
        match classify("#newmonster", &idle()).unwrap() {
            LineKind::BlockStart(_, Arg::None) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_end_and_name() {
        assert_eq!(classify("#end", &idle()).unwrap(), LineKind::BlockEnd);
        assert_eq!(
            classify("#name \"Custom Troll\"", &idle()).unwrap(),
            LineKind::NameBinding("Custom Troll".to_string())
        );
    }

    #[test]
    fn test_damage_context_sensitive() {
        // inside a spell block #damage is a damage code
        assert_eq!(
            classify("#damage 300", &in_spell()).unwrap(),
            LineKind::SpellDamage(300)
        );
        // elsewhere it is a plain stat line
        assert_eq!(
            classify("#damage 300", &idle()).unwrap(),
            LineKind::Passthrough
        );
    }

    #[test]
    fn test_negative_event_code() {
        match classify("#code -5000", &idle()).unwrap() {
            LineKind::Reference(d, Arg::Id(-5000)) => {
                assert_eq!(d.entity, EntityType::EventCode);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_usage_reference() {
        match classify("#firstshape 13500", &idle()).unwrap() {
            LineKind::Reference(d, Arg::Id(13500)) => {
                assert_eq!(d.entity, EntityType::Monster);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_is_passthrough() {
        assert_eq!(classify("#hp 25", &idle()).unwrap(), LineKind::Passthrough);
        assert_eq!(
            classify("#clearweapons", &idle()).unwrap(),
            LineKind::Passthrough
        );
    }

    #[test]
    fn test_malformed_definition_id_rejected() {
        assert!(classify("#newmonster twelve", &idle()).is_err());
        assert!(classify("#montag abc", &idle()).is_err());
        // malformed usage args fall through instead of failing the mod
        assert_eq!(
            classify("#firstshape previous", &idle()).unwrap(),
            LineKind::Passthrough
        );
    }

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("#damage 300 -- why"), "#damage 300 ");
        assert_eq!(strip_comment("-- whole line"), "");
        assert_eq!(
            strip_comment("#name \"Two--Face\""),
            "#name \"Two--Face\""
        );
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(has_unterminated_quote("#descr \"A tale of"));
        assert!(!has_unterminated_quote("#descr \"Short.\""));
        assert!(!has_unterminated_quote("#end"));
    }
}
