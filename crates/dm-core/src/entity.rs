//! Entity categories, id ranges, and the directive vocabulary
//!
//! Everything the classifier and allocator need to know about the script
//! format lives here as declarative const tables: which `#directive` keywords
//! exist, which entity category they talk about, whether they define new
//! content or merely reference it, and the numeric id ranges per category.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The fixed set of id-carrying entity categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Weapon,
    Armor,
    Monster,
    Spell,
    Item,
    Site,
    Nation,
    NameType,
    Enchantment,
    EventCode,
    PopType,
    Montag,
    RestrictedItem,
}

/// Number of entity categories
pub const TYPE_COUNT: usize = EntityType::ALL.len();

impl EntityType {
    /// All categories in allocation order
    pub const ALL: [EntityType; 13] = [
        EntityType::Weapon,
        EntityType::Armor,
        EntityType::Monster,
        EntityType::Spell,
        EntityType::Item,
        EntityType::Site,
        EntityType::Nation,
        EntityType::NameType,
        EntityType::Enchantment,
        EntityType::EventCode,
        EntityType::PopType,
        EntityType::Montag,
        EntityType::RestrictedItem,
    ];

    /// Stable index into per-type tables
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human-readable label used in comments and reports
    pub fn label(self) -> &'static str {
        match self {
            EntityType::Weapon => "Weapon",
            EntityType::Armor => "Armor",
            EntityType::Monster => "Monster",
            EntityType::Spell => "Spell",
            EntityType::Item => "Item",
            EntityType::Site => "Site",
            EntityType::Nation => "Nation",
            EntityType::NameType => "NameType",
            EntityType::Enchantment => "Enchantment",
            EntityType::EventCode => "EventCode",
            EntityType::PopType => "PopType",
            EntityType::Montag => "Montag",
            EntityType::RestrictedItem => "RestrictedItem",
        }
    }

    /// Id range registry for this category
    pub fn range(self) -> IdRange {
        match self {
            EntityType::Weapon => range(799, 1999, 1500),
            EntityType::Armor => range(399, 1999, 1500),
            EntityType::Monster => range(249, 19999, 13500),
            EntityType::Spell => range(1299, 7999, 5900),
            EntityType::Item => range(499, 1999, 1000),
            EntityType::Site => range(1499, 4999, 2500),
            EntityType::Nation => range(119, 499, 330),
            EntityType::NameType => range(169, 399, 270),
            EntityType::Enchantment => range(199, 9999, 5000),
            EntityType::EventCode => range(299, 9999, 5000),
            EntityType::PopType => range(124, 249, 150),
            EntityType::Montag => range(999, 19999, 10000),
            EntityType::RestrictedItem => range(0, 999, 100),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Vanilla/modding id spans for one entity category
///
/// Vanilla ids occupy `[0, vanilla_end]` and belong to the base game; mods may
/// edit them but never claim them. The modding range starts directly above and
/// runs to `modding_end`. The preferred start is where fresh allocations begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub vanilla_end: u32,
    pub modding_end: u32,
    pub preferred_start: u32,
}

const fn range(vanilla_end: u32, modding_end: u32, preferred_start: u32) -> IdRange {
    IdRange {
        vanilla_end,
        modding_end,
        preferred_start,
    }
}

impl IdRange {
    /// First id available to mods
    pub fn modding_start(self) -> u32 {
        self.vanilla_end + 1
    }

    /// Number of ids in the modding range
    pub fn modding_len(self) -> u32 {
        self.modding_end - self.modding_start() + 1
    }

    pub fn is_vanilla(self, id: u32) -> bool {
        id <= self.vanilla_end
    }

    pub fn is_modding(self, id: u32) -> bool {
        id >= self.modding_start() && id <= self.modding_end
    }
}

/// How a directive relates to the id it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveRole {
    /// Defines new mod-owned content under that id
    New,
    /// Edits already-existing content
    Select,
    /// Passes the id as an argument without defining anything
    Usage,
}

/// A single-line directive carrying an entity id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive {
    pub keyword: &'static str,
    pub entity: EntityType,
    pub role: DirectiveRole,
}

const fn dir(keyword: &'static str, entity: EntityType, role: DirectiveRole) -> Directive {
    Directive {
        keyword,
        entity,
        role,
    }
}

use DirectiveRole::{New, Select, Usage};
use EntityType::*;

/// Single-line directives, grouped by the category of the id they carry
pub const DIRECTIVES: &[Directive] = &[
    // weapons
    dir("#weapon", Weapon, Usage),
    dir("#secondaryeffect", Weapon, Usage),
    dir("#secondaryeffectalways", Weapon, Usage),
    dir("#copyweapon", Weapon, Usage),
    // armor
    dir("#armor", Armor, Usage),
    dir("#copyarmor", Armor, Usage),
    // monsters
    dir("#copystats", Monster, Usage),
    dir("#copyspr", Monster, Usage),
    dir("#firstshape", Monster, Usage),
    dir("#secondshape", Monster, Usage),
    dir("#secondtmpshape", Monster, Usage),
    dir("#shapechange", Monster, Usage),
    dir("#prophetshape", Monster, Usage),
    dir("#twiceborn", Monster, Usage),
    dir("#domsummon", Monster, Usage),
    dir("#domsummon2", Monster, Usage),
    dir("#domsummon20", Monster, Usage),
    dir("#raredomsummon", Monster, Usage),
    dir("#summon1", Monster, Usage),
    dir("#summon5", Monster, Usage),
    dir("#battlesum1", Monster, Usage),
    dir("#battlesum5", Monster, Usage),
    dir("#batstartsum1", Monster, Usage),
    dir("#batstartsum2", Monster, Usage),
    dir("#makemonsters1", Monster, Usage),
    dir("#makemonsters2", Monster, Usage),
    dir("#makemonsters5", Monster, Usage),
    dir("#startcom", Monster, Usage),
    dir("#startscout", Monster, Usage),
    dir("#startunittype1", Monster, Usage),
    dir("#startunittype2", Monster, Usage),
    dir("#addrecunit", Monster, Usage),
    dir("#addreccom", Monster, Usage),
    dir("#hero1", Monster, Usage),
    dir("#hero2", Monster, Usage),
    dir("#hero3", Monster, Usage),
    dir("#multihero1", Monster, Usage),
    dir("#multihero2", Monster, Usage),
    dir("#homemonster", Monster, Usage),
    dir("#natmon", Monster, Usage),
    dir("#natcom", Monster, Usage),
    dir("#guardspirit", Monster, Usage),
    // spells
    dir("#nextspell", Spell, Usage),
    dir("#copyspell", Spell, Usage),
    // items
    dir("#copyitem", Item, Usage),
    dir("#startitem", Item, Usage),
    // sites
    dir("#startsite", Site, Usage),
    dir("#futuresite", Site, Usage),
    // nations
    dir("#restricted", Nation, Usage),
    dir("#nationrebate", Nation, Usage),
    // name types
    dir("#nametype", NameType, Usage),
    // enchantments
    dir("#req_ench", Enchantment, Usage),
    dir("#req_noench", Enchantment, Usage),
    dir("#nationench", Enchantment, Usage),
    // event codes, written as negative literals in scripts
    dir("#code", EventCode, New),
    dir("#code2", EventCode, New),
    dir("#resetcode", EventCode, Usage),
    dir("#req_code", EventCode, Usage),
    dir("#req_anycode", EventCode, Usage),
    dir("#req_notanycode", EventCode, Usage),
    dir("#req_nearbycode", EventCode, Usage),
    dir("#req_nearowncode", EventCode, Usage),
    // population types
    dir("#poptype", PopType, Usage),
    // montags, defined by use
    dir("#montag", Montag, New),
    dir("#req_montag", Montag, Usage),
    // restricted-item codes
    dir("#restricteditem", RestrictedItem, New),
    dir("#userestricteditem", RestrictedItem, Usage),
];

/// A directive that opens a `#end`-terminated block
///
/// `target` is the entity category the block defines or edits; `None` marks
/// blocks that carry no id of their own (events). `spell` flags the blocks
/// whose `#effect`/`#damage` content gets special treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOpener {
    pub keyword: &'static str,
    pub target: Option<(EntityType, DirectiveRole)>,
    pub spell: bool,
}

const fn opener(
    keyword: &'static str,
    target: Option<(EntityType, DirectiveRole)>,
    spell: bool,
) -> BlockOpener {
    BlockOpener {
        keyword,
        target,
        spell,
    }
}

/// Block-opening directives
pub const BLOCK_OPENERS: &[BlockOpener] = &[
    opener("#newweapon", Some((Weapon, New)), false),
    opener("#selectweapon", Some((Weapon, Select)), false),
    opener("#newarmor", Some((Armor, New)), false),
    opener("#selectarmor", Some((Armor, Select)), false),
    opener("#newmonster", Some((Monster, New)), false),
    opener("#selectmonster", Some((Monster, Select)), false),
    opener("#newspell", Some((Spell, New)), true),
    opener("#selectspell", Some((Spell, Select)), true),
    opener("#newitem", Some((Item, New)), false),
    opener("#selectitem", Some((Item, Select)), false),
    opener("#newsite", Some((Site, New)), false),
    opener("#selectsite", Some((Site, Select)), false),
    opener("#newnation", Some((Nation, New)), false),
    opener("#selectnation", Some((Nation, Select)), false),
    opener("#selectnametype", Some((NameType, Select)), false),
    opener("#selectpoptype", Some((PopType, Select)), false),
    opener("#newevent", None, false),
];

/// Mod-level metadata directives, stripped from merged output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    ModName,
    Description,
    Icon,
    Version,
    DomVersion,
}

pub const METADATA: &[(&str, MetaKind)] = &[
    ("#modname", MetaKind::ModName),
    ("#description", MetaKind::Description),
    ("#icon", MetaKind::Icon),
    ("#version", MetaKind::Version),
    ("#domversion", MetaKind::DomVersion),
];

static DIRECTIVE_INDEX: Lazy<HashMap<&'static str, &'static Directive>> =
    Lazy::new(|| DIRECTIVES.iter().map(|d| (d.keyword, d)).collect());

static OPENER_INDEX: Lazy<HashMap<&'static str, &'static BlockOpener>> =
    Lazy::new(|| BLOCK_OPENERS.iter().map(|o| (o.keyword, o)).collect());

static METADATA_INDEX: Lazy<HashMap<&'static str, MetaKind>> =
    Lazy::new(|| METADATA.iter().copied().collect());

/// Look up a single-line directive by keyword
pub fn directive(keyword: &str) -> Option<&'static Directive> {
    DIRECTIVE_INDEX.get(keyword).copied()
}

/// Look up a block opener by keyword
pub fn block_opener(keyword: &str) -> Option<&'static BlockOpener> {
    OPENER_INDEX.get(keyword).copied()
}

/// Look up a metadata directive by keyword
pub fn metadata(keyword: &str) -> Option<MetaKind> {
    METADATA_INDEX.get(keyword).copied()
}

/// Effect codes whose damage value names a monster (or montag, if negative)
pub const SUMMON_EFFECTS: &[i64] = &[10, 37, 38, 43, 50, 62, 89, 93, 119, 126, 130, 137];

/// Effect codes whose damage value names an enchantment
pub const ENCHANTMENT_EFFECTS: &[i64] = &[81, 82];

/// Ritual variants add this offset to the base effect code
pub const RITUAL_EFFECT_OFFSET: i64 = 10000;

fn base_effect(effect: i64) -> i64 {
    if effect > RITUAL_EFFECT_OFFSET {
        effect - RITUAL_EFFECT_OFFSET
    } else {
        effect
    }
}

/// Does this effect summon monsters?
pub fn effect_summons(effect: i64) -> bool {
    SUMMON_EFFECTS.contains(&base_effect(effect))
}

/// Does this effect create an enchantment?
pub fn effect_enchants(effect: i64) -> bool {
    ENCHANTMENT_EFFECTS.contains(&base_effect(effect))
}

/// Interpret a spell block's damage value given its effect code
///
/// A positive damage under a summoning effect is a monster id, a non-positive
/// one a montag id (by absolute value); damage under an enchantment effect is
/// an enchantment id. Anything else carries no entity reference.
pub fn spell_damage_target(effect: i64, damage: i64) -> Option<(EntityType, u32)> {
    if effect_summons(effect) {
        let id = u32::try_from(damage.unsigned_abs()).ok()?;
        if damage > 0 {
            Some((EntityType::Monster, id))
        } else {
            Some((EntityType::Montag, id))
        }
    } else if effect_enchants(effect) {
        let id = u32::try_from(damage.unsigned_abs()).ok()?;
        Some((EntityType::Enchantment, id))
    } else {
        None
    }
}
