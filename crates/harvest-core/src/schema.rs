//! Fixed per-kind record schemas.
//!
//! Every entity kind declares the finite set of [`Field`]s it can carry, and
//! every field declares how its raw text is typed. Wiki labels are resolved
//! to fields through a single alias dictionary shared by the extractor and
//! the query parser.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entity::{AttributeValue, Gender, LevelRate, ThrallClass};

/// The four kinds of game entity the harvester understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Thrall,
    Npc,
    Creature,
    Pet,
}

const THRALL_FIELDS: &[Field] = &[
    Field::Name,
    Field::Id,
    Field::Class,
    Field::Health,
    Field::Strength,
    Field::Agility,
    Field::Vitality,
    Field::Grit,
    Field::BonusVitality,
    Field::LevelRate,
    Field::Armor,
    Field::DamageReduction,
    Field::KilledXp,
    Field::Temperament,
    Field::Gender,
    Field::Thrallable,
    Field::Race,
    Field::Faction,
    Field::Notes,
];

const NPC_FIELDS: &[Field] = &[
    Field::Name,
    Field::Id,
    Field::Class,
    Field::Health,
    Field::Armor,
    Field::DamageReduction,
    Field::KilledXp,
    Field::Temperament,
    Field::Gender,
    Field::Thrallable,
    Field::Race,
    Field::Faction,
    Field::Notes,
];

const CREATURE_FIELDS: &[Field] = &[
    Field::Name,
    Field::Id,
    Field::Health,
    Field::Armor,
    Field::DamageReduction,
    Field::KilledXp,
    Field::Temperament,
    Field::Faction,
    Field::Notes,
];

const PET_FIELDS: &[Field] = &[
    Field::Name,
    Field::Id,
    Field::Class,
    Field::Health,
    Field::Strength,
    Field::Agility,
    Field::Vitality,
    Field::Grit,
    Field::LevelRate,
    Field::Armor,
    Field::Temperament,
    Field::Notes,
];

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Thrall,
        EntityKind::Npc,
        EntityKind::Creature,
        EntityKind::Pet,
    ];

    /// Classification order when a page carries markers for several kinds.
    /// Pets are creatures and thralls are NPCs, so the narrower kind goes first.
    pub const PRIORITY: [EntityKind; 4] = [
        EntityKind::Pet,
        EntityKind::Thrall,
        EntityKind::Creature,
        EntityKind::Npc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Thrall => "thrall",
            EntityKind::Npc => "npc",
            EntityKind::Creature => "creature",
            EntityKind::Pet => "pet",
        }
    }

    /// Store table holding this kind.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Thrall => "thralls",
            EntityKind::Npc => "npcs",
            EntityKind::Creature => "creatures",
            EntityKind::Pet => "pets",
        }
    }

    /// The declared field set for this kind, in display order.
    pub fn fields(&self) -> &'static [Field] {
        match self {
            EntityKind::Thrall => THRALL_FIELDS,
            EntityKind::Npc => NPC_FIELDS,
            EntityKind::Creature => CREATURE_FIELDS,
            EntityKind::Pet => PET_FIELDS,
        }
    }

    pub fn has_field(&self, field: Field) -> bool {
        self.fields().contains(&field)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "thrall" | "thralls" => Ok(EntityKind::Thrall),
            "npc" | "npcs" => Ok(EntityKind::Npc),
            "creature" | "creatures" => Ok(EntityKind::Creature),
            "pet" | "pets" => Ok(EntityKind::Pet),
            _ => Err(format!("Unknown entity kind: {}", s)),
        }
    }
}

/// How a field's raw text is typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Text,
    Numeric,
    /// Values must come from a closed set.
    Categorical,
}

/// Every attribute any entity kind may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Id,
    Class,
    Health,
    Strength,
    Agility,
    Vitality,
    Grit,
    BonusVitality,
    LevelRate,
    Armor,
    DamageReduction,
    KilledXp,
    Temperament,
    Gender,
    Thrallable,
    Race,
    Faction,
    Notes,
}

impl Field {
    /// Human-readable label, as used in summaries and filter expressions.
    pub fn label(&self) -> &'static str {
        match self {
            Field::Name => "Name",
            Field::Id => "ID",
            Field::Class => "Class",
            Field::Health => "Health",
            Field::Strength => "Strength",
            Field::Agility => "Agility",
            Field::Vitality => "Vitality",
            Field::Grit => "Grit",
            Field::BonusVitality => "Bonus Vitality",
            Field::LevelRate => "Level Rate",
            Field::Armor => "Armor",
            Field::DamageReduction => "Incoming Damage Reduction",
            Field::KilledXp => "Killed XP",
            Field::Temperament => "Temperament",
            Field::Gender => "Gender",
            Field::Thrallable => "Thrallable",
            Field::Race => "Race",
            Field::Faction => "Faction",
            Field::Notes => "Notes",
        }
    }

    /// Store column name. Only ever one of these fixed identifiers.
    pub fn column(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Id => "game_id",
            Field::Class => "class",
            Field::Health => "health",
            Field::Strength => "strength",
            Field::Agility => "agility",
            Field::Vitality => "vitality",
            Field::Grit => "grit",
            Field::BonusVitality => "bonus_vitality",
            Field::LevelRate => "level_rate",
            Field::Armor => "armor",
            Field::DamageReduction => "damage_reduction",
            Field::KilledXp => "killed_xp",
            Field::Temperament => "temperament",
            Field::Gender => "gender",
            Field::Thrallable => "thrallable",
            Field::Race => "race",
            Field::Faction => "faction",
            Field::Notes => "notes",
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Field::Class | Field::Gender | Field::LevelRate | Field::Thrallable => {
                ValueType::Categorical
            }
            Field::Health
            | Field::Strength
            | Field::Agility
            | Field::Vitality
            | Field::Grit
            | Field::BonusVitality
            | Field::Armor
            | Field::DamageReduction
            | Field::KilledXp => ValueType::Numeric,
            Field::Name
            | Field::Id
            | Field::Temperament
            | Field::Race
            | Field::Faction
            | Field::Notes => ValueType::Text,
        }
    }

    /// Resolve a wiki or user label to a field.
    ///
    /// Matching ignores case and any non-alphanumeric characters, so
    /// `Level Rate`, `level_rate` and `levelCurve` all resolve.
    pub fn from_label(label: &str) -> Option<Field> {
        let key = normalize_label(label);
        let field = match key.as_str() {
            "name" => Field::Name,
            "id" | "gameid" | "itemid" | "npcid" => Field::Id,
            "class" | "thrallclass" | "thralltype" => Field::Class,
            "health" | "hp" | "npchealth" => Field::Health,
            "strength" | "str" => Field::Strength,
            "agility" | "agi" => Field::Agility,
            "vitality" | "vit" => Field::Vitality,
            "grit" => Field::Grit,
            "bonusvit" | "bonusvitality" => Field::BonusVitality,
            "levelrate" | "levelcurve" | "levelingrate" => Field::LevelRate,
            "armor" | "armour" | "npcarmor" => Field::Armor,
            "incomingdamagereduction" | "damagereduction" | "npcdrarmor" | "drarmor" => {
                Field::DamageReduction
            }
            "killedxp" | "npckillxp" | "killxp" | "xp" => Field::KilledXp,
            "temperament" | "npctemperament" => Field::Temperament,
            "gender" | "sex" => Field::Gender,
            "thrallable" => Field::Thrallable,
            "race" => Field::Race,
            "faction" | "fac" => Field::Faction,
            "notes" => Field::Notes,
            _ => return None,
        };
        Some(field)
    }

    /// Type one cleaned, non-empty raw value according to this field.
    ///
    /// Categorical values outside their known set are kept as
    /// [`AttributeValue::Unknown`]; acceptance is the loader's decision.
    pub fn parse_value(&self, raw: &str) -> AttributeValue {
        let raw = raw.trim();
        match self {
            Field::Gender => raw
                .parse::<Gender>()
                .map(AttributeValue::Gender)
                .unwrap_or_else(|_| AttributeValue::Unknown(raw.to_string())),
            Field::Class => raw
                .parse::<ThrallClass>()
                .map(AttributeValue::Class)
                .unwrap_or_else(|_| AttributeValue::Unknown(raw.to_string())),
            Field::LevelRate => raw
                .parse::<LevelRate>()
                .map(AttributeValue::LevelRate)
                .unwrap_or_else(|_| AttributeValue::Unknown(raw.to_string())),
            Field::Thrallable => parse_flag(raw)
                .map(AttributeValue::Flag)
                .unwrap_or_else(|| AttributeValue::Unknown(raw.to_string())),
            _ if self.value_type() == ValueType::Numeric => parse_number(raw)
                .map(AttributeValue::Number)
                .unwrap_or_else(|| AttributeValue::Text(raw.to_string())),
            _ => AttributeValue::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "yes" | "y" | "true" => Some(true),
        "no" | "n" | "false" => Some(false),
        _ => None,
    }
}

/// Parse a stat value, tolerating thousands separators.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}
