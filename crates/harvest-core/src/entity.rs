use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{PageId, RawPage, compute_hash};
use crate::schema::{EntityKind, Field};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unknown => "unknown",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            "unknown" => Ok(Gender::Unknown),
            _ => Err(format!("Unknown gender: {}", s)),
        }
    }
}

/// Thrall profession (and the pet/animal pseudo-classes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrallClass {
    Alchemist,
    Archer,
    Armorer,
    Bearer,
    Blacksmith,
    Carpenter,
    Cook,
    Entertainer,
    Fighter,
    Performer,
    Priest,
    Smelter,
    Sorcerer,
    Tanner,
    Taskmaster,
    Pet,
    Animal,
}

impl ThrallClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrallClass::Alchemist => "alchemist",
            ThrallClass::Archer => "archer",
            ThrallClass::Armorer => "armorer",
            ThrallClass::Bearer => "bearer",
            ThrallClass::Blacksmith => "blacksmith",
            ThrallClass::Carpenter => "carpenter",
            ThrallClass::Cook => "cook",
            ThrallClass::Entertainer => "entertainer",
            ThrallClass::Fighter => "fighter",
            ThrallClass::Performer => "performer",
            ThrallClass::Priest => "priest",
            ThrallClass::Smelter => "smelter",
            ThrallClass::Sorcerer => "sorcerer",
            ThrallClass::Tanner => "tanner",
            ThrallClass::Taskmaster => "taskmaster",
            ThrallClass::Pet => "pet",
            ThrallClass::Animal => "animal",
        }
    }
}

impl FromStr for ThrallClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let class = match s.trim().to_lowercase().as_str() {
            "alchemist" => ThrallClass::Alchemist,
            "archer" => ThrallClass::Archer,
            "armorer" | "armourer" => ThrallClass::Armorer,
            "bearer" => ThrallClass::Bearer,
            "blacksmith" => ThrallClass::Blacksmith,
            "carpenter" => ThrallClass::Carpenter,
            "cook" => ThrallClass::Cook,
            "entertainer" | "dancer" => ThrallClass::Entertainer,
            "fighter" => ThrallClass::Fighter,
            "performer" => ThrallClass::Performer,
            "priest" => ThrallClass::Priest,
            "smelter" => ThrallClass::Smelter,
            "sorcerer" => ThrallClass::Sorcerer,
            "tanner" => ThrallClass::Tanner,
            "taskmaster" => ThrallClass::Taskmaster,
            "pet" => ThrallClass::Pet,
            "animal" => ThrallClass::Animal,
            _ => return Err(format!("Unknown class: {}", s)),
        };
        Ok(class)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelRate {
    VerySlow,
    Slow,
    Medium,
    Fast,
    VeryFast,
}

impl LevelRate {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelRate::VerySlow => "very slow",
            LevelRate::Slow => "slow",
            LevelRate::Medium => "medium",
            LevelRate::Fast => "fast",
            LevelRate::VeryFast => "very fast",
        }
    }
}

impl FromStr for LevelRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "veryslow" => Ok(LevelRate::VerySlow),
            "slow" => Ok(LevelRate::Slow),
            "medium" | "normal" => Ok(LevelRate::Medium),
            "fast" => Ok(LevelRate::Fast),
            "veryfast" => Ok(LevelRate::VeryFast),
            _ => Err(format!("Unknown level rate: {}", s)),
        }
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Gender(Gender),
    Class(ThrallClass),
    LevelRate(LevelRate),
    Flag(bool),
    /// A categorical value outside its field's known set, kept verbatim.
    Unknown(String),
}

impl AttributeValue {
    pub fn is_unknown(&self) -> bool {
        matches!(self, AttributeValue::Unknown(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Text(s) => crate::schema::parse_number(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(s) | AttributeValue::Unknown(s) => write!(f, "{s}"),
            AttributeValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            AttributeValue::Number(n) => write!(f, "{n}"),
            AttributeValue::Gender(g) => write!(f, "{}", g.as_str()),
            AttributeValue::Class(c) => write!(f, "{}", c.as_str()),
            AttributeValue::LevelRate(r) => write!(f, "{}", r.as_str()),
            AttributeValue::Flag(true) => write!(f, "yes"),
            AttributeValue::Flag(false) => write!(f, "no"),
        }
    }
}

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSource {
    pub page_id: PageId,
    pub title: String,
    pub fetched_at: DateTime<Utc>,
    pub content_hash: String,
}

impl From<&RawPage> for RecordSource {
    fn from(page: &RawPage) -> Self {
        Self {
            page_id: page.page_id,
            title: page.title.clone(),
            fetched_at: page.fetched_at,
            content_hash: page.content_hash.clone(),
        }
    }
}

/// One harvested game entity.
///
/// `attributes` never contains [`Field::Name`]; the identity lives in `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub kind: EntityKind,
    pub name: String,
    pub attributes: BTreeMap<Field, AttributeValue>,
    pub source: RecordSource,
}

impl EntityRecord {
    pub fn new(kind: EntityKind, name: impl Into<String>, source: RecordSource) -> Self {
        Self {
            kind,
            name: name.into(),
            attributes: BTreeMap::new(),
            source,
        }
    }

    pub fn with(mut self, field: Field, value: AttributeValue) -> Self {
        self.attributes.insert(field, value);
        self
    }

    pub fn get(&self, field: Field) -> Option<&AttributeValue> {
        self.attributes.get(&field)
    }

    /// Display text of a field, treating `Name` as the identity.
    pub fn text(&self, field: Field) -> Option<String> {
        match field {
            Field::Name => Some(self.name.clone()),
            _ => self.attributes.get(&field).map(ToString::to_string),
        }
    }

    /// SHA-256 over the identity and attribute values, used to detect
    /// whether an upsert actually changes a stored row.
    pub fn data_hash(&self) -> String {
        let mut canonical = format!("{}\n{}\n", self.kind, self.name);
        for (field, value) in &self.attributes {
            canonical.push_str(field.column());
            canonical.push('=');
            canonical.push_str(&value.to_string());
            canonical.push('\n');
        }
        compute_hash(&canonical)
    }
}
