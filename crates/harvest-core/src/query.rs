//! Filter expressions over stored records.
//!
//! A filter is a conjunction of clauses joined by `AND`:
//!
//! ```text
//! Gender=female
//! Class=fighter AND Level Rate=fast
//! Health>=1000 AND Faction=Darfari
//! ```
//!
//! Field names go through the same label dictionary as extraction.
//! Equality compares display text case-insensitively (full Unicode folding
//! through lowercase, not just ASCII); `>=`, `<=`, `>` and `<`
//! compare numerically and never match a value that is not a number.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::entity::EntityRecord;
use crate::error::AppError;
use crate::schema::{EntityKind, Field, parse_number};

static AND_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+and\s+").expect("valid AND regex"));

/// Comparison operator of one clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ge,
    Le,
    Gt,
    Lt,
}

impl Op {
    // Two-character operators must be tried before their one-character prefixes.
    const PARSE_ORDER: [Op; 5] = [Op::Ge, Op::Le, Op::Gt, Op::Lt, Op::Eq];

    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ge => ">=",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Lt => "<",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Op::Eq)
    }

    fn compare(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Op::Eq => lhs == rhs,
            Op::Ge => lhs >= rhs,
            Op::Le => lhs <= rhs,
            Op::Gt => lhs > rhs,
            Op::Lt => lhs < rhs,
        }
    }
}

/// `field op value`
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub field: Field,
    pub op: Op,
    pub value: String,
}

impl Clause {
    fn parse(raw: &str) -> Result<Self, AppError> {
        let (pos, op) = raw
            .char_indices()
            .find_map(|(i, _)| {
                Op::PARSE_ORDER
                    .iter()
                    .find(|op| raw[i..].starts_with(op.as_str()))
                    .map(|op| (i, *op))
            })
            .ok_or_else(|| {
                AppError::QueryError(format!("Clause '{raw}' has no operator (=, >=, <=, >, <)"))
            })?;

        let label = raw[..pos].trim();
        let value = raw[pos + op.as_str().len()..]
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim();

        let field = Field::from_label(label)
            .ok_or_else(|| AppError::QueryError(format!("Unknown field '{label}'")))?;
        if value.is_empty() {
            return Err(AppError::QueryError(format!("Clause '{raw}' has no value")));
        }
        if op.is_numeric() && parse_number(value).is_none() {
            return Err(AppError::QueryError(format!(
                "'{value}' is not a number; {} compares numerically",
                op.as_str()
            )));
        }

        Ok(Self {
            field,
            op,
            value: value.to_string(),
        })
    }

    pub fn matches(&self, record: &EntityRecord) -> bool {
        let Some(actual) = record.text(self.field) else {
            return false;
        };
        match self.op {
            Op::Eq => actual.to_lowercase() == self.value.to_lowercase(),
            op => match (parse_number(&actual), parse_number(&self.value)) {
                (Some(lhs), Some(rhs)) => op.compare(lhs, rhs),
                _ => false,
            },
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.field.label(), self.op.as_str(), self.value)
    }
}

/// A conjunction of clauses. The empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub clauses: Vec<Clause>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn parse(input: &str) -> Result<Self, AppError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::all());
        }
        let clauses = AND_SPLIT
            .split(input)
            .map(|part| Clause::parse(part.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { clauses })
    }

    /// Reject clauses on fields `kind` does not declare.
    pub fn check_kind(&self, kind: EntityKind) -> Result<(), AppError> {
        match self.clauses.iter().find(|c| !kind.has_field(c.field)) {
            Some(clause) => Err(AppError::QueryError(format!(
                "{kind} records have no '{}' field",
                clause.field.label()
            ))),
            None => Ok(()),
        }
    }

    pub fn matches(&self, record: &EntityRecord) -> bool {
        self.clauses.iter().all(|c| c.matches(record))
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}
