use std::fmt;

use crate::entity::{AttributeValue, EntityRecord};
use crate::error::AppError;
use crate::models::PageId;
use crate::schema::{EntityKind, Field};
use crate::traits::{RecordStore, UpsertOutcome};

/// Why a record was not loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The record has no usable name, so it cannot be keyed.
    MissingIdentity,
    /// A categorical field holds a value outside its known set.
    UnknownCategoryValue { field: Field, value: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingIdentity => write!(f, "missing name"),
            RejectReason::UnknownCategoryValue { field, value } => {
                write!(f, "unknown {} value '{}'", field.label(), value)
            }
        }
    }
}

/// Per-record result of a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted {
        kind: EntityKind,
        name: String,
        change: UpsertOutcome,
    },
    Rejected {
        kind: EntityKind,
        name: String,
        page_id: PageId,
        reason: RejectReason,
    },
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted { .. })
    }
}

/// Aggregate counts over a batch of [`ValidationOutcome`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub accepted: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: Vec<(EntityKind, String, PageId, RejectReason)>,
}

impl LoadReport {
    pub fn from_outcomes(outcomes: &[ValidationOutcome]) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            match outcome {
                ValidationOutcome::Accepted { change, .. } => {
                    report.accepted += 1;
                    match change {
                        UpsertOutcome::Inserted => report.inserted += 1,
                        UpsertOutcome::Updated => report.updated += 1,
                        UpsertOutcome::Unchanged => report.unchanged += 1,
                    }
                }
                ValidationOutcome::Rejected {
                    kind,
                    name,
                    page_id,
                    reason,
                } => report
                    .rejected
                    .push((*kind, name.clone(), *page_id, reason.clone())),
            }
        }
        report
    }
}

/// Check a record against its kind's rules.
pub fn validate(record: &EntityRecord) -> Result<(), RejectReason> {
    if record.name.trim().is_empty() {
        return Err(RejectReason::MissingIdentity);
    }
    for (field, value) in &record.attributes {
        if let AttributeValue::Unknown(raw) = value {
            return Err(RejectReason::UnknownCategoryValue {
                field: *field,
                value: raw.clone(),
            });
        }
    }
    Ok(())
}

/// Validates records and upserts the accepted ones.
#[derive(Clone)]
pub struct Loader<S> {
    store: S,
}

impl<S: RecordStore> Loader<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load records in order; a later record with the same kind and name
    /// replaces an earlier one.
    ///
    /// Invalid records are reported and skipped. Only a store failure stops
    /// the batch.
    pub async fn load<'a, I>(&self, records: I) -> Result<Vec<ValidationOutcome>, AppError>
    where
        I: IntoIterator<Item = &'a EntityRecord>,
    {
        let mut outcomes = Vec::new();
        for record in records {
            if let Err(reason) = validate(record) {
                tracing::warn!(
                    kind = %record.kind,
                    name = %record.name,
                    page_id = %record.source.page_id,
                    reason = %reason,
                    "Record rejected"
                );
                outcomes.push(ValidationOutcome::Rejected {
                    kind: record.kind,
                    name: record.name.clone(),
                    page_id: record.source.page_id,
                    reason,
                });
                continue;
            }

            let change = self.store.upsert(record).await?;
            tracing::debug!(kind = %record.kind, name = %record.name, ?change, "Record loaded");
            outcomes.push(ValidationOutcome::Accepted {
                kind: record.kind,
                name: record.name.clone(),
                change,
            });
        }
        Ok(outcomes)
    }
}
