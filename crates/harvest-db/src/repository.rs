use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use harvest_core::entity::{AttributeValue, EntityRecord, RecordSource};
use harvest_core::error::AppError;
use harvest_core::models::PageId;
use harvest_core::query::{Filter, Op};
use harvest_core::schema::{EntityKind, Field, parse_number};
use harvest_core::traits::{RecordStore, UpsertOutcome};
use sqlx::{Pool, Sqlite, SqlitePool};

const ROW_COLUMNS: &str = "name, page_id, page_title, fetched_at, content_hash, attributes";

const SOURCE_COLUMNS: [&str; 7] = [
    "page_id",
    "page_title",
    "fetched_at",
    "content_hash",
    "data_hash",
    "attributes",
    "updated_at",
];

/// Entity persistence in SQLite, one table per [`EntityKind`] keyed by name.
///
/// Each declared field has a text column holding its display value, which is
/// what filters match against. The typed values are kept alongside as JSON so
/// records read back exactly as they were written.
#[derive(Clone)]
pub struct EntityRepository {
    pool: Pool<Sqlite>,
}

impl EntityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the row for `(record.kind, record.name)`.
    ///
    /// A row whose data hash already matches keeps its attributes and reports
    /// [`UpsertOutcome::Unchanged`]; only its source columns are refreshed.
    pub async fn upsert(&self, record: &EntityRecord) -> Result<UpsertOutcome, AppError> {
        let table = record.kind.table();
        let data_hash = record.data_hash();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let existing: Option<String> =
            sqlx::query_scalar(&format!("SELECT data_hash FROM {table} WHERE name = ?"))
                .bind(&record.name)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

        let outcome = match existing {
            None => UpsertOutcome::Inserted,
            Some(stored) if stored == data_hash => {
                sqlx::query(&format!(
                    "UPDATE {table} SET page_id = ?, page_title = ?, fetched_at = ?, \
                     content_hash = ?, updated_at = ? WHERE name = ?"
                ))
                .bind(record.source.page_id.0 as i64)
                .bind(&record.source.title)
                .bind(record.source.fetched_at)
                .bind(&record.source.content_hash)
                .bind(Utc::now())
                .bind(&record.name)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                tx.commit().await.map_err(db_err)?;
                return Ok(UpsertOutcome::Unchanged);
            }
            Some(_) => UpsertOutcome::Updated,
        };

        let sql = upsert_sql(record.kind);
        let attributes = serde_json::to_string(&record.attributes)?;
        let mut query = sqlx::query(&sql).bind(&record.name);
        for field in attribute_fields(record.kind) {
            query = query.bind(record.text(field));
        }
        query
            .bind(record.source.page_id.0 as i64)
            .bind(&record.source.title)
            .bind(record.source.fetched_at)
            .bind(&record.source.content_hash)
            .bind(&data_hash)
            .bind(attributes)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(outcome)
    }

    pub async fn get(&self, kind: EntityKind, name: &str) -> Result<Option<EntityRecord>, AppError> {
        let row = sqlx::query_as::<_, EntityRow>(&format!(
            "SELECT {ROW_COLUMNS} FROM {} WHERE name = ?",
            kind.table()
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|row| row.into_record(kind)).transpose()
    }

    /// Records of `kind` matching `filter`, ordered by name.
    ///
    /// Clauses narrow the scan in SQL; the filter is then applied to each
    /// decoded record, so results agree exactly with [`Filter::matches`].
    pub async fn query(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<EntityRecord>, AppError> {
        filter.check_kind(kind)?;

        let mut conditions = Vec::with_capacity(filter.clauses.len());
        let mut params = Vec::with_capacity(filter.clauses.len());
        for clause in &filter.clauses {
            let column = clause.field.column();
            match clause.op {
                // NOCASE only folds ASCII; other values are left to `matches`.
                Op::Eq if clause.value.is_ascii() => {
                    conditions.push(format!("{column} = ? COLLATE NOCASE"));
                    params.push(Param::Text(clause.value.clone()));
                }
                Op::Eq => {}
                op => {
                    let Some(bound) = parse_number(&clause.value) else {
                        continue;
                    };
                    conditions.push(format!(
                        "CAST(REPLACE(REPLACE({column}, ',', ''), ' ', '') AS REAL) {} ?",
                        op.as_str()
                    ));
                    params.push(Param::Number(bound));
                }
            }
        }

        let mut sql = format!("SELECT {ROW_COLUMNS} FROM {}", kind.table());
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY name");

        let mut query = sqlx::query_as::<_, EntityRow>(&sql);
        for param in params {
            query = match param {
                Param::Text(text) => query.bind(text),
                Param::Number(number) => query.bind(number),
            };
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record = row.into_record(kind)?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        tracing::debug!(%kind, filter = %filter, matched = records.len(), "Store query");
        Ok(records)
    }

    pub async fn names(&self, kind: EntityKind) -> Result<Vec<String>, AppError> {
        sqlx::query_scalar(&format!("SELECT name FROM {} ORDER BY name", kind.table()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    pub async fn count(&self, kind: EntityKind) -> Result<i64, AppError> {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", kind.table()))
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

/// Declared fields stored in their own column, besides the `name` key.
fn attribute_fields(kind: EntityKind) -> impl Iterator<Item = Field> {
    kind.fields().iter().copied().filter(|f| *f != Field::Name)
}

fn upsert_sql(kind: EntityKind) -> String {
    let columns: Vec<&str> = std::iter::once("name")
        .chain(attribute_fields(kind).map(|f| f.column()))
        .chain(SOURCE_COLUMNS)
        .collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let updates = columns[1..]
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders}) ON CONFLICT(name) DO UPDATE SET {updates}",
        kind.table(),
        columns.join(", ")
    )
}

enum Param {
    Text(String),
    Number(f64),
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct EntityRow {
    name: String,
    page_id: i64,
    page_title: String,
    fetched_at: DateTime<Utc>,
    content_hash: String,
    attributes: String,
}

impl EntityRow {
    fn into_record(self, kind: EntityKind) -> Result<EntityRecord, AppError> {
        let attributes: BTreeMap<Field, AttributeValue> = serde_json::from_str(&self.attributes)
            .map_err(|e| {
                AppError::DatabaseError(format!("Corrupt attributes for {kind} '{}': {e}", self.name))
            })?;
        Ok(EntityRecord {
            kind,
            name: self.name,
            attributes,
            source: RecordSource {
                page_id: PageId(self.page_id as u64),
                title: self.page_title,
                fetched_at: self.fetched_at,
                content_hash: self.content_hash,
            },
        })
    }
}

// -- Trait implementation --

impl RecordStore for EntityRepository {
    async fn upsert(&self, record: &EntityRecord) -> Result<UpsertOutcome, AppError> {
        EntityRepository::upsert(self, record).await
    }

    async fn get(&self, kind: EntityKind, name: &str) -> Result<Option<EntityRecord>, AppError> {
        EntityRepository::get(self, kind, name).await
    }

    async fn query(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<EntityRecord>, AppError> {
        EntityRepository::query(self, kind, filter).await
    }

    async fn names(&self, kind: EntityKind) -> Result<Vec<String>, AppError> {
        EntityRepository::names(self, kind).await
    }

    async fn count(&self, kind: EntityKind) -> Result<i64, AppError> {
        EntityRepository::count(self, kind).await
    }
}
