use chrono::{DateTime, TimeZone, Utc};
use harvest_core::entity::{EntityRecord, RecordSource};
use harvest_core::models::{PageId, PageTask, RawPage};
use harvest_core::schema::EntityKind;
use harvest_db::{Database, EntityRepository};
use sqlx::sqlite::SqlitePoolOptions;

pub const THRALL_WIKITEXT: &str = "{{Thrall
| name = Dalinsia Sen
| id = 10012
| class = Fighter
| Health = 1,250
| levelCurve = Fast
| NPCDRArmor = 15
| NPCKillXP = 540
| gender = Female
| thrallable = yes
| race = [[Nordheimer]]
| fac = [[The Relic Hunters|Relic Hunters]]
}}
==Notes==
* Can be captured at the [[Sinkhole]].

[[Category:Thralls]]
";

/// Fresh in-memory database with migrations applied.
///
/// A single long-lived connection keeps the in-memory database alive for
/// the whole test.
pub async fn setup_test_db() -> EntityRepository {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    let db = Database::from_pool(pool);
    db.migrate().await.expect("Failed to run migrations");
    db.entity_repo()
}

pub fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn raw_page(id: u64, title: &str, text: &str) -> RawPage {
    RawPage::fetched_at(&PageTask::new(id, title), text.to_string(), test_time())
}

pub fn record(kind: EntityKind, name: &str) -> EntityRecord {
    EntityRecord::new(
        kind,
        name,
        RecordSource {
            page_id: PageId(1),
            title: name.to_string(),
            fetched_at: test_time(),
            content_hash: "0".repeat(64),
        },
    )
}
