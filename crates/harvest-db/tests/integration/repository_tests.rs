use harvest_core::entity::{AttributeValue, Gender, LevelRate, ThrallClass};
use harvest_core::error::AppError;
use harvest_core::extractor::Extractor;
use harvest_core::format::Formatter;
use harvest_core::loader::{LoadReport, Loader};
use harvest_core::models::PageId;
use harvest_core::query::Filter;
use harvest_core::schema::{EntityKind, Field};
use harvest_core::traits::{RecordStore, UpsertOutcome};

use chrono::Duration;

use crate::common::{THRALL_WIKITEXT, raw_page, record, setup_test_db, test_time};

fn thrall(name: &str, class: ThrallClass, gender: Gender, health: f64) -> harvest_core::EntityRecord {
    record(EntityKind::Thrall, name)
        .with(Field::Class, AttributeValue::Class(class))
        .with(Field::Gender, AttributeValue::Gender(gender))
        .with(Field::Health, AttributeValue::Number(health))
}

#[tokio::test]
async fn upsert_and_get_round_trip() {
    let repo = setup_test_db().await;
    let page = raw_page(7, "Dalinsia Sen", THRALL_WIKITEXT);
    let record = Extractor::extract(&page).expect("thrall page should extract");

    assert_eq!(repo.upsert(&record).await.unwrap(), UpsertOutcome::Inserted);

    let stored = repo
        .get(EntityKind::Thrall, "Dalinsia Sen")
        .await
        .unwrap()
        .expect("Should find the thrall");
    assert_eq!(stored, record);
    assert_eq!(
        stored.get(Field::Health),
        Some(&AttributeValue::Number(1250.0))
    );
    assert!(repo.get(EntityKind::Npc, "Dalinsia Sen").await.unwrap().is_none());
}

#[tokio::test]
async fn identical_upsert_is_unchanged_and_changed_one_updates() {
    let repo = setup_test_db().await;
    let v1 = record(EntityKind::Npc, "Guard")
        .with(Field::Faction, AttributeValue::Text("Black Hand".into()));
    let v2 = record(EntityKind::Npc, "Guard")
        .with(Field::Faction, AttributeValue::Text("Relic Hunters".into()));

    assert_eq!(repo.upsert(&v1).await.unwrap(), UpsertOutcome::Inserted);
    assert_eq!(repo.upsert(&v1).await.unwrap(), UpsertOutcome::Unchanged);
    assert_eq!(repo.upsert(&v2).await.unwrap(), UpsertOutcome::Updated);

    assert_eq!(repo.count(EntityKind::Npc).await.unwrap(), 1);
    let stored = repo.get(EntityKind::Npc, "Guard").await.unwrap().unwrap();
    assert_eq!(stored.text(Field::Faction).as_deref(), Some("Relic Hunters"));
}

#[tokio::test]
async fn unchanged_upsert_refreshes_source() {
    let repo = setup_test_db().await;
    let first = record(EntityKind::Npc, "Guard")
        .with(Field::Faction, AttributeValue::Text("Black Hand".into()));
    let mut refetched = first.clone();
    refetched.source.page_id = PageId(42);
    refetched.source.fetched_at = test_time() + Duration::days(3);
    refetched.source.content_hash = "f".repeat(64);

    assert_eq!(repo.upsert(&first).await.unwrap(), UpsertOutcome::Inserted);
    assert_eq!(repo.upsert(&refetched).await.unwrap(), UpsertOutcome::Unchanged);

    let stored = repo.get(EntityKind::Npc, "Guard").await.unwrap().unwrap();
    assert_eq!(stored, refetched);
    assert_eq!(stored.source.page_id, PageId(42));
}

#[tokio::test]
async fn kinds_live_in_separate_tables() {
    let repo = setup_test_db().await;
    repo.upsert(&record(EntityKind::Creature, "Wolf")).await.unwrap();
    repo.upsert(&record(EntityKind::Pet, "Wolf")).await.unwrap();
    repo.upsert(&record(EntityKind::Pet, "Baby Rhino")).await.unwrap();

    assert_eq!(repo.count(EntityKind::Creature).await.unwrap(), 1);
    assert_eq!(repo.count(EntityKind::Thrall).await.unwrap(), 0);
    assert_eq!(
        repo.names(EntityKind::Pet).await.unwrap(),
        vec!["Baby Rhino".to_string(), "Wolf".to_string()]
    );
}

#[tokio::test]
async fn equality_filters_ignore_case() {
    let repo = setup_test_db().await;
    repo.upsert(&thrall("Velda", ThrallClass::Archer, Gender::Female, 900.0))
        .await
        .unwrap();
    repo.upsert(&thrall("Ula", ThrallClass::Fighter, Gender::Female, 1400.0))
        .await
        .unwrap();
    repo.upsert(&thrall("Zath", ThrallClass::Fighter, Gender::Male, 1100.0))
        .await
        .unwrap();

    let women = repo
        .query(EntityKind::Thrall, &Filter::parse("Gender=FEMALE").unwrap())
        .await
        .unwrap();
    let names: Vec<_> = women.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Ula", "Velda"]);

    let by_name = repo
        .query(EntityKind::Thrall, &Filter::parse("name=zath").unwrap())
        .await
        .unwrap();
    assert_eq!(by_name.len(), 1);

    let everyone = repo.query(EntityKind::Thrall, &Filter::all()).await.unwrap();
    assert_eq!(everyone.len(), 3);
}

#[tokio::test]
async fn equality_filters_fold_non_ascii_case() {
    let repo = setup_test_db().await;
    repo.upsert(
        &thrall("Hrothgar", ThrallClass::Fighter, Gender::Male, 1000.0)
            .with(Field::Race, AttributeValue::Text("Ásgardian".into())),
    )
    .await
    .unwrap();
    repo.upsert(
        &thrall("Velda", ThrallClass::Archer, Gender::Female, 900.0)
            .with(Field::Race, AttributeValue::Text("Nordheimer".into())),
    )
    .await
    .unwrap();

    let found = repo
        .query(EntityKind::Thrall, &Filter::parse("Race=ásgardian").unwrap())
        .await
        .unwrap();
    let names: Vec<_> = found.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Hrothgar"]);

    let found = repo
        .query(EntityKind::Thrall, &Filter::parse("Race=ÁSGARDIAN AND Gender=male").unwrap())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn numeric_comparisons() {
    let repo = setup_test_db().await;
    repo.upsert(&thrall("Velda", ThrallClass::Archer, Gender::Female, 900.0))
        .await
        .unwrap();
    repo.upsert(&thrall("Ula", ThrallClass::Fighter, Gender::Female, 1400.0))
        .await
        .unwrap();
    repo.upsert(&thrall("Zath", ThrallClass::Fighter, Gender::Male, 1100.0))
        .await
        .unwrap();
    repo.upsert(
        &record(EntityKind::Thrall, "Odd").with(Field::Health, AttributeValue::Text("lots".into())),
    )
    .await
    .unwrap();

    let strong = repo
        .query(EntityKind::Thrall, &Filter::parse("Health>=1,100").unwrap())
        .await
        .unwrap();
    let names: Vec<_> = strong.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Ula", "Zath"]);

    let weak = repo
        .query(
            EntityKind::Thrall,
            &Filter::parse("Health<1000 AND Gender=female").unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(weak.len(), 1);
    assert_eq!(weak[0].name, "Velda");
}

#[tokio::test]
async fn filter_on_undeclared_field_is_a_query_error() {
    let repo = setup_test_db().await;
    let err = repo
        .query(EntityKind::Creature, &Filter::parse("Gender=female").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QueryError(_)));
}

#[tokio::test]
async fn end_to_end_thrall_is_queryable() {
    let repo = setup_test_db().await;
    let pages = vec![
        raw_page(1, "Dalinsia Sen", THRALL_WIKITEXT),
        raw_page(2, "Iron Bar", "{{Item|name=Iron Bar}}"),
    ];
    let records = Formatter::format_all(&pages);

    let loader = Loader::new(repo.clone());
    let report = LoadReport::from_outcomes(&loader.load(records.iter()).await.unwrap());
    assert_eq!(report.inserted, 1);

    let stored = repo
        .get(EntityKind::Thrall, "Dalinsia Sen")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get(Field::Gender), Some(&AttributeValue::Gender(Gender::Female)));
    assert_eq!(
        stored.get(Field::LevelRate),
        Some(&AttributeValue::LevelRate(LevelRate::Fast))
    );

    for expr in ["Gender=female", "Class=fighter AND Level Rate=fast"] {
        let hits = repo
            .query(EntityKind::Thrall, &Filter::parse(expr).unwrap())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1, "{expr}");
        assert_eq!(hits[0].name, "Dalinsia Sen");
    }

    let miss = repo
        .query(EntityKind::Thrall, &Filter::parse("Class=archer").unwrap())
        .await
        .unwrap();
    assert!(miss.is_empty());
}
