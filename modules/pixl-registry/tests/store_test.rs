//! Integration tests for the Durable Registry. Require a Postgres instance.
//! Set DATABASE_TEST_URL or these tests are skipped.

use chrono::{NaiveDate, Utc};
use pixl_registry::{Registry, StudyInfo};
use sqlx::PgPool;

async fn test_registry() -> Option<Registry> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS extracts (
            extract_id  BIGSERIAL   PRIMARY KEY,
            slug        TEXT        NOT NULL UNIQUE,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(&pool)
    .await
    .ok()?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            image_id          BIGSERIAL   PRIMARY KEY,
            extract_id        BIGINT      NOT NULL REFERENCES extracts(extract_id),
            mrn               TEXT        NOT NULL,
            accession_number  TEXT        NOT NULL,
            study_date        DATE        NOT NULL,
            study_uid         TEXT,
            pseudo_study_uid  TEXT        UNIQUE,
            exported_at       TIMESTAMPTZ,
            UNIQUE (extract_id, mrn, accession_number, study_date)
        )
        "#,
    )
    .execute(&pool)
    .await
    .ok()?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_rates (
            queue_name    TEXT             PRIMARY KEY,
            rate_per_sec  DOUBLE PRECISION NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await
    .ok()?;

    sqlx::query("TRUNCATE images, extracts RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .ok()?;
    sqlx::query("TRUNCATE queue_rates").execute(&pool).await.ok()?;

    Some(Registry::new(pool))
}

fn mint_uid(seed: &str) -> impl Fn() -> String + '_ {
    move || format!("2.25.{}", seed)
}

#[tokio::test]
async fn ensure_project_creates_once() {
    let Some(registry) = test_registry().await else {
        return;
    };

    let (extract, created) = registry.ensure_project("proj-a").await.unwrap();
    assert!(created);
    assert_eq!(extract.slug, "proj-a");

    let (extract2, created2) = registry.ensure_project("proj-a").await.unwrap();
    assert!(!created2);
    assert_eq!(extract2.extract_id, extract.extract_id);
}

#[tokio::test]
async fn new_project_passes_all_messages_unconditionally() {
    let Some(registry) = test_registry().await else {
        return;
    };

    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let studies = vec![
        ("M1".to_string(), "A1".to_string(), date),
        ("M2".to_string(), "A2".to_string(), date),
    ];

    let unexported = registry
        .filter_unexported("brand-new-project", studies.clone())
        .await
        .unwrap();
    assert_eq!(unexported.len(), 2);
}

#[tokio::test]
async fn filter_unexported_skips_previously_exported() {
    let Some(registry) = test_registry().await else {
        return;
    };

    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    registry.ensure_project("proj-b").await.unwrap();

    let study = StudyInfo {
        mrn: "M1".into(),
        accession_number: "A1".into(),
        study_date: date,
        study_uid: None,
    };

    // first pass inserts the image row
    let first = registry
        .filter_unexported("proj-b", vec![("M1".into(), "A1".into(), date)])
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    let pseudo_uid = registry
        .assign_or_fetch_pseudo_uid("proj-b", &study, mint_uid("111"))
        .await
        .unwrap();
    registry
        .record_export(&pseudo_uid, Utc::now())
        .await
        .unwrap();

    let second = registry
        .filter_unexported("proj-b", vec![("M1".into(), "A1".into(), date)])
        .await
        .unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn assign_pseudo_uid_is_stable_across_calls() {
    let Some(registry) = test_registry().await else {
        return;
    };

    let date = NaiveDate::from_ymd_opt(2024, 2, 2).unwrap();
    registry.ensure_project("proj-c").await.unwrap();
    registry
        .filter_unexported("proj-c", vec![("M9".into(), "A9".into(), date)])
        .await
        .unwrap();

    let study = StudyInfo {
        mrn: "M9".into(),
        accession_number: "A9".into(),
        study_date: date,
        study_uid: Some("1.2.3.4".into()),
    };

    let first = registry
        .assign_or_fetch_pseudo_uid("proj-c", &study, mint_uid("222"))
        .await
        .unwrap();
    let second = registry
        .assign_or_fetch_pseudo_uid("proj-c", &study, mint_uid("333"))
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn assign_pseudo_uid_discards_unregistered_study() {
    let Some(registry) = test_registry().await else {
        return;
    };

    registry.ensure_project("proj-d").await.unwrap();
    let study = StudyInfo {
        mrn: "unknown".into(),
        accession_number: "unknown".into(),
        study_date: NaiveDate::from_ymd_opt(2024, 3, 3).unwrap(),
        study_uid: None,
    };

    let err = registry
        .assign_or_fetch_pseudo_uid("proj-d", &study, mint_uid("444"))
        .await
        .unwrap_err();
    assert!(matches!(err, pixl_common::PixlOutcome::Discard(_)));
}

#[tokio::test]
async fn record_export_twice_is_already_exported() {
    let Some(registry) = test_registry().await else {
        return;
    };

    let date = NaiveDate::from_ymd_opt(2024, 4, 4).unwrap();
    registry.ensure_project("proj-e").await.unwrap();
    registry
        .filter_unexported("proj-e", vec![("M5".into(), "A5".into(), date)])
        .await
        .unwrap();

    let study = StudyInfo {
        mrn: "M5".into(),
        accession_number: "A5".into(),
        study_date: date,
        study_uid: None,
    };
    let pseudo_uid = registry
        .assign_or_fetch_pseudo_uid("proj-e", &study, mint_uid("555"))
        .await
        .unwrap();

    registry
        .record_export(&pseudo_uid, Utc::now())
        .await
        .unwrap();

    let err = registry
        .record_export(&pseudo_uid, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, pixl_common::PixlOutcome::AlreadyExported));
}

#[tokio::test]
async fn exported_images_only_returns_exported() {
    let Some(registry) = test_registry().await else {
        return;
    };

    let date = NaiveDate::from_ymd_opt(2024, 5, 5).unwrap();
    registry.ensure_project("proj-f").await.unwrap();
    registry
        .filter_unexported(
            "proj-f",
            vec![
                ("M6".into(), "A6".into(), date),
                ("M7".into(), "A7".into(), date),
            ],
        )
        .await
        .unwrap();

    let study = StudyInfo {
        mrn: "M6".into(),
        accession_number: "A6".into(),
        study_date: date,
        study_uid: None,
    };
    let pseudo_uid = registry
        .assign_or_fetch_pseudo_uid("proj-f", &study, mint_uid("666"))
        .await
        .unwrap();
    registry.record_export(&pseudo_uid, Utc::now()).await.unwrap();

    let exported = registry.exported_images("proj-f").await.unwrap();
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0].mrn, "M6");
}

#[tokio::test]
async fn queue_rate_round_trips_and_updates() {
    let Some(registry) = test_registry().await else {
        return;
    };

    assert_eq!(registry.get_queue_rate("imaging").await.unwrap(), None);

    registry.set_queue_rate("imaging", 2.0).await.unwrap();
    assert_eq!(registry.get_queue_rate("imaging").await.unwrap(), Some(2.0));

    registry.set_queue_rate("imaging", 5.0).await.unwrap();
    assert_eq!(registry.get_queue_rate("imaging").await.unwrap(), Some(5.0));
}
