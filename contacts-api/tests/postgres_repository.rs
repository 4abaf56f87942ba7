use std::sync::Arc;

use contacts_api::cache::NoopInvalidator;
use contacts_api::config::ContactsConfig;
use contacts_api::contacts::types::{AttributeValue, NewAttributeKey};
use contacts_api::contacts::{
    AttributeMap, ContactImporter, ContactRepository, DuplicateAction, ImportError, ImportRecord,
    PgContactRepository, ValidationError,
};
use contacts_api::test_support::{TestDatabase, TestDatabaseError, TestFixtures};

async fn provision(test_name: &str) -> Option<TestDatabase> {
    match TestDatabase::new_from_env().await {
        Ok(db) => Some(db),
        Err(TestDatabaseError::MissingUrl) => {
            eprintln!("skipping {test_name}: TEST_DATABASE_URL not set");
            None
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    }
}

fn record(pairs: &[(&str, &str)]) -> ImportRecord {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn attribute_key_creation_is_idempotent() {
    let Some(test_db) = provision("attribute_key_creation_is_idempotent").await else {
        return;
    };
    let repo = PgContactRepository::new(test_db.pool_clone());
    let env = repo.create_environment().await.expect("environment created");

    let keys = vec![
        NewAttributeKey {
            key: "email".to_string(),
            name: "Email".to_string(),
        },
        NewAttributeKey {
            key: "plan".to_string(),
            name: "Plan".to_string(),
        },
    ];

    assert_eq!(repo.create_attribute_keys(env.id, &keys).await.unwrap(), 2);
    assert_eq!(repo.create_attribute_keys(env.id, &keys).await.unwrap(), 0);

    let listed = repo.list_attribute_keys(env.id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|key| key.environment_id == env.id));

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn upsert_keeps_unmentioned_attributes_and_replace_drops_them() {
    let Some(test_db) =
        provision("upsert_keeps_unmentioned_attributes_and_replace_drops_them").await
    else {
        return;
    };
    let pool = test_db.pool_clone();
    let repo = PgContactRepository::new(pool.clone());
    let env = repo.create_environment().await.unwrap();

    repo.create_attribute_keys(
        env.id,
        &[
            NewAttributeKey {
                key: "email".to_string(),
                name: "email".to_string(),
            },
            NewAttributeKey {
                key: "plan".to_string(),
                name: "plan".to_string(),
            },
            NewAttributeKey {
                key: "city".to_string(),
                name: "city".to_string(),
            },
        ],
    )
    .await
    .unwrap();
    let keys = repo.list_attribute_keys(env.id).await.unwrap();
    let id_of = |name: &str| {
        keys.iter()
            .find(|key| key.key == name)
            .map(|key| key.id)
            .unwrap()
    };

    let contact = repo
        .create_contact(
            env.id,
            &[
                AttributeValue::new(id_of("email"), "a@x.com"),
                AttributeValue::new(id_of("plan"), "free"),
                AttributeValue::new(id_of("city"), "Oslo"),
            ],
        )
        .await
        .unwrap();

    let updated = repo
        .upsert_attributes(contact.id, &[AttributeValue::new(id_of("plan"), "pro")])
        .await
        .unwrap();
    assert_eq!(updated.attribute("plan"), Some("pro"));
    assert_eq!(updated.attribute("city"), Some("Oslo"));

    let replaced = repo
        .replace_attributes(
            contact.id,
            &[
                AttributeValue::new(id_of("email"), "a@x.com"),
                AttributeValue::new(id_of("plan"), "team"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(replaced.attribute("plan"), Some("team"));
    assert_eq!(replaced.attribute("city"), None);

    let stored = TestFixtures::new(&pool)
        .attribute_value_count(contact.id)
        .await
        .unwrap();
    assert_eq!(stored, 2);

    let found = repo
        .find_by_attribute_value_in(env.id, "email", &["a@x.com".to_string()])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, contact.id);

    assert!(repo.delete_contact(contact.id).await.unwrap());
    assert!(repo.get_contact(contact.id).await.unwrap().is_none());
    assert!(!repo.delete_contact(contact.id).await.unwrap());

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn import_pipeline_runs_against_postgres() {
    let Some(test_db) = provision("import_pipeline_runs_against_postgres").await else {
        return;
    };
    let pool = test_db.pool_clone();
    let environment_id = TestFixtures::new(&pool).insert_environment().await.unwrap();
    let repo = Arc::new(PgContactRepository::new(pool));
    let importer = ContactImporter::new(
        repo.clone(),
        Arc::new(NoopInvalidator),
        &ContactsConfig::default(),
    );

    let first = importer
        .import(
            vec![
                record(&[("email", "a@x.com"), ("userId", "u1"), ("plan", "free")]),
                record(&[("email", "b@x.com"), ("userId", "u2"), ("plan", "free")]),
            ],
            environment_id,
            DuplicateAction::Skip,
            &AttributeMap::new(),
        )
        .await
        .unwrap();
    assert_eq!(first.stats.created, 2);
    assert_eq!(first.stats.attribute_keys_created, 3);

    let second = importer
        .import(
            vec![
                record(&[("email", "a@x.com"), ("Tier", "gold")]),
                record(&[("email", "c@x.com")]),
            ],
            environment_id,
            DuplicateAction::Overwrite,
            &[("Tier".to_string(), "tier".to_string())].into_iter().collect(),
        )
        .await
        .unwrap();
    assert_eq!(second.stats.overwritten, 1);
    assert_eq!(second.stats.created, 1);
    assert_eq!(second.contacts[0].attribute("tier"), Some("gold"));
    assert_eq!(second.contacts[0].attribute("plan"), None);

    let collision = importer
        .import(
            vec![record(&[("email", "d@x.com"), ("userId", "u2")])],
            environment_id,
            DuplicateAction::Update,
            &AttributeMap::new(),
        )
        .await;
    assert!(matches!(
        collision,
        Err(ImportError::Validation(ValidationError::UserIdExists(ref id))) if id == "u2"
    ));

    let contacts = repo.list_contacts(environment_id, 50, 0).await.unwrap();
    assert_eq!(contacts.len(), 3);

    test_db.close().await.expect("failed to drop test database");
}
