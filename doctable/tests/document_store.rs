use bson::{Bson, doc};
use doctable::{memory::InMemoryStore, prelude::*};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

async fn users() -> Table<InMemoryStore> {
    Table::provision(InMemoryStore::new(), Schema::builder("users").index("email").build())
        .await
        .unwrap()
}

fn record(document: bson::Document) -> Record {
    Record::from(document)
}

#[tokio::test]
async fn set_then_get_returns_the_record_with_its_identifier() {
    let users = users().await;

    let stored = users
        .set(None, record(doc! { "id": "u1", "name": "Alice" }), SetOptions::default())
        .await
        .unwrap();
    let fetched = users.get("u1").await.unwrap().unwrap();

    assert_eq!(stored, fetched);
    assert_eq!(fetched.into_document(), doc! { "_id": "u1", "id": "u1", "name": "Alice" });
}

#[tokio::test]
async fn explicit_identifier_overrides_record_field() {
    let users = users().await;

    let stored = users
        .set(Some("explicit".into()), record(doc! { "id": "ignored", "n": 1 }), SetOptions::default())
        .await
        .unwrap();

    assert_eq!(stored.primary_id(), Some(&Bson::from("explicit")));
    assert!(users.has("explicit").await.unwrap());
    assert!(!users.has("ignored").await.unwrap());
}

#[tokio::test]
async fn set_without_upsert_does_not_create() {
    let users = users().await;

    users
        .set(Some("u1".into()), record(doc! { "n": 1 }), SetOptions { upsert: false })
        .await
        .unwrap();

    assert!(!users.has("u1").await.unwrap());
}

#[tokio::test]
async fn set_replaces_the_whole_document() {
    let users = users().await;
    users.upsert(record(doc! { "id": "u1", "a": 1, "b": 2 })).await.unwrap();

    users.upsert(record(doc! { "id": "u1", "c": 3 })).await.unwrap();

    let fetched = users.get("u1").await.unwrap().unwrap();
    assert!(fetched.get("a").is_none());
    assert_eq!(fetched.get("c"), Some(&Bson::Int32(3)));
}

#[tokio::test]
async fn identity_operations_require_an_identifier() {
    let users = users().await;

    assert!(users.get("").await.unwrap_err().is_precondition());
    assert!(users.has("").await.unwrap_err().is_precondition());
    assert!(users.delete("").await.unwrap_err().is_precondition());
    assert!(
        users
            .upsert(record(doc! { "name": "no id" }))
            .await
            .unwrap_err()
            .is_precondition()
    );
    assert!(
        users
            .update("", record(doc! { "a": 1 }), UpdateOptions::default())
            .await
            .unwrap_err()
            .is_precondition()
    );
    assert_eq!(users.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn delete_then_has_is_false() {
    let users = users().await;
    users.upsert(record(doc! { "id": "u1" })).await.unwrap();

    let deleted = users.delete("u1").await.unwrap();

    assert_eq!(deleted.into_document(), doc! { "_id": "u1", "id": "u1" });
    assert!(!users.has("u1").await.unwrap());
}

#[tokio::test]
async fn delete_of_a_missing_document_still_returns_its_identity() {
    let users = users().await;

    let deleted = users.delete(42).await.unwrap();

    assert_eq!(deleted.into_document(), doc! { "_id": 42, "id": 42 });
}

#[tokio::test]
async fn update_merges_fields_and_returns_the_new_document() {
    let users = users().await;
    users.upsert(record(doc! { "id": "u1", "name": "Alice", "age": 30 })).await.unwrap();

    let updated = users
        .update("u1", record(doc! { "age": 31, "city": "Lisbon" }), UpdateOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.get("name"), Some(&Bson::from("Alice")));
    assert_eq!(updated.get("age"), Some(&Bson::Int32(31)));
    assert_eq!(updated.get("city"), Some(&Bson::from("Lisbon")));
}

#[tokio::test]
async fn update_upserts_missing_documents_by_default() {
    let users = users().await;

    let created = users
        .update("u9", record(doc! { "name": "New" }), UpdateOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(created.into_document(), doc! { "_id": "u9", "name": "New" });
}

#[tokio::test]
async fn update_without_upsert_reports_missing_documents_as_none() {
    let users = users().await;

    let result = users
        .update("ghost", record(doc! { "name": "x" }), UpdateOptions { upsert: false })
        .await
        .unwrap();

    assert!(result.is_none());
    assert!(!users.has("ghost").await.unwrap());
}

#[tokio::test]
async fn insert_twice_fails_but_upsert_twice_keeps_one_document() {
    let users = users().await;

    users.create(record(doc! { "id": "a" })).await.unwrap();
    let err = users.create(record(doc! { "id": "a" })).await.unwrap_err();
    assert!(err.is_duplicate());

    users.upsert(record(doc! { "id": "b", "v": 1 })).await.unwrap();
    users.upsert(record(doc! { "id": "b", "v": 2 })).await.unwrap();

    assert_eq!(users.count(Some(Filter::eq("_id", "b"))).await.unwrap(), 1);
    assert_eq!(users.count(None).await.unwrap(), 2);
}

#[tokio::test]
async fn insert_without_identifier_gets_one_assigned() {
    let users = users().await;

    let inserted = users.insert(record(doc! { "name": "anon" })).await.unwrap();
    let id = RecordId::new(inserted.primary_id().cloned().unwrap()).unwrap();

    assert!(users.has(id).await.unwrap());
}

#[tokio::test]
async fn create_copies_external_identifier() {
    let users = users().await;

    let created = users.create(record(doc! { "id": 7, "name": "seven" })).await.unwrap();

    assert_eq!(created.primary_id(), Some(&Bson::Int32(7)));
    assert!(users.has(7).await.unwrap());
}

#[tokio::test]
async fn insert_many_is_ordered_and_not_atomic() {
    let users = users().await;

    let err = users
        .insert_many(vec![
            record(doc! { "id": "a" }),
            record(doc! { "id": "b" }),
            record(doc! { "id": "a" }),
            record(doc! { "id": "c" }),
        ])
        .await
        .unwrap_err();

    assert!(err.is_duplicate());
    assert!(users.has("a").await.unwrap());
    assert!(users.has("b").await.unwrap());
    assert!(!users.has("c").await.unwrap());
}

#[tokio::test]
async fn insert_many_promotes_identifiers() {
    let users = users().await;

    let inserted = users
        .insert_many(vec![record(doc! { "id": "x" }), record(doc! { "_id": "y", "id": "other" })])
        .await
        .unwrap();

    assert_eq!(inserted[0].primary_id(), Some(&Bson::from("x")));
    assert_eq!(inserted[1].primary_id(), Some(&Bson::from("y")));
    assert!(users.insert_many(Vec::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn upsert_many_reports_bulk_counts() {
    let users = users().await;
    users.upsert(record(doc! { "id": "a", "v": 1 })).await.unwrap();

    let summary = users
        .upsert_many(vec![
            record(doc! { "id": "a", "v": 2 }),
            record(doc! { "id": "b", "v": 1 }),
            record(doc! { "id": "c", "v": 1 }),
        ])
        .await
        .unwrap();

    assert_eq!(summary, BulkWriteSummary { matched: 1, modified: 1, upserted: 2 });
    assert_eq!(users.count(None).await.unwrap(), 3);
}

#[tokio::test]
async fn upsert_many_rejects_the_batch_before_writing() {
    let users = users().await;

    let err = users
        .upsert_many(vec![record(doc! { "id": "a" }), record(doc! { "name": "no id" })])
        .await
        .unwrap_err();

    assert!(err.is_precondition());
    assert_eq!(users.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn delete_all_removes_listed_identifiers() {
    let users = users().await;
    for id in ["a", "b", "c"] {
        users.upsert(record(doc! { "id": id })).await.unwrap();
    }

    let deleted = users.delete_all(["a", "c", "missing"]).await.unwrap();

    assert_eq!(deleted, 2);
    assert_eq!(users.list().await.unwrap().len(), 1);
    assert_eq!(users.delete_all(Vec::<&str>::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn typed_reads_deserialize_records() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: String,
        name: String,
    }

    let users = users().await;
    let alice = User { id: "u1".into(), name: "Alice".into() };
    users.upsert(Record::from_serializable(&alice).unwrap()).await.unwrap();

    let fetched: Option<User> = users.get_as("u1").await.unwrap();

    assert_eq!(fetched, Some(alice));
}

#[tokio::test]
async fn concurrent_upserts_are_all_applied() {
    let users = users().await;

    let writes = (0..20).map(|i| {
        let users = users.clone();
        async move { users.upsert(record(doc! { "id": i, "n": i })).await }
    });
    for result in join_all(writes).await {
        result.unwrap();
    }

    assert_eq!(users.count(None).await.unwrap(), 20);
}
