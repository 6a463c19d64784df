use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use tycho_store::{
    Filter, IdValue, ObjectQuery, PredicateKind, ReadOptions, Sort, Store, StoreOptions, TypeHint,
    WriteOptions,
};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct ValueC {
    int_property: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct ValueItem {
    float_property: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct Widget {
    id: String,
    name: String,
    value_c: ValueC,
    values: Vec<ValueItem>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct Gadget {
    id: String,
    title: String,
}

async fn open_store() -> (tempfile::TempDir, Store) {
    let dir = tempdir().expect("create temp dir");
    let options = StoreOptions::new().directory(dir.path()).filename("store_tests.db");
    let store = Store::open(options).await.expect("open store");
    store.register_with_expression::<Widget>(tycho_store::Path::parse("id"), TypeHint::Text).unwrap();
    store.register_with_expression::<Gadget>(tycho_store::Path::parse("id"), TypeHint::Text).unwrap();
    (dir, store)
}

fn widget(id: &str, name: &str, int_property: i64, floats: &[f64]) -> Widget {
    Widget {
        id: id.to_string(),
        name: name.to_string(),
        value_c: ValueC { int_property },
        values: floats.iter().map(|f| ValueItem { float_property: *f }).collect(),
    }
}

#[tokio::test]
async fn round_trip_preserves_the_written_value() {
    let (_dir, store) = open_store().await;
    let w = widget("w1", "alpha", 1, &[1.0, 2.0]);
    store.write_object(&w, WriteOptions::new()).await.unwrap();

    let read: Widget = store
        .read_object_by_id(&IdValue::from("w1"), ReadOptions::new())
        .await
        .unwrap()
        .expect("object should exist");
    assert_eq!(read, w);
}

#[tokio::test]
async fn read_object_enforces_at_most_one_match() {
    let (_dir, store) = open_store().await;

    let filter = Filter::new().eq("name", "dup");
    let not_found = store.read_object::<Widget>(filter.clone(), ReadOptions::new()).await;
    assert!(matches!(not_found, Err(tycho_store::StoreError::NotFound)));

    store.write_object(&widget("w1", "dup", 1, &[]), WriteOptions::new()).await.unwrap();
    let single = store.read_object::<Widget>(filter.clone(), ReadOptions::new()).await;
    assert!(single.is_ok());

    store.write_object(&widget("w2", "dup", 2, &[]), WriteOptions::new()).await.unwrap();
    let too_many = store.read_object::<Widget>(filter, ReadOptions::new()).await;
    assert!(matches!(too_many, Err(tycho_store::StoreError::TooMany)));
}

#[tokio::test]
async fn partitions_isolate_documents_with_the_same_id() {
    let (_dir, store) = open_store().await;
    let a = widget("shared", "in-a", 1, &[]);
    let b = widget("shared", "in-b", 2, &[]);

    store.write_object(&a, WriteOptions::new().partition("tenant-a")).await.unwrap();
    store.write_object(&b, WriteOptions::new().partition("tenant-b")).await.unwrap();

    let from_a: Widget = store
        .read_object_by_id(&IdValue::from("shared"), ReadOptions::new().partition("tenant-a"))
        .await
        .unwrap()
        .unwrap();
    let from_b: Widget = store
        .read_object_by_id(&IdValue::from("shared"), ReadOptions::new().partition("tenant-b"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from_a, a);
    assert_eq!(from_b, b);

    store
        .delete_object::<Widget>(&IdValue::from("shared"), Some("tenant-a"), &CancellationToken::new())
        .await
        .unwrap();
    let still_there: Option<Widget> = store
        .read_object_by_id(&IdValue::from("shared"), ReadOptions::new().partition("tenant-b"))
        .await
        .unwrap();
    assert!(still_there.is_some());
}

#[tokio::test]
async fn indexed_and_unindexed_paths_return_the_same_rows() {
    let (_dir, store) = open_store().await;
    for i in 0..50i64 {
        store
            .write_object(&widget(&format!("w{i}"), "idx", i, &[]), WriteOptions::new())
            .await
            .unwrap();
    }

    let filter = || Filter::new().ge("value_c.int_property", 30i64);
    let before: Vec<Widget> = store
        .read_objects(ObjectQuery::new().filter(filter()))
        .await
        .unwrap();

    store
        .create_index::<Widget>(tycho_store::Path::parse("value_c.int_property"), "by_int", &CancellationToken::new())
        .await
        .unwrap();

    let after: Vec<Widget> = store
        .read_objects(ObjectQuery::new().filter(filter()))
        .await
        .unwrap();

    let mut before_ids: Vec<_> = before.iter().map(|w| w.id.clone()).collect();
    let mut after_ids: Vec<_> = after.iter().map(|w| w.id.clone()).collect();
    before_ids.sort();
    after_ids.sort();
    assert_eq!(before_ids, after_ids);
    assert_eq!(before_ids.len(), 20);

    let dropped = store.drop_index::<Widget>("by_int", &CancellationToken::new()).await.unwrap();
    assert!(dropped);
}

#[tokio::test]
async fn adding_a_conjunct_never_grows_the_result_set() {
    let (_dir, store) = open_store().await;
    for i in 0..30i64 {
        store
            .write_object(&widget(&format!("w{i}"), "mono", i, &[]), WriteOptions::new())
            .await
            .unwrap();
    }

    let wide = Filter::new().ge("value_c.int_property", 10i64);
    let narrow = Filter::new().ge("value_c.int_property", 10i64).and().lt("value_c.int_property", 20i64);

    let wide_count = store.count_objects::<Widget>(None, Some(wide), &CancellationToken::new()).await.unwrap();
    let narrow_count = store.count_objects::<Widget>(None, Some(narrow), &CancellationToken::new()).await.unwrap();
    assert!(narrow_count <= wide_count);
    assert_eq!(narrow_count, 10);
    assert_eq!(wide_count, 20);
}

#[tokio::test]
async fn writing_the_same_id_twice_replaces_rather_than_duplicates() {
    let (_dir, store) = open_store().await;
    let first = widget("w1", "first", 1, &[]);
    let inserted = store.write_object(&first, WriteOptions::new()).await.unwrap();
    assert!(inserted);

    let second = widget("w1", "second", 2, &[]);
    let inserted_again = store.write_object(&second, WriteOptions::new()).await.unwrap();
    assert!(!inserted_again);

    let count = store.count_objects::<Widget>(None, None, &CancellationToken::new()).await.unwrap();
    assert_eq!(count, 1);
    let read: Widget = store.read_object_by_id(&IdValue::from("w1"), ReadOptions::new()).await.unwrap().unwrap();
    assert_eq!(read, second);
}

#[tokio::test]
async fn contains_predicate_escapes_like_wildcards() {
    let (_dir, store) = open_store().await;
    store.write_object(&widget("w1", "50%_off", 1, &[]), WriteOptions::new()).await.unwrap();
    store.write_object(&widget("w2", "50x_off", 2, &[]), WriteOptions::new()).await.unwrap();

    let literal_match = Filter::new().contains("name", "%_off");
    let matches: Vec<Widget> = store.read_objects(ObjectQuery::new().filter(literal_match)).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "w1");
}

#[tokio::test]
async fn same_id_on_distinct_types_does_not_collide() {
    let (_dir, store) = open_store().await;
    store.write_object(&widget("shared", "widget-name", 1, &[]), WriteOptions::new()).await.unwrap();
    store
        .write_object(&Gadget { id: "shared".to_string(), title: "gadget-title".to_string() }, WriteOptions::new())
        .await
        .unwrap();

    let w: Widget = store.read_object_by_id(&IdValue::from("shared"), ReadOptions::new()).await.unwrap().unwrap();
    let g: Gadget = store.read_object_by_id(&IdValue::from("shared"), ReadOptions::new()).await.unwrap().unwrap();
    assert_eq!(w.name, "widget-name");
    assert_eq!(g.title, "gadget-title");
}

#[tokio::test]
async fn concurrent_writes_and_list_any_and_indexed_filters_agree_on_counts() {
    let (_dir, store) = open_store().await;
    let store = Arc::new(store);

    let mut handles = Vec::with_capacity(1000);
    for i in 0..1000i64 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let w = widget(&format!("w{i}"), "bulk", i % 4, &[i as f64]);
            store
                .write_object(&w, WriteOptions::new().partition("bulk"))
                .await
                .expect("write should succeed");
        }));
    }
    for handle in handles {
        handle.await.expect("task should not panic");
    }

    let total = store.count_objects::<Widget>(Some("bulk"), None, &CancellationToken::new()).await.unwrap();
    assert_eq!(total, 1000);

    // exactly the records with float_property > 499.5, i.e. i in 500..1000.
    let list_any_filter = Filter::new().list_any(PredicateKind::Gt, "values", "float_property", 499.5);
    let list_any_matches: Vec<Widget> = store
        .read_objects(ObjectQuery::new().partition("bulk").filter(list_any_filter))
        .await
        .unwrap();
    assert_eq!(list_any_matches.len(), 500);

    store
        .create_index::<Widget>(tycho_store::Path::parse("value_c.int_property"), "by_int", &CancellationToken::new())
        .await
        .unwrap();

    // exactly the records with int_property != 0, i.e. i % 4 != 0: 750 of 1000.
    let indexed_filter = Filter::new().ge("value_c.int_property", 1i64);
    let indexed_matches = store
        .count_objects::<Widget>(Some("bulk"), Some(indexed_filter), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(indexed_matches, 750);
}

#[tokio::test]
async fn read_first_object_respects_sort_direction() {
    let (_dir, store) = open_store().await;
    for i in 0..5i64 {
        store.write_object(&widget(&format!("w{i}"), "sorted", i, &[]), WriteOptions::new()).await.unwrap();
    }

    let highest: Widget = store
        .read_first_object(None, Some(Sort::new().desc("value_c.int_property", TypeHint::Numeric)), ReadOptions::new())
        .await
        .unwrap()
        .expect("at least one object");
    assert_eq!(highest.value_c.int_property, 4);

    let lowest: Widget = store
        .read_first_object(None, Some(Sort::new().asc("value_c.int_property", TypeHint::Numeric)), ReadOptions::new())
        .await
        .unwrap()
        .expect("at least one object");
    assert_eq!(lowest.value_c.int_property, 0);
}

#[tokio::test]
async fn delete_objects_removes_only_matching_rows() {
    let (_dir, store) = open_store().await;
    for i in 0..10i64 {
        store.write_object(&widget(&format!("w{i}"), "del", i, &[]), WriteOptions::new()).await.unwrap();
    }

    let result = store
        .delete_objects::<Widget>(None, Some(Filter::new().lt("value_c.int_property", 5i64)), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 5);

    let remaining = store.count_objects::<Widget>(None, None, &CancellationToken::new()).await.unwrap();
    assert_eq!(remaining, 5);
}

#[tokio::test]
async fn write_objects_commits_the_whole_batch_in_one_transaction() {
    let (_dir, store) = open_store().await;
    let batch: Vec<Widget> = (0..20i64).map(|i| widget(&format!("w{i}"), "batch", i, &[])).collect();

    let committed = store.write_objects(&batch, WriteOptions::new()).await.unwrap();
    assert!(committed);

    let count = store.count_objects::<Widget>(None, None, &CancellationToken::new()).await.unwrap();
    assert_eq!(count, 20);

    let read: Widget = store.read_object_by_id(&IdValue::from("w5"), ReadOptions::new()).await.unwrap().unwrap();
    assert_eq!(read.value_c.int_property, 5);
}

#[tokio::test]
async fn read_objects_as_projects_a_scalar_leaf() {
    let (_dir, store) = open_store().await;
    store.write_object(&widget("w1", "projected", 7, &[]), WriteOptions::new()).await.unwrap();

    let names: Vec<String> = store
        .read_objects_as::<Widget, String>(tycho_store::Path::parse("name"), ObjectQuery::new())
        .await
        .unwrap();
    assert_eq!(names, vec!["projected".to_string()]);
}

#[tokio::test]
async fn read_objects_as_projects_a_nested_object() {
    let (_dir, store) = open_store().await;
    store.write_object(&widget("w1", "nested", 42, &[]), WriteOptions::new()).await.unwrap();

    let values: Vec<ValueC> = store
        .read_objects_as::<Widget, ValueC>(tycho_store::Path::parse("value_c"), ObjectQuery::new())
        .await
        .unwrap();
    assert_eq!(values, vec![ValueC { int_property: 42 }]);
}

#[tokio::test]
async fn blob_write_read_delete_round_trip() {
    let (_dir, store) = open_store().await;
    let cancel = CancellationToken::new();

    let inserted = store.write_blob("k1", &b"hello world"[..], None, &cancel).await.unwrap();
    assert!(inserted);

    let read = store.read_blob("k1", None, &cancel).await.unwrap();
    assert_eq!(read, Some(b"hello world".to_vec()));

    let replaced = store.write_blob("k1", &b"updated"[..], None, &cancel).await.unwrap();
    assert!(!replaced);
    let read_again = store.read_blob("k1", None, &cancel).await.unwrap();
    assert_eq!(read_again, Some(b"updated".to_vec()));

    let deleted = store.delete_blob("k1", None, &cancel).await.unwrap();
    assert!(deleted);
    let gone = store.read_blob("k1", None, &cancel).await.unwrap();
    assert_eq!(gone, None);
}

#[tokio::test]
async fn delete_blobs_scopes_to_partition() {
    let (_dir, store) = open_store().await;
    let cancel = CancellationToken::new();

    store.write_blob("k1", &b"a"[..], Some("p1"), &cancel).await.unwrap();
    store.write_blob("k2", &b"b"[..], Some("p1"), &cancel).await.unwrap();
    store.write_blob("k3", &b"c"[..], Some("p2"), &cancel).await.unwrap();

    let result = store.delete_blobs(Some("p1"), &cancel).await.unwrap();
    assert_eq!(result.rows_affected, 2);

    assert_eq!(store.read_blob("k3", Some("p2"), &cancel).await.unwrap(), Some(b"c".to_vec()));
    assert_eq!(store.read_blob("k1", Some("p1"), &cancel).await.unwrap(), None);
}
