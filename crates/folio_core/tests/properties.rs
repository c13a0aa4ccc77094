//! Property tests for the recovery fold and the compaction round-trip.

use folio_core::{
    Datastore, Document, IndexSpec, MemoryDatastore, Persistence, PersistenceOptions,
};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

/// One logical mutation, as both a model step and a log record.
#[derive(Debug, Clone)]
enum Op {
    Upsert(String, i64),
    Delete(String),
    DeclareIndex(String, bool),
    RemoveIndex(String),
}

fn id_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d", "e"]).prop_map(str::to_owned)
}

fn field_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["k1", "k2", "k3"]).prop_map(str::to_owned)
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (id_strategy(), any::<i64>()).prop_map(|(id, v)| Op::Upsert(id, v)),
        id_strategy().prop_map(Op::Delete),
        (field_strategy(), any::<bool>()).prop_map(|(f, u)| Op::DeclareIndex(f, u)),
        field_strategy().prop_map(Op::RemoveIndex),
    ]
}

fn log_line(op: &Op) -> String {
    match op {
        Op::Upsert(id, v) => format!("{{\"_id\":\"{id}\",\"v\":{v}}}"),
        Op::Delete(id) => format!("{{\"_id\":\"{id}\",\"$$deleted\":true}}"),
        Op::DeclareIndex(f, u) => format!(
            "{{\"$$indexCreated\":{{\"fieldName\":\"{f}\",\"unique\":{u},\"sparse\":false}}}}"
        ),
        Op::RemoveIndex(f) => format!("{{\"$$indexRemoved\":\"{f}\"}}"),
    }
}

/// Reference fold: last writer wins per id and per index field.
fn model(ops: &[Op]) -> (BTreeMap<String, i64>, BTreeMap<String, bool>) {
    let mut docs = BTreeMap::new();
    let mut indexes = BTreeMap::new();
    for op in ops {
        match op {
            Op::Upsert(id, v) => {
                docs.insert(id.clone(), *v);
            }
            Op::Delete(id) => {
                docs.remove(id);
            }
            Op::DeclareIndex(f, unique) => {
                indexes.insert(f.clone(), *unique);
            }
            Op::RemoveIndex(f) => {
                indexes.remove(f);
            }
        }
    }
    (docs, indexes)
}

fn snapshot(datastore: &MemoryDatastore) -> BTreeMap<String, Document> {
    datastore
        .documents()
        .into_iter()
        .map(|d| (d.id().unwrap().to_owned(), d))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn load_matches_the_last_writer_wins_model(
        ops in prop::collection::vec(op_strategy(), 0..40)
    ) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.db");

        let mut contents = String::new();
        for op in &ops {
            contents.push_str(&log_line(op));
            contents.push('\n');
        }
        fs::write(&path, contents).unwrap();

        let datastore = Arc::new(MemoryDatastore::new());
        let persistence =
            Persistence::new(PersistenceOptions::new(&path), &datastore).unwrap();
        persistence.load().unwrap();

        let (expected_docs, expected_indexes) = model(&ops);
        prop_assert_eq!(datastore.len(), expected_docs.len());
        for (id, v) in &expected_docs {
            let doc = datastore.get(id).unwrap();
            prop_assert_eq!(doc.get("v"), Some(&json!(*v)));
        }

        let actual_indexes: BTreeMap<String, bool> = datastore
            .index_specs()
            .into_iter()
            .map(|spec| (spec.field_name, spec.unique))
            .collect();
        prop_assert_eq!(actual_indexes, expected_indexes);
    }

    #[test]
    fn compact_then_reload_is_the_identity(
        ops in prop::collection::vec(op_strategy(), 0..40)
    ) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("roundtrip.db");

        let (docs_before, indexes_before) = {
            let datastore = Arc::new(MemoryDatastore::new());
            let persistence =
                Persistence::new(PersistenceOptions::new(&path), &datastore).unwrap();
            persistence.load().unwrap();

            for op in &ops {
                match op {
                    Op::Upsert(id, v) => {
                        let d = Document::try_from(json!({"_id": id, "v": v})).unwrap();
                        datastore.upsert(d.clone());
                        persistence.append(vec![d]).unwrap();
                    }
                    Op::Delete(id) => {
                        datastore.remove(id);
                        persistence.append(vec![Document::tombstone(id)]).unwrap();
                    }
                    Op::DeclareIndex(f, unique) => {
                        let spec = IndexSpec::new(f.clone()).unique(*unique);
                        datastore.declare_index(spec.clone());
                        persistence.append(vec![spec.to_document()]).unwrap();
                    }
                    Op::RemoveIndex(f) => {
                        datastore.remove_index(f);
                        persistence
                            .append(vec![IndexSpec::removal_document(f)])
                            .unwrap();
                    }
                }
            }
            persistence.compact().unwrap();
            (snapshot(&datastore), datastore.index_specs())
        };

        let datastore = Arc::new(MemoryDatastore::new());
        let persistence =
            Persistence::new(PersistenceOptions::new(&path), &datastore).unwrap();
        persistence.load().unwrap();

        prop_assert_eq!(snapshot(&datastore), docs_before);
        prop_assert_eq!(datastore.index_specs(), indexes_before);
    }
}
