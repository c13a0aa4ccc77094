//! The owning datastore contract.

use crate::error::CoreResult;
use crate::events::PersistenceEvent;
use folio_codec::{Document, IndexSpec};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};

/// Back-reference contract between the persistence layer and its owner.
///
/// The datastore owns the persistence controller; the controller reaches
/// back through a `Weak` handle to this trait, so the datastore stays the
/// sole root of the object graph.
pub trait Datastore: Send + Sync {
    /// Visits every live document. Iteration stops at the first visitor
    /// error, which is propagated.
    fn for_each(&self, visit: &mut dyn FnMut(&Document) -> CoreResult<()>) -> CoreResult<()>;

    /// Current secondary index declarations.
    fn index_specs(&self) -> Vec<IndexSpec>;

    /// Replaces the in-memory state wholesale. Used when a load hands the
    /// folded state back, and to roll back to empty on a failed load.
    fn reset(&self, documents: Vec<Document>, indexes: Vec<IndexSpec>);

    /// Delivers an observable event.
    fn emit(&self, event: PersistenceEvent);
}

/// A minimal in-memory datastore.
///
/// Holds live documents in insertion order plus the declaration map, and
/// records emitted events. This is the reference owner for embedding the
/// persistence core without a query layer, and the workhorse of the test
/// suite.
#[derive(Default)]
pub struct MemoryDatastore {
    state: RwLock<State>,
    events: Mutex<Vec<PersistenceEvent>>,
}

#[derive(Default)]
struct State {
    documents: HashMap<String, Document>,
    order: Vec<String>,
    indexes: BTreeMap<String, IndexSpec>,
}

impl MemoryDatastore {
    /// Creates an empty datastore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a document, keyed by its `_id`.
    ///
    /// Returns false (and stores nothing) when the document has no usable
    /// identifier.
    pub fn upsert(&self, doc: Document) -> bool {
        let Some(id) = doc.id().map(str::to_owned) else {
            return false;
        };
        let mut state = self.state.write();
        if !state.documents.contains_key(&id) {
            state.order.push(id.clone());
        }
        state.documents.insert(id, doc);
        true
    }

    /// Removes a document. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut state = self.state.write();
        if state.documents.remove(id).is_some() {
            state.order.retain(|existing| existing != id);
            true
        } else {
            false
        }
    }

    /// Declares a secondary index, replacing any declaration for the field.
    pub fn declare_index(&self, spec: IndexSpec) {
        let mut state = self.state.write();
        state.indexes.insert(spec.field_name.clone(), spec);
    }

    /// Removes a secondary index declaration. Returns whether it existed.
    pub fn remove_index(&self, field_name: &str) -> bool {
        self.state.write().indexes.remove(field_name).is_some()
    }

    /// Returns a document by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Document> {
        self.state.read().documents.get(id).cloned()
    }

    /// Returns all live documents in insertion order.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| state.documents.get(id).cloned())
            .collect()
    }

    /// Number of live documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    /// True when no documents are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().documents.is_empty()
    }

    /// Drains and returns the events emitted so far.
    pub fn take_events(&self) -> Vec<PersistenceEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl Datastore for MemoryDatastore {
    fn for_each(&self, visit: &mut dyn FnMut(&Document) -> CoreResult<()>) -> CoreResult<()> {
        let state = self.state.read();
        for id in &state.order {
            if let Some(doc) = state.documents.get(id) {
                visit(doc)?;
            }
        }
        Ok(())
    }

    fn index_specs(&self) -> Vec<IndexSpec> {
        self.state.read().indexes.values().cloned().collect()
    }

    fn reset(&self, documents: Vec<Document>, indexes: Vec<IndexSpec>) {
        let mut state = self.state.write();
        state.documents.clear();
        state.order.clear();
        state.indexes.clear();
        for doc in documents {
            let Some(id) = doc.id().map(str::to_owned) else {
                continue;
            };
            if !state.documents.contains_key(&id) {
                state.order.push(id.clone());
            }
            state.documents.insert(id, doc);
        }
        for spec in indexes {
            state.indexes.insert(spec.field_name.clone(), spec);
        }
    }

    fn emit(&self, event: PersistenceEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CompactionStats;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::try_from(value).unwrap()
    }

    #[test]
    fn upsert_and_get() {
        let store = MemoryDatastore::new();
        assert!(store.upsert(doc(json!({"_id": "a", "x": 1}))));
        assert_eq!(store.get("a").unwrap().get("x"), Some(&json!(1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn upsert_without_id_is_rejected() {
        let store = MemoryDatastore::new();
        assert!(!store.upsert(doc(json!({"x": 1}))));
        assert!(store.is_empty());
    }

    #[test]
    fn remove_existing_and_missing() {
        let store = MemoryDatastore::new();
        store.upsert(doc(json!({"_id": "a"})));
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert!(store.is_empty());
    }

    #[test]
    fn documents_preserve_insertion_order() {
        let store = MemoryDatastore::new();
        store.upsert(doc(json!({"_id": "c"})));
        store.upsert(doc(json!({"_id": "a"})));
        store.upsert(doc(json!({"_id": "c", "x": 2})));

        let ids: Vec<_> = store
            .documents()
            .iter()
            .map(|d| d.id().unwrap().to_owned())
            .collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn for_each_visits_in_order() {
        let store = MemoryDatastore::new();
        store.upsert(doc(json!({"_id": "a"})));
        store.upsert(doc(json!({"_id": "b"})));

        let mut seen = Vec::new();
        store
            .for_each(&mut |d| {
                seen.push(d.id().unwrap().to_owned());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn for_each_propagates_visitor_error() {
        let store = MemoryDatastore::new();
        store.upsert(doc(json!({"_id": "a"})));
        let result = store.for_each(&mut |_| Err(crate::CoreError::NotOpen));
        assert!(result.is_err());
    }

    #[test]
    fn reset_replaces_everything() {
        let store = MemoryDatastore::new();
        store.upsert(doc(json!({"_id": "old"})));
        store.declare_index(IndexSpec::new("old"));

        store.reset(
            vec![doc(json!({"_id": "new"}))],
            vec![IndexSpec::new("k").sparse(true)],
        );

        assert!(store.get("old").is_none());
        assert!(store.get("new").is_some());
        assert_eq!(store.index_specs(), vec![IndexSpec::new("k").sparse(true)]);
    }

    #[test]
    fn emitted_events_are_captured() {
        let store = MemoryDatastore::new();
        let stats = CompactionStats {
            documents: 1,
            indexes: 0,
            bytes: 10,
        };
        store.emit(PersistenceEvent::CompactionDone(stats));

        assert_eq!(
            store.take_events(),
            vec![PersistenceEvent::CompactionDone(stats)]
        );
        assert!(store.take_events().is_empty());
    }
}
