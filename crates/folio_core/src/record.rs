//! Log record classification.

use folio_codec::{Document, IndexSpec, INDEX_CREATED_FIELD, INDEX_REMOVED_FIELD};
use serde_json::Value;

/// A classified log record.
///
/// Every line in the log decodes to a document; the sentinel fields of that
/// document determine what the record means for the fold. Classification
/// rules are tried in order, first match wins.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A live document version. The last writer per `_id` wins.
    Upsert(Document),
    /// Logical removal of the document with this `_id`.
    Tombstone(String),
    /// Declaration of a secondary index.
    IndexCreated(IndexSpec),
    /// Removal of a secondary index, by field name.
    IndexRemoved(String),
}

impl Record {
    /// Classifies a decoded document.
    ///
    /// Returns `None` when the document is unstructured: no usable `_id`
    /// and no well-formed index declaration. Unstructured records count as
    /// corrupt during a fold.
    #[must_use]
    pub fn classify(doc: Document) -> Option<Record> {
        if let Some(id) = doc.id().map(str::to_owned) {
            if doc.is_deleted() {
                return Some(Record::Tombstone(id));
            }
            return Some(Record::Upsert(doc));
        }
        if let Some(spec) = doc.get(INDEX_CREATED_FIELD).and_then(IndexSpec::from_value) {
            return Some(Record::IndexCreated(spec));
        }
        if let Some(name) = doc.get(INDEX_REMOVED_FIELD).and_then(Value::as_str) {
            return Some(Record::IndexRemoved(name.to_owned()));
        }
        None
    }
}
