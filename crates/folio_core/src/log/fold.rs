//! Last-writer-wins state fold.

use crate::error::{CoreError, CoreResult};
use crate::log::reader::RecordOutcome;
use crate::record::Record;
use folio_codec::{Document, IndexSpec};
use std::collections::{BTreeMap, HashMap};

/// Result of folding a record stream.
#[derive(Debug, Default)]
pub struct FoldOutcome {
    /// Live documents, in first-appearance order. Callers must treat the
    /// order as unspecified.
    pub documents: Vec<Document>,
    /// Live secondary index declarations, by field name.
    pub indexes: BTreeMap<String, IndexSpec>,
    /// Total record slices observed.
    pub total: usize,
    /// Corrupt slices observed.
    pub corrupt: usize,
}

/// Folds a record stream into live state under last-writer-wins rules.
///
/// Per parsed record, in stream order: an upsert replaces the live version
/// for its `_id`, a tombstone removes it, an index declaration replaces the
/// declaration for its field, an index removal deletes it. Corrupt slices
/// are tallied.
///
/// # Errors
///
/// Returns [`CoreError::CorruptionThresholdExceeded`] when the ratio of
/// corrupt to total slices exceeds `threshold` (an empty stream has ratio
/// zero), or the stream's own error if reading fails.
pub fn fold(
    stream: impl Iterator<Item = CoreResult<RecordOutcome>>,
    threshold: f64,
) -> CoreResult<FoldOutcome> {
    let mut live: HashMap<String, Document> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut indexes: BTreeMap<String, IndexSpec> = BTreeMap::new();
    let mut total = 0usize;
    let mut corrupt = 0usize;

    for outcome in stream {
        total += 1;
        match outcome? {
            RecordOutcome::Corrupt => corrupt += 1,
            RecordOutcome::Parsed(Record::Upsert(doc)) => {
                // Classification guarantees the id is present.
                let Some(id) = doc.id().map(str::to_owned) else {
                    corrupt += 1;
                    continue;
                };
                if !live.contains_key(&id) {
                    order.push(id.clone());
                }
                live.insert(id, doc);
            }
            RecordOutcome::Parsed(Record::Tombstone(id)) => {
                live.remove(&id);
            }
            RecordOutcome::Parsed(Record::IndexCreated(spec)) => {
                indexes.insert(spec.field_name.clone(), spec);
            }
            RecordOutcome::Parsed(Record::IndexRemoved(name)) => {
                indexes.remove(&name);
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    if total > 0 && corrupt as f64 / total as f64 > threshold {
        return Err(CoreError::CorruptionThresholdExceeded { corrupt, total });
    }

    let mut documents = Vec::with_capacity(live.len());
    for id in order {
        if let Some(doc) = live.remove(&id) {
            documents.push(doc);
        }
    }

    Ok(FoldOutcome {
        documents,
        indexes,
        total,
        corrupt,
    })
}
