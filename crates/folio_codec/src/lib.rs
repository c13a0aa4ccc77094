//! # FolioDB Codec
//!
//! Document model and line codec for FolioDB.
//!
//! This crate owns the on-disk textual representation of documents. Every
//! record in a FolioDB log is the encoded image of one [`Document`] followed
//! by a single newline, so the codec guarantees that encoded records never
//! contain an embedded newline: compact JSON escapes control characters.
//!
//! ## Design Principles
//!
//! - Documents are ordered field maps; encoding preserves field order
//! - Encoding is reversible: `deserialize_document(serialize_document(d)) == d`
//! - Sentinel fields (`_id`, `$$deleted`, `$$indexCreated`, `$$indexRemoved`)
//!   are plain fields at this layer; interpretation belongs to the core
//!
//! ## Example
//!
//! ```
//! use folio_codec::{deserialize_document, serialize_document, Document};
//! use serde_json::json;
//!
//! let doc = Document::try_from(json!({"_id": "a", "x": 1})).unwrap();
//! let line = serialize_document(&doc).unwrap();
//! let back = deserialize_document(&line).unwrap();
//! assert_eq!(doc, back);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;

pub use document::{
    Document, IndexSpec, DELETED_FIELD, ID_FIELD, INDEX_CREATED_FIELD, INDEX_REMOVED_FIELD,
};
pub use error::{CodecError, CodecResult};

/// Encodes a document to its single-line textual image.
///
/// The output is compact JSON and never contains a raw newline byte.
///
/// # Errors
///
/// Returns an error if the document cannot be represented as JSON.
pub fn serialize_document(doc: &Document) -> CodecResult<String> {
    Ok(serde_json::to_string(doc)?)
}

/// Decodes one log line back into a document.
///
/// # Errors
///
/// Returns an error if the line is not a JSON object.
pub fn deserialize_document(line: &str) -> CodecResult<Document> {
    Ok(serde_json::from_str(line)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roundtrip_simple_document() {
        let doc = Document::try_from(json!({"_id": "a", "name": "alice", "age": 30})).unwrap();
        let line = serialize_document(&doc).unwrap();
        assert_eq!(doc, deserialize_document(&line).unwrap());
    }

    #[test]
    fn serialized_form_has_no_newline() {
        let doc = Document::try_from(json!({"_id": "a", "text": "line one\nline two"})).unwrap();
        let line = serialize_document(&doc).unwrap();
        assert!(!line.contains('\n'));
    }

    #[test]
    fn field_order_is_preserved() {
        let doc = Document::try_from(json!({"z": 1, "a": 2, "m": 3})).unwrap();
        let line = serialize_document(&doc).unwrap();
        assert_eq!(line, r#"{"z":1,"a":2,"m":3}"#);
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(deserialize_document("42").is_err());
        assert!(deserialize_document(r#""text""#).is_err());
        assert!(deserialize_document("[1,2]").is_err());
        assert!(deserialize_document("").is_err());
    }

    #[test]
    fn nested_values_roundtrip() {
        let doc = Document::try_from(json!({
            "_id": "n",
            "tags": ["x", "y"],
            "address": {"city": "paris", "zip": null},
        }))
        .unwrap();
        let line = serialize_document(&doc).unwrap();
        assert_eq!(doc, deserialize_document(&line).unwrap());
    }
}
