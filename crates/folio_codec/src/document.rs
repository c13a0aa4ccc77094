//! Dynamic document type and index declarations.

use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding a document's unique identifier.
pub const ID_FIELD: &str = "_id";

/// Sentinel field marking a document as a logical deletion.
pub const DELETED_FIELD: &str = "$$deleted";

/// Sentinel field carrying a secondary index declaration.
pub const INDEX_CREATED_FIELD: &str = "$$indexCreated";

/// Sentinel field carrying a secondary index removal.
pub const INDEX_REMOVED_FIELD: &str = "$$indexRemoved";

/// A schema-less document: an ordered mapping from field names to values.
///
/// Documents are opaque to the persistence layer except for the sentinel
/// fields above. The identifier under [`ID_FIELD`] is assigned by the
/// datastore on insert and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a document from an existing field map.
    #[must_use]
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Builds the tombstone recording the logical removal of `id`.
    #[must_use]
    pub fn tombstone(id: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(ID_FIELD.to_owned(), Value::String(id.to_owned()));
        fields.insert(DELETED_FIELD.to_owned(), Value::Bool(true));
        Self(fields)
    }

    /// Returns the identifier under `_id`, when present as a non-empty string.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self.0.get(ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => Some(id),
            _ => None,
        }
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Sets a field value, returning the previous value if any.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// True when the document carries `$$deleted: true`.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        matches!(self.0.get(DELETED_FIELD), Some(Value::Bool(true)))
    }

    /// Returns the underlying ordered field map.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Document {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for Document {
    type Error = CodecError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            _ => Err(CodecError::NotAnObject),
        }
    }
}

/// A secondary index declaration as stored in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSpec {
    /// Field the index covers.
    pub field_name: String,
    /// Whether the index enforces uniqueness.
    #[serde(default)]
    pub unique: bool,
    /// Whether documents missing the field are excluded.
    #[serde(default)]
    pub sparse: bool,
}

impl IndexSpec {
    /// Creates a plain (non-unique, non-sparse) declaration.
    #[must_use]
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            unique: false,
            sparse: false,
        }
    }

    /// Sets the unique constraint.
    #[must_use]
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Sets the sparse flag.
    #[must_use]
    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// Builds the `$$indexCreated` document recording this declaration.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut spec = Map::new();
        spec.insert(
            "fieldName".to_owned(),
            Value::String(self.field_name.clone()),
        );
        spec.insert("unique".to_owned(), Value::Bool(self.unique));
        spec.insert("sparse".to_owned(), Value::Bool(self.sparse));
        let mut fields = Map::new();
        fields.insert(INDEX_CREATED_FIELD.to_owned(), Value::Object(spec));
        Document(fields)
    }

    /// Builds the `$$indexRemoved` document for a field name.
    #[must_use]
    pub fn removal_document(field_name: &str) -> Document {
        let mut fields = Map::new();
        fields.insert(
            INDEX_REMOVED_FIELD.to_owned(),
            Value::String(field_name.to_owned()),
        );
        Document(fields)
    }

    /// Parses a declaration from the value of a `$$indexCreated` field.
    ///
    /// Returns `None` when the value is not an object with a string
    /// `fieldName`. Missing `unique` and `sparse` default to false.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let spec = value.as_object()?;
        let field_name = spec.get("fieldName")?.as_str()?;
        Some(Self {
            field_name: field_name.to_owned(),
            unique: spec.get("unique").and_then(Value::as_bool).unwrap_or(false),
            sparse: spec.get("sparse").and_then(Value::as_bool).unwrap_or(false),
        })
    }
}
