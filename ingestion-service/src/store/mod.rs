//! Document store abstraction over scoped collections.
//!
//! A [`CollectionPath`] names a logical collection plus the scope fields
//! (owner, period, ...) that partition it. Backends decide how scopes are
//! physically laid out; callers only ever address documents by path and id.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use mongodb::bson::{self, Bson, Document};
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document {id} not found in {path}")]
    NotFound { path: String, id: String },

    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Batch aborted: {0}")]
    BatchAborted(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::BatchAborted(_))
    }

    pub(crate) fn not_found(path: &CollectionPath, id: &str) -> Self {
        Self::NotFound {
            path: path.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<bson::ser::Error> for StoreError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for StoreError {
    fn from(err: bson::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => AppError::NotFound(anyhow::Error::new(err)),
            StoreError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
            other => AppError::DatabaseError(anyhow::Error::new(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    name: String,
    scope: Vec<(String, String)>,
}

impl CollectionPath {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: Vec::new(),
        }
    }

    pub fn scoped(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.scope.push((field.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &[(String, String)] {
        &self.scope
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        for (field, value) in &self.scope {
            write!(f, "/{}={}", field, value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Equality filter, ordering by one or more fields and a limit. Enough for
/// every read this service performs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub filter: Option<(String, Bson)>,
    /// Sort keys, most significant first.
    pub order_by: Vec<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl QuerySpec {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.filter = Some((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = vec![(field.into(), order)];
        self
    }

    /// Break ties left by the earlier sort keys.
    pub fn then_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push((field.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or replace the whole document.
    Set {
        path: CollectionPath,
        id: String,
        document: Document,
    },
    /// Merge fields into an existing document; aborts the batch if absent.
    Update {
        path: CollectionPath,
        id: String,
        fields: Document,
    },
    Delete {
        path: CollectionPath,
        id: String,
    },
}

/// Writes committed all-or-nothing by [`DocumentStore::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: &CollectionPath, id: impl Into<String>, document: Document) {
        self.ops.push(WriteOp::Set {
            path: path.clone(),
            id: id.into(),
            document,
        });
    }

    pub fn update(&mut self, path: &CollectionPath, id: impl Into<String>, fields: Document) {
        self.ops.push(WriteOp::Update {
            path: path.clone(),
            id: id.into(),
            fields,
        });
    }

    pub fn delete(&mut self, path: &CollectionPath, id: impl Into<String>) {
        self.ops.push(WriteOp::Delete {
            path: path.clone(),
            id: id.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>, StoreError>;

    async fn set(&self, path: &CollectionPath, id: &str, document: Document)
        -> Result<(), StoreError>;

    /// Create the document only while `id` is free. Returns `false` when a
    /// document with that id already exists.
    async fn insert(&self, path: &CollectionPath, id: &str, document: Document)
        -> Result<bool, StoreError>;

    /// Merge `fields` into an existing document.
    async fn update(&self, path: &CollectionPath, id: &str, fields: Document)
        -> Result<(), StoreError>;

    /// Merge `fields` only while `field` holds one of `allowed`. Returns
    /// `false` when the guard rejected the write. A missing field compares
    /// equal to `Bson::Null`.
    async fn update_if(
        &self,
        path: &CollectionPath,
        id: &str,
        field: &str,
        allowed: &[Bson],
        fields: Document,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<(), StoreError>;

    async fn query(&self, path: &CollectionPath, spec: &QuerySpec)
        -> Result<Vec<Document>, StoreError>;

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
