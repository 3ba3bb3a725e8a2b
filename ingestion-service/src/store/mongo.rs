use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions, ReplaceOptions},
    Client as MongoClient, ClientSession, Collection, Database, IndexModel,
};

use super::{CollectionPath, DocumentStore, QuerySpec, SortOrder, StoreError, WriteBatch, WriteOp};

/// Scope values live in an embedded `_scope` document and are folded into
/// `_id` so ids only need to be unique within their scope.
const SCOPE_FIELD: &str = "_scope";

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

/// Escape the `_id` segment separator so scope values and ids containing
/// `/` cannot collide with a different scope.
fn escape_segment(raw: &str) -> String {
    raw.replace('%', "%25").replace('/', "%2F")
}

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            StoreError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), StoreError> {
        tracing::info!("Creating MongoDB indexes for ingestion-service");

        let indexes = [
            ("jobs", doc! { "owner_id": 1, "created_at": -1 }, "owner_recent_jobs"),
            (
                "uploaded_transactions",
                doc! { "_scope.owner_id": 1, "_scope.period": 1, "date": -1, "statement_line": -1 },
                "owner_period_date",
            ),
            ("ledger_periods", doc! { "_scope.owner_id": 1 }, "owner_periods"),
            (
                "insights",
                doc! { "_scope.owner_id": 1, "created_at": -1 },
                "owner_recent_insights",
            ),
        ];

        for (collection, keys, name) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(name.to_string()).build())
                .build();
            self.db
                .collection::<Document>(collection)
                .create_index(model, None)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to create index {} on {}: {}", name, collection, e);
                    StoreError::from(e)
                })?;
            tracing::info!("Created index {} on {}", name, collection);
        }

        Ok(())
    }

    fn collection(&self, path: &CollectionPath) -> Collection<Document> {
        self.db.collection(path.name())
    }

    fn storage_id(path: &CollectionPath, id: &str) -> String {
        let mut key = String::new();
        for (_, value) in path.scope() {
            key.push_str(&escape_segment(value));
            key.push('/');
        }
        key.push_str(&escape_segment(id));
        key
    }

    fn scope_filter(path: &CollectionPath) -> Document {
        let mut filter = Document::new();
        for (field, value) in path.scope() {
            filter.insert(format!("{}.{}", SCOPE_FIELD, field), value.as_str());
        }
        filter
    }

    fn id_filter(path: &CollectionPath, id: &str) -> Document {
        doc! { "_id": Self::storage_id(path, id) }
    }

    fn to_stored(path: &CollectionPath, id: &str, mut document: Document) -> Document {
        let mut scope = Document::new();
        for (field, value) in path.scope() {
            scope.insert(field.as_str(), value.as_str());
        }
        document.insert("_id", Self::storage_id(path, id));
        document.insert(SCOPE_FIELD, scope);
        document
    }

    fn from_stored(mut document: Document) -> Document {
        document.remove("_id");
        document.remove(SCOPE_FIELD);
        document
    }

    async fn apply_in_session(
        &self,
        session: &mut ClientSession,
        op: WriteOp,
    ) -> Result<(), StoreError> {
        match op {
            WriteOp::Set { path, id, document } => {
                self.collection(&path)
                    .replace_one_with_session(
                        Self::id_filter(&path, &id),
                        Self::to_stored(&path, &id, document),
                        ReplaceOptions::builder().upsert(true).build(),
                        session,
                    )
                    .await?;
            }
            WriteOp::Update { path, id, fields } => {
                let result = self
                    .collection(&path)
                    .update_one_with_session(
                        Self::id_filter(&path, &id),
                        doc! { "$set": fields },
                        None,
                        session,
                    )
                    .await?;
                if result.matched_count == 0 {
                    return Err(StoreError::not_found(&path, &id));
                }
            }
            WriteOp::Delete { path, id } => {
                self.collection(&path)
                    .delete_one_with_session(Self::id_filter(&path, &id), None, session)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>, StoreError> {
        let found = self
            .collection(path)
            .find_one(Self::id_filter(path, id), None)
            .await?;
        Ok(found.map(Self::from_stored))
    }

    async fn set(&self, path: &CollectionPath, id: &str, document: Document) -> Result<(), StoreError> {
        self.collection(path)
            .replace_one(
                Self::id_filter(path, id),
                Self::to_stored(path, id, document),
                ReplaceOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }

    async fn insert(&self, path: &CollectionPath, id: &str, document: Document) -> Result<bool, StoreError> {
        match self
            .collection(path)
            .insert_one(Self::to_stored(path, id, document), None)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, path: &CollectionPath, id: &str, fields: Document) -> Result<(), StoreError> {
        let result = self
            .collection(path)
            .update_one(Self::id_filter(path, id), doc! { "$set": fields }, None)
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::not_found(path, id));
        }
        Ok(())
    }

    async fn update_if(
        &self,
        path: &CollectionPath,
        id: &str,
        field: &str,
        allowed: &[Bson],
        fields: Document,
    ) -> Result<bool, StoreError> {
        let mut filter = Self::id_filter(path, id);
        filter.insert(field, doc! { "$in": allowed.to_vec() });

        let result = self
            .collection(path)
            .update_one(filter, doc! { "$set": fields }, None)
            .await?;
        if result.matched_count > 0 {
            return Ok(true);
        }

        match self.get(path, id).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::not_found(path, id)),
        }
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<(), StoreError> {
        self.collection(path)
            .delete_one(Self::id_filter(path, id), None)
            .await?;
        Ok(())
    }

    async fn query(&self, path: &CollectionPath, spec: &QuerySpec) -> Result<Vec<Document>, StoreError> {
        let mut filter = Self::scope_filter(path);
        if let Some((field, value)) = &spec.filter {
            filter.insert(field.as_str(), value.clone());
        }

        let sort = (!spec.order_by.is_empty()).then(|| {
            let mut sort = Document::new();
            for (field, order) in &spec.order_by {
                let direction = match order {
                    SortOrder::Ascending => 1,
                    SortOrder::Descending => -1,
                };
                sort.insert(field.as_str(), direction);
            }
            sort
        });
        let options = FindOptions::builder()
            .sort(sort)
            .limit(spec.limit.map(|l| l as i64))
            .build();

        let docs: Vec<Document> = self
            .collection(path)
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(docs.into_iter().map(Self::from_stored).collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        for op in batch.into_ops() {
            if let Err(e) = self.apply_in_session(&mut session, op).await {
                if let Err(abort_err) = session.abort_transaction().await {
                    tracing::warn!("Failed to abort MongoDB transaction: {}", abort_err);
                }
                return Err(StoreError::BatchAborted(e.to_string()));
            }
        }

        session
            .commit_transaction()
            .await
            .map_err(|e| StoreError::BatchAborted(e.to_string()))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                StoreError::from(e)
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_ids_do_not_collide_across_scopes() {
        let nested = CollectionPath::root("tx")
            .scoped("owner_id", "a/b")
            .scoped("period", "c");
        let flat = CollectionPath::root("tx")
            .scoped("owner_id", "a")
            .scoped("period", "b/c");

        assert_ne!(
            MongoStore::storage_id(&nested, "x"),
            MongoStore::storage_id(&flat, "x")
        );
        assert_eq!(MongoStore::storage_id(&nested, "x"), "a%2Fb/c/x");
    }

    #[test]
    fn percent_signs_are_escaped_too() {
        let path = CollectionPath::root("tx").scoped("owner_id", "a%2Fb");
        assert_eq!(MongoStore::storage_id(&path, "x"), "a%252Fb/x");
    }
}
