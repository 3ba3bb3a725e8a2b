//! Owner profile data feeding the dashboard and insights views.

use chrono::Utc;
use mongodb::bson;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use super::CacheInvalidator;
use crate::models::{Insight, ProfileEntry, INSIGHT_TYPES};
use crate::store::{CollectionPath, DocumentStore, QuerySpec, SortOrder, StoreError};
use service_core::error::AppError;

pub const INSIGHTS_COLLECTION: &str = "insights";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Goal,
    IncomeSource,
}

impl ProfileKind {
    fn collection(&self) -> &'static str {
        match self {
            Self::Goal => "goals",
            Self::IncomeSource => "income_sources",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Unknown analysis type '{0}'")]
    UnknownAnalysisType(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ProfileError> for AppError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::UnknownAnalysisType(_) => AppError::BadRequest(anyhow::Error::new(err)),
            ProfileError::Store(e) => e.into(),
        }
    }
}

#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn DocumentStore>,
    invalidator: CacheInvalidator,
}

impl ProfileService {
    pub fn new(store: Arc<dyn DocumentStore>, invalidator: CacheInvalidator) -> Self {
        Self { store, invalidator }
    }

    fn entries_path(owner_id: &str, kind: ProfileKind) -> CollectionPath {
        CollectionPath::root(kind.collection()).scoped("owner_id", owner_id)
    }

    fn insights_path(owner_id: &str) -> CollectionPath {
        CollectionPath::root(INSIGHTS_COLLECTION).scoped("owner_id", owner_id)
    }

    pub async fn put_entry(
        &self,
        owner_id: &str,
        kind: ProfileKind,
        id: &str,
        payload: serde_json::Value,
    ) -> Result<ProfileEntry, ProfileError> {
        let entry = ProfileEntry {
            id: id.to_string(),
            payload,
            updated_at: Utc::now(),
        };
        let document = bson::to_document(&entry).map_err(StoreError::from)?;
        self.store
            .set(&Self::entries_path(owner_id, kind), id, document)
            .await?;
        self.invalidator.profile_changed(owner_id).await;

        info!(owner_id = %owner_id, kind = ?kind, id = %id, "Profile entry saved");
        Ok(entry)
    }

    pub async fn delete_entry(
        &self,
        owner_id: &str,
        kind: ProfileKind,
        id: &str,
    ) -> Result<(), ProfileError> {
        self.store
            .delete(&Self::entries_path(owner_id, kind), id)
            .await?;
        self.invalidator.profile_changed(owner_id).await;
        Ok(())
    }

    pub async fn list_entries(
        &self,
        owner_id: &str,
        kind: ProfileKind,
    ) -> Result<Vec<ProfileEntry>, StoreError> {
        let spec = QuerySpec::all().order_by("updated_at", SortOrder::Descending);
        self.store
            .query(&Self::entries_path(owner_id, kind), &spec)
            .await?
            .into_iter()
            .map(|d| bson::from_document(d).map_err(StoreError::from))
            .collect()
    }

    pub async fn record_insight(
        &self,
        owner_id: &str,
        analysis_type: &str,
        content: serde_json::Value,
    ) -> Result<Insight, ProfileError> {
        if !INSIGHT_TYPES.contains(&analysis_type) {
            return Err(ProfileError::UnknownAnalysisType(analysis_type.to_string()));
        }

        let insight = Insight {
            id: uuid::Uuid::new_v4().to_string(),
            analysis_type: analysis_type.to_string(),
            content,
            created_at: Utc::now(),
        };
        let document = bson::to_document(&insight).map_err(StoreError::from)?;
        self.store
            .set(&Self::insights_path(owner_id), &insight.id, document)
            .await?;
        self.invalidator.insights_changed(owner_id).await;

        info!(owner_id = %owner_id, analysis_type = %analysis_type, "Insight recorded");
        Ok(insight)
    }

    pub async fn delete_insight(&self, owner_id: &str, id: &str) -> Result<(), ProfileError> {
        self.store.delete(&Self::insights_path(owner_id), id).await?;
        self.invalidator.insights_changed(owner_id).await;
        Ok(())
    }

    pub async fn latest_insight(
        &self,
        owner_id: &str,
        analysis_type: &str,
    ) -> Result<Option<Insight>, StoreError> {
        let spec = QuerySpec::all()
            .where_eq("analysis_type", analysis_type)
            .order_by("created_at", SortOrder::Descending)
            .limit(1);
        let mut docs = self.store.query(&Self::insights_path(owner_id), &spec).await?;
        match docs.pop() {
            Some(document) => Ok(Some(bson::from_document(document)?)),
            None => Ok(None),
        }
    }

    /// Most recent across every analysis type.
    pub async fn recent_insights(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<Insight>, StoreError> {
        let spec = QuerySpec::all()
            .order_by("created_at", SortOrder::Descending)
            .limit(limit);
        self.store
            .query(&Self::insights_path(owner_id), &spec)
            .await?
            .into_iter()
            .map(|d| bson::from_document(d).map_err(StoreError::from))
            .collect()
    }
}
