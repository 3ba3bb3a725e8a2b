use chrono::NaiveDate;
use mongodb::bson::{self, doc, Bson, Document};
use std::sync::Arc;
use tracing::info;

use crate::models::BalanceSnapshot;
use crate::store::{CollectionPath, DocumentStore, StoreError};

pub const OWNERS_COLLECTION: &str = "owners";

const MAX_SWAP_ATTEMPTS: usize = 3;

/// Per-owner account state kept outside the transaction buckets.
#[derive(Clone)]
pub struct OwnerRepository {
    store: Arc<dyn DocumentStore>,
}

impl OwnerRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn path() -> CollectionPath {
        CollectionPath::root(OWNERS_COLLECTION)
    }

    pub async fn balance(&self, owner_id: &str) -> Result<Option<BalanceSnapshot>, StoreError> {
        let Some(document) = self.store.get(&Self::path(), owner_id).await? else {
            return Ok(None);
        };
        let balance = match document.get("balance") {
            Some(value @ Bson::String(_)) => bson::from_bson(value.clone())?,
            _ => return Ok(None),
        };
        match stored_date(&document) {
            Some(as_of) => Ok(Some(BalanceSnapshot { balance, as_of })),
            None => Ok(None),
        }
    }

    /// Store `snapshot` unless the owner already has a balance dated after
    /// it. Returns whether the write happened. The first write is an
    /// insert-if-absent and later ones a compare-and-swap on the stored
    /// date, so concurrent writers in any order settle on the newest.
    pub async fn record_balance_if_newer(
        &self,
        owner_id: &str,
        snapshot: &BalanceSnapshot,
    ) -> Result<bool, StoreError> {
        let fields = doc! {
            "owner_id": owner_id,
            "balance": bson::to_bson(&snapshot.balance)?,
            "balance_updated": bson::to_bson(&snapshot.as_of)?,
        };

        for _ in 0..MAX_SWAP_ATTEMPTS {
            let Some(current) = self.store.get(&Self::path(), owner_id).await? else {
                if self.store.insert(&Self::path(), owner_id, fields.clone()).await? {
                    info!(owner_id = %owner_id, as_of = %snapshot.as_of, "Balance recorded");
                    return Ok(true);
                }
                // Another writer created the owner first; compare against it.
                continue;
            };

            if let Some(current_as_of) = stored_date(&current) {
                if snapshot.as_of < current_as_of {
                    tracing::debug!(
                        owner_id = %owner_id,
                        current = %current_as_of,
                        incoming = %snapshot.as_of,
                        "Ignoring older balance"
                    );
                    return Ok(false);
                }
            }

            let observed = current.get("balance_updated").cloned().unwrap_or(Bson::Null);
            let swapped = self
                .store
                .update_if(&Self::path(), owner_id, "balance_updated", &[observed], fields.clone())
                .await?;
            if swapped {
                info!(owner_id = %owner_id, as_of = %snapshot.as_of, "Balance recorded");
                return Ok(true);
            }
        }

        Err(StoreError::Unavailable(format!(
            "balance for {} kept changing during update",
            owner_id
        )))
    }
}

fn stored_date(document: &Document) -> Option<NaiveDate> {
    document
        .get_str("balance_updated")
        .ok()
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}
