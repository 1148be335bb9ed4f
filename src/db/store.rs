use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use rocket::futures::TryStreamExt;
use thiserror::Error;

use crate::models::{Expert, Review, Service};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] mongodb::bson::ser::Error),
}

/// Persistence operations consumed by the review/rating cascade.
///
/// Each method maps to a single-document storage call; nothing here spans
/// documents atomically. `replace_reviews` is the one conditional write: it
/// only applies when the service's review-list version still matches the one
/// the caller read, which closes the lost-update race between two concurrent
/// review mutations on the same service. Guarding on a version rather than
/// the list length matters for in-place edits, which leave the length
/// unchanged.
#[rocket::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_service(&self, id: ObjectId) -> Result<Option<Service>, StoreError>;

    async fn find_services_by_expert(
        &self,
        expert_id: ObjectId,
    ) -> Result<Vec<Service>, StoreError>;

    async fn find_expert(&self, id: ObjectId) -> Result<Option<Expert>, StoreError>;

    /// Atomically swap in a service's review list and cached rating, provided
    /// the stored list is still at `expected_version`. Every successful swap
    /// bumps the version, so any interleaved add, edit, or removal makes the
    /// guard miss. Returns false when the guard missed (concurrent writer) or
    /// the service is gone.
    async fn replace_reviews(
        &self,
        service_id: ObjectId,
        reviews: &[Review],
        rating: f64,
        expected_version: i64,
    ) -> Result<bool, StoreError>;

    async fn save_expert_aggregates(
        &self,
        expert_id: ObjectId,
        rating: f64,
        total_reviews: i64,
    ) -> Result<(), StoreError>;

    /// Returns false when no service with that id existed.
    async fn delete_service(&self, id: ObjectId) -> Result<bool, StoreError>;

    /// Decrement the expert's cached service count, floored at zero.
    async fn decrement_service_count(&self, expert_id: ObjectId) -> Result<(), StoreError>;
}

/// MongoDB-backed store over the `services` and `experts` collections.
pub struct MongoCatalogStore<'a> {
    db: &'a Database,
}

impl<'a> MongoCatalogStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        MongoCatalogStore { db }
    }
}

#[rocket::async_trait]
impl CatalogStore for MongoCatalogStore<'_> {
    async fn find_service(&self, id: ObjectId) -> Result<Option<Service>, StoreError> {
        let service = self
            .db
            .collection::<Service>("services")
            .find_one(doc! { "_id": id }, None)
            .await?;
        Ok(service)
    }

    async fn find_services_by_expert(
        &self,
        expert_id: ObjectId,
    ) -> Result<Vec<Service>, StoreError> {
        let services = self
            .db
            .collection::<Service>("services")
            .find(doc! { "expert_id": expert_id }, None)
            .await?
            .try_collect()
            .await?;
        Ok(services)
    }

    async fn find_expert(&self, id: ObjectId) -> Result<Option<Expert>, StoreError> {
        let expert = self
            .db
            .collection::<Expert>("experts")
            .find_one(doc! { "_id": id }, None)
            .await?;
        Ok(expert)
    }

    async fn replace_reviews(
        &self,
        service_id: ObjectId,
        reviews: &[Review],
        rating: f64,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let reviews = mongodb::bson::to_bson(reviews)?;
        let result = self
            .db
            .collection::<Service>("services")
            .update_one(
                doc! {
                    "_id": service_id,
                    "review_version": expected_version,
                },
                doc! {
                    "$set": {
                        "reviews": reviews,
                        "rating": rating,
                        "updated_at": DateTime::now(),
                    },
                    "$inc": { "review_version": 1 },
                },
                None,
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn save_expert_aggregates(
        &self,
        expert_id: ObjectId,
        rating: f64,
        total_reviews: i64,
    ) -> Result<(), StoreError> {
        self.db
            .collection::<Expert>("experts")
            .update_one(
                doc! { "_id": expert_id },
                doc! {
                    "$set": {
                        "rating": rating,
                        "total_reviews": total_reviews,
                        "updated_at": DateTime::now(),
                    }
                },
                None,
            )
            .await?;
        Ok(())
    }

    async fn delete_service(&self, id: ObjectId) -> Result<bool, StoreError> {
        let result = self
            .db
            .collection::<Service>("services")
            .delete_one(doc! { "_id": id }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn decrement_service_count(&self, expert_id: ObjectId) -> Result<(), StoreError> {
        // Pipeline update so the floor is applied server-side in one step
        self.db
            .collection::<Expert>("experts")
            .update_one(
                doc! { "_id": expert_id },
                vec![doc! {
                    "$set": {
                        "service_count": {
                            "$max": [0, { "$subtract": [{ "$ifNull": ["$service_count", 0] }, 1] }]
                        },
                        "updated_at": "$$NOW",
                    }
                }],
                None,
            )
            .await?;
        Ok(())
    }
}
