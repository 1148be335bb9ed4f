//! Review lifecycle orchestration over services and their owning experts.
//!
//! Every mutation follows the same protocol: apply the change to the
//! service's embedded review list, recompute and persist the service's cached
//! rating, then re-read the expert's full service set and recompute the
//! expert-level aggregates. The service write goes first because the expert
//! recompute trusts each service's cached rating.
//!
//! There is no transaction across the two documents. If the expert refresh
//! fails after the service write landed, the service is correct and the
//! expert aggregate is stale; that degraded state is logged and accepted
//! rather than retried.

use log::warn;
use mongodb::bson::{oid::ObjectId, DateTime};
use thiserror::Error;

use crate::db::{CatalogStore, StoreError};
use crate::models::{Review, Service};
use crate::services::rating;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Service not found")]
    ServiceNotFound,
    #[error("Expert not found")]
    ExpertNotFound,
    #[error("Service already reviewed")]
    DuplicateReview,
    // Covers both an absent review id and an author mismatch, so a caller
    // cannot probe whether someone else's review exists
    #[error("Review not found or you're not authorized to modify it")]
    ReviewNotFound,
    #[error("Service was modified concurrently")]
    Conflict,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Façade over a [`CatalogStore`] for the four review-bearing mutations.
pub struct ReviewCatalog<'a> {
    store: &'a dyn CatalogStore,
}

impl<'a> ReviewCatalog<'a> {
    pub fn new(store: &'a dyn CatalogStore) -> Self {
        ReviewCatalog { store }
    }

    /// Append a review by `author_id`, at most one per author per service.
    pub async fn add_review(
        &self,
        service_id: ObjectId,
        author_id: ObjectId,
        review_rating: f64,
        comment: Option<String>,
    ) -> Result<Service, CatalogError> {
        let mut service = self
            .store
            .find_service(service_id)
            .await?
            .ok_or(CatalogError::ServiceNotFound)?;

        if service.reviews.iter().any(|r| r.user_id == author_id) {
            return Err(CatalogError::DuplicateReview);
        }

        let seen_version = service.review_version;
        let now = DateTime::now();
        service.reviews.push(Review {
            id: ObjectId::new(),
            user_id: author_id,
            rating: review_rating,
            comment,
            created_at: now,
            updated_at: now,
        });
        service.rating = rating::service_rating(&service.reviews);

        self.commit(&service, seen_version).await?;
        Ok(service)
    }

    /// Update the rating and/or comment of the author's own review.
    pub async fn edit_review(
        &self,
        service_id: ObjectId,
        review_id: ObjectId,
        author_id: ObjectId,
        new_rating: Option<f64>,
        new_comment: Option<String>,
    ) -> Result<Service, CatalogError> {
        let mut service = self
            .store
            .find_service(service_id)
            .await?
            .ok_or(CatalogError::ServiceNotFound)?;

        let seen_version = service.review_version;
        let review = service
            .reviews
            .iter_mut()
            .find(|r| r.id == review_id && r.user_id == author_id)
            .ok_or(CatalogError::ReviewNotFound)?;

        if let Some(r) = new_rating {
            review.rating = r;
        }
        if let Some(c) = new_comment {
            review.comment = Some(c);
        }
        review.updated_at = DateTime::now();
        service.rating = rating::service_rating(&service.reviews);

        self.commit(&service, seen_version).await?;
        Ok(service)
    }

    /// Remove the author's own review. An emptied review list drops the
    /// service rating back to 0.
    pub async fn remove_review(
        &self,
        service_id: ObjectId,
        review_id: ObjectId,
        author_id: ObjectId,
    ) -> Result<Service, CatalogError> {
        let mut service = self
            .store
            .find_service(service_id)
            .await?
            .ok_or(CatalogError::ServiceNotFound)?;

        let seen_version = service.review_version;
        let index = service
            .reviews
            .iter()
            .position(|r| r.id == review_id && r.user_id == author_id)
            .ok_or(CatalogError::ReviewNotFound)?;

        service.reviews.remove(index);
        service.rating = rating::service_rating(&service.reviews);

        self.commit(&service, seen_version).await?;
        Ok(service)
    }

    /// Delete a service outright. Ownership must already be verified by the
    /// caller. The expert's aggregates are rebuilt from the remaining
    /// services only when the deleted one carried reviews; the cached
    /// service count always drops by one, floored at zero.
    pub async fn delete_service(&self, service_id: ObjectId) -> Result<(), CatalogError> {
        let service = self
            .store
            .find_service(service_id)
            .await?
            .ok_or(CatalogError::ServiceNotFound)?;

        if !self.store.delete_service(service_id).await? {
            return Err(CatalogError::ServiceNotFound);
        }

        if !service.reviews.is_empty() {
            self.refresh_expert(service.expert_id).await;
        }
        self.store.decrement_service_count(service.expert_id).await?;
        Ok(())
    }

    /// Persist the mutated review list, then cascade to the expert.
    async fn commit(&self, service: &Service, seen_version: i64) -> Result<(), CatalogError> {
        let service_id = service.id.ok_or(CatalogError::ServiceNotFound)?;
        let stored = self
            .store
            .replace_reviews(service_id, &service.reviews, service.rating, seen_version)
            .await?;
        if !stored {
            return Err(CatalogError::Conflict);
        }

        self.refresh_expert(service.expert_id).await;
        Ok(())
    }

    /// Recompute the expert's aggregates from a fresh read of their services.
    /// A failure here leaves the expert stale while the service is already
    /// correct; accepted, not retried.
    async fn refresh_expert(&self, expert_id: ObjectId) {
        if let Err(e) = self.try_refresh_expert(expert_id).await {
            warn!(
                "expert {} aggregates left stale after service write: {}",
                expert_id.to_hex(),
                e
            );
        }
    }

    async fn try_refresh_expert(&self, expert_id: ObjectId) -> Result<(), CatalogError> {
        self.store
            .find_expert(expert_id)
            .await?
            .ok_or(CatalogError::ExpertNotFound)?;

        let services = self.store.find_services_by_expert(expert_id).await?;
        let agg = rating::expert_aggregate(&services);
        self.store
            .save_expert_aggregates(expert_id, agg.rating, agg.total_reviews)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BillingType, Expert, MeetingType, Pricing, ServiceType, Visibility,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        services: Mutex<HashMap<ObjectId, Service>>,
        experts: Mutex<HashMap<ObjectId, Expert>>,
        // Makes replace_reviews miss its guard, as if a concurrent writer won
        force_conflict: std::sync::atomic::AtomicBool,
        // Served once by find_service, to replay a read that happened before
        // another writer's commit landed
        stale_snapshot: Mutex<Option<Service>>,
    }

    #[rocket::async_trait]
    impl CatalogStore for MemoryStore {
        async fn find_service(&self, id: ObjectId) -> Result<Option<Service>, StoreError> {
            if let Some(snapshot) = self.stale_snapshot.lock().unwrap().take() {
                if snapshot.id == Some(id) {
                    return Ok(Some(snapshot));
                }
            }
            Ok(self.services.lock().unwrap().get(&id).cloned())
        }

        async fn find_services_by_expert(
            &self,
            expert_id: ObjectId,
        ) -> Result<Vec<Service>, StoreError> {
            Ok(self
                .services
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.expert_id == expert_id)
                .cloned()
                .collect())
        }

        async fn find_expert(&self, id: ObjectId) -> Result<Option<Expert>, StoreError> {
            Ok(self.experts.lock().unwrap().get(&id).cloned())
        }

        async fn replace_reviews(
            &self,
            service_id: ObjectId,
            reviews: &[Review],
            rating: f64,
            expected_version: i64,
        ) -> Result<bool, StoreError> {
            if self.force_conflict.load(std::sync::atomic::Ordering::SeqCst) {
                return Ok(false);
            }
            let mut services = self.services.lock().unwrap();
            match services.get_mut(&service_id) {
                Some(s) if s.review_version == expected_version => {
                    s.reviews = reviews.to_vec();
                    s.rating = rating;
                    s.review_version += 1;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn save_expert_aggregates(
            &self,
            expert_id: ObjectId,
            rating: f64,
            total_reviews: i64,
        ) -> Result<(), StoreError> {
            if let Some(e) = self.experts.lock().unwrap().get_mut(&expert_id) {
                e.rating = rating;
                e.total_reviews = total_reviews;
            }
            Ok(())
        }

        async fn delete_service(&self, id: ObjectId) -> Result<bool, StoreError> {
            Ok(self.services.lock().unwrap().remove(&id).is_some())
        }

        async fn decrement_service_count(&self, expert_id: ObjectId) -> Result<(), StoreError> {
            if let Some(e) = self.experts.lock().unwrap().get_mut(&expert_id) {
                e.service_count = (e.service_count - 1).max(0);
            }
            Ok(())
        }
    }

    fn review(user_id: ObjectId, review_rating: f64) -> Review {
        let now = DateTime::now();
        Review {
            id: ObjectId::new(),
            user_id,
            rating: review_rating,
            comment: Some("solid session".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    fn service(expert_id: ObjectId, reviews: Vec<Review>) -> Service {
        let now = DateTime::now();
        let cached = rating::service_rating(&reviews);
        Service {
            id: Some(ObjectId::new()),
            expert_id,
            name: "Mock interview".to_string(),
            slug: "mock-interview-42".to_string(),
            description: "A mock interview with feedback".to_string(),
            service_type: ServiceType::OneOnOne,
            pricing: Pricing {
                amount: 40.0,
                currency: "USD".to_string(),
                billing_type: BillingType::Fixed,
            },
            duration_minutes: 45,
            topics: vec!["interviewing".to_string()],
            meeting_type: MeetingType::Video,
            capacity: 1,
            visibility: Visibility::Public,
            is_active: true,
            bookings: 0,
            rating: cached,
            reviews,
            review_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn expert(service_count: i64) -> Expert {
        let now = DateTime::now();
        Expert {
            id: Some(ObjectId::new()),
            user_id: ObjectId::new(),
            title: "Staff engineer".to_string(),
            bio: "Fifteen years of backend work".to_string(),
            expertise: vec!["backend".to_string()],
            hourly_rate: Some(80.0),
            currency: "USD".to_string(),
            languages: vec!["English".to_string()],
            availability: None,
            rating: 0.0,
            total_reviews: 0,
            service_count,
            total_bookings: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    struct Fixture {
        store: MemoryStore,
        expert_id: ObjectId,
        service_id: ObjectId,
    }

    fn seed(reviews: Vec<Review>) -> Fixture {
        let store = MemoryStore::default();
        let mut expert = expert(1);
        let expert_id = expert.id.unwrap();
        let svc = service(expert_id, reviews);
        let service_id = svc.id.unwrap();

        // Seed expert aggregates as if previous cascades already ran
        let agg = rating::expert_aggregate(std::slice::from_ref(&svc));
        expert.rating = agg.rating;
        expert.total_reviews = agg.total_reviews;

        store.experts.lock().unwrap().insert(expert_id, expert);
        store.services.lock().unwrap().insert(service_id, svc);
        Fixture {
            store,
            expert_id,
            service_id,
        }
    }

    #[rocket::async_test]
    async fn add_review_updates_service_and_expert() {
        let fx = seed(vec![
            review(ObjectId::new(), 5.0),
            review(ObjectId::new(), 3.0),
        ]);
        let catalog = ReviewCatalog::new(&fx.store);

        let updated = catalog
            .add_review(fx.service_id, ObjectId::new(), 4.0, None)
            .await
            .unwrap();

        assert_eq!(updated.rating, 4.0);
        assert_eq!(updated.reviews.len(), 3);

        let expert = fx.store.experts.lock().unwrap()[&fx.expert_id].clone();
        assert_eq!(expert.rating, 4.0);
        assert_eq!(expert.total_reviews, 3);
    }

    #[rocket::async_test]
    async fn duplicate_review_is_rejected_without_mutation() {
        let author = ObjectId::new();
        let fx = seed(vec![review(author, 5.0), review(ObjectId::new(), 3.0)]);
        let catalog = ReviewCatalog::new(&fx.store);

        let err = catalog
            .add_review(fx.service_id, author, 1.0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateReview));

        let svc = fx.store.services.lock().unwrap()[&fx.service_id].clone();
        assert_eq!(svc.reviews.len(), 2);
        assert_eq!(svc.rating, 4.0);

        let expert = fx.store.experts.lock().unwrap()[&fx.expert_id].clone();
        assert_eq!(expert.rating, 4.0);
        assert_eq!(expert.total_reviews, 2);
    }

    #[rocket::async_test]
    async fn edit_review_recomputes_both_ratings() {
        let author = ObjectId::new();
        let fx = seed(vec![review(author, 3.0), review(ObjectId::new(), 5.0)]);
        let review_id = fx.store.services.lock().unwrap()[&fx.service_id].reviews[0].id;
        let catalog = ReviewCatalog::new(&fx.store);

        let updated = catalog
            .edit_review(fx.service_id, review_id, author, Some(5.0), None)
            .await
            .unwrap();

        assert_eq!(updated.rating, 5.0);
        let expert = fx.store.experts.lock().unwrap()[&fx.expert_id].clone();
        assert_eq!(expert.rating, 5.0);
        assert_eq!(expert.total_reviews, 2);
    }

    #[rocket::async_test]
    async fn edit_by_wrong_author_looks_like_missing_review() {
        let author = ObjectId::new();
        let fx = seed(vec![review(author, 3.0)]);
        let review_id = fx.store.services.lock().unwrap()[&fx.service_id].reviews[0].id;
        let catalog = ReviewCatalog::new(&fx.store);

        let wrong_author = catalog
            .edit_review(fx.service_id, review_id, ObjectId::new(), Some(5.0), None)
            .await
            .unwrap_err();
        let missing_id = catalog
            .edit_review(fx.service_id, ObjectId::new(), author, Some(5.0), None)
            .await
            .unwrap_err();

        assert!(matches!(wrong_author, CatalogError::ReviewNotFound));
        assert!(matches!(missing_id, CatalogError::ReviewNotFound));

        let svc = fx.store.services.lock().unwrap()[&fx.service_id].clone();
        assert_eq!(svc.reviews[0].rating, 3.0);
        assert_eq!(svc.rating, 3.0);
    }

    #[rocket::async_test]
    async fn removing_a_review_shifts_the_aggregates() {
        // Scenario: [5, 3] -> add 4 -> delete the 3 leaves 4.5 over 2 reviews
        let victim = ObjectId::new();
        let fx = seed(vec![review(ObjectId::new(), 5.0), review(victim, 3.0)]);
        let catalog = ReviewCatalog::new(&fx.store);

        catalog
            .add_review(fx.service_id, ObjectId::new(), 4.0, None)
            .await
            .unwrap();

        let review_id = fx.store.services.lock().unwrap()[&fx.service_id]
            .reviews
            .iter()
            .find(|r| r.user_id == victim)
            .unwrap()
            .id;
        let updated = catalog
            .remove_review(fx.service_id, review_id, victim)
            .await
            .unwrap();

        assert_eq!(updated.rating, 4.5);
        assert_eq!(updated.reviews.len(), 2);

        let expert = fx.store.experts.lock().unwrap()[&fx.expert_id].clone();
        assert_eq!(expert.rating, 4.5);
        assert_eq!(expert.total_reviews, 2);
    }

    #[rocket::async_test]
    async fn removing_the_last_review_zeroes_the_service_rating() {
        let author = ObjectId::new();
        let fx = seed(vec![review(author, 5.0)]);
        let review_id = fx.store.services.lock().unwrap()[&fx.service_id].reviews[0].id;
        let catalog = ReviewCatalog::new(&fx.store);

        let updated = catalog
            .remove_review(fx.service_id, review_id, author)
            .await
            .unwrap();

        assert_eq!(updated.rating, 0.0);
        assert!(updated.reviews.is_empty());

        let expert = fx.store.experts.lock().unwrap()[&fx.expert_id].clone();
        assert_eq!(expert.rating, 0.0);
        assert_eq!(expert.total_reviews, 0);
    }

    #[rocket::async_test]
    async fn delete_service_rebuilds_expert_from_remaining_services() {
        let fx = seed(vec![review(ObjectId::new(), 2.0)]);
        let other = service(fx.expert_id, vec![review(ObjectId::new(), 5.0)]);
        let other_id = other.id.unwrap();
        fx.store.services.lock().unwrap().insert(other_id, other);
        let catalog = ReviewCatalog::new(&fx.store);

        catalog.delete_service(fx.service_id).await.unwrap();

        assert!(!fx.store.services.lock().unwrap().contains_key(&fx.service_id));
        let expert = fx.store.experts.lock().unwrap()[&fx.expert_id].clone();
        assert_eq!(expert.rating, 5.0);
        assert_eq!(expert.total_reviews, 1);
        assert_eq!(expert.service_count, 0);
    }

    #[rocket::async_test]
    async fn delete_last_service_floors_count_and_zeroes_aggregates() {
        let fx = seed(vec![review(ObjectId::new(), 4.0)]);
        let catalog = ReviewCatalog::new(&fx.store);

        catalog.delete_service(fx.service_id).await.unwrap();
        // A second delete finds nothing
        let err = catalog.delete_service(fx.service_id).await.unwrap_err();
        assert!(matches!(err, CatalogError::ServiceNotFound));

        let expert = fx.store.experts.lock().unwrap()[&fx.expert_id].clone();
        assert_eq!(expert.rating, 0.0);
        assert_eq!(expert.total_reviews, 0);
        assert_eq!(expert.service_count, 0);
    }

    #[rocket::async_test]
    async fn concurrent_list_change_is_reported_as_conflict() {
        let fx = seed(vec![review(ObjectId::new(), 4.0)]);
        fx.store
            .force_conflict
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let catalog = ReviewCatalog::new(&fx.store);

        let err = catalog
            .add_review(fx.service_id, ObjectId::new(), 5.0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict));

        // Nothing changed, including the expert aggregates
        let svc = fx.store.services.lock().unwrap()[&fx.service_id].clone();
        assert_eq!(svc.reviews.len(), 1);
        let expert = fx.store.experts.lock().unwrap()[&fx.expert_id].clone();
        assert_eq!(expert.total_reviews, 1);
    }

    #[rocket::async_test]
    async fn stale_edit_cannot_silently_revert_a_committed_edit() {
        // Two edits leave the list length unchanged, so the guard has to
        // trip on the version, not the length
        let author_a = ObjectId::new();
        let author_b = ObjectId::new();
        let fx = seed(vec![review(author_a, 1.0), review(author_b, 5.0)]);
        let (review_a, review_b, pre_edit) = {
            let svc = fx.store.services.lock().unwrap()[&fx.service_id].clone();
            (svc.reviews[0].id, svc.reviews[1].id, svc)
        };
        let catalog = ReviewCatalog::new(&fx.store);

        catalog
            .edit_review(fx.service_id, review_a, author_a, Some(2.0), None)
            .await
            .unwrap();

        // B's read happened before A's edit landed
        *fx.store.stale_snapshot.lock().unwrap() = Some(pre_edit);
        let err = catalog
            .edit_review(fx.service_id, review_b, author_b, Some(4.0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict));

        // A's edit survived, B's stale write left no trace
        let svc = fx.store.services.lock().unwrap()[&fx.service_id].clone();
        let a = svc.reviews.iter().find(|r| r.user_id == author_a).unwrap();
        let b = svc.reviews.iter().find(|r| r.user_id == author_b).unwrap();
        assert_eq!(a.rating, 2.0);
        assert_eq!(b.rating, 5.0);
        assert_eq!(svc.rating, 3.5);
    }
}
