//! Aggregate rating computation for services and experts.
//!
//! Ratings are cached, derived fields: a service's rating is the arithmetic
//! mean of its embedded reviews, and an expert's rating is the mean across
//! every review of every service they own. The expert-level figure is
//! recovered from the cached per-service means weighted by review count,
//! which is exact as long as each service's own rating is current. Callers
//! must therefore persist a service's rating before recomputing its expert.

use crate::models::{Review, Service};

/// Mean of the review ratings, or 0 when there are none.
pub fn service_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    reviews.iter().map(|r| r.rating).sum::<f64>() / reviews.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpertAggregate {
    pub rating: f64,
    pub total_reviews: i64,
}

/// Review-count-weighted mean over the expert's services.
///
/// `rating * reviews.len()` recovers the total rating points contributed by
/// one service, so summing those and dividing by the overall review count
/// gives the true mean across all underlying reviews without re-reading them.
/// Zero total reviews yields `0.0 / 0`, never a division by zero.
pub fn expert_aggregate(services: &[Service]) -> ExpertAggregate {
    let total_reviews: usize = services.iter().map(|s| s.reviews.len()).sum();
    if total_reviews == 0 {
        return ExpertAggregate {
            rating: 0.0,
            total_reviews: 0,
        };
    }

    let total_points: f64 = services
        .iter()
        .map(|s| s.rating * s.reviews.len() as f64)
        .sum();

    ExpertAggregate {
        rating: total_points / total_reviews as f64,
        total_reviews: total_reviews as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingType, MeetingType, Pricing, ServiceType, Visibility};
    use mongodb::bson::{oid::ObjectId, DateTime};

    fn review(rating: f64) -> Review {
        let now = DateTime::now();
        Review {
            id: ObjectId::new(),
            user_id: ObjectId::new(),
            rating,
            comment: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn service(reviews: Vec<Review>) -> Service {
        let now = DateTime::now();
        let rating = service_rating(&reviews);
        Service {
            id: Some(ObjectId::new()),
            expert_id: ObjectId::new(),
            name: "Career coaching".to_string(),
            slug: "career-coaching-1".to_string(),
            description: "One hour session".to_string(),
            service_type: ServiceType::OneOnOne,
            pricing: Pricing {
                amount: 50.0,
                currency: "USD".to_string(),
                billing_type: BillingType::Fixed,
            },
            duration_minutes: 60,
            topics: vec![],
            meeting_type: MeetingType::Video,
            capacity: 1,
            visibility: Visibility::Public,
            is_active: true,
            bookings: 0,
            rating,
            reviews,
            review_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn service_rating_is_mean_of_reviews() {
        let reviews = vec![review(5.0), review(3.0)];
        assert_eq!(service_rating(&reviews), 4.0);

        let reviews = vec![review(5.0), review(3.0), review(4.0)];
        assert_eq!(service_rating(&reviews), 4.0);

        let reviews = vec![review(2.5)];
        assert_eq!(service_rating(&reviews), 2.5);
    }

    #[test]
    fn service_rating_of_no_reviews_is_zero() {
        assert_eq!(service_rating(&[]), 0.0);
    }

    #[test]
    fn expert_aggregate_weights_by_review_count() {
        // ratings [4, 5, 0] with counts [2, 2, 0] -> (4*2 + 5*2) / 4 = 4.5
        let services = vec![
            service(vec![review(4.0), review(4.0)]),
            service(vec![review(5.0), review(5.0)]),
            service(vec![]),
        ];

        let agg = expert_aggregate(&services);
        assert_eq!(agg.rating, 4.5);
        assert_eq!(agg.total_reviews, 4);
    }

    #[test]
    fn expert_aggregate_with_no_reviews_is_zero() {
        let services = vec![service(vec![]), service(vec![])];
        let agg = expert_aggregate(&services);
        assert_eq!(agg.rating, 0.0);
        assert_eq!(agg.total_reviews, 0);

        let agg = expert_aggregate(&[]);
        assert_eq!(agg.rating, 0.0);
        assert_eq!(agg.total_reviews, 0);
    }

    #[test]
    fn expert_aggregate_matches_flat_mean_over_all_reviews() {
        let services = vec![
            service(vec![review(5.0), review(3.0)]),
            service(vec![review(4.0)]),
        ];

        let agg = expert_aggregate(&services);
        assert_eq!(agg.rating, 4.0);
        assert_eq!(agg.total_reviews, 3);
    }
}
