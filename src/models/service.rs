use mongodb::bson::{oid::ObjectId, DateTime};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub enum ServiceType {
    OneOnOne,
    Group,
    Course,
    Workshop,
    Review,
    QnA,
    Mentorship,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub enum MeetingType {
    Video,
    Phone,
    InPerson,
    Chat,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub enum Visibility {
    Public,
    Private,
    Unlisted,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub enum BillingType {
    Fixed,
    Hourly,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct Pricing {
    pub amount: f64,
    pub currency: String,
    pub billing_type: BillingType,
}

/// A review embedded in its owning service. One per (user, service) pair,
/// enforced when the review is written.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub rating: f64, // 1-5
    pub comment: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Service {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub expert_id: ObjectId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub service_type: ServiceType,
    pub pricing: Pricing,
    pub duration_minutes: i64,
    pub topics: Vec<String>,
    pub meeting_type: MeetingType,
    pub capacity: i64,
    pub visibility: Visibility,
    pub is_active: bool,
    pub bookings: i64,
    // Cached mean of reviews[].rating, 0 when there are none.
    // Written only through the rating cascade, never from user input.
    pub rating: f64,
    pub reviews: Vec<Review>,
    // Bumped on every review-list write; the guard for conditional updates
    #[serde(default)]
    pub review_version: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateServiceDto {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 5000))]
    pub description: String,
    pub service_type: ServiceType,
    #[validate(range(min = 0.0))]
    pub price: f64,
    pub currency: Option<String>,
    pub billing_type: Option<BillingType>,
    #[validate(range(min = 5, max = 1440))]
    pub duration_minutes: i64,
    pub topics: Option<Vec<String>>,
    pub meeting_type: Option<MeetingType>,
    #[validate(range(min = 1))]
    pub capacity: Option<i64>,
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateServiceDto {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub description: Option<String>,
    pub service_type: Option<ServiceType>,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub billing_type: Option<BillingType>,
    #[validate(range(min = 5, max = 1440))]
    pub duration_minutes: Option<i64>,
    pub topics: Option<Vec<String>>,
    pub meeting_type: Option<MeetingType>,
    #[validate(range(min = 1))]
    pub capacity: Option<i64>,
    pub visibility: Option<Visibility>,
}

#[derive(Debug, FromForm, Deserialize, JsonSchema)]
pub struct ServiceListQuery {
    pub service_type: Option<String>,
    pub expert_id: Option<String>,
    pub meeting_type: Option<String>,
    pub topic: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, FromForm, Deserialize, JsonSchema)]
pub struct ExpertServicesQuery {
    pub active_only: Option<bool>,
    pub visibility: Option<String>,
    pub sort_by: Option<String>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateReviewDto {
    #[validate(range(min = 1.0, max = 5.0))]
    pub rating: f64,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateReviewDto {
    #[validate(range(min = 1.0, max = 5.0))]
    pub rating: Option<f64>,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateVisibilityDto {
    pub visibility: Visibility,
}
