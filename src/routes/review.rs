use mongodb::bson::{doc, oid::ObjectId};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::{DbConn, MongoCatalogStore};
use crate::guards::AuthGuard;
use crate::models::{CreateReviewDto, Service, UpdateReviewDto};
use crate::services::ReviewCatalog;
use crate::utils::{validate_dto, ApiError, ApiResponse};

fn review_payload(service: &Service) -> serde_json::Value {
    serde_json::json!({
        "service_id": service.id.map(|id| id.to_hex()),
        "rating": service.rating,
        "total_reviews": service.reviews.len(),
        "reviews": service.reviews,
    })
}

#[openapi(tag = "Review")]
#[post("/services/<service_id>/reviews", data = "<dto>")]
pub async fn add_review(
    db: &State<DbConn>,
    auth: AuthGuard,
    service_id: String,
    dto: Json<CreateReviewDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    validate_dto(&*dto)?;

    let object_id = ObjectId::parse_str(&service_id)
        .map_err(|_| ApiError::bad_request("Invalid service ID"))?;

    let store = MongoCatalogStore::new(db);
    let catalog = ReviewCatalog::new(&store);
    let service = catalog
        .add_review(object_id, auth.user_id, dto.rating, dto.comment.clone())
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success_with_message(
        "Review added".to_string(),
        review_payload(&service),
    )))
}

#[openapi(tag = "Review")]
#[patch("/services/<service_id>/reviews/<review_id>", data = "<dto>")]
pub async fn update_review(
    db: &State<DbConn>,
    auth: AuthGuard,
    service_id: String,
    review_id: String,
    dto: Json<UpdateReviewDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    validate_dto(&*dto)?;

    let service_oid = ObjectId::parse_str(&service_id)
        .map_err(|_| ApiError::bad_request("Invalid service ID"))?;
    let review_oid = ObjectId::parse_str(&review_id)
        .map_err(|_| ApiError::bad_request("Invalid review ID"))?;

    let store = MongoCatalogStore::new(db);
    let catalog = ReviewCatalog::new(&store);
    let service = catalog
        .edit_review(
            service_oid,
            review_oid,
            auth.user_id,
            dto.rating,
            dto.comment.clone(),
        )
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success_with_message(
        "Review updated".to_string(),
        review_payload(&service),
    )))
}

#[openapi(tag = "Review")]
#[delete("/services/<service_id>/reviews/<review_id>")]
pub async fn delete_review(
    db: &State<DbConn>,
    auth: AuthGuard,
    service_id: String,
    review_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let service_oid = ObjectId::parse_str(&service_id)
        .map_err(|_| ApiError::bad_request("Invalid service ID"))?;
    let review_oid = ObjectId::parse_str(&review_id)
        .map_err(|_| ApiError::bad_request("Invalid review ID"))?;

    let store = MongoCatalogStore::new(db);
    let catalog = ReviewCatalog::new(&store);
    let service = catalog
        .remove_review(service_oid, review_oid, auth.user_id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success_with_message(
        "Review deleted".to_string(),
        review_payload(&service),
    )))
}

#[openapi(tag = "Review")]
#[get("/services/<service_id>/reviews")]
pub async fn get_service_reviews(
    db: &State<DbConn>,
    service_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let object_id = ObjectId::parse_str(&service_id)
        .map_err(|_| ApiError::bad_request("Invalid service ID"))?;

    let service = db
        .collection::<Service>("services")
        .find_one(doc! { "_id": object_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("Service not found"))?;

    // Newest first
    let mut reviews = service.reviews.clone();
    reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(ApiResponse::success(serde_json::json!({
        "reviews": reviews,
        "average_rating": service.rating,
        "total_reviews": reviews.len(),
    }))))
}
