use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime, Document};
use mongodb::options::FindOptions;
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::{DbConn, MongoCatalogStore};
use crate::guards::AuthGuard;
use crate::models::{
    BillingType, CreateServiceDto, Expert, ExpertServicesQuery, MeetingType, Pricing, Service,
    ServiceListQuery, UpdateServiceDto, UpdateVisibilityDto, Visibility,
};
use crate::services::ReviewCatalog;
use crate::utils::{slugify, validate_dto, ApiError, ApiResponse};

/// Resolve a service and verify the requesting user owns the expert profile
/// that owns it.
pub async fn require_service_owner(
    db: &DbConn,
    service_id: ObjectId,
    user_id: ObjectId,
) -> Result<Service, ApiError> {
    let service = db
        .collection::<Service>("services")
        .find_one(doc! { "_id": service_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("Service not found"))?;

    let expert = db
        .collection::<Expert>("experts")
        .find_one(doc! { "_id": service.expert_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("Expert not found"))?;

    if expert.user_id != user_id {
        return Err(ApiError::forbidden(
            "Access denied. You do not own this service",
        ));
    }

    Ok(service)
}

async fn collect_services(
    db: &DbConn,
    filter: Document,
    options: Option<FindOptions>,
) -> Result<Vec<Service>, ApiError> {
    db.collection::<Service>("services")
        .find(filter, options)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Collection error: {}", e)))
}

fn service_summary(service: &Service) -> serde_json::Value {
    let mut value = serde_json::json!(service);
    value["review_count"] = serde_json::json!(service.reviews.len());
    value
}

#[openapi(tag = "Services")]
#[post("/services", data = "<dto>")]
pub async fn create_service(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<CreateServiceDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    validate_dto(&*dto)?;

    let expert = db
        .collection::<Expert>("experts")
        .find_one(doc! { "user_id": auth.user_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| {
            ApiError::not_found("Expert profile not found. Create an expert profile first")
        })?;

    let expert_id = expert
        .id
        .ok_or_else(|| ApiError::internal_error("Invalid expert ID"))?;

    let now = DateTime::now();
    let service = Service {
        id: None,
        expert_id,
        name: dto.name.trim().to_string(),
        slug: slugify(&dto.name),
        description: dto.description.clone(),
        service_type: dto.service_type.clone(),
        pricing: Pricing {
            amount: dto.price,
            currency: dto.currency.clone().unwrap_or_else(|| "USD".to_string()),
            billing_type: dto.billing_type.clone().unwrap_or(BillingType::Fixed),
        },
        duration_minutes: dto.duration_minutes,
        topics: dto.topics.clone().unwrap_or_default(),
        meeting_type: dto.meeting_type.clone().unwrap_or(MeetingType::Video),
        capacity: dto.capacity.unwrap_or(1),
        visibility: dto.visibility.clone().unwrap_or(Visibility::Public),
        is_active: true,
        bookings: 0,
        rating: 0.0,
        reviews: vec![],
        review_version: 0,
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<Service>("services")
        .insert_one(&service, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to create service: {}", e)))?;

    db.collection::<Expert>("experts")
        .update_one(
            doc! { "_id": expert_id },
            doc! {
                "$inc": { "service_count": 1 },
                "$set": { "updated_at": DateTime::now() },
            },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update expert: {}", e)))?;

    Ok(Json(ApiResponse::success_with_message(
        "Service created successfully".to_string(),
        serde_json::json!({
            "service_id": result.inserted_id.as_object_id().map(|id| id.to_hex()),
            "slug": service.slug,
        }),
    )))
}

#[openapi(tag = "Services")]
#[get("/services?<query..>")]
pub async fn list_services(
    db: &State<DbConn>,
    query: ServiceListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let skip = (page - 1) * limit;

    let mut filter = doc! { "is_active": true };

    if let Some(ref service_type) = query.service_type {
        filter.insert("service_type", service_type);
    }
    if let Some(ref meeting_type) = query.meeting_type {
        filter.insert("meeting_type", meeting_type);
    }
    if let Some(ref topic) = query.topic {
        filter.insert("topics", doc! { "$in": [topic] });
    }

    if query.min_price.is_some() || query.max_price.is_some() {
        let mut price = doc! {};
        if let Some(min) = query.min_price {
            price.insert("$gte", min);
        }
        if let Some(max) = query.max_price {
            price.insert("$lte", max);
        }
        filter.insert("pricing.amount", price);
    }

    if let Some(min_rating) = query.min_rating {
        filter.insert("rating", doc! { "$gte": min_rating });
    }

    if let Some(ref search) = query.search {
        let pattern = regex::escape(search);
        filter.insert(
            "$or",
            vec![
                doc! { "name": { "$regex": &pattern, "$options": "i" } },
                doc! { "description": { "$regex": &pattern, "$options": "i" } },
                doc! { "topics": { "$regex": &pattern, "$options": "i" } },
            ],
        );
    }

    // Private services only show up when an expert is explicitly requested
    match query.expert_id {
        Some(ref expert_id) => {
            let object_id = ObjectId::parse_str(expert_id)
                .map_err(|_| ApiError::bad_request("Invalid expert ID"))?;
            filter.insert("expert_id", object_id);
        }
        None => {
            filter.insert("visibility", doc! { "$ne": "Private" });
        }
    }

    let sort = match query.sort_by.as_deref() {
        Some("price_asc") => doc! { "pricing.amount": 1 },
        Some("price_desc") => doc! { "pricing.amount": -1 },
        Some("rating") => doc! { "rating": -1 },
        Some("popularity") => doc! { "bookings": -1 },
        Some("newest") => doc! { "created_at": -1 },
        Some("duration_asc") => doc! { "duration_minutes": 1 },
        Some("duration_desc") => doc! { "duration_minutes": -1 },
        _ => doc! { "rating": -1, "bookings": -1 },
    };

    let total = db
        .collection::<Service>("services")
        .count_documents(filter.clone(), None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Count error: {}", e)))?;

    let options = FindOptions::builder()
        .sort(sort)
        .skip(skip as u64)
        .limit(limit)
        .build();

    let services = collect_services(db, filter, Some(options)).await?;
    let summaries: Vec<serde_json::Value> = services.iter().map(service_summary).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "services": summaries,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "pages": (total as f64 / limit as f64).ceil() as i64,
        }
    }))))
}

#[openapi(tag = "Services")]
#[get("/services/featured")]
pub async fn featured_services(
    db: &State<DbConn>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let filter = doc! {
        "is_active": true,
        "visibility": "Public",
        "$or": [
            { "rating": { "$gte": 4.5 } },
            { "bookings": { "$gte": 5 } },
        ]
    };

    let options = FindOptions::builder()
        .sort(doc! { "rating": -1, "bookings": -1 })
        .limit(6)
        .build();

    let services = collect_services(db, filter, Some(options)).await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "services": services,
        "total": services.len(),
    }))))
}

fn topic_filter(topic: &str) -> Document {
    doc! {
        "topics": { "$in": [topic] },
        "is_active": true,
        "visibility": "Public",
    }
}

fn top_rated_filter() -> Document {
    doc! {
        "is_active": true,
        "visibility": "Public",
        "rating": { "$gte": 4.0 },
        // Unrated services never qualify, however new
        "reviews.0": { "$exists": true },
    }
}

fn affordable_filter() -> Document {
    doc! {
        "is_active": true,
        "visibility": "Public",
        "pricing.amount": { "$lte": 50.0 },
        "rating": { "$gte": 3.5 },
    }
}

#[openapi(tag = "Services")]
#[get("/services/topics/<topic>")]
pub async fn get_services_by_topic(
    db: &State<DbConn>,
    topic: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let options = FindOptions::builder()
        .sort(doc! { "rating": -1, "bookings": -1 })
        .limit(10)
        .build();

    let services = collect_services(db, topic_filter(&topic), Some(options)).await?;
    let summaries: Vec<serde_json::Value> = services.iter().map(service_summary).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "topic": topic,
        "services": summaries,
        "total": summaries.len(),
    }))))
}

#[openapi(tag = "Services")]
#[get("/services/discover/top-rated")]
pub async fn top_rated_services(
    db: &State<DbConn>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let options = FindOptions::builder()
        .sort(doc! { "rating": -1, "bookings": -1 })
        .limit(10)
        .build();

    let services = collect_services(db, top_rated_filter(), Some(options)).await?;
    let summaries: Vec<serde_json::Value> = services.iter().map(service_summary).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "services": summaries,
        "total": summaries.len(),
    }))))
}

#[openapi(tag = "Services")]
#[get("/services/discover/affordable")]
pub async fn affordable_services(
    db: &State<DbConn>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let options = FindOptions::builder()
        .sort(doc! { "pricing.amount": 1, "rating": -1 })
        .limit(10)
        .build();

    let services = collect_services(db, affordable_filter(), Some(options)).await?;
    let summaries: Vec<serde_json::Value> = services.iter().map(service_summary).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "services": summaries,
        "total": summaries.len(),
    }))))
}

#[openapi(tag = "Services")]
#[get("/services/<service_id>")]
pub async fn get_service(
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

    Ok(Json(ApiResponse::success(service_summary(&service))))
}

#[openapi(tag = "Services")]
#[get("/services/slug/<slug>")]
pub async fn get_service_by_slug(
    db: &State<DbConn>,
    slug: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let service = db
        .collection::<Service>("services")
        .find_one(doc! { "slug": &slug }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("Service not found"))?;

    Ok(Json(ApiResponse::success(service_summary(&service))))
}

#[openapi(tag = "Services")]
#[get("/services/expert/<expert_id>?<query..>")]
pub async fn get_expert_services(
    db: &State<DbConn>,
    expert_id: String,
    query: ExpertServicesQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let object_id = ObjectId::parse_str(&expert_id)
        .map_err(|_| ApiError::bad_request("Invalid expert ID"))?;

    let mut filter = doc! { "expert_id": object_id };
    if query.active_only.unwrap_or(false) {
        filter.insert("is_active", true);
    }
    if let Some(ref visibility) = query.visibility {
        filter.insert("visibility", visibility);
    }

    let sort = match query.sort_by.as_deref() {
        Some("price_asc") => doc! { "pricing.amount": 1 },
        Some("price_desc") => doc! { "pricing.amount": -1 },
        Some("rating") => doc! { "rating": -1 },
        Some("popularity") => doc! { "bookings": -1 },
        _ => doc! { "created_at": -1 },
    };

    let options = FindOptions::builder().sort(sort).build();
    let services = collect_services(db, filter, Some(options)).await?;
    let summaries: Vec<serde_json::Value> = services.iter().map(service_summary).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "services": summaries,
        "total": summaries.len(),
    }))))
}

#[openapi(tag = "Services")]
#[put("/services/<service_id>", data = "<dto>")]
pub async fn update_service(
    db: &State<DbConn>,
    auth: AuthGuard,
    service_id: String,
    dto: Json<UpdateServiceDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    validate_dto(&*dto)?;

    let object_id = ObjectId::parse_str(&service_id)
        .map_err(|_| ApiError::bad_request("Invalid service ID"))?;
    require_service_owner(db, object_id, auth.user_id).await?;

    let mut update_doc = doc! {
        "updated_at": DateTime::now()
    };

    if let Some(ref name) = dto.name {
        update_doc.insert("name", name.trim());
        // Renames get a fresh slug
        update_doc.insert("slug", slugify(name));
    }
    if let Some(ref description) = dto.description {
        update_doc.insert("description", description);
    }
    if let Some(ref service_type) = dto.service_type {
        let value = to_bson(service_type)
            .map_err(|e| ApiError::internal_error(format!("Serialization error: {}", e)))?;
        update_doc.insert("service_type", value);
    }
    if let Some(price) = dto.price {
        update_doc.insert("pricing.amount", price);
    }
    if let Some(ref currency) = dto.currency {
        update_doc.insert("pricing.currency", currency);
    }
    if let Some(ref billing_type) = dto.billing_type {
        let value = to_bson(billing_type)
            .map_err(|e| ApiError::internal_error(format!("Serialization error: {}", e)))?;
        update_doc.insert("pricing.billing_type", value);
    }
    if let Some(duration) = dto.duration_minutes {
        update_doc.insert("duration_minutes", duration);
    }
    if let Some(ref topics) = dto.topics {
        update_doc.insert("topics", topics.clone());
    }
    if let Some(ref meeting_type) = dto.meeting_type {
        let value = to_bson(meeting_type)
            .map_err(|e| ApiError::internal_error(format!("Serialization error: {}", e)))?;
        update_doc.insert("meeting_type", value);
    }
    if let Some(capacity) = dto.capacity {
        update_doc.insert("capacity", capacity);
    }
    if let Some(ref visibility) = dto.visibility {
        let value = to_bson(visibility)
            .map_err(|e| ApiError::internal_error(format!("Serialization error: {}", e)))?;
        update_doc.insert("visibility", value);
    }

    db.collection::<Service>("services")
        .update_one(doc! { "_id": object_id }, doc! { "$set": update_doc }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update service: {}", e)))?;

    let service = db
        .collection::<Service>("services")
        .find_one(doc! { "_id": object_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("Service not found"))?;

    Ok(Json(ApiResponse::success_with_message(
        "Service updated successfully".to_string(),
        service_summary(&service),
    )))
}

#[openapi(tag = "Services")]
#[patch("/services/<service_id>/toggle-status")]
pub async fn toggle_service_status(
    db: &State<DbConn>,
    auth: AuthGuard,
    service_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let object_id = ObjectId::parse_str(&service_id)
        .map_err(|_| ApiError::bad_request("Invalid service ID"))?;
    let service = require_service_owner(db, object_id, auth.user_id).await?;

    let new_status = !service.is_active;
    db.collection::<Service>("services")
        .update_one(
            doc! { "_id": object_id },
            doc! { "$set": { "is_active": new_status, "updated_at": DateTime::now() } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update service: {}", e)))?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "service_id": service_id,
        "is_active": new_status,
    }))))
}

#[openapi(tag = "Services")]
#[patch("/services/<service_id>/visibility", data = "<dto>")]
pub async fn update_service_visibility(
    db: &State<DbConn>,
    auth: AuthGuard,
    service_id: String,
    dto: Json<UpdateVisibilityDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let object_id = ObjectId::parse_str(&service_id)
        .map_err(|_| ApiError::bad_request("Invalid service ID"))?;
    require_service_owner(db, object_id, auth.user_id).await?;

    let value = to_bson(&dto.visibility)
        .map_err(|e| ApiError::internal_error(format!("Serialization error: {}", e)))?;

    db.collection::<Service>("services")
        .update_one(
            doc! { "_id": object_id },
            doc! { "$set": { "visibility": value, "updated_at": DateTime::now() } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update service: {}", e)))?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "service_id": service_id,
        "visibility": &dto.visibility,
    }))))
}

#[openapi(tag = "Services")]
#[patch("/services/<service_id>/increment-bookings")]
pub async fn increment_bookings(
    db: &State<DbConn>,
    _auth: AuthGuard,
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

    db.collection::<Service>("services")
        .update_one(
            doc! { "_id": object_id },
            doc! { "$inc": { "bookings": 1 }, "$set": { "updated_at": DateTime::now() } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update service: {}", e)))?;

    db.collection::<Expert>("experts")
        .update_one(
            doc! { "_id": service.expert_id },
            doc! { "$inc": { "total_bookings": 1 } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update expert: {}", e)))?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "service_id": service_id,
        "bookings": service.bookings + 1,
    }))))
}

#[openapi(tag = "Services")]
#[delete("/services/<service_id>")]
pub async fn delete_service(
    db: &State<DbConn>,
    auth: AuthGuard,
    service_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let object_id = ObjectId::parse_str(&service_id)
        .map_err(|_| ApiError::bad_request("Invalid service ID"))?;
    require_service_owner(db, object_id, auth.user_id).await?;

    let store = MongoCatalogStore::new(db);
    let catalog = ReviewCatalog::new(&store);
    catalog.delete_service(object_id).await.map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Service deleted successfully"
    }))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_filter_only_matches_public_active_services() {
        let filter = topic_filter("rust");

        assert!(filter.get_bool("is_active").unwrap());
        assert_eq!(filter.get_str("visibility").unwrap(), "Public");
        let topics = filter.get_document("topics").unwrap();
        assert_eq!(topics.get_array("$in").unwrap().len(), 1);
    }

    #[test]
    fn top_rated_filter_requires_reviews_behind_the_rating() {
        let filter = top_rated_filter();

        assert_eq!(
            filter.get_document("rating").unwrap().get_f64("$gte").unwrap(),
            4.0
        );
        assert!(filter
            .get_document("reviews.0")
            .unwrap()
            .get_bool("$exists")
            .unwrap());
        assert_eq!(filter.get_str("visibility").unwrap(), "Public");
    }

    #[test]
    fn affordable_filter_caps_price_and_floors_rating() {
        let filter = affordable_filter();

        assert_eq!(
            filter
                .get_document("pricing.amount")
                .unwrap()
                .get_f64("$lte")
                .unwrap(),
            50.0
        );
        assert_eq!(
            filter.get_document("rating").unwrap().get_f64("$gte").unwrap(),
            3.5
        );
        assert!(filter.get_bool("is_active").unwrap());
    }
}
