use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime};
use mongodb::options::FindOptions;
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{
    CreateExpertDto, Expert, ExpertListQuery, UpdateAvailabilityDto, UpdateExpertDto,
    UpdateExpertiseDto, User,
};
use crate::utils::{validate_dto, ApiError, ApiResponse};

async fn require_expert_owner(
    db: &DbConn,
    expert_id: ObjectId,
    user_id: ObjectId,
) -> Result<Expert, ApiError> {
    let expert = db
        .collection::<Expert>("experts")
        .find_one(doc! { "_id": expert_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("Expert profile not found"))?;

    if expert.user_id != user_id {
        return Err(ApiError::forbidden("Access denied"));
    }
    Ok(expert)
}

#[openapi(tag = "Expert")]
#[post("/experts", data = "<dto>")]
pub async fn create_expert(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<CreateExpertDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    validate_dto(&*dto)?;

    let existing = db
        .collection::<Expert>("experts")
        .find_one(doc! { "user_id": auth.user_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?;

    if existing.is_some() {
        return Err(ApiError::bad_request(
            "Expert profile already exists for this user",
        ));
    }

    db.collection::<User>("users")
        .find_one(doc! { "_id": auth.user_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let now = DateTime::now();
    let expert = Expert {
        id: None,
        user_id: auth.user_id,
        title: dto.title.trim().to_string(),
        bio: dto.bio.clone(),
        expertise: dto.expertise.clone(),
        hourly_rate: dto.hourly_rate,
        currency: dto.currency.clone().unwrap_or_else(|| "USD".to_string()),
        languages: dto.languages.clone().unwrap_or_default(),
        availability: dto.availability.clone(),
        rating: 0.0,
        total_reviews: 0,
        service_count: 0,
        total_bookings: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<Expert>("experts")
        .insert_one(&expert, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to create expert profile: {}", e)))?;

    db.collection::<User>("users")
        .update_one(
            doc! { "_id": auth.user_id },
            doc! { "$set": { "user_type": "expert", "updated_at": DateTime::now() } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update user: {}", e)))?;

    Ok(Json(ApiResponse::success_with_message(
        "Expert profile created successfully".to_string(),
        serde_json::json!({
            "expert_id": result.inserted_id.as_object_id().map(|id| id.to_hex()),
        }),
    )))
}

#[openapi(tag = "Expert")]
#[get("/experts?<query..>")]
pub async fn list_experts(
    db: &State<DbConn>,
    query: ExpertListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut filter = doc! { "is_active": true };

    if let Some(ref expertise) = query.expertise {
        filter.insert("expertise", doc! { "$in": [expertise] });
    }
    if let Some(ref language) = query.language {
        filter.insert("languages", doc! { "$in": [language] });
    }
    if let Some(min_rating) = query.min_rating {
        filter.insert("rating", doc! { "$gte": min_rating });
    }

    let sort = match query.sort_by.as_deref() {
        Some("rating") => doc! { "rating": -1 },
        _ => doc! { "created_at": -1 },
    };

    let options = FindOptions::builder().sort(sort).build();

    let experts: Vec<Expert> = db
        .collection::<Expert>("experts")
        .find(filter, options)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Collection error: {}", e)))?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "experts": experts,
        "total": experts.len(),
    }))))
}

#[openapi(tag = "Expert")]
#[get("/experts/<expert_id>")]
pub async fn get_expert(
    db: &State<DbConn>,
    expert_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let object_id = ObjectId::parse_str(&expert_id)
        .map_err(|_| ApiError::bad_request("Invalid expert ID"))?;

    let expert = db
        .collection::<Expert>("experts")
        .find_one(doc! { "_id": object_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("Expert not found"))?;

    Ok(Json(ApiResponse::success(serde_json::json!(expert))))
}

#[openapi(tag = "Expert")]
#[get("/experts/user/<user_id>")]
pub async fn get_expert_by_user(
    db: &State<DbConn>,
    user_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let object_id =
        ObjectId::parse_str(&user_id).map_err(|_| ApiError::bad_request("Invalid user ID"))?;

    let expert = db
        .collection::<Expert>("experts")
        .find_one(doc! { "user_id": object_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("Expert profile not found"))?;

    Ok(Json(ApiResponse::success(serde_json::json!(expert))))
}

#[openapi(tag = "Expert")]
#[put("/experts/<expert_id>", data = "<dto>")]
pub async fn update_expert(
    db: &State<DbConn>,
    auth: AuthGuard,
    expert_id: String,
    dto: Json<UpdateExpertDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    validate_dto(&*dto)?;

    let object_id = ObjectId::parse_str(&expert_id)
        .map_err(|_| ApiError::bad_request("Invalid expert ID"))?;
    require_expert_owner(db, object_id, auth.user_id).await?;

    let mut update_doc = doc! {
        "updated_at": DateTime::now()
    };
    if let Some(ref title) = dto.title {
        update_doc.insert("title", title.trim());
    }
    if let Some(ref bio) = dto.bio {
        update_doc.insert("bio", bio);
    }
    if let Some(ref expertise) = dto.expertise {
        update_doc.insert("expertise", expertise.clone());
    }
    if let Some(hourly_rate) = dto.hourly_rate {
        update_doc.insert("hourly_rate", hourly_rate);
    }
    if let Some(ref currency) = dto.currency {
        update_doc.insert("currency", currency);
    }
    if let Some(ref languages) = dto.languages {
        update_doc.insert("languages", languages.clone());
    }
    if let Some(ref availability) = dto.availability {
        let value = to_bson(availability)
            .map_err(|e| ApiError::internal_error(format!("Serialization error: {}", e)))?;
        update_doc.insert("availability", value);
    }

    db.collection::<Expert>("experts")
        .update_one(doc! { "_id": object_id }, doc! { "$set": update_doc }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update expert: {}", e)))?;

    let expert = db
        .collection::<Expert>("experts")
        .find_one(doc! { "_id": object_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("Expert not found"))?;

    Ok(Json(ApiResponse::success_with_message(
        "Expert profile updated successfully".to_string(),
        serde_json::json!(expert),
    )))
}

#[openapi(tag = "Expert")]
#[patch("/experts/<expert_id>/expertise", data = "<dto>")]
pub async fn update_expertise(
    db: &State<DbConn>,
    auth: AuthGuard,
    expert_id: String,
    dto: Json<UpdateExpertiseDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    validate_dto(&*dto)?;

    let object_id = ObjectId::parse_str(&expert_id)
        .map_err(|_| ApiError::bad_request("Invalid expert ID"))?;
    require_expert_owner(db, object_id, auth.user_id).await?;

    db.collection::<Expert>("experts")
        .update_one(
            doc! { "_id": object_id },
            doc! { "$set": { "expertise": dto.expertise.clone(), "updated_at": DateTime::now() } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update expert: {}", e)))?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "expert_id": expert_id,
        "expertise": &dto.expertise,
    }))))
}

#[openapi(tag = "Expert")]
#[patch("/experts/<expert_id>/availability", data = "<dto>")]
pub async fn update_availability(
    db: &State<DbConn>,
    auth: AuthGuard,
    expert_id: String,
    dto: Json<UpdateAvailabilityDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let object_id = ObjectId::parse_str(&expert_id)
        .map_err(|_| ApiError::bad_request("Invalid expert ID"))?;
    require_expert_owner(db, object_id, auth.user_id).await?;

    let value = to_bson(&dto.availability)
        .map_err(|e| ApiError::internal_error(format!("Serialization error: {}", e)))?;

    db.collection::<Expert>("experts")
        .update_one(
            doc! { "_id": object_id },
            doc! { "$set": { "availability": value, "updated_at": DateTime::now() } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update expert: {}", e)))?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "expert_id": expert_id,
        "availability": &dto.availability,
    }))))
}

#[openapi(tag = "Expert")]
#[patch("/experts/<expert_id>/toggle-status")]
pub async fn toggle_expert_status(
    db: &State<DbConn>,
    auth: AuthGuard,
    expert_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let object_id = ObjectId::parse_str(&expert_id)
        .map_err(|_| ApiError::bad_request("Invalid expert ID"))?;
    let expert = require_expert_owner(db, object_id, auth.user_id).await?;

    let new_status = !expert.is_active;
    db.collection::<Expert>("experts")
        .update_one(
            doc! { "_id": object_id },
            doc! { "$set": { "is_active": new_status, "updated_at": DateTime::now() } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update expert: {}", e)))?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "expert_id": expert_id,
        "is_active": new_status,
    }))))
}
