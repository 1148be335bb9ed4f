use mongodb::bson::{doc, DateTime};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{Expert, UpdateProfileDto, User, UserResponse};
use crate::utils::{validate_dto, ApiError, ApiResponse};

#[openapi(tag = "User")]
#[get("/user/profile")]
pub async fn get_profile(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user = db
        .collection::<User>("users")
        .find_one(doc! { "_id": auth.user_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let expert_profile = db
        .collection::<Expert>("experts")
        .find_one(doc! { "user_id": auth.user_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?;

    let user_response: UserResponse = user.into();
    let mut response_data = serde_json::to_value(&user_response)
        .map_err(|e| ApiError::internal_error(format!("Serialization error: {}", e)))?;

    if let Some(expert) = expert_profile {
        response_data["expert_id"] = serde_json::json!(expert.id.map(|id| id.to_hex()));
        response_data["expert_rating"] = serde_json::json!(expert.rating);
        response_data["expert_total_reviews"] = serde_json::json!(expert.total_reviews);
    } else {
        response_data["expert_id"] = serde_json::Value::Null;
    }

    Ok(Json(ApiResponse::success(response_data)))
}

#[openapi(tag = "User")]
#[put("/user/profile", data = "<dto>")]
pub async fn update_profile(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<UpdateProfileDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    validate_dto(&*dto)?;

    let mut update_doc = doc! {
        "updated_at": DateTime::now()
    };

    if let Some(ref first_name) = dto.first_name {
        update_doc.insert("first_name", first_name.trim());
    }
    if let Some(ref last_name) = dto.last_name {
        update_doc.insert("last_name", last_name.trim());
    }
    if let Some(ref profile_picture) = dto.profile_picture {
        update_doc.insert("profile_picture", profile_picture);
    }
    if let Some(ref interests) = dto.interests {
        update_doc.insert("interests", interests.clone());
    }

    db.collection::<User>("users")
        .update_one(
            doc! { "_id": auth.user_id },
            doc! { "$set": update_doc },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update profile: {}", e)))?;

    let user = db
        .collection::<User>("users")
        .find_one(doc! { "_id": auth.user_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let user_response: UserResponse = user.into();
    Ok(Json(ApiResponse::success_with_message(
        "Profile updated successfully".to_string(),
        serde_json::json!(user_response),
    )))
}
