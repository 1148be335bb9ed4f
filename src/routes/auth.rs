use mongodb::bson::{doc, DateTime};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::DbConn;
use crate::models::{LoginDto, RefreshTokenDto, RegisterDto, User, UserResponse, UserType};
use crate::services::JwtService;
use crate::utils::{validate_dto, ApiError, ApiResponse};

fn token_pair(user_id: &mongodb::bson::oid::ObjectId, email: &str) -> Result<(String, String), ApiError> {
    let access = JwtService::generate_access_token(user_id, email)
        .map_err(|e| ApiError::internal_error(format!("Token error: {}", e)))?;
    let refresh = JwtService::generate_refresh_token(user_id, email)
        .map_err(|e| ApiError::internal_error(format!("Token error: {}", e)))?;
    Ok((access, refresh))
}

#[openapi(tag = "Auth")]
#[post("/auth/register", data = "<dto>")]
pub async fn register(
    db: &State<DbConn>,
    dto: Json<RegisterDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    validate_dto(&*dto)?;

    let email = dto.email.trim().to_lowercase();

    let existing = db
        .collection::<User>("users")
        .find_one(doc! { "email": &email }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?;

    if existing.is_some() {
        return Err(ApiError::bad_request("Email already registered"));
    }

    let password_hash = bcrypt::hash(&dto.password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::internal_error(format!("Hashing error: {}", e)))?;

    let now = DateTime::now();
    let user = User {
        id: None,
        first_name: dto.first_name.trim().to_string(),
        last_name: dto.last_name.trim().to_string(),
        email: email.clone(),
        password_hash: Some(password_hash),
        profile_picture: None,
        user_type: UserType::Client,
        interests: vec![],
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<User>("users")
        .insert_one(&user, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to create user: {}", e)))?;

    let user_id = result
        .inserted_id
        .as_object_id()
        .ok_or_else(|| ApiError::internal_error("Invalid user ID"))?;

    let (access_token, refresh_token) = token_pair(&user_id, &email)?;

    Ok(Json(ApiResponse::success_with_message(
        "Account created successfully".to_string(),
        serde_json::json!({
            "user_id": user_id.to_hex(),
            "access_token": access_token,
            "refresh_token": refresh_token,
        }),
    )))
}

#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<dto>")]
pub async fn login(
    db: &State<DbConn>,
    dto: Json<LoginDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    validate_dto(&*dto)?;

    let email = dto.email.trim().to_lowercase();

    let user = db
        .collection::<User>("users")
        .find_one(doc! { "email": &email }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    // Accounts provisioned through an external provider have no local password
    let hash = user
        .password_hash
        .as_deref()
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    let valid = bcrypt::verify(&dto.password, hash)
        .map_err(|e| ApiError::internal_error(format!("Hashing error: {}", e)))?;
    if !valid {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    let user_id = user
        .id
        .ok_or_else(|| ApiError::internal_error("Invalid user ID"))?;
    let (access_token, refresh_token) = token_pair(&user_id, &email)?;

    let user_response: UserResponse = user.into();
    Ok(Json(ApiResponse::success(serde_json::json!({
        "user": user_response,
        "access_token": access_token,
        "refresh_token": refresh_token,
    }))))
}

#[openapi(tag = "Auth")]
#[post("/auth/refresh", data = "<dto>")]
pub async fn refresh_token(
    db: &State<DbConn>,
    dto: Json<RefreshTokenDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let claims = JwtService::verify_token(&dto.refresh_token, true)
        .map_err(|_| ApiError::unauthorized("Invalid or expired refresh token"))?;

    let user_id = mongodb::bson::oid::ObjectId::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;

    // The account may have been deleted since the token was issued
    db.collection::<User>("users")
        .find_one(doc! { "_id": user_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))?;

    let access_token = JwtService::generate_access_token(&user_id, &claims.email)
        .map_err(|e| ApiError::internal_error(format!("Token error: {}", e)))?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "access_token": access_token,
    }))))
}
