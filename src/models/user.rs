use mongodb::bson::{oid::ObjectId, DateTime};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Client,
    Expert,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    // Absent for accounts created through an external identity provider
    pub password_hash: Option<String>,
    pub profile_picture: Option<String>,
    pub user_type: UserType,
    pub interests: Vec<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// User as returned to clients, without credential material.
#[derive(Debug, Serialize, JsonSchema)]
pub struct UserResponse {
    pub id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub user_type: UserType,
    pub interests: Vec<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id.map(|id| id.to_hex()),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            profile_picture: user.profile_picture,
            user_type: user.user_type,
            interests: user.interests,
        }
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct RegisterDto {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct LoginDto {
    #[validate(email)]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RefreshTokenDto {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateProfileDto {
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    pub profile_picture: Option<String>,
    pub interests: Option<Vec<String>>,
}
