pub mod response;
pub mod validation;

pub use response::{ApiError, ApiResponse};
pub use validation::{slugify, validate_dto};
