pub mod catalog;
pub mod jwt;
pub mod rating;

pub use catalog::{CatalogError, ReviewCatalog};
pub use jwt::JwtService;
