pub mod expert;
pub mod service;
pub mod user;

pub use expert::*;
pub use service::*;
pub use user::*;
