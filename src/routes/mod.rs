pub mod auth;
pub mod expert;
pub mod review;
pub mod service;
pub mod user;
