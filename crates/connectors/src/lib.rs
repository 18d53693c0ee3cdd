pub mod auth;
pub mod error;
pub mod source;
pub mod store;
