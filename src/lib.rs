pub mod auth;
pub mod credential;
pub mod error;
pub mod finance;
pub mod identity;
pub mod server;
pub mod uid;
