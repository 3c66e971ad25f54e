pub mod config;
pub mod error;
pub mod models;
pub mod openapi;
pub mod params;
pub mod password;
pub mod repo;
pub mod response;
pub mod routes;
pub mod security;
pub mod sequence;
pub mod validate;

#[cfg(not(any(feature = "inmem-store", feature = "postgres-store")))]
compile_error!("enable at least one storage backend: `inmem-store` or `postgres-store`");

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
pub use response::StatusMode;
