pub mod config;
pub mod crypto;
pub mod http_executor;
pub mod postgres_action_repo;
pub mod postgres_quota_repo;
pub mod repository;

pub use config::*;
pub use crypto::*;
pub use http_executor::*;
pub use postgres_action_repo::*;
pub use postgres_quota_repo::*;
pub use repository::*;
