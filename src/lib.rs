//! Action Lanes
//!
//! Durable, quota-aware scheduler that paces bulk social-network actions
//! across many accounts: one lane per account, one action in flight per
//! lane, jittered spacing and per-day quotas backed by Postgres.
//!
//! ## Standalone
//!
//! Run the binary:
//! ```bash
//! action-lanes-server
//! ```
//!
//! ## Embedded (Axum)
//!
//! When the `server` feature is enabled, this crate can be embedded into a larger Axum app:
//! ```rust,ignore
//! use axum::Router;
//! use action_lanes::infrastructure::AppConfig;
//! use action_lanes::server::{build_state_with_pool, router};
//! use sqlx::PgPool;
//!
//! let cfg = AppConfig::from_env()?;
//! let pool = PgPool::connect(&cfg.database_url).await?;
//! let state = build_state_with_pool(cfg, pool, true).await?;
//! let app = Router::new().nest("/lanes", router(state));
//! ```
//!
//! ## Library only
//!
//! Without the `server` feature, build a [`application::Scheduler`] from
//! repository implementations and an [`application::Executor`] of your own.

pub mod application;
pub mod domain;
pub mod infrastructure;

// Standalone + embedded HTTP server support (Axum).
// Enabled behind the `server` feature so the core library can be used without Axum.
#[cfg(feature = "server")]
pub mod server;

pub use application::{
    AccountService, CampaignRequest, ExecutionRequest, Executor, JitterPolicy, Outcome,
    Scheduler, SchedulerDeps, SchedulerError, SchedulerSettings,
};
pub use domain::*;
pub use infrastructure::{AppConfig, CredentialVault, RepositoryError};

#[cfg(feature = "server")]
pub use server::*;
