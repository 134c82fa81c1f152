//! Core domain logic for HiveKeeper.
//! This crate is the single source of truth for business invariants.

pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod processing;
pub mod queue;
pub mod service;

pub use config::{BackendConfig, ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use gateway::{
    EmbeddedGateway, GatewayError, GatewayResult, RemoteGateway, RestGateway, Session,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::action::{Action, ActionDetail, ActionKind, ActionRecord, NewAction};
pub use model::hive::{GeoPoint, Hive, HiveId, HiveOrigin, HiveStatus, NewHive};
pub use model::profile::{Profile, ProfileUpdate};
pub use model::transaction::{NewTransaction, Transaction, TransactionKind};
pub use model::ValidationError;
pub use queue::{FlushReport, OfflineQueue, PendingMutation, QueueError, ReconnectFlusher};
pub use service::action_service::ActionService;
pub use service::general_data_service::GeneralDataService;
pub use service::hive_service::{HiveListQuery, HiveService, HiveUpdate};
pub use service::profile_service::ProfileService;
pub use service::stats_service::StatsService;
pub use service::storage_service::{StorageService, StoredObject};
pub use service::{ServiceContext, ServiceError, ServiceResult, WriteOutcome};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
