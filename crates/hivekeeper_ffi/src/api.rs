//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level functions to Dart via FRB.
//! - Resolve configuration, local storage and the backend gateway per call.
//! - Turn every failure into an envelope with a user-facing message.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Envelopes always carry `ok` and a non-empty `message` on failure.
//! - Without a configured backend, calls run against the embedded local
//!   backend as a fixed local user.

use hivekeeper_core::db::open_db;
use hivekeeper_core::processing::timeline::TimelineEntry;
use hivekeeper_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    ActionDetail, ActionService, CoreConfig, EmbeddedGateway, GeoPoint, Hive, HiveListQuery,
    HiveOrigin, HiveService, HiveStatus, NewAction, NewHive, NewTransaction, OfflineQueue,
    RemoteGateway, RestGateway, ServiceContext, ServiceResult, Session, StatsService,
    TransactionKind,
};
use log::warn;
use uuid::Uuid;

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Reconfiguration attempts with different level or directory return error.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Hive projection shown in lists and detail headers.
#[derive(Debug, Clone, PartialEq)]
pub struct HiveItem {
    pub id: String,
    pub name: String,
    /// Species catalog id.
    pub species: String,
    /// `active|sold|donated|lost`.
    pub status: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HiveResponse {
    pub ok: bool,
    pub hive: Option<HiveItem>,
    /// Part of the write waits in the offline queue.
    pub pending_sync: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HiveListResponse {
    pub ok: bool,
    pub items: Vec<HiveItem>,
    pub message: String,
}

/// Generic write envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse {
    pub ok: bool,
    /// Id of the created or affected record.
    pub id: Option<String>,
    pub pending_sync: bool,
    pub message: String,
}

impl WriteResponse {
    fn success(message: impl Into<String>, id: String, pending_sync: bool) -> Self {
        Self {
            ok: true,
            id: Some(id),
            pending_sync,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: None,
            pending_sync: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineItemView {
    pub id: String,
    /// Action or transaction kind wire name.
    pub kind: String,
    pub is_transaction: bool,
    pub occurred_at: i64,
    pub summary: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineResponse {
    pub ok: bool,
    pub items: Vec<TimelineItemView>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardResponse {
    pub ok: bool,
    /// Serialized dashboard statistics; empty on failure.
    pub stats_json: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatusResponse {
    pub ok: bool,
    pub pending: u32,
    pub oldest_queued_at: Option<i64>,
    /// Most recent replay error among queued items.
    pub last_error: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueFlushResponse {
    pub ok: bool,
    pub sent: u32,
    pub failed: u32,
    pub remaining: u32,
    pub stopped_offline: bool,
    pub message: String,
}

/// Creates a hive for the signed-in user.
///
/// # FFI contract
/// - Sync call, DB-backed and possibly network-backed execution.
/// - `latitude` and `longitude` must be given together.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn hive_create(
    name: String,
    species: String,
    origin: Option<String>,
    box_type: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    notes: Option<String>,
) -> HiveResponse {
    let failure = |message: String| HiveResponse {
        ok: false,
        hive: None,
        pending_sync: false,
        message,
    };
    let origin = match origin.as_deref().map(HiveOrigin::parse) {
        Some(None) => return failure("Unknown hive origin.".to_string()),
        Some(Some(origin)) => Some(origin),
        None => None,
    };
    let location = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => match GeoPoint::new(latitude, longitude) {
            Ok(point) => Some(point),
            Err(err) => return failure(format!("Please check the form: {err}.")),
        },
        (None, None) => None,
        _ => return failure("Latitude and longitude must be set together.".to_string()),
    };
    let input = NewHive {
        name,
        species,
        origin,
        box_type,
        location,
        notes,
        acquired_at: None,
    };

    match with_services("hive_create", |ctx, _| HiveService::new(ctx).create_hive(input)) {
        Ok(outcome) => HiveResponse {
            ok: true,
            hive: Some(to_hive_item(outcome.record)),
            pending_sync: outcome.pending_sync,
            message: if outcome.pending_sync {
                "Hive saved; it will sync when you're back online.".to_string()
            } else {
                "Hive created.".to_string()
            },
        },
        Err(message) => failure(message),
    }
}

/// Lists hives, newest first.
#[flutter_rust_bridge::frb(sync)]
pub fn hive_list(
    status: Option<String>,
    species: Option<String>,
    name_contains: Option<String>,
    limit: Option<u32>,
) -> HiveListResponse {
    let failure = |message: String| HiveListResponse {
        ok: false,
        items: Vec::new(),
        message,
    };
    let status = match status.as_deref().map(HiveStatus::parse) {
        Some(None) => return failure("Unknown hive status.".to_string()),
        Some(Some(status)) => Some(status),
        None => None,
    };
    let query = HiveListQuery {
        status,
        species,
        name_contains,
        limit,
    };

    match with_services("hive_list", |ctx, _| HiveService::new(ctx).list_hives(&query)) {
        Ok(hives) => {
            let items = hives.into_iter().map(to_hive_item).collect::<Vec<_>>();
            let message = if items.is_empty() {
                "No hives yet.".to_string()
            } else {
                format!("Found {} hive(s).", items.len())
            };
            HiveListResponse {
                ok: true,
                items,
                message,
            }
        }
        Err(message) => failure(message),
    }
}

/// Sets a hive's status directly (`active|sold|donated|lost`).
#[flutter_rust_bridge::frb(sync)]
pub fn hive_set_status(hive_id: String, status: String) -> WriteResponse {
    let Some(hive_id) = parse_id(&hive_id) else {
        return WriteResponse::failure("Invalid hive id.");
    };
    let Some(status) = HiveStatus::parse(&status) else {
        return WriteResponse::failure("Unknown hive status.");
    };
    match with_services("hive_set_status", |ctx, _| {
        HiveService::new(ctx).update_status(hive_id, status)
    }) {
        Ok(outcome) => {
            WriteResponse::success("Hive status updated.", hive_id.to_string(), outcome.pending_sync)
        }
        Err(message) => WriteResponse::failure(message),
    }
}

/// Deletes a hive together with its history and photo.
#[flutter_rust_bridge::frb(sync)]
pub fn hive_delete(hive_id: String) -> WriteResponse {
    let Some(hive_id) = parse_id(&hive_id) else {
        return WriteResponse::failure("Invalid hive id.");
    };
    match with_services("hive_delete", |ctx, _| HiveService::new(ctx).delete_hive(hive_id)) {
        Ok(outcome) => {
            WriteResponse::success("Hive deleted.", hive_id.to_string(), outcome.pending_sync)
        }
        Err(message) => WriteResponse::failure(message),
    }
}

/// Records a management action.
///
/// `detail_json` is the kind-tagged detail object, for example
/// `{"kind":"feeding","food_type":"sugar_syrup","quantity_ml":250}`.
#[flutter_rust_bridge::frb(sync)]
pub fn action_record(
    hive_id: String,
    performed_at: Option<i64>,
    notes: Option<String>,
    detail_json: String,
) -> WriteResponse {
    let Some(hive_id) = parse_id(&hive_id) else {
        return WriteResponse::failure("Invalid hive id.");
    };
    let detail = match serde_json::from_str::<ActionDetail>(&detail_json) {
        Ok(detail) => detail,
        Err(err) => {
            warn!("event=ffi_call module=ffi status=error operation=action_record error={err}");
            return WriteResponse::failure("Unrecognized action details.");
        }
    };
    let input = NewAction {
        hive_id,
        performed_at,
        notes,
        detail,
    };
    match with_services("action_record", |ctx, _| ActionService::new(ctx).record_action(input)) {
        Ok(outcome) => WriteResponse::success(
            "Action recorded.",
            outcome.record.action.id.to_string(),
            outcome.pending_sync,
        ),
        Err(message) => WriteResponse::failure(message),
    }
}

/// Records a sale, donation or loss; the hive status follows the kind.
#[flutter_rust_bridge::frb(sync)]
pub fn transaction_record(
    hive_id: String,
    kind: String,
    occurred_at: Option<i64>,
    amount: Option<f64>,
    counterparty: Option<String>,
    reason: Option<String>,
    notes: Option<String>,
) -> WriteResponse {
    let Some(hive_id) = parse_id(&hive_id) else {
        return WriteResponse::failure("Invalid hive id.");
    };
    let Some(kind) = TransactionKind::parse(&kind) else {
        return WriteResponse::failure("Unknown transaction kind.");
    };
    let input = NewTransaction {
        hive_id,
        kind,
        occurred_at,
        amount,
        counterparty,
        reason,
        notes,
    };
    match with_services("transaction_record", |ctx, _| {
        ActionService::new(ctx).record_transaction(input)
    }) {
        Ok(outcome) => WriteResponse::success(
            "Transaction recorded.",
            outcome.record.id.to_string(),
            outcome.pending_sync,
        ),
        Err(message) => WriteResponse::failure(message),
    }
}

/// Merged action/transaction feed of one hive, newest first.
#[flutter_rust_bridge::frb(sync)]
pub fn hive_timeline(hive_id: String) -> TimelineResponse {
    let failure = |message: String| TimelineResponse {
        ok: false,
        items: Vec::new(),
        message,
    };
    let Some(hive_id) = parse_id(&hive_id) else {
        return failure("Invalid hive id.".to_string());
    };
    match with_services("hive_timeline", |ctx, _| {
        ActionService::new(ctx).hive_timeline(hive_id)
    }) {
        Ok(entries) => TimelineResponse {
            ok: true,
            message: format!("{} entr(ies).", entries.len()),
            items: entries.iter().map(to_timeline_item).collect(),
        },
        Err(message) => failure(message),
    }
}

/// Aggregated dashboard statistics as JSON.
#[flutter_rust_bridge::frb(sync)]
pub fn dashboard_stats() -> DashboardResponse {
    let now_ms = hivekeeper_core::model::now_epoch_ms();
    let stats = with_services("dashboard_stats", |ctx, _| {
        StatsService::new(ctx).dashboard(now_ms)
    });
    match stats.and_then(|stats| {
        serde_json::to_string(&stats).map_err(|err| format!("Could not encode statistics: {err}"))
    }) {
        Ok(stats_json) => DashboardResponse {
            ok: true,
            stats_json,
            message: "Statistics ready.".to_string(),
        },
        Err(message) => DashboardResponse {
            ok: false,
            stats_json: String::new(),
            message,
        },
    }
}

/// Local offline queue status; never touches the network.
#[flutter_rust_bridge::frb(sync)]
pub fn queue_status() -> QueueStatusResponse {
    let failure = |message: String| QueueStatusResponse {
        ok: false,
        pending: 0,
        oldest_queued_at: None,
        last_error: None,
        message,
    };
    let config = match CoreConfig::from_env() {
        Ok(config) => config,
        Err(err) => return failure(format!("Configuration error: {err}")),
    };
    let conn = match open_db(&config.db_path) {
        Ok(conn) => conn,
        Err(err) => return failure(format!("Local storage unavailable: {err}")),
    };
    match OfflineQueue::new(&conn).list() {
        Ok(items) => QueueStatusResponse {
            ok: true,
            pending: u32::try_from(items.len()).unwrap_or(u32::MAX),
            oldest_queued_at: items.first().map(|item| item.queued_at),
            last_error: items.iter().rev().find_map(|item| item.last_error.clone()),
            message: if items.is_empty() {
                "Everything is synced.".to_string()
            } else {
                format!("{} change(s) waiting to sync.", items.len())
            },
        },
        Err(err) => failure(format!("Local storage unavailable: {err}")),
    }
}

/// Replays the offline queue against the backend.
#[flutter_rust_bridge::frb(sync)]
pub fn queue_flush() -> QueueFlushResponse {
    match with_services("queue_flush", |ctx, queue| Ok(queue.flush(ctx.gateway())?)) {
        Ok(report) => QueueFlushResponse {
            ok: true,
            sent: report.sent,
            failed: report.failed,
            remaining: report.remaining,
            stopped_offline: report.stopped_offline,
            message: if report.stopped_offline {
                "Still offline; changes stay queued.".to_string()
            } else {
                format!("Synced {} change(s).", report.sent)
            },
        },
        Err(message) => QueueFlushResponse {
            ok: false,
            sent: 0,
            failed: 0,
            remaining: 0,
            stopped_offline: false,
            message,
        },
    }
}

/// Session used when no backend is configured.
fn local_session() -> Session {
    Session {
        user_id: Uuid::nil(),
        access_token: String::new(),
        expires_at_ms: None,
    }
}

fn build_gateway<'conn>(
    config: &CoreConfig,
    conn: &'conn rusqlite::Connection,
) -> Result<Box<dyn RemoteGateway + 'conn>, String> {
    match &config.backend {
        Some(backend) => RestGateway::from_config(backend)
            .map(|gateway| Box::new(gateway) as Box<dyn RemoteGateway + 'conn>)
            .map_err(|err| format!("Backend client unavailable: {err}")),
        None => Ok(Box::new(EmbeddedGateway::new(conn).with_session(local_session()))),
    }
}

/// Runs `f` with a queue-backed service context for the configured backend.
///
/// Failures come back as user-facing messages; details go to the log.
fn with_services<T>(
    operation: &'static str,
    f: impl for<'a> FnOnce(
        ServiceContext<'a, dyn RemoteGateway + 'a>,
        &'a OfflineQueue<'a>,
    ) -> ServiceResult<T>,
) -> Result<T, String> {
    let config = CoreConfig::from_env().map_err(|err| {
        warn!("event=ffi_call module=ffi status=error operation={operation} error={err}");
        format!("Configuration error: {err}")
    })?;
    let conn = open_db(&config.db_path).map_err(|err| {
        warn!("event=ffi_call module=ffi status=error operation={operation} error={err}");
        format!("Local storage unavailable: {err}")
    })?;
    let gateway = build_gateway(&config, &conn)?;
    let queue = OfflineQueue::new(&conn);
    let gateway_ref: &dyn RemoteGateway = gateway.as_ref();
    let ctx = ServiceContext::with_queue(gateway_ref, &queue);

    f(ctx, &queue).map_err(|err| {
        warn!("event=ffi_call module=ffi status=error operation={operation} error={err}");
        err.user_message()
    })
}

fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

fn to_hive_item(hive: Hive) -> HiveItem {
    HiveItem {
        id: hive.id.to_string(),
        status: hive.status.as_str().to_string(),
        name: hive.name,
        species: hive.species,
        latitude: hive.latitude,
        longitude: hive.longitude,
        photo_url: hive.photo_url,
    }
}

fn to_timeline_item(entry: &TimelineEntry) -> TimelineItemView {
    TimelineItemView {
        id: entry.id.to_string(),
        kind: entry.kind_label().to_string(),
        is_transaction: entry.is_transaction(),
        occurred_at: entry.occurred_at,
        summary: entry.summary(),
        notes: entry.notes().map(str::to_string),
    }
}
