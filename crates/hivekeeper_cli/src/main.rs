//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `hivekeeper_core` linkage.
//! - Report how many offline mutations wait in the configured local DB.

use hivekeeper_core::{open_db, CoreConfig, OfflineQueue};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("hivekeeper_core ping={}", hivekeeper_core::ping());
    println!("hivekeeper_core version={}", hivekeeper_core::core_version());

    let config = match CoreConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("hivekeeper_core config error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mode = if config.is_local_only() { "local" } else { "remote" };
    println!("hivekeeper_core mode={mode} db={}", config.db_path.display());

    let pending = open_db(&config.db_path)
        .map_err(|err| err.to_string())
        .and_then(|conn| OfflineQueue::new(&conn).len().map_err(|err| err.to_string()));
    match pending {
        Ok(pending) => {
            println!("hivekeeper_core pending_mutations={pending}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("hivekeeper_core queue error: {err}");
            ExitCode::FAILURE
        }
    }
}
