//! Shared application state.

use dawa_db::Database;
use dawa_mpesa::ReconciliationEngine;

/// State handed to every route handler.
///
/// `Database` is a pool handle and `ReconciliationEngine` holds one, so
/// cloning per-request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub payments: ReconciliationEngine,
}
