//! # Route Tree
//!
//! ```text
//! /api
//! ├── /health                          GET  liveness + db ping
//! ├── /categories                      GET, POST
//! │   └── /{id}                        GET, PUT, DELETE
//! ├── /medicines                       GET, POST
//! │   ├── /pos_search?q=               GET  counter autocomplete
//! │   ├── /low_stock                   GET  reorder report
//! │   └── /{id}                        GET, PUT, DELETE (soft)
//! │       └── /update_stock            PATCH {"delta": n}
//! ├── /sales                           GET, POST
//! │   ├── /dashboard_stats             GET
//! │   └── /{id}                        GET
//! │       └── /cancel                  POST  pending sales only
//! └── /mpesa
//!     ├── /stk-push                    POST {"sale_id", "phone_number"}
//!     ├── /status/{checkout_id}        GET  poll path
//!     └── /callback                    POST push path (Safaricom)
//! ```

pub mod categories;
pub mod health;
pub mod medicines;
pub mod mpesa;
pub mod sales;

use axum::routing::{get, patch, post};
use axum::Router;

use crate::state::AppState;

/// Builds the full route tree over shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route(
            "/api/categories",
            get(categories::list).post(categories::create),
        )
        .route(
            "/api/categories/{id}",
            get(categories::get)
                .put(categories::update)
                .delete(categories::delete),
        )
        .route(
            "/api/medicines",
            get(medicines::list).post(medicines::create),
        )
        .route("/api/medicines/pos_search", get(medicines::pos_search))
        .route("/api/medicines/low_stock", get(medicines::low_stock))
        .route(
            "/api/medicines/{id}",
            get(medicines::get)
                .put(medicines::update)
                .delete(medicines::deactivate),
        )
        .route(
            "/api/medicines/{id}/update_stock",
            patch(medicines::update_stock),
        )
        .route("/api/sales", get(sales::list).post(sales::create))
        .route("/api/sales/dashboard_stats", get(sales::dashboard_stats))
        .route("/api/sales/{id}", get(sales::get))
        .route("/api/sales/{id}/cancel", post(sales::cancel))
        .route("/api/mpesa/stk-push", post(mpesa::stk_push))
        .route("/api/mpesa/status/{checkout_id}", get(mpesa::status))
        .route("/api/mpesa/callback", post(mpesa::callback))
        .with_state(state)
}
