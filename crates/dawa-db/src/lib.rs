//! # dawa-db: Database Layer for DawaPOS
//!
//! This crate provides database access for the DawaPOS backend.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        DawaPOS Data Flow                                │
//! │                                                                         │
//! │  HTTP handler (POST /api/sales)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     dawa-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (medicine.rs) │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ MedicineRepo  │    │ 001_init.sql │  │   │
//! │  │   │ WAL mode      │    │ SaleRepo      │    │ ...          │  │   │
//! │  │   │ FK enforced   │    │ MpesaRepo     │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (WAL)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (medicine, sale, mpesa, ...)
//!
//! ## Concurrency Model
//!
//! SQLite allows a single writer at a time. Every multi-statement write
//! (sale creation, payment state transition) runs inside one transaction,
//! and stock decrements are guarded (`AND stock_quantity >= ?`) so two
//! concurrent sales can never oversell: the loser's UPDATE matches zero
//! rows and its whole transaction rolls back.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dawa_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("dawa.db")).await?;
//! let sale = db.sales().create_sale(&new_sale).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::category::CategoryRepository;
pub use repository::medicine::MedicineRepository;
pub use repository::mpesa::MpesaRepository;
pub use repository::reports::ReportsRepository;
pub use repository::sale::SaleRepository;
