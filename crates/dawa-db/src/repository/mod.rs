//! # Repository Module
//!
//! Database repository implementations for DawaPOS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  HTTP handler                                                          │
//! │       │                                                                 │
//! │       │  db.medicines().pos_search("para", 20)                          │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  MedicineRepository                                                    │
//! │  ├── pos_search(&self, query, limit)                                   │
//! │  ├── get_by_id(&self, id)                                              │
//! │  ├── insert(&self, medicine)                                           │
//! │  └── adjust_stock(&self, id, delta)                                    │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • Clean separation of concerns                                        │
//! │  • SQL is isolated in one place                                        │
//! │  • Transactions live next to the queries they protect                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`category::CategoryRepository`] - Category CRUD
//! - [`medicine::MedicineRepository`] - Medicine CRUD, POS search, stock
//! - [`sale::SaleRepository`] - Atomic sale creation and lookup
//! - [`mpesa::MpesaRepository`] - Payment transaction state machine
//! - [`reports::ReportsRepository`] - Dashboard aggregates

pub mod category;
pub mod medicine;
pub mod mpesa;
pub mod reports;
pub mod sale;
