//! # dawa-core: Pure Business Logic for DawaPOS
//!
//! This crate is the **heart** of DawaPOS, a point-of-sale and inventory
//! backend for a retail pharmacy. It contains all business logic as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        DawaPOS Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    HTTP API (axum)                              │   │
//! │  │    POST /sales ──► GET /dashboard_stats ──► POST /stk-push     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ dawa-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   phone   │  │ validation│  │   │
//! │  │   │ Medicine  │  │   Money   │  │  254...   │  │   rules   │  │   │
//! │  │   │   Sale    │  │  KSh math │  │ normalize │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          dawa-db (SQLite) • dawa-mpesa (Daraja gateway)         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Medicine, Sale, MpesaTransaction, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`phone`] - Kenyan MSISDN normalization for the payment gateway
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod phone;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use dawa_core::Money` instead of
// `use dawa_core::money::Money`

pub use error::ValidationError;
pub use money::Money;
pub use phone::normalize_phone;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Customer name recorded when the cashier does not enter one.
pub const WALK_IN_CUSTOMER: &str = "Walk-in Customer";

/// Receipt number prefix for this store.
///
/// Receipt format: `RX-YYMMDDHHMM-XXXX` (prefix, sale timestamp truncated
/// to the minute, 4-character random disambiguator).
pub const RECEIPT_PREFIX: &str = "RX";

/// Maximum line items allowed in a single sale
///
/// ## Business Reason
/// Prevents runaway carts and ensures reasonable transaction sizes.
pub const MAX_SALE_ITEMS: usize = 100;

/// Maximum quantity of a single line item
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10)
pub const MAX_LINE_QUANTITY: i64 = 999;
