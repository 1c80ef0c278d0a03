//! # DawaPOS M-Pesa Integration
//!
//! Safaricom Daraja STK push integration and payment reconciliation.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         dawa-mpesa                              │
//! │                                                                 │
//! │  ┌───────────┐   ┌───────────┐   ┌──────────────────────────┐  │
//! │  │  config   │──▶│  client   │◀──│       reconcile          │  │
//! │  │ (Daraja   │   │ (HTTP +   │   │  (initiate / poll /      │  │
//! │  │  creds)   │   │  token)   │   │   callback → database)   │  │
//! │  └───────────┘   └─────┬─────┘   └────────────┬─────────────┘  │
//! │                        │                      │                 │
//! │                  ┌─────▼─────┐         ┌──────▼──────┐         │
//! │                  │   token   │         │  callback   │         │
//! │                  │  (cache)  │         │  (payload)  │         │
//! │                  └───────────┘         └─────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The gateway sits behind the [`PaymentGateway`] trait so the
//! reconciliation engine can be exercised without network access.

pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod token;

pub use callback::CallbackEnvelope;
pub use client::{DarajaClient, DisabledGateway, PaymentGateway, PushAck, PushRequest, QueryResult};
pub use config::{MpesaConfig, MpesaEnvironment};
pub use error::{MpesaError, MpesaResult};
pub use reconcile::ReconciliationEngine;
