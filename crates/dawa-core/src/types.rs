//! # Domain Types
//!
//! Core domain types used throughout DawaPOS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │    Medicine     │   │      Sale       │   │  MpesaTransaction   │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)          │   │
//! │  │  barcode        │   │  receipt_number │   │  checkout_request_id│   │
//! │  │  stock_quantity │   │  status         │   │  status             │   │
//! │  │  price_cents    │   │  total_cents    │   │  amount_cents       │   │
//! │  └─────────────────┘   └────────┬────────┘   └─────────────────────┘   │
//! │                                 │ 1:N                                  │
//! │                        ┌────────┴────────┐                             │
//! │                        │    SaleItem     │  name + price snapshot      │
//! │                        └─────────────────┘  at time of sale            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (barcode, receipt_number, checkout_request_id) -
//!   human-readable or gateway-assigned, used at the edges

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Category
// =============================================================================

/// A medicine category (e.g. "Antibiotics", "Painkillers").
///
/// Deleting a category never deletes its medicines; their category
/// reference is set to NULL instead.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Medicine
// =============================================================================

/// Dispensing unit for a medicine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MedicineUnit {
    Tablet,
    Capsule,
    Syrup,
    Injection,
    Cream,
    Drops,
    Sachet,
    Unit,
}

impl Default for MedicineUnit {
    fn default() -> Self {
        MedicineUnit::Tablet
    }
}

/// A medicine in the pharmacy catalog.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Medicine {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown on the POS and receipts.
    pub name: String,

    /// Generic (non-brand) name, searchable at the POS.
    pub generic_name: Option<String>,

    /// Category reference. NULL if the category was deleted.
    pub category_id: Option<String>,

    /// Optional description for the catalog.
    pub description: Option<String>,

    /// Manufacturer name.
    pub manufacturer: Option<String>,

    /// Barcode (EAN-13 etc.), unique when present.
    pub barcode: Option<String>,

    /// Dispensing unit.
    pub unit: MedicineUnit,

    /// Selling price in cents.
    pub price_cents: i64,

    /// Cost price in cents (for margin reporting).
    pub cost_price_cents: i64,

    /// Current stock level. Never negative (enforced in storage).
    pub stock_quantity: i64,

    /// Stock level at or below which the medicine counts as low stock.
    pub reorder_level: i64,

    /// Expiry date, if tracked for this medicine.
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,

    /// Whether a prescription must be sighted before sale.
    pub requires_prescription: bool,

    /// Whether the medicine is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Medicine {
    /// Returns the selling price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Stock at or below the reorder threshold.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.reorder_level
    }

    /// Expired as of the given date. False when no expiry date is tracked.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        match self.expiry_date {
            Some(expiry) => expiry < today,
            None => false,
        }
    }
}

// =============================================================================
// Sale Status
// =============================================================================

/// The status of a sale.
///
/// Cash and card sales are `Completed` at creation. M-Pesa sales start
/// `Pending` and become `Completed` only through payment reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    /// Awaiting payment confirmation (mobile money only).
    Pending,
    /// Paid and finalized.
    Completed,
    /// Abandoned or voided before payment.
    Cancelled,
    /// Refunded after completion.
    Refunded,
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Pending
    }
}

impl SaleStatus {
    /// Stable lowercase name, matching the wire and storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Completed => "completed",
            SaleStatus::Cancelled => "cancelled",
            SaleStatus::Refunded => "refunded",
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// M-Pesa STK push (asynchronous confirmation).
    Mpesa,
    /// Card payment on external terminal.
    Card,
}

impl PaymentMethod {
    /// All methods, in reporting order.
    pub const ALL: [PaymentMethod; 3] =
        [PaymentMethod::Cash, PaymentMethod::Mpesa, PaymentMethod::Card];

    /// Stable lowercase name, matching the wire and storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Mpesa => "mpesa",
            PaymentMethod::Card => "card",
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A recorded sale transaction.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// Human-readable receipt number, unique across the store, immutable.
    pub receipt_number: String,
    /// Cashier reference (opaque - auth is an external collaborator).
    pub cashier: Option<String>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub payment_method: PaymentMethod,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    /// Always subtotal - discount at creation time.
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    /// Always max(0, amount_paid - total).
    pub change_cents: i64,
    pub status: SaleStatus,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn change(&self) -> Money {
        Money::from_cents(self.change_cents)
    }
}

// =============================================================================
// Sale Item
// =============================================================================

/// A line item in a sale.
/// Uses snapshot pattern to freeze medicine data at time of sale:
/// the name and unit price survive later medicine edits or deletion.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    /// NULL if the medicine was later deleted; history is kept.
    pub medicine_id: Option<String>,
    /// Medicine name at time of sale (frozen).
    pub medicine_name: String,
    /// Quantity sold. Always > 0.
    pub quantity: i64,
    /// Unit price in cents at time of sale (frozen, caller-supplied).
    pub unit_price_cents: i64,
    /// Always unit_price × quantity.
    pub total_price_cents: i64,
}

impl SaleItem {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns the line total as Money.
    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }
}

/// A sale together with its line items, as returned by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleWithItems {
    #[serde(flatten)]
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

// =============================================================================
// New Sale (creation contract)
// =============================================================================

/// One requested line of a new sale.
///
/// The unit price is caller-supplied and authoritative - it need not match
/// the medicine's current catalog price (negotiated/per-line discounts).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSaleItem {
    pub medicine_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// Input contract for creating a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSale {
    pub cashier: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub payment_method: PaymentMethod,
    /// Negative values are clamped to zero. A discount larger than the
    /// subtotal is allowed and produces a negative total (see DESIGN.md).
    #[serde(default)]
    pub discount_cents: i64,
    /// Defaults to the sale total when omitted.
    pub amount_paid_cents: Option<i64>,
    pub notes: Option<String>,
    pub items: Vec<NewSaleItem>,
}

impl NewSale {
    /// Sum of unit_price × quantity over all lines.
    pub fn subtotal(&self) -> Money {
        self.items
            .iter()
            .map(|i| Money::from_cents(i.unit_price_cents).multiply_quantity(i.quantity))
            .fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// M-Pesa Transaction
// =============================================================================

/// The status of an M-Pesa STK push transaction.
///
/// ## State Machine
/// ```text
/// pending ──► success    (terminal)
///         ──► failed     (terminal)
///         ──► cancelled  (terminal)
///         ──► timeout    (terminal)
/// ```
/// All four non-pending states are terminal: no event ever transitions a
/// transaction out of them. Duplicate callbacks and late polls are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MpesaStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
    Timeout,
}

impl MpesaStatus {
    /// True for every state except `Pending`.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MpesaStatus::Pending)
    }
}

impl Default for MpesaStatus {
    fn default() -> Self {
        MpesaStatus::Pending
    }
}

/// An M-Pesa STK push transaction. At most one per sale.
///
/// The sale reference is nullable so the transaction record outlives a
/// deleted sale. Mutated only by the reconciliation engine.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MpesaTransaction {
    pub id: String,
    pub sale_id: Option<String>,
    /// Gateway-assigned checkout identifier, unique. Correlates the push
    /// request with its eventual callback/poll result.
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    /// Normalized phone number (254XXXXXXXXX).
    pub phone_number: String,
    pub amount_cents: i64,
    /// Gateway receipt number. Filled only on success.
    pub mpesa_receipt_number: Option<String>,
    pub status: MpesaStatus,
    /// Raw gateway result code, display-only.
    pub result_code: Option<String>,
    /// Raw gateway result description, display-only.
    pub result_description: Option<String>,
    #[ts(as = "Option<String>")]
    pub transaction_date: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl MpesaTransaction {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn medicine(stock: i64, reorder: i64, expiry: Option<NaiveDate>) -> Medicine {
        Medicine {
            id: "m1".into(),
            name: "Paracetamol 500mg".into(),
            generic_name: Some("Paracetamol".into()),
            category_id: None,
            description: None,
            manufacturer: None,
            barcode: None,
            unit: MedicineUnit::Tablet,
            price_cents: 2000,
            cost_price_cents: 1200,
            stock_quantity: stock,
            reorder_level: reorder,
            expiry_date: expiry,
            requires_prescription: false,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_low_stock() {
        assert!(medicine(10, 10, None).is_low_stock());
        assert!(medicine(3, 10, None).is_low_stock());
        assert!(!medicine(11, 10, None).is_low_stock());
    }

    #[test]
    fn test_expired() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let past = NaiveDate::from_ymd_opt(2026, 5, 31).unwrap();

        assert!(medicine(1, 1, Some(past)).is_expired(today));
        // Expiring today is not yet expired
        assert!(!medicine(1, 1, Some(today)).is_expired(today));
        // No expiry date tracked: never expired
        assert!(!medicine(1, 1, None).is_expired(today));
    }

    #[test]
    fn test_mpesa_terminal_states() {
        assert!(!MpesaStatus::Pending.is_terminal());
        assert!(MpesaStatus::Success.is_terminal());
        assert!(MpesaStatus::Failed.is_terminal());
        assert!(MpesaStatus::Cancelled.is_terminal());
        assert!(MpesaStatus::Timeout.is_terminal());
    }

    #[test]
    fn test_new_sale_subtotal() {
        let sale = NewSale {
            cashier: None,
            customer_name: None,
            customer_phone: None,
            payment_method: PaymentMethod::Cash,
            discount_cents: 0,
            amount_paid_cents: None,
            notes: None,
            items: vec![
                NewSaleItem {
                    medicine_id: "a".into(),
                    quantity: 3,
                    unit_price_cents: 2000,
                },
                NewSaleItem {
                    medicine_id: "b".into(),
                    quantity: 1,
                    unit_price_cents: 5000,
                },
            ],
        };
        assert_eq!(sale.subtotal().cents(), 11000);
    }

    #[test]
    fn test_enum_wire_encoding() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::Mpesa).unwrap(),
            "\"mpesa\""
        );
        assert_eq!(
            serde_json::to_string(&SaleStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(
            serde_json::to_string(&MpesaStatus::Timeout).unwrap(),
            "\"timeout\""
        );
    }
}
