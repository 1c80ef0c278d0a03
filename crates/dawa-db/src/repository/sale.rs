//! # Sale Repository
//!
//! Atomic sale creation and sale lookup.
//!
//! ## Sale Creation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   create_sale() - one transaction                       │
//! │                                                                         │
//! │  1. VALIDATE                                                           │
//! │     └── line count, quantities, prices (pure, no DB)                   │
//! │                                                                         │
//! │  2. BEGIN TRANSACTION                                                  │
//! │     └── items processed in medicine_id order (stable lock order)       │
//! │                                                                         │
//! │  3. PER LINE: conditional decrement                                    │
//! │     └── UPDATE medicines SET stock = stock - qty                       │
//! │         WHERE id = ? AND is_active = 1 AND stock >= qty                │
//! │     └── 0 rows? → disambiguate: missing/inactive vs insufficient       │
//! │         → ROLLBACK (nothing persists, no stock moved)                  │
//! │                                                                         │
//! │  4. TOTALS                                                             │
//! │     └── subtotal = Σ(unit_price × qty), total = subtotal - discount    │
//! │                                                                         │
//! │  5. INSERT sale + items (snapshot name and price)                      │
//! │     └── receipt collision? regenerate and retry the INSERT             │
//! │                                                                         │
//! │  6. COMMIT → Sale { status: completed | pending (mpesa) }              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two concurrent sales racing over the last units can never oversell:
//! SQLite serializes the write transactions and the loser's guarded
//! UPDATE matches zero rows.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use dawa_core::validation::validate_new_sale;
use dawa_core::{
    Money, NewSale, PaymentMethod, Sale, SaleItem, SaleStatus, SaleWithItems, RECEIPT_PREFIX,
    WALK_IN_CUSTOMER,
};

/// Attempts at inserting a sale before giving up on receipt collisions.
const RECEIPT_RETRY_LIMIT: usize = 5;

/// Generates a receipt number: `RX-YYMMDDHHMM-XXXX`.
///
/// The timestamp is truncated to the minute; the 4-character random
/// suffix disambiguates sales within the same minute. Collisions are
/// possible and handled by retrying the insert.
fn generate_receipt_number(now: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(4)
        .collect::<String>()
        .to_uppercase();
    format!("{}-{}-{}", RECEIPT_PREFIX, now.format("%y%m%d%H%M"), suffix)
}

/// Optional filters for sale listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaleFilter {
    /// Inclusive start day.
    pub date_from: Option<NaiveDate>,
    /// Inclusive end day.
    pub date_to: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
    pub status: Option<SaleStatus>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: i64,
}

/// UTC midnight at the start of a day.
fn day_start(day: NaiveDate) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(day.year(), day.month(), day.day(), 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Creates a sale, decrementing stock atomically.
    ///
    /// ## Returns
    /// The persisted sale with its line items. For `mpesa` sales the
    /// status is `pending`; for `cash`/`card` it is `completed`.
    ///
    /// ## Errors
    /// - [`DbError::NotFound`] - a line references a missing or inactive medicine
    /// - [`DbError::InsufficientStock`] - a line exceeds available stock
    /// - [`DbError::Validation`] - malformed input (empty cart, bad quantity)
    ///
    /// On any error the transaction rolls back: no stock moves, no rows
    /// persist.
    pub async fn create_sale(&self, input: &NewSale) -> DbResult<SaleWithItems> {
        validate_new_sale(input)?;

        let mut tx = self.pool.begin().await?;

        // Stable processing order so concurrent sales touching the same
        // medicines decrement in the same sequence
        let mut lines = input.items.clone();
        lines.sort_by(|a, b| a.medicine_id.cmp(&b.medicine_id));

        let mut items = Vec::with_capacity(lines.len());
        let sale_id = Uuid::new_v4().to_string();

        for line in &lines {
            let name =
                decrement_stock(&mut tx, &line.medicine_id, line.quantity).await?;

            let line_total = Money::from_cents(line.unit_price_cents)
                .multiply_quantity(line.quantity);

            items.push(SaleItem {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.clone(),
                medicine_id: Some(line.medicine_id.clone()),
                medicine_name: name,
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
                total_price_cents: line_total.cents(),
            });
        }

        // Totals. Negative discounts are clamped; a discount larger than
        // the subtotal is allowed and yields a negative total.
        let subtotal: Money = items
            .iter()
            .map(|i| Money::from_cents(i.total_price_cents))
            .fold(Money::zero(), |acc, m| acc + m);
        let discount = Money::from_cents(input.discount_cents).clamp_non_negative();
        let total = subtotal - discount;
        let paid = input
            .amount_paid_cents
            .map(Money::from_cents)
            .unwrap_or(total);
        let change = paid.sub_floor_zero(total);

        let status = match input.payment_method {
            PaymentMethod::Mpesa => SaleStatus::Pending,
            PaymentMethod::Cash | PaymentMethod::Card => SaleStatus::Completed,
        };

        let now = Utc::now();
        let customer_name = input
            .customer_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(WALK_IN_CUSTOMER)
            .to_string();

        let mut sale = Sale {
            id: sale_id,
            receipt_number: generate_receipt_number(now),
            cashier: input.cashier.clone(),
            customer_name,
            customer_phone: input.customer_phone.clone(),
            payment_method: input.payment_method,
            subtotal_cents: subtotal.cents(),
            discount_cents: discount.cents(),
            total_cents: total.cents(),
            amount_paid_cents: paid.cents(),
            change_cents: change.cents(),
            status,
            notes: input.notes.clone(),
            created_at: now,
        };

        insert_sale_with_retry(&mut tx, &mut sale).await?;

        for item in &items {
            insert_item(&mut tx, item).await?;
        }

        tx.commit().await?;

        info!(
            receipt = %sale.receipt_number,
            total = %sale.total(),
            method = sale.payment_method.as_str(),
            items = items.len(),
            "Sale created"
        );

        Ok(SaleWithItems { sale, items })
    }

    /// Gets a sale with its items by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SaleWithItems>> {
        let sale = sqlx::query_as::<_, Sale>(
            r#"
            SELECT id, receipt_number, cashier, customer_name, customer_phone,
                   payment_method, subtotal_cents, discount_cents, total_cents,
                   amount_paid_cents, change_cents, status, notes, created_at
            FROM sales
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(sale) = sale else { return Ok(None) };
        let items = self.items_for(&sale.id).await?;

        Ok(Some(SaleWithItems { sale, items }))
    }

    /// Gets a sale with its items by receipt number.
    pub async fn get_by_receipt(&self, receipt_number: &str) -> DbResult<Option<SaleWithItems>> {
        let sale = sqlx::query_as::<_, Sale>(
            r#"
            SELECT id, receipt_number, cashier, customer_name, customer_phone,
                   payment_method, subtotal_cents, discount_cents, total_cents,
                   amount_paid_cents, change_cents, status, notes, created_at
            FROM sales
            WHERE receipt_number = ?1
            "#,
        )
        .bind(receipt_number)
        .fetch_optional(&self.pool)
        .await?;

        let Some(sale) = sale else { return Ok(None) };
        let items = self.items_for(&sale.id).await?;

        Ok(Some(SaleWithItems { sale, items }))
    }

    /// Lists sales (without items), newest first.
    ///
    /// All filter fields are optional; an empty filter returns everything.
    /// Date filters are whole days: `date_from` is inclusive, `date_to`
    /// is inclusive of the entire named day.
    pub async fn list(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        let from = filter.date_from.map(day_start);
        let until = filter.date_to.map(|d| day_start(d) + Duration::days(1));

        let sales = sqlx::query_as::<_, Sale>(
            r#"
            SELECT id, receipt_number, cashier, customer_name, customer_phone,
                   payment_method, subtotal_cents, discount_cents, total_cents,
                   amount_paid_cents, change_cents, status, notes, created_at
            FROM sales
            WHERE (?1 IS NULL OR created_at >= ?1)
              AND (?2 IS NULL OR created_at < ?2)
              AND (?3 IS NULL OR payment_method = ?3)
              AND (?4 IS NULL OR status = ?4)
            ORDER BY created_at DESC
            LIMIT ?5 OFFSET ?6
            "#,
        )
        .bind(from)
        .bind(until)
        .bind(filter.payment_method.map(|m| m.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        // SQLite treats a negative LIMIT as "no limit"
        .bind(filter.limit.unwrap_or(-1))
        .bind(filter.offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Completes a pending sale (compare-and-set on status).
    ///
    /// ## Returns
    /// `true` if the sale transitioned, `false` if it was not pending
    /// (already completed or cancelled - the call is a no-op).
    pub async fn complete_pending(&self, sale_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE sales SET status = 'completed' WHERE id = ?1 AND status = 'pending'",
        )
        .bind(sale_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Cancels a pending sale and restores its stock.
    ///
    /// Only pending sales can be cancelled; completed sales go through a
    /// refund flow instead. Stock restoration and the status flip happen
    /// in one transaction.
    pub async fn cancel_pending(&self, sale_id: &str) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE sales SET status = 'cancelled' WHERE id = ?1 AND status = 'pending'",
        )
        .bind(sale_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        // Return the reserved stock for lines whose medicine still exists
        sqlx::query(
            r#"
            UPDATE medicines
            SET stock_quantity = stock_quantity + (
                SELECT quantity FROM sale_items
                WHERE sale_id = ?1 AND medicine_id = medicines.id
            )
            WHERE id IN (
                SELECT medicine_id FROM sale_items
                WHERE sale_id = ?1 AND medicine_id IS NOT NULL
            )
            "#,
        )
        .bind(sale_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(sale_id = %sale_id, "Cancelled pending sale, stock restored");
        Ok(true)
    }

    async fn items_for(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(
            r#"
            SELECT id, sale_id, medicine_id, medicine_name, quantity,
                   unit_price_cents, total_price_cents
            FROM sale_items
            WHERE sale_id = ?1
            ORDER BY medicine_name
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Conditionally decrements stock for one sale line.
///
/// ## Returns
/// The medicine's current name (for the line item snapshot).
///
/// ## Errors
/// - NotFound if the medicine is missing or inactive
/// - InsufficientStock if stock is below the requested quantity
async fn decrement_stock(
    tx: &mut Transaction<'_, Sqlite>,
    medicine_id: &str,
    quantity: i64,
) -> DbResult<String> {
    let result = sqlx::query(
        r#"
        UPDATE medicines
        SET stock_quantity = stock_quantity - ?2,
            updated_at = ?3
        WHERE id = ?1 AND is_active = 1 AND stock_quantity >= ?2
        "#,
    )
    .bind(medicine_id)
    .bind(quantity)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        // Zero rows: missing, inactive, or insufficient. Disambiguate.
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT name, stock_quantity FROM medicines WHERE id = ?1 AND is_active = 1",
        )
        .bind(medicine_id)
        .fetch_optional(&mut **tx)
        .await?;

        return match row {
            Some((name, available)) => Err(DbError::InsufficientStock {
                name,
                available,
                requested: quantity,
            }),
            None => Err(DbError::not_found("Medicine", medicine_id)),
        };
    }

    let (name,): (String,) = sqlx::query_as("SELECT name FROM medicines WHERE id = ?1")
        .bind(medicine_id)
        .fetch_one(&mut **tx)
        .await?;

    Ok(name)
}

/// Inserts the sale row, regenerating the receipt number on collision.
async fn insert_sale_with_retry(
    tx: &mut Transaction<'_, Sqlite>,
    sale: &mut Sale,
) -> DbResult<()> {
    for attempt in 0..RECEIPT_RETRY_LIMIT {
        let result = sqlx::query(
            r#"
            INSERT INTO sales (
                id, receipt_number, cashier, customer_name, customer_phone,
                payment_method, subtotal_cents, discount_cents, total_cents,
                amount_paid_cents, change_cents, status, notes, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9,
                ?10, ?11, ?12, ?13, ?14
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.receipt_number)
        .bind(&sale.cashier)
        .bind(&sale.customer_name)
        .bind(&sale.customer_phone)
        .bind(sale.payment_method)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_cents)
        .bind(sale.total_cents)
        .bind(sale.amount_paid_cents)
        .bind(sale.change_cents)
        .bind(sale.status)
        .bind(&sale.notes)
        .bind(sale.created_at)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(_) => return Ok(()),
            Err(e) => {
                let err = DbError::from(e);
                if err.is_unique_violation_on("receipt_number")
                    && attempt + 1 < RECEIPT_RETRY_LIMIT
                {
                    debug!(receipt = %sale.receipt_number, "Receipt collision, regenerating");
                    sale.receipt_number = generate_receipt_number(sale.created_at);
                    continue;
                }
                return Err(err);
            }
        }
    }

    Err(DbError::Internal(
        "receipt number collision retry limit exceeded".to_string(),
    ))
}

async fn insert_item(tx: &mut Transaction<'_, Sqlite>, item: &SaleItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sale_items (
            id, sale_id, medicine_id, medicine_name,
            quantity, unit_price_cents, total_price_cents
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&item.id)
    .bind(&item.sale_id)
    .bind(&item.medicine_id)
    .bind(&item.medicine_name)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.total_price_cents)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::medicine::NewMedicine;
    use dawa_core::{MedicineUnit, NewSaleItem};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn seed_medicine(db: &Database, name: &str, stock: i64, price: i64) -> String {
        db.medicines()
            .create(NewMedicine {
                name: name.to_string(),
                generic_name: None,
                category_id: None,
                description: None,
                manufacturer: None,
                barcode: None,
                unit: MedicineUnit::Tablet,
                price_cents: price,
                cost_price_cents: price / 2,
                stock_quantity: stock,
                reorder_level: 10,
                expiry_date: None,
                requires_prescription: false,
            })
            .await
            .unwrap()
            .id
    }

    fn cash_sale(items: Vec<NewSaleItem>) -> NewSale {
        NewSale {
            cashier: Some("jane".to_string()),
            customer_name: None,
            customer_phone: None,
            payment_method: PaymentMethod::Cash,
            discount_cents: 0,
            amount_paid_cents: None,
            notes: None,
            items,
        }
    }

    #[tokio::test]
    async fn test_cash_sale_completes_and_decrements_stock() {
        let db = test_db().await;
        let med_id = seed_medicine(&db, "Paracetamol 500mg", 50, 2000).await;

        let sale = db
            .sales()
            .create_sale(&cash_sale(vec![NewSaleItem {
                medicine_id: med_id.clone(),
                quantity: 3,
                unit_price_cents: 2000,
            }]))
            .await
            .unwrap();

        assert_eq!(sale.sale.status, SaleStatus::Completed);
        assert_eq!(sale.sale.subtotal_cents, 6000);
        assert_eq!(sale.sale.total_cents, 6000);
        assert_eq!(sale.sale.customer_name, WALK_IN_CUSTOMER);
        assert_eq!(sale.items.len(), 1);
        assert_eq!(sale.items[0].medicine_name, "Paracetamol 500mg");

        let med = db.medicines().get_by_id(&med_id).await.unwrap().unwrap();
        assert_eq!(med.stock_quantity, 47);
    }

    #[tokio::test]
    async fn test_mpesa_sale_starts_pending() {
        let db = test_db().await;
        let med_id = seed_medicine(&db, "Amoxicillin 250mg", 20, 5000).await;

        let mut input = cash_sale(vec![NewSaleItem {
            medicine_id: med_id,
            quantity: 1,
            unit_price_cents: 5000,
        }]);
        input.payment_method = PaymentMethod::Mpesa;

        let sale = db.sales().create_sale(&input).await.unwrap();
        assert_eq!(sale.sale.status, SaleStatus::Pending);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back_everything() {
        let db = test_db().await;
        let plenty = seed_medicine(&db, "Med A", 100, 1000).await;
        let scarce = seed_medicine(&db, "Med B", 2, 1000).await;

        let err = db
            .sales()
            .create_sale(&cash_sale(vec![
                NewSaleItem {
                    medicine_id: plenty.clone(),
                    quantity: 10,
                    unit_price_cents: 1000,
                },
                NewSaleItem {
                    medicine_id: scarce.clone(),
                    quantity: 5,
                    unit_price_cents: 1000,
                },
            ]))
            .await
            .unwrap_err();

        match err {
            DbError::InsufficientStock {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, 2);
                assert_eq!(requested, 5);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        // Nothing persisted, no stock moved on ANY line
        let a = db.medicines().get_by_id(&plenty).await.unwrap().unwrap();
        let b = db.medicines().get_by_id(&scarce).await.unwrap().unwrap();
        assert_eq!(a.stock_quantity, 100);
        assert_eq!(b.stock_quantity, 2);
        assert!(db
            .sales()
            .list(&SaleFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_medicine_is_not_found() {
        let db = test_db().await;
        let err = db
            .sales()
            .create_sale(&cash_sale(vec![NewSaleItem {
                medicine_id: Uuid::new_v4().to_string(),
                quantity: 1,
                unit_price_cents: 1000,
            }]))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_discount_and_change_math() {
        let db = test_db().await;
        let med_id = seed_medicine(&db, "Med", 50, 3000).await;

        let mut input = cash_sale(vec![NewSaleItem {
            medicine_id: med_id,
            quantity: 2,
            unit_price_cents: 3000,
        }]);
        input.discount_cents = 1000;
        input.amount_paid_cents = Some(10000);

        let sale = db.sales().create_sale(&input).await.unwrap();
        assert_eq!(sale.sale.subtotal_cents, 6000);
        assert_eq!(sale.sale.discount_cents, 1000);
        assert_eq!(sale.sale.total_cents, 5000);
        assert_eq!(sale.sale.change_cents, 5000);
    }

    #[tokio::test]
    async fn test_negative_discount_clamped() {
        let db = test_db().await;
        let med_id = seed_medicine(&db, "Med", 10, 2000).await;

        let mut input = cash_sale(vec![NewSaleItem {
            medicine_id: med_id,
            quantity: 1,
            unit_price_cents: 2000,
        }]);
        input.discount_cents = -500;

        let sale = db.sales().create_sale(&input).await.unwrap();
        assert_eq!(sale.sale.discount_cents, 0);
        assert_eq!(sale.sale.total_cents, 2000);
    }

    #[tokio::test]
    async fn test_receipt_number_format() {
        let db = test_db().await;
        let med_id = seed_medicine(&db, "Med", 10, 2000).await;

        let sale = db
            .sales()
            .create_sale(&cash_sale(vec![NewSaleItem {
                medicine_id: med_id,
                quantity: 1,
                unit_price_cents: 2000,
            }]))
            .await
            .unwrap();

        let parts: Vec<&str> = sale.sale.receipt_number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "RX");
        assert_eq!(parts[1].len(), 10);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);

        let by_receipt = db
            .sales()
            .get_by_receipt(&sale.sale.receipt_number)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_receipt.sale.id, sale.sale.id);
    }

    #[tokio::test]
    async fn test_receipt_collision_regenerates_and_inserts() {
        let db = test_db().await;
        let med_id = seed_medicine(&db, "Med", 10, 2000).await;

        let first = db
            .sales()
            .create_sale(&cash_sale(vec![NewSaleItem {
                medicine_id: med_id,
                quantity: 1,
                unit_price_cents: 2000,
            }]))
            .await
            .unwrap();
        let taken = first.sale.receipt_number.clone();

        // A second sale arriving with the already-taken receipt number:
        // the first INSERT hits the UNIQUE constraint and the retry loop
        // must regenerate rather than fail the sale.
        let now = Utc::now();
        let mut sale = Sale {
            id: Uuid::new_v4().to_string(),
            receipt_number: taken.clone(),
            cashier: None,
            customer_name: WALK_IN_CUSTOMER.to_string(),
            customer_phone: None,
            payment_method: PaymentMethod::Cash,
            subtotal_cents: 2000,
            discount_cents: 0,
            total_cents: 2000,
            amount_paid_cents: 2000,
            change_cents: 0,
            status: SaleStatus::Completed,
            notes: None,
            created_at: now,
        };

        let repo = db.sales();
        let mut tx = repo.pool.begin().await.unwrap();
        insert_sale_with_retry(&mut tx, &mut sale).await.unwrap();
        tx.commit().await.unwrap();

        assert_ne!(sale.receipt_number, taken);
        assert!(sale.receipt_number.starts_with(RECEIPT_PREFIX));

        let persisted = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(persisted.sale.receipt_number, sale.receipt_number);
    }

    #[tokio::test]
    async fn test_complete_pending_is_cas() {
        let db = test_db().await;
        let med_id = seed_medicine(&db, "Med", 10, 2000).await;

        let mut input = cash_sale(vec![NewSaleItem {
            medicine_id: med_id,
            quantity: 1,
            unit_price_cents: 2000,
        }]);
        input.payment_method = PaymentMethod::Mpesa;

        let sale = db.sales().create_sale(&input).await.unwrap();

        assert!(db.sales().complete_pending(&sale.sale.id).await.unwrap());
        // Second completion is a no-op
        assert!(!db.sales().complete_pending(&sale.sale.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_pending_restores_stock() {
        let db = test_db().await;
        let med_id = seed_medicine(&db, "Med", 10, 2000).await;

        let mut input = cash_sale(vec![NewSaleItem {
            medicine_id: med_id.clone(),
            quantity: 4,
            unit_price_cents: 2000,
        }]);
        input.payment_method = PaymentMethod::Mpesa;

        let sale = db.sales().create_sale(&input).await.unwrap();
        let med = db.medicines().get_by_id(&med_id).await.unwrap().unwrap();
        assert_eq!(med.stock_quantity, 6);

        assert!(db.sales().cancel_pending(&sale.sale.id).await.unwrap());

        let med = db.medicines().get_by_id(&med_id).await.unwrap().unwrap();
        assert_eq!(med.stock_quantity, 10);

        // Completed/cancelled sales cannot be cancelled again
        assert!(!db.sales().cancel_pending(&sale.sale.id).await.unwrap());
        let med = db.medicines().get_by_id(&med_id).await.unwrap().unwrap();
        assert_eq!(med.stock_quantity, 10);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let db = test_db().await;
        let med_id = seed_medicine(&db, "Med", 50, 2000).await;

        let line = || {
            vec![NewSaleItem {
                medicine_id: med_id.clone(),
                quantity: 1,
                unit_price_cents: 2000,
            }]
        };

        db.sales().create_sale(&cash_sale(line())).await.unwrap();
        let mut mpesa = cash_sale(line());
        mpesa.payment_method = PaymentMethod::Mpesa;
        db.sales().create_sale(&mpesa).await.unwrap();

        let all = db.sales().list(&SaleFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let by_method = db
            .sales()
            .list(&SaleFilter {
                payment_method: Some(PaymentMethod::Mpesa),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_method.len(), 1);
        assert_eq!(by_method[0].payment_method, PaymentMethod::Mpesa);

        // The mpesa sale is still awaiting payment
        let completed = db
            .sales()
            .list(&SaleFilter {
                status: Some(SaleStatus::Completed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);

        let limited = db
            .sales()
            .list(&SaleFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        // A window that ends yesterday excludes both
        let yesterday = Utc::now().date_naive() - Duration::days(1);
        let stale = db
            .sales()
            .list(&SaleFilter {
                date_to: Some(yesterday),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(stale.is_empty());
    }
}
