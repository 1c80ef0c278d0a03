//! # M-Pesa Transaction Repository
//!
//! Persistence and state machine for STK push transactions.
//!
//! ## State Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │            Compare-and-set transition (single UPDATE)                   │
//! │                                                                         │
//! │  UPDATE mpesa_transactions                                             │
//! │  SET status = <terminal>, ...                                          │
//! │  WHERE checkout_request_id = ? AND status = 'pending'                  │
//! │                                                                         │
//! │  rows_affected = 1  → we won: apply side effects (complete sale)       │
//! │  rows_affected = 0  → already terminal: no-op                          │
//! │                                                                         │
//! │  A callback and a status poll racing over the same transaction         │
//! │  cannot double-apply: exactly one UPDATE matches.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! On a success transition the linked sale is completed in the SAME
//! transaction, so there is no window where the payment is recorded
//! successful but the sale still pending.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use dawa_core::{MpesaStatus, MpesaTransaction};

/// Terminal outcome applied to a pending transaction.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    /// Must be a terminal status (never `Pending`).
    pub status: MpesaStatus,
    pub result_code: Option<String>,
    pub result_description: Option<String>,
    /// Gateway receipt, present only on success.
    pub mpesa_receipt_number: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
}

impl PaymentOutcome {
    /// A successful payment outcome.
    pub fn success(
        receipt: impl Into<String>,
        transaction_date: Option<DateTime<Utc>>,
        result_description: Option<String>,
    ) -> Self {
        PaymentOutcome {
            status: MpesaStatus::Success,
            result_code: Some("0".to_string()),
            result_description,
            mpesa_receipt_number: Some(receipt.into()),
            transaction_date,
        }
    }

    /// A terminal non-success outcome (failed / cancelled / timeout).
    pub fn terminal(
        status: MpesaStatus,
        result_code: Option<String>,
        result_description: Option<String>,
    ) -> Self {
        PaymentOutcome {
            status,
            result_code,
            result_description,
            mpesa_receipt_number: None,
            transaction_date: None,
        }
    }
}

const SELECT_COLUMNS: &str = r#"
    id, sale_id, checkout_request_id, merchant_request_id, phone_number,
    amount_cents, mpesa_receipt_number, status, result_code,
    result_description, transaction_date, created_at, updated_at
"#;

/// Repository for M-Pesa transaction operations.
#[derive(Debug, Clone)]
pub struct MpesaRepository {
    pool: SqlitePool,
}

impl MpesaRepository {
    /// Creates a new MpesaRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MpesaRepository { pool }
    }

    /// Records a freshly initiated STK push as the sale's pending
    /// transaction.
    ///
    /// A sale holds at most one transaction. Re-pushing for the same sale
    /// (customer cancelled on the handset, handset unreachable, wrong
    /// number) replaces the previous attempt in place: the old
    /// checkout_request_id disappears, so a late callback or poll for a
    /// superseded push finds nothing and cannot complete the sale behind
    /// the newer attempt's back.
    ///
    /// A successfully paid transaction is never replaced; re-pushing a
    /// paid sale surfaces as [`DbError::UniqueViolation`] on `sale_id`.
    pub async fn create(
        &self,
        sale_id: Option<&str>,
        checkout_request_id: &str,
        merchant_request_id: Option<&str>,
        phone_number: &str,
        amount_cents: i64,
    ) -> DbResult<MpesaTransaction> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        debug!(
            checkout_id = %checkout_request_id,
            sale_id = ?sale_id,
            "Recording pending M-Pesa transaction"
        );

        let replaced = if let Some(sale_id) = sale_id {
            let result = sqlx::query(
                r#"
                UPDATE mpesa_transactions
                SET checkout_request_id = ?2,
                    merchant_request_id = ?3,
                    phone_number = ?4,
                    amount_cents = ?5,
                    status = 'pending',
                    mpesa_receipt_number = NULL,
                    result_code = NULL,
                    result_description = NULL,
                    transaction_date = NULL,
                    updated_at = ?6
                WHERE sale_id = ?1 AND status != 'success'
                "#,
            )
            .bind(sale_id)
            .bind(checkout_request_id)
            .bind(merchant_request_id)
            .bind(phone_number)
            .bind(amount_cents)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| match DbError::from(e) {
                err if err.is_unique_violation_on("checkout_request_id") => {
                    DbError::duplicate("checkout_request_id", checkout_request_id)
                }
                other => other,
            })?;

            result.rows_affected() > 0
        } else {
            false
        };

        if !replaced {
            sqlx::query(
                r#"
                INSERT INTO mpesa_transactions (
                    id, sale_id, checkout_request_id, merchant_request_id,
                    phone_number, amount_cents, status, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(sale_id)
            .bind(checkout_request_id)
            .bind(merchant_request_id)
            .bind(phone_number)
            .bind(amount_cents)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| match DbError::from(e) {
                err if err.is_unique_violation_on("checkout_request_id") => {
                    DbError::duplicate("checkout_request_id", checkout_request_id)
                }
                err if err.is_unique_violation_on("sale_id") => {
                    DbError::duplicate("sale_id", sale_id.unwrap_or_default())
                }
                other => other,
            })?;
        }

        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM mpesa_transactions WHERE checkout_request_id = ?1"
        );
        let txn = sqlx::query_as::<_, MpesaTransaction>(&sql)
            .bind(checkout_request_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(txn)
    }

    /// Gets a transaction by its gateway checkout request ID.
    pub async fn get_by_checkout_id(
        &self,
        checkout_request_id: &str,
    ) -> DbResult<Option<MpesaTransaction>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM mpesa_transactions WHERE checkout_request_id = ?1"
        );

        let txn = sqlx::query_as::<_, MpesaTransaction>(&sql)
            .bind(checkout_request_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(txn)
    }

    /// Gets the transaction attached to a sale, if any.
    ///
    /// `sale_id` is unique on the table, so this is at most one row.
    pub async fn get_by_sale_id(&self, sale_id: &str) -> DbResult<Option<MpesaTransaction>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM mpesa_transactions WHERE sale_id = ?1"
        );

        let txn = sqlx::query_as::<_, MpesaTransaction>(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(txn)
    }

    /// Applies a terminal outcome to a pending transaction (CAS).
    ///
    /// ## Idempotency
    /// Only a `pending` transaction transitions. If the transaction is
    /// already terminal (duplicate callback, late poll) the call returns
    /// `Ok(false)` and changes nothing - first writer wins.
    ///
    /// On success the linked sale is completed in the same database
    /// transaction.
    ///
    /// ## Returns
    /// - `Ok(true)` - transition applied
    /// - `Ok(false)` - transaction was already terminal
    /// - `Err(NotFound)` - unknown checkout_request_id
    pub async fn apply_outcome(
        &self,
        checkout_request_id: &str,
        outcome: &PaymentOutcome,
    ) -> DbResult<bool> {
        debug_assert!(outcome.status.is_terminal());

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE mpesa_transactions
            SET status = ?2,
                result_code = ?3,
                result_description = ?4,
                mpesa_receipt_number = COALESCE(?5, mpesa_receipt_number),
                transaction_date = COALESCE(?6, transaction_date),
                updated_at = ?7
            WHERE checkout_request_id = ?1 AND status = 'pending'
            "#,
        )
        .bind(checkout_request_id)
        .bind(outcome.status)
        .bind(&outcome.result_code)
        .bind(&outcome.result_description)
        .bind(&outcome.mpesa_receipt_number)
        .bind(outcome.transaction_date)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;

            // Distinguish "already terminal" from "never existed"
            return match self.get_by_checkout_id(checkout_request_id).await? {
                Some(existing) => {
                    debug!(
                        checkout_id = %checkout_request_id,
                        status = ?existing.status,
                        "Transaction already terminal, outcome ignored"
                    );
                    Ok(false)
                }
                None => {
                    warn!(
                        checkout_id = %checkout_request_id,
                        "Outcome for unknown checkout request"
                    );
                    Err(DbError::not_found("MpesaTransaction", checkout_request_id))
                }
            };
        }

        // We won the transition. On success, complete the sale now, in
        // the same transaction.
        if outcome.status == MpesaStatus::Success {
            sqlx::query(
                r#"
                UPDATE sales
                SET status = 'completed'
                WHERE status = 'pending'
                  AND id = (
                      SELECT sale_id FROM mpesa_transactions
                      WHERE checkout_request_id = ?1
                  )
                "#,
            )
            .bind(checkout_request_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            checkout_id = %checkout_request_id,
            status = ?outcome.status,
            "M-Pesa transaction transitioned"
        );
        Ok(true)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
