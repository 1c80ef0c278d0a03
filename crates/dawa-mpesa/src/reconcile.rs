//! # Payment Reconciliation Engine
//!
//! Drives an M-Pesa payment from initiation to a terminal state and
//! keeps the sale in sync with the payment.
//!
//! ## Two Result Paths, One State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   initiate()                                                           │
//! │       │  STK push accepted                                             │
//! │       ▼                                                                 │
//! │   txn: pending ◄──────────────────────────────┐                        │
//! │       │                                        │                        │
//! │       ├── PUSH PATH: Safaricom POSTs the      │  POLL PATH: cashier    │
//! │       │   callback → handle_callback()        │  hits GET /status →    │
//! │       │                                        │  poll() queries the    │
//! │       │                                        │  gateway               │
//! │       ▼                                        │                        │
//! │   apply_outcome() - CAS, first writer wins ────┘                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │   success / cancelled / failed   (terminal, sale completed on success) │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both paths converge on the same guarded transition in the database,
//! so a callback and a poll racing over the same payment cannot
//! double-apply or disagree.

use std::sync::Arc;
use tracing::{info, warn};

use crate::callback::CallbackEnvelope;
use crate::client::{PaymentGateway, PushRequest};
use crate::error::{MpesaError, MpesaResult};
use dawa_core::{normalize_phone, Money, MpesaStatus, MpesaTransaction};
use dawa_db::repository::mpesa::PaymentOutcome;
use dawa_db::{Database, DbError};

/// Maps a gateway result code to a terminal status.
///
/// `0` is paid. `1032` (user cancelled on handset) and `1037` (handset
/// unreachable / request timed out) both mean the customer never paid
/// and can push again, so both map to `cancelled`. Everything else is
/// a hard failure.
pub fn status_for_result_code(code: &str) -> MpesaStatus {
    match code {
        "0" => MpesaStatus::Success,
        "1032" | "1037" => MpesaStatus::Cancelled,
        _ => MpesaStatus::Failed,
    }
}

/// Reconciliation engine: gateway on one side, database on the other.
#[derive(Clone)]
pub struct ReconciliationEngine {
    db: Database,
    gateway: Arc<dyn PaymentGateway>,
}

impl ReconciliationEngine {
    /// Creates an engine over the given database and gateway.
    pub fn new(db: Database, gateway: Arc<dyn PaymentGateway>) -> Self {
        ReconciliationEngine { db, gateway }
    }

    /// Initiates an STK push for a sale.
    ///
    /// ## Flow
    /// 1. Normalize the phone number (reject bad input before any I/O)
    /// 2. Load the sale (the receipt number becomes the account reference)
    /// 3. Push via the gateway (amount in whole shillings, min 1)
    /// 4. Record the pending transaction; a retried push replaces the
    ///    sale's previous unpaid attempt instead of adding a second row
    ///
    /// `amount_cents` overrides the sale total when given (partial
    /// payment); it defaults to the sale total.
    ///
    /// ## Errors
    /// - [`MpesaError::Validation`] - malformed phone number
    /// - [`MpesaError::Database`] (NotFound) - unknown sale
    /// - [`MpesaError::GatewayRejected`] / [`MpesaError::GatewayUnavailable`]
    pub async fn initiate(
        &self,
        sale_id: &str,
        phone: &str,
        amount_cents: Option<i64>,
    ) -> MpesaResult<MpesaTransaction> {
        let phone = normalize_phone(phone)?;

        let sale = self
            .db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_id))?
            .sale;

        let amount = Money::from_cents(amount_cents.unwrap_or(sale.total_cents));
        let amount_shillings = amount.to_gateway_shillings();

        let ack = self
            .gateway
            .stk_push(&PushRequest {
                phone_number: phone.clone(),
                amount_shillings,
                account_reference: sale.receipt_number.clone(),
                description: format!("Pharmacy payment {}", sale.receipt_number),
            })
            .await?;

        let txn = self
            .db
            .mpesa()
            .create(
                Some(&sale.id),
                &ack.checkout_request_id,
                ack.merchant_request_id.as_deref(),
                &phone,
                amount_shillings * 100,
            )
            .await?;

        info!(
            checkout_id = %txn.checkout_request_id,
            receipt = %sale.receipt_number,
            amount = amount_shillings,
            "Payment initiated"
        );

        Ok(txn)
    }

    /// Returns the current state of a payment, querying the gateway only
    /// when the transaction is still pending.
    ///
    /// ## Gateway Errors Are Soft Here
    /// A failed or inconclusive status query leaves the transaction
    /// pending and returns its current state; the caller polls again or
    /// the callback resolves it. Only an unknown checkout ID is an error.
    pub async fn poll(&self, checkout_request_id: &str) -> MpesaResult<MpesaTransaction> {
        let txn = self
            .db
            .mpesa()
            .get_by_checkout_id(checkout_request_id)
            .await?
            .ok_or_else(|| DbError::not_found("MpesaTransaction", checkout_request_id))?;

        // Terminal: answer from our records, never bother the gateway
        if txn.status.is_terminal() {
            return Ok(txn);
        }

        let query = match self.gateway.query_status(checkout_request_id).await {
            Ok(result) => result,
            Err(e) => {
                warn!(checkout_id = %checkout_request_id, error = %e, "Status query failed, staying pending");
                return Ok(txn);
            }
        };

        let Some(code) = query.result_code else {
            // Gateway has no verdict yet
            return Ok(txn);
        };

        let status = status_for_result_code(&code);
        let outcome = PaymentOutcome {
            status,
            result_code: Some(code),
            result_description: query.result_description,
            mpesa_receipt_number: None,
            transaction_date: None,
        };

        self.db
            .mpesa()
            .apply_outcome(checkout_request_id, &outcome)
            .await?;

        self.db
            .mpesa()
            .get_by_checkout_id(checkout_request_id)
            .await?
            .ok_or_else(|| DbError::not_found("MpesaTransaction", checkout_request_id).into())
    }

    /// Applies a callback posted by Safaricom.
    ///
    /// Never fails on payload content: an unknown checkout ID or an
    /// already-terminal transaction is a no-op. Safaricom retries
    /// callbacks that are not acknowledged, so the HTTP layer always
    /// acks; this method only errors on our own storage failures.
    pub async fn handle_callback(&self, envelope: &CallbackEnvelope) -> MpesaResult<()> {
        let cb = envelope.callback();
        let code = cb.result_code.to_string();

        let outcome = if cb.is_success() {
            PaymentOutcome {
                status: MpesaStatus::Success,
                result_code: Some(code),
                result_description: cb.result_desc.clone(),
                mpesa_receipt_number: cb.receipt_number(),
                transaction_date: cb.transaction_date().or_else(|| Some(chrono::Utc::now())),
            }
        } else {
            PaymentOutcome {
                status: status_for_result_code(&code),
                result_code: Some(code),
                result_description: cb.result_desc.clone(),
                mpesa_receipt_number: None,
                transaction_date: None,
            }
        };

        match self
            .db
            .mpesa()
            .apply_outcome(&cb.checkout_request_id, &outcome)
            .await
        {
            Ok(applied) => {
                if !applied {
                    info!(
                        checkout_id = %cb.checkout_request_id,
                        "Duplicate callback ignored"
                    );
                }
                Ok(())
            }
            Err(DbError::NotFound { .. }) => {
                warn!(
                    checkout_id = %cb.checkout_request_id,
                    "Callback for unknown checkout request, acking anyway"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{PushAck, QueryResult};
    use async_trait::async_trait;
    use dawa_core::{MedicineUnit, NewSale, NewSaleItem, PaymentMethod, SaleStatus};
    use dawa_db::repository::medicine::NewMedicine;
    use dawa_db::DbConfig;
    use std::sync::Mutex;

    /// Scripted gateway: hands out a fixed ack and a programmable query
    /// result, recording what it was asked.
    struct FakeGateway {
        push_result: Mutex<Option<MpesaResult<PushAck>>>,
        query_result: Mutex<Option<MpesaResult<QueryResult>>>,
        pushes: Mutex<Vec<PushRequest>>,
        queries: Mutex<Vec<String>>,
    }

    impl FakeGateway {
        fn accepting(checkout_id: &str) -> Self {
            FakeGateway {
                push_result: Mutex::new(Some(Ok(PushAck {
                    checkout_request_id: checkout_id.to_string(),
                    merchant_request_id: Some("mr_1".to_string()),
                    customer_message: Some("Success. Request accepted".to_string()),
                }))),
                query_result: Mutex::new(None),
                pushes: Mutex::new(Vec::new()),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn with_query(self, result: MpesaResult<QueryResult>) -> Self {
            *self.query_result.lock().unwrap() = Some(result);
            self
        }

        fn query_count(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn stk_push(&self, request: &PushRequest) -> MpesaResult<PushAck> {
            self.pushes.lock().unwrap().push(request.clone());
            self.push_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(MpesaError::GatewayUnavailable("no script".into())))
        }

        async fn query_status(&self, checkout_request_id: &str) -> MpesaResult<QueryResult> {
            self.queries
                .lock()
                .unwrap()
                .push(checkout_request_id.to_string());
            self.query_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(MpesaError::GatewayUnavailable("no script".into())))
        }
    }

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let med = db
            .medicines()
            .create(NewMedicine {
                name: "Paracetamol 500mg".to_string(),
                generic_name: None,
                category_id: None,
                description: None,
                manufacturer: None,
                barcode: None,
                unit: MedicineUnit::Tablet,
                price_cents: 10500,
                cost_price_cents: 6000,
                stock_quantity: 10,
                reorder_level: 5,
                expiry_date: None,
                requires_prescription: false,
            })
            .await
            .unwrap();

        let sale = db
            .sales()
            .create_sale(&NewSale {
                cashier: None,
                customer_name: None,
                customer_phone: None,
                payment_method: PaymentMethod::Mpesa,
                discount_cents: 0,
                amount_paid_cents: None,
                notes: None,
                items: vec![NewSaleItem {
                    medicine_id: med.id,
                    quantity: 1,
                    unit_price_cents: 10500,
                }],
            })
            .await
            .unwrap();

        (db, sale.sale.id)
    }

    #[test]
    fn test_result_code_mapping() {
        assert_eq!(status_for_result_code("0"), MpesaStatus::Success);
        assert_eq!(status_for_result_code("1032"), MpesaStatus::Cancelled);
        assert_eq!(status_for_result_code("1037"), MpesaStatus::Cancelled);
        assert_eq!(status_for_result_code("1"), MpesaStatus::Failed);
        assert_eq!(status_for_result_code("2001"), MpesaStatus::Failed);
    }

    #[tokio::test]
    async fn test_initiate_normalizes_phone_and_records_pending() {
        let (db, sale_id) = setup().await;
        let gateway = Arc::new(FakeGateway::accepting("ws_CO_init"));
        let engine = ReconciliationEngine::new(db.clone(), gateway.clone());

        let txn = engine.initiate(&sale_id, "0712345678", None).await.unwrap();

        assert_eq!(txn.status, MpesaStatus::Pending);
        assert_eq!(txn.phone_number, "254712345678");
        // KSh 105.00 sale → 105 shillings pushed
        assert_eq!(txn.amount_cents, 10500);

        let push = gateway.pushes.lock().unwrap()[0].clone();
        assert_eq!(push.amount_shillings, 105);
        assert_eq!(push.phone_number, "254712345678");
        assert!(push.account_reference.starts_with("RX-"));
    }

    #[tokio::test]
    async fn test_initiate_rejects_bad_phone_before_gateway() {
        let (db, sale_id) = setup().await;
        let gateway = Arc::new(FakeGateway::accepting("ws_CO_x"));
        let engine = ReconciliationEngine::new(db, gateway.clone());

        let err = engine.initiate(&sale_id, "12345", None).await.unwrap_err();
        assert!(matches!(err, MpesaError::Validation(_)));
        assert!(gateway.pushes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_initiate_unknown_sale() {
        let (db, _) = setup().await;
        let engine =
            ReconciliationEngine::new(db, Arc::new(FakeGateway::accepting("ws_CO_x")));

        let err = engine.initiate("missing", "0712345678", None).await.unwrap_err();
        assert!(matches!(err, MpesaError::Database(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_reinitiate_supersedes_earlier_push() {
        let (db, sale_id) = setup().await;

        let engine =
            ReconciliationEngine::new(db.clone(), Arc::new(FakeGateway::accepting("ws_CO_old")));
        engine.initiate(&sale_id, "0712345678", None).await.unwrap();

        // The customer never answered; the cashier pushes again
        let engine =
            ReconciliationEngine::new(db.clone(), Arc::new(FakeGateway::accepting("ws_CO_new")));
        engine.initiate(&sale_id, "0712345678", None).await.unwrap();

        // The sale has exactly one live transaction, the newer push
        let txn = db.mpesa().get_by_sale_id(&sale_id).await.unwrap().unwrap();
        assert_eq!(txn.checkout_request_id, "ws_CO_new");
        assert!(db.mpesa().get_by_checkout_id("ws_CO_old").await.unwrap().is_none());

        // A late success callback for the superseded push is acked but
        // changes nothing
        let json = r#"{
            "Body": { "stkCallback": {
                "CheckoutRequestID": "ws_CO_old",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": { "Item": [
                    { "Name": "MpesaReceiptNumber", "Value": "SGH0STALE" }
                ]}
            }}
        }"#;
        let envelope: CallbackEnvelope = serde_json::from_str(json).unwrap();
        engine.handle_callback(&envelope).await.unwrap();

        let sale = db.sales().get_by_id(&sale_id).await.unwrap().unwrap();
        assert_eq!(sale.sale.status, SaleStatus::Pending);

        let txn = db.mpesa().get_by_sale_id(&sale_id).await.unwrap().unwrap();
        assert_eq!(txn.status, MpesaStatus::Pending);
        assert!(txn.mpesa_receipt_number.is_none());
    }

    #[tokio::test]
    async fn test_poll_applies_cancellation() {
        let (db, sale_id) = setup().await;
        let gateway = Arc::new(
            FakeGateway::accepting("ws_CO_poll").with_query(Ok(QueryResult {
                result_code: Some("1032".to_string()),
                result_description: Some("Request cancelled by user".to_string()),
            })),
        );
        let engine = ReconciliationEngine::new(db.clone(), gateway.clone());

        engine.initiate(&sale_id, "0712345678", None).await.unwrap();
        let txn = engine.poll("ws_CO_poll").await.unwrap();

        assert_eq!(txn.status, MpesaStatus::Cancelled);
        assert_eq!(txn.result_code.as_deref(), Some("1032"));

        // Sale stays pending: the cashier can push again
        let sale = db.sales().get_by_id(&sale_id).await.unwrap().unwrap();
        assert_eq!(sale.sale.status, SaleStatus::Pending);
    }

    #[tokio::test]
    async fn test_poll_skips_gateway_when_terminal() {
        let (db, sale_id) = setup().await;
        let gateway = Arc::new(
            FakeGateway::accepting("ws_CO_done").with_query(Ok(QueryResult {
                result_code: Some("0".to_string()),
                result_description: None,
            })),
        );
        let engine = ReconciliationEngine::new(db, gateway.clone());

        engine.initiate(&sale_id, "0712345678", None).await.unwrap();
        engine.poll("ws_CO_done").await.unwrap();
        assert_eq!(gateway.query_count(), 1);

        // Second poll answers from our records
        let txn = engine.poll("ws_CO_done").await.unwrap();
        assert_eq!(txn.status, MpesaStatus::Success);
        assert_eq!(gateway.query_count(), 1);
    }

    #[tokio::test]
    async fn test_poll_gateway_error_stays_pending() {
        let (db, sale_id) = setup().await;
        let gateway = Arc::new(
            FakeGateway::accepting("ws_CO_flaky")
                .with_query(Err(MpesaError::GatewayUnavailable("timeout".into()))),
        );
        let engine = ReconciliationEngine::new(db, gateway);

        engine.initiate(&sale_id, "0712345678", None).await.unwrap();
        let txn = engine.poll("ws_CO_flaky").await.unwrap();
        assert_eq!(txn.status, MpesaStatus::Pending);
    }

    #[tokio::test]
    async fn test_callback_success_completes_sale() {
        let (db, sale_id) = setup().await;
        let gateway = Arc::new(FakeGateway::accepting("ws_CO_cb"));
        let engine = ReconciliationEngine::new(db.clone(), gateway);

        engine.initiate(&sale_id, "0712345678", None).await.unwrap();

        let json = r#"{
            "Body": { "stkCallback": {
                "CheckoutRequestID": "ws_CO_cb",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": { "Item": [
                    { "Name": "MpesaReceiptNumber", "Value": "SGH7TY12XX" },
                    { "Name": "TransactionDate", "Value": 20260825120000 },
                    { "Name": "Amount", "Value": 105.0 }
                ]}
            }}
        }"#;
        let envelope: CallbackEnvelope = serde_json::from_str(json).unwrap();

        engine.handle_callback(&envelope).await.unwrap();

        let txn = db.mpesa().get_by_checkout_id("ws_CO_cb").await.unwrap().unwrap();
        assert_eq!(txn.status, MpesaStatus::Success);
        assert_eq!(txn.mpesa_receipt_number.as_deref(), Some("SGH7TY12XX"));

        let sale = db.sales().get_by_id(&sale_id).await.unwrap().unwrap();
        assert_eq!(sale.sale.status, SaleStatus::Completed);

        // Duplicate delivery is a no-op
        engine.handle_callback(&envelope).await.unwrap();
    }

    #[tokio::test]
    async fn test_callback_unknown_id_is_acked_noop() {
        let (db, _) = setup().await;
        let engine =
            ReconciliationEngine::new(db, Arc::new(FakeGateway::accepting("ws_CO_x")));

        let json = r#"{
            "Body": { "stkCallback": {
                "CheckoutRequestID": "ws_CO_ghost",
                "ResultCode": 0,
                "ResultDesc": "ok"
            }}
        }"#;
        let envelope: CallbackEnvelope = serde_json::from_str(json).unwrap();

        // Must not error: the HTTP layer always acks Safaricom
        engine.handle_callback(&envelope).await.unwrap();
    }
}
